//! Who is signed in. Token storage and the sign-in flow live outside this
//! crate; they hand the result to [`AuthContext::sign_in`].

use tokio::sync::RwLock;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
  pub user_id: String,
  pub access_token: String,
}

#[derive(Debug, Default)]
pub struct AuthContext {
  current: RwLock<Option<Session>>,
}

impl AuthContext {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn sign_in(&self, user_id: impl Into<String>, access_token: impl Into<String>) {
    let session = Session {
      user_id: user_id.into(),
      access_token: access_token.into(),
    };
    tracing::info!(user_id = %session.user_id, "user signed in");
    *self.current.write().await = Some(session);
  }

  pub async fn sign_out(&self) {
    *self.current.write().await = None;
  }

  pub async fn current_user(&self) -> Option<String> {
    self.current.read().await.as_ref().map(|s| s.user_id.clone())
  }

  /// The signed-in user's id, or `NotAuthenticated`
  pub async fn require_user(&self) -> Result<String, AppError> {
    self.current_user().await.ok_or(AppError::NotAuthenticated)
  }

  pub async fn access_token(&self) -> Option<String> {
    self
      .current
      .read()
      .await
      .as_ref()
      .map(|s| s.access_token.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_require_user_before_and_after_sign_in() {
    let auth = AuthContext::new();
    assert!(matches!(auth.require_user().await, Err(AppError::NotAuthenticated)));

    auth.sign_in("u1", "jwt").await;
    assert_eq!(auth.require_user().await.unwrap(), "u1");
    assert_eq!(auth.access_token().await.as_deref(), Some("jwt"));

    auth.sign_out().await;
    assert!(auth.current_user().await.is_none());
  }
}
