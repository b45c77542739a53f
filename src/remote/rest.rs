//! [`RemoteGateway`] over a PostgREST-style HTTP API (as exposed by Supabase).
//!
//! Tables live under `/rest/v1/{table}`; filters are query parameters of the
//! form `column=eq.value`.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use super::{Filter, RemoteGateway, RemoteTable};
use crate::auth::AuthContext;
use crate::config::RemoteConfig;
use crate::error::RemoteError;

const REST_PREFIX: [&str; 2] = ["rest", "v1"];

pub struct RestGateway {
  client: Client,
  base_url: Url,
  api_key: String,
  auth: Option<Arc<AuthContext>>,
}

impl RestGateway {
  pub fn new(config: &RemoteConfig, auth: Option<Arc<AuthContext>>) -> Result<Self, RemoteError> {
    let client = Client::builder()
      .timeout(config.timeout)
      .build()
      .map_err(|e| RemoteError::Network(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Self {
      client,
      base_url: config.base_url.clone(),
      api_key: config.api_key.clone(),
      auth,
    })
  }

  fn table_url(&self, table: RemoteTable, filter: Option<&Filter>) -> Result<Url, RemoteError> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| RemoteError::Network(format!("Base URL cannot hold a path: {}", self.base_url)))?
      .pop_if_empty()
      .extend(REST_PREFIX)
      .push(table.as_str());

    if let Some(filter) = filter {
      let mut pairs = url.query_pairs_mut();
      for (column, value) in &filter.clauses {
        pairs.append_pair(column, &format!("eq.{}", value));
      }
    }
    Ok(url)
  }

  /// Signed-in users call with their own token; otherwise the anon key.
  async fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let token = match &self.auth {
      Some(auth) => auth.access_token().await,
      None => None,
    };
    let bearer = token.unwrap_or_else(|| self.api_key.clone());

    self
      .client
      .request(method, url)
      .header("apikey", &self.api_key)
      .header("Authorization", format!("Bearer {}", bearer))
  }

  async fn send(&self, request: RequestBuilder, table: RemoteTable) -> Result<String, RemoteError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
      tracing::debug!(%table, status = status.as_u16(), body = %body, "remote request failed");
      return Err(RemoteError::from_status(status.as_u16(), body));
    }
    Ok(body)
  }
}

#[async_trait]
impl RemoteGateway for RestGateway {
  async fn insert(&self, table: RemoteTable, rows: Vec<Value>) -> Result<(), RemoteError> {
    if rows.is_empty() {
      return Ok(());
    }
    let url = self.table_url(table, None)?;
    let request = self
      .request(Method::POST, url)
      .await
      .header("Prefer", "resolution=merge-duplicates,return=minimal")
      .json(&rows);
    self.send(request, table).await?;
    Ok(())
  }

  async fn update(&self, table: RemoteTable, filter: &Filter, patch: Value) -> Result<(), RemoteError> {
    let url = self.table_url(table, Some(filter))?;
    let request = self
      .request(Method::PATCH, url)
      .await
      .header("Prefer", "return=minimal")
      .json(&patch);
    self.send(request, table).await?;
    Ok(())
  }

  async fn delete(&self, table: RemoteTable, filter: &Filter) -> Result<(), RemoteError> {
    let url = self.table_url(table, Some(filter))?;
    let request = self.request(Method::DELETE, url).await;
    self.send(request, table).await?;
    Ok(())
  }

  async fn query(&self, table: RemoteTable, filter: &Filter) -> Result<Vec<Value>, RemoteError> {
    let mut url = self.table_url(table, Some(filter))?;
    url.query_pairs_mut().append_pair("select", "*");
    let request = self.request(Method::GET, url).await;
    let body = self.send(request, table).await?;

    serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use mockito::Matcher;
  use serde_json::json;
  use std::time::Duration;

  fn gateway_for(url: &str) -> RestGateway {
    let config = RemoteConfig {
      base_url: Url::parse(url).unwrap(),
      api_key: "anon-key".to_string(),
      timeout: Duration::from_secs(2),
    };
    RestGateway::new(&config, None).unwrap()
  }

  #[tokio::test]
  async fn test_insert_upserts_with_api_key() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/rest/v1/workout_templates")
      .match_header("apikey", "anon-key")
      .match_header("authorization", "Bearer anon-key")
      .match_header("prefer", Matcher::Regex("resolution=merge-duplicates".into()))
      .match_body(Matcher::Json(json!([{"id": "t1"}])))
      .with_status(201)
      .create_async()
      .await;

    let gateway = gateway_for(&server.url());
    gateway
      .insert(RemoteTable::WorkoutTemplates, vec![json!({"id": "t1"})])
      .await
      .unwrap();

    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_signed_in_user_token_is_used() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("DELETE", "/rest/v1/template_exercises")
      .match_query(Matcher::UrlEncoded("template_id".into(), "eq.t1".into()))
      .match_header("authorization", "Bearer user-jwt")
      .with_status(204)
      .create_async()
      .await;

    let auth = Arc::new(AuthContext::new());
    auth.sign_in("u1", "user-jwt").await;
    let config = RemoteConfig {
      base_url: Url::parse(&server.url()).unwrap(),
      api_key: "anon-key".to_string(),
      timeout: Duration::from_secs(2),
    };
    let gateway = RestGateway::new(&config, Some(auth)).unwrap();
    gateway
      .delete(RemoteTable::TemplateExercises, &Filter::eq("template_id", "t1"))
      .await
      .unwrap();

    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_query_filters_and_decodes_rows() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
      .mock("GET", "/rest/v1/workout_logs")
      .match_query(Matcher::AllOf(vec![
        Matcher::UrlEncoded("owner_id".into(), "eq.u1".into()),
        Matcher::UrlEncoded("select".into(), "*".into()),
      ]))
      .with_status(200)
      .with_body(r#"[{"id": "l1"}, {"id": "l2"}]"#)
      .create_async()
      .await;

    let gateway = gateway_for(&server.url());
    let rows = gateway
      .query(RemoteTable::WorkoutLogs, &Filter::eq("owner_id", "u1"))
      .await
      .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["id"], "l2");
  }

  #[tokio::test]
  async fn test_status_codes_are_classified() {
    let mut server = mockito::Server::new_async().await;
    let _busy = server
      .mock("PATCH", "/rest/v1/workout_templates")
      .match_query(Matcher::UrlEncoded("id".into(), "eq.busy".into()))
      .with_status(503)
      .with_body("try later")
      .create_async()
      .await;
    let _bad = server
      .mock("PATCH", "/rest/v1/workout_templates")
      .match_query(Matcher::UrlEncoded("id".into(), "eq.bad".into()))
      .with_status(400)
      .with_body("invalid column")
      .create_async()
      .await;

    let gateway = gateway_for(&server.url());
    let busy = gateway
      .update(RemoteTable::WorkoutTemplates, &Filter::eq("id", "busy"), json!({}))
      .await
      .unwrap_err();
    assert!(matches!(busy, RemoteError::Unavailable { status: 503, .. }));
    assert!(busy.is_retryable());

    let bad = gateway
      .update(RemoteTable::WorkoutTemplates, &Filter::eq("id", "bad"), json!({}))
      .await
      .unwrap_err();
    assert!(matches!(bad, RemoteError::Rejected { status: 400, .. }));
    assert!(!bad.is_retryable());
  }

  #[tokio::test]
  async fn test_unreachable_host_is_network_error() {
    let gateway = gateway_for("http://127.0.0.1:9");
    let err = gateway
      .query(RemoteTable::WorkoutTemplates, &Filter::default())
      .await
      .unwrap_err();
    assert!(matches!(err, RemoteError::Network(_)));
  }

  #[test]
  fn test_table_url_keeps_base_path() {
    let gateway = gateway_for("https://example.supabase.co/");
    let url = gateway
      .table_url(RemoteTable::WorkoutLogs, Some(&Filter::eq("id", "a b")))
      .unwrap();
    assert_eq!(
      url.as_str(),
      "https://example.supabase.co/rest/v1/workout_logs?id=eq.a+b"
    );
  }
}
