use serde::Serialize;

use crate::clock::now_millis;
use crate::db::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{
  NewTemplateExercise, NewWorkoutTemplate, TemplateExercise, TemplateUpdate, WorkoutTemplate,
};
use crate::store::templates as store;

/// A template together with its ordered exercise slots
#[derive(Debug, Clone, Serialize)]
pub struct TemplateDetail {
  pub template: WorkoutTemplate,
  pub exercises: Vec<TemplateExercise>,
}

pub async fn create_template(
  state: &AppState,
  name: String,
  description: Option<String>,
  exercises: Vec<NewTemplateExercise>,
) -> AppResult<WorkoutTemplate> {
  let owner_id = state.current_user().await?;
  let template = store::create_template(
    &state.db,
    NewWorkoutTemplate {
      owner_id,
      name,
      description,
      exercises,
    },
    now_millis(),
  )
  .await?;
  state.after_local_change().await;
  Ok(template)
}

pub async fn update_template(
  state: &AppState,
  template_id: String,
  update: TemplateUpdate,
) -> AppResult<WorkoutTemplate> {
  let owner_id = state.current_user().await?;
  let template = store::update_template(&state.db, &template_id, &owner_id, update, now_millis()).await?;
  state.after_local_change().await;
  Ok(template)
}

pub async fn replace_template_exercises(
  state: &AppState,
  template_id: String,
  exercises: Vec<NewTemplateExercise>,
) -> AppResult<Vec<TemplateExercise>> {
  let owner_id = state.current_user().await?;
  let exercises =
    store::replace_template_exercises(&state.db, &template_id, &owner_id, &exercises, now_millis())
      .await?;
  state.after_local_change().await;
  Ok(exercises)
}

pub async fn delete_template(state: &AppState, template_id: String) -> AppResult<()> {
  let owner_id = state.current_user().await?;
  store::delete_template(&state.db, &template_id, &owner_id, now_millis()).await?;
  state.after_local_change().await;
  Ok(())
}

pub async fn list_templates(state: &AppState) -> AppResult<Vec<WorkoutTemplate>> {
  let owner_id = state.current_user().await?;
  store::list_templates(&state.db, &owner_id).await
}

pub async fn get_template(state: &AppState, template_id: String) -> AppResult<TemplateDetail> {
  let owner_id = state.current_user().await?;
  let template = match store::get_template(&state.db, &template_id).await? {
    Some(t) if t.owner_id == owner_id && !t.is_deleted => t,
    _ => return Err(AppError::not_found("workout template", template_id)),
  };
  let exercises = store::get_template_exercises(&state.db, &template.id).await?;
  Ok(TemplateDetail { template, exercises })
}
