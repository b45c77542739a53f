//! Input checks applied before any write reaches the store. Anything rejected
//! here never becomes PENDING_SYNC.

use crate::error::AppError;
use crate::models::NewTemplateExercise;

pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 500;
pub const MAX_NOTES_LENGTH: usize = 2000;

pub fn require_id(field: &str, value: &str) -> Result<(), AppError> {
  if value.trim().is_empty() {
    return Err(AppError::invalid(format!("{} must not be blank", field)));
  }
  Ok(())
}

/// Trimmed name, 1..=100 characters, no control characters
pub fn validate_name(field: &str, value: &str) -> Result<String, AppError> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(AppError::invalid(format!("{} must not be blank", field)));
  }
  let len = trimmed.chars().count();
  if len > MAX_NAME_LENGTH {
    return Err(AppError::invalid(format!(
      "{} is {} characters, maximum is {}",
      field, len, MAX_NAME_LENGTH
    )));
  }
  if trimmed.chars().any(char::is_control) {
    return Err(AppError::invalid(format!(
      "{} contains control characters",
      field
    )));
  }
  Ok(trimmed.to_string())
}

pub fn validate_optional_text(
  field: &str,
  value: Option<&str>,
  max_len: usize,
) -> Result<Option<String>, AppError> {
  let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
    return Ok(None);
  };
  if value.chars().count() > max_len {
    return Err(AppError::invalid(format!(
      "{} exceeds {} characters",
      field, max_len
    )));
  }
  Ok(Some(value.to_string()))
}

pub fn validate_template_exercises(exercises: &[NewTemplateExercise]) -> Result<(), AppError> {
  if exercises.is_empty() {
    return Err(AppError::invalid("a template needs at least one exercise"));
  }

  let mut seen = std::collections::HashSet::new();
  for exercise in exercises {
    require_id("exercise_id", &exercise.exercise_id)?;
    if !seen.insert(exercise.exercise_id.as_str()) {
      return Err(AppError::invalid(format!(
        "exercise {} appears twice",
        exercise.exercise_id
      )));
    }
    if exercise.target_sets <= 0 || exercise.target_reps <= 0 {
      return Err(AppError::invalid(format!(
        "exercise {} needs positive sets and reps",
        exercise.exercise_id
      )));
    }
    if exercise.rest_seconds < 0 {
      return Err(AppError::invalid(format!(
        "exercise {} has negative rest",
        exercise.exercise_id
      )));
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn exercise(id: &str) -> NewTemplateExercise {
    NewTemplateExercise {
      exercise_id: id.to_string(),
      target_sets: 3,
      target_reps: 10,
      rest_seconds: 60,
    }
  }

  #[test]
  fn test_name_limits() {
    assert!(validate_name("name", "").is_err());
    assert!(validate_name("name", "   ").is_err());
    assert!(validate_name("name", &"a".repeat(101)).is_err());
    assert_eq!(validate_name("name", &"a".repeat(100)).unwrap().len(), 100);
    assert_eq!(validate_name("name", "  Leg Day ").unwrap(), "Leg Day");
    assert!(validate_name("name", "Leg\u{0}Day").is_err());
  }

  #[test]
  fn test_name_length_counts_characters_not_bytes() {
    assert!(validate_name("name", &"é".repeat(100)).is_ok());
  }

  #[test]
  fn test_exercise_list_rules() {
    assert!(validate_template_exercises(&[]).is_err());
    assert!(validate_template_exercises(&[exercise("a"), exercise("a")]).is_err());
    assert!(validate_template_exercises(&[exercise("")]).is_err());
    assert!(validate_template_exercises(&[exercise("a"), exercise("b")]).is_ok());

    let mut bad = exercise("c");
    bad.target_reps = 0;
    assert!(validate_template_exercises(&[bad]).is_err());
  }

  #[test]
  fn test_optional_text_blank_becomes_none() {
    assert_eq!(validate_optional_text("notes", Some("  "), 10).unwrap(), None);
    assert!(validate_optional_text("notes", Some("x".repeat(11).as_str()), 10).is_err());
  }
}
