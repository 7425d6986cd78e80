//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Resolving the course topic for a mode and generating a capsule
//!   - Grading submitted answers against the current capsule
//!   - Course/topic catalog edits
//!   - Quota status and reset

use tracing::{info, instrument, warn};

use crate::capsule::QuotaStatus;
use crate::domain::{Course, CourseStatus, CourseType, Mode, Role, Topic};
use crate::error::ApiError;
use crate::grader::grade_capsule;
use crate::protocol::{to_out, CapsuleOut, EvaluationOut};
use crate::state::{AppState, ReviewSession};

/// Pick the topic a capsule should be built around.
///
/// An explicit label always wins. Otherwise `course` needs a catalog topic,
/// `mix` uses one when available and `career` never does.
#[instrument(level = "debug", skip(state, explicit))]
pub async fn resolve_course_topic(state: &AppState, mode: Mode, explicit: Option<&str>) -> Result<Option<String>, ApiError> {
  if let Some(t) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
    return Ok(Some(t.to_string()));
  }

  let picked = match mode {
    Mode::Career => return Ok(None),
    Mode::Course | Mode::Mix => {
      let catalog = state.catalog.read().await;
      let mut rng = rand::thread_rng();
      catalog.pick_random_topic(&mut rng)
    }
  };

  match (mode, picked) {
    (Mode::Course, None) => Err(ApiError::BadRequest(
      "Course review focus needs at least one course topic; add courses and topics first.".into(),
    )),
    (_, picked) => Ok(picked),
  }
}

#[instrument(level = "info", skip(state, roles, course_topic), fields(mode = %mode.as_str(), roles = roles.len()))]
pub async fn new_capsule(
  state: &AppState,
  mode: Mode,
  roles: &[Role],
  course_topic: Option<&str>,
) -> Result<CapsuleOut, ApiError> {
  if roles.is_empty() {
    return Err(ApiError::BadRequest("Please select at least one target role.".into()));
  }

  let topic = resolve_course_topic(state, mode, course_topic).await?;
  let capsule = state.generator.generate_capsule(mode, roles, topic.as_deref()).await?;
  let out = to_out(&capsule, topic.clone());
  state.start_session(capsule, topic).await;
  info!(target: "capsule", id = %out.id, source = ?out.source, topic = ?out.course_topic_used, "New capsule stored in session");
  Ok(out)
}

#[instrument(level = "info", skip(state, answers), fields(%capsule_id, answers = answers.len()))]
pub async fn submit_answers(state: &AppState, capsule_id: &str, answers: &[String]) -> Result<EvaluationOut, ApiError> {
  let mut session = state.session.write().await;
  let capsule = match &session.capsule {
    Some(c) if c.id == capsule_id => c,
    Some(c) => {
      warn!(target: "capsule", current = %c.id, submitted = %capsule_id, "Answers for a stale capsule");
      return Err(ApiError::BadRequest(format!("Capsule {} is not the current capsule.", capsule_id)));
    }
    None => return Err(ApiError::BadRequest("No capsule generated yet.".into())),
  };

  let results = grade_capsule(capsule, answers);
  session.results = Some(results.clone());
  let out = EvaluationOut::new(capsule_id, results);
  info!(target: "capsule", %capsule_id, correct = out.correct, total = out.total, "Answers evaluated");
  Ok(out)
}

pub async fn current_session(state: &AppState) -> ReviewSession {
  state.current_session().await
}

#[instrument(level = "info", skip(state))]
pub async fn add_course(state: &AppState, name: &str, ctype: CourseType, status: CourseStatus) -> Result<Course, ApiError> {
  let course = state.catalog.write().await.add_course(name, ctype, status)?;
  info!(target: "anamnesis_backend", id = course.id, name = %course.name, "Course added");
  Ok(course)
}

#[instrument(level = "info", skip(state, notes))]
pub async fn add_topic(state: &AppState, course_id: u32, name: &str, notes: &str) -> Result<Topic, ApiError> {
  let topic = state.catalog.write().await.add_topic(course_id, name, notes)?;
  info!(target: "anamnesis_backend", course_id, id = topic.id, name = %topic.name, "Topic added");
  Ok(topic)
}

pub async fn list_courses(state: &AppState) -> Vec<Course> {
  state.catalog.read().await.list().to_vec()
}

pub fn quota_status(state: &AppState) -> Result<QuotaStatus, ApiError> {
  Ok(state.generator.quota_status()?)
}

pub async fn reset_quota(state: &AppState) -> Result<QuotaStatus, ApiError> {
  Ok(state.generator.reset_quota().await?)
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::sync::Arc;

  use crate::capsule::tests::FakeBackend;
  use crate::capsule::CapsuleGenerator;
  use crate::config::Prompts;
  use crate::quota::MemoryQuotaStore;

  pub(crate) fn test_state(primary: Arc<FakeBackend>, limit: u32) -> AppState {
    let generator = CapsuleGenerator::new(
      primary,
      FakeBackend::failing("fallback"),
      Arc::new(MemoryQuotaStore::default()),
      limit,
      Prompts::default(),
    );
    AppState::with_generator(generator)
  }

  #[tokio::test]
  async fn empty_roles_are_rejected_before_generation() {
    let primary = FakeBackend::ok("primary");
    let state = test_state(primary.clone(), 10);
    let err = new_capsule(&state, Mode::Career, &[], None).await.unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
    assert_eq!(primary.call_count(), 0);
  }

  #[tokio::test]
  async fn course_mode_requires_a_topic() {
    let primary = FakeBackend::ok("primary");
    let state = test_state(primary.clone(), 10);

    let err = new_capsule(&state, Mode::Course, &[Role::Tpm], None).await.unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
    assert_eq!(primary.call_count(), 0);

    add_course(&state, "Operations Management", CourseType::University, CourseStatus::Completed).await.unwrap();
    add_topic(&state, 1, "Little's Law", "").await.unwrap();

    let out = new_capsule(&state, Mode::Course, &[Role::Tpm], None).await.unwrap();
    assert_eq!(out.course_topic_used.as_deref(), Some("Operations Management — Little's Law"));
    let calls = primary.calls.lock().unwrap();
    assert!(calls[0].1.contains("Operations Management — Little's Law"));
  }

  #[tokio::test]
  async fn topic_resolution_by_mode() {
    let state = test_state(FakeBackend::ok("primary"), 10);

    assert_eq!(resolve_course_topic(&state, Mode::Mix, None).await.unwrap(), None);
    assert_eq!(resolve_course_topic(&state, Mode::Career, None).await.unwrap(), None);

    add_course(&state, "Ops", CourseType::University, CourseStatus::Completed).await.unwrap();
    add_topic(&state, 1, "Little's Law", "").await.unwrap();

    assert_eq!(resolve_course_topic(&state, Mode::Career, None).await.unwrap(), None);
    assert_eq!(
      resolve_course_topic(&state, Mode::Mix, None).await.unwrap().as_deref(),
      Some("Ops — Little's Law")
    );
    assert_eq!(
      resolve_course_topic(&state, Mode::Course, Some("  Finance — NPV ")).await.unwrap().as_deref(),
      Some("Finance — NPV")
    );
    assert_eq!(
      resolve_course_topic(&state, Mode::Mix, Some("   ")).await.unwrap().as_deref(),
      Some("Ops — Little's Law")
    );
  }

  #[tokio::test]
  async fn submit_grades_current_capsule_and_stores_results() {
    let state = test_state(FakeBackend::ok("primary"), 10);
    let out = new_capsule(&state, Mode::Career, &[Role::ProductManager], None).await.unwrap();

    let answers = vec!["Inventory relates to THROUGHPUT".to_string(), "".to_string()];
    let eval = submit_answers(&state, &out.id, &answers).await.unwrap();
    assert_eq!(eval.total, 2);
    assert_eq!(eval.correct, 1);
    assert!(eval.results[0].is_correct);
    assert!(!eval.results[1].is_correct);
    assert_eq!(eval.results[1].expected_answer, "inventory doubles");

    let session = current_session(&state).await;
    assert_eq!(session.results.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn submit_rejects_missing_or_stale_capsule() {
    let state = test_state(FakeBackend::ok("primary"), 10);
    let err = submit_answers(&state, "nope", &[]).await.unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    let first = new_capsule(&state, Mode::Career, &[Role::Analytics], None).await.unwrap();
    let second = new_capsule(&state, Mode::Career, &[Role::Analytics], None).await.unwrap();
    assert_ne!(first.id, second.id);
    assert!(submit_answers(&state, &first.id, &[]).await.is_err());
    assert!(submit_answers(&state, &second.id, &[]).await.is_ok());
  }

  #[tokio::test]
  async fn new_capsule_clears_previous_results() {
    let state = test_state(FakeBackend::ok("primary"), 10);
    let out = new_capsule(&state, Mode::Career, &[Role::Analytics], None).await.unwrap();
    submit_answers(&state, &out.id, &["inventory".to_string()]).await.unwrap();
    assert!(current_session(&state).await.results.is_some());

    new_capsule(&state, Mode::Career, &[Role::Analytics], None).await.unwrap();
    assert!(current_session(&state).await.results.is_none());
  }

  #[tokio::test]
  async fn quota_exhaustion_surfaces_as_api_error() {
    let state = test_state(FakeBackend::ok("primary"), 1);
    new_capsule(&state, Mode::Career, &[Role::Tpm], None).await.unwrap();
    let err = new_capsule(&state, Mode::Career, &[Role::Tpm], None).await.unwrap_err();
    assert_eq!(err.kind(), "quota_exceeded");

    assert_eq!(quota_status(&state).unwrap().remaining, 0);
    assert_eq!(reset_quota(&state).await.unwrap().remaining, 1);
  }
}
