//! Capsule generation: prompt building, primary → fallback delegation,
//! response schema validation and the quota gate.
//!
//! Flow:
//! 1) Lock the gate and read the quota counter; refuse when the ceiling is reached.
//! 2) Build the system/user prompts for the mode, roles and optional topic.
//! 3) Ask the primary backend; any failure (transport, HTTP, bad JSON, schema)
//!    triggers exactly one attempt against the fallback with the same prompts.
//! 4) On success increment the counter once and hand back the capsule. A failed
//!    increment is logged; the capsule is still returned.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::backend::TextBackend;
use crate::config::Prompts;
use crate::domain::{Capsule, CapsuleSource, Mode, QuizQuestion, Role};
use crate::error::{BackendError, CapsuleError, QuotaError};
use crate::quota::QuotaStore;
use crate::util::{fill_template, trunc_for_log};

pub const QUESTIONS_PER_CAPSULE: usize = 2;

const NO_TOPIC: &str = "none specified";
const DEFAULT_ROLE_TEXT: &str = "Product Manager";

/// Snapshot of the quota counter.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct QuotaStatus {
  pub used: u32,
  pub limit: u32,
  pub remaining: u32,
}

impl QuotaStatus {
  fn new(used: u32, limit: u32) -> Self {
    Self { used, limit, remaining: limit.saturating_sub(used) }
  }
}

pub struct CapsuleGenerator {
  primary: Arc<dyn TextBackend>,
  fallback: Arc<dyn TextBackend>,
  quota: Arc<dyn QuotaStore>,
  limit: u32,
  prompts: Prompts,
  // read -> generate -> increment runs under this lock
  gate: Mutex<()>,
}

impl CapsuleGenerator {
  pub fn new(
    primary: Arc<dyn TextBackend>,
    fallback: Arc<dyn TextBackend>,
    quota: Arc<dyn QuotaStore>,
    limit: u32,
    prompts: Prompts,
  ) -> Self {
    Self { primary, fallback, quota, limit, prompts, gate: Mutex::new(()) }
  }

  pub fn primary_model(&self) -> &str { self.primary.model() }
  pub fn fallback_model(&self) -> &str { self.fallback.model() }

  #[instrument(level = "info", skip(self, mode, roles, course_topic), fields(mode = %mode.as_str(), roles = roles.len(), has_topic = course_topic.is_some()))]
  pub async fn generate_capsule(
    &self,
    mode: Mode,
    roles: &[Role],
    course_topic: Option<&str>,
  ) -> Result<Capsule, CapsuleError> {
    let _gate = self.gate.lock().await;

    let used = self.quota.read()?;
    if used >= self.limit {
      warn!(target: "capsule", used, limit = self.limit, "Quota exhausted; refusing generation");
      return Err(CapsuleError::QuotaExceeded { limit: self.limit });
    }

    let (system, user) = build_prompts(&self.prompts, mode, roles, course_topic);

    let (payload, source) = match self.attempt(self.primary.as_ref(), &system, &user).await {
      Ok(p) => (p, CapsuleSource::Primary),
      Err(primary) => {
        warn!(target: "capsule", backend = %self.primary.name(), error = %primary, "Primary generation failed; trying fallback");
        match self.attempt(self.fallback.as_ref(), &system, &user).await {
          Ok(p) => (p, CapsuleSource::Fallback),
          Err(fallback) => {
            error!(target: "capsule", backend = %self.fallback.name(), error = %fallback, "Fallback generation failed");
            return Err(CapsuleError::Generation { primary, fallback });
          }
        }
      }
    };

    let capsule = Capsule {
      id: Uuid::new_v4().to_string(),
      concept: payload.concept,
      questions: payload.questions,
      source,
    };

    // a failed increment never discards a generated capsule
    let used = match self.quota.increment() {
      Ok(n) => Some(n),
      Err(e) => {
        error!(
          target: "capsule",
          capsule_id = %capsule.id,
          source = ?capsule.source,
          error = %e,
          "Quota increment failed; capsule delivered uncounted"
        );
        None
      }
    };

    info!(
      target: "capsule",
      capsule_id = %capsule.id,
      source = ?capsule.source,
      quota_used = ?used,
      quota_limit = self.limit,
      concept_preview = %capsule.concept.chars().take(40).collect::<String>(),
      "Capsule generated"
    );
    Ok(capsule)
  }

  async fn attempt(&self, backend: &dyn TextBackend, system: &str, user: &str) -> Result<ValidCapsule, BackendError> {
    let text = backend.complete_json(system, user, self.prompts.temperature).await?;
    parse_capsule(&text).map_err(|e| {
      warn!(target: "capsule", backend = %backend.name(), body = %trunc_for_log(&text, 200), error = %e, "Rejected model output");
      e
    })
  }

  pub fn quota_status(&self) -> Result<QuotaStatus, QuotaError> {
    Ok(QuotaStatus::new(self.quota.read()?, self.limit))
  }

  /// Explicit reset. Waits for any in-flight generation to finish first.
  pub async fn reset_quota(&self) -> Result<QuotaStatus, QuotaError> {
    let _gate = self.gate.lock().await;
    self.quota.reset()?;
    info!(target: "capsule", limit = self.limit, "Quota reset on request");
    Ok(QuotaStatus::new(0, self.limit))
  }
}

/// Build the (system, user) prompt pair for one generation request.
pub fn build_prompts(prompts: &Prompts, mode: Mode, roles: &[Role], course_topic: Option<&str>) -> (String, String) {
  let roles_text = if roles.is_empty() {
    DEFAULT_ROLE_TEXT.to_string()
  } else {
    roles.iter().map(Role::label).collect::<Vec<_>>().join(", ")
  };
  let course_topic = course_topic.unwrap_or(NO_TOPIC);
  let mode_focus = match mode {
    Mode::Career => &prompts.career_focus,
    Mode::Course => &prompts.course_focus,
    Mode::Mix => &prompts.mix_focus,
  };

  let user = fill_template(
    &prompts.capsule_user_template,
    &[
      ("roles", roles_text.as_str()),
      ("mode", mode.as_str()),
      ("course_topic", course_topic),
      ("mode_focus", mode_focus.as_str()),
    ],
  );
  (prompts.capsule_system.trim().to_string(), user.trim().to_string())
}

// --- Response schema ---

#[derive(Deserialize)]
struct CapsulePayload {
  concept: String,
  questions: Vec<QuizQuestion>,
}

#[derive(Debug)]
struct ValidCapsule {
  concept: String,
  questions: Vec<QuizQuestion>,
}

fn parse_capsule(text: &str) -> Result<ValidCapsule, BackendError> {
  let p: CapsulePayload = serde_json::from_str(text).map_err(|e| BackendError::InvalidJson(e.to_string()))?;

  if p.concept.trim().is_empty() {
    return Err(BackendError::Schema("concept is empty".into()));
  }
  if p.questions.len() != QUESTIONS_PER_CAPSULE {
    return Err(BackendError::Schema(format!(
      "expected {} questions, got {}",
      QUESTIONS_PER_CAPSULE,
      p.questions.len()
    )));
  }
  for (i, q) in p.questions.iter().enumerate() {
    if q.question.trim().is_empty() {
      return Err(BackendError::Schema(format!("question {} has empty text", i + 1)));
    }
    if q.expected_answer.trim().is_empty() {
      return Err(BackendError::Schema(format!("question {} has empty expected_answer", i + 1)));
    }
  }

  Ok(ValidCapsule { concept: p.concept, questions: p.questions })
}
