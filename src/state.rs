//! Application state: capsule generator, course/topic catalog and the
//! single-user review session.
//!
//! This module owns:
//!   - the generator (primary + fallback OpenAI backends, quota store, prompts)
//!   - the in-memory catalog of courses and topics
//!   - the current review session (capsule, topic used, latest results)

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::backend::OpenAiBackend;
use crate::capsule::CapsuleGenerator;
use crate::catalog::Catalog;
use crate::config::Settings;
use crate::domain::{Capsule, EvaluationResult};
use crate::error::ConfigError;
use crate::quota::FileQuotaStore;

/// What the user is currently reviewing. Replaced on every new capsule.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ReviewSession {
    pub capsule: Option<Capsule>,
    pub course_topic_used: Option<String>,
    pub results: Option<Vec<EvaluationResult>>,
}

pub struct AppState {
    pub generator: CapsuleGenerator,
    pub catalog: RwLock<Catalog>,
    pub session: RwLock<ReviewSession>,
}

impl AppState {
    /// Build state from resolved settings: OpenAI backends and the file quota store.
    #[instrument(level = "info", skip_all)]
    pub fn new(settings: &Settings) -> Result<Self, ConfigError> {
        let primary = OpenAiBackend::new(
            "primary",
            &settings.api_key,
            &settings.base_url,
            &settings.primary_model,
            settings.timeout_secs,
        )?;
        let fallback = OpenAiBackend::new(
            "fallback",
            &settings.api_key,
            &settings.base_url,
            &settings.fallback_model,
            settings.timeout_secs,
        )?;
        let quota = FileQuotaStore::new(&settings.quota_path);

        info!(
            target: "anamnesis_backend",
            base_url = %primary.base_url(),
            primary_model = %settings.primary_model,
            fallback_model = %settings.fallback_model,
            timeout_secs = settings.timeout_secs,
            quota_path = %quota.path().display(),
            quota_limit = settings.quota_limit,
            "OpenAI backends ready"
        );

        let generator = CapsuleGenerator::new(
            Arc::new(primary),
            Arc::new(fallback),
            Arc::new(quota),
            settings.quota_limit,
            settings.prompts.clone(),
        );
        Ok(Self::with_generator(generator))
    }

    pub fn with_generator(generator: CapsuleGenerator) -> Self {
        Self {
            generator,
            catalog: RwLock::new(Catalog::default()),
            session: RwLock::new(ReviewSession::default()),
        }
    }

    /// Replace the session with a freshly generated capsule; clears old results.
    #[instrument(level = "debug", skip(self, capsule), fields(id = %capsule.id))]
    pub async fn start_session(&self, capsule: Capsule, course_topic_used: Option<String>) {
        let mut session = self.session.write().await;
        *session = ReviewSession {
            capsule: Some(capsule),
            course_topic_used,
            results: None,
        };
    }

    pub async fn current_session(&self) -> ReviewSession {
        self.session.read().await.clone()
    }
}
