//! Anamnesis · study capsule backend
//!
//! - Axum HTTP + WebSocket API
//! - OpenAI capsule generation with a one-shot fallback model
//! - Keyword-overlap answer grading
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000)
//!   OPENAI_API_KEY        : required (or [secrets] openai_api_key in the TOML config)
//!   OPENAI_BASE_URL       : default "https://api.openai.com/v1"
//!   OPENAI_PRIMARY_MODEL  : default "gpt-4.1-mini"
//!   OPENAI_FALLBACK_MODEL : default "gpt-4.1-nano"
//!   OPENAI_TIMEOUT_SECS   : default 20
//!   QUOTA_LIMIT           : capsules allowed before generation is refused (default 500)
//!   QUOTA_PATH            : persisted counter (default ./data/quota.json)
//!   AGENT_CONFIG_PATH     : path to TOML config (prompts, quota, openai, secrets)
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default), "compact" or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod backend;
mod quota;
mod capsule;
mod grader;
mod catalog;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Settings;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Missing credentials are fatal here, never per request.
  let settings = Settings::from_env().map_err(|e| {
    error!(target: "anamnesis_backend", error = %e, "Configuration error");
    e
  })?;
  info!(target: "anamnesis_backend", ?settings, "Configuration loaded");

  let state = Arc::new(AppState::new(&settings)?);
  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "anamnesis_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "anamnesis_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!(target: "anamnesis_backend", error = %e, "Failed to listen for shutdown signal");
  }
}
