//! Error taxonomy. Configuration errors are fatal at startup; backend errors
//! are per-attempt and always eligible for the fallback; capsule errors are
//! what the caller of the generator sees.

use axum::http::StatusCode;
use thiserror::Error;

/// Startup configuration failures. `main` returns these and the process exits.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("OPENAI_API_KEY not found: set it as an env var or under [secrets] in the agent config")]
  MissingApiKey,

  #[error("failed to read config file {path}: {source}")]
  Read { path: String, #[source] source: std::io::Error },

  #[error("failed to parse config file {path}: {source}")]
  Parse { path: String, #[source] source: toml::de::Error },

  #[error("invalid value for {key}: {value:?} ({reason})")]
  InvalidValue { key: &'static str, value: String, reason: &'static str },

  #[error("failed to build HTTP client: {0}")]
  HttpClient(#[from] reqwest::Error),
}

/// One failed call against a text-generation backend.
#[derive(Debug, Error)]
pub enum BackendError {
  #[error("network error: {0}")]
  Network(String),

  #[error("request timed out after {0}s")]
  Timeout(u64),

  /// Non-2xx response, including provider-side rate limits and quota rejections.
  #[error("API error (HTTP {status}): {message}")]
  Api { status: u16, message: String },

  #[error("empty response from model")]
  EmptyResponse,

  #[error("JSON parse error: {0}")]
  InvalidJson(String),

  /// JSON parsed but does not match the capsule schema.
  #[error("schema violation: {0}")]
  Schema(String),
}

/// Quota store failures.
#[derive(Debug, Error)]
pub enum QuotaError {
  #[error("quota store I/O error at {path}: {source}")]
  Io { path: String, #[source] source: std::io::Error },

  #[error("quota store at {path} is corrupt: {message}")]
  Corrupt { path: String, message: String },
}

/// Errors surfaced by `CapsuleGenerator::generate_capsule`.
#[derive(Debug, Error)]
pub enum CapsuleError {
  /// The counter reached its ceiling; no backend was contacted.
  #[error("generation quota exceeded ({limit} capsules)")]
  QuotaExceeded { limit: u32 },

  /// Primary and fallback both failed.
  #[error("capsule generation failed (primary: {primary}; fallback: {fallback})")]
  Generation { primary: BackendError, fallback: BackendError },

  #[error(transparent)]
  Quota(#[from] QuotaError),
}

/// Course/topic catalog validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
  #[error("please enter a {0} name")]
  EmptyName(&'static str),

  #[error("unknown course id {0}")]
  UnknownCourse(u32),
}

/// What the HTTP and WebSocket layers report back to the caller.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  BadRequest(String),

  #[error(transparent)]
  Catalog(#[from] CatalogError),

  #[error(transparent)]
  Capsule(#[from] CapsuleError),

  #[error(transparent)]
  Quota(#[from] QuotaError),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Catalog(CatalogError::EmptyName(_)) => StatusCode::BAD_REQUEST,
      ApiError::Catalog(CatalogError::UnknownCourse(_)) => StatusCode::NOT_FOUND,
      ApiError::Capsule(CapsuleError::QuotaExceeded { .. }) => StatusCode::TOO_MANY_REQUESTS,
      ApiError::Capsule(CapsuleError::Generation { .. }) => StatusCode::BAD_GATEWAY,
      ApiError::Capsule(CapsuleError::Quota(_)) | ApiError::Quota(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Stable machine-readable kind for clients.
  pub fn kind(&self) -> &'static str {
    match self {
      ApiError::BadRequest(_) | ApiError::Catalog(CatalogError::EmptyName(_)) => "bad_request",
      ApiError::Catalog(CatalogError::UnknownCourse(_)) => "not_found",
      ApiError::Capsule(CapsuleError::QuotaExceeded { .. }) => "quota_exceeded",
      ApiError::Capsule(CapsuleError::Generation { .. }) => "generation_failed",
      ApiError::Capsule(CapsuleError::Quota(_)) | ApiError::Quota(_) => "quota_store",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn generation_error_mentions_both_attempts() {
    let e = CapsuleError::Generation {
      primary: BackendError::Api { status: 429, message: "insufficient_quota".into() },
      fallback: BackendError::Timeout(20),
    };
    let msg = e.to_string();
    assert!(msg.contains("HTTP 429"));
    assert!(msg.contains("insufficient_quota"));
    assert!(msg.contains("timed out after 20s"));
  }

  #[test]
  fn api_errors_map_to_status_codes() {
    let cases = [
      (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "bad_request"),
      (ApiError::Catalog(CatalogError::UnknownCourse(3)), StatusCode::NOT_FOUND, "not_found"),
      (ApiError::Capsule(CapsuleError::QuotaExceeded { limit: 1 }), StatusCode::TOO_MANY_REQUESTS, "quota_exceeded"),
      (
        ApiError::Capsule(CapsuleError::Generation {
          primary: BackendError::EmptyResponse,
          fallback: BackendError::EmptyResponse,
        }),
        StatusCode::BAD_GATEWAY,
        "generation_failed",
      ),
    ];
    for (err, status, kind) in cases {
      assert_eq!(err.status(), status);
      assert_eq!(err.kind(), kind);
    }
  }

  #[test]
  fn quota_exceeded_mentions_limit() {
    assert_eq!(
      CapsuleError::QuotaExceeded { limit: 3 }.to_string(),
      "generation quota exceeded (3 capsules)"
    );
  }
}
