//! Text-generation backends.
//!
//! `TextBackend` is the seam the capsule generator talks to. The only real
//! implementation is a minimal OpenAI chat.completions client that requests a
//! strict JSON object. Calls are instrumented and log model names, latencies
//! and token usage (not contents). The API key is never logged.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{BackendError, ConfigError};

#[async_trait]
pub trait TextBackend: Send + Sync {
  /// Short label for logs ("primary", "fallback").
  fn name(&self) -> &str;

  fn model(&self) -> &str;

  /// Send a system + user instruction and return the raw JSON text the model produced.
  async fn complete_json(&self, system: &str, user: &str, temperature: f32) -> Result<String, BackendError>;
}

#[derive(Clone)]
pub struct OpenAiBackend {
  name: String,
  client: reqwest::Client,
  api_key: String,
  base_url: String,
  model: String,
  timeout_secs: u64,
}

impl OpenAiBackend {
  pub fn new(
    name: &str,
    api_key: &str,
    base_url: &str,
    model: &str,
    timeout_secs: u64,
  ) -> Result<Self, ConfigError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(timeout_secs))
      .build()?;

    Ok(Self {
      name: name.to_string(),
      client,
      api_key: api_key.to_string(),
      base_url: base_url.trim_end_matches('/').to_string(),
      model: model.to_string(),
      timeout_secs,
    })
  }

  pub fn base_url(&self) -> &str { &self.base_url }
}

#[async_trait]
impl TextBackend for OpenAiBackend {
  fn name(&self) -> &str { &self.name }

  fn model(&self) -> &str { &self.model }

  #[instrument(level = "info", skip(self, system, user), fields(backend = %self.name, model = %self.model))]
  async fn complete_json(&self, system: &str, user: &str, temperature: f32) -> Result<String, BackendError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "anamnesis-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await
      .map_err(|e| self.map_transport(e))?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      warn!(status, elapsed = ?start.elapsed(), "OpenAI returned an error status");
      return Err(BackendError::Api { status, message });
    }

    let body: ChatCompletionResponse = res.json().await
      .map_err(|e| if e.is_timeout() { BackendError::Timeout(self.timeout_secs) } else { BackendError::InvalidJson(e.to_string()) })?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }

    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .map(|t| t.trim().to_string())
      .unwrap_or_default();
    info!(elapsed = ?start.elapsed(), response_len = text.len(), "Model response received");

    if text.is_empty() {
      return Err(BackendError::EmptyResponse);
    }
    Ok(text)
  }
}

impl OpenAiBackend {
  fn map_transport(&self, e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
      BackendError::Timeout(self.timeout_secs)
    } else {
      BackendError::Network(e.to_string())
    }
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::{body_partial_json, header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn backend(server: &MockServer) -> OpenAiBackend {
    OpenAiBackend::new("primary", "test-key", &format!("{}/v1", server.uri()), "gpt-4.1-mini", 5).unwrap()
  }

  #[tokio::test]
  async fn sends_bearer_key_and_json_object_format() {
    let server = MockServer::start().await;
    let content = r#"{"concept":"Little's Law","questions":[]}"#;

    Mock::given(method("POST"))
      .and(path("/v1/chat/completions"))
      .and(header("Authorization", "Bearer test-key"))
      .and(body_partial_json(serde_json::json!({
        "model": "gpt-4.1-mini",
        "response_format": {"type": "json_object"},
        "messages": [{"role": "system", "content": "sys"}, {"role": "user", "content": "usr"}]
      })))
      .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": content}, "index": 0}],
        "usage": {"prompt_tokens": 40, "completion_tokens": 15, "total_tokens": 55}
      })))
      .expect(1)
      .mount(&server)
      .await;

    let text = backend(&server).complete_json("sys", "usr", 0.7).await.unwrap();
    assert_eq!(text, content);
  }

  #[tokio::test]
  async fn http_error_maps_to_api_error_with_clean_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
      .and(path("/v1/chat/completions"))
      .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
        "error": {"message": "You exceeded your current quota", "type": "insufficient_quota"}
      })))
      .mount(&server)
      .await;

    let err = backend(&server).complete_json("sys", "usr", 0.7).await.unwrap_err();
    match err {
      BackendError::Api { status, message } => {
        assert_eq!(status, 429);
        assert_eq!(message, "You exceeded your current quota");
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test]
  async fn missing_content_is_empty_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
      .and(path("/v1/chat/completions"))
      .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": null}, "index": 0}]
      })))
      .mount(&server)
      .await;

    let err = backend(&server).complete_json("sys", "usr", 0.7).await.unwrap_err();
    assert!(matches!(err, BackendError::EmptyResponse));
  }

  #[tokio::test]
  async fn slow_server_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
      .and(path("/v1/chat/completions"))
      .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
      .mount(&server)
      .await;

    let b = OpenAiBackend::new("primary", "k", &format!("{}/v1", server.uri()), "m", 1).unwrap();
    let err = b.complete_json("sys", "usr", 0.7).await.unwrap_err();
    assert!(matches!(err, BackendError::Timeout(1)));
  }
}
