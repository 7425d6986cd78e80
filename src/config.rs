//! Configuration: optional TOML agent config (prompts, quota, OpenAI, secrets)
//! merged with environment variables. Env wins over the file.
//!
//! See `AgentConfig` for the file schema and `Settings` for the resolved view.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_PRIMARY_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_FALLBACK_MODEL: &str = "gpt-4.1-nano";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_QUOTA_LIMIT: u32 = 500;
pub const DEFAULT_QUOTA_PATH: &str = "./data/quota.json";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)] pub prompts: Prompts,
  #[serde(default)] pub quota: QuotaCfg,
  #[serde(default)] pub openai: OpenAiCfg,
  #[serde(default)] pub secrets: Secrets,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct QuotaCfg {
  #[serde(default)] pub limit: Option<u32>,
  #[serde(default)] pub path: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct OpenAiCfg {
  #[serde(default)] pub base_url: Option<String>,
  #[serde(default)] pub primary_model: Option<String>,
  #[serde(default)] pub fallback_model: Option<String>,
  #[serde(default)] pub timeout_secs: Option<u64>,
}

/// Secrets store section. Only consulted when the env var is absent.
#[derive(Clone, Deserialize, Default)]
pub struct Secrets {
  #[serde(default)] pub openai_api_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Secrets")
      .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
      .finish()
  }
}

/// Prompts used for capsule generation. Templates take `{roles}`, `{mode}`,
/// `{course_topic}` and `{mode_focus}`; the focus is one of the three per-mode
/// blocks below.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub capsule_system: String,
  pub capsule_user_template: String,
  pub career_focus: String,
  pub course_focus: String,
  pub mix_focus: String,
  pub temperature: f32,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      capsule_system: "You are Anamnesis AI, a personal learning and memory co-pilot.\n\
        You help the user remember and apply key concepts for roles like Product Manager, \
        Supply Chain Analyst, TPM and Analytics, and refresh topics from courses they have already taken.\n\
        \n\
        You must:\n\
        - Explain ONE concept clearly and briefly.\n\
        - Generate TWO quiz questions about it, with short expected answers.\n\
        - Keep it practical and beginner-friendly.\n\
        - Focus on understanding and recall, not heavy math.\n\
        \n\
        Return ONLY valid JSON with keys:\n\
        - \"concept\": string\n\
        - \"questions\": list of exactly two {\"question\": string, \"expected_answer\": string}".into(),
      capsule_user_template: "User target roles: {roles}\n\
        Mode: {mode}\n\
        Selected course/topic for review (if any): {course_topic}\n\
        \n\
        {mode_focus}\n\
        \n\
        Keep everything short and clear.".into(),
      career_focus: "Focus on a concept that is important for their target roles.".into(),
      course_focus: "Focus on the given course/topic for review.\n\
        Assume they have seen this concept before in a course and need a refresher.\n\
        Emphasize recall and practical intuition.".into(),
      mix_focus: "Choose a concept that is relevant both for their roles and as something \
        that could reasonably come from a course.".into(),
      temperature: 0.7,
    }
  }
}

/// Fully resolved runtime settings.
#[derive(Clone)]
pub struct Settings {
  pub api_key: String,
  pub base_url: String,
  pub primary_model: String,
  pub fallback_model: String,
  pub timeout_secs: u64,
  pub quota_limit: u32,
  pub quota_path: PathBuf,
  pub prompts: Prompts,
}

impl std::fmt::Debug for Settings {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Settings")
      .field("api_key", &"***")
      .field("base_url", &self.base_url)
      .field("primary_model", &self.primary_model)
      .field("fallback_model", &self.fallback_model)
      .field("timeout_secs", &self.timeout_secs)
      .field("quota_limit", &self.quota_limit)
      .field("quota_path", &self.quota_path)
      .finish()
  }
}

impl Settings {
  /// Load the optional TOML file from AGENT_CONFIG_PATH and merge process env.
  pub fn from_env() -> Result<Self, ConfigError> {
    let cfg = load_agent_config_from_env()?.unwrap_or_default();
    Self::resolve(cfg, |k| std::env::var(k).ok())
  }

  /// Merge a parsed config with an env lookup. A missing API key is fatal.
  pub fn resolve(cfg: AgentConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    let api_key = non_empty(env("OPENAI_API_KEY"))
      .or_else(|| non_empty(cfg.secrets.openai_api_key.clone()))
      .ok_or(ConfigError::MissingApiKey)?;

    let base_url = non_empty(env("OPENAI_BASE_URL"))
      .or(cfg.openai.base_url)
      .unwrap_or_else(|| DEFAULT_BASE_URL.into());
    let primary_model = non_empty(env("OPENAI_PRIMARY_MODEL"))
      .or(cfg.openai.primary_model)
      .unwrap_or_else(|| DEFAULT_PRIMARY_MODEL.into());
    let fallback_model = non_empty(env("OPENAI_FALLBACK_MODEL"))
      .or(cfg.openai.fallback_model)
      .unwrap_or_else(|| DEFAULT_FALLBACK_MODEL.into());
    let timeout_secs = parse_env::<u64>(&env, "OPENAI_TIMEOUT_SECS")?
      .or(cfg.openai.timeout_secs)
      .unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
      return Err(ConfigError::InvalidValue {
        key: "OPENAI_TIMEOUT_SECS",
        value: timeout_secs.to_string(),
        reason: "timeout must be at least one second",
      });
    }
    let quota_limit = parse_env::<u32>(&env, "QUOTA_LIMIT")?
      .or(cfg.quota.limit)
      .unwrap_or(DEFAULT_QUOTA_LIMIT);
    let quota_path = non_empty(env("QUOTA_PATH"))
      .map(PathBuf::from)
      .or(cfg.quota.path)
      .unwrap_or_else(|| PathBuf::from(DEFAULT_QUOTA_PATH));

    Ok(Self {
      api_key,
      base_url: base_url.trim_end_matches('/').to_string(),
      primary_model,
      fallback_model,
      timeout_secs,
      quota_limit,
      quota_path,
      prompts: cfg.prompts,
    })
  }
}

/// Numeric env override. Unset or blank means `None`; anything else must parse.
fn parse_env<T: std::str::FromStr>(
  env: &impl Fn(&str) -> Option<String>,
  key: &'static str,
) -> Result<Option<T>, ConfigError> {
  let Some(raw) = env(key) else { return Ok(None) };
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Ok(None);
  }
  trimmed
    .parse::<T>()
    .map(Some)
    .map_err(|_| ConfigError::InvalidValue { key, value: raw, reason: "not a non-negative integer" })
}

/// Load `AgentConfig` from AGENT_CONFIG_PATH. Unset means `Ok(None)`; a set but
/// unreadable or invalid file is a startup error.
pub fn load_agent_config_from_env() -> Result<Option<AgentConfig>, ConfigError> {
  let Some(path) = std::env::var("AGENT_CONFIG_PATH").ok() else { return Ok(None) };
  let s = std::fs::read_to_string(&path)
    .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
  let cfg = parse_agent_config(&path, &s)?;
  info!(target: "anamnesis_backend", %path, "Loaded agent config (TOML)");
  Ok(Some(cfg))
}

pub fn parse_agent_config(path: &str, s: &str) -> Result<AgentConfig, ConfigError> {
  toml::from_str::<AgentConfig>(s).map_err(|source| ConfigError::Parse { path: path.to_string(), source })
}
