//! conversation and endpoint configuration.
//!
//! everything has a default; json files and env vars only override what
//! they name.

use crate::scorer::BiasLabel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

/// who turns quiz answers into a bias label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    /// answers are agree/disagree; the axis rule runs in-process
    Local,
    /// answers are sent verbatim to the quiz service
    #[default]
    Remote,
}

impl std::str::FromStr for ScoringMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(ScoringMode::Local),
            "remote" => Ok(ScoringMode::Remote),
            _ => Err(ConfigError::InvalidValue { key: "scoring", value: s.to_string() }),
        }
    }
}

/// bot-side texts. `result` must contain `{bias}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prompts {
    pub invitation: String,
    pub declined: String,
    pub welcome_back: String,
    pub result: String,
    pub chat_fallback: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            invitation: "Do you want to take a bias quiz to curate a for you page?".into(),
            declined: "Okay! Feel free to ask me anything else.".into(),
            welcome_back: "Welcome back! Type \"retake\" to retake the quiz.".into(),
            result: "Thanks! Your political leaning is: {bias}".into(),
            chat_fallback: "Oops! Something went wrong.".into(),
        }
    }
}

impl Prompts {
    pub fn result_for(&self, bias: BiasLabel) -> String {
        self.result.replace("{bias}", bias.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub scoring: ScoringMode,
    /// ask the quiz service whether this identity already took the quiz
    pub check_status: bool,
    pub request_timeout_ms: u64,
    /// sends accepted while a call is in flight; beyond this they are rejected
    pub max_queued: usize,
    /// reported when the quiz service cannot score the answers
    pub fallback_bias: BiasLabel,
    /// run assistant replies through `text::strip_labels`
    pub strip_reply_labels: bool,
    pub prompts: Prompts,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringMode::Remote,
            check_status: true,
            request_timeout_ms: 15_000,
            max_queued: 4,
            fallback_bias: BiasLabel::Center,
            strip_reply_labels: false,
            prompts: Prompts::default(),
        }
    }
}

impl ConversationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// defaults overridden by `QUIZ_CHAT_SCORING` and `QUIZ_CHAT_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("QUIZ_CHAT_SCORING") {
            cfg.scoring = v.parse()?;
        }
        if let Ok(v) = std::env::var("QUIZ_CHAT_TIMEOUT_MS") {
            cfg.request_timeout_ms = parse_millis("QUIZ_CHAT_TIMEOUT_MS", &v)?;
        }
        Ok(cfg)
    }
}

/// which json field carries the identity in submit requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityField {
    #[default]
    Username,
    /// legacy `{answers, user_id}` submit body
    UserId,
}

impl std::str::FromStr for IdentityField {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "username" => Ok(IdentityField::Username),
            "user_id" | "userid" => Ok(IdentityField::UserId),
            _ => Err(ConfigError::InvalidValue { key: "identity_field", value: s.to_string() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub base_url: String,
    pub status_path: String,
    pub submit_path: String,
    pub chat_path: String,
    pub identity_field: IdentityField,
    /// transport-level timeout; the engine applies its own deadline as well
    pub timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".into(),
            status_path: "/api/quiz/status".into(),
            submit_path: "/api/quiz/submit".into(),
            chat_path: "/api/petrichor/chat".into(),
            identity_field: IdentityField::Username,
            timeout_ms: 15_000,
        }
    }
}

impl EndpointConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Default::default() }
    }

    /// older deployments: `POST /api/quiz {answers, user_id}`.
    pub fn legacy(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            submit_path: "/api/quiz".into(),
            identity_field: IdentityField::UserId,
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn status_url(&self) -> String {
        join_url(&self.base_url, &self.status_path)
    }

    pub fn submit_url(&self) -> String {
        join_url(&self.base_url, &self.submit_path)
    }

    pub fn chat_url(&self) -> String {
        join_url(&self.base_url, &self.chat_path)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// defaults overridden by `QUIZ_CHAT_BASE_URL`, `QUIZ_CHAT_IDENTITY_FIELD`
    /// and `QUIZ_CHAT_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("QUIZ_CHAT_BASE_URL") {
            cfg.base_url = v;
        }
        if let Ok(v) = std::env::var("QUIZ_CHAT_IDENTITY_FIELD") {
            cfg.identity_field = v.parse()?;
        }
        if let Ok(v) = std::env::var("QUIZ_CHAT_TIMEOUT_MS") {
            cfg.timeout_ms = parse_millis("QUIZ_CHAT_TIMEOUT_MS", &v)?;
        }
        Ok(cfg)
    }
}

fn parse_millis(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value: value.to_string() })
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
