//! the network boundary: service traits, wire shapes and the requests the
//! engine hands to its host.

use crate::config::IdentityField;
use crate::scorer::{BiasLabel, classify_by_sum};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// no response: connection, dns or io failure
    #[error("network failure: {0}")]
    Network(String),
    /// the service answered with a non-success status
    #[error("server error (status {status:?}): {message}")]
    Server { status: Option<u16>, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
    /// the engine deadline elapsed first
    #[error("request timed out")]
    Timeout,
}

impl RemoteError {
    pub fn is_network(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Timeout)
    }
}

/// status check and answer submission.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait QuizService: Send + Sync {
    /// whether `identity` has already taken the quiz.
    async fn check_status(&self, identity: &str) -> Result<bool, RemoteError>;
    async fn submit(&self, answers: &[String], identity: &str) -> Result<BiasLabel, RemoteError>;
}

/// freeform assistant replies.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ChatService: Send + Sync {
    async fn chat(&self, prompt: &str, identity: &str) -> Result<String, RemoteError>;
}

// ---------------------- wire shapes ----------------------

#[derive(Debug, Serialize)]
pub struct StatusBody<'a> {
    pub username: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct StatusReply {
    pub taken: bool,
}

/// submit body; the identity field name depends on the deployment.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SubmitBody<'a> {
    Username { answers: &'a [String], username: &'a str },
    UserId { answers: &'a [String], user_id: &'a str },
}

impl<'a> SubmitBody<'a> {
    pub fn new(field: IdentityField, answers: &'a [String], identity: &'a str) -> Self {
        match field {
            IdentityField::Username => SubmitBody::Username { answers, username: identity },
            IdentityField::UserId => SubmitBody::UserId { answers, user_id: identity },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitReply {
    pub bias: BiasLabel,
}

#[derive(Debug, Serialize)]
pub struct ChatBody<'a> {
    pub prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct ChatReply {
    pub response: String,
}

pub fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, RemoteError> {
    serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))
}

// ---------------------- engine <-> host ----------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRequest {
    Status { identity: String },
    Submit { answers: Vec<String>, identity: String },
    Chat { prompt: String, identity: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteReply {
    Status { taken: bool },
    Bias(BiasLabel),
    Text(String),
}

/// a call the engine wants performed. the outcome goes back through
/// `ConversationEngine::complete` with the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub id: RequestId,
    pub request: RemoteRequest,
}

pub async fn execute(
    request: &RemoteRequest,
    quiz: &dyn QuizService,
    chat: &dyn ChatService,
) -> Result<RemoteReply, RemoteError> {
    match request {
        RemoteRequest::Status { identity } => quiz
            .check_status(identity)
            .await
            .map(|taken| RemoteReply::Status { taken }),
        RemoteRequest::Submit { answers, identity } => {
            quiz.submit(answers, identity).await.map(RemoteReply::Bias)
        }
        RemoteRequest::Chat { prompt, identity } => {
            chat.chat(prompt, identity).await.map(RemoteReply::Text)
        }
    }
}

// ---------------------- offline quiz service ----------------------

/// in-process quiz service: remembers one bias per identity and scores
/// answers with the server's summing rule.
#[derive(Debug, Default)]
pub struct OfflineQuizService {
    biases: Mutex<HashMap<String, BiasLabel>>,
}

impl OfflineQuizService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bias_for(&self, identity: &str) -> Option<BiasLabel> {
        self.biases.lock().ok()?.get(identity).copied()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl QuizService for OfflineQuizService {
    async fn check_status(&self, identity: &str) -> Result<bool, RemoteError> {
        let biases = self
            .biases
            .lock()
            .map_err(|_| RemoteError::Server { status: None, message: "bias store poisoned".into() })?;
        Ok(biases.contains_key(identity))
    }

    async fn submit(&self, answers: &[String], identity: &str) -> Result<BiasLabel, RemoteError> {
        let bias = classify_by_sum(answers);
        if !identity.is_empty() {
            let mut biases = self.biases.lock().map_err(|_| RemoteError::Server {
                status: None,
                message: "bias store poisoned".into(),
            })?;
            biases.insert(identity.to_string(), bias);
        }
        Ok(bias)
    }
}
