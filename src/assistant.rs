//! chat service backed directly by an `llm` provider, for running the
//! widget without the chat endpoint.

use crate::remote::{ChatService, RemoteError};
use async_trait::async_trait;
use llm::LLMProvider;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;
use llm::error::LLMError;
use std::sync::Arc;

pub const ASSISTANT_PERSONA: &str =
    "You are a helpful and unbiased political news assistant.";

#[derive(Clone)]
pub struct AssistantChatService {
    provider: Arc<dyn LLMProvider>,
}

impl AssistantChatService {
    /// wraps a provider you built yourself. give it a system prompt; this
    /// service only sends the user turn.
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    /// openai-compatible backend with the assistant persona as system prompt.
    pub fn openai(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        let api_key = api_key.into();
        let mut b = LLMBuilder::new()
            .backend(LLMBackend::OpenAI)
            .base_url(base_url.into())
            .model(model.into())
            .system(ASSISTANT_PERSONA)
            .temperature(0.7);
        if !api_key.is_empty() {
            b = b.api_key(api_key);
        }
        let provider: Arc<dyn LLMProvider> = b.build().map_err(map_llm_error)?.into();
        Ok(Self::new(provider))
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ChatService for AssistantChatService {
    async fn chat(&self, prompt: &str, _identity: &str) -> Result<String, RemoteError> {
        let messages = vec![ChatMessage::user().content(prompt).build()];
        let resp = self.provider.chat(&messages).await.map_err(map_llm_error)?;
        Ok(resp.text().unwrap_or_default().trim().to_string())
    }
}

fn map_llm_error(err: LLMError) -> RemoteError {
    match err {
        LLMError::HttpError(msg) => RemoteError::Network(msg),
        other => RemoteError::Server { status: None, message: other.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_map_to_network() {
        let err = map_llm_error(LLMError::HttpError("connection reset".into()));
        assert_eq!(err, RemoteError::Network("connection reset".into()));
    }

    #[test]
    fn provider_errors_map_to_server() {
        let err = map_llm_error(LLMError::ProviderError("quota".into()));
        assert!(matches!(err, RemoteError::Server { status: None, .. }));
        assert!(!err.is_network());
    }
}
