//! `OpenAI`-compatible [`GenerativeBackend`] adapter.
//!
//! Gated behind the `openai-backend` feature so the core stays
//! backend-agnostic by default. Supports any `OpenAI`-compatible chat
//! completion API (`OpenAI` itself, Azure, local proxies) via the base
//! URL override.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use async_trait::async_trait;

use crate::collaborators::traits::{GenerationRequest, GenerativeBackend};
use crate::error::GenerationError;

/// A [`GenerativeBackend`] backed by an `OpenAI`-compatible chat
/// completion API.
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiBackend {
    /// Creates a backend targeting `model`, authenticating with
    /// `api_key`. `base_url` overrides the default endpoint, for
    /// Azure/proxy deployments.
    #[must_use]
    pub fn new(api_key: &str, model: impl Into<String>, base_url: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = base_url {
            config = config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }
}

#[async_trait]
impl GenerativeBackend for OpenAiBackend {
    fn model_label(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(
                    request.system_instruction.clone(),
                ),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(request.user_prompt.clone()),
                name: None,
            }),
        ];

        let openai_request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(request.temperature),
            top_p: request.top_p,
            max_completion_tokens: Some(request.max_output_tokens),
            ..Default::default()
        };

        let response = self.client.chat().create(openai_request).await.map_err(|e| {
            classify_api_error(&e.to_string())
        })?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| GenerationError::InvalidArgument("empty completion".to_string()))
    }
}

/// Maps an `async-openai` error string onto [`GenerationError`]'s kinds.
///
/// The SDK does not expose a structured status code on every error path,
/// so classification falls back to substring matching on well-known
/// phrasing; this is a known limitation, not a complete taxonomy.
fn classify_api_error(message: &str) -> GenerationError {
    let lowered = message.to_lowercase();
    if lowered.contains("rate limit") || lowered.contains("429") {
        GenerationError::RateLimited {
            retry_after_secs: 1,
        }
    } else if lowered.contains("unauthorized")
        || lowered.contains("401")
        || lowered.contains("api key")
    {
        GenerationError::Configuration(message.to_string())
    } else if lowered.contains("timed out") || lowered.contains("timeout") {
        GenerationError::Timeout
    } else {
        GenerationError::Transient {
            attempts: 1,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_errors() {
        assert!(matches!(
            classify_api_error("429 Too Many Requests"),
            GenerationError::RateLimited { .. }
        ));
    }

    #[test]
    fn classifies_auth_errors_as_configuration() {
        assert!(matches!(
            classify_api_error("401 Unauthorized: invalid api key"),
            GenerationError::Configuration(_)
        ));
    }

    #[test]
    fn classifies_unknown_errors_as_transient() {
        assert!(matches!(
            classify_api_error("connection reset by peer"),
            GenerationError::Transient { .. }
        ));
    }
}
