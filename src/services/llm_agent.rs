use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, Role, CreateChatCompletionRequest,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent,
    },
    Client,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AppError;

static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{[\s\S]*\}").expect("static pattern is valid")
});

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u16,
}

/// Text in, text out. Everything the service asks of a language model goes
/// through this seam so that callers can swap the backend.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AppError>;
}

/// Returns the outermost `{...}` block of a model reply, if any.
pub fn extract_json_object(response: &str) -> Option<&str> {
    JSON_OBJECT.find(response).map(|m| m.as_str())
}

pub struct LlmAgent {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl LlmAgent {
    pub fn new(api_key: &str, model: &str, api_base: Option<&str>, timeout: Duration) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl CompletionClient for LlmAgent {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AppError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: request.system,
                    name: None,
                    role: Role::System,
                }
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(request.user),
                    name: None,
                    role: Role::User,
                }
            ),
        ];

        let chat_request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(0.1),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let start = std::time::Instant::now();
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(chat_request))
            .await
            .map_err(|_| AppError::Service(format!("AI request timed out after {:?}", self.timeout)))?
            .map_err(|e| AppError::Service(e.to_string()))?;
        tracing::debug!("Completion from {} took {:?}", self.model, start.elapsed());

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }
}
