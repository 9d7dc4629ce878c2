//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；Ollama、OpenAI、自建代理均可。

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{GenerationRequest, LlmClient, LlmError, UsageMeter, UsageTotals};

/// OpenAI 兼容客户端：持有 Client 与 model 名，generate 时拼 system + user 两条消息并取首条 content
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    base_url: Option<String>,
    usage: UsageMeter,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url)
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            base_url: base_url.map(String::from),
            usage: UsageMeter::default(),
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    fn to_openai_messages(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system_prompt.clone())
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(request.user_prompt.clone())
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(vec![
            ChatCompletionRequestMessage::System(system),
            ChatCompletionRequestMessage::User(user),
        ])
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn token_usage(&self) -> UsageTotals {
        self.usage.totals()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(request)?)
            .max_completion_tokens(request.max_tokens)
            .temperature(request.temperature)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if let Some(usage) = &response.usage {
            self.usage
                .record(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let choice = response.choices.first().ok_or(LlmError::EmptyResponse)?;
        Ok(choice.message.content.clone().unwrap_or_default())
    }
}
