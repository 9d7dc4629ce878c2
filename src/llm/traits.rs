//! Oracle 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Ollama / Mock）实现 LlmClient：generate 一次请求一次响应，
//! 不做重试；失败以 LlmError::Transport 返回，由上层决定如何记录。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::UsageTotals;

/// 单次生成请求：system + user 两段 prompt 与采样参数
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            max_tokens: 800,
            temperature: 0.0,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Oracle 调用失败（传输层）。解析问题不在此列，由 parser 降级处理
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Oracle transport failure: {0}")]
    Transport(String),

    #[error("Oracle returned no choices")]
    EmptyResponse,
}

/// Oracle 客户端 trait：返回未经结构化的原始文本
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError>;

    /// 当前使用的模型名，写入 AnalysisRecord.model_used 与会话快照
    fn model_name(&self) -> &str;

    /// 本客户端累计的 token 数；不计量的后端返回全 0
    fn token_usage(&self) -> UsageTotals {
        UsageTotals::default()
    }
}
