//! Mock Oracle 客户端（用于测试，无需 API）
//!
//! 按顺序回放预置的响应或传输错误；脚本耗尽后回显 `{}`，并记录收到的请求便于断言 prompt 内容。
//! token 计量按空白分词近似：prompt 为 system + user 的词数，completion 为响应词数。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{GenerationRequest, LlmClient, LlmError, UsageMeter, UsageTotals};

/// Mock 客户端：脚本化的响应队列
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    usage: UsageMeter,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定的原始文本
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::new();
        for r in responses {
            mock.push_response(r);
        }
        mock
    }

    pub fn push_response(&self, raw: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(raw.into()));
        }
    }

    /// 下一次调用返回传输错误
    pub fn push_failure(&self, reason: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(LlmError::Transport(reason.into())));
        }
    }

    /// 已收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let raw = next.unwrap_or_else(|| Ok("{}".to_string()))?;

        let prompt = word_count(&request.system_prompt) + word_count(&request.user_prompt);
        self.usage.record(prompt, word_count(&raw));
        Ok(raw)
    }

    fn model_name(&self) -> &str {
        "mock"
    }

    fn token_usage(&self) -> UsageTotals {
        self.usage.totals()
    }
}

fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}
