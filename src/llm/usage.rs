//! Token 计量：客户端内累计，会话结束时写入会话文件

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// 某一时刻的累计 token 数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// 可在 `&self` 下累加的计数器（LlmClient::generate 只拿到共享引用）
#[derive(Debug, Default)]
pub struct UsageMeter {
    prompt: AtomicU64,
    completion: AtomicU64,
}

impl UsageMeter {
    pub fn record(&self, prompt: u64, completion: u64) {
        self.prompt.fetch_add(prompt, Ordering::Relaxed);
        self.completion.fetch_add(completion, Ordering::Relaxed);
    }

    pub fn totals(&self) -> UsageTotals {
        let prompt_tokens = self.prompt.load(Ordering::Relaxed);
        let completion_tokens = self.completion.load(Ordering::Relaxed);
        UsageTotals {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}
