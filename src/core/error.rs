//! 管道错误类型
//!
//! 只有 Oracle 传输失败对调用方可见；响应格式错误（MalformedResponse）与字段缺失（SchemaGap）
//! 在 parser 内部降级为 fallback / 默认值，不出现在这里。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum MemoirError {
    #[error(transparent)]
    OracleTransport(#[from] LlmError),

    #[error(transparent)]
    Persistence(#[from] anyhow::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}
