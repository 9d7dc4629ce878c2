//! Ollama 本地模型客户端（OpenAI 兼容格式）
//!
//! Ollama 在 `/v1` 下提供 OpenAI 兼容接口，api_key 必填但不校验。
//! - Base URL: http://localhost:11434/v1
//! - 抽取默认模型: llama3.2:3b；分析默认模型: qwen2.5:3b（`OLLAMA_MODEL` 可覆盖两者）

use crate::llm::OpenAiClient;

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const OLLAMA_EXTRACTION_MODEL: &str = "llama3.2:3b";
pub const OLLAMA_ANALYSIS_MODEL: &str = "qwen2.5:3b";

/// 创建 Ollama 客户端
///
/// - host 优先取参数，其次 `OLLAMA_HOST` 环境变量（不含 `/v1` 时自动补齐）
/// - 模型优先取参数，其次 `OLLAMA_MODEL`，最后回退到 `default_model`
pub fn create_ollama_client(
    host: Option<&str>,
    model: Option<&str>,
    default_model: &str,
) -> OpenAiClient {
    let host = host
        .map(String::from)
        .or_else(|| std::env::var("OLLAMA_HOST").ok())
        .map(|h| normalize_host(&h))
        .unwrap_or_else(|| OLLAMA_BASE_URL.to_string());

    let model = resolve_model(model, std::env::var("OLLAMA_MODEL").ok(), default_model);

    OpenAiClient::new(Some(&host), &model, Some("ollama"))
}

fn resolve_model(model: Option<&str>, env_model: Option<String>, default_model: &str) -> String {
    model
        .map(String::from)
        .or(env_model.filter(|m| !m.trim().is_empty()))
        .unwrap_or_else(|| default_model.to_string())
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.ends_with("/v1") {
        host.to_string()
    } else {
        format!("{}/v1", host)
    }
}
