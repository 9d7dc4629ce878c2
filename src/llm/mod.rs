//! Oracle 层：客户端抽象与实现（OpenAI 兼容 / Ollama / Mock）

pub mod mock;
pub mod ollama;
pub mod openai;
pub mod traits;
pub mod usage;

pub use mock::MockLlmClient;
pub use ollama::{
    create_ollama_client, OLLAMA_ANALYSIS_MODEL, OLLAMA_BASE_URL, OLLAMA_EXTRACTION_MODEL,
};
pub use openai::OpenAiClient;
pub use traits::{GenerationRequest, LlmClient, LlmError};
pub use usage::{UsageMeter, UsageTotals};
