//! Memoir - 个人知识图谱与会话信任/情绪分析
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **knowledge**: 知识库模型、合并、上下文排序、持久化与抽取管道
//! - **llm**: Oracle 客户端抽象与实现（OpenAI 兼容 / Ollama / Mock）
//! - **observability**: 日志初始化
//! - **parser**: Oracle 响应的容错解析
//! - **sentiment**: 信任/情绪分析与会话汇总

pub mod config;
pub mod core;
pub mod knowledge;
pub mod llm;
pub mod observability;
pub mod parser;
pub mod sentiment;

pub use crate::core::MemoirError;
pub use knowledge::{KnowledgeExtractor, KnowledgeStore};
pub use sentiment::TrustSentimentAnalyzer;
