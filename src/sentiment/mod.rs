//! 信任/情绪分析：逐轮判断、分析历史汇总、会话文件

pub mod aggregator;
pub mod analyzer;
pub mod model;
pub mod persistence;

pub use aggregator::{AnalysisHistory, SessionSummary};
pub use analyzer::{AnalyzerSettings, TrustSentimentAnalyzer};
pub use model::{AnalysisRecord, AnalysisState, ChatMessage, Role};
pub use persistence::{SessionFile, SessionInfo};
