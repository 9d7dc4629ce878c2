//! 会话文件：模型信息、聊天历史、分析历史，整体覆盖写入

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::UsageTotals;
use crate::sentiment::aggregator::AnalysisHistory;
use crate::sentiment::analyzer::TrustSentimentAnalyzer;
use crate::sentiment::model::ChatMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub model_used: String,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// 分析客户端在本会话累计的 token 数
    #[serde(default)]
    pub token_usage: UsageTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFile {
    pub session_info: SessionInfo,
    pub chat_history: Vec<ChatMessage>,
    pub analysis_history: AnalysisHistory,
    pub session_end: DateTime<Utc>,
}

impl SessionFile {
    /// 以当前时间作为 session_end 生成快照
    pub fn snapshot(analyzer: &TrustSentimentAnalyzer, base_url: Option<&str>) -> Self {
        let settings = analyzer.settings();
        Self {
            session_info: SessionInfo {
                model_used: analyzer.model_name().to_string(),
                max_tokens: settings.max_tokens,
                temperature: settings.temperature,
                base_url: base_url.map(String::from),
                token_usage: analyzer.token_usage(),
            },
            chat_history: analyzer.chat_history().to_vec(),
            analysis_history: analyzer.history().clone(),
            session_end: Utc::now(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data).with_context(|| format!("failed to write session {:?}", path))?;
        tracing::info!("Session saved to {:?}", path);
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read session {:?}", path))?;
        serde_json::from_str(&data).with_context(|| format!("failed to decode session {:?}", path))
    }
}
