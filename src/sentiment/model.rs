//! 会话数据：聊天消息与分析记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parser::AnalysisJudgment;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 聊天历史中的单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// 一次分析的完整记录；写入历史后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    #[serde(flatten)]
    pub judgment: AnalysisJudgment,
    pub processing_time_seconds: f64,
    pub model_used: String,
    pub timestamp: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(
        judgment: AnalysisJudgment,
        processing_time_seconds: f64,
        model_used: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            judgment,
            processing_time_seconds,
            model_used: model_used.into(),
            timestamp,
        }
    }

    /// 传输失败：中性判断 + error，耗时记 0
    pub fn from_error(
        error: impl Into<String>,
        model_used: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(AnalysisJudgment::failed(error), 0.0, model_used, timestamp)
    }

    pub fn error(&self) -> Option<&str> {
        self.judgment.error.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.judgment.error.is_none()
    }
}

/// 单次分析调用的终态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisState {
    /// 响应通过校验（缺失字段已补默认值）后写入历史
    Recorded,
    /// 响应无法解析，fallback 判断写入历史
    RecordedFallback,
    /// Oracle 传输失败，错误记录写入历史
    ErrorRecorded,
}
