//! 信任/情绪分析管道：聊天历史 → prompt → Oracle → 解析 → 写入分析历史
//!
//! 不重试；传输失败写入一条 error 记录后返回，不向上抛出。

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::config::AppConfig;
use crate::llm::{GenerationRequest, LlmClient, UsageTotals};
use crate::parser::{self, AnalysisJudgment};
use crate::sentiment::aggregator::AnalysisHistory;
use crate::sentiment::model::{AnalysisRecord, AnalysisState, ChatMessage};

const ANALYST_SYSTEM_PROMPT: &str =
    "You are a therapeutic conversation analyst. Respond only with valid JSON.";

#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    /// prompt 中携带的最近消息条数
    pub history_window: usize,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.1,
            history_window: 3,
        }
    }
}

pub struct TrustSentimentAnalyzer {
    llm: Arc<dyn LlmClient>,
    settings: AnalyzerSettings,
    chat_history: Vec<ChatMessage>,
    history: AnalysisHistory,
}

impl TrustSentimentAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            settings: AnalyzerSettings::default(),
            chat_history: Vec::new(),
            history: AnalysisHistory::new(),
        }
    }

    pub fn from_config(llm: Arc<dyn LlmClient>, config: &AppConfig) -> Self {
        Self::new(llm).with_settings(AnalyzerSettings {
            max_tokens: config.analysis.max_tokens,
            temperature: config.analysis.temperature,
            history_window: config.analysis.history_window,
        })
    }

    pub fn with_settings(mut self, settings: AnalyzerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    pub fn token_usage(&self) -> UsageTotals {
        self.llm.token_usage()
    }

    pub fn chat_history(&self) -> &[ChatMessage] {
        &self.chat_history
    }

    pub fn history(&self) -> &AnalysisHistory {
        &self.history
    }

    pub fn add_user_message(&mut self, message: impl Into<String>) {
        self.chat_history.push(ChatMessage::user(message));
    }

    /// 分析 prompt：最近 history_window 条消息 + 当前消息 + 输出 JSON 格式
    pub fn build_request(&self, current_message: &str) -> GenerationRequest {
        let start = self
            .chat_history
            .len()
            .saturating_sub(self.settings.history_window);
        let history_text: String = self.chat_history[start..]
            .iter()
            .enumerate()
            .map(|(i, msg)| format!("Message {}: {}\n", i + 1, msg.content))
            .collect();

        let prompt = format!(
            r#"You are an AI analyst for therapeutic conversations. Analyze trust and sentiment patterns.

Recent conversation context:
{history_text}
Current message: {current_message}

Analyze these aspects:
1. Trust trend: INCREASING/DECREASING/STABLE
2. Sentiment: IMPROVING/DECLINING/NEUTRAL

Consider:
- Openness and willingness to share
- Emotional tone and language
- Engagement level
- Resistance or cooperation

Return ONLY this JSON format:
{{
    "trust_trend": "INCREASING|DECREASING|STABLE",
    "trust_confidence": 0.8,
    "sentiment_trend": "IMPROVING|DECLINING|NEUTRAL",
    "sentiment_confidence": 0.8,
    "key_indicators": ["indicator1", "indicator2"],
    "analysis_summary": "Brief explanation"
}}

JSON only, no other text."#
        );

        GenerationRequest::new(ANALYST_SYSTEM_PROMPT, prompt)
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature)
    }

    /// 分析一条消息并写入历史，返回终态与写入的记录
    pub async fn analyze(&mut self, current_message: &str) -> (AnalysisState, AnalysisRecord) {
        let request = self.build_request(current_message);
        let started = Instant::now();

        let (state, record) = match self.llm.generate(&request).await {
            Ok(raw) => {
                let outcome = parser::parse::<AnalysisJudgment>(&raw);
                let elapsed = round_seconds(started.elapsed().as_secs_f64());
                let state = if outcome.is_fallback {
                    AnalysisState::RecordedFallback
                } else {
                    AnalysisState::Recorded
                };
                let record = AnalysisRecord::new(
                    outcome.record,
                    elapsed,
                    self.llm.model_name(),
                    Utc::now(),
                );
                (state, record)
            }
            Err(e) => {
                tracing::warn!("Trust/sentiment analysis transport failure: {}", e);
                let record =
                    AnalysisRecord::from_error(e.to_string(), self.llm.model_name(), Utc::now());
                (AnalysisState::ErrorRecorded, record)
            }
        };

        tracing::info!(
            state = ?state,
            trust = %record.judgment.trust_trend,
            sentiment = %record.judgment.sentiment_trend,
            seconds = record.processing_time_seconds,
            "Analysis recorded"
        );
        self.history.record(record.clone());
        (state, record)
    }
}

fn round_seconds(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
