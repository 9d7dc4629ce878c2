//! 信任/情绪分析响应
//!
//! 必填字段缺失时按显式默认表补齐（趋势 → STABLE / NEUTRAL，置信度 → 0.5），不拒绝整条记录。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{lenient_confidence, scalar_to_string, truncate_chars, OracleRecord};

/// fallback 记录的 error 字段
pub const PARSE_FAILURE_ERROR: &str = "response_parsing_failed";

/// fallback 保留的原始响应最大字符数
const RAW_RESPONSE_PREVIEW_CHARS: usize = 200;

/// 置信度缺省值
const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrustTrend {
    Increasing,
    Decreasing,
    #[default]
    Stable,
}

impl TrustTrend {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "INCREASING" => Some(TrustTrend::Increasing),
            "DECREASING" => Some(TrustTrend::Decreasing),
            "STABLE" => Some(TrustTrend::Stable),
            _ => None,
        }
    }
}

impl std::fmt::Display for TrustTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustTrend::Increasing => write!(f, "INCREASING"),
            TrustTrend::Decreasing => write!(f, "DECREASING"),
            TrustTrend::Stable => write!(f, "STABLE"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentTrend {
    Improving,
    Declining,
    #[default]
    Neutral,
}

impl SentimentTrend {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "IMPROVING" => Some(SentimentTrend::Improving),
            "DECLINING" => Some(SentimentTrend::Declining),
            "NEUTRAL" => Some(SentimentTrend::Neutral),
            _ => None,
        }
    }
}

impl std::fmt::Display for SentimentTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentimentTrend::Improving => write!(f, "IMPROVING"),
            SentimentTrend::Declining => write!(f, "DECLINING"),
            SentimentTrend::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// 必填字段与其缺省值：每个字段一条，不做字段名模式匹配
#[derive(Debug, Clone, Copy, PartialEq)]
enum FieldDefault {
    Trust(TrustTrend),
    Sentiment(SentimentTrend),
    TrustConfidence(f64),
    SentimentConfidence(f64),
}

const REQUIRED_FIELDS: [(&str, FieldDefault); 4] = [
    ("trust_trend", FieldDefault::Trust(TrustTrend::Stable)),
    ("sentiment_trend", FieldDefault::Sentiment(SentimentTrend::Neutral)),
    ("trust_confidence", FieldDefault::TrustConfidence(DEFAULT_CONFIDENCE)),
    ("sentiment_confidence", FieldDefault::SentimentConfidence(DEFAULT_CONFIDENCE)),
];

/// Oracle 对单轮对话的判断（已校验、已补默认值）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJudgment {
    pub trust_trend: TrustTrend,
    pub trust_confidence: f64,
    pub sentiment_trend: SentimentTrend,
    pub sentiment_confidence: f64,
    #[serde(default)]
    pub key_indicators: Vec<String>,
    #[serde(default)]
    pub analysis_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for AnalysisJudgment {
    fn default() -> Self {
        Self {
            trust_trend: TrustTrend::Stable,
            trust_confidence: DEFAULT_CONFIDENCE,
            sentiment_trend: SentimentTrend::Neutral,
            sentiment_confidence: DEFAULT_CONFIDENCE,
            key_indicators: Vec::new(),
            analysis_summary: String::new(),
            raw_response: None,
            error: None,
        }
    }
}

impl AnalysisJudgment {
    /// 传输失败时的中性判断，error 记录失败原因
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        let mut judgment = Self::default();

        for (name, default) in REQUIRED_FIELDS {
            let value = obj.get(name);
            match default {
                FieldDefault::Trust(d) => {
                    judgment.trust_trend = value
                        .and_then(Value::as_str)
                        .and_then(TrustTrend::from_label)
                        .unwrap_or(d);
                }
                FieldDefault::Sentiment(d) => {
                    judgment.sentiment_trend = value
                        .and_then(Value::as_str)
                        .and_then(SentimentTrend::from_label)
                        .unwrap_or(d);
                }
                FieldDefault::TrustConfidence(d) => {
                    judgment.trust_confidence = lenient_confidence(value).unwrap_or(d);
                }
                FieldDefault::SentimentConfidence(d) => {
                    judgment.sentiment_confidence = lenient_confidence(value).unwrap_or(d);
                }
            }
            if value.is_none() {
                tracing::debug!("Backfilled missing analysis field `{}` with {:?}", name, default);
            }
        }

        judgment.key_indicators = match obj.get("key_indicators") {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_to_string).collect(),
            Some(other) => scalar_to_string(other).into_iter().collect(),
            None => Vec::new(),
        };
        judgment.analysis_summary = obj
            .get("analysis_summary")
            .or_else(|| obj.get("summary"))
            .and_then(scalar_to_string)
            .unwrap_or_default();

        judgment
    }
}

impl OracleRecord for AnalysisJudgment {
    fn from_json(value: Value) -> Option<Self> {
        value.as_object().map(Self::from_object)
    }

    fn fallback(raw: &str) -> Self {
        Self {
            key_indicators: vec!["parsing_error".to_string()],
            analysis_summary: "Could not parse model response".to_string(),
            raw_response: Some(truncate_chars(raw, RAW_RESPONSE_PREVIEW_CHARS)),
            error: Some(PARSE_FAILURE_ERROR.to_string()),
            ..Self::default()
        }
    }
}
