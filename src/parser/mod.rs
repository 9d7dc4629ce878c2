//! ResponseParser：从 Oracle 原始文本中提取、清洗并校验 JSON
//!
//! 流程：去掉 `<think>…</think>` 推理块 → 取首个 `{` 到最后一个 `}` → 严格 JSON 解码 →
//! 交给具体记录类型校验与补默认值。任何一步失败都返回该类型的 fallback 记录，从不报错。

pub mod analysis;
pub mod extraction;

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

pub use analysis::{AnalysisJudgment, SentimentTrend, TrustTrend, PARSE_FAILURE_ERROR};
pub use extraction::{AuxField, ExtractedTriplet, ExtractionBatch};

/// 可由 Oracle JSON 构造的记录类型；解析失败时由 fallback 提供中性记录
pub trait OracleRecord: Sized {
    /// 已解码的 JSON → 记录；形状不对（如非对象）返回 None，缺字段则补默认值
    fn from_json(value: Value) -> Option<Self>;

    /// 解析失败时的中性记录；raw 为原始响应，可用于诊断
    fn fallback(raw: &str) -> Self;
}

/// 解析结果：记录本身 + 是否为 fallback
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome<R> {
    pub record: R,
    pub is_fallback: bool,
}

impl<R> ParseOutcome<R> {
    pub fn parsed(record: R) -> Self {
        Self {
            record,
            is_fallback: false,
        }
    }

    pub fn fallback(record: R) -> Self {
        Self {
            record,
            is_fallback: true,
        }
    }
}

/// 解析 Oracle 原始文本；永不失败
pub fn parse<R: OracleRecord>(raw: &str) -> ParseOutcome<R> {
    let cleaned = strip_thinking(raw);

    let Some(candidate) = json_candidate(&cleaned) else {
        tracing::warn!("No JSON object found in oracle response ({} chars)", raw.len());
        return ParseOutcome::fallback(R::fallback(raw));
    };

    let value: Value = match serde_json::from_str(candidate) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Oracle response JSON decode failed: {}", e);
            return ParseOutcome::fallback(R::fallback(raw));
        }
    };

    match R::from_json(value) {
        Some(record) => ParseOutcome::parsed(record),
        None => {
            tracing::warn!("Oracle response JSON has unexpected shape, using fallback");
            ParseOutcome::fallback(R::fallback(raw))
        }
    }
}

fn think_block() -> Option<&'static Regex> {
    static THINK: OnceLock<Option<Regex>> = OnceLock::new();
    THINK
        .get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").ok())
        .as_ref()
}

/// 去掉所有 `<think>…</think>` 推理块（非贪婪，跨行）
pub fn strip_thinking(raw: &str) -> String {
    match think_block() {
        Some(re) => re.replace_all(raw, "").into_owned(),
        None => raw.to_string(),
    }
}

/// 首个 `{` 到最后一个 `}`（含）之间的子串；不存在或顺序颠倒时为 None
pub fn json_candidate(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// 数字或可解析为数字的字符串 → f64（过滤 NaN/inf）
pub(crate) fn lenient_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// 置信度：宽松解析后截断到 [0, 1]
pub(crate) fn lenient_confidence(value: Option<&Value>) -> Option<f64> {
    value.and_then(lenient_f64).map(|c| c.clamp(0.0, 1.0))
}

/// 标量 → 去空白后的非空字符串；数组/对象/null 返回 None
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// 按字符截断（不会切断 UTF-8 字符），超出时追加 "..."
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}
