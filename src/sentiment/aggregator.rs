//! 分析历史与会话汇总
//!
//! 只追加；汇总时 error 记录计入 total，不计入耗时均值。

use serde::{Deserialize, Serialize};

use crate::sentiment::model::AnalysisRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisHistory {
    records: Vec<AnalysisRecord>,
}

/// 会话汇总
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub successful: usize,
    pub total: usize,
    /// 成功分析的耗时合计（秒）
    pub total_time: f64,
    /// 成功分析的平均耗时；没有成功分析时为 None
    pub average_time: Option<f64>,
    /// 每条记录一行：判断摘要或错误信息
    pub entries: Vec<String>,
}

impl AnalysisHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: AnalysisRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[AnalysisRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summarize(&self) -> SessionSummary {
        let mut successful = 0;
        let mut total_time = 0.0;
        let mut entries = Vec::with_capacity(self.records.len());

        for record in &self.records {
            match record.error() {
                None => {
                    successful += 1;
                    total_time += record.processing_time_seconds;
                    let j = &record.judgment;
                    entries.push(format!(
                        "{} ({:.2}) / {} ({:.2}) / {}",
                        j.trust_trend,
                        j.trust_confidence,
                        j.sentiment_trend,
                        j.sentiment_confidence,
                        j.analysis_summary
                    ));
                }
                Some(error) => entries.push(format!("error: {}", error)),
            }
        }

        SessionSummary {
            successful,
            total: self.records.len(),
            total_time,
            average_time: (successful > 0).then(|| total_time / successful as f64),
            entries,
        }
    }
}
