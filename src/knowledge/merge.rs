//! MergeEngine：将一次抽取批次并入知识库
//!
//! - 三元组：无条件追加到账本（审计轨迹，不去重），分类索引按 (category, key) upsert
//! - 命名实体：按 (type, name) upsert，mention_count 单调不减
//! - 辅助字段：追加 {value, timestamp, source_input}
//! - 统计：total + 1、成功/失败、滑动均值、规模快照
//!
//! 定义在「零个或多个可识别字段的批次」全集上，从不失败；空批次只更新计数。

use chrono::{DateTime, Utc};

use crate::knowledge::model::{AuxEntry, EntityContext, KnowledgeStore, Triplet};
use crate::parser::{ExtractionBatch, ParseOutcome};

/// 保留策略：None 表示不限制（默认）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// 账本最多保留的三元组条数，超出时归档最旧的
    pub max_triplets: Option<usize>,
    /// 最多保留的规模快照条数，超出时汇总进 rollup
    pub max_growth_snapshots: Option<usize>,
    /// 每个实体最多保留的上下文条数（mention_count 不受影响）
    pub max_entity_contexts: Option<usize>,
}

/// 单次合并的结果摘要
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub triplets_added: usize,
    pub categories_created: usize,
    pub categories_updated: usize,
    pub entity_mentions: usize,
    pub entities_created: usize,
    pub aux_entries: usize,
    /// 计入 successful_extractions（false 表示计入 failed）
    pub successful: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    retention: RetentionPolicy,
}

impl MergeEngine {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self { retention }
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    /// 合并一次解析结果；fallback 或空批次计为失败抽取
    pub fn merge(
        &self,
        store: &mut KnowledgeStore,
        outcome: &ParseOutcome<ExtractionBatch>,
        source_input: &str,
        at: DateTime<Utc>,
    ) -> MergeReport {
        let batch = &outcome.record;
        let mut report = MergeReport {
            successful: !outcome.is_fallback && !batch.is_empty(),
            ..MergeReport::default()
        };

        if batch.is_empty() {
            store.record_extraction(false, 0, at);
            tracing::debug!(
                fallback = outcome.is_fallback,
                "Empty extraction batch, counted as failed"
            );
            return report;
        }

        store.note_session(session_id(at));

        for extracted in &batch.triplets {
            let triplet = Triplet::from_extracted(extracted, source_input, at);
            let source_context = triplet
                .context
                .clone()
                .unwrap_or_else(|| source_input.to_string());

            let record = store.upsert_category(&triplet, source_context);
            if record.update_count == 1 {
                report.categories_created += 1;
            } else {
                report.categories_updated += 1;
            }
            store.append_triplet(triplet);
            report.triplets_added += 1;
        }

        let entity_context = batch.context.clone().unwrap_or_default();
        for (entity_type, names) in &batch.named_entities {
            for name in names {
                let entity = store.observe_entity(
                    entity_type,
                    name,
                    EntityContext {
                        timestamp: at,
                        input: source_input.to_string(),
                        context: entity_context.clone(),
                    },
                );
                if entity.mention_count == 1 {
                    report.entities_created += 1;
                }
                report.entity_mentions += 1;
            }
        }

        for (field, values) in &batch.auxiliary {
            for value in values {
                store.append_aux(
                    *field,
                    AuxEntry {
                        value: value.clone(),
                        timestamp: at,
                        source_input: source_input.to_string(),
                    },
                );
                report.aux_entries += 1;
            }
        }

        store.record_extraction(report.successful, batch.triplets.len(), at);
        store.snapshot_growth(at);
        self.apply_retention(store);

        tracing::debug!(
            triplets = report.triplets_added,
            entities = report.entity_mentions,
            aux = report.aux_entries,
            "Merged extraction batch"
        );
        report
    }

    fn apply_retention(&self, store: &mut KnowledgeStore) {
        if let Some(max) = self.retention.max_triplets {
            let excess = store.triplets.len().saturating_sub(max);
            if excess > 0 {
                store.triplets.drain(..excess);
                store.analytics.rollup.triplets_archived += excess as u64;
            }
        }

        if let Some(max) = self.retention.max_growth_snapshots {
            let growth = &mut store.analytics.entity_growth;
            let excess = growth.len().saturating_sub(max);
            if excess > 0 {
                growth.drain(..excess);
                store.analytics.rollup.snapshots_rolled_up += excess as u64;
            }
        }

        if let Some(max) = self.retention.max_entity_contexts {
            let mut dropped = 0u64;
            for entity in store.named_entities.values_mut().flat_map(|e| e.values_mut()) {
                let excess = entity.contexts.len().saturating_sub(max);
                if excess > 0 {
                    entity.contexts.drain(..excess);
                    dropped += excess as u64;
                }
            }
            store.analytics.rollup.entity_contexts_dropped += dropped;
        }
    }
}

/// 按小时划分的会话 id：session_YYYYMMDD_HH
fn session_id(at: DateTime<Utc>) -> String {
    format!("session_{}", at.format("%Y%m%d_%H"))
}
