//! ContextRanker：从知识库中选出有限大小、按置信度/相关性排序的子集，拼成可注入 prompt 的文本
//!
//! 只读：不修改知识库。排序与过滤是两个阶段（先按置信度取 top N，再按阈值过滤），
//! 调整阈值无需重新排序。

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::knowledge::model::{KnowledgeStore, NamedEntity, Triplet};
use crate::parser::AuxField;

/// 无任何上下文时的占位文本
pub const NO_CONTEXT: &str = "No existing context available.";

#[derive(Debug, Clone)]
pub struct ContextRanker {
    /// 三元组最低置信度（含）
    pub min_confidence: f64,
    /// 每种实体类型最多取几个
    pub entities_per_type: usize,
    /// 取最近多少条行为模式
    pub behavior_window: usize,
}

impl Default for ContextRanker {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            entities_per_type: 5,
            behavior_window: 10,
        }
    }
}

impl ContextRanker {
    /// 导出供 LLM 使用的知识摘要；空段落省略
    pub fn rank(&self, store: &KnowledgeStore, max_triplets: usize, max_entities: usize) -> String {
        let mut sections = Vec::new();

        let triplets = self.select_triplets(store, max_triplets);
        if !triplets.is_empty() {
            let mut lines = vec!["KEY KNOWLEDGE ABOUT USER:".to_string()];
            lines.extend(triplets.iter().map(|t| render_triplet(t)));
            sections.push(lines.join("\n"));
        }

        let entities = self.select_entities(store, max_entities);
        if !entities.is_empty() {
            let rendered: Vec<String> = entities
                .iter()
                .map(|(entity_type, name)| format!("{} ({})", name, entity_type))
                .collect();
            sections.push(format!("IMPORTANT ENTITIES: {}", rendered.join(", ")));
        }

        let patterns = self.recent_behavior_patterns(store);
        if !patterns.is_empty() {
            sections.push(format!("BEHAVIOR PATTERNS: {}", patterns.join("; ")));
        }

        sections.join("\n\n")
    }

    /// 先按 (confidence desc, extracted_at desc) 取前 max_triplets 条，再按阈值过滤
    pub fn select_triplets<'a>(
        &self,
        store: &'a KnowledgeStore,
        max_triplets: usize,
    ) -> Vec<&'a Triplet> {
        let mut ranked: Vec<&Triplet> = store.triplets.iter().collect();
        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.extracted_at.cmp(&a.extracted_at))
        });
        ranked.truncate(max_triplets);
        ranked.retain(|t| t.confidence >= self.min_confidence);
        ranked
    }

    /// 每种类型按 mention_count 降序取前 entities_per_type 个且提及次数 > 1，合并后截断
    pub fn select_entities<'a>(
        &self,
        store: &'a KnowledgeStore,
        max_entities: usize,
    ) -> Vec<(&'a str, &'a str)> {
        let mut selected = Vec::new();
        for (entity_type, entities) in &store.named_entities {
            let mut sorted: Vec<(&String, &NamedEntity)> = entities.iter().collect();
            // 稳定排序：同计数按名称顺序
            sorted.sort_by(|a, b| b.1.mention_count.cmp(&a.1.mention_count));
            selected.extend(
                sorted
                    .into_iter()
                    .take(self.entities_per_type)
                    .filter(|(_, e)| e.mention_count > 1)
                    .map(|(name, _)| (entity_type.as_str(), name.as_str())),
            );
        }
        selected.truncate(max_entities);
        selected
    }

    /// 最近 behavior_window 条行为模式，去重并保持首次出现顺序
    pub fn recent_behavior_patterns(&self, store: &KnowledgeStore) -> Vec<String> {
        let entries = store.conversation_metadata.aux(AuxField::BehaviorPatterns);
        let start = entries.len().saturating_sub(self.behavior_window);
        let mut seen = HashSet::new();
        entries[start..]
            .iter()
            .map(|e| e.text())
            .filter(|p| seen.insert(p.clone()))
            .collect()
    }

    /// 抽取前注入 Oracle system prompt 的上下文：近期话题、高频实体、已知关系、与输入相关的已有知识
    pub fn extraction_context(&self, store: &KnowledgeStore, user_input: &str) -> String {
        let mut parts = Vec::new();
        let metadata = &store.conversation_metadata;

        let topics = &metadata.topics_discussed;
        if !topics.is_empty() {
            let recent = &topics[topics.len().saturating_sub(10)..];
            parts.push(format!("Recent topics discussed: {}", recent.join(", ")));
        }

        let mut frequent: Vec<(&String, &u64)> = metadata.entity_mentions.iter().collect();
        frequent.sort_by(|a, b| b.1.cmp(a.1));
        if !frequent.is_empty() {
            let rendered: Vec<String> = frequent
                .iter()
                .take(15)
                .map(|(name, count)| format!("{}({})", name, count))
                .collect();
            parts.push(format!("Frequently mentioned entities: {}", rendered.join(", ")));
        }

        let known: Vec<String> = store
            .relationships
            .iter()
            .take(10)
            .flat_map(|(predicate, mappings)| {
                mappings
                    .iter()
                    .take(3)
                    .map(move |m| format!("{} {} {}", m.subject, predicate, m.object))
            })
            .collect();
        if !known.is_empty() {
            parts.push(format!("Known relationships: {}", known.join("; ")));
        }

        let relevant = relevant_knowledge(&store.knowledge_categories, user_input);
        if !relevant.is_empty() {
            parts.push(format!("Relevant existing knowledge: {}", relevant.join("; ")));
        }

        if parts.is_empty() {
            NO_CONTEXT.to_string()
        } else {
            parts.join("\n")
        }
    }
}

fn render_triplet(t: &Triplet) -> String {
    let predicate = t.predicate.replace('_', " ");
    match &t.temporal_info {
        Some(temporal) => format!("• {} {} {} ({})", t.subject, predicate, t.object, temporal),
        None => format!("• {} {} {}", t.subject, predicate, t.object),
    }
}

/// 输入词短于此长度不参与匹配（"a"、"in" 之类会命中几乎所有 key）
const MIN_KEYWORD_LEN: usize = 3;

/// 每个分类前 5 条中，object 词或 key 的 `_` 分词与输入词有交集的记录，最多 10 条
fn relevant_knowledge(
    categories: &BTreeMap<String, BTreeMap<String, crate::knowledge::model::CategoryRecord>>,
    user_input: &str,
) -> Vec<String> {
    let keywords: HashSet<String> = user_input
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN)
        .collect();
    if keywords.is_empty() {
        return Vec::new();
    }

    categories
        .iter()
        .flat_map(|(category, records)| {
            records.iter().take(5).map(move |(key, r)| (category, key, r))
        })
        .filter(|(_, key, record)| {
            let key = key.to_lowercase();
            let object = record.object.to_lowercase();
            object.split_whitespace().any(|w| keywords.contains(w))
                || key.split('_').any(|t| keywords.contains(t))
        })
        .take(10)
        .map(|(category, key, record)| format!("{}.{}: {}", category, key, record.object))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::merge::MergeEngine;
    use crate::parser::{ExtractedTriplet, ExtractionBatch, ParseOutcome};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn store_with(triplets: Vec<ExtractedTriplet>) -> KnowledgeStore {
        let mut store = KnowledgeStore::default();
        let engine = MergeEngine::default();
        let start = Utc::now();
        for (i, t) in triplets.into_iter().enumerate() {
            let outcome = ParseOutcome::parsed(ExtractionBatch {
                triplets: vec![t],
                ..ExtractionBatch::default()
            });
            engine.merge(&mut store, &outcome, "input", start + Duration::seconds(i as i64));
        }
        store
    }

    #[test]
    fn test_triplets_ranked_then_filtered() {
        let store = store_with(vec![
            ExtractedTriplet::new("User", "likes", "jazz", "interests", 0.95),
            ExtractedTriplet::new("User", "owns", "bike", "lifestyle", 0.6),
            ExtractedTriplet::new("User", "works_at", "Acme", "professional", 0.9),
            ExtractedTriplet::new("User", "likes", "opera", "interests", 0.95),
        ]);
        let ranker = ContextRanker::default();

        let top = ranker.select_triplets(&store, 3);
        let objects: Vec<&str> = top.iter().map(|t| t.object.as_str()).collect();
        // 同置信度时较新的在前
        assert_eq!(objects, vec!["opera", "jazz", "Acme"]);

        let all = ranker.select_triplets(&store, 10);
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|t| t.confidence >= 0.7));
    }

    #[test]
    fn test_entities_need_repeat_mentions() {
        let mut store = KnowledgeStore::default();
        let engine = MergeEngine::default();
        let batch = |names: Vec<&str>| {
            ParseOutcome::parsed(ExtractionBatch {
                named_entities: [(
                    "people".to_string(),
                    names.into_iter().map(String::from).collect(),
                )]
                .into_iter()
                .collect(),
                ..ExtractionBatch::default()
            })
        };
        engine.merge(&mut store, &batch(vec!["Ana", "Ben", "Cy"]), "a", Utc::now());
        engine.merge(&mut store, &batch(vec!["Ana", "Ben"]), "b", Utc::now());
        engine.merge(&mut store, &batch(vec!["Ben"]), "c", Utc::now());

        let ranker = ContextRanker::default();
        assert_eq!(ranker.select_entities(&store, 30), vec![("people", "Ben"), ("people", "Ana")]);
        assert_eq!(ranker.select_entities(&store, 1), vec![("people", "Ben")]);
    }

    #[test]
    fn test_rank_renders_sections_and_omits_empty() {
        assert_eq!(ContextRanker::default().rank(&KnowledgeStore::default(), 50, 30), "");

        let mut t = ExtractedTriplet::new("User", "plays", "piano", "interests", 0.9);
        t.temporal_info = Some("since 2010".to_string());
        let mut store = store_with(vec![t]);
        let engine = MergeEngine::default();
        let patterns = ParseOutcome::parsed(ExtractionBatch {
            auxiliary: [(
                AuxField::BehaviorPatterns,
                vec![json!("practices daily"), json!("practices daily"), json!("avoids crowds")],
            )]
            .into_iter()
            .collect(),
            ..ExtractionBatch::default()
        });
        engine.merge(&mut store, &patterns, "p", Utc::now());

        let context = ContextRanker::default().rank(&store, 50, 30);
        assert_eq!(
            context,
            "KEY KNOWLEDGE ABOUT USER:\n• User plays piano (since 2010)\n\n\
             BEHAVIOR PATTERNS: practices daily; avoids crowds"
        );
    }

    #[test]
    fn test_rank_is_read_only() {
        let store =
            store_with(vec![ExtractedTriplet::new("User", "likes", "tea", "interests", 0.9)]);
        let before = store.clone();
        let _ = ContextRanker::default().rank(&store, 5, 5);
        assert_eq!(store, before);
    }

    #[test]
    fn test_extraction_context() {
        let ranker = ContextRanker::default();
        assert_eq!(ranker.extraction_context(&KnowledgeStore::default(), "hello"), NO_CONTEXT);

        let store = store_with(vec![ExtractedTriplet::new(
            "User",
            "works_at",
            "Acme Corp",
            "professional",
            0.9,
        )]);
        let context = ranker.extraction_context(&store, "I got promoted at acme today");
        assert!(context.contains("Known relationships: User works_at Acme Corp"));
        assert!(context
            .contains("Relevant existing knowledge: professional.works_at_Acme_Corp: Acme Corp"));
    }

    #[test]
    fn test_short_words_do_not_match_every_key() {
        let ranker = ContextRanker::default();
        let store = store_with(vec![ExtractedTriplet::new(
            "User",
            "lives_in",
            "Seattle",
            "demographics",
            0.9,
        )]);

        let unrelated = ranker.extraction_context(&store, "I bought a car");
        assert!(!unrelated.contains("Relevant existing knowledge"));
        let partial = ranker.extraction_context(&store, "Seat belts in the car");
        assert!(!partial.contains("Relevant existing knowledge"));

        let related = ranker.extraction_context(&store, "Seattle, again?");
        assert!(related
            .contains("Relevant existing knowledge: demographics.lives_in_Seattle: Seattle"));
    }
}
