//! 知识库数据模型：三元组账本、分类索引、命名实体、会话元数据与统计
//!
//! 所有集合使用 BTreeMap，保证序列化顺序稳定（持久化 → 重新加载后结构一致）。
//! 变更只通过下方的方法进行，由 MergeEngine 调用。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::parser::{AuxField, ExtractedTriplet};

pub const STORE_VERSION: &str = "2.0";

/// 初始化时预置的知识分类
pub const DEFAULT_CATEGORIES: [&str; 16] = [
    "identity",
    "demographics",
    "physical",
    "psychological",
    "social",
    "professional",
    "lifestyle",
    "interests",
    "goals",
    "challenges",
    "experiences",
    "values",
    "financial",
    "technology",
    "communication",
    "temporal",
];

/// 初始化时预置的命名实体类型
pub const DEFAULT_ENTITY_TYPES: [&str; 6] =
    ["people", "places", "organizations", "events", "objects", "concepts"];

/// 三元组账本中的一条（只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triplet {
    pub id: String,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub category: String,
    pub subcategory: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub source_input: String,
    pub extracted_at: DateTime<Utc>,
}

impl Triplet {
    pub fn from_extracted(t: &ExtractedTriplet, source_input: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: triplet_id(&t.subject, &t.predicate, &t.object),
            subject: t.subject.clone(),
            predicate: t.predicate.clone(),
            object: t.object.clone(),
            category: t.category.clone(),
            subcategory: t.subcategory.clone(),
            confidence: t.confidence,
            temporal_info: t.temporal_info.clone(),
            context: t.context.clone(),
            source_input: source_input.to_string(),
            extracted_at: at,
        }
    }
}

/// 内容哈希：规范化（trim + 小写）后的 subject_predicate_object 取 SHA-256 前 12 位 hex。
/// 同一事实得到同一 id
pub fn triplet_id(subject: &str, predicate: &str, object: &str) -> String {
    let normalized = format!(
        "{}_{}_{}",
        subject.trim().to_lowercase(),
        predicate.trim().to_lowercase(),
        object.trim().to_lowercase()
    );
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)[..12].to_string()
}

/// 分类索引 key：`{predicate}_{object}`，空格替换为下划线
pub fn category_key(predicate: &str, object: &str) -> String {
    format!("{}_{}", predicate, object).replace(' ', "_")
}

/// 按谓词索引的关系映射（只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipMapping {
    pub subject: String,
    pub object: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: String,
}

/// 分类索引中的一条：同 key 再次观察时 update_count + 1，source_contexts 追加
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub subcategory: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_info: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub update_count: u64,
    #[serde(default)]
    pub source_contexts: Vec<String>,
}

/// 实体被提及时的上下文
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityContext {
    pub timestamp: DateTime<Utc>,
    pub input: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub first_mentioned: DateTime<Utc>,
    pub mention_count: u64,
    #[serde(default)]
    pub contexts: Vec<EntityContext>,
}

/// 辅助字段列表中的一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxEntry {
    pub value: Value,
    pub timestamp: DateTime<Utc>,
    pub source_input: String,
}

impl AuxEntry {
    /// 值的文本形式（字符串原样，其余按 JSON 输出）
    pub fn text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    #[serde(default)]
    pub sessions: Vec<String>,
    #[serde(default)]
    pub topics_discussed: Vec<String>,
    #[serde(default)]
    pub entity_mentions: BTreeMap<String, u64>,
    #[serde(default)]
    pub relationship_frequency: BTreeMap<String, u64>,
    /// 每个可识别辅助字段一个只追加列表；持久化时展开为顶层 key
    #[serde(flatten)]
    pub auxiliary: BTreeMap<AuxField, Vec<AuxEntry>>,
}

impl ConversationMetadata {
    pub fn aux(&self, field: AuxField) -> &[AuxEntry] {
        self.auxiliary.get(&field).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileMeta {
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// 实体画像（`entities` 下，预置 `user`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProfile {
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub relationships: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub temporal_data: BTreeMap<String, String>,
    pub meta: ProfileMeta,
}

impl EntityProfile {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
            temporal_data: BTreeMap::new(),
            meta: ProfileMeta {
                created: now,
                last_updated: now,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_extractions: u64,
    pub successful_extractions: u64,
    pub failed_extractions: u64,
    pub avg_triplets_per_input: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_entities: usize,
    pub total_triplets: usize,
    pub total_categories: usize,
}

/// 保留策略裁剪掉的历史计数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rollup {
    pub snapshots_rolled_up: u64,
    pub triplets_archived: u64,
    pub entity_contexts_dropped: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub extraction_stats: ExtractionStats,
    #[serde(default)]
    pub entity_growth: Vec<GrowthSnapshot>,
    #[serde(default)]
    pub rollup: Rollup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub version: String,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub total_inputs_processed: u64,
}

/// 知识库规模（条数统计）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreSize {
    pub total_triplets: usize,
    pub total_entities: usize,
    pub knowledge_categories: usize,
}

/// 知识库聚合根
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeStore {
    pub entities: BTreeMap<String, EntityProfile>,
    pub triplets: Vec<Triplet>,
    pub relationships: BTreeMap<String, Vec<RelationshipMapping>>,
    /// entity_type -> name -> 实体
    pub named_entities: BTreeMap<String, BTreeMap<String, NamedEntity>>,
    pub conversation_metadata: ConversationMetadata,
    /// category -> key -> 记录
    pub knowledge_categories: BTreeMap<String, BTreeMap<String, CategoryRecord>>,
    pub analytics: Analytics,
    pub meta: StoreMeta,
}

impl Default for KnowledgeStore {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl KnowledgeStore {
    /// 空知识库：预置 user 画像、16 个分类与 6 种实体类型
    pub fn new(now: DateTime<Utc>) -> Self {
        let mut entities = BTreeMap::new();
        entities.insert("user".to_string(), EntityProfile::new(now));

        Self {
            entities,
            triplets: Vec::new(),
            relationships: BTreeMap::new(),
            named_entities: DEFAULT_ENTITY_TYPES
                .iter()
                .map(|t| (t.to_string(), BTreeMap::new()))
                .collect(),
            conversation_metadata: ConversationMetadata::default(),
            knowledge_categories: DEFAULT_CATEGORIES
                .iter()
                .map(|c| (c.to_string(), BTreeMap::new()))
                .collect(),
            analytics: Analytics::default(),
            meta: StoreMeta {
                version: STORE_VERSION.to_string(),
                created: now,
                last_updated: now,
                total_inputs_processed: 0,
            },
        }
    }

    pub fn total_entities(&self) -> usize {
        self.named_entities.values().map(|e| e.len()).sum()
    }

    /// 非空分类数
    pub fn active_categories(&self) -> usize {
        self.knowledge_categories
            .values()
            .filter(|c| !c.is_empty())
            .count()
    }

    pub fn size(&self) -> StoreSize {
        StoreSize {
            total_triplets: self.triplets.len(),
            total_entities: self.total_entities(),
            knowledge_categories: self.active_categories(),
        }
    }

    pub fn category(&self, category: &str) -> Option<&BTreeMap<String, CategoryRecord>> {
        self.knowledge_categories.get(category)
    }

    pub fn entity(&self, entity_type: &str, name: &str) -> Option<&NamedEntity> {
        self.named_entities.get(entity_type)?.get(name)
    }

    /// 追加到三元组账本与谓词关系映射（不去重：账本是审计轨迹）
    pub fn append_triplet(&mut self, triplet: Triplet) {
        self.relationships
            .entry(triplet.predicate.clone())
            .or_default()
            .push(RelationshipMapping {
                subject: triplet.subject.clone(),
                object: triplet.object.clone(),
                confidence: triplet.confidence,
                timestamp: triplet.extracted_at,
                context: triplet.context.clone().unwrap_or_default(),
            });
        *self
            .conversation_metadata
            .relationship_frequency
            .entry(triplet.predicate.clone())
            .or_insert(0) += 1;

        if triplet.subject.trim().eq_ignore_ascii_case("user") {
            if let Some(profile) = self.entities.get_mut("user") {
                profile
                    .attributes
                    .insert(triplet.predicate.clone(), triplet.object.clone());
                if triplet.category == "social" {
                    let related = profile
                        .relationships
                        .entry(triplet.predicate.clone())
                        .or_default();
                    if !related.contains(&triplet.object) {
                        related.push(triplet.object.clone());
                    }
                }
                if let Some(temporal) = &triplet.temporal_info {
                    profile
                        .temporal_data
                        .insert(triplet.predicate.clone(), temporal.clone());
                }
                profile.meta.last_updated = triplet.extracted_at;
            }
        }

        self.triplets.push(triplet);
    }

    /// 分类索引 upsert：已存在则计数 + 1 并追加上下文，置信度等字段后写覆盖
    pub fn upsert_category(
        &mut self,
        triplet: &Triplet,
        source_context: String,
    ) -> &CategoryRecord {
        let key = category_key(&triplet.predicate, &triplet.object);
        let records = self
            .knowledge_categories
            .entry(triplet.category.clone())
            .or_default();

        let record = records
            .entry(key)
            .and_modify(|r| {
                r.subject = triplet.subject.clone();
                r.subcategory = triplet.subcategory.clone();
                r.confidence = triplet.confidence;
                r.temporal_info = triplet.temporal_info.clone();
                r.last_updated = triplet.extracted_at;
                r.update_count += 1;
            })
            .or_insert_with(|| CategoryRecord {
                subject: triplet.subject.clone(),
                predicate: triplet.predicate.clone(),
                object: triplet.object.clone(),
                subcategory: triplet.subcategory.clone(),
                confidence: triplet.confidence,
                temporal_info: triplet.temporal_info.clone(),
                last_updated: triplet.extracted_at,
                update_count: 1,
                source_contexts: Vec::new(),
            });
        record.source_contexts.push(source_context);
        record
    }

    /// 命名实体 upsert：首次出现时创建，每次出现 mention_count + 1 并追加上下文
    pub fn observe_entity(
        &mut self,
        entity_type: &str,
        name: &str,
        context: EntityContext,
    ) -> &NamedEntity {
        let entity = self
            .named_entities
            .entry(entity_type.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert_with(|| NamedEntity {
                first_mentioned: context.timestamp,
                mention_count: 0,
                contexts: Vec::new(),
            });
        entity.mention_count += 1;
        entity.contexts.push(context);

        *self
            .conversation_metadata
            .entity_mentions
            .entry(name.to_string())
            .or_insert(0) += 1;

        entity
    }

    /// 辅助字段追加；topics_mentioned 的字符串同时并入 topics_discussed（去重）
    pub fn append_aux(&mut self, field: AuxField, entry: AuxEntry) {
        if field == AuxField::TopicsMentioned {
            if let Value::String(topic) = &entry.value {
                let topics = &mut self.conversation_metadata.topics_discussed;
                if !topics.iter().any(|t| t == topic) {
                    topics.push(topic.clone());
                }
            }
        }
        self.conversation_metadata
            .auxiliary
            .entry(field)
            .or_default()
            .push(entry);
    }

    /// 记录会话 id（同一会话只记一次）
    pub fn note_session(&mut self, session_id: String) {
        let sessions = &mut self.conversation_metadata.sessions;
        if !sessions.contains(&session_id) {
            sessions.push(session_id);
        }
    }

    /// 抽取统计：total + 1，成功/失败二选一，avg_triplets_per_input 为滑动均值
    pub fn record_extraction(&mut self, successful: bool, triplet_count: usize, at: DateTime<Utc>) {
        let stats = &mut self.analytics.extraction_stats;
        stats.total_extractions += 1;
        if successful {
            stats.successful_extractions += 1;
        } else {
            stats.failed_extractions += 1;
        }
        let n = stats.total_extractions as f64;
        stats.avg_triplets_per_input += (triplet_count as f64 - stats.avg_triplets_per_input) / n;

        self.meta.total_inputs_processed += 1;
        self.meta.last_updated = at;
    }

    /// 追加一条规模快照
    pub fn snapshot_growth(&mut self, at: DateTime<Utc>) {
        let snapshot = GrowthSnapshot {
            timestamp: at,
            total_entities: self.total_entities(),
            total_triplets: self.triplets.len(),
            total_categories: self.active_categories(),
        };
        self.analytics.entity_growth.push(snapshot);
    }
}
