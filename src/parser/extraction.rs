//! 知识抽取响应：三元组、命名实体与辅助字段
//!
//! 校验策略是「部分抽取优于无抽取」：单条三元组缺 subject/predicate/object 时只丢弃该条；
//! 未识别的顶层字段记录日志后丢弃，不进入 catch-all。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{lenient_confidence, scalar_to_string, OracleRecord};

/// 三元组缺省置信度（Oracle 未给出时）
pub const DEFAULT_TRIPLET_CONFIDENCE: f64 = 0.8;

/// 缺省分类与子分类
pub const DEFAULT_CATEGORY: &str = "general";

/// 会话元数据中可识别的辅助字段（封闭集合），各自对应一个只追加列表
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxField {
    TopicsMentioned,
    EmotionalIndicators,
    TemporalMarkers,
    RelationshipDynamics,
    BehaviorPatterns,
    DecisionFactors,
    CommunicationStyle,
    PriorityIndicators,
}

impl AuxField {
    pub const ALL: [AuxField; 8] = [
        AuxField::TopicsMentioned,
        AuxField::EmotionalIndicators,
        AuxField::TemporalMarkers,
        AuxField::RelationshipDynamics,
        AuxField::BehaviorPatterns,
        AuxField::DecisionFactors,
        AuxField::CommunicationStyle,
        AuxField::PriorityIndicators,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuxField::TopicsMentioned => "topics_mentioned",
            AuxField::EmotionalIndicators => "emotional_indicators",
            AuxField::TemporalMarkers => "temporal_markers",
            AuxField::RelationshipDynamics => "relationship_dynamics",
            AuxField::BehaviorPatterns => "behavior_patterns",
            AuxField::DecisionFactors => "decision_factors",
            AuxField::CommunicationStyle => "communication_style",
            AuxField::PriorityIndicators => "priority_indicators",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == key)
    }
}

impl std::fmt::Display for AuxField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Oracle 给出的一条三元组（已校验）
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedTriplet {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub category: String,
    pub subcategory: String,
    pub confidence: f64,
    pub temporal_info: Option<String>,
    pub context: Option<String>,
}

impl ExtractedTriplet {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        category: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            category: category.into(),
            subcategory: DEFAULT_CATEGORY.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            temporal_info: None,
            context: None,
        }
    }

    /// 从 JSON 对象构造；缺少 subject/predicate/object 任一项返回 None
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let field = |k: &str| obj.get(k).and_then(scalar_to_string);

        Some(Self {
            subject: field("subject")?,
            predicate: field("predicate")?,
            object: field("object")?,
            category: field("category").unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            subcategory: field("subcategory").unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            confidence: lenient_confidence(obj.get("confidence"))
                .unwrap_or(DEFAULT_TRIPLET_CONFIDENCE),
            temporal_info: field("temporal_info"),
            context: field("context"),
        })
    }
}

/// 一次抽取的合并批次（ResponseParser 的输出、MergeEngine 的输入）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionBatch {
    pub triplets: Vec<ExtractedTriplet>,
    /// entity_type -> 名称列表（保持 Oracle 给出的顺序）
    pub named_entities: BTreeMap<String, Vec<String>>,
    pub auxiliary: BTreeMap<AuxField, Vec<Value>>,
    /// Oracle 对整段输入的上下文说明，写入实体 contexts
    pub context: Option<String>,
}

impl ExtractionBatch {
    /// 无三元组、无实体、无辅助字段
    pub fn is_empty(&self) -> bool {
        self.triplets.is_empty()
            && self.named_entities.values().all(|v| v.is_empty())
            && self.auxiliary.values().all(|v| v.is_empty())
    }

    pub fn entity_count(&self) -> usize {
        self.named_entities.values().map(|v| v.len()).sum()
    }

    pub fn aux(&self, field: AuxField) -> &[Value] {
        self.auxiliary.get(&field).map(|v| v.as_slice()).unwrap_or(&[])
    }

    fn from_object(obj: Map<String, Value>) -> Self {
        let mut batch = ExtractionBatch::default();

        for (key, value) in obj {
            match key.as_str() {
                "triplets" => batch.triplets = parse_triplets(&value),
                "named_entities" => batch.named_entities = parse_named_entities(&value),
                "context" => batch.context = scalar_to_string(&value),
                // 调用方写入的元信息，非抽取内容
                "meta" => {}
                other => match AuxField::from_key(other) {
                    Some(field) => {
                        let items = as_items(value);
                        if !items.is_empty() {
                            batch.auxiliary.entry(field).or_default().extend(items);
                        }
                    }
                    None => {
                        tracing::debug!("Dropping unrecognized extraction field `{}`", other);
                    }
                },
            }
        }

        batch
    }
}

impl OracleRecord for ExtractionBatch {
    fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(obj) => Some(Self::from_object(obj)),
            _ => None,
        }
    }

    fn fallback(_raw: &str) -> Self {
        ExtractionBatch::default()
    }
}

fn parse_triplets(value: &Value) -> Vec<ExtractedTriplet> {
    let Some(items) = value.as_array() else {
        tracing::warn!("`triplets` is not a list, ignoring");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let parsed = ExtractedTriplet::from_value(item);
            if parsed.is_none() {
                tracing::warn!("Dropping incomplete triplet: {}", item);
            }
            parsed
        })
        .collect()
}

fn parse_named_entities(value: &Value) -> BTreeMap<String, Vec<String>> {
    let Some(obj) = value.as_object() else {
        tracing::warn!("`named_entities` is not an object, ignoring");
        return BTreeMap::new();
    };
    obj.iter()
        .map(|(entity_type, names)| {
            let names: Vec<String> = match names {
                Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
                other => scalar_to_string(other).into_iter().collect(),
            };
            (entity_type.clone(), names)
        })
        .filter(|(_, names)| !names.is_empty())
        .collect()
}

/// 辅助字段可以是列表或单个值；null 与空字符串视为无
fn as_items(value: Value) -> Vec<Value> {
    let keep = |v: &Value| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    };
    match value {
        Value::Array(items) => items.into_iter().filter(keep).collect(),
        other if keep(&other) => vec![other],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_scenario_batch() {
        let raw = r#"{"triplets":[{"subject":"User","predicate":"lives_in","object":"Seattle","category":"demographics","confidence":0.9}],"named_entities":{"places":["Seattle"]}}"#;
        let outcome = parse::<ExtractionBatch>(raw);
        assert!(!outcome.is_fallback);
        let batch = outcome.record;
        assert_eq!(batch.triplets.len(), 1);
        let t = &batch.triplets[0];
        assert_eq!(t.predicate, "lives_in");
        assert_eq!(t.category, "demographics");
        assert_eq!(t.subcategory, "general");
        assert_eq!(t.confidence, 0.9);
        assert_eq!(batch.named_entities["places"], vec!["Seattle".to_string()]);
    }

    #[test]
    fn test_incomplete_triplets_dropped_individually() {
        let raw = r#"Sure! {"triplets":[
            {"subject":"User","predicate":"age","object":30},
            {"subject":"User","object":"cats"},
            "not even an object"
        ]}"#;
        let batch = parse::<ExtractionBatch>(raw).record;
        assert_eq!(batch.triplets.len(), 1);
        assert_eq!(batch.triplets[0].object, "30");
        assert_eq!(batch.triplets[0].confidence, DEFAULT_TRIPLET_CONFIDENCE);
        assert_eq!(batch.triplets[0].category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_aux_fields_and_unknown_keys() {
        let raw = r#"{"topics_mentioned":["work","  "],"behavior_patterns":"procrastinates","mood_ring":["blue"],"meta":{"x":1}}"#;
        let outcome = parse::<ExtractionBatch>(raw);
        assert!(!outcome.is_fallback);
        let batch = outcome.record;
        assert_eq!(batch.aux(AuxField::TopicsMentioned).len(), 1);
        assert_eq!(batch.aux(AuxField::BehaviorPatterns).len(), 1);
        assert_eq!(batch.auxiliary.len(), 2);
        assert!(batch.triplets.is_empty());
    }

    #[test]
    fn test_garbage_yields_empty_fallback() {
        for raw in ["", "I could not find any facts.", "{not json}", "[1, 2, 3]"] {
            let outcome = parse::<ExtractionBatch>(raw);
            assert!(outcome.is_fallback, "expected fallback for {:?}", raw);
            assert!(outcome.record.is_empty());
        }
    }

    #[test]
    fn test_two_objects_span_is_fallback() {
        let outcome = parse::<ExtractionBatch>(r#"{"a": 1} and {"b": 2}"#);
        // 首个 { 到最后一个 } 不是合法 JSON
        assert!(outcome.is_fallback);
    }

    #[test]
    fn test_aux_field_keys_round_trip() {
        for field in AuxField::ALL {
            assert_eq!(AuxField::from_key(field.as_str()), Some(field));
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{}\"", field.as_str()));
        }
        assert_eq!(AuxField::from_key("sessions"), None);
    }
}
