//! 知识库持久化
//!
//! 单个 JSON 文档整体覆盖写入：先写同目录临时文件再 rename，避免半写文件。
//! 文件不存在时返回新的空知识库。

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::knowledge::model::KnowledgeStore;

#[derive(Debug, Clone)]
pub struct StorePersistence {
    path: PathBuf,
}

impl StorePersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 从 JSON 文件加载知识库；文件不存在时初始化空库
    pub fn load(&self) -> anyhow::Result<KnowledgeStore> {
        if !self.path.exists() {
            tracing::info!("Initialized new knowledge store (no file at {:?})", self.path);
            return Ok(KnowledgeStore::default());
        }
        let data = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read knowledge store {:?}", self.path))?;
        let store: KnowledgeStore = serde_json::from_str(&data)
            .with_context(|| format!("failed to decode knowledge store {:?}", self.path))?;
        tracing::info!(
            "Loaded knowledge store with {} triplets, {} entities",
            store.triplets.len(),
            store.total_entities()
        );
        Ok(store)
    }

    /// 原子写入：临时文件 + rename；父目录不存在时自动创建
    pub fn save(&self, store: &KnowledgeStore) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.tmp_path();
        let data = serde_json::to_string_pretty(store)?;
        std::fs::write(&tmp, data).with_context(|| format!("failed to write {:?}", tmp))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace knowledge store {:?}", self.path))?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::merge::MergeEngine;
    use crate::parser::parse;
    use chrono::Utc;

    #[test]
    fn test_missing_file_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = StorePersistence::new(dir.path().join("kg.json"));
        let store = persistence.load().unwrap();
        assert!(store.triplets.is_empty());
    }

    #[test]
    fn test_round_trip_is_structurally_identical() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = StorePersistence::new(dir.path().join("nested").join("kg.json"));

        let mut store = KnowledgeStore::default();
        let raw = r#"{"triplets":[
            {"subject":"User","predicate":"lives_in","object":"Seattle","category":"demographics","confidence":0.9,"temporal_info":"since 2019"},
            {"subject":"User","predicate":"sister","object":"Maya","category":"social","confidence":0.85,"context":"family talk"}
        ],
        "named_entities":{"places":["Seattle"],"people":["Maya"]},
        "behavior_patterns":["runs at dawn"],
        "topics_mentioned":["family", {"nested": true}]}"#;
        let engine = MergeEngine::default();
        engine.merge(&mut store, &parse(raw), "My sister Maya and I live in Seattle", Utc::now());
        engine.merge(&mut store, &parse("garbage"), "???", Utc::now());

        persistence.save(&store).unwrap();
        assert!(!persistence.tmp_path().exists());

        let reloaded = persistence.load().unwrap();
        assert_eq!(reloaded, store);
    }

    #[test]
    fn test_persisted_top_level_keys() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = StorePersistence::new(dir.path().join("kg.json"));
        persistence.save(&KnowledgeStore::default()).unwrap();

        let raw = std::fs::read_to_string(persistence.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "analytics",
                "conversation_metadata",
                "entities",
                "knowledge_categories",
                "meta",
                "named_entities",
                "relationships",
                "triplets"
            ]
        );
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kg.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(StorePersistence::new(&path).load().is_err());
    }
}
