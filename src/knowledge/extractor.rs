//! 知识抽取管道：Oracle 调用 → 解析 → 合并 → 持久化
//!
//! 单写者：`extract_and_store` 持有 `&mut self`，Oracle 调用是唯一的 await 点。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use crate::config::AppConfig;
use crate::core::MemoirError;
use crate::knowledge::context::ContextRanker;
use crate::knowledge::merge::{MergeEngine, MergeReport};
use crate::knowledge::model::{KnowledgeStore, StoreSize};
use crate::knowledge::persistence::StorePersistence;
use crate::llm::{GenerationRequest, LlmClient, UsageTotals};
use crate::parser::{self, AuxField, ExtractionBatch, ParseOutcome};

/// 抽取调用的采样参数与上下文导出上限
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_triplets: usize,
    pub max_entities: usize,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            max_tokens: 800,
            temperature: 0.0,
            max_triplets: 50,
            max_entities: 30,
        }
    }
}

/// 单次抽取的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    pub extraction_successful: bool,
    pub extracted_triplets: usize,
    pub named_entities_found: usize,
    pub topics_identified: usize,
    /// 本批次三元组按分类计数
    pub triplets_by_category: BTreeMap<String, usize>,
    pub merge: MergeReport,
    pub store_size: StoreSize,
}

impl ExtractionReport {
    fn new(batch: &ExtractionBatch, merge: MergeReport, store_size: StoreSize) -> Self {
        let mut triplets_by_category = BTreeMap::new();
        for t in &batch.triplets {
            *triplets_by_category.entry(t.category.clone()).or_insert(0) += 1;
        }
        Self {
            extraction_successful: merge.successful,
            extracted_triplets: batch.triplets.len(),
            named_entities_found: batch.entity_count(),
            topics_identified: batch.aux(AuxField::TopicsMentioned).len(),
            triplets_by_category,
            merge,
            store_size,
        }
    }
}

pub struct KnowledgeExtractor {
    llm: Arc<dyn LlmClient>,
    store: KnowledgeStore,
    persistence: Option<StorePersistence>,
    engine: MergeEngine,
    ranker: ContextRanker,
    settings: ExtractorSettings,
}

impl KnowledgeExtractor {
    /// 内存知识库，不落盘
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            store: KnowledgeStore::default(),
            persistence: None,
            engine: MergeEngine::default(),
            ranker: ContextRanker::default(),
            settings: ExtractorSettings::default(),
        }
    }

    /// 从配置构建：加载 `[app].store_path` 处的知识库（不存在则新建）
    pub fn from_config(llm: Arc<dyn LlmClient>, config: &AppConfig) -> Result<Self, MemoirError> {
        let persistence = StorePersistence::new(&config.app.store_path);
        let store = persistence.load()?;
        Ok(Self::new(llm)
            .with_store(store)
            .with_persistence(persistence)
            .with_engine(MergeEngine::new(config.retention.policy()))
            .with_ranker(config.context.ranker())
            .with_settings(ExtractorSettings {
                max_tokens: config.extraction.max_tokens,
                temperature: config.extraction.temperature,
                max_triplets: config.context.max_triplets,
                max_entities: config.context.max_entities,
            }))
    }

    pub fn with_store(mut self, store: KnowledgeStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_persistence(mut self, persistence: StorePersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_engine(mut self, engine: MergeEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_ranker(mut self, ranker: ContextRanker) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn with_settings(mut self, settings: ExtractorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    pub fn token_usage(&self) -> UsageTotals {
        self.llm.token_usage()
    }

    /// 组装抽取请求；system prompt 内嵌当前知识库的抽取上下文
    pub fn build_request(&self, user_input: &str) -> GenerationRequest {
        let context = self.ranker.extraction_context(&self.store, user_input);
        let system_prompt = format!(
            r#"You are a personal knowledge assistant. The user is voluntarily sharing information about themselves to build their personal knowledge graph.

CONTEXT: {context}

TASK: Extract factual information from the user's message and format as JSON. Focus on:
- Personal details (name, age, location, occupation)
- Relationships (family, friends, colleagues)
- Interests and activities
- Goals and preferences
- Any specific facts mentioned

Return JSON format:
{{
  "triplets": [
    {{
      "subject": "User",
      "predicate": "relationship_or_attribute",
      "object": "value",
      "category": "identity|social|interests|goals|lifestyle",
      "confidence": 0.8,
      "temporal_info": "optional time reference"
    }}
  ],
  "named_entities": {{
    "people": ["names"],
    "places": ["locations"],
    "organizations": ["companies/schools"]
  }},
  "topics_mentioned": ["main topics"],
  "behavior_patterns": ["observed habits"]
}}

Respond with JSON only, no other text."#
        );
        let user_prompt = format!(
            "The user says: \"{}\"\n\nExtract personal information and return as JSON only.",
            user_input
        );
        GenerationRequest::new(system_prompt, user_prompt)
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature)
    }

    /// 抽取并合并一条输入
    ///
    /// 响应无法解析时按 fallback（空批次）合并并返回 Ok；
    /// Oracle 传输失败时同样记一次失败抽取并尝试落盘，然后返回 `OracleTransport`；
    /// 此时的落盘失败只记日志，传输错误优先。
    pub async fn extract_and_store(
        &mut self,
        user_input: &str,
    ) -> Result<ExtractionReport, MemoirError> {
        let request = self.build_request(user_input);
        let result = self.llm.generate(&request).await;
        let at = Utc::now();

        match result {
            Ok(raw) => {
                let outcome = parser::parse::<ExtractionBatch>(&raw);
                let merge = self.engine.merge(&mut self.store, &outcome, user_input, at);
                self.persist()?;
                let report = ExtractionReport::new(&outcome.record, merge, self.store.size());
                tracing::info!(
                    successful = report.extraction_successful,
                    triplets = report.extracted_triplets,
                    entities = report.named_entities_found,
                    total_triplets = report.store_size.total_triplets,
                    "Knowledge extraction completed"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!("Knowledge extraction transport failure: {}", e);
                let outcome = ParseOutcome::fallback(ExtractionBatch::default());
                self.engine.merge(&mut self.store, &outcome, user_input, at);
                if let Err(persist_err) = self.persist() {
                    tracing::error!(
                        "Failed to persist knowledge store after transport failure: {}",
                        persist_err
                    );
                }
                Err(MemoirError::OracleTransport(e))
            }
        }
    }

    /// 供下游 LLM 使用的知识摘要
    pub fn export_context(&self) -> String {
        self.ranker.rank(
            &self.store,
            self.settings.max_triplets,
            self.settings.max_entities,
        )
    }

    fn persist(&self) -> Result<(), MemoirError> {
        if let Some(persistence) = &self.persistence {
            persistence.save(&self.store)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[tokio::test]
    async fn test_extract_and_store_reports_batch() {
        let mock = Arc::new(MockLlmClient::with_responses([
            r#"Sure! {"triplets":[{"subject":"User","predicate":"works_at","object":"Acme","category":"professional","confidence":0.9},{"subject":"User","predicate":"likes","object":"chess","category":"interests"}],"named_entities":{"organizations":["Acme"]},"topics_mentioned":["work","hobbies"]}"#,
        ]));
        let mut extractor = KnowledgeExtractor::new(mock.clone());

        let report = extractor.extract_and_store("I work at Acme and like chess").await.unwrap();
        assert!(report.extraction_successful);
        assert_eq!(report.extracted_triplets, 2);
        assert_eq!(report.named_entities_found, 1);
        assert_eq!(report.topics_identified, 2);
        assert_eq!(report.triplets_by_category.get("professional"), Some(&1));
        assert_eq!(report.triplets_by_category.get("interests"), Some(&1));
        assert_eq!(report.store_size.total_triplets, 2);

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].system_prompt.contains("CONTEXT: No existing context available."));
        assert!(requests[0].user_prompt.contains("I work at Acme and like chess"));
        assert_eq!(requests[0].max_tokens, 800);
    }

    #[tokio::test]
    async fn test_second_request_carries_context() {
        let mock = Arc::new(MockLlmClient::with_responses([
            r#"{"triplets":[{"subject":"User","predicate":"lives_in","object":"Seattle","category":"demographics","confidence":0.9}]}"#,
            "{}",
        ]));
        let mut extractor = KnowledgeExtractor::new(mock.clone());
        extractor.extract_and_store("I live in Seattle").await.unwrap();
        extractor.extract_and_store("Seattle is rainy").await.unwrap();

        let requests = mock.requests();
        assert!(requests[1].system_prompt.contains("Known relationships: User lives_in Seattle"));
        assert!(requests[1]
            .system_prompt
            .contains("Relevant existing knowledge: demographics.lives_in_Seattle: Seattle"));
    }

    #[tokio::test]
    async fn test_transport_failure_counts_as_failed_extraction() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_failure("connection refused");
        let mut extractor = KnowledgeExtractor::new(mock);

        let err = extractor.extract_and_store("hello").await.unwrap_err();
        assert!(matches!(err, MemoirError::OracleTransport(_)));
        let stats = &extractor.store().analytics.extraction_stats;
        assert_eq!(stats.total_extractions, 1);
        assert_eq!(stats.failed_extractions, 1);
        assert!(extractor.store().triplets.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_wins_over_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "file").unwrap();
        // 父路径是普通文件，保存必然失败
        let persistence = StorePersistence::new(blocker.join("kg.json"));

        let mock = Arc::new(MockLlmClient::new());
        mock.push_failure("connection refused");
        let mut extractor = KnowledgeExtractor::new(mock).with_persistence(persistence);

        let err = extractor.extract_and_store("hello").await.unwrap_err();
        assert!(matches!(err, MemoirError::OracleTransport(_)));
        assert_eq!(extractor.store().analytics.extraction_stats.failed_extractions, 1);
    }

    #[tokio::test]
    async fn test_persistence_error_surfaces_after_successful_call() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "file").unwrap();
        let persistence = StorePersistence::new(blocker.join("kg.json"));

        let mock = Arc::new(MockLlmClient::with_responses(["{}"]));
        let mut extractor = KnowledgeExtractor::new(mock).with_persistence(persistence);

        let err = extractor.extract_and_store("hello").await.unwrap_err();
        assert!(matches!(err, MemoirError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_token_usage_reflects_oracle_calls() {
        let mock = Arc::new(MockLlmClient::with_responses([r#"{"topics_mentioned": ["work"]}"#]));
        let mut extractor = KnowledgeExtractor::new(mock);
        assert_eq!(extractor.token_usage().total_tokens, 0);

        extractor.extract_and_store("I started a new job").await.unwrap();
        let usage = extractor.token_usage();
        assert_eq!(usage.completion_tokens, 2);
        assert!(usage.prompt_tokens > 0);
    }

    #[tokio::test]
    async fn test_export_context_uses_settings() {
        let mock = Arc::new(MockLlmClient::with_responses([
            r#"{"triplets":[{"subject":"User","predicate":"likes","object":"tea","category":"interests","confidence":0.95},{"subject":"User","predicate":"likes","object":"coffee","category":"interests","confidence":0.9}]}"#,
        ]));
        let mut extractor = KnowledgeExtractor::new(mock).with_settings(ExtractorSettings {
            max_triplets: 1,
            ..ExtractorSettings::default()
        });
        extractor.extract_and_store("tea over coffee").await.unwrap();
        assert_eq!(extractor.export_context(), "KEY KNOWLEDGE ABOUT USER:\n• User likes tea");
    }
}
