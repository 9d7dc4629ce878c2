//! 抽取与分析管道集成测试（Mock Oracle + 临时目录）

use std::sync::Arc;

use memoir::knowledge::{ContextRanker, KnowledgeExtractor, StorePersistence};
use memoir::llm::MockLlmClient;
use memoir::parser::{SentimentTrend, TrustTrend};
use memoir::sentiment::{AnalysisState, TrustSentimentAnalyzer};
use memoir::MemoirError;

const SEATTLE: &str = r#"Here is what I found:
{"triplets":[{"subject":"User","predicate":"lives_in","object":"Seattle","category":"demographics","confidence":0.9}],
 "named_entities":{"places":["Seattle"]}}
Let me know if you need more."#;

#[tokio::test]
async fn test_prose_wrapped_extraction_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let persistence = StorePersistence::new(dir.path().join("kg.json"));
    let mock = Arc::new(MockLlmClient::with_responses([SEATTLE]));
    let mut extractor = KnowledgeExtractor::new(mock).with_persistence(persistence.clone());

    let report = extractor.extract_and_store("I live in Seattle").await.unwrap();
    assert!(report.extraction_successful);
    assert_eq!(report.store_size.total_triplets, 1);

    let reloaded = persistence.load().unwrap();
    assert_eq!(&reloaded, extractor.store());
    assert_eq!(reloaded.triplets.len(), 1);
    assert!(reloaded
        .category("demographics")
        .map(|c| c.contains_key("lives_in_Seattle"))
        .unwrap_or(false));
    assert_eq!(reloaded.entity("places", "Seattle").map(|e| e.mention_count), Some(1));
}

#[tokio::test]
async fn test_repeated_fact_updates_category_and_grows_ledger() {
    let mock = Arc::new(MockLlmClient::with_responses([SEATTLE, SEATTLE, "no json here at all"]));
    let mut extractor = KnowledgeExtractor::new(mock);

    extractor.extract_and_store("I live in Seattle").await.unwrap();
    extractor.extract_and_store("Still in Seattle").await.unwrap();
    let report = extractor.extract_and_store("hmm").await.unwrap();
    assert!(!report.extraction_successful);

    let store = extractor.store();
    // 账本只追加：两次抽取各 1 条
    assert_eq!(store.triplets.len(), 2);
    let record = &store.category("demographics").unwrap()["lives_in_Seattle"];
    assert_eq!(record.update_count, 2);
    assert_eq!(store.entity("places", "Seattle").map(|e| e.mention_count), Some(2));

    let stats = &store.analytics.extraction_stats;
    assert_eq!(stats.total_extractions, 3);
    assert_eq!(stats.successful_extractions, 2);
    assert_eq!(stats.failed_extractions, 1);
    assert_eq!(store.meta.total_inputs_processed, 3);
}

#[tokio::test]
async fn test_transport_failure_still_persists() {
    let dir = tempfile::tempdir().unwrap();
    let persistence = StorePersistence::new(dir.path().join("kg.json"));
    let mock = Arc::new(MockLlmClient::new());
    mock.push_failure("connection refused");
    let mut extractor = KnowledgeExtractor::new(mock).with_persistence(persistence.clone());

    let err = extractor.extract_and_store("hello").await.unwrap_err();
    assert!(matches!(err, MemoirError::OracleTransport(_)));

    let reloaded = persistence.load().unwrap();
    assert_eq!(reloaded.analytics.extraction_stats.failed_extractions, 1);
}

#[tokio::test]
async fn test_ranked_context_respects_bounds() {
    let mock = Arc::new(MockLlmClient::with_responses([
        r#"{"triplets":[
            {"subject":"User","predicate":"likes","object":"tea","category":"interests","confidence":0.95},
            {"subject":"User","predicate":"likes","object":"rain","category":"interests","confidence":0.5},
            {"subject":"User","predicate":"works_at","object":"Acme","category":"professional","confidence":0.85}
        ]}"#,
    ]));
    let mut extractor = KnowledgeExtractor::new(mock);
    extractor.extract_and_store("tea, rain and work").await.unwrap();

    let ranker = ContextRanker::default();
    let selected = ranker.select_triplets(extractor.store(), 2);
    assert!(selected.len() <= 2);
    assert!(selected.iter().all(|t| t.confidence >= ranker.min_confidence));
    assert_eq!(ranker.select_triplets(extractor.store(), 50).len(), 2);
    assert!(ranker.select_entities(extractor.store(), 30).is_empty());
}

#[tokio::test]
async fn test_analysis_session_summary() {
    let mock = Arc::new(MockLlmClient::with_responses([
        r#"<think>
client is opening up
</think>
{"trust_trend":"increasing","trust_confidence":"0.9","sentiment_trend":"IMPROVING","sentiment_confidence":0.7,"key_indicators":["openness"],"analysis_summary":"Sharing more"}"#,
    ]));
    mock.push_failure("timeout");
    let mut analyzer = TrustSentimentAnalyzer::new(mock);

    analyzer.add_user_message("I've been thinking about what you said.");
    let (state, record) = analyzer.analyze("I've been thinking about what you said.").await;
    assert_eq!(state, AnalysisState::Recorded);
    assert_eq!(record.judgment.trust_trend, TrustTrend::Increasing);
    assert_eq!(record.judgment.trust_confidence, 0.9);
    assert_eq!(record.judgment.sentiment_trend, SentimentTrend::Improving);

    analyzer.add_user_message("I don't want to talk today.");
    let (state, _) = analyzer.analyze("I don't want to talk today.").await;
    assert_eq!(state, AnalysisState::ErrorRecorded);

    let summary = analyzer.history().summarize();
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.total, 2);
    assert!(summary.average_time.is_some());
}
