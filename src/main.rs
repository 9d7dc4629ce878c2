//! Memoir
//!
//! 入口：初始化日志、加载配置、创建 Oracle 客户端；逐行读取 stdin，
//! 每行依次走知识抽取与信任/情绪分析，EOF 时保存会话文件。

use std::sync::Arc;

use anyhow::Context;
use memoir::config::{load_config, LlmSection};
use memoir::llm::{
    create_ollama_client, OpenAiClient, OLLAMA_ANALYSIS_MODEL, OLLAMA_EXTRACTION_MODEL,
};
use memoir::observability;
use memoir::sentiment::SessionFile;
use memoir::{KnowledgeExtractor, MemoirError, TrustSentimentAnalyzer};
use tokio::io::{AsyncBufReadExt, BufReader};

const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

fn build_client(llm: &LlmSection, model: Option<&str>, ollama_default: &str) -> OpenAiClient {
    match llm.provider.as_str() {
        "openai" => OpenAiClient::new(
            llm.base_url.as_deref(),
            model.unwrap_or(OPENAI_DEFAULT_MODEL),
            None,
        ),
        _ => create_ollama_client(llm.base_url.as_deref(), model, ollama_default),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config = load_config(None).context("Failed to load config")?;

    let extraction_client = build_client(
        &config.llm,
        config.llm.model.as_deref(),
        OLLAMA_EXTRACTION_MODEL,
    );
    let analysis_client = build_client(
        &config.llm,
        config.llm.analysis_model.as_deref(),
        OLLAMA_ANALYSIS_MODEL,
    );
    let base_url = analysis_client.base_url().map(String::from);

    let mut extractor = KnowledgeExtractor::from_config(Arc::new(extraction_client), &config)
        .context("Failed to open knowledge store")?;
    let mut analyzer = TrustSentimentAnalyzer::from_config(Arc::new(analysis_client), &config);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        match extractor.extract_and_store(message).await {
            Ok(_) => {}
            Err(MemoirError::OracleTransport(e)) => {
                tracing::warn!("Extraction skipped: {}", e);
            }
            Err(e) => return Err(e).context("Knowledge store update failed"),
        }

        analyzer.add_user_message(message);
        analyzer.analyze(message).await;
    }

    let summary = analyzer.history().summarize();
    let extraction_usage = extractor.token_usage();
    let analysis_usage = analyzer.token_usage();
    tracing::info!(
        successful = summary.successful,
        total = summary.total,
        average_time = ?summary.average_time,
        extraction_tokens = extraction_usage.total_tokens,
        analysis_tokens = analysis_usage.total_tokens,
        "Session finished"
    );

    SessionFile::snapshot(&analyzer, base_url.as_deref())
        .save(&config.app.session_path)
        .context("Failed to save session")?;

    Ok(())
}
