//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MEMOIR__*` 覆盖（双下划线表示嵌套，如 `MEMOIR__LLM__MODEL=llama3.1:8b`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::MemoirError;
use crate::knowledge::{ContextRanker, RetentionPolicy};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub extraction: ExtractionSection,
    pub analysis: AnalysisSection,
    pub context: ContextSection,
    pub retention: RetentionSection,
}

/// [app] 段：知识库与会话文件路径
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            session_path: default_session_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("ultra_knowledge_graph.json")
}

fn default_session_path() -> PathBuf {
    PathBuf::from("therapy_session.json")
}

/// [llm] 段：后端选择（ollama / openai）
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 抽取模型；未设置时用后端默认
    pub model: Option<String>,
    /// 分析模型；未设置时用后端默认
    pub analysis_model: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            analysis_model: None,
            base_url: None,
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}

/// [extraction] 段：抽取调用的采样参数
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionSection {
    #[serde(default = "default_extraction_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for ExtractionSection {
    fn default() -> Self {
        Self {
            max_tokens: default_extraction_max_tokens(),
            temperature: 0.0,
        }
    }
}

fn default_extraction_max_tokens() -> u32 {
    800
}

/// [analysis] 段：信任/情绪分析调用参数与 prompt 中携带的历史条数
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisSection {
    #[serde(default = "default_analysis_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_analysis_temperature")]
    pub temperature: f32,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            max_tokens: default_analysis_max_tokens(),
            temperature: default_analysis_temperature(),
            history_window: default_history_window(),
        }
    }
}

fn default_analysis_max_tokens() -> u32 {
    1000
}

fn default_analysis_temperature() -> f32 {
    0.1
}

fn default_history_window() -> usize {
    3
}

/// [context] 段：ContextRanker 的上限与阈值
#[derive(Debug, Clone, Deserialize)]
pub struct ContextSection {
    #[serde(default = "default_max_triplets")]
    pub max_triplets: usize,
    #[serde(default = "default_max_entities")]
    pub max_entities: usize,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_entities_per_type")]
    pub entities_per_type: usize,
    #[serde(default = "default_behavior_window")]
    pub behavior_window: usize,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            max_triplets: default_max_triplets(),
            max_entities: default_max_entities(),
            min_confidence: default_min_confidence(),
            entities_per_type: default_entities_per_type(),
            behavior_window: default_behavior_window(),
        }
    }
}

fn default_max_triplets() -> usize {
    50
}

fn default_max_entities() -> usize {
    30
}

fn default_min_confidence() -> f64 {
    0.7
}

fn default_entities_per_type() -> usize {
    5
}

fn default_behavior_window() -> usize {
    10
}

impl ContextSection {
    pub fn ranker(&self) -> ContextRanker {
        ContextRanker {
            min_confidence: self.min_confidence,
            entities_per_type: self.entities_per_type,
            behavior_window: self.behavior_window,
        }
    }
}

/// [retention] 段：不设置即不限制
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetentionSection {
    pub max_triplets: Option<usize>,
    pub max_growth_snapshots: Option<usize>,
    pub max_entity_contexts: Option<usize>,
}

impl RetentionSection {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_triplets: self.max_triplets,
            max_growth_snapshots: self.max_growth_snapshots,
            max_entity_contexts: self.max_entity_contexts,
        }
    }
}

/// 从 config 目录加载配置，环境变量 MEMOIR__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MEMOIR__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, MemoirError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MEMOIR")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    Ok(c.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.extraction.max_tokens, 800);
        assert_eq!(config.analysis.history_window, 3);
        assert_eq!(config.context.max_triplets, 50);
        assert_eq!(config.context.ranker().min_confidence, 0.7);
        assert_eq!(config.retention.policy(), RetentionPolicy::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memoir.toml");
        std::fs::write(
            &path,
            r#"
[app]
store_path = "data/kg.json"

[context]
min_confidence = 0.8

[retention]
max_growth_snapshots = 100
"#,
        )
        .unwrap();

        let config = load_config(Some(path)).unwrap();
        assert_eq!(config.app.store_path, PathBuf::from("data/kg.json"));
        assert_eq!(config.app.session_path, PathBuf::from("therapy_session.json"));
        assert_eq!(config.context.min_confidence, 0.8);
        assert_eq!(config.context.max_entities, 30);
        assert_eq!(config.retention.policy().max_growth_snapshots, Some(100));
        assert_eq!(config.retention.policy().max_triplets, None);
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memoir.toml");
        std::fs::write(&path, "[context]\nmax_triplets = \"lots\"\n").unwrap();

        let err = load_config(Some(path)).unwrap_err();
        assert!(matches!(err, MemoirError::Config(_)));
    }
}
