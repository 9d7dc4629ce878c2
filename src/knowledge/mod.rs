//! 个人知识库：数据模型、合并、上下文排序、持久化与抽取管道

pub mod context;
pub mod extractor;
pub mod merge;
pub mod model;
pub mod persistence;

pub use context::{ContextRanker, NO_CONTEXT};
pub use extractor::{ExtractionReport, ExtractorSettings, KnowledgeExtractor};
pub use merge::{MergeEngine, MergeReport, RetentionPolicy};
pub use model::{
    AuxEntry, CategoryRecord, ConversationMetadata, EntityContext, EntityProfile, KnowledgeStore,
    NamedEntity, RelationshipMapping, StoreSize, Triplet,
};
pub use persistence::StorePersistence;
