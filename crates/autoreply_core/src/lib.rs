pub mod cache;
pub mod chunk;
pub mod config;
pub mod dispatch;
pub mod embed;
pub mod error;
pub mod eval;
pub mod listing;
pub mod matcher;
pub mod minilm_embed;
pub mod model;
pub mod normalize;
pub mod retrieval;
pub mod sqlite_store;
pub mod storage;
pub mod store;
pub mod table;
pub mod timeout_embed;

pub use cache::QuestionEmbeddingCache;
pub use chunk::{chunk_message, ChunkConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use config::{parse_duration, MatcherConfig, MatcherSettings, DEFAULT_THRESHOLD};
pub use dispatch::{handle_message, Responder};
pub use embed::{EmbeddingProvider, HashEmbeddingProvider};
pub use error::{ConfigError, MatchError, StoreError};
pub use eval::{evaluate_cases, EvalCase, EvalOutcome, EvalSummary};
pub use listing::{build_listing, paginate, render_text, Listing, ListingField, ListingPage};
pub use matcher::SimilarityMatcher;
pub use minilm_embed::{BertConfig, MiniLmEmbeddingProvider};
pub use model::{
    Answer, Author, Decision, DeferredAnswer, GuildId, IncomingMessage, MatchOutcome, MatchResult,
    QaPair,
};
pub use normalize::normalize;
pub use retrieval::cosine_similarity;
pub use sqlite_store::SqliteQaStore;
pub use storage::{read_pairs_jsonl, write_pairs_jsonl, JsonlBatch};
pub use store::{FaqService, ImportReport, MemoryQaStore, QaStore, RemoveOutcome};
pub use table::FaqTable;
pub use timeout_embed::{
    EmbedBusy, EmbedTimeout, TimeoutEmbeddingProvider, DEFAULT_EMBED_WORKERS,
};
