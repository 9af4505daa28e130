//! Query-driven retrieval: similarity backends, reranking, routing, and
//! context assembly.
//!
//! Data flow: `query + store + options -> Router -> (SimilarityBackend ->
//! shortlist -> Reranker) -> top-K truncation -> context assembler`.

pub mod backend;
pub mod context;
pub mod embeddings;
pub mod rerank;
pub mod router;
pub mod types;

pub use backend::{
    resolve_backend, ChromaBackend, ChromaConfig, IndexSyncPolicy, MemoryBackend,
    SimilarityBackend,
};
pub use context::{assemble, Provider, MIN_INSTRUCTION_CHARS, TRUNCATION_MARKER};
pub use rerank::{Reranker, TermProximityReranker};
pub use router::{Router, DEFAULT_SCORE_TIMEOUT, SHORTLIST_MULTIPLIER};
pub use types::{BackendChoice, RetrievalOptions, RoutedResult, SkillHit};
