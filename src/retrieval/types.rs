//! Type definitions for the retrieval pipeline.

use serde::{Deserialize, Serialize};

use crate::error::SkillmeshError;
use crate::store::Card;

/// Similarity backend selector.
///
/// `Auto` prefers the persistent Chroma index when one is configured and
/// reachable, and falls back to the in-process backend otherwise. Explicitly
/// requesting `Chroma` makes initialization failures fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Prefer the persistent index, fall back to memory.
    #[default]
    Auto,
    /// In-process lexical scoring, always available.
    Memory,
    /// Persistent Chroma vector index.
    #[serde(alias = "persistent-index")]
    Chroma,
}

impl std::fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendChoice::Auto => write!(f, "auto"),
            BackendChoice::Memory => write!(f, "memory"),
            BackendChoice::Chroma => write!(f, "chroma"),
        }
    }
}

impl std::str::FromStr for BackendChoice {
    type Err = SkillmeshError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendChoice::Auto),
            "memory" => Ok(BackendChoice::Memory),
            "chroma" | "persistent-index" => Ok(BackendChoice::Chroma),
            other => Err(SkillmeshError::invalid_argument(format!(
                "`backend` must be one of: auto, memory, chroma (got '{other}')"
            ))),
        }
    }
}

/// Caller options for a single retrieval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOptions {
    /// Which similarity backend to use.
    #[serde(default)]
    pub backend: BackendChoice,
    /// Number of cards to return. Must be at least 1.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Whether to run the reranking pass over the shortlist.
    #[serde(default)]
    pub rerank: bool,
    /// Per-card instruction character cap applied by the context assembler.
    #[serde(default = "default_instruction_chars")]
    pub instruction_chars: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_instruction_chars() -> usize {
    700
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            backend: BackendChoice::Auto,
            top_k: default_top_k(),
            rerank: false,
            instruction_chars: default_instruction_chars(),
        }
    }
}

/// A ranked retrieval hit: one card with its relevance score and position.
///
/// Produced transiently per query, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillHit {
    /// The retrieved card.
    pub card: Card,
    /// Relevance score from the similarity backend (higher is better).
    pub score: f64,
    /// 1-based position in the final ranking.
    pub rank: usize,
    /// Name of the backend that produced the score.
    pub backend: String,
}

/// The outcome of a routed retrieval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedResult {
    /// At most `top_k` hits, highest relevance first.
    pub hits: Vec<SkillHit>,
    /// Name of the backend that actually served the request.
    pub backend: String,
    /// Advisory note when `auto` degraded to the in-process backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_choice_parsing() {
        assert_eq!("auto".parse::<BackendChoice>().unwrap(), BackendChoice::Auto);
        assert_eq!(
            "Memory".parse::<BackendChoice>().unwrap(),
            BackendChoice::Memory
        );
        assert_eq!(
            "chroma".parse::<BackendChoice>().unwrap(),
            BackendChoice::Chroma
        );
        assert_eq!(
            "persistent-index".parse::<BackendChoice>().unwrap(),
            BackendChoice::Chroma
        );
        assert!("pinecone".parse::<BackendChoice>().is_err());
    }

    #[test]
    fn test_default_options() {
        let options = RetrievalOptions::default();
        assert_eq!(options.backend, BackendChoice::Auto);
        assert_eq!(options.top_k, 5);
        assert!(!options.rerank);
        assert_eq!(options.instruction_chars, 700);
    }
}
