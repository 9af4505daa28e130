//! Similarity backends: pluggable relevance scorers.
//!
//! A backend scores every card in a store against a free-text query and
//! returns a mapping from card id to a numeric relevance score, higher being
//! more relevant and deterministic for identical inputs. Two variants exist:
//! the always-available in-process lexical scorer ([`MemoryBackend`]) and the
//! persistent Chroma vector index ([`ChromaBackend`]). `auto` selection is a
//! policy over the two, not a third backend: it probes Chroma and degrades to
//! memory with an advisory rather than failing the request.

pub mod chroma;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::SkillmeshError;
use crate::retrieval::types::BackendChoice;
use crate::store::{Card, CardStore};

pub use chroma::{ChromaBackend, ChromaConfig, IndexSyncPolicy};
pub use memory::MemoryBackend;

/// Trait for similarity scoring backends.
///
/// Implementations must be deterministic: the same query against the same
/// store snapshot yields the same score mapping.
#[async_trait]
pub trait SimilarityBackend: Send + Sync {
    /// Short stable backend name (e.g. "memory", "chroma").
    fn name(&self) -> &'static str;

    /// Score every card in the store against the query.
    ///
    /// # Returns
    ///
    /// A mapping from card id to relevance score. Cards the backend could
    /// not score (e.g. not yet indexed under a manual sync policy) are
    /// absent from the mapping and reported through logging.
    async fn score(
        &self,
        query: &str,
        store: &CardStore,
    ) -> Result<HashMap<String, f64>, anyhow::Error>;
}

/// Split text into lowercase alphanumeric tokens.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Flatten a card into the text the backends score and index.
///
/// Field order is fixed so the memory scorer and the persistent index see
/// the same document for the same card.
pub(crate) fn card_document(card: &Card) -> String {
    let mut parts: Vec<&str> = vec![&card.id, &card.title, &card.description];
    for tag in &card.tags {
        parts.push(tag);
    }
    parts.push(&card.instructions);
    parts
        .iter()
        .filter(|part| !part.trim().is_empty())
        .copied()
        .collect::<Vec<&str>>()
        .join("\n")
}

/// Resolve a backend choice into a concrete scorer.
///
/// # Arguments
///
/// * `choice` - Caller's backend selector.
/// * `chroma` - Opaque persistent-index configuration, if any was supplied.
///
/// # Returns
///
/// The backend plus an advisory note when `auto` degraded to the in-process
/// scorer because the persistent index was unreachable.
///
/// # Errors
///
/// `BackendUnavailable` only when `Chroma` was requested explicitly and
/// could not be initialized; `auto` never raises it.
pub async fn resolve_backend(
    choice: BackendChoice,
    chroma: Option<&ChromaConfig>,
) -> Result<(Box<dyn SimilarityBackend>, Option<String>), SkillmeshError> {
    match choice {
        BackendChoice::Memory => Ok((Box::new(MemoryBackend::new()), None)),
        BackendChoice::Chroma => {
            let config = chroma.ok_or_else(|| SkillmeshError::BackendUnavailable {
                backend: "chroma".to_string(),
                reason: "no persistent index configured".to_string(),
            })?;
            let backend = ChromaBackend::connect(config.clone()).await.map_err(|e| {
                SkillmeshError::BackendUnavailable {
                    backend: "chroma".to_string(),
                    reason: e.to_string(),
                }
            })?;
            Ok((Box::new(backend), None))
        }
        BackendChoice::Auto => {
            let Some(config) = chroma else {
                return Ok((Box::new(MemoryBackend::new()), None));
            };
            match ChromaBackend::connect(config.clone()).await {
                Ok(backend) => Ok((Box::new(backend), None)),
                Err(e) => {
                    log::warn!(
                        "Persistent index unreachable at {}, falling back to memory backend: {e}",
                        config.base_url
                    );
                    Ok((
                        Box::new(MemoryBackend::new()),
                        Some(format!(
                            "persistent index unreachable ({e}); scored with in-process backend"
                        )),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Provenance;

    #[test]
    fn test_tokenize_lowercases_and_splits_punctuation() {
        assert_eq!(
            tokenize("Build a Spark/ETL pipeline!"),
            vec!["build", "a", "spark", "etl", "pipeline"]
        );
        assert!(tokenize("  ").is_empty());
    }

    #[test]
    fn test_card_document_skips_empty_fields() {
        let card = Card::new("data.spark", "Run Spark jobs")
            .with_title("Spark")
            .with_tags(vec!["etl".to_string()]);
        let document = card_document(&card);
        assert_eq!(document, "data.spark\nSpark\netl\nRun Spark jobs");
    }

    #[tokio::test]
    async fn test_auto_without_config_resolves_to_memory_silently() {
        let (backend, advisory) = resolve_backend(BackendChoice::Auto, None).await.unwrap();
        assert_eq!(backend.name(), "memory");
        assert!(advisory.is_none());
    }

    #[tokio::test]
    async fn test_auto_with_unreachable_index_falls_back_with_advisory() {
        let config = ChromaConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..ChromaConfig::default()
        };
        let (backend, advisory) = resolve_backend(BackendChoice::Auto, Some(&config))
            .await
            .unwrap();
        assert_eq!(backend.name(), "memory");
        assert!(advisory.unwrap().contains("in-process"));
    }

    #[tokio::test]
    async fn test_explicit_chroma_failure_is_backend_unavailable() {
        let config = ChromaConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..ChromaConfig::default()
        };
        let result = resolve_backend(BackendChoice::Chroma, Some(&config)).await;
        assert!(matches!(
            result,
            Err(SkillmeshError::BackendUnavailable { .. })
        ));

        let unconfigured = resolve_backend(BackendChoice::Chroma, None).await;
        assert!(matches!(
            unconfigured,
            Err(SkillmeshError::BackendUnavailable { .. })
        ));
    }

    #[test]
    fn test_memory_backend_scores_nonempty_store() {
        let store = CardStore::from_cards(
            vec![Card::new("data.spark", "Run Spark ETL jobs")],
            Provenance::Registry,
        );
        tokio_test::block_on(async {
            let (backend, _) = resolve_backend(BackendChoice::Memory, None).await.unwrap();
            let scores = backend.score("spark", &store).await.unwrap();
            assert_eq!(scores.len(), 1);
        });
    }
}
