//! Query router: orchestrates backend scoring, reranking, and truncation.
//!
//! `route` is the main entry point for query-driven retrieval: it resolves
//! the similarity backend, requests an expanded shortlist (a cheap first-pass
//! scorer may rank true best matches just outside the top-K, so the reranker
//! needs a wider net), optionally reranks, and truncates to K. Every request
//! is read-only against the store snapshot and safe to run in parallel with
//! other retrieval and install operations.

use std::cmp::Ordering;
use std::time::Duration;

use crate::error::SkillmeshError;
use crate::retrieval::backend::{resolve_backend, ChromaConfig, MemoryBackend, SimilarityBackend};
use crate::retrieval::rerank::{Reranker, TermProximityReranker};
use crate::retrieval::types::{BackendChoice, RetrievalOptions, RoutedResult, SkillHit};
use crate::store::CardStore;

/// Shortlist expansion factor: the backend is asked for
/// `max(K, SHORTLIST_MULTIPLIER * K)` candidates before reranking.
pub const SHORTLIST_MULTIPLIER: usize = 4;

/// Default bound on a single backend scoring call.
pub const DEFAULT_SCORE_TIMEOUT: Duration = Duration::from_secs(10);

/// The retrieval router.
pub struct Router {
    reranker: Box<dyn Reranker>,
    chroma: Option<ChromaConfig>,
    score_timeout: Duration,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Router {
    /// Create a router with the default proximity reranker.
    ///
    /// # Arguments
    ///
    /// * `chroma` - Persistent-index configuration; `None` means `auto`
    ///   resolves to the in-process backend without an advisory.
    pub fn new(chroma: Option<ChromaConfig>) -> Self {
        Self {
            reranker: Box::new(TermProximityReranker::new()),
            chroma,
            score_timeout: DEFAULT_SCORE_TIMEOUT,
        }
    }

    /// Replace the reranker implementation.
    pub fn with_reranker(mut self, reranker: Box<dyn Reranker>) -> Self {
        self.reranker = reranker;
        self
    }

    /// Bound a single backend scoring call.
    pub fn with_score_timeout(mut self, timeout: Duration) -> Self {
        self.score_timeout = timeout;
        self
    }

    /// Route a query to the most relevant cards in the store.
    ///
    /// # Returns
    ///
    /// At most `options.top_k` hits ordered by non-increasing score, ties
    /// broken by ascending card id. An empty store yields an empty result,
    /// not an error.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty query or `top_k` of zero;
    /// `BackendUnavailable` when an explicitly requested backend cannot be
    /// initialized or times out. `auto` absorbs backend failures and
    /// degrades to the in-process scorer, noting it in the advisory.
    pub async fn route(
        &self,
        query: &str,
        store: &CardStore,
        options: &RetrievalOptions,
    ) -> Result<RoutedResult, SkillmeshError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SkillmeshError::invalid_argument(
                "`query` must be a non-empty string",
            ));
        }
        if options.top_k == 0 {
            return Err(SkillmeshError::invalid_argument("`top_k` must be >= 1"));
        }

        let (backend, mut advisory) =
            resolve_backend(options.backend, self.chroma.as_ref()).await?;
        let mut backend_name = backend.name().to_string();

        if store.is_empty() {
            return Ok(RoutedResult {
                hits: Vec::new(),
                backend: backend_name,
                advisory,
            });
        }

        let scores = match self.score_bounded(backend.as_ref(), query, store).await {
            Ok(scores) => scores,
            Err(reason) => {
                // Scoring failed after a successful init. Under auto we
                // degrade to the in-process backend for this request; an
                // explicitly requested backend surfaces the failure.
                if options.backend != BackendChoice::Auto {
                    return Err(SkillmeshError::BackendUnavailable {
                        backend: backend_name,
                        reason,
                    });
                }
                log::warn!(
                    "Backend '{backend_name}' failed mid-request, rescoring in-process: {reason}"
                );
                advisory = Some(format!(
                    "backend '{backend_name}' failed ({reason}); scored with in-process backend"
                ));
                backend_name = "memory".to_string();
                self.score_bounded(&MemoryBackend::new(), query, store)
                    .await
                    .map_err(|reason| SkillmeshError::BackendUnavailable {
                        backend: "memory".to_string(),
                        reason,
                    })?
            }
        };

        let mut candidates: Vec<(String, f64)> = scores.into_iter().collect();
        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let shortlist_len = options.top_k.max(SHORTLIST_MULTIPLIER * options.top_k);
        candidates.truncate(shortlist_len);

        let shortlist: Vec<SkillHit> = candidates
            .into_iter()
            .filter_map(|(id, score)| {
                store.get(&id).map(|card| SkillHit {
                    card: card.clone(),
                    score,
                    rank: 0,
                    backend: backend_name.clone(),
                })
            })
            .collect();

        let mut hits = if options.rerank {
            self.reranker.rerank(query, shortlist)
        } else {
            shortlist
        };
        hits.truncate(options.top_k);
        for (position, hit) in hits.iter_mut().enumerate() {
            hit.rank = position + 1;
        }

        Ok(RoutedResult {
            hits,
            backend: backend_name,
            advisory,
        })
    }

    async fn score_bounded(
        &self,
        backend: &dyn SimilarityBackend,
        query: &str,
        store: &CardStore,
    ) -> Result<std::collections::HashMap<String, f64>, String> {
        match tokio::time::timeout(self.score_timeout, backend.score(query, store)).await {
            Ok(Ok(scores)) => Ok(scores),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "scoring timed out after {:?}",
                self.score_timeout
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Card, Provenance};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn sample_store() -> CardStore {
        CardStore::from_cards(
            vec![
                Card::new("data.spark", "Use Spark for distributed ETL jobs")
                    .with_title("Spark ETL")
                    .with_tags(vec!["etl".to_string(), "data".to_string()]),
                Card::new("data.airflow", "Orchestrate ETL DAGs with Airflow")
                    .with_title("Airflow")
                    .with_tags(vec!["etl".to_string()]),
                Card::new("devops.nginx", "Configure nginx as a reverse proxy")
                    .with_title("Nginx"),
                Card::new("cloud.terraform", "Provision infrastructure with Terraform")
                    .with_title("Terraform"),
            ],
            Provenance::Registry,
        )
    }

    fn memory_options(top_k: usize) -> RetrievalOptions {
        RetrievalOptions {
            backend: BackendChoice::Memory,
            top_k,
            ..RetrievalOptions::default()
        }
    }

    #[tokio::test]
    async fn test_route_returns_at_most_k_ordered_hits() {
        let router = Router::default();
        let result = router
            .route("spark etl", &sample_store(), &memory_options(2))
            .await
            .unwrap();

        assert!(result.hits.len() <= 2);
        assert_eq!(result.hits[0].card.id, "data.spark");
        for pair in result.hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(result.hits[0].rank, 1);
        assert_eq!(result.backend, "memory");
        assert!(result.advisory.is_none());
    }

    #[tokio::test]
    async fn test_route_is_deterministic() {
        let router = Router::default();
        let store = sample_store();
        let options = memory_options(4);
        let first = router.route("etl jobs", &store, &options).await.unwrap();
        let second = router.route("etl jobs", &store, &options).await.unwrap();

        let ids = |result: &RoutedResult| -> Vec<String> {
            result.hits.iter().map(|h| h.card.id.clone()).collect()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn test_score_ties_break_by_ascending_card_id() {
        let store = CardStore::from_cards(
            vec![
                Card::new("zeta.card", "wholly unrelated"),
                Card::new("alpha.card", "wholly unrelated"),
            ],
            Provenance::Registry,
        );
        let router = Router::default();
        let result = router
            .route("no overlap here", &store, &memory_options(2))
            .await
            .unwrap();
        assert_eq!(result.hits[0].card.id, "alpha.card");
        assert_eq!(result.hits[1].card.id, "zeta.card");
    }

    #[tokio::test]
    async fn test_empty_store_returns_empty_result() {
        let router = Router::default();
        let store = CardStore::new(Provenance::Registry);
        let result = router
            .route("anything", &store, &memory_options(3))
            .await
            .unwrap();
        assert!(result.hits.is_empty());
    }

    #[tokio::test]
    async fn test_zero_top_k_is_invalid_argument() {
        let router = Router::default();
        let result = router
            .route("query", &sample_store(), &memory_options(0))
            .await;
        assert!(matches!(result, Err(SkillmeshError::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn test_empty_query_is_invalid_argument() {
        let router = Router::default();
        let result = router
            .route("   ", &sample_store(), &memory_options(3))
            .await;
        assert!(matches!(result, Err(SkillmeshError::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn test_rerank_preserves_candidate_set() {
        let router = Router::default();
        let store = sample_store();
        let mut options = memory_options(4);
        let plain = router.route("etl spark airflow", &store, &options).await.unwrap();
        options.rerank = true;
        let reranked = router.route("etl spark airflow", &store, &options).await.unwrap();

        let set = |result: &RoutedResult| -> std::collections::BTreeSet<String> {
            result.hits.iter().map(|h| h.card.id.clone()).collect()
        };
        assert_eq!(set(&plain), set(&reranked));
    }

    #[tokio::test]
    async fn test_auto_with_unreachable_index_still_returns_hits() {
        init_logging();
        let config = ChromaConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..ChromaConfig::default()
        };
        let router = Router::new(Some(config));
        let options = RetrievalOptions {
            backend: BackendChoice::Auto,
            top_k: 3,
            ..RetrievalOptions::default()
        };
        let result = router.route("spark etl", &sample_store(), &options).await.unwrap();
        assert_eq!(result.backend, "memory");
        assert!(result.advisory.is_some());
        assert!(!result.hits.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_chroma_unreachable_is_backend_unavailable() {
        let config = ChromaConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..ChromaConfig::default()
        };
        let router = Router::new(Some(config));
        let options = RetrievalOptions {
            backend: BackendChoice::Chroma,
            top_k: 3,
            ..RetrievalOptions::default()
        };
        let result = router.route("spark etl", &sample_store(), &options).await;
        assert!(matches!(
            result,
            Err(SkillmeshError::BackendUnavailable { .. })
        ));
    }
}
