//! Chroma persistent-index backend.
//!
//! Keeps a durable vector collection keyed by card id on a Chroma server and
//! scores queries with a nearest-neighbor search. Vectors come from the
//! in-process [`HashedEmbedder`], so indexing and querying stay deterministic
//! without a network embedding provider. Index staleness is a configurable
//! policy: under [`IndexSyncPolicy::Auto`] cards missing from the collection
//! are upserted before every score call; under [`IndexSyncPolicy::Manual`]
//! they are reported as unscored and indexing is the caller's responsibility
//! (via [`ChromaBackend::index`]).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{card_document, SimilarityBackend};
use crate::retrieval::embeddings::HashedEmbedder;
use crate::store::CardStore;

/// How the persistent index is kept in sync with the card store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexSyncPolicy {
    /// Upsert cards missing from the index before each score call.
    #[default]
    Auto,
    /// Never index implicitly; unindexed cards are reported as unscored.
    Manual,
}

/// Opaque connection parameters for the Chroma backend.
///
/// Interpreting environment-specific precedence (env vars, config files) is
/// the caller's concern; the core only consumes the resolved values.
#[derive(Debug, Clone)]
pub struct ChromaConfig {
    /// Base URL of the Chroma server.
    pub base_url: String,
    /// Collection holding the card vectors.
    pub collection: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Staleness policy for cards added after the last index build.
    pub sync_policy: IndexSyncPolicy,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            collection: "skillmesh_experts".to_string(),
            request_timeout: Duration::from_secs(10),
            sync_policy: IndexSyncPolicy::Auto,
        }
    }
}

/// Sanitize a collection name for Chroma.
///
/// Chroma requires 3-63 characters from [a-zA-Z0-9_-]. Anything outside
/// that set, including non-ASCII letters, maps to `_`.
fn sanitize_collection_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.len() > 63 {
        sanitized.chars().take(63).collect()
    } else if sanitized.len() < 3 {
        format!("{sanitized:_<3}")
    } else {
        sanitized
    }
}

/// Persistent vector-index backend over the Chroma HTTP API.
pub struct ChromaBackend {
    http: reqwest::Client,
    base_url: String,
    collection_id: String,
    sync_policy: IndexSyncPolicy,
    embedder: HashedEmbedder,
}

impl ChromaBackend {
    /// Connect to the Chroma server and open (or create) the collection.
    ///
    /// # Errors
    ///
    /// Fails when the server is unreachable or the collection cannot be
    /// created. Under `auto` selection the caller absorbs this failure and
    /// falls back to the in-process backend.
    pub async fn connect(config: ChromaConfig) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("building HTTP client")?;
        let base_url = config.base_url.trim_end_matches('/').to_string();

        http.get(format!("{base_url}/api/v1/heartbeat"))
            .send()
            .await
            .context("chroma heartbeat failed")?
            .error_for_status()
            .context("chroma heartbeat returned an error status")?;

        let collection_name = sanitize_collection_name(&config.collection);
        let created: Value = http
            .post(format!("{base_url}/api/v1/collections"))
            .json(&json!({ "name": collection_name, "get_or_create": true }))
            .send()
            .await
            .context("creating chroma collection")?
            .error_for_status()
            .context("chroma rejected collection creation")?
            .json()
            .await
            .context("decoding chroma collection response")?;
        let collection_id = created
            .get("id")
            .and_then(Value::as_str)
            .context("chroma collection response missing 'id'")?
            .to_string();

        log::info!(
            "Connected to chroma at {base_url}, collection '{collection_name}' ({collection_id})"
        );

        Ok(Self {
            http,
            base_url,
            collection_id,
            sync_policy: config.sync_policy,
            embedder: HashedEmbedder::default(),
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{suffix}",
            self.base_url, self.collection_id
        )
    }

    /// Store ids absent from a score mapping.
    ///
    /// The collection may be shared with other stores, so foreign entries
    /// can crowd store cards out of the nearest-neighbor result.
    fn unscored_ids(store: &CardStore, scores: &HashMap<String, f64>) -> Vec<String> {
        store
            .ids()
            .filter(|id| !scores.contains_key(*id))
            .map(str::to_string)
            .collect()
    }

    /// Ids from the store that are already present in the collection.
    async fn indexed_ids(&self, store: &CardStore) -> Result<HashSet<String>, anyhow::Error> {
        let ids: Vec<&str> = store.ids().collect();
        let response: Value = self
            .http
            .post(self.collection_url("get"))
            .json(&json!({ "ids": ids, "include": [] }))
            .send()
            .await
            .context("querying indexed ids")?
            .error_for_status()?
            .json()
            .await
            .context("decoding indexed ids")?;

        let present = response
            .get("ids")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(present)
    }

    /// Index every card in the store that is not yet in the collection.
    ///
    /// Existing entries are left untouched; documents and vectors are
    /// derived from the card text, so re-running against an unchanged store
    /// is a no-op. Returns the ids that were newly indexed.
    pub async fn index(&self, store: &CardStore) -> Result<Vec<String>, anyhow::Error> {
        let present = self.indexed_ids(store).await?;
        let missing: Vec<&crate::store::Card> = store
            .cards()
            .filter(|card| !present.contains(&card.id))
            .collect();
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = missing.iter().map(|card| card.id.clone()).collect();
        let documents: Vec<String> = missing.iter().map(|card| card_document(card)).collect();
        let embeddings = self.embedder.embed_batch(&documents);

        self.http
            .post(self.collection_url("add"))
            .json(&json!({
                "ids": ids,
                "documents": documents,
                "embeddings": embeddings,
            }))
            .send()
            .await
            .context("adding cards to chroma index")?
            .error_for_status()
            .context("chroma rejected index update")?;

        log::info!("Indexed {} cards into chroma collection", ids.len());
        Ok(ids)
    }
}

#[async_trait]
impl SimilarityBackend for ChromaBackend {
    fn name(&self) -> &'static str {
        "chroma"
    }

    async fn score(
        &self,
        query: &str,
        store: &CardStore,
    ) -> Result<HashMap<String, f64>, anyhow::Error> {
        if store.is_empty() {
            return Ok(HashMap::new());
        }

        match self.sync_policy {
            IndexSyncPolicy::Auto => {
                self.index(store).await?;
            }
            IndexSyncPolicy::Manual => {
                let present = self.indexed_ids(store).await?;
                let unscored: Vec<&str> = store
                    .ids()
                    .filter(|id| !present.contains(*id))
                    .collect();
                if !unscored.is_empty() {
                    log::warn!(
                        "{} cards not in the persistent index and left unscored: {}",
                        unscored.len(),
                        unscored.join(", ")
                    );
                }
            }
        }

        let query_embedding = self.embedder.embed(query);
        let response: Value = self
            .http
            .post(self.collection_url("query"))
            .json(&json!({
                "query_embeddings": [query_embedding],
                "n_results": store.len(),
                "include": ["distances"],
            }))
            .send()
            .await
            .context("chroma nearest-neighbor query failed")?
            .error_for_status()?
            .json()
            .await
            .context("decoding chroma query response")?;

        let ids = response
            .get("ids")
            .and_then(Value::as_array)
            .and_then(|outer| outer.first())
            .and_then(Value::as_array)
            .context("chroma query response missing ids")?;
        let distances = response
            .get("distances")
            .and_then(Value::as_array)
            .and_then(|outer| outer.first())
            .and_then(Value::as_array)
            .context("chroma query response missing distances")?;

        let mut scores = HashMap::with_capacity(ids.len());
        for (id, distance) in ids.iter().zip(distances.iter()) {
            let (Some(id), Some(distance)) = (id.as_str(), distance.as_f64()) else {
                continue;
            };
            // Only score ids that exist in this store snapshot; the
            // collection may hold cards from other registries.
            if store.contains(id) {
                scores.insert(id.to_string(), 1.0 / (1.0 + distance));
            }
        }

        let unscored = Self::unscored_ids(store, &scores);
        if !unscored.is_empty() {
            log::warn!(
                "{} cards absent from the nearest-neighbor result and left unscored: {}",
                unscored.len(),
                unscored.join(", ")
            );
        }
        Ok(scores)
    }
}
