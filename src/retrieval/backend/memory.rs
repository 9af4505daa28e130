//! In-process lexical similarity backend.
//!
//! Scores every card in the store by weighted token overlap between the
//! query and the card's fields. Always available with no external
//! dependency; precision degrades on large stores compared to the
//! persistent vector index, which is why `auto` prefers the index when
//! reachable.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use super::{tokenize, SimilarityBackend};
use crate::store::{Card, CardStore};

// Field weights, roughly mirroring how often a field names the capability
// the caller is asking for.
const WEIGHT_TITLE: f64 = 3.0;
const WEIGHT_TAGS: f64 = 2.5;
const WEIGHT_ID: f64 = 2.0;
const WEIGHT_DESCRIPTION: f64 = 1.5;
const WEIGHT_INSTRUCTIONS: f64 = 1.0;

/// Lexical token-overlap scorer.
#[derive(Debug, Default)]
pub struct MemoryBackend;

impl MemoryBackend {
    /// Create a new in-process backend.
    pub fn new() -> Self {
        Self
    }

    fn score_card(query_tokens: &[String], card: &Card) -> f64 {
        if query_tokens.is_empty() {
            return 0.0;
        }

        let title: HashSet<String> = tokenize(&card.title).into_iter().collect();
        let id: HashSet<String> = tokenize(&card.id).into_iter().collect();
        let description: HashSet<String> = tokenize(&card.description).into_iter().collect();
        let instructions: HashSet<String> = tokenize(&card.instructions).into_iter().collect();
        let tags: HashSet<String> = card
            .tags
            .iter()
            .flat_map(|tag| tokenize(tag))
            .collect();

        let mut total = 0.0;
        let mut seen: HashSet<&str> = HashSet::new();
        for token in query_tokens {
            // Count each distinct query token once.
            if !seen.insert(token.as_str()) {
                continue;
            }
            if title.contains(token) {
                total += WEIGHT_TITLE;
            }
            if tags.contains(token) {
                total += WEIGHT_TAGS;
            }
            if id.contains(token) {
                total += WEIGHT_ID;
            }
            if description.contains(token) {
                total += WEIGHT_DESCRIPTION;
            }
            if instructions.contains(token) {
                total += WEIGHT_INSTRUCTIONS;
            }
        }

        total / seen.len() as f64
    }
}

#[async_trait]
impl SimilarityBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn score(
        &self,
        query: &str,
        store: &CardStore,
    ) -> Result<HashMap<String, f64>, anyhow::Error> {
        let query_tokens = tokenize(query);
        let mut scores = HashMap::with_capacity(store.len());
        for card in store.cards() {
            scores.insert(card.id.clone(), Self::score_card(&query_tokens, card));
        }
        Ok(scores)
    }
}
