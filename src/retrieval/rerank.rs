//! Optional second-pass reranking over a bounded shortlist.
//!
//! The reranker only ever sees the shortlist the router hands it (a small
//! multiple of K, never the full store) and produces a total reordering:
//! no candidate is dropped or added. A scoring failure for an individual
//! candidate demotes that candidate to the bottom of the shortlist instead
//! of aborting the request.

use std::cmp::Ordering;

use crate::retrieval::backend::tokenize;
use crate::retrieval::types::SkillHit;
use crate::store::Card;

/// Trait for shortlist rerankers.
pub trait Reranker: Send + Sync {
    /// Short stable reranker name.
    fn name(&self) -> &'static str;

    /// Score one shortlist candidate against the query.
    ///
    /// # Errors
    ///
    /// An error demotes the candidate to the bottom of the shortlist; it
    /// never fails the whole request.
    fn score_candidate(&self, query: &str, card: &Card) -> Result<f64, anyhow::Error>;

    /// Reorder the shortlist by rerank score, descending.
    ///
    /// Ties are broken by the incoming rank so results stay deterministic.
    /// Candidates whose scoring failed sink to the bottom, keeping their
    /// relative incoming order. The returned list is always a permutation
    /// of the input.
    fn rerank(&self, query: &str, shortlist: Vec<SkillHit>) -> Vec<SkillHit> {
        let mut scored: Vec<(usize, Result<f64, anyhow::Error>, SkillHit)> = shortlist
            .into_iter()
            .enumerate()
            .map(|(position, hit)| {
                let score = self.score_candidate(query, &hit.card);
                if let Err(e) = &score {
                    log::warn!(
                        "Reranker '{}' failed on candidate '{}', demoting: {e}",
                        self.name(),
                        hit.card.id
                    );
                }
                (position, score, hit)
            })
            .collect();

        scored.sort_by(|a, b| match (&a.1, &b.1) {
            (Ok(x), Ok(y)) => y
                .partial_cmp(x)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => a.0.cmp(&b.0),
        });

        scored.into_iter().map(|(_, _, hit)| hit).collect()
    }
}

/// Lexical proximity reranker.
///
/// A more expensive pass than the first-stage scorer: rewards adjacent query
/// token pairs (bigrams) appearing in order in the card text, plus plain
/// unigram coverage. Cheap enough to run in-process, precise enough to pull
/// true matches back inside the top-K.
#[derive(Debug, Default)]
pub struct TermProximityReranker;

impl TermProximityReranker {
    /// Create a new proximity reranker.
    pub fn new() -> Self {
        Self
    }
}

impl Reranker for TermProximityReranker {
    fn name(&self) -> &'static str {
        "term-proximity"
    }

    fn score_candidate(&self, query: &str, card: &Card) -> Result<f64, anyhow::Error> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Ok(0.0);
        }

        let document = crate::retrieval::backend::card_document(card);
        let doc_tokens = tokenize(&document);

        let unigram_hits = query_tokens
            .iter()
            .filter(|token| doc_tokens.contains(token))
            .count() as f64;

        let mut bigram_hits = 0.0;
        for pair in query_tokens.windows(2) {
            let found = doc_tokens
                .windows(2)
                .any(|window| window[0] == pair[0] && window[1] == pair[1]);
            if found {
                bigram_hits += 1.0;
            }
        }

        let denominator = (query_tokens.len() + query_tokens.len().saturating_sub(1)) as f64;
        Ok((unigram_hits + 2.0 * bigram_hits) / denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, instructions: &str, rank: usize, score: f64) -> SkillHit {
        SkillHit {
            card: Card::new(id, instructions),
            score,
            rank,
            backend: "memory".to_string(),
        }
    }

    #[test]
    fn test_rerank_is_a_permutation() {
        let reranker = TermProximityReranker::new();
        let shortlist = vec![
            hit("a", "terraform cloud modules", 1, 0.9),
            hit("b", "spark etl pipeline tuning", 2, 0.8),
            hit("c", "nginx reverse proxy", 3, 0.7),
        ];
        let before: Vec<String> = shortlist.iter().map(|h| h.card.id.clone()).collect();

        let reordered = reranker.rerank("spark etl pipeline", shortlist);
        let mut after: Vec<String> = reordered.iter().map(|h| h.card.id.clone()).collect();
        after.sort();
        let mut expected = before;
        expected.sort();
        assert_eq!(after, expected);
    }

    #[test]
    fn test_phrase_match_outranks_scattered_tokens() {
        let reranker = TermProximityReranker::new();
        let shortlist = vec![
            hit("scattered", "pipeline things and etl somewhere spark", 1, 0.9),
            hit("phrase", "run a spark etl pipeline end to end", 2, 0.8),
        ];
        let reordered = reranker.rerank("spark etl pipeline", shortlist);
        assert_eq!(reordered[0].card.id, "phrase");
    }

    #[test]
    fn test_ties_keep_incoming_order() {
        let reranker = TermProximityReranker::new();
        let shortlist = vec![
            hit("first", "unrelated text", 1, 0.9),
            hit("second", "also unrelated", 2, 0.8),
        ];
        let reordered = reranker.rerank("spark", shortlist);
        assert_eq!(reordered[0].card.id, "first");
        assert_eq!(reordered[1].card.id, "second");
    }

    struct FailsOn(&'static str);

    impl Reranker for FailsOn {
        fn name(&self) -> &'static str {
            "fails-on"
        }

        fn score_candidate(&self, _query: &str, card: &Card) -> Result<f64, anyhow::Error> {
            if card.id == self.0 {
                anyhow::bail!("scoring model rejected candidate");
            }
            Ok(1.0)
        }
    }

    #[test]
    fn test_failed_candidate_is_demoted_not_dropped() {
        let reranker = FailsOn("b");
        let shortlist = vec![
            hit("a", "", 1, 0.9),
            hit("b", "", 2, 0.8),
            hit("c", "", 3, 0.7),
        ];
        let reordered = reranker.rerank("anything", shortlist);
        assert_eq!(reordered.len(), 3);
        assert_eq!(reordered.last().unwrap().card.id, "b");
    }
}
