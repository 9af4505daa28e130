//! Context assembly: render ranked hits into a bounded, parseable block.
//!
//! The output is a self-contained structured block with unambiguous card
//! boundaries so a consumer can split it mechanically. Two flavors exist:
//! a tagged block for Claude-style runtimes and a markdown block for
//! Codex-style runtimes. Per-card instructions are truncated to the caller's
//! character cap on a `char` boundary (never splitting a multi-byte
//! character) with a truncation marker appended when cut.

use serde::{Deserialize, Serialize};

use crate::error::SkillmeshError;
use crate::retrieval::types::SkillHit;

/// Marker appended to instructions cut at the character cap.
pub const TRUNCATION_MARKER: &str = "…";

/// Smallest accepted per-card instruction cap.
pub const MIN_INSTRUCTION_CHARS: usize = 100;

/// Target context flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Tagged block with explicit card elements.
    #[default]
    Claude,
    /// Markdown block with per-card sections.
    Codex,
}

impl std::str::FromStr for Provider {
    type Err = SkillmeshError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(Provider::Claude),
            "codex" => Ok(Provider::Codex),
            other => Err(SkillmeshError::invalid_argument(format!(
                "`provider` must be one of: claude, codex (got '{other}')"
            ))),
        }
    }
}

/// Truncate text to `cap` characters, appending the marker when cut.
///
/// Counts `char`s, not bytes, so multi-byte characters are never split.
fn truncate_instructions(text: &str, cap: usize) -> String {
    match text.char_indices().nth(cap) {
        None => text.to_string(),
        Some((byte_offset, _)) => {
            let mut truncated = text[..byte_offset].to_string();
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
    }
}

/// Escape a value for use inside a double-quoted attribute.
fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render ranked hits into a single structured context block.
///
/// Card order matches ranking order, highest relevance first.
///
/// # Arguments
///
/// * `query` - The routed query, echoed into the block header.
/// * `hits` - Ranked hits from the router.
/// * `provider` - Output flavor.
/// * `instruction_chars` - Per-card instruction character cap.
pub fn assemble(
    query: &str,
    hits: &[SkillHit],
    provider: Provider,
    instruction_chars: usize,
) -> String {
    match provider {
        Provider::Claude => assemble_claude(query, hits, instruction_chars),
        Provider::Codex => assemble_codex(query, hits, instruction_chars),
    }
}

fn assemble_claude(query: &str, hits: &[SkillHit], instruction_chars: usize) -> String {
    let mut block = String::new();
    block.push_str(&format!(
        "<skillmesh-context query=\"{}\">\n",
        escape_attr(query)
    ));
    for hit in hits {
        block.push_str(&format!(
            "<skill-card id=\"{}\" title=\"{}\" rank=\"{}\" score=\"{:.4}\" tags=\"{}\">\n",
            escape_attr(&hit.card.id),
            escape_attr(&hit.card.title),
            hit.rank,
            hit.score,
            escape_attr(&hit.card.tags.join(",")),
        ));
        block.push_str(&truncate_instructions(
            &hit.card.instructions,
            instruction_chars,
        ));
        block.push_str("\n</skill-card>\n");
    }
    block.push_str("</skillmesh-context>\n");
    block
}

fn assemble_codex(query: &str, hits: &[SkillHit], instruction_chars: usize) -> String {
    let mut block = String::new();
    block.push_str("## SkillMesh Context\n\n");
    block.push_str(&format!("Query: {query}\n"));
    for hit in hits {
        block.push_str(&format!(
            "\n### {}. {} (score {:.4})\n",
            hit.rank, hit.card.id, hit.score
        ));
        if !hit.card.title.is_empty() {
            block.push_str(&format!("Title: {}\n", hit.card.title));
        }
        if !hit.card.tags.is_empty() {
            block.push_str(&format!("Tags: {}\n", hit.card.tags.join(", ")));
        }
        block.push('\n');
        block.push_str(&truncate_instructions(
            &hit.card.instructions,
            instruction_chars,
        ));
        block.push('\n');
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Card;

    fn hit_with_instructions(instructions: &str) -> SkillHit {
        SkillHit {
            card: Card::new("data.spark", instructions)
                .with_title("Spark ETL")
                .with_tags(vec!["etl".to_string()]),
            score: 0.8321,
            rank: 1,
            backend: "memory".to_string(),
        }
    }

    #[test]
    fn test_truncation_at_cap_with_marker() {
        let long = "x".repeat(200);
        let hit = hit_with_instructions(&long);
        let block = assemble("query", &[hit], Provider::Claude, 50);

        let expected = format!("{}{}", "x".repeat(50), TRUNCATION_MARKER);
        assert!(block.contains(&expected));
        assert!(!block.contains(&"x".repeat(51)));
    }

    #[test]
    fn test_short_instructions_are_not_marked() {
        let hit = hit_with_instructions("short text");
        let block = assemble("query", &[hit], Provider::Claude, 50);
        assert!(block.contains("short text"));
        assert!(!block.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncation_respects_multibyte_boundaries() {
        let text = "héllo wörld ".repeat(20);
        let truncated = truncate_instructions(&text, 17);
        assert_eq!(truncated.chars().count(), 17 + TRUNCATION_MARKER.chars().count());
        assert!(truncated.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_claude_block_has_unambiguous_card_boundaries() {
        let hits = vec![hit_with_instructions("do the thing")];
        let block = assemble("build etl", &hits, Provider::Claude, 700);
        assert!(block.starts_with("<skillmesh-context query=\"build etl\">"));
        assert!(block.contains("<skill-card id=\"data.spark\""));
        assert!(block.contains("rank=\"1\""));
        assert!(block.contains("score=\"0.8321\""));
        assert!(block.contains("</skill-card>"));
        assert!(block.trim_end().ends_with("</skillmesh-context>"));
    }

    #[test]
    fn test_codex_block_orders_cards_by_rank() {
        let mut second = hit_with_instructions("other");
        second.card.id = "devops.nginx".to_string();
        second.rank = 2;
        let hits = vec![hit_with_instructions("first"), second];

        let block = assemble("q", &hits, Provider::Codex, 700);
        let first_pos = block.find("### 1. data.spark").unwrap();
        let second_pos = block.find("### 2. devops.nginx").unwrap();
        assert!(first_pos < second_pos);
    }

    #[test]
    fn test_attribute_values_are_escaped() {
        let mut hit = hit_with_instructions("text");
        hit.card.title = "Spark \"fast\" <etl>".to_string();
        let block = assemble("q", &[hit], Provider::Claude, 700);
        assert!(block.contains("title=\"Spark &quot;fast&quot; &lt;etl&gt;\""));
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("claude".parse::<Provider>().unwrap(), Provider::Claude);
        assert_eq!("Codex".parse::<Provider>().unwrap(), Provider::Codex);
        assert!("gemini".parse::<Provider>().is_err());
    }
}
