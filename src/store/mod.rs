//! Card store: the in-memory catalog/registry of skill cards.
//!
//! A `CardStore` is a fully materialized mapping from card id to [`Card`].
//! Loading from and persisting to disk (YAML/JSON) is the caller's concern;
//! the core only ever sees the materialized mapping and hands back an updated
//! one after installation. Catalog and registry are the same type,
//! distinguished by a [`Provenance`] tag and a mutability policy: only the
//! role installer mutates a registry, and nothing mutates a catalog.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named, retrievable unit of instructional content.
///
/// Cards are the atoms of the system: retrieval scores them against a query,
/// the context assembler renders them, and the role installer copies them
/// between stores. The `id` is stable across catalog and registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Unique identifier, stable across catalog/registry (e.g. `data.spark`).
    pub id: String,
    /// Human-readable display title.
    #[serde(default)]
    pub title: String,
    /// Short description used for scoring and role listings.
    #[serde(default)]
    pub description: String,
    /// Coarse filter/boost labels. The `role` tag marks role cards.
    #[serde(default)]
    pub tags: Vec<String>,
    /// The substantive instruction payload surfaced to the consumer.
    #[serde(default)]
    pub instructions: String,
    /// Card ids this card assumes are also present. Walked transitively
    /// during role resolution.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Free-form metadata (e.g. `domain`), passed through untouched.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Card {
    /// Create a card with only an id and instructions.
    pub fn new(id: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            description: String::new(),
            tags: Vec::new(),
            instructions: instructions.into(),
            dependencies: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Set the display title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the declared dependency ids.
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Whether this card is a role bundle rather than a plain skill card.
    ///
    /// A card is a role when its id carries the `role.` prefix, its `domain`
    /// metadata is `role_orchestrator`, or it is tagged `role`.
    pub fn is_role(&self) -> bool {
        if self.id.starts_with("role.") {
            return true;
        }
        if let Some(domain) = self.metadata.get("domain").and_then(Value::as_str) {
            if domain.trim().eq_ignore_ascii_case("role_orchestrator") {
                return true;
            }
        }
        self.tags
            .iter()
            .any(|tag| tag.trim().eq_ignore_ascii_case("role"))
    }
}

/// Origin and mutability policy of a card store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Read-only universe of installable cards and roles.
    Catalog,
    /// A caller's mutable working set; mutated only by the installer.
    Registry,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::Catalog => write!(f, "catalog"),
            Provenance::Registry => write!(f, "registry"),
        }
    }
}

/// An in-memory catalog or registry of cards.
///
/// Card order is deterministic (sorted by id) so that retrieval tie-breaks
/// and install reports are stable across runs. The optional handle names the
/// external store this mapping was materialized from; it scopes the
/// per-registry install lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardStore {
    cards: BTreeMap<String, Card>,
    provenance: Provenance,
    #[serde(default)]
    handle: String,
}

impl CardStore {
    /// Create an empty store.
    pub fn new(provenance: Provenance) -> Self {
        Self {
            cards: BTreeMap::new(),
            provenance,
            handle: String::new(),
        }
    }

    /// Create a store from materialized cards.
    ///
    /// Later duplicates of an id are dropped; the first occurrence wins,
    /// matching the installer's never-overwrite rule.
    pub fn from_cards(cards: impl IntoIterator<Item = Card>, provenance: Provenance) -> Self {
        let mut store = Self::new(provenance);
        for card in cards {
            store.insert_missing(card);
        }
        store
    }

    /// Name the external store this mapping came from. The handle scopes
    /// install serialization: two installs against the same handle never
    /// interleave their diff-then-merge steps.
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = handle.into();
        self
    }

    /// The external-store handle, if any.
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// The provenance tag.
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Look up a card by id.
    pub fn get(&self, id: &str) -> Option<&Card> {
        self.cards.get(id)
    }

    /// Whether a card id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.cards.contains_key(id)
    }

    /// Number of cards in the store.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Whether the store holds no cards.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Iterate cards in ascending id order.
    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.cards.values()
    }

    /// Iterate card ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.cards.keys().map(String::as_str)
    }

    /// Iterate only the role cards, in ascending id order.
    pub fn roles(&self) -> impl Iterator<Item = &Card> {
        self.cards.values().filter(|card| card.is_role())
    }

    /// Insert a card only if its id is not already present.
    ///
    /// Re-adding an existing id is a no-op, never an overwrite and never an
    /// error; the stored card stays byte-for-byte untouched. Returns whether
    /// the card was inserted.
    pub fn insert_missing(&mut self, card: Card) -> bool {
        if self.cards.contains_key(&card.id) {
            return false;
        }
        self.cards.insert(card.id.clone(), card);
        true
    }
}
