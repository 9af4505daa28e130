//! # skillmesh
//!
//! Top-K skill/role card retrieval and dependency-aware role provisioning
//! for agent runtimes.
//!
//! Routes a free-text task description to the most relevant bounded set of
//! skill cards from a registry, so an agent host receives a high-precision
//! context block instead of a whole catalog. Separately, installs a named
//! role by copying only the card definitions its dependency closure needs
//! into a working registry, without ever touching cards already present.
//!
//! The core never performs file I/O: stores arrive fully materialized and
//! updated registries are handed back for the persistence collaborator to
//! write out. CLI parsing and the MCP/HTTP transport are likewise external;
//! they call through [`ops`].

pub mod error;
pub mod ops;
pub mod retrieval;
pub mod roles;
pub mod store;

pub use error::SkillmeshError;
pub use retrieval::{
    assemble, BackendChoice, ChromaBackend, ChromaConfig, IndexSyncPolicy, MemoryBackend,
    Provider, Reranker, RetrievalOptions, RoutedResult, Router, SimilarityBackend, SkillHit,
    TermProximityReranker,
};
pub use roles::{
    friendly_role_name, install_role, list_role_offers, resolve_role_selector, InstallOptions,
    InstallReport, RoleOffer,
};
pub use store::{Card, CardStore, Provenance};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
