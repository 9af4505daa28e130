//! Error types for skillmesh operations.
//!
//! The taxonomy is deliberately small: callers either passed something
//! malformed, asked for a backend that cannot be brought up, named a role
//! or dependency that does not exist, or lost the race for a registry lock.
//! Everything else degrades to a partial result instead of an error.

use thiserror::Error;

/// Errors surfaced by retrieval and installation operations.
#[derive(Debug, Error)]
pub enum SkillmeshError {
    /// A caller-supplied argument was malformed (empty query, `top_k` of
    /// zero, instruction cap below the minimum, unknown backend name).
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// An explicitly requested similarity backend could not be initialized
    /// or completed scoring. Never raised under `auto` selection, which
    /// falls back to the in-process backend instead.
    #[error("Backend '{backend}' unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// The requested role id does not exist in the catalog, or the matching
    /// card is not marked as a role.
    #[error("Role not found in catalog: {role_id}")]
    RoleNotFound { role_id: String },

    /// One or more dependency card ids referenced by a role are absent from
    /// the catalog. Collected across the whole closure, never per-id.
    #[error("Dependency cards not found in catalog: {}", missing.join(", "))]
    DependencyNotFound { missing: Vec<String> },

    /// The per-registry install lock could not be acquired within the
    /// bounded wait. The caller should retry.
    #[error("Install already in progress for registry '{registry}'")]
    InstallConflict { registry: String },
}

impl SkillmeshError {
    /// Build an `InvalidArgument` error from any displayable message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
