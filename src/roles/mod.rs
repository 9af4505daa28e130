//! Role listing and dependency-aware installation.
//!
//! A role is a card bundle: installing one resolves the transitive closure
//! of its declared dependency ids against the catalog, diffs the closure
//! against the target registry, and merges only the missing cards. The merge
//! is strictly additive and idempotent: existing cards are never overwritten
//! and a second install with no intervening changes adds nothing.
//!
//! Installs against the same registry handle are serialized through a
//! process-local lock table so two concurrent installs cannot observe the
//! same missing set and interleave their writes. A shared on-disk registry
//! written by multiple processes additionally needs a file-level advisory
//! lock at the persistence boundary.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::SkillmeshError;
use crate::store::{Card, CardStore};

/// Default bound on waiting for the per-registry install lock.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

/// Lock key for registries materialized without a handle.
const ANONYMOUS_REGISTRY: &str = "<anonymous>";

static INSTALL_LOCKS: Lazy<DashMap<String, Arc<Mutex<()>>>> = Lazy::new(DashMap::new);

/// Options for a role installation.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Compute the report without mutating the registry.
    pub dry_run: bool,
    /// Treat missing catalog dependencies as fatal instead of reporting
    /// them alongside the merge.
    pub fail_on_missing: bool,
    /// Bounded wait for the per-registry lock before `InstallConflict`.
    pub lock_wait: Duration,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            fail_on_missing: false,
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }
}

/// Record of which card ids a role installation added vs. skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallReport {
    /// The installed role id.
    pub role_id: String,
    /// Friendly display name derived from the role id.
    pub role_name: String,
    /// Ids newly inserted into the registry, ascending.
    pub added: Vec<String>,
    /// Ids already present and left byte-for-byte untouched, ascending.
    pub skipped: Vec<String>,
    /// Closure ids absent from the catalog, ascending. Reported together,
    /// never fatal unless the caller opted in.
    pub missing: Vec<String>,
    /// Whether the registry was left unmodified.
    pub dry_run: bool,
}

/// One row of the role listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleOffer {
    /// Role card id.
    pub id: String,
    /// Friendly display name derived from the id.
    pub name: String,
    /// Display title from the role card.
    pub title: String,
    /// Description from the role card.
    pub description: String,
    /// Declared dependency ids, in declaration order, deduplicated.
    pub dependency_ids: Vec<String>,
    /// Number of declared dependencies.
    pub dependency_count: usize,
    /// Declared dependencies absent from the catalog.
    pub unresolved_dependencies: Vec<String>,
    /// Whether every declared dependency is present in the target registry.
    pub installed: bool,
    /// Declared dependencies absent from the target registry.
    pub missing_dependency_count: usize,
}

/// Derive a friendly display name from a role id.
///
/// `role.data-engineer` becomes `Data Engineer`.
pub fn friendly_role_name(role_id: &str) -> String {
    let stem = role_id.strip_prefix("role.").unwrap_or(role_id);
    stem.split(|c| c == '-' || c == '_' || c == '.')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Resolve a role selector (exact id or case-insensitive friendly name)
/// against the offered roles.
///
/// # Errors
///
/// `RoleNotFound` when no offer matches.
pub fn resolve_role_selector(
    selector: &str,
    offers: &[RoleOffer],
) -> Result<String, SkillmeshError> {
    let trimmed = selector.trim();
    if let Some(offer) = offers.iter().find(|offer| offer.id == trimmed) {
        return Ok(offer.id.clone());
    }
    let lowered = trimmed.to_lowercase();
    if let Some(offer) = offers.iter().find(|offer| {
        offer.id.to_lowercase() == lowered || offer.name.to_lowercase() == lowered
    }) {
        return Ok(offer.id.clone());
    }
    Err(SkillmeshError::RoleNotFound {
        role_id: trimmed.to_string(),
    })
}

/// Deduplicate ids, keeping first occurrence and dropping blanks.
fn unique_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for id in ids {
        let normalized = id.trim();
        if normalized.is_empty() || !seen.insert(normalized.to_string()) {
            continue;
        }
        out.push(normalized.to_string());
    }
    out
}

/// Transitive closure of a role's dependency ids over the catalog.
///
/// Walks each visited card's own `dependencies` with an explicit visited
/// set, so dependency cycles terminate and every id appears at most once.
/// The role's own id is excluded from the closure. Ids absent from the
/// catalog are collected separately and not traversed.
fn dependency_closure(role: &Card, catalog: &CardStore) -> (Vec<String>, Vec<String>) {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(role.id.clone());

    let mut closure = Vec::new();
    let mut missing = Vec::new();
    let mut queue: VecDeque<String> = unique_ids(&role.dependencies).into();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        match catalog.get(&id) {
            Some(card) => {
                closure.push(id);
                for dependency in unique_ids(&card.dependencies) {
                    queue.push_back(dependency);
                }
            }
            None => missing.push(id),
        }
    }

    (closure, missing)
}

/// List the roles a catalog offers, ordered by role id.
///
/// # Arguments
///
/// * `catalog` - The read-only card universe.
/// * `installed` - Optional target registry for installed/missing status;
///   without it every offer reports as not installed.
pub fn list_role_offers(catalog: &CardStore, installed: Option<&CardStore>) -> Vec<RoleOffer> {
    catalog
        .roles()
        .map(|role| {
            let dependency_ids = unique_ids(&role.dependencies);
            let unresolved: Vec<String> = dependency_ids
                .iter()
                .filter(|id| !catalog.contains(id))
                .cloned()
                .collect();
            let missing_for_install: Vec<String> = dependency_ids
                .iter()
                .filter(|id| !installed.map(|store| store.contains(id)).unwrap_or(false))
                .cloned()
                .collect();
            RoleOffer {
                id: role.id.clone(),
                name: friendly_role_name(&role.id),
                title: role.title.clone(),
                description: role.description.clone(),
                dependency_count: dependency_ids.len(),
                installed: installed.is_some()
                    && !dependency_ids.is_empty()
                    && missing_for_install.is_empty(),
                missing_dependency_count: missing_for_install.len(),
                unresolved_dependencies: unresolved,
                dependency_ids,
            }
        })
        .collect()
}

/// Install a role's dependency closure into the target registry.
///
/// Resolves the closure against the catalog, diffs it against the
/// registry's existing card ids, and inserts only the missing set. Existing
/// cards are never touched, even when the catalog's definition of that id
/// differs. Running the same install twice with no intervening changes
/// yields an unchanged registry and an empty `added` list.
///
/// The diff-then-merge step runs as one critical section scoped to the
/// registry handle.
///
/// # Errors
///
/// `InvalidArgument` for a blank role id, `RoleNotFound` when the catalog
/// has no such role, `DependencyNotFound` only when `fail_on_missing` is
/// set, `InstallConflict` when the registry lock cannot be acquired within
/// `lock_wait`.
pub fn install_role(
    role_id: &str,
    catalog: &CardStore,
    registry: &mut CardStore,
    options: &InstallOptions,
) -> Result<InstallReport, SkillmeshError> {
    let role_id = role_id.trim();
    if role_id.is_empty() {
        return Err(SkillmeshError::invalid_argument(
            "`role_id` must be non-empty",
        ));
    }

    let role = catalog
        .get(role_id)
        .filter(|card| card.is_role())
        .ok_or_else(|| SkillmeshError::RoleNotFound {
            role_id: role_id.to_string(),
        })?;

    let (closure, mut missing) = dependency_closure(role, catalog);
    missing.sort();
    if options.fail_on_missing && !missing.is_empty() {
        return Err(SkillmeshError::DependencyNotFound { missing });
    }

    let lock_key = if registry.handle().is_empty() {
        ANONYMOUS_REGISTRY.to_string()
    } else {
        registry.handle().to_string()
    };
    let lock = {
        let entry = INSTALL_LOCKS.entry(lock_key.clone()).or_default();
        Arc::clone(entry.value())
    };
    let guard = lock
        .try_lock_for(options.lock_wait)
        .ok_or(SkillmeshError::InstallConflict { registry: lock_key })?;

    let mut added = Vec::new();
    let mut skipped = Vec::new();
    let mut to_insert = Vec::new();
    for id in &closure {
        if registry.contains(id) {
            skipped.push(id.clone());
        } else {
            added.push(id.clone());
            // The closure only holds ids resolved against the catalog, so
            // the lookup cannot miss here.
            if let Some(card) = catalog.get(id) {
                to_insert.push(card.clone());
            }
        }
    }

    if !options.dry_run {
        for card in to_insert {
            registry.insert_missing(card);
        }
        log::info!(
            "Installed role '{role_id}': {} added, {} skipped, {} missing",
            added.len(),
            skipped.len(),
            missing.len()
        );
    }
    drop(guard);

    added.sort();
    skipped.sort();
    Ok(InstallReport {
        role_id: role_id.to_string(),
        role_name: friendly_role_name(role_id),
        added,
        skipped,
        missing,
        dry_run: options.dry_run,
    })
}
