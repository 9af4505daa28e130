//! Request/response payload builders.
//!
//! The transport exposing these operations to an agent host (MCP, HTTP, a
//! CLI) is an external collaborator; this module is the generic boundary it
//! calls into. Each builder normalizes its inputs, runs the corresponding
//! core operation, and shapes the outcome as JSON (or, for routed context,
//! the assembled block itself).

use serde_json::{json, Value};

use crate::error::SkillmeshError;
use crate::retrieval::context::{assemble, Provider, MIN_INSTRUCTION_CHARS};
use crate::retrieval::router::Router;
use crate::retrieval::types::{RetrievalOptions, RoutedResult};
use crate::roles::{install_role, list_role_offers, resolve_role_selector, InstallOptions};
use crate::store::CardStore;

fn hits_payload(result: &RoutedResult, registry: &CardStore) -> Vec<Value> {
    result
        .hits
        .iter()
        .map(|hit| {
            json!({
                "id": hit.card.id,
                "title": hit.card.title,
                "description": hit.card.description,
                "tags": hit.card.tags,
                "dependencies": hit.card.dependencies,
                "score": hit.score,
                "rank": hit.rank,
                "backend": hit.backend,
                "provenance": registry.provenance().to_string(),
            })
        })
        .collect()
}

/// Retrieve the top-K cards for a query as a structured JSON payload.
///
/// # Errors
///
/// `InvalidArgument` for a blank query or zero `top_k`;
/// `BackendUnavailable` for an explicitly requested backend that failed.
pub async fn retrieve_cards_payload(
    router: &Router,
    query: &str,
    registry: &CardStore,
    options: &RetrievalOptions,
) -> Result<Value, SkillmeshError> {
    let result = router.route(query, registry, options).await?;
    Ok(json!({
        "query": query.trim(),
        "backend": result.backend,
        "advisory": result.advisory,
        "hits": hits_payload(&result, registry),
    }))
}

/// Build a routed, length-bounded context block for a query.
///
/// # Errors
///
/// `InvalidArgument` when `options.instruction_chars` is below
/// [`MIN_INSTRUCTION_CHARS`], plus everything `retrieve_cards_payload`
/// raises.
pub async fn routed_context_payload(
    router: &Router,
    query: &str,
    registry: &CardStore,
    options: &RetrievalOptions,
    provider: Provider,
) -> Result<String, SkillmeshError> {
    if options.instruction_chars < MIN_INSTRUCTION_CHARS {
        return Err(SkillmeshError::invalid_argument(format!(
            "`instruction_chars` must be >= {MIN_INSTRUCTION_CHARS}"
        )));
    }
    let result = router.route(query, registry, options).await?;
    Ok(assemble(
        query.trim(),
        &result.hits,
        provider,
        options.instruction_chars,
    ))
}

/// List the roles a catalog offers, with installed status when a target
/// registry is supplied.
pub fn list_roles_payload(
    catalog: &CardStore,
    installed: Option<&CardStore>,
    installed_only: bool,
) -> Value {
    let mut offers = list_role_offers(catalog, installed);
    if installed_only {
        offers.retain(|offer| offer.installed);
    }
    json!({
        "installed_only": installed_only,
        "roles": offers,
    })
}

/// Install a role (selected by id or friendly name) into the registry and
/// return the install report as JSON.
///
/// # Errors
///
/// `RoleNotFound`, `DependencyNotFound` (only under
/// `options.fail_on_missing`), `InstallConflict`, `InvalidArgument`.
pub fn install_role_payload(
    selector: &str,
    catalog: &CardStore,
    registry: &mut CardStore,
    options: &InstallOptions,
) -> Result<Value, SkillmeshError> {
    let offers = list_role_offers(catalog, None);
    let role_id = resolve_role_selector(selector, &offers)?;
    let report = install_role(&role_id, catalog, registry, options)?;
    serde_json::to_value(&report)
        .map_err(|e| SkillmeshError::invalid_argument(format!("unserializable report: {e}")))
}
