//! `defaultStrategy`: strategies binding principals to resources, plus the
//! resource-lifecycle hook that keeps default strategies current.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::query::{name_matches, Page, DEFAULT_PAGE_SIZE};
use super::state::{AuthSnapshot, SharedAuthState};
use super::validate_name;
use crate::api::{
    BatchWriteResponse, CreateStrategy, ModifyStrategy, PrincipalResources, QueryParams, QueryResponse, ResourceRef,
};
use crate::config::{PluginEntry, DEFAULT_STRATEGY_PLUGIN};
use crate::context::AcquireContext;
use crate::error::{AuthError, AuthResult};
use crate::model::{
    new_id, new_revision, Operation, PrincipalRef, PrincipalRole, ResourceEntry, ResourceType, StrategyAction,
    StrategyDetail, WILDCARD_RESOURCE,
};
use crate::plugin::PolicyStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StrategyStoreOptions {
    pub max_page_size: usize,
}

impl Default for StrategyStoreOptions {
    fn default() -> Self { Self { max_page_size: DEFAULT_PAGE_SIZE } }
}

pub struct DefaultPolicyStore {
    state: SharedAuthState,
    options: StrategyStoreOptions,
}

impl DefaultPolicyStore {
    pub fn new(state: SharedAuthState, options: StrategyStoreOptions) -> Self {
        Self { state, options }
    }

    pub fn from_entry(entry: &PluginEntry, state: SharedAuthState) -> AuthResult<Self> {
        let options: StrategyStoreOptions = entry.parse_options()?;
        if options.max_page_size == 0 {
            return Err(AuthError::validation(format!("plugin '{}' options: max_page_size must be positive", entry.name)));
        }
        Ok(Self::new(state, options))
    }

    fn update_strategy(&self, req: ModifyStrategy) -> AuthResult<String> {
        self.state.update(|snap| {
            ensure_principals_exist(snap, &req.add_principals)?;
            let s = snap
                .strategies
                .get_mut(&req.id)
                .filter(|s| s.valid)
                .ok_or_else(|| AuthError::not_found(format!("strategy '{}'", req.id)))?;
            if let Some(expected) = &req.revision {
                if *expected != s.revision {
                    return Err(AuthError::conflict(format!("strategy '{}' was modified concurrently", req.id)));
                }
            }
            if s.default && (!req.add_principals.is_empty() || !req.remove_principals.is_empty()) {
                return Err(AuthError::validation("principals of a default strategy cannot change"));
            }
            if let Some(a) = req.action { s.action = a; }
            if let Some(c) = &req.comment { s.comment = c.clone(); }
            for p in &req.add_principals { s.add_principal(p); }
            for p in &req.remove_principals { s.remove_principal(p); }
            for r in &req.add_resources { s.add_resource(r.res_type, &r.res_id); }
            for r in &req.remove_resources { s.remove_resource(r.res_type, &r.res_id); }
            s.touch(Utc::now());
            Ok(())
        })?;
        info!(target: "meshgate::policy", id = %req.id, "strategy updated");
        Ok(req.id)
    }

    fn delete_strategy(&self, id: &str) -> AuthResult<String> {
        self.state.update(|snap| {
            let s = snap
                .strategies
                .get_mut(id)
                .filter(|s| s.valid)
                .ok_or_else(|| AuthError::not_found(format!("strategy '{}'", id)))?;
            if s.default {
                return Err(AuthError::validation(format!("default strategy '{}' cannot be deleted", id)));
            }
            s.valid = false;
            s.touch(Utc::now());
            Ok(())
        })?;
        info!(target: "meshgate::policy", id = %id, "strategy deleted");
        Ok(id.to_string())
    }

}

/// Checked inside the write so a principal deleted concurrently is never bound.
fn ensure_principals_exist(snap: &AuthSnapshot, principals: &[PrincipalRef]) -> AuthResult<()> {
    match principals.iter().find(|p| !snap.principal_exists(p)) {
        Some(p) => Err(AuthError::not_found(format!("principal {}", p))),
        None => Ok(()),
    }
}

/// Whether a deny strategy in `denies` removes `(res_type, res_id)` granted by a
/// strategy of `owner`. A listed wildcard only falls to a wildcard deny of the
/// same owner; a concrete id falls to the same coverage rule the checker uses.
fn denied_in_listing(denies: &[&StrategyDetail], res_type: ResourceType, res_id: &str, owner: &str) -> bool {
    if res_id == WILDCARD_RESOURCE {
        return denies.iter().any(|d| d.owner == owner && d.has_resource(res_type, WILDCARD_RESOURCE));
    }
    let entry = ResourceEntry { res_type, id: res_id.to_string(), name: String::new(), namespace: String::new(), owner: owner.to_string() };
    denies.iter().any(|d| d.covers(&entry))
}

fn matches_resource_filter(s: &StrategyDetail, res_type: Option<ResourceType>, res_id: Option<&str>) -> bool {
    if res_type.is_none() && res_id.is_none() { return true; }
    s.resources.iter().any(|r| res_type.map_or(true, |t| r.res_type == t) && res_id.map_or(true, |id| r.res_id == id))
}

/// Apply `edit` to the default strategy of `principal`. Unknown principals are skipped.
fn edit_default(snap: &mut AuthSnapshot, principal: &PrincipalRef, edit: impl FnOnce(&mut StrategyDetail) -> bool) {
    match snap.default_strategy_mut(principal) {
        Some(s) => {
            if edit(s) {
                s.touch(Utc::now());
            }
        }
        None => warn!(target: "meshgate::policy", principal = %principal, "no default strategy, resource link skipped"),
    }
}

fn add_all(s: &mut StrategyDetail, resources: &[ResourceEntry]) -> bool {
    resources.iter().fold(false, |changed, r| s.add_resource(r.res_type, &r.id) | changed)
}

fn remove_all(s: &mut StrategyDetail, resources: &[ResourceEntry]) -> bool {
    resources.iter().fold(false, |changed, r| s.remove_resource(r.res_type, &r.id) | changed)
}

impl PolicyStore for DefaultPolicyStore {
    fn name(&self) -> &str { DEFAULT_STRATEGY_PLUGIN }

    fn create_strategy(&self, req: CreateStrategy) -> AuthResult<StrategyDetail> {
        validate_name("strategy", &req.name)?;
        if req.owner.trim().is_empty() {
            return Err(AuthError::validation("strategy owner must not be empty"));
        }
        if req.principals.is_empty() {
            return Err(AuthError::validation("strategy must bind at least one principal"));
        }
        if req.resources.is_empty() {
            return Err(AuthError::validation("strategy must cover at least one resource"));
        }
        let detail = self.state.update(|snap| {
            ensure_principals_exist(snap, &req.principals)?;
            let taken = snap.strategies.values().any(|s| s.valid && !s.default && s.owner == req.owner && s.name == req.name);
            if taken {
                return Err(AuthError::conflict(format!("strategy '{}' already exists", req.name)));
            }
            let now = Utc::now();
            let mut s = StrategyDetail {
                id: new_id(),
                name: req.name.clone(),
                action: req.action,
                comment: req.comment.clone(),
                principals: Vec::new(),
                default: false,
                owner: req.owner.clone(),
                resources: Vec::new(),
                valid: true,
                revision: new_revision(),
                create_time: now,
                modify_time: now,
            };
            for p in &req.principals { s.add_principal(p); }
            for ResourceRef { res_type, res_id } in &req.resources { s.add_resource(*res_type, res_id); }
            snap.strategies.insert(s.id.clone(), s.clone());
            Ok(s)
        })?;
        info!(
            target: "meshgate::policy",
            id = %detail.id,
            name = %detail.name,
            action = ?detail.action,
            principals = detail.principals.len(),
            resources = detail.resources.len(),
            "strategy created"
        );
        Ok(detail)
    }

    fn update_strategies(&self, reqs: Vec<ModifyStrategy>) -> BatchWriteResponse {
        BatchWriteResponse::collect(reqs.into_iter().map(|r| self.update_strategy(r)).collect())
    }

    fn delete_strategies(&self, ids: Vec<String>) -> BatchWriteResponse {
        BatchWriteResponse::collect(ids.iter().map(|id| self.delete_strategy(id)).collect())
    }

    fn get_strategies(&self, query: &QueryParams) -> AuthResult<QueryResponse<StrategyDetail>> {
        let page = Page::from_query(query, self.options.max_page_size)?;
        let res_type = query.parse::<ResourceType>("res_type")?;
        let default = query.parse::<bool>("default")?;
        let snap = self.state.snapshot();
        let candidates: Vec<StrategyDetail> = match query.get("principal_id") {
            Some(pid) => {
                let role = query.parse::<PrincipalRole>("principal_type")?.unwrap_or(PrincipalRole::User);
                self.principal_strategies_in(&snap, &PrincipalRef { id: pid.to_string(), role })?
            }
            None => snap.strategies.values().filter(|s| s.valid).cloned().collect(),
        };
        let mut items: Vec<StrategyDetail> = candidates
            .into_iter()
            .filter(|s| query.get("id").map_or(true, |v| s.id == v))
            .filter(|s| query.get("name").map_or(true, |v| name_matches(v, &s.name)))
            .filter(|s| query.get("owner").map_or(true, |v| s.owner == v))
            .filter(|s| default.map_or(true, |d| s.default == d))
            .filter(|s| matches_resource_filter(s, res_type, query.get("res_id")))
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(page.apply(items))
    }

    fn get_strategy(&self, id: &str) -> AuthResult<StrategyDetail> {
        self.state.snapshot().strategy(id).cloned().ok_or_else(|| AuthError::not_found(format!("strategy '{}'", id)))
    }

    fn get_principal_resources(&self, principal: &PrincipalRef) -> AuthResult<PrincipalResources> {
        let strategies = self.principal_strategies(principal)?;
        let denies: Vec<&StrategyDetail> = strategies.iter().filter(|s| s.action == StrategyAction::Deny).collect();
        let mut allowed: BTreeMap<ResourceType, BTreeSet<String>> = BTreeMap::new();
        for s in strategies.iter().filter(|s| s.action != StrategyAction::Deny) {
            for r in &s.resources {
                if !denied_in_listing(&denies, r.res_type, &r.res_id, &s.owner) {
                    allowed.entry(r.res_type).or_default().insert(r.res_id.clone());
                }
            }
        }
        Ok(PrincipalResources { resources: allowed })
    }

    fn principal_strategies(&self, principal: &PrincipalRef) -> AuthResult<Vec<StrategyDetail>> {
        self.principal_strategies_in(&self.state.snapshot(), principal)
    }

    fn after_resource_operation(&self, ctx: &AcquireContext) -> AuthResult<()> {
        let op = ctx.operation();
        if op == Operation::Read || ctx.resources().is_empty() { return Ok(()); }
        let Some(principal) = ctx.operator().and_then(|o| o.principal()) else {
            debug!(target: "meshgate::policy", operation = op.as_str(), "anonymous operator, strategy hook skipped");
            return Ok(());
        };
        let resources = ctx.resources();
        let links = ctx.links();
        self.state.update(|snap| {
            let now = Utc::now();
            match op {
                Operation::Delete => {
                    for s in snap.strategies.values_mut().filter(|s| s.valid) {
                        if remove_all(s, resources) {
                            s.touch(now);
                        }
                    }
                }
                Operation::Create | Operation::Modify => {
                    if op == Operation::Create {
                        edit_default(snap, &principal, |s| add_all(s, resources));
                    }
                    for id in &links.link_users {
                        edit_default(snap, &PrincipalRef::user(id), |s| add_all(s, resources));
                    }
                    for id in &links.link_groups {
                        edit_default(snap, &PrincipalRef::group(id), |s| add_all(s, resources));
                    }
                    for id in &links.unlink_users {
                        edit_default(snap, &PrincipalRef::user(id), |s| remove_all(s, resources));
                    }
                    for id in &links.unlink_groups {
                        edit_default(snap, &PrincipalRef::group(id), |s| remove_all(s, resources));
                    }
                }
                Operation::Read => {}
            }
            Ok(())
        })?;
        debug!(
            target: "meshgate::policy",
            operator = %principal,
            operation = op.as_str(),
            resources = resources.len(),
            "strategies synced after resource operation"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
