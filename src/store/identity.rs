//! `defaultUser`: users, groups and their tokens, kept in the shared auth state.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::query::{name_matches, Page, DEFAULT_PAGE_SIZE};
use super::state::{AuthSnapshot, SharedAuthState};
use super::{new_default_strategy, retire_principal, validate_name};
use crate::api::{
    BatchWriteResponse, CreateGroup, CreateUser, LoginRequest, LoginResponse, ModifyGroup, ModifyUser,
    ModifyUserPassword, QueryParams, QueryResponse, TokenInfo,
};
use crate::config::{PluginEntry, DEFAULT_USER_PLUGIN};
use crate::credential::{hash_password, issue_token, validate_password, verify_password, HashParams};
use crate::error::{AuthError, AuthResult};
use crate::model::{new_id, GroupView, PrincipalRef, PrincipalRole, User, UserGroup, UserRole, UserView};
use crate::plugin::{GroupOperations, IdentityStore, UserOperations};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct UserStoreOptions {
    pub password_memory_kib: u32,
    pub password_iterations: u32,
}

impl Default for UserStoreOptions {
    fn default() -> Self {
        let d = HashParams::default();
        Self { password_memory_kib: d.memory_kib, password_iterations: d.iterations }
    }
}

pub struct DefaultIdentityStore {
    state: SharedAuthState,
    hash: HashParams,
}

impl DefaultIdentityStore {
    pub fn new(state: SharedAuthState, options: UserStoreOptions) -> Self {
        let hash = HashParams { memory_kib: options.password_memory_kib, iterations: options.password_iterations };
        Self { state, hash }
    }

    pub fn from_entry(entry: &PluginEntry, state: SharedAuthState) -> AuthResult<Self> {
        let options: UserStoreOptions = entry.parse_options()?;
        // Reject costs argon2 would refuse now rather than on the first create.
        argon2::Params::new(options.password_memory_kib, options.password_iterations, 1, None)
            .map_err(|e| AuthError::validation(format!("plugin '{}' options: {}", entry.name, e)))?;
        Ok(Self::new(state, options))
    }

    pub fn state(&self) -> &SharedAuthState { &self.state }

    fn create_user(&self, req: CreateUser) -> AuthResult<String> {
        validate_name("user", &req.name)?;
        validate_password(&req.password)?;
        let owner = req.owner.trim().to_string();
        // Hash outside the writer lock; uniqueness is re-checked inside it.
        let password_hash = hash_password(&req.password, self.hash)?;
        let id = new_id();
        let token = issue_token(PrincipalRole::User, &id)?;
        self.state.update(|snap| {
            if !owner.is_empty() {
                match snap.user(&owner) {
                    Some(o) if o.user_type == UserRole::Owner => {}
                    _ => return Err(AuthError::not_found(format!("owner account '{}'", owner))),
                }
            }
            if snap.user_by_name(&owner, &req.name).is_some() {
                return Err(AuthError::conflict(format!("user '{}' already exists", req.name)));
            }
            let now = Utc::now();
            let user = User {
                id: id.clone(),
                name: req.name.clone(),
                password_hash,
                owner: owner.clone(),
                user_type: if owner.is_empty() { UserRole::Owner } else { UserRole::SubAccount },
                source: req.source.clone(),
                mobile: req.mobile.clone(),
                email: req.email.clone(),
                comment: req.comment.clone(),
                token,
                token_enable: true,
                valid: true,
                create_time: now,
                modify_time: now,
            };
            let principal = PrincipalRef::user(&id);
            let strategy = new_default_strategy(&principal, &user.name, user.tenant_id(), owner.is_empty(), now);
            snap.strategies.insert(strategy.id.clone(), strategy);
            snap.users.insert(id.clone(), user);
            Ok(())
        })?;
        info!(target: "meshgate::identity", user = %req.name, id = %id, owner = %owner, "user created");
        Ok(id)
    }

    fn delete_user(&self, id: &str) -> AuthResult<String> {
        self.state.update(|snap| {
            let user = snap.user(id).ok_or_else(|| AuthError::not_found(format!("user '{}'", id)))?;
            if user.user_type == UserRole::Owner && snap.users.values().any(|u| u.valid && u.owner == id) {
                return Err(AuthError::conflict(format!("user '{}' still owns sub-accounts", id)));
            }
            let now = Utc::now();
            if let Some(u) = snap.user_mut(id) {
                u.valid = false;
                u.modify_time = now;
            }
            for g in snap.groups.values_mut().filter(|g| g.valid) {
                if g.user_ids.remove(id) {
                    g.modify_time = now;
                }
            }
            retire_principal(snap, &PrincipalRef::user(id), now);
            Ok(())
        })?;
        info!(target: "meshgate::identity", id = %id, "user deleted");
        Ok(id.to_string())
    }

    fn create_group_inner(&self, req: CreateGroup) -> AuthResult<UserGroup> {
        validate_name("group", &req.name)?;
        let id = new_id();
        let token = issue_token(PrincipalRole::Group, &id)?;
        let group = self.state.update(|snap| {
            match snap.user(&req.owner) {
                Some(o) if o.user_type == UserRole::Owner => {}
                _ => return Err(AuthError::not_found(format!("owner account '{}'", req.owner))),
            }
            if snap.group_by_name(&req.owner, &req.name).is_some() {
                return Err(AuthError::conflict(format!("group '{}' already exists", req.name)));
            }
            for uid in &req.user_ids {
                check_member(snap, &req.owner, uid)?;
            }
            let now = Utc::now();
            let group = UserGroup {
                id: id.clone(),
                name: req.name.clone(),
                owner: req.owner.clone(),
                token,
                token_enable: true,
                valid: true,
                comment: req.comment.clone(),
                user_ids: req.user_ids.iter().cloned().collect(),
                create_time: now,
                modify_time: now,
            };
            let strategy = new_default_strategy(&PrincipalRef::group(&id), &group.name, &group.owner, false, now);
            snap.strategies.insert(strategy.id.clone(), strategy);
            snap.groups.insert(id.clone(), group.clone());
            Ok(group)
        })?;
        info!(target: "meshgate::identity", group = %group.name, id = %group.id, members = group.user_ids.len(), "group created");
        Ok(group)
    }

    fn update_group(&self, req: ModifyGroup) -> AuthResult<String> {
        self.state.update(|snap| {
            let owner = snap.group(&req.id).map(|g| g.owner.clone()).ok_or_else(|| AuthError::not_found(format!("group '{}'", req.id)))?;
            for uid in &req.add_user_ids {
                check_member(snap, &owner, uid)?;
            }
            let now = Utc::now();
            if let Some(g) = snap.group_mut(&req.id) {
                if let Some(c) = &req.comment { g.comment = c.clone(); }
                g.user_ids.extend(req.add_user_ids.iter().cloned());
                for uid in &req.remove_user_ids {
                    g.user_ids.remove(uid);
                }
                g.modify_time = now;
            }
            Ok(())
        })?;
        debug!(
            target: "meshgate::identity",
            id = %req.id,
            added = req.add_user_ids.len(),
            removed = req.remove_user_ids.len(),
            "group updated"
        );
        Ok(req.id)
    }

    fn delete_group(&self, id: &str) -> AuthResult<String> {
        self.state.update(|snap| {
            let now = Utc::now();
            let g = snap.group_mut(id).ok_or_else(|| AuthError::not_found(format!("group '{}'", id)))?;
            g.valid = false;
            g.modify_time = now;
            retire_principal(snap, &PrincipalRef::group(id), now);
            Ok(())
        })?;
        info!(target: "meshgate::identity", id = %id, "group deleted");
        Ok(id.to_string())
    }

    fn set_token_enable(&self, principal: &PrincipalRef, enable: bool) -> AuthResult<()> {
        self.state.update(|snap| {
            let now = Utc::now();
            match principal.role {
                PrincipalRole::User => {
                    let u = snap.user_mut(&principal.id).ok_or_else(|| AuthError::not_found(format!("user '{}'", principal.id)))?;
                    u.token_enable = enable;
                    u.modify_time = now;
                }
                PrincipalRole::Group => {
                    let g = snap.group_mut(&principal.id).ok_or_else(|| AuthError::not_found(format!("group '{}'", principal.id)))?;
                    g.token_enable = enable;
                    g.modify_time = now;
                }
            }
            Ok(())
        })?;
        info!(target: "meshgate::identity", principal = %principal, enable, "token enable changed");
        Ok(())
    }

    fn rotate_token(&self, principal: &PrincipalRef) -> AuthResult<TokenInfo> {
        let token = issue_token(principal.role, &principal.id)?;
        let info = self.state.update(|snap| {
            let now = Utc::now();
            let enabled = match principal.role {
                PrincipalRole::User => {
                    let u = snap.user_mut(&principal.id).ok_or_else(|| AuthError::not_found(format!("user '{}'", principal.id)))?;
                    u.token = token.clone();
                    u.modify_time = now;
                    u.token_enable
                }
                PrincipalRole::Group => {
                    let g = snap.group_mut(&principal.id).ok_or_else(|| AuthError::not_found(format!("group '{}'", principal.id)))?;
                    g.token = token.clone();
                    g.modify_time = now;
                    g.token_enable
                }
            };
            Ok(TokenInfo { principal_id: principal.id.clone(), token: token.clone(), enabled })
        })?;
        info!(target: "meshgate::identity", principal = %principal, "token reset");
        Ok(info)
    }
}

/// Group members must be valid users of the group owner's tenant.
fn check_member(snap: &AuthSnapshot, owner: &str, user_id: &str) -> AuthResult<()> {
    let user = snap.user(user_id).ok_or_else(|| AuthError::not_found(format!("user '{}'", user_id)))?;
    if user.tenant_id() != owner {
        return Err(AuthError::validation(format!("user '{}' does not belong to account '{}'", user_id, owner)));
    }
    Ok(())
}

impl UserOperations for DefaultIdentityStore {
    fn create_users(&self, users: Vec<CreateUser>) -> BatchWriteResponse {
        BatchWriteResponse::collect(users.into_iter().map(|u| self.create_user(u)).collect())
    }

    fn update_user(&self, req: ModifyUser) -> AuthResult<UserView> {
        let view = self.state.update(|snap| {
            let u = snap.user_mut(&req.id).ok_or_else(|| AuthError::not_found(format!("user '{}'", req.id)))?;
            if let Some(m) = &req.mobile { u.mobile = m.clone(); }
            if let Some(e) = &req.email { u.email = e.clone(); }
            if let Some(c) = &req.comment { u.comment = c.clone(); }
            u.modify_time = Utc::now();
            Ok(u.view())
        })?;
        debug!(target: "meshgate::identity", id = %req.id, "user updated");
        Ok(view)
    }

    fn update_user_password(&self, req: ModifyUserPassword) -> AuthResult<()> {
        validate_password(&req.new_password)?;
        let current = self.user_record(&req.id)?;
        if let Some(old) = &req.old_password {
            if !verify_password(&current.password_hash, old) {
                return Err(AuthError::invalid_credential("old password does not match"));
            }
        }
        let hash = hash_password(&req.new_password, self.hash)?;
        self.state.update(|snap| {
            let u = snap.user_mut(&req.id).ok_or_else(|| AuthError::not_found(format!("user '{}'", req.id)))?;
            u.password_hash = hash;
            u.modify_time = Utc::now();
            Ok(())
        })?;
        info!(target: "meshgate::identity", id = %req.id, "password changed");
        Ok(())
    }

    fn delete_users(&self, ids: Vec<String>) -> BatchWriteResponse {
        BatchWriteResponse::collect(ids.iter().map(|id| self.delete_user(id)).collect())
    }

    fn get_users(&self, query: &QueryParams) -> AuthResult<QueryResponse<UserView>> {
        let page = Page::from_query(query, DEFAULT_PAGE_SIZE)?;
        let snap = self.state.snapshot();
        let member_of = query.get("group_id").map(|gid| snap.group(gid).map(|g| g.user_ids.clone()).unwrap_or_default());
        let mut users: Vec<&User> = snap
            .users
            .values()
            .filter(|u| u.valid)
            .filter(|u| query.get("id").map_or(true, |v| u.id == v))
            .filter(|u| query.get("name").map_or(true, |v| name_matches(v, &u.name)))
            .filter(|u| query.get("owner").map_or(true, |v| u.owner == v || u.id == v))
            .filter(|u| query.get("source").map_or(true, |v| u.source == v))
            .filter(|u| member_of.as_ref().map_or(true, |m| m.contains(&u.id)))
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(page.apply(users.into_iter().map(User::view).collect()))
    }

    fn user_record(&self, id: &str) -> AuthResult<User> {
        self.state.snapshot().user(id).cloned().ok_or_else(|| AuthError::not_found(format!("user '{}'", id)))
    }

    fn get_user_token(&self, id: &str) -> AuthResult<TokenInfo> {
        let u = self.user_record(id)?;
        Ok(TokenInfo { principal_id: u.id, token: u.token, enabled: u.token_enable })
    }

    fn update_user_token(&self, id: &str, enable: bool) -> AuthResult<()> {
        self.set_token_enable(&PrincipalRef::user(id), enable)
    }

    fn reset_user_token(&self, id: &str) -> AuthResult<TokenInfo> {
        self.rotate_token(&PrincipalRef::user(id))
    }

    fn login(&self, req: &LoginRequest) -> AuthResult<LoginResponse> {
        let snap = self.state.snapshot();
        let owner_id = match req.owner.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => String::new(),
            Some(owner_name) => match snap.user_by_name("", owner_name) {
                Some(o) => o.id.clone(),
                None => {
                    warn!(target: "meshgate::identity", user = %req.name, owner = %owner_name, "login for unknown owner");
                    return Err(AuthError::invalid_credential("invalid user name or password"));
                }
            },
        };
        let Some(user) = snap.user_by_name(&owner_id, &req.name).cloned() else {
            warn!(target: "meshgate::identity", user = %req.name, "login for unknown user");
            return Err(AuthError::invalid_credential("invalid user name or password"));
        };
        drop(snap);
        if !verify_password(&user.password_hash, &req.password) {
            warn!(target: "meshgate::identity", user = %req.name, "login with wrong password");
            return Err(AuthError::invalid_credential("invalid user name or password"));
        }
        if !user.token_enable {
            return Err(AuthError::credential_disabled(format!("token of user '{}' is disabled", user.name)));
        }
        let token = if user.token.is_empty() { self.rotate_token(&PrincipalRef::user(&user.id))?.token } else { user.token.clone() };
        info!(target: "meshgate::identity", user = %user.name, id = %user.id, "login");
        Ok(LoginResponse { user_id: user.id.clone(), owner_id: user.tenant_id().to_string(), name: user.name, token, expiry: None })
    }
}

impl GroupOperations for DefaultIdentityStore {
    fn create_group(&self, req: CreateGroup) -> AuthResult<GroupView> {
        self.create_group_inner(req).map(|g| g.view())
    }

    fn update_groups(&self, reqs: Vec<ModifyGroup>) -> BatchWriteResponse {
        BatchWriteResponse::collect(reqs.into_iter().map(|r| self.update_group(r)).collect())
    }

    fn delete_groups(&self, ids: Vec<String>) -> BatchWriteResponse {
        BatchWriteResponse::collect(ids.iter().map(|id| self.delete_group(id)).collect())
    }

    fn get_groups(&self, query: &QueryParams) -> AuthResult<QueryResponse<GroupView>> {
        let page = Page::from_query(query, DEFAULT_PAGE_SIZE)?;
        let snap = self.state.snapshot();
        let mut groups: Vec<&UserGroup> = snap
            .groups
            .values()
            .filter(|g| g.valid)
            .filter(|g| query.get("id").map_or(true, |v| g.id == v))
            .filter(|g| query.get("name").map_or(true, |v| name_matches(v, &g.name)))
            .filter(|g| query.get("owner").map_or(true, |v| g.owner == v))
            .filter(|g| query.get("user_id").map_or(true, |v| g.user_ids.contains(v)))
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(page.apply(groups.into_iter().map(UserGroup::view).collect()))
    }

    fn get_group(&self, id: &str) -> AuthResult<GroupView> {
        self.group_record(id).map(|g| g.view())
    }

    fn group_record(&self, id: &str) -> AuthResult<UserGroup> {
        self.state.snapshot().group(id).cloned().ok_or_else(|| AuthError::not_found(format!("group '{}'", id)))
    }

    fn get_group_token(&self, id: &str) -> AuthResult<TokenInfo> {
        let g = self.group_record(id)?;
        Ok(TokenInfo { principal_id: g.id, token: g.token, enabled: g.token_enable })
    }

    fn update_group_token(&self, id: &str, enable: bool) -> AuthResult<()> {
        self.set_token_enable(&PrincipalRef::group(id), enable)
    }

    fn reset_group_token(&self, id: &str) -> AuthResult<TokenInfo> {
        self.rotate_token(&PrincipalRef::group(id))
    }

    fn groups_of_user(&self, user_id: &str) -> AuthResult<Vec<String>> {
        Ok(self.state.snapshot().groups_of_user(user_id))
    }
}

impl IdentityStore for DefaultIdentityStore {
    fn name(&self) -> &str { DEFAULT_USER_PLUGIN }

    fn principal_exists(&self, principal: &PrincipalRef) -> bool {
        self.state.snapshot().principal_exists(principal)
    }
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
