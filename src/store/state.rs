//! Copy-on-write auth state shared by the built-in identity and policy stores.
//! Readers take an `Arc` of the current snapshot; writers are serialized, build
//! the next snapshot from a clone and publish it only after the closure and the
//! optional file save both succeed.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AuthError, AuthResult};
use crate::model::{PrincipalRef, PrincipalRole, StrategyDetail, User, UserGroup};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthSnapshot {
    #[serde(default)]
    pub users: HashMap<String, User>,
    #[serde(default)]
    pub groups: HashMap<String, UserGroup>,
    #[serde(default)]
    pub strategies: HashMap<String, StrategyDetail>,
}

impl AuthSnapshot {
    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.get(id).filter(|u| u.valid)
    }

    pub fn user_mut(&mut self, id: &str) -> Option<&mut User> {
        self.users.get_mut(id).filter(|u| u.valid)
    }

    pub fn group(&self, id: &str) -> Option<&UserGroup> {
        self.groups.get(id).filter(|g| g.valid)
    }

    pub fn group_mut(&mut self, id: &str) -> Option<&mut UserGroup> {
        self.groups.get_mut(id).filter(|g| g.valid)
    }

    pub fn strategy(&self, id: &str) -> Option<&StrategyDetail> {
        self.strategies.get(id).filter(|s| s.valid)
    }

    pub fn user_by_name(&self, owner: &str, name: &str) -> Option<&User> {
        self.users.values().find(|u| u.valid && u.owner == owner && u.name == name)
    }

    pub fn group_by_name(&self, owner: &str, name: &str) -> Option<&UserGroup> {
        self.groups.values().find(|g| g.valid && g.owner == owner && g.name == name)
    }

    /// Valid groups listing the user as a member, sorted by id.
    pub fn groups_of_user(&self, user_id: &str) -> Vec<String> {
        let mut ids: Vec<String> =
            self.groups.values().filter(|g| g.valid && g.user_ids.contains(user_id)).map(|g| g.id.clone()).collect();
        ids.sort();
        ids
    }

    pub fn default_strategy_of(&self, principal: &PrincipalRef) -> Option<&StrategyDetail> {
        self.strategies.values().find(|s| s.valid && s.is_default_of(principal))
    }

    pub fn default_strategy_mut(&mut self, principal: &PrincipalRef) -> Option<&mut StrategyDetail> {
        self.strategies.values_mut().find(|s| s.valid && s.is_default_of(principal))
    }

    /// Valid strategies binding the principal directly.
    pub fn strategies_binding<'a>(&'a self, principal: &'a PrincipalRef) -> impl Iterator<Item = &'a StrategyDetail> + 'a {
        self.strategies.values().filter(move |s| s.valid && s.binds(principal))
    }

    pub fn principal_exists(&self, principal: &PrincipalRef) -> bool {
        match principal.role {
            PrincipalRole::User => self.user(&principal.id).is_some(),
            PrincipalRole::Group => self.group(&principal.id).is_some(),
        }
    }

    /// Strategies binding the principal directly or, for a user, through any
    /// group it belongs to in this snapshot. Deduplicated, sorted by id.
    pub fn strategies_for(&self, principal: &PrincipalRef) -> Vec<StrategyDetail> {
        let mut refs = vec![principal.clone()];
        if principal.role == PrincipalRole::User {
            refs.extend(self.groups_of_user(&principal.id).iter().map(|g| PrincipalRef::group(g)));
        }
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for r in &refs {
            for s in self.strategies_binding(r) {
                if seen.insert(s.id.as_str()) {
                    out.push(s.clone());
                }
            }
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

struct StateInner {
    current: RwLock<Arc<AuthSnapshot>>,
    writer: Mutex<()>,
    path: Option<PathBuf>,
}

/// Cheap-to-clone handle on the shared state.
#[derive(Clone)]
pub struct SharedAuthState {
    inner: Arc<StateInner>,
}

impl Default for SharedAuthState {
    fn default() -> Self { Self::in_memory() }
}

impl SharedAuthState {
    pub fn in_memory() -> Self {
        Self::with_snapshot(AuthSnapshot::default(), None)
    }

    /// State backed by a JSON snapshot file; an absent file starts empty.
    pub fn open(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref().to_path_buf();
        let snap = read_snapshot(&path)?.unwrap_or_default();
        info!(
            target: "meshgate::state",
            path = %path.display(),
            users = snap.users.len(),
            groups = snap.groups.len(),
            strategies = snap.strategies.len(),
            "auth state opened"
        );
        Ok(Self::with_snapshot(snap, Some(path)))
    }

    fn with_snapshot(snap: AuthSnapshot, path: Option<PathBuf>) -> Self {
        Self { inner: Arc::new(StateInner { current: RwLock::new(Arc::new(snap)), writer: Mutex::new(()), path }) }
    }

    pub fn path(&self) -> Option<&Path> { self.inner.path.as_deref() }

    /// Consistent view of the current state.
    pub fn snapshot(&self) -> Arc<AuthSnapshot> {
        self.inner.current.read().clone()
    }

    /// Apply `f` to a copy of the state and publish it. When `f` or the save
    /// fails nothing is published.
    pub fn update<T>(&self, f: impl FnOnce(&mut AuthSnapshot) -> AuthResult<T>) -> AuthResult<T> {
        let _w = self.inner.writer.lock();
        let mut next = (**self.inner.current.read()).clone();
        let out = f(&mut next)?;
        if let Some(path) = &self.inner.path {
            write_snapshot(path, &next)?;
        }
        *self.inner.current.write() = Arc::new(next);
        Ok(out)
    }

    /// Re-read the snapshot file. Returns false for in-memory state or a missing file.
    pub fn reload(&self) -> AuthResult<bool> {
        let Some(path) = &self.inner.path else { return Ok(false) };
        let _w = self.inner.writer.lock();
        let Some(snap) = read_snapshot(path)? else { return Ok(false) };
        debug!(target: "meshgate::state", path = %path.display(), "auth state reloaded");
        *self.inner.current.write() = Arc::new(snap);
        Ok(true)
    }

    /// Reload the snapshot file on a fixed interval until the runtime shuts down.
    pub fn spawn_refresh(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = state.reload() {
                    warn!(target: "meshgate::state", "auth state refresh failed: {}", e);
                }
            }
        })
    }
}

fn read_snapshot(path: &Path) -> AuthResult<Option<AuthSnapshot>> {
    if !path.exists() { return Ok(None); }
    let bytes = std::fs::read(path)?;
    let snap = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::internal(format!("corrupt auth snapshot '{}': {}", path.display(), e)))?;
    Ok(Some(snap))
}

fn write_snapshot(path: &Path, snap: &AuthSnapshot) -> AuthResult<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() { std::fs::create_dir_all(dir)?; }
    }
    let bytes = serde_json::to_vec_pretty(snap).map_err(|e| AuthError::internal(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn group(id: &str, members: &[&str]) -> UserGroup {
        let now = Utc::now();
        UserGroup {
            id: id.into(),
            name: id.into(),
            owner: "o".into(),
            token: String::new(),
            token_enable: true,
            valid: true,
            comment: String::new(),
            user_ids: members.iter().map(|m| m.to_string()).collect::<BTreeSet<_>>(),
            create_time: now,
            modify_time: now,
        }
    }

    #[test]
    fn failed_update_publishes_nothing() {
        let state = SharedAuthState::in_memory();
        state.update(|s| { s.groups.insert("g1".into(), group("g1", &[])); Ok(()) }).unwrap();
        let before = state.snapshot();
        let res: AuthResult<()> = state.update(|s| {
            s.groups.clear();
            Err(AuthError::conflict("nope"))
        });
        assert!(res.is_err());
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let state = SharedAuthState::in_memory();
        let old = state.snapshot();
        state.update(|s| { s.groups.insert("g1".into(), group("g1", &["u1"])); Ok(()) }).unwrap();
        assert!(old.groups.is_empty());
        assert_eq!(state.snapshot().groups_of_user("u1"), vec!["g1".to_string()]);
    }

    #[test]
    fn strategies_follow_membership_of_the_same_snapshot() {
        let state = SharedAuthState::in_memory();
        let grp = crate::store::new_default_strategy(&PrincipalRef::group("g1"), "g1", "o", false, Utc::now());
        let grp_id = grp.id.clone();
        state.update(|s| {
            s.groups.insert("g1".into(), group("g1", &["u1"]));
            s.strategies.insert(grp.id.clone(), grp);
            Ok(())
        }).unwrap();
        let old = state.snapshot();
        state.update(|s| { s.groups.insert("g1".into(), group("g1", &[])); Ok(()) }).unwrap();

        let u1 = PrincipalRef::user("u1");
        let ids: Vec<String> = old.strategies_for(&u1).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![grp_id]);
        assert!(state.snapshot().strategies_for(&u1).is_empty());
        assert!(old.principal_exists(&PrincipalRef::group("g1")));
        assert!(!old.principal_exists(&u1));
    }

    #[test]
    fn invalid_records_are_hidden() {
        let state = SharedAuthState::in_memory();
        state.update(|s| {
            let mut g = group("g1", &["u1"]);
            g.valid = false;
            s.groups.insert("g1".into(), g);
            Ok(())
        }).unwrap();
        let snap = state.snapshot();
        assert!(snap.group("g1").is_none());
        assert!(snap.groups_of_user("u1").is_empty());
    }

    #[test]
    fn persisted_state_round_trips_through_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth").join("state.json");
        let a = SharedAuthState::open(&path).unwrap();
        a.update(|s| { s.groups.insert("g1".into(), group("g1", &["u1"])); Ok(()) }).unwrap();

        let b = SharedAuthState::open(&path).unwrap();
        assert!(b.snapshot().group("g1").is_some());

        a.update(|s| { s.groups.insert("g2".into(), group("g2", &[])); Ok(()) }).unwrap();
        assert!(b.snapshot().group("g2").is_none());
        assert!(b.reload().unwrap());
        assert!(b.snapshot().group("g2").is_some());
    }

    #[test]
    fn in_memory_reload_is_a_no_op() {
        assert!(!SharedAuthState::in_memory().reload().unwrap());
    }
}
