//! Built-in identity and policy stores over a shared copy-on-write snapshot.

mod identity;
mod policy;
pub mod query;
mod state;

pub use identity::{DefaultIdentityStore, UserStoreOptions};
pub use policy::{DefaultPolicyStore, StrategyStoreOptions};
pub use state::{AuthSnapshot, SharedAuthState};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AuthError, AuthResult};
use crate::model::{new_id, new_revision, PrincipalRef, ResourceType, StrategyAction, StrategyDetail, WILDCARD_RESOURCE};

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.\-@]{1,64}$").expect("static regex"));

/// Names of users, groups and strategies share one charset.
pub(crate) fn validate_name(kind: &str, name: &str) -> AuthResult<()> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(AuthError::validation(format!("{} name '{}' must be 1-64 of letters, digits, '_', '.', '-', '@'", kind, name)))
    }
}

/// Default strategy created together with `principal`. A main account's covers
/// every resource type by wildcard; sub-accounts and groups start empty.
pub(crate) fn new_default_strategy(
    principal: &PrincipalRef,
    principal_name: &str,
    owner: &str,
    wildcard: bool,
    now: DateTime<Utc>,
) -> StrategyDetail {
    let mut s = StrategyDetail {
        id: new_id(),
        name: format!("__default__{}_{}", principal.role, principal_name),
        action: StrategyAction::ReadWrite,
        comment: format!("default strategy of {}", principal),
        principals: Vec::new(),
        default: true,
        owner: owner.to_string(),
        resources: Vec::new(),
        valid: true,
        revision: new_revision(),
        create_time: now,
        modify_time: now,
    };
    s.add_principal(principal);
    if wildcard {
        for t in ResourceType::ALL {
            s.add_resource(t, WILDCARD_RESOURCE);
        }
    }
    s
}

/// Invalidate the principal's default strategy and unbind it from every other strategy.
pub(crate) fn retire_principal(snap: &mut AuthSnapshot, principal: &PrincipalRef, now: DateTime<Utc>) {
    for s in snap.strategies.values_mut().filter(|s| s.valid) {
        if s.is_default_of(principal) {
            s.valid = false;
            s.touch(now);
        } else if s.remove_principal(principal) {
            s.touch(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_charset() {
        assert!(validate_name("user", "alice.smith@corp-1").is_ok());
        assert!(validate_name("user", "").is_err());
        assert!(validate_name("user", "has space").is_err());
        assert!(validate_name("user", &"x".repeat(65)).is_err());
    }

    #[test]
    fn main_account_default_strategy_is_wildcard() {
        let p = PrincipalRef::user("u1");
        let s = new_default_strategy(&p, "alice", "u1", true, Utc::now());
        assert!(s.is_default_of(&p));
        assert_eq!(s.owner, "u1");
        for t in ResourceType::ALL {
            assert!(s.has_resource(t, WILDCARD_RESOURCE));
        }
        let sub = new_default_strategy(&PrincipalRef::user("u2"), "bob", "u1", false, Utc::now());
        assert!(sub.resources.is_empty());
    }
}
