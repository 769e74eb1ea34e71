use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::resource::{Operation, ResourceEntry, ResourceType};
use crate::error::AuthError;

/// Resource id meaning "every resource of this type owned by the strategy owner".
pub const WILDCARD_RESOURCE: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalRole {
    User,
    Group,
}

impl PrincipalRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PrincipalRole::User => "user",
            PrincipalRole::Group => "group",
        }
    }
}

impl fmt::Display for PrincipalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for PrincipalRole {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "user" | "users" => Ok(PrincipalRole::User),
            "2" | "group" | "groups" => Ok(PrincipalRole::Group),
            other => Err(AuthError::validation(format!("unknown principal role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipalRef {
    pub id: String,
    pub role: PrincipalRole,
}

impl PrincipalRef {
    pub fn user(id: &str) -> Self { Self { id: id.to_string(), role: PrincipalRole::User } }
    pub fn group(id: &str) -> Self { Self { id: id.to_string(), role: PrincipalRole::Group } }
}

impl fmt::Display for PrincipalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}/{}", self.role, self.id) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub strategy_id: String,
    pub principal_id: String,
    pub principal_role: PrincipalRole,
}

impl Principal {
    pub fn matches(&self, p: &PrincipalRef) -> bool {
        self.principal_id == p.id && self.principal_role == p.role
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyResource {
    pub strategy_id: String,
    pub res_type: ResourceType,
    pub res_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyAction {
    ReadOnly,
    ReadWrite,
    Deny,
}

impl StrategyAction {
    pub fn permits(self, op: Operation) -> bool {
        match self {
            StrategyAction::ReadOnly => !op.is_write(),
            StrategyAction::ReadWrite => true,
            StrategyAction::Deny => false,
        }
    }
}

impl FromStr for StrategyAction {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" | "read_only" => Ok(StrategyAction::ReadOnly),
            "write" | "read_write" => Ok(StrategyAction::ReadWrite),
            "deny" => Ok(StrategyAction::Deny),
            other => Err(AuthError::validation(format!("unknown strategy action '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDetail {
    pub id: String,
    pub name: String,
    pub action: StrategyAction,
    #[serde(default)]
    pub comment: String,
    pub principals: Vec<Principal>,
    pub default: bool,
    pub owner: String,
    pub resources: Vec<StrategyResource>,
    pub valid: bool,
    pub revision: String,
    pub create_time: DateTime<Utc>,
    pub modify_time: DateTime<Utc>,
}

impl StrategyDetail {
    pub fn binds(&self, principal: &PrincipalRef) -> bool {
        self.principals.iter().any(|p| p.matches(principal))
    }

    /// Default strategy auto-created for exactly this principal.
    pub fn is_default_of(&self, principal: &PrincipalRef) -> bool {
        self.default && self.binds(principal)
    }

    pub fn has_resource(&self, res_type: ResourceType, res_id: &str) -> bool {
        self.resources.iter().any(|r| r.res_type == res_type && r.res_id == res_id)
    }

    /// Exact id match, or a wildcard of the same type over a resource this strategy's owner owns.
    pub fn covers(&self, res: &ResourceEntry) -> bool {
        self.resources.iter().any(|r| {
            r.res_type == res.res_type
                && (r.res_id == res.id || (r.res_id == WILDCARD_RESOURCE && !self.owner.is_empty() && res.owner == self.owner))
        })
    }

    /// Add a resource binding; returns false when it was already present.
    pub fn add_resource(&mut self, res_type: ResourceType, res_id: &str) -> bool {
        if self.has_resource(res_type, res_id) { return false; }
        self.resources.push(StrategyResource { strategy_id: self.id.clone(), res_type, res_id: res_id.to_string() });
        true
    }

    /// Remove a resource binding; returns false when nothing matched.
    pub fn remove_resource(&mut self, res_type: ResourceType, res_id: &str) -> bool {
        let before = self.resources.len();
        self.resources.retain(|r| !(r.res_type == res_type && r.res_id == res_id));
        before != self.resources.len()
    }

    pub fn add_principal(&mut self, principal: &PrincipalRef) -> bool {
        if self.binds(principal) { return false; }
        self.principals.push(Principal { strategy_id: self.id.clone(), principal_id: principal.id.clone(), principal_role: principal.role });
        true
    }

    pub fn remove_principal(&mut self, principal: &PrincipalRef) -> bool {
        let before = self.principals.len();
        self.principals.retain(|p| !p.matches(principal));
        before != self.principals.len()
    }

    /// Refresh revision and modify time after a mutation.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.revision = super::new_revision();
        self.modify_time = now;
    }
}
