use serde::{Deserialize, Serialize};

use super::strategy::{PrincipalRef, PrincipalRole};
use super::user::{User, UserGroup, UserRole};

pub const ANONYMOUS_OPERATOR_ID: &str = "__anonymous__";

/// Caller identity resolved from a bearer token. Derived per request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorInfo {
    pub origin_token: String,
    pub operator_id: String,
    /// Tenant (main-account id) the operator belongs to.
    pub owner_id: String,
    pub user_role: Option<UserRole>,
    pub principal_role: PrincipalRole,
    pub is_user_token: bool,
    pub disabled: bool,
    pub anonymous: bool,
}

impl OperatorInfo {
    pub fn anonymous() -> Self {
        Self {
            origin_token: String::new(),
            operator_id: ANONYMOUS_OPERATOR_ID.to_string(),
            owner_id: String::new(),
            user_role: None,
            principal_role: PrincipalRole::User,
            is_user_token: false,
            disabled: false,
            anonymous: true,
        }
    }

    pub fn from_user(user: &User, token: &str) -> Self {
        Self {
            origin_token: token.to_string(),
            operator_id: user.id.clone(),
            owner_id: user.tenant_id().to_string(),
            user_role: Some(user.user_type),
            principal_role: PrincipalRole::User,
            is_user_token: true,
            disabled: !user.token_enable,
            anonymous: false,
        }
    }

    pub fn from_group(group: &UserGroup, token: &str) -> Self {
        Self {
            origin_token: token.to_string(),
            operator_id: group.id.clone(),
            owner_id: group.owner.clone(),
            user_role: None,
            principal_role: PrincipalRole::Group,
            is_user_token: false,
            disabled: !group.token_enable,
            anonymous: false,
        }
    }

    /// Principal to resolve strategies for; `None` for the anonymous identity.
    pub fn principal(&self) -> Option<PrincipalRef> {
        if self.anonymous { return None; }
        Some(PrincipalRef { id: self.operator_id.clone(), role: self.principal_role })
    }
}
