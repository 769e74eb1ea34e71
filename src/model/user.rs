use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Main account; owns resources and sub-accounts.
    Owner,
    SubAccount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub password_hash: String,
    /// Empty for a main account, otherwise the owning main-account id.
    #[serde(default)]
    pub owner: String,
    pub user_type: UserRole,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub comment: String,
    pub token: String,
    pub token_enable: bool,
    pub valid: bool,
    pub create_time: DateTime<Utc>,
    pub modify_time: DateTime<Utc>,
}

impl User {
    /// Tenant that owns this user's resources: itself for a main account.
    pub fn tenant_id(&self) -> &str {
        if self.owner.is_empty() { &self.id } else { &self.owner }
    }

    pub fn view(&self) -> UserView {
        UserView {
            id: self.id.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            user_type: self.user_type,
            source: self.source.clone(),
            mobile: self.mobile.clone(),
            email: self.email.clone(),
            comment: self.comment.clone(),
            token_enable: self.token_enable,
            create_time: self.create_time,
            modify_time: self.modify_time,
        }
    }
}

/// User as returned by queries: no password hash, no token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub user_type: UserRole,
    pub source: String,
    pub mobile: String,
    pub email: String,
    pub comment: String,
    pub token_enable: bool,
    pub create_time: DateTime<Utc>,
    pub modify_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub token: String,
    pub token_enable: bool,
    pub valid: bool,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub user_ids: BTreeSet<String>,
    pub create_time: DateTime<Utc>,
    pub modify_time: DateTime<Utc>,
}

impl UserGroup {
    pub fn view(&self) -> GroupView {
        GroupView {
            id: self.id.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            comment: self.comment.clone(),
            token_enable: self.token_enable,
            user_ids: self.user_ids.iter().cloned().collect(),
            create_time: self.create_time,
            modify_time: self.modify_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupView {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub comment: String,
    pub token_enable: bool,
    pub user_ids: Vec<String>,
    pub create_time: DateTime<Utc>,
    pub modify_time: DateTime<Utc>,
}
