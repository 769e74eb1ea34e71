//! Request/response shapes shared by the store and checker plugins.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};
use crate::model::{PrincipalRef, ResourceType, StrategyAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCode {
    Success,
    PartialFailure,
    InvalidParameter,
    NotFound,
    Conflict,
    Unauthenticated,
    TokenDisabled,
    Forbidden,
    Cancelled,
    NotInitialized,
    Internal,
}

impl ResponseCode {
    /// Numeric code as reported to administrative callers.
    pub fn as_u32(self) -> u32 {
        match self {
            ResponseCode::Success => 200000,
            ResponseCode::PartialFailure => 200001,
            ResponseCode::InvalidParameter => 400000,
            ResponseCode::Unauthenticated => 401000,
            ResponseCode::TokenDisabled => 401001,
            ResponseCode::Forbidden => 403000,
            ResponseCode::NotFound => 404000,
            ResponseCode::Conflict => 409000,
            ResponseCode::Cancelled => 499000,
            ResponseCode::NotInitialized => 500001,
            ResponseCode::Internal => 500000,
        }
    }

    pub fn is_success(self) -> bool { matches!(self, ResponseCode::Success) }
}

/// Outcome of one item of a batch write, aligned with the input index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub index: usize,
    pub code: ResponseCode,
    pub message: String,
    /// Id of the record the item created or touched, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWriteResponse {
    pub code: ResponseCode,
    pub responses: Vec<ItemOutcome>,
}

impl BatchWriteResponse {
    /// Fold per-item results into a response. Items are never collapsed: each
    /// keeps its own code so callers can retry only the failed subset.
    pub fn collect(results: Vec<AuthResult<String>>) -> Self {
        let responses: Vec<ItemOutcome> = results
            .into_iter()
            .enumerate()
            .map(|(index, r)| match r {
                Ok(id) => ItemOutcome { index, code: ResponseCode::Success, message: "ok".into(), id: Some(id) },
                Err(e) => ItemOutcome { index, code: e.response_code(), message: e.to_string(), id: None },
            })
            .collect();
        let failed: Vec<ResponseCode> = responses.iter().map(|o| o.code).filter(|c| !c.is_success()).collect();
        let code = if failed.is_empty() {
            ResponseCode::Success
        } else if failed.len() == responses.len() && failed.iter().all(|c| *c == failed[0]) {
            failed[0]
        } else {
            ResponseCode::PartialFailure
        };
        Self { code, responses }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.responses.iter().filter(|o| o.code.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.responses.iter().filter(|o| !o.code.is_success())
    }
}

/// Flat string-keyed query parameters (`name`, `owner`, `res_type`, `principal_id`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    /// Parse a typed parameter; a present-but-unparseable value is a validation error.
    pub fn parse<T: FromStr>(&self, key: &str) -> AuthResult<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|_| AuthError::validation(format!("invalid value '{}' for query key '{}'", raw, key))),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse<T> {
    pub total: usize,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Name of the owning main account when logging in as a sub-account.
    #[serde(default)]
    pub owner: Option<String>,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub owner_id: String,
    pub name: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub principal_id: String,
    pub token: String,
    pub enabled: bool,
}

/// New user; an empty `owner` creates a main account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyUser {
    pub id: String,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyUserPassword {
    pub id: String,
    /// Checked against the stored hash when present.
    #[serde(default)]
    pub old_password: Option<String>,
    pub new_password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGroup {
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyGroup {
    pub id: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub add_user_ids: Vec<String>,
    #[serde(default)]
    pub remove_user_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub res_type: ResourceType,
    pub res_id: String,
}

impl ResourceRef {
    pub fn new(res_type: ResourceType, res_id: &str) -> Self { Self { res_type, res_id: res_id.to_string() } }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStrategy {
    pub name: String,
    pub owner: String,
    pub action: StrategyAction,
    #[serde(default)]
    pub comment: String,
    pub principals: Vec<PrincipalRef>,
    pub resources: Vec<ResourceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyStrategy {
    pub id: String,
    /// Expected current revision; the update is rejected when it no longer matches.
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub action: Option<StrategyAction>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub add_principals: Vec<PrincipalRef>,
    #[serde(default)]
    pub remove_principals: Vec<PrincipalRef>,
    #[serde(default)]
    pub add_resources: Vec<ResourceRef>,
    #[serde(default)]
    pub remove_resources: Vec<ResourceRef>,
}

/// Resource ids a principal may act on, per type. `*` stands for the owner's wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalResources {
    pub resources: BTreeMap<ResourceType, BTreeSet<String>>,
}

impl PrincipalResources {
    pub fn ids(&self, res_type: ResourceType) -> Vec<&str> {
        self.resources.get(&res_type).map(|s| s.iter().map(|x| x.as_str()).collect()).unwrap_or_default()
    }

    pub fn contains(&self, res_type: ResourceType, id: &str) -> bool {
        self.resources.get(&res_type).map(|s| s.contains(id)).unwrap_or(false)
    }
}
