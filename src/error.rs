//! Unified error model for the auth gate.
//! Every store, verifier and checker operation returns `AuthResult<T>`; callers
//! map the variant to a transport status with `http_status` or to a batch
//! outcome code with `response_code`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::ResponseCode;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthError {
    #[error("{kind} registry has not finished initialization")]
    NotInitialized { kind: String },
    #[error("{kind} plugin '{name}' is already registered")]
    DuplicatePluginName { kind: String, name: String },
    #[error("{kind} registry is sealed, cannot register '{name}'")]
    RegistryFrozen { kind: String, name: String },
    #[error("no {kind} plugin named '{name}'")]
    UnknownPlugin { kind: String, name: String },

    #[error("invalid credential: {message}")]
    InvalidCredential { message: String },
    #[error("credential disabled: {message}")]
    CredentialDisabled { message: String },
    #[error("identity not found: {message}")]
    IdentityNotFound { message: String },
    #[error("permission denied on {resource}: {reason}")]
    PermissionDenied { resource: String, reason: String },

    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("request cancelled")]
    Cancelled,
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AuthError {
    pub fn invalid_credential<S: Into<String>>(msg: S) -> Self { AuthError::InvalidCredential { message: msg.into() } }
    pub fn credential_disabled<S: Into<String>>(msg: S) -> Self { AuthError::CredentialDisabled { message: msg.into() } }
    pub fn identity_not_found<S: Into<String>>(msg: S) -> Self { AuthError::IdentityNotFound { message: msg.into() } }
    pub fn not_found<S: Into<String>>(msg: S) -> Self { AuthError::NotFound { message: msg.into() } }
    pub fn conflict<S: Into<String>>(msg: S) -> Self { AuthError::Conflict { message: msg.into() } }
    pub fn validation<S: Into<String>>(msg: S) -> Self { AuthError::Validation { message: msg.into() } }
    pub fn internal<S: Into<String>>(msg: S) -> Self { AuthError::Internal { message: msg.into() } }

    pub fn code_str(&self) -> &'static str {
        match self {
            AuthError::NotInitialized { .. } => "not_initialized",
            AuthError::DuplicatePluginName { .. } => "duplicate_plugin_name",
            AuthError::RegistryFrozen { .. } => "registry_frozen",
            AuthError::UnknownPlugin { .. } => "unknown_plugin",
            AuthError::InvalidCredential { .. } => "invalid_credential",
            AuthError::CredentialDisabled { .. } => "credential_disabled",
            AuthError::IdentityNotFound { .. } => "identity_not_found",
            AuthError::PermissionDenied { .. } => "permission_denied",
            AuthError::NotFound { .. } => "not_found",
            AuthError::Conflict { .. } => "conflict",
            AuthError::Validation { .. } => "validation_error",
            AuthError::Cancelled => "cancelled",
            AuthError::Internal { .. } => "internal",
        }
    }

    /// Authentication failures: surfaced as 401 and never retried automatically.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredential { .. } | AuthError::CredentialDisabled { .. } | AuthError::IdentityNotFound { .. }
        )
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AuthError::InvalidCredential { .. }
            | AuthError::CredentialDisabled { .. }
            | AuthError::IdentityNotFound { .. } => 401,
            AuthError::PermissionDenied { .. } => 403,
            AuthError::NotFound { .. } => 404,
            AuthError::Conflict { .. } => 409,
            AuthError::Validation { .. } => 400,
            AuthError::Cancelled => 499,
            AuthError::NotInitialized { .. }
            | AuthError::DuplicatePluginName { .. }
            | AuthError::RegistryFrozen { .. }
            | AuthError::UnknownPlugin { .. }
            | AuthError::Internal { .. } => 500,
        }
    }

    /// Per-item code used in batch write responses.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            AuthError::InvalidCredential { .. } | AuthError::IdentityNotFound { .. } => ResponseCode::Unauthenticated,
            AuthError::CredentialDisabled { .. } => ResponseCode::TokenDisabled,
            AuthError::PermissionDenied { .. } => ResponseCode::Forbidden,
            AuthError::NotFound { .. } => ResponseCode::NotFound,
            AuthError::Conflict { .. } => ResponseCode::Conflict,
            AuthError::Validation { .. } => ResponseCode::InvalidParameter,
            AuthError::Cancelled => ResponseCode::Cancelled,
            AuthError::NotInitialized { .. } => ResponseCode::NotInitialized,
            AuthError::DuplicatePluginName { .. }
            | AuthError::RegistryFrozen { .. }
            | AuthError::UnknownPlugin { .. }
            | AuthError::Internal { .. } => ResponseCode::Internal,
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Validation { message: err.to_string() }
    }
}

impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        AuthError::Internal { message: err.to_string() }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
