//! meshgate: pluggable identity and access control for a service-registry control plane.
//!
//! Boot with [`AuthManager::with_builtin`], then [`AuthManager::initialize`] with an
//! [`AuthConfig`]; the returned [`AuthServer`] verifies tokens and checks permissions
//! on an [`AcquireContext`].

pub mod api;
pub mod checker;
pub mod config;
pub mod context;
pub mod credential;
pub mod error;
pub mod history;
pub mod manager;
pub mod model;
pub mod plugin;
pub mod store;

pub use checker::{CheckerOptions, Decision, DefaultAuthChecker};
pub use config::{AuthConfig, PluginEntry};
pub use context::{AcquireContext, CancelToken, ResourceLinks, Surface};
pub use error::{AuthError, AuthResult};
pub use manager::{AuthManager, AuthServer};
pub use plugin::{AuthChecker, CredentialVerifier, IdentityStore, PermissionChecker, PluginContext, PolicyStore};
pub use store::SharedAuthState;
