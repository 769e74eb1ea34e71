//! Per-request acquisition context passed through verification and permission checks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};
use crate::model::{OperatorInfo, Operation, ResourceEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    /// Data-plane calls from registry clients.
    Client,
    /// Administrative calls from the console / open API.
    Console,
}

/// Cooperative cancellation flag shared between a caller and in-flight checks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self { Self::default() }
    pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }
    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

/// Principals whose default strategies should gain or lose the context's resources
/// once a create/modify completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLinks {
    #[serde(default)]
    pub link_users: Vec<String>,
    #[serde(default)]
    pub link_groups: Vec<String>,
    #[serde(default)]
    pub unlink_users: Vec<String>,
    #[serde(default)]
    pub unlink_groups: Vec<String>,
}

impl ResourceLinks {
    pub fn is_empty(&self) -> bool {
        self.link_users.is_empty() && self.link_groups.is_empty() && self.unlink_users.is_empty() && self.unlink_groups.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AcquireContext {
    token: String,
    surface: Surface,
    operation: Operation,
    resources: Vec<ResourceEntry>,
    method: Option<String>,
    request_id: Option<String>,
    links: ResourceLinks,
    cancel: CancelToken,
    operator: Option<OperatorInfo>,
}

impl AcquireContext {
    pub fn builder() -> AcquireContextBuilder { AcquireContextBuilder::default() }

    pub fn token(&self) -> &str { &self.token }
    pub fn surface(&self) -> Surface { self.surface }
    pub fn operation(&self) -> Operation { self.operation }
    pub fn resources(&self) -> &[ResourceEntry] { &self.resources }
    pub fn method(&self) -> Option<&str> { self.method.as_deref() }
    pub fn request_id(&self) -> Option<&str> { self.request_id.as_deref() }
    pub fn links(&self) -> &ResourceLinks { &self.links }
    pub fn cancel_token(&self) -> &CancelToken { &self.cancel }

    /// Identity attached by the verifier or checker, if any.
    pub fn operator(&self) -> Option<&OperatorInfo> { self.operator.as_ref() }

    pub fn set_operator(&mut self, operator: OperatorInfo) { self.operator = Some(operator); }

    pub(crate) fn set_surface(&mut self, surface: Surface) { self.surface = surface; }

    /// Fail with `Cancelled` once the caller has given up on this request.
    pub fn ensure_active(&self) -> AuthResult<()> {
        if self.cancel.is_cancelled() { Err(AuthError::Cancelled) } else { Ok(()) }
    }
}

#[derive(Debug, Clone)]
pub struct AcquireContextBuilder {
    token: String,
    surface: Surface,
    operation: Operation,
    resources: Vec<ResourceEntry>,
    method: Option<String>,
    request_id: Option<String>,
    links: ResourceLinks,
    cancel: CancelToken,
}

impl Default for AcquireContextBuilder {
    fn default() -> Self {
        Self {
            token: String::new(),
            surface: Surface::Console,
            operation: Operation::Read,
            resources: Vec::new(),
            method: None,
            request_id: None,
            links: ResourceLinks::default(),
            cancel: CancelToken::default(),
        }
    }
}

impl AcquireContextBuilder {
    pub fn token(mut self, token: impl Into<String>) -> Self { self.token = token.into(); self }
    pub fn surface(mut self, surface: Surface) -> Self { self.surface = surface; self }
    pub fn operation(mut self, op: Operation) -> Self { self.operation = op; self }
    pub fn resource(mut self, res: ResourceEntry) -> Self { self.resources.push(res); self }
    pub fn resources(mut self, res: impl IntoIterator<Item = ResourceEntry>) -> Self { self.resources.extend(res); self }
    pub fn method(mut self, method: impl Into<String>) -> Self { self.method = Some(method.into()); self }
    pub fn request_id(mut self, id: impl Into<String>) -> Self { self.request_id = Some(id.into()); self }
    pub fn links(mut self, links: ResourceLinks) -> Self { self.links = links; self }
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self { self.cancel = cancel; self }

    pub fn build(self) -> AcquireContext {
        AcquireContext {
            token: self.token.trim().to_string(),
            surface: self.surface,
            operation: self.operation,
            resources: self.resources,
            method: self.method,
            request_id: self.request_id,
            links: self.links,
            cancel: self.cancel,
            operator: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_and_cancel() {
        let cancel = CancelToken::new();
        let ctx = AcquireContext::builder()
            .token("  abc ")
            .resource(ResourceEntry::namespace("ns1", "t"))
            .cancel_token(cancel.clone())
            .build();
        assert_eq!(ctx.token(), "abc");
        assert_eq!(ctx.surface(), Surface::Console);
        assert_eq!(ctx.operation(), Operation::Read);
        assert!(ctx.operator().is_none());
        assert!(ctx.ensure_active().is_ok());
        cancel.cancel();
        assert_eq!(ctx.ensure_active(), Err(AuthError::Cancelled));
    }
}
