//! `defaultAuthChecker`: token verification and per-surface permission checks.

pub mod evaluate;

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{PluginEntry, DEFAULT_CHECKER_PLUGIN};
use crate::context::{AcquireContext, Surface};
use crate::credential::parse_token;
use crate::error::{AuthError, AuthResult};
use crate::history::{HistorySink, Outcome, RecordEntry};
use crate::model::{OperatorInfo, PrincipalRole, ResourceEntry};
use crate::plugin::{AuthChecker, CredentialVerifier, PermissionChecker, PolicyStore};
use crate::store::{AuthSnapshot, SharedAuthState};

pub const REASON_AUTH_DISABLED: &str = "auth_disabled";
pub const REASON_NO_RESOURCES: &str = "no_resources";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CheckerOptions {
    pub console_open: bool,
    pub client_open: bool,
    pub strict: bool,
}

impl Default for CheckerOptions {
    fn default() -> Self { Self { console_open: true, client_open: false, strict: false } }
}

/// Outcome of a permission check. A denial names the first resource that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceEntry>,
}

impl Decision {
    pub fn allowed(reason: &str) -> Self {
        Self { allow: true, reason: Some(reason.to_string()), resource: None }
    }

    pub fn denied(resource: ResourceEntry, reason: &str) -> Self {
        Self { allow: false, reason: Some(reason.to_string()), resource: Some(resource) }
    }

    pub fn ensure_allowed(&self) -> AuthResult<()> {
        if self.allow { return Ok(()); }
        Err(AuthError::PermissionDenied {
            resource: self.resource.as_ref().map(|r| r.label()).unwrap_or_default(),
            reason: self.reason.clone().unwrap_or_default(),
        })
    }
}

/// Resolves tokens and strategies from one snapshot of the shared auth state
/// per call, so a check never mixes records from before and after a write.
pub struct DefaultAuthChecker {
    options: CheckerOptions,
    state: SharedAuthState,
    policy: Arc<dyn PolicyStore>,
    history: Arc<dyn HistorySink>,
}

impl DefaultAuthChecker {
    pub fn new(
        options: CheckerOptions,
        state: SharedAuthState,
        policy: Arc<dyn PolicyStore>,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        Self { options, state, policy, history }
    }

    pub fn from_entry(
        entry: &PluginEntry,
        state: SharedAuthState,
        policy: Arc<dyn PolicyStore>,
        history: Arc<dyn HistorySink>,
    ) -> AuthResult<Self> {
        Ok(Self::new(entry.parse_options()?, state, policy, history))
    }

    pub fn options(&self) -> &CheckerOptions { &self.options }

    fn surface_open(&self, surface: Surface) -> bool {
        match surface {
            Surface::Client => self.options.client_open,
            Surface::Console => self.options.console_open,
        }
    }

    /// Resolve a token. On failure the identity to attach is returned with the error.
    fn resolve(&self, snap: &AuthSnapshot, token: &str) -> Result<OperatorInfo, (OperatorInfo, AuthError)> {
        let anon = OperatorInfo::anonymous();
        if token.is_empty() {
            if self.options.strict {
                return Err((anon, AuthError::invalid_credential("missing token")));
            }
            return Ok(anon);
        }
        let claims = parse_token(token).map_err(|e| (anon.clone(), e))?;
        let operator = match claims.role {
            PrincipalRole::User => {
                let user = snap
                    .user(&claims.principal_id)
                    .ok_or_else(|| (anon.clone(), AuthError::identity_not_found(format!("user '{}'", claims.principal_id))))?;
                if user.token != token {
                    return Err((anon, AuthError::identity_not_found("token has been reset")));
                }
                OperatorInfo::from_user(user, token)
            }
            PrincipalRole::Group => {
                let group = snap
                    .group(&claims.principal_id)
                    .ok_or_else(|| (anon.clone(), AuthError::identity_not_found(format!("group '{}'", claims.principal_id))))?;
                if group.token != token {
                    return Err((anon, AuthError::identity_not_found("token has been reset")));
                }
                OperatorInfo::from_group(group, token)
            }
        };
        if operator.disabled {
            let msg = format!("token of {} '{}' is disabled", operator.principal_role, operator.operator_id);
            return Err((operator, AuthError::credential_disabled(msg)));
        }
        Ok(operator)
    }

    fn audit(&self, ctx: &AcquireContext, operator: &str, resource: Option<&ResourceEntry>, outcome: Outcome, detail: &str) {
        let (resource_type, resource_name, namespace) = match resource {
            Some(r) => (Some(r.res_type), if r.name.is_empty() { r.id.clone() } else { r.name.clone() }, r.namespace.clone()),
            None => (None, String::new(), String::new()),
        };
        self.history.record(RecordEntry {
            resource_type,
            resource_name,
            namespace,
            operator: operator.to_string(),
            operation: ctx.operation(),
            outcome,
            detail: detail.to_string(),
            happen_time: Utc::now(),
        });
    }

    /// One record per requested resource, or a single record when none were named.
    fn audit_all(&self, ctx: &AcquireContext, operator: &str, outcome: Outcome, detail: &str) {
        if ctx.resources().is_empty() {
            self.audit(ctx, operator, None, outcome, detail);
        }
        for r in ctx.resources() {
            self.audit(ctx, operator, Some(r), outcome, detail);
        }
    }

    /// Verify against `snap` and write the resulting identity into the context.
    fn verify_in(&self, snap: &AuthSnapshot, ctx: &mut AcquireContext) -> AuthResult<OperatorInfo> {
        if !self.surface_open(ctx.surface()) {
            let anon = OperatorInfo::anonymous();
            ctx.set_operator(anon.clone());
            return Ok(anon);
        }
        match self.resolve(snap, ctx.token()) {
            Ok(op) => {
                ctx.set_operator(op.clone());
                Ok(op)
            }
            Err((op, err)) => {
                info!(
                    target: "meshgate::checker",
                    surface = ?ctx.surface(),
                    method = ctx.method().unwrap_or(""),
                    code = err.code_str(),
                    "credential rejected: {}", err
                );
                ctx.set_operator(op);
                Err(err)
            }
        }
    }

    /// Failed checks still carry an identity and leave an audit trail.
    fn check(&self, ctx: &mut AcquireContext, surface: Surface) -> AuthResult<Decision> {
        ctx.set_surface(surface);
        let result = self.decide(ctx, surface);
        if let Err(e) = &result {
            if ctx.operator().is_none() {
                ctx.set_operator(OperatorInfo::anonymous());
            }
            let who = ctx.operator().map(|o| o.operator_id.clone()).unwrap_or_default();
            self.audit_all(ctx, &who, Outcome::Failed, e.code_str());
        }
        result
    }

    fn decide(&self, ctx: &mut AcquireContext, surface: Surface) -> AuthResult<Decision> {
        ctx.ensure_active()?;
        if !self.surface_open(surface) {
            let anon = OperatorInfo::anonymous();
            self.audit_all(ctx, &anon.operator_id, Outcome::Allowed, REASON_AUTH_DISABLED);
            ctx.set_operator(anon);
            return Ok(Decision::allowed(REASON_AUTH_DISABLED));
        }

        let snap = self.state.snapshot();
        let operator = self.verify_in(&snap, ctx)?;
        let principal = operator.principal();
        ctx.ensure_active()?;
        let strategies = match &principal {
            Some(p) => self.policy.principal_strategies_in(&snap, p)?,
            None => Vec::new(),
        };
        ctx.ensure_active()?;

        let mut denial: Option<Decision> = None;
        for res in ctx.resources() {
            let v = evaluate::evaluate(&strategies, principal.as_ref(), ctx.operation(), res, self.options.strict);
            let outcome = if v.allow { Outcome::Allowed } else { Outcome::Denied };
            self.audit(ctx, &operator.operator_id, Some(res), outcome, v.reason);
            if !v.allow && denial.is_none() {
                denial = Some(Decision::denied(res.clone(), v.reason));
            }
        }
        if ctx.resources().is_empty() {
            self.audit(ctx, &operator.operator_id, None, Outcome::Allowed, REASON_NO_RESOURCES);
        }

        match denial {
            Some(d) => {
                warn!(
                    target: "meshgate::checker",
                    operator = %operator.operator_id,
                    surface = ?surface,
                    operation = ctx.operation().as_str(),
                    resource = %d.resource.as_ref().map(|r| r.label()).unwrap_or_default(),
                    reason = d.reason.as_deref().unwrap_or(""),
                    request_id = ctx.request_id().unwrap_or(""),
                    "permission denied"
                );
                Ok(d)
            }
            None => {
                debug!(
                    target: "meshgate::checker",
                    operator = %operator.operator_id,
                    surface = ?surface,
                    operation = ctx.operation().as_str(),
                    resources = ctx.resources().len(),
                    "permission granted"
                );
                let reason = if ctx.resources().is_empty() { REASON_NO_RESOURCES } else { "allowed" };
                Ok(Decision::allowed(reason))
            }
        }
    }
}

impl CredentialVerifier for DefaultAuthChecker {
    fn verify(&self, ctx: &mut AcquireContext) -> AuthResult<OperatorInfo> {
        self.verify_in(&self.state.snapshot(), ctx)
    }

    fn is_open_client_auth(&self) -> bool { self.options.client_open }

    fn is_open_console_auth(&self) -> bool { self.options.console_open }
}

impl PermissionChecker for DefaultAuthChecker {
    fn check_client_permission(&self, ctx: &mut AcquireContext) -> AuthResult<Decision> {
        self.check(ctx, Surface::Client)
    }

    fn check_console_permission(&self, ctx: &mut AcquireContext) -> AuthResult<Decision> {
        self.check(ctx, Surface::Console)
    }
}

impl AuthChecker for DefaultAuthChecker {
    fn name(&self) -> &str { DEFAULT_CHECKER_PLUGIN }
}
