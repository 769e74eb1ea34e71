//! Plugin registration: third-party checkers are selectable by name, and names
//! are bound at most once.

use std::sync::Arc;

use anyhow::Result;

use meshgate::config::DEFAULT_CHECKER_PLUGIN;
use meshgate::history::MemoryHistory;
use meshgate::model::{Operation, OperatorInfo, ResourceEntry};
use meshgate::plugin::CheckerFactory;
use meshgate::{
    AcquireContext, AuthChecker, AuthConfig, AuthError, AuthManager, AuthResult, CredentialVerifier, Decision,
    IdentityStore, PermissionChecker, PluginContext, PluginEntry, PolicyStore, SharedAuthState,
};

/// Lets everything through and records nothing.
struct AllowAll;

impl CredentialVerifier for AllowAll {
    fn verify(&self, ctx: &mut AcquireContext) -> AuthResult<OperatorInfo> {
        let op = OperatorInfo::anonymous();
        ctx.set_operator(op.clone());
        Ok(op)
    }
    fn is_open_client_auth(&self) -> bool { true }
    fn is_open_console_auth(&self) -> bool { true }
}

impl PermissionChecker for AllowAll {
    fn check_client_permission(&self, ctx: &mut AcquireContext) -> AuthResult<Decision> {
        self.verify(ctx)?;
        Ok(Decision::allowed("allow_all"))
    }
    fn check_console_permission(&self, ctx: &mut AcquireContext) -> AuthResult<Decision> {
        self.check_client_permission(ctx)
    }
}

impl AuthChecker for AllowAll {
    fn name(&self) -> &str { "allowAll" }
}

fn allow_all_factory() -> CheckerFactory {
    Arc::new(
        |_: &PluginEntry, _: &PluginContext, _: Arc<dyn IdentityStore>, _: Arc<dyn PolicyStore>| -> AuthResult<Arc<dyn AuthChecker>> {
            let checker: Arc<dyn AuthChecker> = Arc::new(AllowAll);
            Ok(checker)
        },
    )
}

fn plugin_ctx() -> PluginContext {
    PluginContext { state: SharedAuthState::in_memory(), history: Arc::new(MemoryHistory::new()) }
}

#[test]
fn custom_checker_is_selected_by_name() -> Result<()> {
    let manager = AuthManager::with_builtin()?;
    manager.register_checker("allowAll", allow_all_factory())?;
    let config = AuthConfig { checker: PluginEntry::named("allowAll"), ..AuthConfig::default() };
    let server = manager.initialize(&config, plugin_ctx())?;
    assert_eq!(server.checker().name(), "allowAll");

    let mut ctx = AcquireContext::builder()
        .token("anything")
        .operation(Operation::Delete)
        .resource(ResourceEntry::namespace("prod", "t"))
        .build();
    let d = server.check(&mut ctx)?;
    assert!(d.allow);
    assert_eq!(d.reason.as_deref(), Some("allow_all"));
    Ok(())
}

#[test]
fn duplicate_name_keeps_first_binding() -> Result<()> {
    let manager = AuthManager::with_builtin()?;
    let err = manager.register_checker(DEFAULT_CHECKER_PLUGIN, allow_all_factory()).unwrap_err();
    assert_eq!(err, AuthError::DuplicatePluginName { kind: "checker".into(), name: DEFAULT_CHECKER_PLUGIN.into() });

    let server = manager.initialize(&AuthConfig::default(), plugin_ctx())?;
    assert_eq!(server.checker().name(), DEFAULT_CHECKER_PLUGIN);
    Ok(())
}

#[test]
fn lookup_before_initialize_is_not_initialized() {
    let manager = AuthManager::new();
    let err = manager.checkers().lookup(DEFAULT_CHECKER_PLUGIN).err().unwrap();
    assert!(matches!(err, AuthError::NotInitialized { .. }));
}

#[test]
fn empty_manager_cannot_build_defaults() {
    let manager = AuthManager::new();
    let err = manager.initialize(&AuthConfig::default(), plugin_ctx()).err().unwrap();
    assert!(matches!(err, AuthError::UnknownPlugin { .. }));
}
