//! Boot-time composition: owns the plugin registries, seals them and builds the
//! configured checker, identity store and policy store.

use std::sync::Arc;

use tracing::info;

use crate::checker::{DefaultAuthChecker, Decision};
use crate::config::{AuthConfig, PluginEntry, DEFAULT_CHECKER_PLUGIN, DEFAULT_STRATEGY_PLUGIN, DEFAULT_USER_PLUGIN};
use crate::context::{AcquireContext, Surface};
use crate::error::AuthResult;
use crate::plugin::{
    AuthChecker, CheckerFactory, IdentityStore, IdentityStoreFactory, PluginContext, PolicyStore, PolicyStoreFactory,
    Registry,
};
use crate::store::{DefaultIdentityStore, DefaultPolicyStore};

pub struct AuthManager {
    checkers: Registry<CheckerFactory>,
    users: Registry<IdentityStoreFactory>,
    strategies: Registry<PolicyStoreFactory>,
}

impl Default for AuthManager {
    fn default() -> Self { Self::new() }
}

impl AuthManager {
    /// Empty registries; nothing is usable until plugins are registered.
    pub fn new() -> Self {
        Self {
            checkers: Registry::new("checker"),
            users: Registry::new("user"),
            strategies: Registry::new("strategy"),
        }
    }

    /// Registries pre-populated with the built-in plugins.
    pub fn with_builtin() -> AuthResult<Self> {
        let m = Self::new();
        m.register_user_store(
            DEFAULT_USER_PLUGIN,
            Arc::new(|entry: &PluginEntry, ctx: &PluginContext| -> AuthResult<Arc<dyn IdentityStore>> {
                let store: Arc<dyn IdentityStore> = Arc::new(DefaultIdentityStore::from_entry(entry, ctx.state.clone())?);
                Ok(store)
            }),
        )?;
        m.register_policy_store(
            DEFAULT_STRATEGY_PLUGIN,
            Arc::new(|entry: &PluginEntry, ctx: &PluginContext, _identity: Arc<dyn IdentityStore>| -> AuthResult<Arc<dyn PolicyStore>> {
                let store: Arc<dyn PolicyStore> = Arc::new(DefaultPolicyStore::from_entry(entry, ctx.state.clone())?);
                Ok(store)
            }),
        )?;
        m.register_checker(
            DEFAULT_CHECKER_PLUGIN,
            Arc::new(
                |entry: &PluginEntry,
                 ctx: &PluginContext,
                 _identity: Arc<dyn IdentityStore>,
                 policy: Arc<dyn PolicyStore>|
                 -> AuthResult<Arc<dyn AuthChecker>> {
                let checker: Arc<dyn AuthChecker> =
                    Arc::new(DefaultAuthChecker::from_entry(entry, ctx.state.clone(), policy, ctx.history.clone())?);
                Ok(checker)
            }),
        )?;
        Ok(m)
    }

    pub fn register_checker(&self, name: &str, factory: CheckerFactory) -> AuthResult<()> {
        self.checkers.register(name, factory)
    }

    pub fn register_user_store(&self, name: &str, factory: IdentityStoreFactory) -> AuthResult<()> {
        self.users.register(name, factory)
    }

    pub fn register_policy_store(&self, name: &str, factory: PolicyStoreFactory) -> AuthResult<()> {
        self.strategies.register(name, factory)
    }

    pub fn checkers(&self) -> &Registry<CheckerFactory> { &self.checkers }
    pub fn users(&self) -> &Registry<IdentityStoreFactory> { &self.users }
    pub fn strategies(&self) -> &Registry<PolicyStoreFactory> { &self.strategies }

    /// Freeze all registries. Later calls are no-ops.
    pub fn seal(&self) {
        self.checkers.seal();
        self.users.seal();
        self.strategies.seal();
    }

    /// Seal the registries and build the configured plugins. Unknown names and
    /// invalid options fail here.
    pub fn initialize(&self, config: &AuthConfig, ctx: PluginContext) -> AuthResult<AuthServer> {
        config.validate()?;
        self.seal();
        let make_users = self.users.lookup(&config.user.name)?;
        let make_strategies = self.strategies.lookup(&config.strategy.name)?;
        let make_checker = self.checkers.lookup(&config.checker.name)?;

        let users = make_users(&config.user, &ctx)?;
        let strategies = make_strategies(&config.strategy, &ctx, users.clone())?;
        let checker = make_checker(&config.checker, &ctx, users.clone(), strategies.clone())?;
        info!(
            target: "meshgate::registry",
            checker = checker.name(),
            user = users.name(),
            strategy = strategies.name(),
            console_auth = checker.is_open_console_auth(),
            client_auth = checker.is_open_client_auth(),
            "auth plugins initialized"
        );
        Ok(AuthServer { checker, users, strategies })
    }
}

/// The active plugin of each category.
#[derive(Clone)]
pub struct AuthServer {
    checker: Arc<dyn AuthChecker>,
    users: Arc<dyn IdentityStore>,
    strategies: Arc<dyn PolicyStore>,
}

impl AuthServer {
    pub fn checker(&self) -> &Arc<dyn AuthChecker> { &self.checker }
    pub fn users(&self) -> &Arc<dyn IdentityStore> { &self.users }
    pub fn strategies(&self) -> &Arc<dyn PolicyStore> { &self.strategies }

    /// Check permission on the surface the context was built for.
    pub fn check(&self, ctx: &mut AcquireContext) -> AuthResult<Decision> {
        match ctx.surface() {
            Surface::Client => self.checker.check_client_permission(ctx),
            Surface::Console => self.checker.check_console_permission(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::history::MemoryHistory;
    use crate::store::SharedAuthState;

    fn plugin_ctx() -> PluginContext {
        PluginContext { state: SharedAuthState::in_memory(), history: Arc::new(MemoryHistory::new()) }
    }

    #[test]
    fn builtin_plugins_initialize() {
        let m = AuthManager::with_builtin().unwrap();
        let server = m.initialize(&AuthConfig::default(), plugin_ctx()).unwrap();
        assert_eq!(server.checker().name(), DEFAULT_CHECKER_PLUGIN);
        assert_eq!(server.users().name(), DEFAULT_USER_PLUGIN);
        assert_eq!(server.strategies().name(), DEFAULT_STRATEGY_PLUGIN);
        assert!(server.checker().is_open_console_auth());
        assert!(!server.checker().is_open_client_auth());
    }

    #[test]
    fn unknown_plugin_name_fails_initialize() {
        let m = AuthManager::with_builtin().unwrap();
        let cfg = AuthConfig { user: PluginEntry::named("ldapUser"), ..AuthConfig::default() };
        let err = m.initialize(&cfg, plugin_ctx()).err().unwrap();
        assert_eq!(err, AuthError::UnknownPlugin { kind: "user".into(), name: "ldapUser".into() });
    }

    #[test]
    fn bad_options_fail_initialize() {
        let m = AuthManager::with_builtin().unwrap();
        let cfg = AuthConfig { checker: PluginEntry::named(DEFAULT_CHECKER_PLUGIN).with_option("strict", "yes"), ..AuthConfig::default() };
        assert!(matches!(m.initialize(&cfg, plugin_ctx()), Err(AuthError::Validation { .. })));
    }

    #[test]
    fn registration_closes_after_initialize() {
        let m = AuthManager::with_builtin().unwrap();
        m.initialize(&AuthConfig::default(), plugin_ctx()).unwrap();
        let late: CheckerFactory = Arc::new(
            |_: &PluginEntry, _: &PluginContext, _: Arc<dyn IdentityStore>, _: Arc<dyn PolicyStore>| -> AuthResult<Arc<dyn AuthChecker>> {
                Err(AuthError::internal("unused"))
            },
        );
        assert!(matches!(m.register_checker("late", late), Err(AuthError::RegistryFrozen { .. })));
    }
}
