use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use meshgate::api::CreateUser;
use meshgate::history::{FileHistory, HistorySink, TracingHistory};
use meshgate::{AuthConfig, AuthManager, PluginContext, SharedAuthState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let config = match std::env::var("MESHGATE_CONFIG") {
        Ok(path) => AuthConfig::load(&path).with_context(|| format!("loading config from '{}'", path))?,
        Err(_) => AuthConfig::default(),
    };
    info!(
        target: "meshgate",
        "meshgate starting: checker='{}', user='{}', strategy='{}', snapshot={:?}",
        config.checker.name, config.user.name, config.strategy.name, config.storage.snapshot_path
    );

    let state = match &config.storage.snapshot_path {
        Some(path) => SharedAuthState::open(path).context("opening auth snapshot")?,
        None => SharedAuthState::in_memory(),
    };
    let history: Arc<dyn HistorySink> = match &config.audit_log {
        Some(path) => Arc::new(FileHistory::new(path)),
        None => Arc::new(TracingHistory),
    };

    let manager = AuthManager::with_builtin()?;
    let server = manager.initialize(&config, PluginContext { state: state.clone(), history })?;

    if let (Ok(name), Ok(password)) = (std::env::var("MESHGATE_ADMIN_USER"), std::env::var("MESHGATE_ADMIN_PASSWORD")) {
        let resp = server.users().create_users(vec![CreateUser { name: name.clone(), password, ..Default::default() }]);
        let failure = resp.failed().next().cloned();
        match failure {
            None => info!(target: "meshgate", user = %name, "bootstrap admin created"),
            Some(f) => warn!(target: "meshgate", user = %name, code = ?f.code, "bootstrap admin not created: {}", f.message),
        }
    }

    let refresh = config
        .storage
        .refresh_interval_ms
        .map(|ms| state.spawn_refresh(Duration::from_millis(ms)));

    info!(
        target: "meshgate",
        console_auth = server.checker().is_open_console_auth(),
        client_auth = server.checker().is_open_client_auth(),
        "meshgate ready"
    );

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    if let Some(handle) = refresh {
        handle.abort();
    }
    info!(target: "meshgate", "meshgate stopped");
    Ok(())
}
