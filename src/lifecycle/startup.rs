//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a validated configuration into the frozen `Runtime`
//! - Bind the listener and release the boot barrier
//! - Start background tasks (statistics reporter)
//!
//! # Design Decisions
//! - Fail fast: any startup error is returned, never logged and ignored
//! - `prepare` is pure apart from reading PEM files; nothing is bound
//! - Listener binds before the barrier releases (traffic only when ready)

use tokio::sync::broadcast;

use crate::config::validation::{validate_config, ValidationError};
use crate::config::{ConfigError, ProxyConfig};
use crate::error::StartupError;
use crate::http::HttpServer;
use crate::lifecycle::boot::BootRelease;
use crate::lifecycle::runtime::{InstanceId, ListenerSettings, Runtime, ServerIdentity};
use crate::net::{Listener, TlsPolicy};
use crate::observability::stats;
use crate::resilience::{ServerTimeouts, UpstreamTimeouts};
use crate::routing::RouteTable;

/// Compile configuration into the runtime: validate, build routes, build
/// the TLS policy, freeze.
pub fn prepare(config: &ProxyConfig) -> Result<Runtime, StartupError> {
    validate_config(config).map_err(ConfigError::Validation)?;

    let bind_address = config.listener.bind_address.parse().map_err(|_| {
        ConfigError::Validation(vec![ValidationError::new(
            "listener.bind_address",
            "not a socket address",
        )])
    })?;

    let routes = RouteTable::build(&config.routes, &config.resources)?;

    let tls = match &config.listener.tls {
        Some(tls) => {
            let cert = tls.cert.load().map_err(StartupError::TlsMaterial)?;
            let key = tls.key.load().map_err(StartupError::TlsMaterial)?;
            Some(TlsPolicy::build(&cert, &key)?)
        }
        None => None,
    };

    let runtime = Runtime {
        identity: ServerIdentity::new(InstanceId::new(config.server.instance_id.as_deref())),
        listener: ListenerSettings {
            bind_address,
            max_connections: config.listener.max_connections,
        },
        routes,
        tls,
        timeouts: ServerTimeouts::from_config(&config.timeouts),
        upstream: UpstreamTimeouts::from_config(&config.upstream),
        observability: config.observability.clone(),
    };

    tracing::info!(
        instance_id = %runtime.identity().instance_id,
        routes = runtime.routes().len(),
        tls = runtime.is_tls_mode(),
        "Runtime prepared"
    );

    Ok(runtime)
}

/// Bind, release the boot barrier, and serve until shutdown.
///
/// A bind failure is returned before the barrier is released, which wakes
/// waiters with `None`.
pub async fn serve(
    server: HttpServer,
    boot: BootRelease,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), StartupError> {
    let runtime = server.runtime().clone();
    let listener = Listener::bind(runtime.listener()).await?;

    let interval = runtime.observability().stats_interval_secs;
    if interval > 0 {
        stats::spawn_reporter(
            server.stats(),
            server.tracker(),
            std::time::Duration::from_secs(interval),
            shutdown.resubscribe(),
        );
    }

    boot.release(listener.local_addr());
    server.run(listener, shutdown).await?;
    Ok(())
}
