//! Portcullis reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::listener ──▶ net::tls (optional) ──▶ http::server
//!                                                              │
//!                                                              ▼
//!                                                       http::dispatch
//!                                                   ┌──────────┼──────────┐
//!                                                   ▼          ▼          ▼
//!                                              routing    http::about  http::upstream ──▶ Upstream
//!                                                                          │
//!     Client ◀── security::headers ◀── http::response ◀────────────────────┘
//!
//!     Cross-cutting: config, lifecycle (boot barrier, shutdown), observability, resilience
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use portcullis::config::load_config;
use portcullis::http::HttpServer;
use portcullis::lifecycle::{self, Shutdown};
use portcullis::observability::{logging, metrics};
use portcullis::routing::ResourceKind;
use portcullis::{Runtime, StartupError};

#[derive(Parser)]
#[command(name = "portcullis")]
#[command(about = "TLS-terminating HTTP reverse proxy", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "portcullis.toml")]
    config: PathBuf,

    /// Validate the configuration, print the route table and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("portcullis: {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = %cli.config.display(), "portcullis starting");

    match run(&config, cli.check).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Fatal startup error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &portcullis::ProxyConfig, check_only: bool) -> Result<(), StartupError> {
    let runtime = lifecycle::prepare(config)?;

    if check_only {
        print_routes(&runtime);
        return Ok(());
    }

    if runtime.observability().metrics_enabled {
        match runtime.observability().metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %runtime.observability().metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let (release, _waiter) = lifecycle::barrier();
    let server = HttpServer::new(runtime);
    lifecycle::serve(server, release, shutdown.subscribe()).await
}

fn print_routes(runtime: &Runtime) {
    println!("instance {}", runtime.identity().instance_id);
    println!("tls      {}", runtime.is_tls_mode());
    for route in runtime.routes().routes() {
        let target = match (route.kind(), route.resolve()) {
            (ResourceKind::About, _) => "about".to_string(),
            (ResourceKind::Proxy(_), Ok(binding)) => format!("{} [{}]", binding.upstream, binding.label),
            (ResourceKind::Proxy(name), Err(_)) => format!("{} (unmapped, 503)", name),
        };
        println!("{:<24} -> {}", route.path(), target);
    }
}
