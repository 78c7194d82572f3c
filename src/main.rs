#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # smsgate
//!
//! HTTP gateway in front of an smstools (`smsd`) spool and its cellular modem.
//!
//! Send requests are validated, checked against per-user destination lists
//! and written atomically into smsd's outgoing directory. Health endpoints
//! query the modem over its AT port and check that smsd is running.
//!
//! ## Subcommands
//!
//! - `smsgate serve` (default): run the HTTP server
//!
//! ## API surface
//!
//! | Method | Path                               | Auth | Description                      |
//! |--------|------------------------------------|------|----------------------------------|
//! | GET    | `/api/v1.0/sms`                    | No   | Liveness text                    |
//! | POST   | `/api/v1.0/sms/outgoing`           | Yes  | Send from a JSON body            |
//! | GET    | `/api/v1.0/sms/simple_send`        | Yes  | Send from query params           |
//! | GET    | `/api/v1.0/sms/sent/{message_id}`  | Yes  | Header of a sent message         |
//! | GET    | `/api/v1.0/sms/modem_status`       | Yes  | Signal and registration check    |
//! | GET    | `/api/v1.0/sms/smsd_status`        | Yes  | smsd process check               |
//!
//! Auth is HTTP Basic, or `?username=&password=` for URL-only clients.

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use smsgate::{routes, AppState, Config};

/// HTTP gateway for smsd and its modem.
#[derive(Parser)]
#[command(name = "smsgate", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to TOML config file.
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default when no subcommand given).
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve) | None => run_server(cli.config.as_deref()).await,
    }
}

async fn run_server(config_path: Option<&str>) {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("smsgate: {e}");
            std::process::exit(2);
        }
    };

    // RUST_LOG wins over the configured level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("smsgate v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.server.listen);
    info!(
        "Spool: {} (sent: {})",
        config.spool.outgoing_dir.display(),
        config.spool.sent_dir.display()
    );
    info!("Modem: {}", config.modem.device.display());

    if config.auth.users.is_empty() {
        warn!("No users configured; every authenticated endpoint will return 401");
    }
    if !config.spool.outgoing_dir.is_dir() {
        warn!(
            "Outgoing directory {} does not exist; sends will fail",
            config.spool.outgoing_dir.display()
        );
    }

    let listen = config.server.listen.clone();
    let app = routes::router(AppState::from_config(config));

    let listener = match TcpListener::bind(&listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {listen}: {e}");
            std::process::exit(1);
        }
    };

    info!("Server ready");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {e}");
        std::process::exit(1);
    }

    info!("Goodbye");
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Failed to register SIGTERM: {e}");
                ctrl_c.await.ok();
                info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received SIGINT");
    }
}
