//! Gantry trust daemon.
//!
//! Loads the trust policy, builds the engine, runs the periodic
//! reconciliation task and a small health/stats listener, and shuts down
//! cleanly on Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

use gantry_gate::{Reconciler, TrustEngine};
use gantry_trust::PolicyHandle;

/// Gantry reader-trust daemon.
///
/// Authorizes RFID toll events, scores reader behavior, and runs the
/// autonomous quarantine and restoration loop.
#[derive(Parser, Debug)]
#[command(name = "gantry-node")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the trust policy file.
    #[arg(short, long, env = "GANTRY_POLICY", default_value = "config/trust_policy.json")]
    policy: PathBuf,

    /// Reconciliation interval in seconds (0 = take it from the policy).
    #[arg(long, env = "GANTRY_RECONCILE_INTERVAL", default_value = "0")]
    reconcile_interval_secs: u64,

    /// Health/stats listener port.
    #[arg(long, env = "GANTRY_HEALTH_PORT", default_value = "8080")]
    health_port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "GANTRY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format (plain, json).
    #[arg(long, env = "GANTRY_LOG_FORMAT", default_value = "plain")]
    log_format: String,
}

fn setup_logging(log_level: &str, log_format: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    match log_format.to_lowercase().as_str() {
        "json" => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("failed to set subscriber")?;
        }
        _ => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_target(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("failed to set subscriber")?;
        }
    }

    Ok(())
}

/// Serve `/health` and `/stats` over a bare TCP listener.
async fn run_health_server(engine: Arc<TrustEngine>, port: u16) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(port, "health listener ready");

    loop {
        let (mut socket, _) = listener.accept().await?;
        let engine = Arc::clone(&engine);

        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let Ok(n) = socket.read(&mut buf).await else {
                return;
            };
            if n == 0 {
                return;
            }
            let request = String::from_utf8_lossy(&buf[..n]);
            let (status, body) = if request.contains("GET /stats") {
                match serde_json::to_string(&engine.stats()) {
                    Ok(json) => ("200 OK", json),
                    Err(_) => ("500 Internal Server Error", String::new()),
                }
            } else if request.contains("GET /health") || request.contains("GET / ") {
                ("200 OK", r#"{"status":"ok"}"#.to_string())
            } else {
                ("404 Not Found", String::new())
            };
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level, &args.log_format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        policy = %args.policy.display(),
        "starting gantry-node"
    );

    // A missing or invalid policy is fatal: the system must not default
    // silently on security thresholds.
    let policy = PolicyHandle::load(&args.policy)
        .with_context(|| format!("cannot load trust policy from {}", args.policy.display()))?;

    let interval_secs = if args.reconcile_interval_secs > 0 {
        args.reconcile_interval_secs
    } else {
        policy.snapshot().reconcile_interval_secs
    };

    let engine = Arc::new(TrustEngine::new(policy));
    let reconciler = Reconciler::start(
        Arc::clone(&engine),
        Duration::from_secs(interval_secs),
    );

    let health_engine = Arc::clone(&engine);
    let health_port = args.health_port;
    tokio::spawn(async move {
        if let Err(err) = run_health_server(health_engine, health_port).await {
            warn!(error = %err, "health listener error");
        }
    });

    info!(
        reconcile_interval_secs = interval_secs,
        health_port = args.health_port,
        "gantry-node ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    reconciler.stop().await;
    info!("gantry-node stopped");
    Ok(())
}
