//! soapkit sample server.
//!
//! Run with: `soapkit-server --sample person --config service.yaml`
//!
//! Serves one of the bundled sample services over HTTP. `GET <path>?wsdl`
//! returns the WSDL document and `POST <path>` dispatches a SOAP request.

use anyhow::{Context, Result};
use clap::Parser;
use soapkit::samples::{self, SampleService};
use soapkit::{transport, Dispatcher, ServiceConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// SOAP 1.1 sample server.
///
/// Builds the selected sample service, validates its types and
/// operations, and serves it until interrupted.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sample service to serve (hello, person, orders, calculator)
    #[arg(short, long, default_value = "hello")]
    sample: SampleService,

    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting soapkit server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            info!("Config file: {}", path.display());
            ServiceConfig::load(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?
        }
        None => {
            info!("No config file given, using defaults");
            ServiceConfig::default()
        }
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }

    let service = samples::build(args.sample, &config)
        .with_context(|| format!("Failed to build sample service '{}'", args.sample))?;
    let dispatcher = Arc::new(Dispatcher::new(service));

    let app = transport::router(Arc::clone(&dispatcher), &config.server.path);
    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen))?;

    info!(
        sample = %args.sample,
        service = %dispatcher.description().name,
        listen = %config.server.listen,
        path = %config.server.path,
        max_body_size = config.settings.max_body_size,
        "Server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    let metrics = dispatcher.metrics();
    info!(
        requests = metrics.requests_processed,
        faults = metrics.faults_returned,
        wsdl = metrics.wsdl_served,
        "soapkit server stopped"
    );
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server");
}
