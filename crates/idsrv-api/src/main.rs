//! # idsrv: Binary Entry Point
//!
//! `idsrv serve` starts the lookup server; `idsrv keygen` prints a fresh
//! signing seed for `signing.seed_hex`.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use idsrv_api::bootstrap::bootstrap;
use idsrv_api::config::IdsrvConfig;
use idsrv_crypto::Ed25519KeyPair;

/// Signed identity lookup server.
#[derive(Parser, Debug)]
#[command(name = "idsrv", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve {
        /// YAML configuration file.
        #[arg(long, env = "IDSRV_CONFIG")]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "text")]
        log_format: LogFormat,
    },
    /// Generate an Ed25519 signing seed and print it with its public key.
    Keygen,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, log_format } => {
            init_tracing(log_format);
            serve(config).await
        }
        Command::Keygen => {
            let key = Ed25519KeyPair::generate();
            println!("seed_hex: {}", key.seed_hex());
            println!("public_key: {}", key.public_key().to_base64());
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = IdsrvConfig::load(config_path.as_deref()).map_err(|e| {
        tracing::error!("Configuration failed: {e}");
        e
    })?;

    let state = bootstrap(&config).map_err(|e| {
        tracing::error!("Bootstrap failed: {e}");
        e
    })?;

    let app = idsrv_api::app(state);

    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    tracing::info!("idsrv listening on {}", config.server.bind);

    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("idsrv stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
