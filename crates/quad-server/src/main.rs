//! Admin panel backend server
//!
//! Usage:
//!   # Control plane in PostgreSQL (default)
//!   quad-server --config config.toml
//!
//!   # Process-local control plane, nothing persisted
//!   quad-server --in-memory --port 3000

use anyhow::Context;
use clap::Parser;
use quad_core::{CredentialCipher, QuadConfig};
use quad_db::{ExecutorProvider, PoolRegistry, PoolSettings};
use quad_server::{AppState, create_router};
use quad_store::{AdminStore, InMemoryStore, PostgresStore};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "quad-server", version, about = "PostgreSQL admin panel backend")]
struct Cli {
    /// Path to config.toml (searched upwards from the working directory by default)
    #[arg(short, long, env = "QUAD_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Keep connection profiles and saved items in memory
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = QuadConfig::load_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    quad_telemetry::init_telemetry(&config.observability)?;

    let cipher = Arc::new(CredentialCipher::new(config.encryption_key()?)?);
    let registry = PoolRegistry::new(PoolSettings::targets(&config.pools));

    let (store, registry) = if cli.in_memory {
        tracing::warn!("Using in-memory control plane; nothing will be persisted");
        let store: Arc<dyn AdminStore> = Arc::new(InMemoryStore::new(cipher));
        (store, registry)
    } else {
        let admin = &config.admin_db;
        tracing::info!(
            host = %admin.host,
            port = admin.port,
            database = %admin.database,
            "Connecting to control-plane database"
        );
        let pool = PoolSettings::admin(&config.pools)
            .build_lazy(PostgresStore::connect_options(admin));
        let store: Arc<dyn AdminStore> = Arc::new(
            PostgresStore::new(pool.clone(), cipher)
                .await
                .context("Failed to initialise control-plane store")?,
        );
        (store, registry.with_admin_pool(pool))
    };

    let pools: Arc<dyn ExecutorProvider> = Arc::new(registry);
    let app = create_router(AppState {
        store,
        pools: pools.clone(),
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .context("Server failed")?;

    tracing::info!("Closing connection pools");
    pools.close_all().await;

    tracing::info!("Goodbye!");
    Ok(())
}

/// Wait for shutdown signals (Ctrl+C or SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}
