use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trialmatch_core::matching::{oracle_from_config, CacheStore, SemanticError};
use trialmatch_core::{
    load_config, validate_config, Config, SqliteCacheStore, SqliteTermStore, TermStore,
};
use trialmatch_server::api::create_router;
use trialmatch_server::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let json = std::env::var("TRIALMATCH_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

fn config_path() -> PathBuf {
    std::env::var_os("TRIALMATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Short SHA-256 of the effective configuration, logged so deployments can be told apart.
fn config_fingerprint(config: &Config) -> Result<String> {
    let canonical = serde_json::to_vec(config).context("Failed to serialize configuration")?;
    let digest = Sha256::digest(&canonical);
    Ok(format!("{:x}", digest)[..16].to_string())
}

/// Open the stores and the oracle described by `config`.
fn build_state(config: &Config) -> Result<AppState> {
    let db_path = &config.database.path;
    let term_store: Arc<dyn TermStore> = Arc::new(
        SqliteTermStore::new(db_path)
            .with_context(|| format!("Failed to open term store at {:?}", db_path))?,
    );

    let llm = config.llm.clone().unwrap_or_default();
    let mut state = AppState::new(config.clone(), term_store);

    if llm.persist_to_storage {
        let store: Arc<dyn CacheStore> = Arc::new(
            SqliteCacheStore::new(db_path).context("Failed to open semantic cache store")?,
        );
        info!(path = ?db_path, "Semantic verdicts persist to the database");
        state = state.with_cache_store(store);
    }

    match oracle_from_config(&llm) {
        Ok(oracle) => {
            info!(
                provider = oracle.provider(),
                model = oracle.model(),
                "Semantic oracle ready"
            );
            state = state.with_oracle(oracle);
        }
        Err(SemanticError::Authentication(reason)) if config.matching.semantic_enabled => {
            warn!(
                %reason,
                "No oracle credentials; match requests will be rejected until semantic matching is disabled or a key is set"
            );
        }
        Err(SemanticError::Authentication(_)) => info!("Lexical matching only"),
        Err(e) => return Err(e).context("Failed to create semantic oracle"),
    }

    Ok(state)
}

async fn run() -> Result<()> {
    init_logging();

    let path = config_path();
    info!(path = ?path, "Loading configuration");
    let config =
        load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))?;
    validate_config(&config).context("Configuration validation failed")?;
    info!(
        version = VERSION,
        config_hash = %config_fingerprint(&config)?,
        database = ?config.database.path,
        "Configuration loaded"
    );

    let app = create_router(Arc::new(build_state(&config)?));

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
}
