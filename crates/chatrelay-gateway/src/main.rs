use std::net::SocketAddr;
use std::sync::Arc;

use chatrelay_agent::BackendRegistry;
use chatrelay_core::config::StoreConfig;
use chatrelay_core::RelayConfig;
use chatrelay_store::{KeyValueStore, RedisStore, SqliteStore};
use clap::Parser;
use tracing::{error, info, warn};

mod app;
mod http;

#[derive(Parser)]
#[command(name = "chatrelay-gateway", version, about = "Webhook chat relay to LLM backends")]
struct Cli {
    /// Config file. Defaults to ~/.chatrelay/chatrelay.toml.
    #[arg(long, env = "CHATRELAY_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "chatrelay_gateway=info,chatrelay_agent=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = RelayConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        RelayConfig::default()
    });

    let store = Arc::new(build_store(&config.store).await);
    let backends = Arc::new(BackendRegistry::from_config(&config.providers)?);
    info!(
        backends = ?backends.configured(),
        default = %config.relay.default_backend,
        "backends loaded"
    );
    if let Err(msg) = backends.check(config.relay.default_backend) {
        warn!(reason = %msg, "default backend is not configured; every conversation will get this message");
    }

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let sweep_every = config.store.sweep_interval();

    let state = match app::AppState::new(config, store, backends) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!(code = e.code(), error = %e, "relay setup failed");
            return Err(e.into());
        }
    };
    let router = app::build_router(Arc::clone(&state));

    // expire fast-path entries (and SQLite rows) in the background
    let sweeper_store = Arc::clone(&state.host.store);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(sweep_every);
        loop {
            tick.tick().await;
            let removed = sweeper_store.purge_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "expired entries purged");
            }
        }
    });

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("chatrelay gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // let queued history writes land before exiting
    state.relay.writer().wait_idle().await;
    info!("shutdown complete");
    Ok(())
}

/// Pick the remote store: Redis, else SQLite, else in-process only.
///
/// A remote that cannot be opened is logged once and the relay runs without
/// durability rather than refusing to start.
async fn build_store(cfg: &StoreConfig) -> KeyValueStore {
    if let Some(url) = cfg.redis_url.as_deref() {
        match RedisStore::connect(url).await {
            Ok(redis) => {
                info!("using redis store");
                return KeyValueStore::with_remote(Arc::new(redis), cfg.default_ttl(), cfg.mirror_ttl());
            }
            Err(e) => warn!(error = %e, "redis unavailable, falling back"),
        }
    }

    if let Some(path) = cfg.sqlite_path.as_deref() {
        ensure_parent_dir(path);
        match SqliteStore::open(path) {
            Ok(sqlite) => {
                info!(path = %path, "using sqlite store");
                return KeyValueStore::with_remote(Arc::new(sqlite), cfg.default_ttl(), cfg.mirror_ttl());
            }
            Err(e) => warn!(path = %path, error = %e, "sqlite store unavailable, falling back"),
        }
    }

    warn!("no durable store configured, state lives in this process only");
    KeyValueStore::in_memory(cfg.default_ttl())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
