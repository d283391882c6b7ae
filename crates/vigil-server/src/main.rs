use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration};

use vigil_cache::{Cache, MemoryCache, RedisCache};
use vigil_notify::Notifiers;
use vigil_pipeline::{Pipeline, PipelineDeps};
use vigil_queue::{Broker, MemoryBroker};
use vigil_server::app;
use vigil_server::config::{self, CacheBackend, SeedFile};
use vigil_server::logging;
use vigil_server::seed;
use vigil_server::state::AppState;
use vigil_storage::Store;

/// How often dead-lettered messages are logged and discarded.
const DEAD_LETTER_SWEEP_SECS: u64 = 60;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  vigil-server [config.toml]                     Start the service");
    eprintln!("  vigil-server seed <config.toml> <seed.json>    Create orgs, devices, rules, alarms and users");
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install default CryptoProvider: {e:?}"))?;

    logging::init_tracing()?;

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("seed") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("seed requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("seed requires <seed.json> argument")
            })?;
            run_seed(config_path, seed_path).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

async fn open_store(config: &config::ServerConfig) -> Result<Store> {
    let db_url = config.database.connection_url();
    Ok(Store::new(&db_url, Path::new(&config.database.data_dir)).await?)
}

/// Apply a JSON seed file, skipping rows that already exist.
async fn run_seed(config_path: &str, seed_path: &str) -> Result<()> {
    let config = config::ServerConfig::load(config_path)?;
    let store = open_store(&config).await?;

    let seed_content = std::fs::read_to_string(seed_path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{seed_path}': {e}"))?;
    let seed_file: SeedFile = serde_json::from_str(&seed_content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{seed_path}': {e}"))?;

    let summary = seed::run_seed(&store, &seed_file).await?;
    tracing::info!(
        created = summary.created,
        skipped = summary.skipped,
        seed = %seed_path,
        "Seed complete"
    );
    for org in seed::inventory(&store).await? {
        tracing::info!(
            org_id = %org.org_id,
            name = %org.name,
            devices = org.devices,
            rules = org.rules,
            alarms = org.alarms,
            users = org.users,
            "Org inventory"
        );
    }
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = config::ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        data_dir = %config.database.data_dir,
        db = %config.database.redacted_url(),
        cache = ?config.cache.backend,
        "vigil-server starting"
    );

    let store = open_store(&config).await?;
    let memory_broker = Arc::new(MemoryBroker::new());
    let broker: Arc<dyn Broker> = memory_broker.clone();

    let pipeline_config = config.pipeline.clone();
    let sweep_handle = tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(DEAD_LETTER_SWEEP_SECS));
        loop {
            tick.tick().await;
            memory_broker
                .sweep_dead_letters(&pipeline_config.topics())
                .await;
        }
    });

    let mut purge_handle = None;
    let cache: Arc<dyn Cache> = match config.cache.backend {
        CacheBackend::Memory => {
            let memory = Arc::new(MemoryCache::new());
            let purge_cache = memory.clone();
            purge_handle = Some(tokio::spawn(async move {
                let mut tick = interval(Duration::from_secs(60));
                loop {
                    tick.tick().await;
                    let removed = purge_cache.purge_expired();
                    if removed > 0 {
                        tracing::debug!(removed, "Purged expired cache entries");
                    }
                }
            }));
            memory
        }
        CacheBackend::Redis => {
            let url = config
                .cache
                .redis_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("cache.redis_url is required for the redis backend"))?;
            Arc::new(RedisCache::connect(url).await?)
        }
    };

    let notifiers = Notifiers::from_config(&config.notify)?;

    let pipeline = Pipeline::start(
        &config.pipeline,
        PipelineDeps {
            broker: broker.clone(),
            store: Arc::new(store.clone()),
            cache,
            notifiers,
        },
    )
    .await?;

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let state = AppState::new(store, broker, config);
    let app = app::build_http_app(state);
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;

    tracing::info!(http = %http_addr, "Server started");

    let result = axum::serve(http_listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await;
    if let Err(e) = result {
        tracing::error!(error = %e, "HTTP server error");
    }

    if let Some(h) = purge_handle {
        h.abort();
    }
    sweep_handle.abort();
    pipeline.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}
