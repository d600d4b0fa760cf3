//! Orgolink Auth API server binary.
//!
//! Serves the token engine over HTTP, backed by PostgreSQL (or process
//! memory with `--memory`) and an in-process or Redis token cache.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use orgo_core::auth::cache::{MemoryTokenCache, TokenCache};
use orgo_core::auth::session::DEFAULT_RETENTION_DAYS;
use orgo_core::clock::{Clock, SystemClock};
use orgo_core::engine::{AuthEngine, Backends};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "orgo_api_server", about = "Orgolink Auth API server")]
struct Args {
    /// Port to listen on. Overrides the port of `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Redis URL for the token cache (requires the `redis` feature).
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Keep all state in process memory instead of PostgreSQL.
    #[arg(long, default_value_t = false)]
    memory: bool,

    /// Seconds between sweeps of long-expired session tokens.
    #[arg(long, default_value_t = 3600)]
    purge_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,orgo_api=debug,orgo_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = orgo_api::config::ApiConfig::from_env()?;
    if let Some(port) = args.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "127.0.0.1".into());
        config.bind_addr = format!("{host}:{port}");
    }
    if let Some(url) = args.database_url {
        config.pg_connection_url = url;
    }
    if args.redis_url.is_some() {
        config.redis_url = args.redis_url;
    }
    info!(bind_addr = %config.bind_addr, memory = args.memory, settings = ?config.auth, "starting orgo_api_server");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (backends, pool) = if args.memory {
        warn!("in-memory mode: all state is lost on exit");
        (Backends::in_memory(clock.clone()), None)
    } else {
        info!(max_connections = args.max_connections, "configuring connection pool");
        let pool = PgPoolOptions::new()
            .max_connections(args.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.pg_connection_url)
            .await?;

        info!("running database migrations");
        orgo_api::migrate(&pool).await?;

        let cache = token_cache(config.redis_url.as_deref(), clock.clone()).await?;
        (Backends::postgres(pool.clone(), cache), Some(pool))
    };

    let engine = Arc::new(AuthEngine::new(&config.auth, backends, clock));
    let state = orgo_api::AppState {
        engine: engine.clone(),
        config: config.clone(),
        pool,
    };
    let app = orgo_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;

    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
            }
            shutdown.cancel();
        }
    });

    let purge_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        let engine = engine.clone();
        let period = Duration::from_secs(args.purge_interval_secs.max(1));
        async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let retention = chrono::Duration::days(DEFAULT_RETENTION_DAYS);
                        if let Err(e) = engine.sessions().purge_expired(retention).await {
                            warn!(error = %e, "session token purge failed");
                        }
                    }
                }
            }
        }
    });

    info!(addr = %local_addr, "REST API listening");

    let api_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;

    shutdown.cancel();
    let _ = purge_handle.await;

    api_result?;

    Ok(())
}

/// Pick the session token cache: Redis when configured and compiled in,
/// otherwise an in-process map.
async fn token_cache(
    redis_url: Option<&str>,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn TokenCache>, Box<dyn std::error::Error>> {
    match redis_url {
        #[cfg(feature = "redis")]
        Some(url) => {
            info!("using Redis token cache");
            let cache = orgo_core::auth::cache::RedisTokenCache::connect(url).await?;
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            warn!("REDIS_URL set but built without the `redis` feature; using in-process cache");
            Ok(Arc::new(MemoryTokenCache::new(clock)))
        }
        None => Ok(Arc::new(MemoryTokenCache::new(clock))),
    }
}
