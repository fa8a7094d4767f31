//! Leaderboard backend entrypoint wiring REST, WebSocket, storage, and cache layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leaderboard_back::{
    cache::CacheStore,
    config::AppConfig,
    dao::storage::{LeaderboardStore, StorageError},
    routes,
    services::{broadcast_service, reconcile, storage_supervisor},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    let cache = build_cache(&config)?;
    let (app_state, updates) = AppState::new(config, cache);

    tokio::spawn(broadcast_service::run(app_state.clone(), updates));
    tokio::spawn(storage_supervisor::run(
        app_state.clone(),
        storage_connector(app_state.config().database_url.clone()),
    ));
    if let Some(interval) = app_state.config().reconcile_interval {
        tokio::spawn(reconcile::run_periodic(
            app_state.clone(),
            interval,
            app_state.config().reconcile_batch_size as i64,
        ));
    }

    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], server_port()));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Connection factory handed to the storage supervisor.
#[cfg(feature = "postgres-store")]
fn storage_connector(
    database_url: String,
) -> impl FnMut() -> futures::future::BoxFuture<'static, Result<Arc<dyn LeaderboardStore>, StorageError>>
+ Send
+ 'static {
    use leaderboard_back::dao::postgres::PgLeaderboardStore;

    move || {
        let url = database_url.clone();
        Box::pin(async move {
            let store = PgLeaderboardStore::connect(&url).await?;
            Ok(Arc::new(store) as Arc<dyn LeaderboardStore>)
        })
    }
}

/// In-process fallback store used when the crate is built without a
/// database backend.
#[cfg(not(feature = "postgres-store"))]
fn storage_connector(
    _database_url: String,
) -> impl FnMut() -> futures::future::BoxFuture<'static, Result<Arc<dyn LeaderboardStore>, StorageError>>
+ Send
+ 'static {
    use leaderboard_back::dao::memory::MemoryStore;

    move || {
        Box::pin(async move { Ok(Arc::new(MemoryStore::new()) as Arc<dyn LeaderboardStore>) })
    }
}

#[cfg(feature = "redis-cache")]
fn build_cache(config: &AppConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    use leaderboard_back::cache::redis::RedisCache;

    let cache = RedisCache::new(
        &config.redis_url,
        &config.redis_key_prefix,
        config.cache_op_timeout,
    )
    .context("building redis cache client")?;
    Ok(Arc::new(cache))
}

#[cfg(not(feature = "redis-cache"))]
fn build_cache(_config: &AppConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    use leaderboard_back::cache::memory::MemoryCache;

    Ok(Arc::new(MemoryCache::new()))
}

/// Listening port from `PORT`, falling back to `SERVER_PORT`, then 8080.
fn server_port() -> u16 {
    env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8080)
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: leaderboard_back::state::SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
