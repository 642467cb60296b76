//! Quiz lobby backend entrypoint wiring the WebSocket protocol, HTTP queries and the durable mirror.

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, bail};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_lobby_back::{
    config::AppConfig,
    dao::{
        mirror_store::{InMemoryMirrorStore, MirrorStore},
        storage::StorageError,
    },
    routes,
    services::{lobby_reaper, storage_supervisor},
    state::{AppState, SharedState},
};

const DEFAULT_PORT: u16 = 8080;
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "mongo".into());
    spawn_storage_supervisor(app_state.clone(), &backend)?;
    tokio::spawn(lobby_reaper::run(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, backend, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    if tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, app_state.mirror().flush())
        .await
        .is_err()
    {
        warn!("pending mirror writes not flushed before shutdown");
    }
    info!("server stopped");

    Ok(())
}

/// Start the background task that connects to the selected mirror backend.
fn spawn_storage_supervisor(state: SharedState, backend: &str) -> anyhow::Result<()> {
    match backend {
        "mongo" => {
            tokio::spawn(storage_supervisor::run(state, connect_mongo));
        }
        "couch" => {
            tokio::spawn(storage_supervisor::run(state, connect_couch));
        }
        "memory" => {
            tokio::spawn(storage_supervisor::run(state, connect_memory));
        }
        other => bail!("unknown STORAGE_BACKEND `{other}` (expected mongo, couch or memory)"),
    }
    Ok(())
}

#[cfg(feature = "mongo-store")]
async fn connect_mongo() -> Result<Arc<dyn MirrorStore>, StorageError> {
    use quiz_lobby_back::dao::mirror_store::mongodb::{MongoConfig, MongoMirrorStore};

    let config = MongoConfig::from_env().await?;
    let store = MongoMirrorStore::connect(config).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "mongo-store"))]
async fn connect_mongo() -> Result<Arc<dyn MirrorStore>, StorageError> {
    Err(StorageError::BackendDisabled {
        backend: "mongo-store",
    })
}

#[cfg(feature = "couch-store")]
async fn connect_couch() -> Result<Arc<dyn MirrorStore>, StorageError> {
    use quiz_lobby_back::dao::mirror_store::couchdb::{CouchConfig, CouchMirrorStore};

    let config = CouchConfig::from_env()?;
    let store = CouchMirrorStore::connect(config).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "couch-store"))]
async fn connect_couch() -> Result<Arc<dyn MirrorStore>, StorageError> {
    Err(StorageError::BackendDisabled {
        backend: "couch-store",
    })
}

async fn connect_memory() -> Result<Arc<dyn MirrorStore>, StorageError> {
    Ok(Arc::new(InMemoryMirrorStore::new()))
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
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

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
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
