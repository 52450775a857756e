//! Langar Seva Back binary entrypoint wiring REST, WebSocket, SSE and the user store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use langar_seva_back::{
    config::AppConfig,
    dao::{
        storage::StorageError,
        user_store::{MemoryUserStore, UserStore},
    },
    identity::AnonymousIdentityProvider,
    routes,
    services::{
        identity_service, maintenance_service, scoreboard_service, storage_supervisor,
    },
    state::{AppState, SharedState},
};

const STORE_BACKEND_ENV: &str = "STORE_BACKEND";

/// User store selected through `STORE_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreBackend {
    Memory,
    #[cfg(feature = "mongo-store")]
    Mongo,
    #[cfg(feature = "couch-store")]
    Couch,
}

impl StoreBackend {
    fn from_env() -> anyhow::Result<Self> {
        let raw = env::var(STORE_BACKEND_ENV).unwrap_or_default();
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "memory" => Ok(Self::Memory),
            #[cfg(feature = "mongo-store")]
            "mongo" | "mongodb" => Ok(Self::Mongo),
            #[cfg(feature = "couch-store")]
            "couch" | "couchdb" => Ok(Self::Couch),
            other => bail!("unsupported {STORE_BACKEND_ENV} `{other}` (is its cargo feature enabled?)"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let backend = StoreBackend::from_env()?;
    let app_state = AppState::new(config, Arc::new(AnonymousIdentityProvider::new()));

    tokio::spawn(storage_supervisor::forward_status(app_state.clone()));
    spawn_store_supervisor(app_state.clone(), backend);
    tokio::spawn(scoreboard_service::run(app_state.clone()));
    tokio::spawn(maintenance_service::run_janitor(app_state.clone()));
    tokio::spawn(identity_service::forward_events(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, ?backend, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Connect the selected backend in the background; the app stays degraded until it is up.
fn spawn_store_supervisor(state: SharedState, backend: StoreBackend) {
    match backend {
        StoreBackend::Memory => {
            let store = MemoryUserStore::new();
            tokio::spawn(storage_supervisor::run(state, move || {
                let store: Arc<dyn UserStore> = Arc::new(store.clone());
                async move { Ok::<_, StorageError>(store) }
            }));
        }
        #[cfg(feature = "mongo-store")]
        StoreBackend::Mongo => {
            use langar_seva_back::dao::user_store::mongodb::{MongoConfig, MongoUserStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoUserStore::connect(config).await?;
                Ok::<Arc<dyn UserStore>, StorageError>(Arc::new(store))
            }));
        }
        #[cfg(feature = "couch-store")]
        StoreBackend::Couch => {
            use langar_seva_back::dao::user_store::couchdb::{CouchConfig, CouchUserStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchUserStore::connect(config).await?;
                Ok::<Arc<dyn UserStore>, StorageError>(Arc::new(store))
            }));
        }
    }
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

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
