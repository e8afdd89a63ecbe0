//! Race Timer Back binary entrypoint wiring the race store, REST, WebSocket and SSE layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use race_timer_back::{
    config::AppConfig,
    dao::race_store::{FileRaceStore, MemoryRaceStore, RaceStore},
    routes,
    services::race_service,
    state::{AppState, SharedState},
};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_RACES_DIR: &str = "races";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = open_store().await?;
    let app_state = AppState::new(config, store);

    // Nothing may still be running from a previous process.
    race_service::recover_on_startup(&app_state)
        .await
        .context("recovering races at startup")?;

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the race store from `RACE_STORE` (`file` by default, or `memory`).
async fn open_store() -> anyhow::Result<Arc<dyn RaceStore>> {
    let kind = env::var("RACE_STORE").unwrap_or_else(|_| "file".into());
    match kind.as_str() {
        "memory" => {
            warn!("using in-memory race store; races are lost on restart");
            Ok(Arc::new(MemoryRaceStore::new()))
        }
        other => {
            if other != "file" {
                warn!(store = other, "unknown RACE_STORE value; using the file store");
            }
            let dir = env::var("RACES_DIR").unwrap_or_else(|_| DEFAULT_RACES_DIR.into());
            let store = FileRaceStore::open(&dir)
                .await
                .with_context(|| format!("opening race directory `{dir}`"))?;
            info!(dir = %store.root().display(), "using file race store");
            Ok(Arc::new(store))
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
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
