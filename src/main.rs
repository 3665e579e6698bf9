use std::{net::SocketAddr, sync::Arc};
use tasbeeh_counter::{
    remote::{RemoteAdapter, RestRemote},
    router,
    storage::{FileStore, LocalStore},
    AppState, Config, SessionController,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env();
    let store = FileStore::open(&config.data_path)?;
    info!("local data at {}", store.path().display());
    let local = LocalStore::new(Arc::new(store));

    let remote = match &config.remote {
        Some(remote) => {
            let client = RestRemote::new(&remote.url, remote.api_key.clone())?
                .with_access_token(config.identity.access_token().map(str::to_string));
            info!("mirroring to {}", remote.url);
            Some(RemoteAdapter::new(Arc::new(client)))
        }
        None => None,
    };

    let mut controller = SessionController::new(local, remote);
    controller.initialize(config.identity.clone()).await?;
    let state = AppState::new(controller);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.controller.lock().await.flush_remote().await;
    info!("pending remote writes flushed");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}
