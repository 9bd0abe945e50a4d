//! Contact Manager server binary.
//!
//! Configuration comes from the environment; see [`contact_manager::config`].

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use contact_manager::activity::ActivityLog;
use contact_manager::api::{AppState, router};
use contact_manager::config::Config;
use contact_manager::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with environment filter
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("contact_manager=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;

    info!(
        port = config.port,
        db_url = %config.database_url,
        environment = config.environment.as_str(),
        "Starting contact manager"
    );

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let activity = ActivityLog::spawn(storage.clone());
    let state = AppState::new(storage.clone(), activity.clone());
    let app = router(state, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Contact manager is listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Persist whatever the handlers published before the listener closed.
    activity.flush().await;
    storage.close().await;
    info!("Shut down cleanly");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
