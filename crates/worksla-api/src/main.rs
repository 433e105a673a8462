use std::process::ExitCode;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use worksla_api::config::Config;
use worksla_api::repo::{AssigneeRepo, SettingsRepo, WorkItemRepo};
use worksla_api::state::AppState;
use worksla_api::sync::SyncEngine;
use worksla_api::upstream::UpstreamClient;
use worksla_api::{db, routes};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Fatal error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(Config::from_env()?);
    tracing::info!(addr = %config.listen_addr, "Starting WorkSLA API");

    let pool = db::create_pool(&config.database_url).await?;
    db::init_schema(&pool).await?;
    tracing::info!("Database ready");

    let work_items = WorkItemRepo::new(pool.clone());
    let assignees = AssigneeRepo::new(pool.clone());
    let settings = SettingsRepo::new(pool);

    // Static configuration seeds the client; the settings table overrides it.
    let upstream = Arc::new(UpstreamClient::from_settings(&config, &settings).await?);
    let sync = Arc::new(SyncEngine::new(
        upstream.clone(),
        work_items.clone(),
        config.sync_page_budget,
        config.sync_page_size,
    ));
    tokio::spawn(sync.clone().run_periodic(config.sync_interval));

    let state = AppState {
        config: config.clone(),
        work_items,
        assignees,
        settings,
        upstream,
        sync,
    };

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    tracing::info!("Received shutdown signal");
}
