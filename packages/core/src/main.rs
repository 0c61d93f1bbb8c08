use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;

use travel_time_monitor::api::{self, AppState};
use travel_time_monitor::cli::Cli;
use travel_time_monitor::config::Config;
use travel_time_monitor::db;
use travel_time_monitor::error::AppError;
use travel_time_monitor::logging::init_logging;
use travel_time_monitor::metrics::AppMetrics;
use travel_time_monitor::monitor::{RouteChecker, RouteMonitor, TravelTimeProvider};
use travel_time_monitor::repository::RouteRepository;
use travel_time_monitor::scheduler::RouteScheduler;
use travel_time_monitor::services::distance_matrix::DistanceMatrixClient;
use travel_time_monitor::store::RouteStore;

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    if let Err(err) = run().await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = Config::from_env()
        .and_then(|config| config.apply_cli(&cli))
        .map_err(AppError::Config)?;

    tracing::info!("Service starting with config: {:?}", config);

    let pool = db::create_pool(&config.database_url).await?;
    let store: Arc<dyn RouteStore> = Arc::new(RouteRepository::new(pool));
    let provider = Arc::new(DistanceMatrixClient::new(config.distance_matrix_url.clone()));
    tracing::info!(
        provider = provider.provider_name(),
        base_url = provider.base_url(),
        "Travel time provider configured"
    );
    let metrics = Arc::new(AppMetrics::new()?);

    let checker = Arc::new(
        RouteChecker::new(store.clone(), provider)
            .with_api_key_override(config.api_key.clone())
            .with_metrics(metrics.clone()),
    );
    let scheduler = Arc::new(
        RouteScheduler::new(store.clone(), checker.clone()).with_metrics(metrics.clone()),
    );
    scheduler.start().await?;

    let monitor = RouteMonitor::new(store, checker, scheduler.clone());
    let app = api::create_router(AppState::new(monitor, metrics));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
