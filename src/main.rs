use anyhow::Context;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use exchangedata::config::Config;
use exchangedata::services::bitget_client::BitgetClient;
use exchangedata::services::bootstrap::ExchangerBootstrap;
use exchangedata::services::fleet::FleetCoordinator;
use exchangedata::services::recorder::MarketDataRecorder;
use exchangedata::services::resolver::EntityResolver;
use exchangedata::services::store::SeaOrmStore;
use exchangedata::services::supervisor::signaled;
use exchangedata::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,exchangedata=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;

    // Connect to database
    tracing::info!("Connecting to database...");
    let mut options = ConnectOptions::new(config.database_url.clone());
    options.sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .context("Failed to connect to database")?;

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .context("Failed to run migrations")?;

    let store = Arc::new(SeaOrmStore::new(db.clone()));
    let resolver = EntityResolver::new(store, config.entity_cache_capacity);
    let recorder = Arc::new(MarketDataRecorder::new(resolver.clone()));

    let mut fleet = FleetCoordinator::new(recorder, config.supervisor.clone())
        .with_bootstrap(ExchangerBootstrap::new(resolver));

    for exchange in &config.exchanges {
        match exchange.as_str() {
            "bitget" => {
                let client = BitgetClient::new(
                    config.bitget_ws_url.clone(),
                    config.bitget_rest_url.clone(),
                    config.bitget_symbols.clone(),
                );
                fleet.start(Arc::new(client)).await;
            }
            other => tracing::warn!("No client for exchange '{}', skipping", other),
        }
    }

    let state = AppState {
        db,
        supervisors: fleet.registry(),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.status_bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.status_bind_addr))?;
    tracing::info!("Status server listening on {}", config.status_bind_addr);

    let mut server_shutdown = fleet.shutdown_signal();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { signaled(&mut server_shutdown).await })
            .await
    });

    fleet
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for interrupt: {}", e);
            }
            tracing::info!("Interrupt received");
        })
        .await;

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Status server error: {}", e),
        Err(e) => tracing::error!("Status server task failed: {}", e),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
