use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use mileage_server::config;
use mileage_server::mileage::{
    spawn_accrual_scheduler, HttpUserDirectory, MemoryMileageStore, MileageService,
    PgMileageStore,
};
use mileage_server::routes::api_routes;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

async fn root() -> &'static str {
    "Mileage API"
}

async fn build_service() -> anyhow::Result<MileageService> {
    let service = match config::MILEAGE_STORE.as_str() {
        "memory" => {
            tracing::warn!("using in-memory mileage store; balances are lost on restart");
            let store = Arc::new(MemoryMileageStore::new());
            MileageService::new(store.clone(), store)
        }
        _ => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(config::DATABASE_URL.as_str())
                .await
                .context("connecting to DATABASE_URL")?;
            sqlx::migrate!()
                .run(&pool)
                .await
                .context("running database migrations")?;
            let store = Arc::new(PgMileageStore::new(pool));
            MileageService::new(store.clone(), store)
        }
    };

    let service = service.with_batch_size(*config::MILEAGE_ACCRUAL_BATCH_SIZE);
    match config::USER_SERVICE_URL.as_deref() {
        Some(base_url) => {
            let directory = HttpUserDirectory::new(base_url, *config::USER_SERVICE_TIMEOUT_MS)?;
            Ok(service.with_user_directory(Arc::new(directory)))
        }
        None => {
            tracing::info!("USER_SERVICE_URL not set; charge request listings are not enriched");
            Ok(service)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let service = build_service().await?;
    if *config::MILEAGE_ACCRUAL_SCHEDULER_ENABLED {
        spawn_accrual_scheduler(service.clone());
    }

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = Router::new()
        .route("/", get(root))
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .merge(api_routes())
        .layer(prometheus_layer)
        .layer(Extension(service));

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .context("parsing bind address")?;
    tracing::info!(%addr, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
