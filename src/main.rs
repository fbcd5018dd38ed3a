//! giftcart-catalog - catalog query service for the Giftcart storefront

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use giftcart_catalog::api::{self, AppState};
use giftcart_catalog::catalog::CatalogService;
use giftcart_catalog::config::Config;
use giftcart_catalog::store::postgres::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = PgStore::new(pool).with_poll_interval(config.watch_poll_interval);
    let catalog = Arc::new(CatalogService::new(Arc::new(store)));
    let app = api::router(AppState { catalog });

    tracing::info!("🚀 giftcart-catalog listening on 0.0.0.0:{}", config.port);
    axum::serve(
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?,
        app,
    )
    .await?;
    Ok(())
}
