use std::sync::Arc;

use fleetdesk_api::app::{self, services::seed_dev_data, AppServices};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fleetdesk_observability::init();

    let services: Arc<AppServices> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await?;
            tracing::info!("using postgres store");
            AppServices::postgres(pool)
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using volatile in-memory store");
            let (services, store) = AppServices::in_memory();
            seed_dev_data(&store);
            services
        }
    };

    let app = app::build_app(services);

    let addr = std::env::var("FLEETDESK_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
