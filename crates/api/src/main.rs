use std::sync::Arc;

use stockroom_api::app::{build_app, AppServices};
use stockroom_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockroom_observability::init();

    let config = AppConfig::from_env()?;
    let services = AppServices::from_config(&config).await?;
    let app = build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;

    tracing::info!(
        max_commit_attempts = config.max_commit_attempts,
        "listening on {}",
        listener.local_addr()?
    );

    axum::serve(listener, app).await?;
    Ok(())
}
