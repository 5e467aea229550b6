use std::sync::Arc;

use db::DBService;
use llm::provider::OpenAiProvider;
use server::config::ServerConfig;
use server::{AppState, router};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let db = DBService::new(&config.database_url).await?;
    let provider = Arc::new(OpenAiProvider::new(config.provider.clone()));
    let state = AppState::new(db, provider);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
