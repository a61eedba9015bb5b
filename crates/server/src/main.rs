mod api;
mod router;
mod state;

use std::sync::Arc;

use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    distill_core::config::load_dotenv();
    let config = distill_core::Config::from_env();
    config.log_summary();

    let provider = distill_llm::create_provider(&config.llm, &config.ollama)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(state::AppState { config, provider });
    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
