use rag_orchestrator::{
    agent::build_orchestrator, api::start_server, config::AppConfig,
    history::build_history_store,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    info!("RAG Orchestrator - API Server");
    info!(
        provider = ?config.llm_provider,
        corpus = %config.corpus_dir.display(),
        port = config.port,
        "Configuration loaded"
    );

    let orchestrator = Arc::new(build_orchestrator(&config).await?);
    let history = build_history_store(config.database_url.as_deref());

    info!("Orchestrator initialized, starting API server");

    start_server(orchestrator, history, config.port).await?;

    Ok(())
}
