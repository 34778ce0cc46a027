use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use chairside::build_router;
use chairside::config::AppConfig;
use chairside::db;
use chairside::services::ai::groq::GroqProvider;
use chairside::services::ai::ollama::OllamaProvider;
use chairside::services::ai::LlmProvider;
use chairside::services::directory::ProviderDirectory;
use chairside::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    if config.seed_demo {
        db::seed::seed_demo_data(&conn)?;
    }

    let llm: Box<dyn LlmProvider> = match config.llm_provider.as_str() {
        "groq" => {
            anyhow::ensure!(
                !config.groq_api_key.is_empty(),
                "GROQ_API_KEY must be set when LLM_PROVIDER=groq"
            );
            tracing::info!("using Groq LLM provider (model: {})", config.groq_model);
            Box::new(GroqProvider::new(
                config.groq_api_key.clone(),
                config.groq_model.clone(),
                config.llm_timeout_secs,
            ))
        }
        _ => {
            tracing::info!("using Ollama LLM provider (url: {})", config.ollama_url);
            Box::new(OllamaProvider::new(
                config.ollama_url.clone(),
                config.ollama_model.clone(),
                config.llm_timeout_secs,
            ))
        }
    };

    let db = Arc::new(Mutex::new(conn));
    let directory = ProviderDirectory::new(
        Arc::clone(&db),
        Duration::from_secs(config.provider_cache_ttl_secs),
    );

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        llm,
        directory,
    });

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
