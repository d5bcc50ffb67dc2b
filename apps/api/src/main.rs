mod config;
mod db;
mod employees;
mod errors;
mod feedback;
mod issues;
mod llm_client;
mod metrics;
mod models;
mod routes;
mod state;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::issues::classifier::{IssueClassifier, KeywordIssueClassifier, LlmIssueClassifier};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http=info",
                env!("CARGO_CRATE_NAME"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Triage API v{}", env!("CARGO_PKG_VERSION"));

    let db = create_pool(&config.database_url).await?;
    if config.run_migrations {
        run_migrations(&db).await?;
    }

    // Without a key, detection runs on keyword rules and resolution drafting is off
    let llm = match &config.llm_api_key {
        Some(key) => {
            let client = LlmClient::new(key.clone(), &config.llm_api_url, config.llm_model.clone())?;
            info!("LLM client initialized (model: {})", client.model());
            Some(client)
        }
        None => {
            warn!("LLM_API_KEY not set; using keyword issue classification");
            None
        }
    };
    let classifier: Arc<dyn IssueClassifier> = match &llm {
        Some(client) => Arc::new(LlmIssueClassifier::new(client.clone())),
        None => Arc::new(KeywordIssueClassifier),
    };

    let cors = match &config.cors_allow_origin {
        Some(origin) => {
            let origin: HeaderValue = origin
                .parse()
                .with_context(|| format!("CORS_ALLOW_ORIGIN '{origin}' is not a valid origin"))?;
            CorsLayer::permissive().allow_origin(origin)
        }
        None => CorsLayer::permissive(),
    };

    let state = AppState {
        db,
        llm,
        config: config.clone(),
        classifier,
    };

    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
