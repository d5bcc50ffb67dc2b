use std::sync::Arc;

use sqlx::MySqlPool;

use crate::config::Config;
use crate::issues::classifier::IssueClassifier;
use crate::llm_client::LlmClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: MySqlPool,
    /// `None` when no LLM_API_KEY is configured.
    pub llm: Option<LlmClient>,
    pub config: Config,
    /// Pluggable issue classifier. LLM-backed when a key is configured, keyword rules otherwise.
    pub classifier: Arc<dyn IssueClassifier>,
}
