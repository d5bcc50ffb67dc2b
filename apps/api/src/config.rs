use anyhow::{Context, Result};

use crate::llm_client::{DEFAULT_API_URL, DEFAULT_MODEL};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Optional. Without a key the keyword classifier handles issue detection
    /// and resolution drafting is unavailable.
    pub llm_api_key: Option<String>,
    pub llm_api_url: String,
    pub llm_model: String,
    /// Minimum title similarity (above 0.0, up to 1.0) for a detected issue to be linked
    /// to an existing one instead of creating a new pending issue.
    pub issue_match_threshold: f64,
    pub run_migrations: bool,
    pub cors_allow_origin: Option<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let issue_match_threshold = parse_threshold(optional_env("ISSUE_MATCH_THRESHOLD"))?;

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            llm_api_key: optional_env("LLM_API_KEY"),
            llm_api_url: optional_env("LLM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            llm_model: optional_env("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            issue_match_threshold,
            run_migrations: optional_env("RUN_MIGRATIONS")
                .map(|v| parse_bool(&v))
                .transpose()
                .context("RUN_MIGRATIONS must be true or false")?
                .unwrap_or(true),
            cors_allow_origin: optional_env("CORS_ALLOW_ORIGIN"),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and empty variables are both treated as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("invalid boolean '{other}'"),
    }
}

/// Accepts (0.0, 1.0]; zero would let unrelated titles match.
fn parse_threshold(raw: Option<String>) -> Result<f64> {
    let threshold = raw
        .map(|v| v.trim().parse::<f64>())
        .transpose()
        .context("ISSUE_MATCH_THRESHOLD must be a number")?
        .unwrap_or(0.6);
    if !(threshold > 0.0 && threshold <= 1.0) {
        anyhow::bail!("ISSUE_MATCH_THRESHOLD must be greater than 0.0 and at most 1.0");
    }
    Ok(threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_must_be_positive() {
        assert_eq!(parse_threshold(None).unwrap(), 0.6);
        assert_eq!(parse_threshold(Some("1".to_string())).unwrap(), 1.0);
        assert_eq!(parse_threshold(Some(" 0.45 ".to_string())).unwrap(), 0.45);
        assert!(parse_threshold(Some("0".to_string())).is_err());
        assert!(parse_threshold(Some("0.0".to_string())).is_err());
        assert!(parse_threshold(Some("1.5".to_string())).is_err());
        assert!(parse_threshold(Some("NaN".to_string())).is_err());
        assert!(parse_threshold(Some("high".to_string())).is_err());
    }

    #[test]
    fn test_parse_bool_accepts_common_spellings() {
        assert!(parse_bool("TRUE").unwrap());
        assert!(parse_bool("1").unwrap());
        assert!(!parse_bool("off").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}
