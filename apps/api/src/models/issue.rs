use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

crate::string_enum!(Severity {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

crate::string_enum!(IssueStatus {
    Open => "open",
    InProgress => "in_progress",
    Resolved => "resolved",
});

crate::string_enum!(DetectionMethod {
    Llm => "llm",
    Keyword => "keyword",
    Manual => "manual",
});

crate::string_enum!(ResolutionSource {
    Llm => "llm",
    Template => "template",
    Manual => "manual",
});

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IssueRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub service_type: String,
    pub severity: String,
    pub status: String,
    pub resolution: Option<String>,
    pub feedback_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingIssueRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub service_type: String,
    pub severity: String,
    pub detection_method: String,
    pub feedback_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingResolutionRow {
    pub id: i64,
    pub pending_issue_id: i64,
    pub resolution_text: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RejectedIssueRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub service_type: String,
    pub severity: String,
    pub reason: Option<String>,
    pub feedback_count: i32,
    pub rejected_at: DateTime<Utc>,
}
