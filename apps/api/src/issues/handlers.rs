//! Axum route handlers for issues, pending issues and rejected issues.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppJson};
use crate::feedback::validation::parse_field;
use crate::issues::repository::{
    self, get_issue, get_pending, insert_issue, linked_feedback, list_resolutions, IssueFields,
    IssueFilter, LinkTarget,
};
use crate::issues::resolution::{add_manual_resolution, generate_resolution};
use crate::issues::review::{
    approve_pending, merge_pending, reject_pending, restore_rejected, ApproveRequest,
    MergeRequest, MergeResponse, RejectRequest,
};
use crate::models::feedback::{FeedbackRow, ServiceType};
use crate::models::issue::{
    IssueRow, IssueStatus, PendingIssueRow, PendingResolutionRow, RejectedIssueRow, Severity,
};
use crate::state::AppState;

const MAX_TITLE_LEN: usize = 255;
const MAX_CATEGORY_LEN: usize = 64;
const DEFAULT_CATEGORY: &str = "general";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct NewIssueRequest {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub service_type: String,
    pub severity: Option<String>,
    pub status: Option<String>,
    pub resolution: Option<String>,
}

/// Absent fields are kept; an empty `resolution` clears it.
#[derive(Debug, Default, Deserialize)]
pub struct IssuePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub service_type: Option<String>,
    pub severity: Option<String>,
    pub status: Option<String>,
    pub resolution: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PendingIssuePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub severity: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewResolutionRequest {
    pub resolution_text: String,
}

#[derive(Debug, Serialize)]
pub struct IssueDetailResponse {
    pub issue: IssueRow,
    pub feedback: Vec<FeedbackRow>,
}

#[derive(Debug, Serialize)]
pub struct PendingIssueSummary {
    #[serde(flatten)]
    pub issue: PendingIssueRow,
    pub latest_resolution: Option<PendingResolutionRow>,
}

#[derive(Debug, Serialize)]
pub struct PendingIssueDetailResponse {
    pub issue: PendingIssueRow,
    pub resolutions: Vec<PendingResolutionRow>,
    pub feedback: Vec<FeedbackRow>,
}

/// Validated, owned issue fields ready to bind.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueDraft {
    pub title: String,
    pub description: String,
    pub category: String,
    pub service_type: ServiceType,
    pub severity: Severity,
    pub status: IssueStatus,
    pub resolution: Option<String>,
}

impl IssueDraft {
    fn fields(&self) -> IssueFields<'_> {
        IssueFields {
            title: &self.title,
            description: &self.description,
            category: &self.category,
            service_type: self.service_type.as_str(),
            severity: self.severity.as_str(),
            status: self.status.as_str(),
            resolution: self.resolution.as_deref(),
        }
    }
}

pub fn validate_new_issue(req: NewIssueRequest) -> Result<IssueDraft, AppError> {
    let title = validate_title(&req.title)?;
    let description = req
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| title.clone());
    Ok(IssueDraft {
        description,
        category: validate_category(req.category.as_deref())?,
        service_type: parse_field(&req.service_type)?,
        severity: optional_enum(req.severity.as_deref())?.unwrap_or(Severity::Medium),
        status: optional_enum(req.status.as_deref())?.unwrap_or(IssueStatus::Open),
        resolution: req.resolution.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
        title,
    })
}

pub fn apply_issue_patch(existing: &IssueRow, patch: IssuePatch) -> Result<IssueDraft, AppError> {
    let title = match patch.title {
        Some(t) => validate_title(&t)?,
        None => existing.title.clone(),
    };
    let description = match patch.description {
        Some(d) if d.trim().is_empty() => {
            return Err(AppError::Validation("description cannot be empty".to_string()))
        }
        Some(d) => d.trim().to_string(),
        None => existing.description.clone(),
    };
    let category = match patch.category {
        Some(c) => validate_category(Some(&c))?,
        None => existing.category.clone(),
    };
    let resolution = match patch.resolution {
        Some(r) => Some(r.trim().to_string()).filter(|r| !r.is_empty()),
        None => existing.resolution.clone(),
    };
    Ok(IssueDraft {
        title,
        description,
        category,
        service_type: parse_field(patch.service_type.as_deref().unwrap_or(&existing.service_type))?,
        severity: parse_field(patch.severity.as_deref().unwrap_or(&existing.severity))?,
        status: parse_field(patch.status.as_deref().unwrap_or(&existing.status))?,
        resolution,
    })
}

fn validate_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("title cannot be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(title.to_string())
}

fn validate_category(category: Option<&str>) -> Result<String, AppError> {
    let category = category.map(str::trim).filter(|c| !c.is_empty()).unwrap_or(DEFAULT_CATEGORY);
    if category.chars().count() > MAX_CATEGORY_LEN {
        return Err(AppError::Validation(format!(
            "category must be at most {MAX_CATEGORY_LEN} characters"
        )));
    }
    Ok(category.to_lowercase())
}

fn optional_enum<T>(value: Option<&str>) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(parse_field::<T>)
        .transpose()
}

// ────────────────────────────────────────────────────────────────────────────
// Approved issues
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/issues
pub async fn handle_list_issues(
    State(state): State<AppState>,
    Query(filter): Query<IssueFilter>,
) -> Result<Json<Vec<IssueRow>>, AppError> {
    Ok(Json(repository::list_issues(&state.db, &filter).await?))
}

/// GET /api/issues/:id
pub async fn handle_get_issue(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<IssueDetailResponse>, AppError> {
    let issue = require_issue(get_issue(&state.db, id).await?, id)?;
    let feedback = linked_feedback(&state.db, LinkTarget::Issue(id)).await?;
    Ok(Json(IssueDetailResponse { issue, feedback }))
}

/// POST /api/issues
pub async fn handle_create_issue(
    State(state): State<AppState>,
    AppJson(req): AppJson<NewIssueRequest>,
) -> Result<(StatusCode, Json<IssueRow>), AppError> {
    let draft = validate_new_issue(req)?;
    let mut conn = state.db.acquire().await?;
    let id = insert_issue(&mut conn, &draft.fields(), 0).await?;
    let issue = require_issue(get_issue(&mut *conn, id).await?, id)?;
    Ok((StatusCode::CREATED, Json(issue)))
}

/// PUT /api/issues/:id
pub async fn handle_update_issue(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    AppJson(patch): AppJson<IssuePatch>,
) -> Result<Json<IssueRow>, AppError> {
    let existing = require_issue(get_issue(&state.db, id).await?, id)?;
    let draft = apply_issue_patch(&existing, patch)?;
    repository::update_issue(&state.db, id, &draft.fields()).await?;
    let issue = require_issue(get_issue(&state.db, id).await?, id)?;
    Ok(Json(issue))
}

/// DELETE /api/issues/:id
pub async fn handle_delete_issue(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !repository::delete_issue(&state.db, id).await? {
        return Err(AppError::NotFound(format!("Issue {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ────────────────────────────────────────────────────────────────────────────
// Pending issues
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/pending-issues
pub async fn handle_list_pending(
    State(state): State<AppState>,
) -> Result<Json<Vec<PendingIssueSummary>>, AppError> {
    let pending = repository::list_pending(&state.db).await?;
    let latest = repository::latest_resolutions(&state.db).await?;
    Ok(Json(summarize_pending(pending, latest)))
}

fn summarize_pending(
    pending: Vec<PendingIssueRow>,
    latest: Vec<PendingResolutionRow>,
) -> Vec<PendingIssueSummary> {
    let mut latest: HashMap<i64, PendingResolutionRow> =
        latest.into_iter().map(|r| (r.pending_issue_id, r)).collect();
    pending
        .into_iter()
        .map(|issue| PendingIssueSummary {
            latest_resolution: latest.remove(&issue.id),
            issue,
        })
        .collect()
}

/// GET /api/pending-issues/:id
pub async fn handle_get_pending(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PendingIssueDetailResponse>, AppError> {
    let issue = require_pending(get_pending(&state.db, id).await?, id)?;
    let resolutions = list_resolutions(&state.db, id).await?;
    let feedback = linked_feedback(&state.db, LinkTarget::Pending(id)).await?;
    Ok(Json(PendingIssueDetailResponse {
        issue,
        resolutions,
        feedback,
    }))
}

/// PUT /api/pending-issues/:id
pub async fn handle_update_pending(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    AppJson(patch): AppJson<PendingIssuePatch>,
) -> Result<Json<PendingIssueRow>, AppError> {
    let existing = require_pending(get_pending(&state.db, id).await?, id)?;

    let title = match patch.title {
        Some(t) => validate_title(&t)?,
        None => existing.title,
    };
    let description = match patch.description.map(|d| d.trim().to_string()) {
        Some(d) if d.is_empty() => {
            return Err(AppError::Validation("description cannot be empty".to_string()))
        }
        Some(d) => d,
        None => existing.description,
    };
    let category = match patch.category {
        Some(c) => validate_category(Some(&c))?,
        None => existing.category,
    };
    let severity: Severity = parse_field(patch.severity.as_deref().unwrap_or(&existing.severity))?;

    repository::update_pending(&state.db, id, &title, &description, &category, severity.as_str())
        .await?;
    let updated = require_pending(get_pending(&state.db, id).await?, id)?;
    Ok(Json(updated))
}

/// POST /api/pending-issues/:id/approve
pub async fn handle_approve_pending(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<ApproveRequest>>,
) -> Result<(StatusCode, Json<IssueRow>), AppError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let issue = approve_pending(&state.db, id, &request).await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

/// POST /api/pending-issues/:id/reject
pub async fn handle_reject_pending(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<RejectRequest>>,
) -> Result<Json<RejectedIssueRow>, AppError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(reject_pending(&state.db, id, &request).await?))
}

/// POST /api/pending-issues/:id/merge
pub async fn handle_merge_pending(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    AppJson(request): AppJson<MergeRequest>,
) -> Result<Json<MergeResponse>, AppError> {
    Ok(Json(merge_pending(&state.db, id, &request).await?))
}

/// GET /api/pending-issues/:id/resolutions
pub async fn handle_list_resolutions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PendingResolutionRow>>, AppError> {
    require_pending(get_pending(&state.db, id).await?, id)?;
    Ok(Json(list_resolutions(&state.db, id).await?))
}

/// POST /api/pending-issues/:id/resolutions
pub async fn handle_add_resolution(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    AppJson(req): AppJson<NewResolutionRequest>,
) -> Result<(StatusCode, Json<PendingResolutionRow>), AppError> {
    let row = add_manual_resolution(&state.db, id, &req.resolution_text).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// POST /api/pending-issues/:id/resolutions/generate
///
/// 422 when no LLM is configured, 502 when the LLM call fails.
pub async fn handle_generate_resolution(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<PendingResolutionRow>), AppError> {
    let row = generate_resolution(&state.db, state.llm.as_ref(), id).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

// ────────────────────────────────────────────────────────────────────────────
// Rejected issues
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/rejected-issues
pub async fn handle_list_rejected(
    State(state): State<AppState>,
) -> Result<Json<Vec<RejectedIssueRow>>, AppError> {
    Ok(Json(repository::list_rejected(&state.db).await?))
}

/// POST /api/rejected-issues/:id/restore
pub async fn handle_restore_rejected(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<PendingIssueRow>), AppError> {
    let pending = restore_rejected(&state.db, id).await?;
    Ok((StatusCode::CREATED, Json(pending)))
}

/// DELETE /api/rejected-issues/:id
pub async fn handle_delete_rejected(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !repository::delete_rejected(&state.db, id).await? {
        return Err(AppError::NotFound(format!("Rejected issue {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

fn require_issue(row: Option<IssueRow>, id: i64) -> Result<IssueRow, AppError> {
    row.ok_or_else(|| AppError::NotFound(format!("Issue {id} not found")))
}

fn require_pending(row: Option<PendingIssueRow>, id: i64) -> Result<PendingIssueRow, AppError> {
    row.ok_or_else(|| AppError::NotFound(format!("Pending issue {id} not found")))
}
