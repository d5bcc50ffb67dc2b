//! Reviewer workflow over pending issues: approve, reject, merge, and
//! restoring previously rejected issues. Every operation is one transaction.

use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;

use crate::errors::AppError;
use crate::issues::repository::{
    delete_pending, delete_rejected, get_issue, get_pending, get_rejected, insert_issue,
    insert_rejected, list_resolutions, move_links, refresh_feedback_count, IssueFields,
    LinkTarget,
};
use crate::models::issue::{
    DetectionMethod, IssueRow, IssueStatus, PendingIssueRow, RejectedIssueRow,
};

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    /// Overrides the latest suggested resolution when present.
    pub resolution: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

/// Exactly one of the two targets must be set.
#[derive(Debug, Default, Deserialize)]
pub struct MergeRequest {
    pub issue_id: Option<i64>,
    pub pending_issue_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub target: MergeTarget,
    pub moved_feedback: u64,
    pub feedback_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MergeTarget {
    Issue(i64),
    PendingIssue(i64),
}

impl MergeRequest {
    pub fn target(&self, source_id: i64) -> Result<MergeTarget, AppError> {
        let target = match (self.issue_id, self.pending_issue_id) {
            (Some(id), None) => MergeTarget::Issue(id),
            (None, Some(id)) => MergeTarget::PendingIssue(id),
            _ => {
                return Err(AppError::Validation(
                    "exactly one of issue_id or pending_issue_id is required".to_string(),
                ))
            }
        };
        if target == MergeTarget::PendingIssue(source_id) {
            return Err(AppError::Validation(
                "a pending issue cannot be merged into itself".to_string(),
            ));
        }
        Ok(target)
    }
}

/// An explicit non-blank resolution wins; otherwise the newest suggestion.
pub fn choose_resolution(explicit: Option<&str>, latest_suggestion: Option<&str>) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or(latest_suggestion)
        .map(String::from)
}

/// Promotes a pending issue to an open issue, carrying its feedback links.
pub async fn approve_pending(
    pool: &MySqlPool,
    pending_id: i64,
    request: &ApproveRequest,
) -> Result<IssueRow, AppError> {
    let mut tx = pool.begin().await?;

    let pending = require_pending(get_pending(&mut *tx, pending_id).await?, pending_id)?;
    let suggestions = list_resolutions(&mut *tx, pending_id).await?;
    let resolution = choose_resolution(
        request.resolution.as_deref(),
        suggestions.first().map(|r| r.resolution_text.as_str()),
    );

    let issue_id = insert_issue(
        &mut tx,
        &IssueFields {
            title: &pending.title,
            description: &pending.description,
            category: &pending.category,
            service_type: &pending.service_type,
            severity: &pending.severity,
            status: IssueStatus::Open.as_str(),
            resolution: resolution.as_deref(),
        },
        0,
    )
    .await?;

    let target = LinkTarget::Issue(issue_id);
    move_links(&mut tx, LinkTarget::Pending(pending_id), target).await?;
    refresh_feedback_count(&mut tx, target).await?;
    delete_pending(&mut tx, pending_id).await?;

    let issue = get_issue(&mut *tx, issue_id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Approved issue {issue_id} vanished")))?;
    tx.commit().await?;

    info!("Approved pending issue {pending_id} as issue {issue_id}");
    Ok(issue)
}

/// Archives a pending issue as rejected. Its links are dropped by cascade.
pub async fn reject_pending(
    pool: &MySqlPool,
    pending_id: i64,
    request: &RejectRequest,
) -> Result<RejectedIssueRow, AppError> {
    let mut tx = pool.begin().await?;

    let pending = require_pending(get_pending(&mut *tx, pending_id).await?, pending_id)?;
    let reason = request
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());
    let rejected_id = insert_rejected(&mut tx, &pending, reason).await?;
    delete_pending(&mut tx, pending_id).await?;

    let rejected = get_rejected(&mut *tx, rejected_id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Rejected issue {rejected_id} vanished")))?;
    tx.commit().await?;

    info!("Rejected pending issue {pending_id}");
    Ok(rejected)
}

/// Folds a pending issue into an approved issue or another pending issue.
pub async fn merge_pending(
    pool: &MySqlPool,
    pending_id: i64,
    request: &MergeRequest,
) -> Result<MergeResponse, AppError> {
    let target = request.target(pending_id)?;
    let mut tx = pool.begin().await?;

    require_pending(get_pending(&mut *tx, pending_id).await?, pending_id)?;

    let link_target = match target {
        MergeTarget::Issue(id) => {
            get_issue(&mut *tx, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Issue {id} not found")))?;
            LinkTarget::Issue(id)
        }
        MergeTarget::PendingIssue(id) => {
            get_pending(&mut *tx, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Pending issue {id} not found")))?;
            LinkTarget::Pending(id)
        }
    };

    let moved = move_links(&mut tx, LinkTarget::Pending(pending_id), link_target).await?;
    refresh_feedback_count(&mut tx, link_target).await?;
    delete_pending(&mut tx, pending_id).await?;

    let feedback_count = match link_target {
        LinkTarget::Issue(id) => get_issue(&mut *tx, id).await?.map(|i| i.feedback_count),
        LinkTarget::Pending(id) => get_pending(&mut *tx, id).await?.map(|p| p.feedback_count),
    }
    .unwrap_or_default();
    tx.commit().await?;

    info!("Merged pending issue {pending_id} into {target:?} ({moved} feedback moved)");
    Ok(MergeResponse {
        target,
        moved_feedback: moved,
        feedback_count,
    })
}

/// Moves a rejected issue back into the review queue. Feedback links were
/// dropped at rejection, so it starts with a count of zero.
pub async fn restore_rejected(pool: &MySqlPool, rejected_id: i64) -> Result<PendingIssueRow, AppError> {
    let mut tx = pool.begin().await?;

    let rejected = get_rejected(&mut *tx, rejected_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Rejected issue {rejected_id} not found")))?;

    let result = sqlx::query(
        r#"
        INSERT INTO pending_issues
            (title, description, category, service_type, severity, detection_method, feedback_count)
        VALUES (?, ?, ?, ?, ?, ?, 0)
        "#,
    )
    .bind(&rejected.title)
    .bind(&rejected.description)
    .bind(&rejected.category)
    .bind(&rejected.service_type)
    .bind(&rejected.severity)
    .bind(DetectionMethod::Manual.as_str())
    .execute(&mut *tx)
    .await?;
    let pending_id = result.last_insert_id() as i64;

    delete_rejected(&mut *tx, rejected_id).await?;
    let pending = require_pending(get_pending(&mut *tx, pending_id).await?, pending_id)?;
    tx.commit().await?;

    info!("Restored rejected issue {rejected_id} as pending issue {pending_id}");
    Ok(pending)
}

fn require_pending(row: Option<PendingIssueRow>, id: i64) -> Result<PendingIssueRow, AppError> {
    row.ok_or_else(|| AppError::NotFound(format!("Pending issue {id} not found")))
}
