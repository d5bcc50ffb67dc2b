//! Issue detection: turns a negative feedback into links on existing issues
//! or new pending issues for review.
//!
//! Flow: load same-channel candidates → classify → plan a step per detected
//! issue → apply the plan in one transaction.

use std::collections::HashMap;

use serde::Serialize;
use sqlx::MySqlPool;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::feedback::repository::get_feedback;
use crate::issues::classifier::{DetectedIssue, IssueClassifier};
use crate::issues::dedup::{find_match, Candidate, CandidateKind};
use crate::issues::repository::{
    insert_pending, insert_resolution, link_feedback, load_candidates, LinkTarget,
};
use crate::models::feedback::FeedbackRow;
use crate::models::issue::{DetectionMethod, ResolutionSource};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionAction {
    LinkedIssue,
    LinkedPending,
    CreatedPending,
    /// Matched a rejected issue; nothing was written.
    Suppressed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub title: String,
    pub action: DetectionAction,
    pub target_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionOutcome {
    pub feedback_id: i64,
    /// `None` when the feedback was not negative and no classification ran.
    pub method: Option<DetectionMethod>,
    pub results: Vec<DetectionResult>,
}

/// What detection will do with one detected issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedStep {
    /// Matched a rejected issue.
    Suppress { rejected_id: i64 },
    Link(LinkTarget),
    /// Matched the pending issue planned for an earlier detected issue.
    LinkPlanned { issue_index: usize },
    CreatePending,
}

/// Pending issues planned in this batch are matched under negative ids,
/// which never collide with stored ones.
fn planned_id(issue_index: usize) -> i64 {
    -(issue_index as i64) - 1
}

/// Decides one step per detected issue, in order. Each planned pending issue
/// becomes a candidate for the issues after it.
pub fn plan_detection(
    issues: &[DetectedIssue],
    candidates: &[Candidate],
    threshold: f64,
) -> Vec<PlannedStep> {
    let mut candidates = candidates.to_vec();
    let mut steps = Vec::with_capacity(issues.len());

    for (index, issue) in issues.iter().enumerate() {
        let step = match find_match(&issue.title, &candidates, threshold) {
            Some(m) if m.kind == CandidateKind::Rejected => PlannedStep::Suppress { rejected_id: m.id },
            Some(m) if m.id < 0 => PlannedStep::LinkPlanned {
                issue_index: (-m.id - 1) as usize,
            },
            Some(m) if m.kind == CandidateKind::Issue => PlannedStep::Link(LinkTarget::Issue(m.id)),
            Some(m) => PlannedStep::Link(LinkTarget::Pending(m.id)),
            None => {
                candidates.push(Candidate {
                    kind: CandidateKind::Pending,
                    id: planned_id(index),
                    title: issue.title.clone(),
                });
                PlannedStep::CreatePending
            }
        };
        steps.push(step);
    }
    steps
}

/// Suggested resolutions are labelled by where the classification came from.
pub fn resolution_source(method: DetectionMethod) -> ResolutionSource {
    match method {
        DetectionMethod::Llm => ResolutionSource::Llm,
        _ => ResolutionSource::Template,
    }
}

/// Runs detection for one feedback and persists the result.
pub async fn detect_issues_from_feedback(
    pool: &MySqlPool,
    classifier: &dyn IssueClassifier,
    match_threshold: f64,
    feedback: &FeedbackRow,
) -> Result<DetectionOutcome, AppError> {
    if !feedback.is_negative() {
        return Ok(DetectionOutcome {
            feedback_id: feedback.id,
            method: None,
            results: Vec::new(),
        });
    }

    let mut conn = pool.acquire().await?;
    let candidates = load_candidates(&mut conn, &feedback.service_type)
        .await
        .map_err(AppError::Internal)?;
    drop(conn);

    let known_titles: Vec<String> = candidates
        .iter()
        .filter(|c| c.kind != CandidateKind::Rejected)
        .map(|c| c.title.clone())
        .collect();

    // LLM round-trip happens outside the transaction
    let classification = classifier.classify(feedback, &known_titles).await?;
    let steps = plan_detection(&classification.issues, &candidates, match_threshold);
    let source = resolution_source(classification.method);

    let mut tx = pool.begin().await?;
    let mut created: HashMap<usize, i64> = HashMap::new();
    let mut results = Vec::with_capacity(steps.len());

    for (index, (issue, step)) in classification.issues.iter().zip(steps).enumerate() {
        let (action, target_id) = match step {
            PlannedStep::Suppress { rejected_id } => (DetectionAction::Suppressed, rejected_id),
            PlannedStep::Link(target) => {
                link_feedback(&mut tx, feedback.id, target)
                    .await
                    .map_err(AppError::Internal)?;
                let action = match target {
                    LinkTarget::Issue(_) => DetectionAction::LinkedIssue,
                    LinkTarget::Pending(_) => DetectionAction::LinkedPending,
                };
                (action, target.id())
            }
            PlannedStep::LinkPlanned { issue_index } => {
                let pending_id = created.get(&issue_index).copied().ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!(
                        "no pending issue was created for detected issue {issue_index}"
                    ))
                })?;
                link_feedback(&mut tx, feedback.id, LinkTarget::Pending(pending_id))
                    .await
                    .map_err(AppError::Internal)?;
                (DetectionAction::LinkedPending, pending_id)
            }
            PlannedStep::CreatePending => {
                let pending_id = insert_pending(
                    &mut tx,
                    issue,
                    &feedback.service_type,
                    classification.method,
                    0,
                )
                .await
                .map_err(AppError::Internal)?;
                if let Some(text) = issue.suggested_resolution.as_deref() {
                    insert_resolution(&mut tx, pending_id, text, source)
                        .await
                        .map_err(AppError::Internal)?;
                }
                link_feedback(&mut tx, feedback.id, LinkTarget::Pending(pending_id))
                    .await
                    .map_err(AppError::Internal)?;
                created.insert(index, pending_id);
                (DetectionAction::CreatedPending, pending_id)
            }
        };
        results.push(DetectionResult {
            title: issue.title.clone(),
            action,
            target_id,
        });
    }

    tx.commit().await?;

    info!(
        "Detected {} issue(s) for feedback {} via {}",
        results.len(),
        feedback.id,
        classification.method
    );

    Ok(DetectionOutcome {
        feedback_id: feedback.id,
        method: Some(classification.method),
        results,
    })
}

/// Runs detection for each feedback id on a background task, one at a time.
/// Failures are logged and never surface to the request that queued them.
pub fn spawn_detection(state: AppState, feedback_ids: Vec<i64>) {
    if feedback_ids.is_empty() {
        return;
    }
    tokio::spawn(async move {
        for id in feedback_ids {
            let feedback = match get_feedback(&state.db, id).await {
                Ok(Some(f)) => f,
                Ok(None) => {
                    warn!("Feedback {id} disappeared before issue detection");
                    continue;
                }
                Err(e) => {
                    warn!("Failed to load feedback {id} for issue detection: {e:?}");
                    continue;
                }
            };
            if let Err(e) = detect_issues_from_feedback(
                &state.db,
                state.classifier.as_ref(),
                state.config.issue_match_threshold,
                &feedback,
            )
            .await
            {
                warn!("Issue detection failed for feedback {id}: {e}");
            }
        }
    });
}
