//! Axum route handlers for the Feedback API.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::employees::repository::get_employee;
use crate::errors::{AppError, AppJson};
use crate::feedback::import::{parse_feedback_csv, ImportReport};
use crate::feedback::repository::{self, FeedbackFilter};
use crate::feedback::validation::{
    apply_patch, parse_field, validate_date_filter, validate_new_feedback, FeedbackPatch,
    NewFeedback,
};
use crate::issues::detection::{detect_issues_from_feedback, spawn_detection, DetectionOutcome};
use crate::models::feedback::{
    FeedbackRow, FeedbackSource, InteractionRow, InteractionType, Sentiment,
};
use crate::state::AppState;

/// Multipart field carrying the CSV upload.
pub const IMPORT_FIELD: &str = "file";
/// Upload size cap for CSV imports.
pub const MAX_IMPORT_BYTES: usize = 10 * 1024 * 1024;
const MAX_NOTES_LEN: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct NewInteractionRequest {
    pub employee_id: i64,
    pub interaction_type: String,
    pub notes: Option<String>,
}

/// GET /api/feedback
pub async fn handle_list_feedback(
    State(state): State<AppState>,
    Query(filter): Query<FeedbackFilter>,
) -> Result<Json<Vec<FeedbackRow>>, AppError> {
    validate_date_filter(filter.from, filter.to)?;
    Ok(Json(repository::list_feedback(&state.db, &filter).await?))
}

/// GET /api/feedback/:id
pub async fn handle_get_feedback(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<FeedbackRow>, AppError> {
    Ok(Json(require_feedback(&state, id).await?))
}

/// POST /api/feedback
///
/// Negative feedback is queued for issue detection after the insert commits;
/// detection failures never fail the request.
pub async fn handle_create_feedback(
    State(state): State<AppState>,
    AppJson(request): AppJson<NewFeedback>,
) -> Result<(StatusCode, Json<FeedbackRow>), AppError> {
    let valid = validate_new_feedback(request)?;
    let id = repository::insert_feedback(&state.db, &valid, FeedbackSource::Manual, None).await?;
    let row = require_feedback(&state, id).await?;

    if row.is_negative() {
        spawn_detection(state.clone(), vec![id]);
    }

    Ok((StatusCode::CREATED, Json(row)))
}

/// PUT /api/feedback/:id
pub async fn handle_update_feedback(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    AppJson(patch): AppJson<FeedbackPatch>,
) -> Result<Json<FeedbackRow>, AppError> {
    let existing = require_feedback(&state, id).await?;
    let updated = apply_patch(&existing, patch)?;
    if !repository::update_feedback(&state.db, id, &updated).await? {
        return Err(AppError::NotFound(format!("Feedback {id} not found")));
    }
    Ok(Json(require_feedback(&state, id).await?))
}

/// DELETE /api/feedback/:id
pub async fn handle_delete_feedback(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !repository::delete_feedback(&state.db, id).await? {
        return Err(AppError::NotFound(format!("Feedback {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/feedback/:id/detect-issues
///
/// Runs detection inline and returns what was linked or created.
pub async fn handle_detect_issues(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DetectionOutcome>, AppError> {
    let feedback = require_feedback(&state, id).await?;
    let outcome = detect_issues_from_feedback(
        &state.db,
        state.classifier.as_ref(),
        state.config.issue_match_threshold,
        &feedback,
    )
    .await?;
    Ok(Json(outcome))
}

/// POST /api/feedback/import
pub async fn handle_import_feedback(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImportReport>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some(IMPORT_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
            upload = Some(bytes);
            break;
        }
    }
    let bytes = upload.ok_or_else(|| {
        AppError::Validation(format!("multipart field '{IMPORT_FIELD}' is required"))
    })?;

    let parsed = parse_feedback_csv(&bytes)?;
    let import_id = Uuid::new_v4();
    let batch = import_id.to_string();

    let mut negative_ids = Vec::new();
    let mut tx = state.db.begin().await?;
    for row in &parsed.rows {
        let id = repository::insert_feedback(&mut *tx, row, FeedbackSource::Csv, Some(&batch))
            .await?;
        if row.sentiment == Sentiment::Negative {
            negative_ids.push(id);
        }
    }
    tx.commit().await?;

    let report = ImportReport {
        import_id,
        imported: parsed.rows.len(),
        skipped: parsed.errors.len(),
        errors: parsed.errors,
    };
    info!(
        "CSV import {import_id}: {} imported, {} skipped, {} queued for detection",
        report.imported,
        report.skipped,
        negative_ids.len()
    );

    spawn_detection(state.clone(), negative_ids);
    Ok(Json(report))
}

/// GET /api/feedback/:id/interactions
pub async fn handle_list_interactions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<InteractionRow>>, AppError> {
    require_feedback(&state, id).await?;
    Ok(Json(
        repository::list_interactions_for_feedback(&state.db, id).await?,
    ))
}

/// POST /api/feedback/:id/interactions
pub async fn handle_create_interaction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    AppJson(request): AppJson<NewInteractionRequest>,
) -> Result<(StatusCode, Json<InteractionRow>), AppError> {
    let interaction_type: InteractionType = parse_field(&request.interaction_type)?;
    let notes = validate_notes(request.notes.as_deref())?;

    require_feedback(&state, id).await?;
    get_employee(&state.db, request.employee_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Employee {} not found", request.employee_id)))?;

    let row = repository::insert_interaction(
        &state.db,
        id,
        request.employee_id,
        interaction_type,
        notes,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

fn validate_notes(notes: Option<&str>) -> Result<Option<&str>, AppError> {
    let notes = notes.map(str::trim).filter(|n| !n.is_empty());
    if notes.is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
        return Err(AppError::Validation(format!(
            "notes must be at most {MAX_NOTES_LEN} characters"
        )));
    }
    Ok(notes)
}

async fn require_feedback(state: &AppState, id: i64) -> Result<FeedbackRow, AppError> {
    repository::get_feedback(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Feedback {id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_notes() {
        assert_eq!(validate_notes(None).unwrap(), None);
        assert_eq!(validate_notes(Some("   ")).unwrap(), None);
        assert_eq!(validate_notes(Some(" called back ")).unwrap(), Some("called back"));
        let long = "n".repeat(MAX_NOTES_LEN + 1);
        assert!(matches!(validate_notes(Some(&long)), Err(AppError::Validation(_))));
    }
}
