use axum::{
    extract::{Query, State},
    Json,
};

use crate::errors::AppError;
use crate::feedback::validation::validate_date_filter;
use crate::issues::repository::{count_issues_by_status, count_pending, top_issues};
use crate::metrics::{
    compute_feedback_metrics, load_feedback_stats, MetricsFilter, MetricsResponse,
    TOP_ISSUES_LIMIT,
};
use crate::models::issue::IssueStatus;
use crate::state::AppState;

/// GET /api/metrics
///
/// Feedback figures honour the filter; issue figures are global.
pub async fn handle_get_metrics(
    State(state): State<AppState>,
    Query(filter): Query<MetricsFilter>,
) -> Result<Json<MetricsResponse>, AppError> {
    validate_date_filter(filter.from, filter.to)?;
    let groups = load_feedback_stats(&state.db, &filter).await?;
    let feedback = compute_feedback_metrics(&groups);

    let open_issues = count_issues_by_status(&state.db, IssueStatus::Open).await?;
    let pending_issues = count_pending(&state.db).await?;
    let top_issues = top_issues(&state.db, TOP_ISSUES_LIMIT).await?;

    Ok(Json(MetricsResponse {
        feedback,
        open_issues,
        pending_issues,
        top_issues,
    }))
}
