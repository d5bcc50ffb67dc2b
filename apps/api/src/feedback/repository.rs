use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use sqlx::{Executor, MySql, MySqlPool, QueryBuilder};

use crate::feedback::validation::ValidFeedback;
use crate::models::feedback::{
    FeedbackRow, FeedbackSource, FeedbackStatus, InteractionRow, InteractionType, Sentiment,
    ServiceType,
};

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 1000;

/// Query-string filters for GET /api/feedback.
#[derive(Debug, Default, Deserialize)]
pub struct FeedbackFilter {
    pub service_type: Option<ServiceType>,
    pub sentiment: Option<Sentiment>,
    pub status: Option<FeedbackStatus>,
    pub rating: Option<i32>,
    pub search: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl FeedbackFilter {
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Midnight UTC at the start of `date`.
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Appends `created_at` bounds for an inclusive `[from, to]` day range.
/// A `to` on the last representable day leaves the range open-ended.
pub fn push_date_range(qb: &mut QueryBuilder<'_, MySql>, from: Option<NaiveDate>, to: Option<NaiveDate>) {
    if let Some(from) = from {
        qb.push(" AND created_at >= ").push_bind(day_start(from));
    }
    if let Some(next_day) = to.and_then(|to| to.succ_opt()) {
        qb.push(" AND created_at < ").push_bind(day_start(next_day));
    }
}

pub async fn insert_feedback<'e, E>(
    executor: E,
    feedback: &ValidFeedback,
    source: FeedbackSource,
    import_batch: Option<&str>,
) -> Result<i64>
where
    E: Executor<'e, Database = MySql>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO feedback
            (customer_name, service_type, rating, review_text, sentiment,
             status, source, import_batch, location, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, COALESCE(?, CURRENT_TIMESTAMP))
        "#,
    )
    .bind(&feedback.customer_name)
    .bind(feedback.service_type.as_str())
    .bind(feedback.rating)
    .bind(&feedback.review_text)
    .bind(feedback.sentiment.as_str())
    .bind(feedback.status.as_str())
    .bind(source.as_str())
    .bind(import_batch)
    .bind(&feedback.location)
    .bind(feedback.created_at)
    .execute(executor)
    .await?;

    Ok(result.last_insert_id() as i64)
}

pub async fn get_feedback(pool: &MySqlPool, id: i64) -> Result<Option<FeedbackRow>> {
    Ok(
        sqlx::query_as::<_, FeedbackRow>("SELECT * FROM feedback WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

/// Returns feedback matching the filter, newest first.
pub async fn list_feedback(pool: &MySqlPool, filter: &FeedbackFilter) -> Result<Vec<FeedbackRow>> {
    let mut qb = QueryBuilder::<MySql>::new("SELECT * FROM feedback WHERE 1 = 1");

    if let Some(service_type) = filter.service_type {
        qb.push(" AND service_type = ").push_bind(service_type.as_str());
    }
    if let Some(sentiment) = filter.sentiment {
        qb.push(" AND sentiment = ").push_bind(sentiment.as_str());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(rating) = filter.rating {
        qb.push(" AND rating = ").push_bind(rating);
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (review_text LIKE ")
            .push_bind(pattern.clone())
            .push(" OR customer_name LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    push_date_range(&mut qb, filter.from, filter.to);

    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(filter.effective_limit())
        .push(" OFFSET ")
        .push_bind(filter.effective_offset());

    Ok(qb.build_query_as::<FeedbackRow>().fetch_all(pool).await?)
}

/// Overwrites every mutable column. Returns false when the row does not exist.
pub async fn update_feedback(pool: &MySqlPool, id: i64, feedback: &ValidFeedback) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE feedback
        SET customer_name = ?, service_type = ?, rating = ?, review_text = ?,
            sentiment = ?, status = ?, location = ?
        WHERE id = ?
        "#,
    )
    .bind(&feedback.customer_name)
    .bind(feedback.service_type.as_str())
    .bind(feedback.rating)
    .bind(&feedback.review_text)
    .bind(feedback.sentiment.as_str())
    .bind(feedback.status.as_str())
    .bind(&feedback.location)
    .bind(id)
    .execute(pool)
    .await?;

    // MySQL reports matched-but-unchanged rows as 0 affected, so check existence separately
    if result.rows_affected() > 0 {
        return Ok(true);
    }
    Ok(get_feedback(pool, id).await?.is_some())
}

/// Links and interactions are removed by ON DELETE CASCADE.
pub async fn delete_feedback(pool: &MySqlPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM feedback WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn insert_interaction(
    pool: &MySqlPool,
    feedback_id: i64,
    employee_id: i64,
    interaction_type: InteractionType,
    notes: Option<&str>,
) -> Result<InteractionRow> {
    let result = sqlx::query(
        r#"
        INSERT INTO employee_feedback_interactions
            (employee_id, feedback_id, interaction_type, notes)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(feedback_id)
    .bind(interaction_type.as_str())
    .bind(notes)
    .execute(pool)
    .await?;

    Ok(sqlx::query_as::<_, InteractionRow>(
        "SELECT * FROM employee_feedback_interactions WHERE id = ?",
    )
    .bind(result.last_insert_id() as i64)
    .fetch_one(pool)
    .await?)
}

pub async fn list_interactions_for_feedback(
    pool: &MySqlPool,
    feedback_id: i64,
) -> Result<Vec<InteractionRow>> {
    Ok(sqlx::query_as::<_, InteractionRow>(
        "SELECT * FROM employee_feedback_interactions WHERE feedback_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(feedback_id)
    .fetch_all(pool)
    .await?)
}

/// Escapes LIKE wildcards so user search text matches literally.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
