//! SQL for issues, pending issues, resolutions, rejected issues and the
//! feedback ↔ issue links. Functions taking `&mut MySqlConnection` are meant
//! to run inside a caller-owned transaction.

use anyhow::Result;
use serde::Deserialize;
use sqlx::{Executor, FromRow, MySql, MySqlConnection, MySqlPool, QueryBuilder};

use crate::issues::classifier::DetectedIssue;
use crate::issues::dedup::{Candidate, CandidateKind};
use crate::models::feedback::{FeedbackRow, ServiceType};
use crate::models::issue::{
    DetectionMethod, IssueRow, IssueStatus, PendingIssueRow, PendingResolutionRow,
    RejectedIssueRow, ResolutionSource,
};

#[derive(Debug, Default, Deserialize)]
pub struct IssueFilter {
    pub status: Option<IssueStatus>,
    pub service_type: Option<ServiceType>,
}

#[derive(Debug, FromRow)]
struct TitleRow {
    id: i64,
    title: String,
}

/// Which side of `feedback_issues` a link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    Issue(i64),
    Pending(i64),
}

impl LinkTarget {
    fn column(&self) -> &'static str {
        match self {
            LinkTarget::Issue(_) => "issue_id",
            LinkTarget::Pending(_) => "pending_issue_id",
        }
    }

    fn table(&self) -> &'static str {
        match self {
            LinkTarget::Issue(_) => "issues",
            LinkTarget::Pending(_) => "pending_issues",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            LinkTarget::Issue(id) | LinkTarget::Pending(id) => *id,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Match candidates
// ────────────────────────────────────────────────────────────────────────────

/// Unresolved issues, pending issues and rejected issues on one channel, in
/// creation order.
pub async fn load_candidates(
    conn: &mut MySqlConnection,
    service_type: &str,
) -> Result<Vec<Candidate>> {
    let issues: Vec<TitleRow> = sqlx::query_as(
        "SELECT id, title FROM issues WHERE service_type = ? AND status <> ? ORDER BY id",
    )
    .bind(service_type)
    .bind(IssueStatus::Resolved.as_str())
    .fetch_all(&mut *conn)
    .await?;
    let pending: Vec<TitleRow> =
        sqlx::query_as("SELECT id, title FROM pending_issues WHERE service_type = ? ORDER BY id")
            .bind(service_type)
            .fetch_all(&mut *conn)
            .await?;
    let rejected: Vec<TitleRow> =
        sqlx::query_as("SELECT id, title FROM rejected_issues WHERE service_type = ? ORDER BY id")
            .bind(service_type)
            .fetch_all(&mut *conn)
            .await?;

    let tag = |kind: CandidateKind| move |row: TitleRow| Candidate {
        kind,
        id: row.id,
        title: row.title,
    };
    Ok(issues
        .into_iter()
        .map(tag(CandidateKind::Issue))
        .chain(pending.into_iter().map(tag(CandidateKind::Pending)))
        .chain(rejected.into_iter().map(tag(CandidateKind::Rejected)))
        .collect())
}

// ────────────────────────────────────────────────────────────────────────────
// Links
// ────────────────────────────────────────────────────────────────────────────

/// Links a feedback to an issue or pending issue and bumps its
/// `feedback_count`. Returns false (and changes nothing) when the link exists.
///
/// The unique keys on `feedback_issues` decide what "exists" means, so two
/// concurrent detections of the same feedback link it once.
pub async fn link_feedback(
    conn: &mut MySqlConnection,
    feedback_id: i64,
    target: LinkTarget,
) -> Result<bool> {
    let inserted = sqlx::query(&link_insert_sql(target))
        .bind(feedback_id)
        .bind(target.id())
        .execute(&mut *conn)
        .await;
    match inserted {
        Ok(_) => {}
        Err(err) if is_duplicate_link(&err) => return Ok(false),
        Err(err) => return Err(err.into()),
    }

    sqlx::query(&format!(
        "UPDATE {} SET feedback_count = feedback_count + 1 WHERE id = ?",
        target.table()
    ))
    .bind(target.id())
    .execute(&mut *conn)
    .await?;

    Ok(true)
}

fn link_insert_sql(target: LinkTarget) -> String {
    format!(
        "INSERT INTO feedback_issues (feedback_id, {}) VALUES (?, ?)",
        target.column()
    )
}

// InnoDB rolls back only the failed statement, so the transaction stays usable
fn is_duplicate_link(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Re-points every link of `from` at `to`, skipping feedback already linked
/// to `to` (those duplicates are deleted). Returns the number of links moved.
pub async fn move_links(
    conn: &mut MySqlConnection,
    from: LinkTarget,
    to: LinkTarget,
) -> Result<u64> {
    // MySQL rejects a subquery on the table being deleted from unless it is materialized
    sqlx::query(&format!(
        r#"
        DELETE FROM feedback_issues
        WHERE {from_col} = ?
          AND feedback_id IN (
              SELECT feedback_id FROM (
                  SELECT feedback_id FROM feedback_issues WHERE {to_col} = ?
              ) AS already_linked
          )
        "#,
        from_col = from.column(),
        to_col = to.column(),
    ))
    .bind(from.id())
    .bind(to.id())
    .execute(&mut *conn)
    .await?;

    let moved = sqlx::query(&format!(
        "UPDATE feedback_issues SET issue_id = ?, pending_issue_id = ? WHERE {} = ?",
        from.column()
    ))
    .bind(match to {
        LinkTarget::Issue(id) => Some(id),
        LinkTarget::Pending(_) => None,
    })
    .bind(match to {
        LinkTarget::Pending(id) => Some(id),
        LinkTarget::Issue(_) => None,
    })
    .bind(from.id())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(moved)
}

/// Recomputes `feedback_count` from the link table.
pub async fn refresh_feedback_count(conn: &mut MySqlConnection, target: LinkTarget) -> Result<()> {
    sqlx::query(&format!(
        "UPDATE {table} SET feedback_count = \
         (SELECT COUNT(*) FROM feedback_issues WHERE {col} = ?) WHERE id = ?",
        table = target.table(),
        col = target.column(),
    ))
    .bind(target.id())
    .bind(target.id())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn linked_feedback(pool: &MySqlPool, target: LinkTarget) -> Result<Vec<FeedbackRow>> {
    Ok(sqlx::query_as::<_, FeedbackRow>(&format!(
        r#"
        SELECT f.* FROM feedback f
        JOIN feedback_issues fi ON fi.feedback_id = f.id
        WHERE fi.{} = ?
        ORDER BY f.created_at DESC, f.id DESC
        "#,
        target.column()
    ))
    .bind(target.id())
    .fetch_all(pool)
    .await?)
}

// ────────────────────────────────────────────────────────────────────────────
// Approved issues
// ────────────────────────────────────────────────────────────────────────────

fn issue_list_query(filter: &IssueFilter) -> QueryBuilder<'static, MySql> {
    let mut qb = QueryBuilder::<MySql>::new("SELECT * FROM issues WHERE 1 = 1");
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(service_type) = filter.service_type {
        qb.push(" AND service_type = ").push_bind(service_type.as_str());
    }
    qb.push(" ORDER BY feedback_count DESC, created_at DESC");
    qb
}

pub async fn list_issues(pool: &MySqlPool, filter: &IssueFilter) -> Result<Vec<IssueRow>> {
    let mut qb = issue_list_query(filter);
    Ok(qb.build_query_as::<IssueRow>().fetch_all(pool).await?)
}

pub async fn get_issue<'e, E>(executor: E, id: i64) -> Result<Option<IssueRow>>
where
    E: Executor<'e, Database = MySql>,
{
    Ok(sqlx::query_as::<_, IssueRow>("SELECT * FROM issues WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?)
}

pub struct IssueFields<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub category: &'a str,
    pub service_type: &'a str,
    pub severity: &'a str,
    pub status: &'a str,
    pub resolution: Option<&'a str>,
}

pub async fn insert_issue(
    conn: &mut MySqlConnection,
    fields: &IssueFields<'_>,
    feedback_count: i32,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO issues
            (title, description, category, service_type, severity, status, resolution, feedback_count)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(fields.title)
    .bind(fields.description)
    .bind(fields.category)
    .bind(fields.service_type)
    .bind(fields.severity)
    .bind(fields.status)
    .bind(fields.resolution)
    .bind(feedback_count)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_id() as i64)
}

pub async fn update_issue(pool: &MySqlPool, id: i64, fields: &IssueFields<'_>) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE issues
        SET title = ?, description = ?, category = ?, service_type = ?,
            severity = ?, status = ?, resolution = ?
        WHERE id = ?
        "#,
    )
    .bind(fields.title)
    .bind(fields.description)
    .bind(fields.category)
    .bind(fields.service_type)
    .bind(fields.severity)
    .bind(fields.status)
    .bind(fields.resolution)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_issue(pool: &MySqlPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM issues WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_issues_by_status(pool: &MySqlPool, status: IssueStatus) -> Result<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM issues WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(pool)
            .await?,
    )
}

pub async fn top_issues(pool: &MySqlPool, limit: i64) -> Result<Vec<IssueRow>> {
    Ok(sqlx::query_as::<_, IssueRow>(
        "SELECT * FROM issues ORDER BY feedback_count DESC, id ASC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?)
}

// ────────────────────────────────────────────────────────────────────────────
// Pending issues and resolutions
// ────────────────────────────────────────────────────────────────────────────

pub async fn list_pending(pool: &MySqlPool) -> Result<Vec<PendingIssueRow>> {
    Ok(sqlx::query_as::<_, PendingIssueRow>(
        "SELECT * FROM pending_issues ORDER BY feedback_count DESC, created_at DESC",
    )
    .fetch_all(pool)
    .await?)
}

pub async fn get_pending<'e, E>(executor: E, id: i64) -> Result<Option<PendingIssueRow>>
where
    E: Executor<'e, Database = MySql>,
{
    Ok(
        sqlx::query_as::<_, PendingIssueRow>("SELECT * FROM pending_issues WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await?,
    )
}

pub async fn count_pending(pool: &MySqlPool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM pending_issues")
        .fetch_one(pool)
        .await?)
}

pub async fn insert_pending(
    conn: &mut MySqlConnection,
    issue: &DetectedIssue,
    service_type: &str,
    method: DetectionMethod,
    feedback_count: i32,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO pending_issues
            (title, description, category, service_type, severity, detection_method, feedback_count)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&issue.title)
    .bind(&issue.description)
    .bind(&issue.category)
    .bind(service_type)
    .bind(issue.severity.as_str())
    .bind(method.as_str())
    .bind(feedback_count)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_id() as i64)
}

pub async fn update_pending(
    pool: &MySqlPool,
    id: i64,
    title: &str,
    description: &str,
    category: &str,
    severity: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE pending_issues SET title = ?, description = ?, category = ?, severity = ? WHERE id = ?",
    )
    .bind(title)
    .bind(description)
    .bind(category)
    .bind(severity)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_pending(conn: &mut MySqlConnection, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM pending_issues WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn insert_resolution(
    conn: &mut MySqlConnection,
    pending_issue_id: i64,
    text: &str,
    source: ResolutionSource,
) -> Result<PendingResolutionRow> {
    let result = sqlx::query(
        "INSERT INTO pending_resolutions (pending_issue_id, resolution_text, source) VALUES (?, ?, ?)",
    )
    .bind(pending_issue_id)
    .bind(text)
    .bind(source.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(sqlx::query_as::<_, PendingResolutionRow>(
        "SELECT * FROM pending_resolutions WHERE id = ?",
    )
    .bind(result.last_insert_id() as i64)
    .fetch_one(&mut *conn)
    .await?)
}

/// Newest first.
pub async fn list_resolutions<'e, E>(
    executor: E,
    pending_issue_id: i64,
) -> Result<Vec<PendingResolutionRow>>
where
    E: Executor<'e, Database = MySql>,
{
    Ok(sqlx::query_as::<_, PendingResolutionRow>(
        "SELECT * FROM pending_resolutions WHERE pending_issue_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(pending_issue_id)
    .fetch_all(executor)
    .await?)
}

/// The newest resolution of every pending issue that has one.
pub async fn latest_resolutions(pool: &MySqlPool) -> Result<Vec<PendingResolutionRow>> {
    Ok(sqlx::query_as::<_, PendingResolutionRow>(LATEST_RESOLUTIONS_SQL)
        .fetch_all(pool)
        .await?)
}

// ids grow with created_at, so the highest id per issue is the newest row
const LATEST_RESOLUTIONS_SQL: &str = "SELECT * FROM pending_resolutions WHERE id IN \
     (SELECT MAX(id) FROM pending_resolutions GROUP BY pending_issue_id)";

// ────────────────────────────────────────────────────────────────────────────
// Rejected issues
// ────────────────────────────────────────────────────────────────────────────

pub async fn list_rejected(pool: &MySqlPool) -> Result<Vec<RejectedIssueRow>> {
    Ok(sqlx::query_as::<_, RejectedIssueRow>(
        "SELECT * FROM rejected_issues ORDER BY rejected_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?)
}

pub async fn get_rejected<'e, E>(executor: E, id: i64) -> Result<Option<RejectedIssueRow>>
where
    E: Executor<'e, Database = MySql>,
{
    Ok(
        sqlx::query_as::<_, RejectedIssueRow>("SELECT * FROM rejected_issues WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await?,
    )
}

pub async fn insert_rejected(
    conn: &mut MySqlConnection,
    pending: &PendingIssueRow,
    reason: Option<&str>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO rejected_issues
            (title, description, category, service_type, severity, reason, feedback_count)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&pending.title)
    .bind(&pending.description)
    .bind(&pending.category)
    .bind(&pending.service_type)
    .bind(&pending.severity)
    .bind(reason)
    .bind(pending.feedback_count)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_id() as i64)
}

pub async fn delete_rejected<'e, E>(executor: E, id: i64) -> Result<bool>
where
    E: Executor<'e, Database = MySql>,
{
    let result = sqlx::query("DELETE FROM rejected_issues WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_resolutions_is_one_query() {
        assert!(LATEST_RESOLUTIONS_SQL.contains("MAX(id)"));
        assert!(LATEST_RESOLUTIONS_SQL.contains("GROUP BY pending_issue_id"));
    }

    #[test]
    fn test_link_insert_is_plain_insert() {
        assert_eq!(
            link_insert_sql(LinkTarget::Pending(4)),
            "INSERT INTO feedback_issues (feedback_id, pending_issue_id) VALUES (?, ?)"
        );
        assert!(!link_insert_sql(LinkTarget::Issue(4)).contains("IGNORE"));
        assert!(!is_duplicate_link(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn test_schema_allows_one_link_per_target() {
        let schema = include_str!("../../migrations/20240215000000_unique_feedback_links.sql");
        assert!(schema.contains("UNIQUE (feedback_id, issue_id)"));
        assert!(schema.contains("UNIQUE (feedback_id, pending_issue_id)"));
    }

    #[test]
    fn test_link_target_columns() {
        assert_eq!(LinkTarget::Issue(3).column(), "issue_id");
        assert_eq!(LinkTarget::Issue(3).table(), "issues");
        assert_eq!(LinkTarget::Pending(9).column(), "pending_issue_id");
        assert_eq!(LinkTarget::Pending(9).table(), "pending_issues");
        assert_eq!(LinkTarget::Pending(9).id(), 9);
    }

    #[test]
    fn test_issue_list_query_filters() {
        let filter = IssueFilter {
            status: Some(IssueStatus::Open),
            service_type: Some(ServiceType::Atm),
        };
        assert_eq!(
            issue_list_query(&filter).sql(),
            "SELECT * FROM issues WHERE 1 = 1 AND status = ? AND service_type = ? \
             ORDER BY feedback_count DESC, created_at DESC"
        );
        assert_eq!(
            issue_list_query(&IssueFilter::default()).sql(),
            "SELECT * FROM issues WHERE 1 = 1 ORDER BY feedback_count DESC, created_at DESC"
        );
    }
}
