//! Dashboard metrics over feedback and issues.
//!
//! MySQL groups the filtered feedback by every dimension the dashboard
//! reports, so the rows fetched are bounded by the number of groups. Rust
//! folds those groups into totals and ratios; issue counts come straight
//! from SQL.

pub mod handlers;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{MySql, MySqlPool, QueryBuilder};

use crate::feedback::repository::push_date_range;
use crate::models::feedback::{FeedbackStatGroup, FeedbackStatus, Sentiment, ServiceType};
use crate::models::issue::IssueRow;

pub const TOP_ISSUES_LIMIT: i64 = 5;

#[derive(Debug, Default, Deserialize)]
pub struct MetricsFilter {
    pub service_type: Option<ServiceType>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTrendPoint {
    pub date: NaiveDate,
    pub count: i64,
    pub average_rating: f64,
    pub negative: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackMetrics {
    pub total_feedback: i64,
    pub average_rating: f64,
    /// Percentage of feedback rated 4 or 5.
    pub satisfaction_rate: f64,
    pub by_sentiment: BTreeMap<String, i64>,
    pub by_service_type: BTreeMap<String, i64>,
    pub by_status: BTreeMap<String, i64>,
    pub by_rating: BTreeMap<i32, i64>,
    pub daily_trend: Vec<DailyTrendPoint>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub feedback: FeedbackMetrics,
    pub open_issues: i64,
    pub pending_issues: i64,
    pub top_issues: Vec<IssueRow>,
}

pub async fn load_feedback_stats(
    pool: &MySqlPool,
    filter: &MetricsFilter,
) -> anyhow::Result<Vec<FeedbackStatGroup>> {
    let mut qb = stats_query(filter);
    Ok(qb.build_query_as::<FeedbackStatGroup>().fetch_all(pool).await?)
}

fn stats_query(filter: &MetricsFilter) -> QueryBuilder<'static, MySql> {
    let mut qb = QueryBuilder::<MySql>::new(
        "SELECT service_type, rating, sentiment, status, DATE(created_at) AS day, \
         COUNT(*) AS count FROM feedback WHERE 1 = 1",
    );
    if let Some(service_type) = filter.service_type {
        qb.push(" AND service_type = ").push_bind(service_type.as_str());
    }
    push_date_range(&mut qb, filter.from, filter.to);
    qb.push(" GROUP BY service_type, rating, sentiment, status, day");
    qb
}

pub fn compute_feedback_metrics(groups: &[FeedbackStatGroup]) -> FeedbackMetrics {
    // every known bucket is present even when empty
    let mut by_sentiment: BTreeMap<String, i64> =
        Sentiment::ALL.iter().map(|s| (s.as_str().to_string(), 0)).collect();
    let mut by_service_type: BTreeMap<String, i64> =
        ServiceType::ALL.iter().map(|s| (s.as_str().to_string(), 0)).collect();
    let mut by_status: BTreeMap<String, i64> =
        FeedbackStatus::ALL.iter().map(|s| (s.as_str().to_string(), 0)).collect();
    let mut by_rating: BTreeMap<i32, i64> = (1..=5).map(|r| (r, 0)).collect();

    // date -> (count, rating sum, negative)
    let mut days: BTreeMap<NaiveDate, (i64, i64, i64)> = BTreeMap::new();
    let mut total = 0i64;
    let mut rating_sum = 0i64;
    let mut satisfied = 0i64;

    for group in groups {
        let count = group.count;
        *by_sentiment.entry(group.sentiment.clone()).or_default() += count;
        *by_service_type.entry(group.service_type.clone()).or_default() += count;
        *by_status.entry(group.status.clone()).or_default() += count;
        *by_rating.entry(group.rating).or_default() += count;

        total += count;
        rating_sum += i64::from(group.rating) * count;
        if group.rating >= 4 {
            satisfied += count;
        }

        let day = days.entry(group.day).or_default();
        day.0 += count;
        day.1 += i64::from(group.rating) * count;
        if group.sentiment == Sentiment::Negative.as_str() {
            day.2 += count;
        }
    }

    let daily_trend = days
        .into_iter()
        .map(|(date, (count, sum, negative))| DailyTrendPoint {
            date,
            count,
            average_rating: ratio(sum, count),
            negative,
        })
        .collect();

    FeedbackMetrics {
        total_feedback: total,
        average_rating: ratio(rating_sum, total),
        satisfaction_rate: ratio(satisfied * 100, total),
        by_sentiment,
        by_service_type,
        by_status,
        by_rating,
        daily_trend,
    }
}

/// `numerator / denominator` rounded to 2 decimals; 0 for an empty set.
fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(service: &str, rating: i32, day: u32, count: i64) -> FeedbackStatGroup {
        FeedbackStatGroup {
            service_type: service.to_string(),
            rating,
            sentiment: Sentiment::from_rating(rating).as_str().to_string(),
            status: "new".to_string(),
            day: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            count,
        }
    }

    #[test]
    fn test_empty_metrics_are_zeroed() {
        let m = compute_feedback_metrics(&[]);
        assert_eq!(m.total_feedback, 0);
        assert_eq!(m.average_rating, 0.0);
        assert_eq!(m.satisfaction_rate, 0.0);
        assert_eq!(m.by_sentiment["negative"], 0);
        assert_eq!(m.by_service_type["ATM"], 0);
        assert_eq!(m.by_rating.len(), 5);
        assert!(m.daily_trend.is_empty());
    }

    #[test]
    fn test_averages_and_satisfaction() {
        let groups = vec![
            group("ATM", 1, 1, 1),
            group("ATM", 5, 1, 1),
            group("OnlineBanking", 4, 2, 1),
        ];
        let m = compute_feedback_metrics(&groups);

        assert_eq!(m.total_feedback, 3);
        assert_eq!(m.average_rating, 3.33);
        assert_eq!(m.satisfaction_rate, 66.67);
        assert_eq!(m.by_service_type["ATM"], 2);
        assert_eq!(m.by_service_type["CoreBanking"], 0);
        assert_eq!(m.by_sentiment["negative"], 1);
        assert_eq!(m.by_sentiment["positive"], 2);
        assert_eq!(m.by_rating[&1], 1);
        assert_eq!(m.by_rating[&3], 0);
    }

    #[test]
    fn test_daily_trend_is_ordered_by_date() {
        let groups = vec![group("ATM", 2, 5, 1), group("ATM", 4, 3, 1), group("ATM", 1, 5, 1)];
        let m = compute_feedback_metrics(&groups);

        let dates: Vec<u32> = m.daily_trend.iter().map(|p| chrono::Datelike::day(&p.date)).collect();
        assert_eq!(dates, vec![3, 5]);
        assert_eq!(
            m.daily_trend[1],
            DailyTrendPoint {
                date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
                count: 2,
                average_rating: 1.5,
                negative: 2,
            }
        );
    }

    #[test]
    fn test_group_counts_are_weighted() {
        let groups = vec![group("ATM", 1, 4, 30), group("ATM", 5, 4, 10)];
        let m = compute_feedback_metrics(&groups);

        assert_eq!(m.total_feedback, 40);
        assert_eq!(m.average_rating, 2.0);
        assert_eq!(m.satisfaction_rate, 25.0);
        assert_eq!(m.by_sentiment["negative"], 30);
        assert_eq!(m.by_rating[&5], 10);
        assert_eq!(m.daily_trend.len(), 1);
        assert_eq!(m.daily_trend[0].count, 40);
        assert_eq!(m.daily_trend[0].negative, 30);
    }

    #[test]
    fn test_stats_query_groups_in_sql() {
        let qb = stats_query(&MetricsFilter::default());
        let sql = qb.sql();
        assert!(sql.contains("COUNT(*) AS count"));
        assert!(sql.ends_with(" GROUP BY service_type, rating, sentiment, status, day"));
    }

    #[test]
    fn test_stats_query_applies_filters() {
        let filter = MetricsFilter {
            service_type: Some(ServiceType::CoreBanking),
            from: NaiveDate::from_ymd_opt(2024, 1, 1),
            to: None,
        };
        let qb = stats_query(&filter);
        let sql = qb.sql();
        assert!(sql.contains("AND service_type = ?"));
        assert!(sql.contains("AND created_at >= ?"));
        assert!(!sql.contains("created_at < ?"));
    }
}
