use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::feedback::{FeedbackRow, FeedbackStatus, Sentiment, ServiceType};

pub const MAX_REVIEW_LEN: usize = 5000;

/// Years accepted in `from`/`to` query filters. The upper bound leaves room
/// for the exclusive next-day bound.
const FILTER_YEARS: std::ops::RangeInclusive<i32> = 1000..=9998;

/// Raw feedback as submitted by a client or read from a CSV row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewFeedback {
    pub customer_name: Option<String>,
    pub service_type: String,
    pub rating: i32,
    pub review_text: String,
    pub sentiment: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Partial update body for PUT /api/feedback/:id. Absent fields are kept;
/// an empty string clears an optional text field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackPatch {
    pub customer_name: Option<String>,
    pub service_type: Option<String>,
    pub rating: Option<i32>,
    pub review_text: Option<String>,
    pub sentiment: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
}

/// Feedback that passed validation, with every enum parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidFeedback {
    pub customer_name: Option<String>,
    pub service_type: ServiceType,
    pub rating: i32,
    pub review_text: String,
    pub sentiment: Sentiment,
    pub status: FeedbackStatus,
    pub location: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

pub fn validate_new_feedback(input: NewFeedback) -> Result<ValidFeedback, AppError> {
    let service_type = parse_field::<ServiceType>(&input.service_type)?;
    validate_rating(input.rating)?;
    let review_text = validate_review_text(&input.review_text)?;
    let sentiment = match input.sentiment.as_deref().and_then(non_blank) {
        Some(s) => parse_field::<Sentiment>(s)?,
        None => Sentiment::from_rating(input.rating),
    };
    let status = match input.status.as_deref().and_then(non_blank) {
        Some(s) => parse_field::<FeedbackStatus>(s)?,
        None => FeedbackStatus::New,
    };

    if let Some(created_at) = input.created_at {
        validate_created_at(created_at)?;
    }

    Ok(ValidFeedback {
        customer_name: clean_optional(input.customer_name),
        service_type,
        rating: input.rating,
        review_text,
        sentiment,
        status,
        location: clean_optional(input.location),
        created_at: input.created_at,
    })
}

/// Merges a patch onto an existing row and validates the result.
/// A changed rating without an explicit sentiment re-derives the sentiment.
pub fn apply_patch(existing: &FeedbackRow, patch: FeedbackPatch) -> Result<ValidFeedback, AppError> {
    let rating = patch.rating.unwrap_or(existing.rating);
    validate_rating(rating)?;

    let service_type = parse_field::<ServiceType>(
        patch
            .service_type
            .as_deref()
            .unwrap_or(&existing.service_type),
    )?;
    let review_text =
        validate_review_text(patch.review_text.as_deref().unwrap_or(&existing.review_text))?;

    let sentiment = match patch.sentiment.as_deref().and_then(non_blank) {
        Some(s) => parse_field::<Sentiment>(s)?,
        None if rating != existing.rating => Sentiment::from_rating(rating),
        None => parse_field::<Sentiment>(&existing.sentiment)?,
    };
    let status = parse_field::<FeedbackStatus>(
        patch
            .status
            .as_deref()
            .and_then(non_blank)
            .unwrap_or(&existing.status),
    )?;

    Ok(ValidFeedback {
        customer_name: match patch.customer_name {
            Some(v) => clean_optional(Some(v)),
            None => existing.customer_name.clone(),
        },
        service_type,
        rating,
        review_text,
        sentiment,
        status,
        location: match patch.location {
            Some(v) => clean_optional(Some(v)),
            None => existing.location.clone(),
        },
        created_at: Some(existing.created_at),
    })
}

pub fn validate_rating(rating: i32) -> Result<(), AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::Validation(format!(
            "rating must be between 1 and 5, got {rating}"
        )));
    }
    Ok(())
}

/// Returns the trimmed review text.
pub fn validate_review_text(text: &str) -> Result<String, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Validation(
            "review_text cannot be empty".to_string(),
        ));
    }
    let len = text.chars().count();
    if len > MAX_REVIEW_LEN {
        return Err(AppError::Validation(format!(
            "review_text is {len} characters (max {MAX_REVIEW_LEN})"
        )));
    }
    Ok(text.to_string())
}

/// `created_at` is stored as a MySQL `TIMESTAMP`, which only holds
/// 1970-01-01 00:00:01 to 2038-01-19 03:14:07 UTC.
pub fn validate_created_at(created_at: DateTime<Utc>) -> Result<(), AppError> {
    let earliest = Utc.timestamp_opt(1, 0).single();
    let latest = Utc.timestamp_opt(i64::from(i32::MAX), 0).single();
    let in_range = matches!(
        (earliest, latest),
        (Some(lo), Some(hi)) if (lo..=hi).contains(&created_at)
    );
    if !in_range {
        return Err(AppError::Validation(format!(
            "created_at {} is outside the supported range 1970-01-01 to 2038-01-19",
            created_at.to_rfc3339()
        )));
    }
    Ok(())
}

/// Checks `from`/`to` query filters before they are bound into SQL.
pub fn validate_date_filter(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<(), AppError> {
    for (name, date) in [("from", from), ("to", to)] {
        if let Some(date) = date {
            if !FILTER_YEARS.contains(&date.year()) {
                return Err(AppError::Validation(format!(
                    "{name} date {date} must fall between years {} and {}",
                    FILTER_YEARS.start(),
                    FILTER_YEARS.end()
                )));
            }
        }
    }
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::Validation(format!(
                "from ({from}) must not be after to ({to})"
            )));
        }
    }
    Ok(())
}

pub fn parse_field<T>(value: &str) -> Result<T, AppError>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse::<T>().map_err(AppError::Validation)
}

fn non_blank(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
