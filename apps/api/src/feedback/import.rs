//! CSV bulk import of feedback.
//!
//! Columns are matched by exact header name (case-insensitive, trimmed).
//! Unknown columns are ignored and columns are never guessed from content.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::feedback::validation::{validate_new_feedback, NewFeedback, ValidFeedback};

const REQUIRED_COLUMNS: &[&str] = &["service_type", "rating", "review_text"];
const OPTIONAL_COLUMNS: &[&str] = &["customer_name", "location", "sentiment", "created_at"];

/// A row that could not be imported, with its 1-based line number in the file.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImportRowError {
    pub line: u64,
    pub message: String,
}

#[derive(Debug)]
pub struct ParsedCsv {
    pub rows: Vec<ValidFeedback>,
    pub errors: Vec<ImportRowError>,
}

#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub import_id: Uuid,
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<ImportRowError>,
}

/// Parses and validates a CSV upload. Fails as a whole only when the header
/// is unusable; individual bad rows are reported in `errors`.
pub fn parse_feedback_csv(bytes: &[u8]) -> Result<ParsedCsv, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| AppError::Validation(format!("Unreadable CSV header: {e}")))?
        .clone();

    let columns: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header(name), idx))
        .filter(|(name, _)| is_known_column(name))
        .collect();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !columns.contains_key(*c))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "CSV is missing required column(s): {}",
            missing.join(", ")
        )));
    }

    let mut rows = Vec::new();
    let mut errors = Vec::new();

    for (idx, record) in reader.records().enumerate() {
        // header is line 1
        let fallback_line = idx as u64 + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(fallback_line);
                errors.push(ImportRowError {
                    line,
                    message: format!("Malformed row: {e}"),
                });
                continue;
            }
        };
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(fallback_line);

        if record.iter().all(|f| f.is_empty()) {
            continue;
        }

        let field = |name: &str| -> Option<String> {
            columns
                .get(name)
                .and_then(|&i| record.get(i))
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        match build_row(&field) {
            Ok(row) => rows.push(row),
            Err(message) => errors.push(ImportRowError { line, message }),
        }
    }

    Ok(ParsedCsv { rows, errors })
}

fn build_row(field: &dyn Fn(&str) -> Option<String>) -> Result<ValidFeedback, String> {
    let rating_raw = field("rating").ok_or("rating is required")?;
    let rating = rating_raw
        .parse::<i32>()
        .map_err(|_| format!("rating '{rating_raw}' is not a whole number"))?;

    let created_at = match field("created_at") {
        Some(raw) => Some(
            parse_timestamp(&raw).ok_or_else(|| format!("created_at '{raw}' is not a valid date"))?,
        ),
        None => None,
    };

    let input = NewFeedback {
        customer_name: field("customer_name"),
        service_type: field("service_type").ok_or("service_type is required")?,
        rating,
        review_text: field("review_text").unwrap_or_default(),
        sentiment: field("sentiment"),
        status: None,
        location: field("location"),
        created_at,
    };

    validate_new_feedback(input).map_err(|e| match e {
        AppError::Validation(msg) => msg,
        other => other.to_string(),
    })
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (taken as UTC) and `YYYY-MM-DD`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn is_known_column(name: &str) -> bool {
    REQUIRED_COLUMNS.contains(&name) || OPTIONAL_COLUMNS.contains(&name)
}

fn normalize_header(name: &str) -> String {
    name.trim_start_matches('\u{feff}').trim().to_lowercase()
}
