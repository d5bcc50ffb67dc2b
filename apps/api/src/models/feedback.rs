use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

crate::string_enum!(
    /// Banking channel a feedback record refers to.
    ServiceType {
        Atm => "ATM",
        OnlineBanking => "OnlineBanking",
        CoreBanking => "CoreBanking",
    }
);

crate::string_enum!(Sentiment {
    Positive => "positive",
    Neutral => "neutral",
    Negative => "negative",
});

crate::string_enum!(FeedbackStatus {
    New => "new",
    InReview => "in_review",
    Resolved => "resolved",
});

crate::string_enum!(FeedbackSource {
    Manual => "manual",
    Csv => "csv",
});

crate::string_enum!(InteractionType {
    Viewed => "viewed",
    Responded => "responded",
    Escalated => "escalated",
    Resolved => "resolved",
});

impl Sentiment {
    /// Ratings of 2 or below are negative, 3 is neutral, 4 and above positive.
    pub fn from_rating(rating: i32) -> Self {
        match rating {
            i32::MIN..=2 => Sentiment::Negative,
            3 => Sentiment::Neutral,
            _ => Sentiment::Positive,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedbackRow {
    pub id: i64,
    pub customer_name: Option<String>,
    pub service_type: String,
    pub rating: i32,
    pub review_text: String,
    pub sentiment: String,
    pub status: String,
    pub source: String,
    pub import_batch: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeedbackRow {
    pub fn is_negative(&self) -> bool {
        self.sentiment == Sentiment::Negative.as_str()
    }
}

/// Feedback counted per (service, rating, sentiment, status, UTC day).
#[derive(Debug, Clone, FromRow)]
pub struct FeedbackStatGroup {
    pub service_type: String,
    pub rating: i32,
    pub sentiment: String,
    pub status: String,
    pub day: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InteractionRow {
    pub id: i64,
    pub employee_id: i64,
    pub feedback_id: i64,
    pub interaction_type: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_parsing_is_lenient() {
        assert_eq!("ATM".parse::<ServiceType>().unwrap(), ServiceType::Atm);
        assert_eq!("atm".parse::<ServiceType>().unwrap(), ServiceType::Atm);
        assert_eq!(
            "Online Banking".parse::<ServiceType>().unwrap(),
            ServiceType::OnlineBanking
        );
        assert_eq!(
            "core_banking".parse::<ServiceType>().unwrap(),
            ServiceType::CoreBanking
        );
    }

    #[test]
    fn test_unknown_service_type_lists_allowed_values() {
        let err = "Branch".parse::<ServiceType>().unwrap_err();
        assert!(err.contains("ATM, OnlineBanking, CoreBanking"), "{err}");
    }

    #[test]
    fn test_serde_uses_stored_representation() {
        assert_eq!(
            serde_json::to_string(&FeedbackStatus::InReview).unwrap(),
            "\"in_review\""
        );
        let parsed: ServiceType = serde_json::from_str("\"OnlineBanking\"").unwrap();
        assert_eq!(parsed, ServiceType::OnlineBanking);
    }

    #[test]
    fn test_sentiment_from_rating_boundaries() {
        assert_eq!(Sentiment::from_rating(1), Sentiment::Negative);
        assert_eq!(Sentiment::from_rating(2), Sentiment::Negative);
        assert_eq!(Sentiment::from_rating(3), Sentiment::Neutral);
        assert_eq!(Sentiment::from_rating(4), Sentiment::Positive);
        assert_eq!(Sentiment::from_rating(5), Sentiment::Positive);
    }
}
