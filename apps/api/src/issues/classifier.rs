//! Issue classification: pluggable, trait-based detection of the problems a
//! negative feedback reports.
//!
//! Default without an API key: `KeywordIssueClassifier` (deterministic rule table).
//! With LLM_API_KEY: `LlmIssueClassifier`, which falls back to keyword rules
//! whenever the LLM call fails or yields nothing usable.
//!
//! `AppState` holds an `Arc<dyn IssueClassifier>`, chosen at startup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::AppError;
use crate::issues::prompts::{CLASSIFY_PROMPT_TEMPLATE, CLASSIFY_ROLE};
use crate::llm_client::prompts::{json_system, UNTRUSTED_INPUT_INSTRUCTION};
use crate::llm_client::LlmClient;
use crate::models::feedback::FeedbackRow;
use crate::models::issue::{DetectionMethod, Severity};

/// Most issues accepted from a single feedback.
pub const MAX_ISSUES_PER_FEEDBACK: usize = 3;
const MAX_TITLE_CHARS: usize = 120;

// ────────────────────────────────────────────────────────────────────────────
// Output data models (shared across all classifier backends)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectedIssue {
    pub title: String,
    pub description: String,
    pub category: String,
    pub severity: Severity,
    pub suggested_resolution: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub issues: Vec<DetectedIssue>,
    pub method: DetectionMethod,
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait IssueClassifier: Send + Sync {
    /// `known_titles` are titles of open and pending issues on the same
    /// channel, offered so a backend can reuse an existing title verbatim.
    async fn classify(
        &self,
        feedback: &FeedbackRow,
        known_titles: &[String],
    ) -> Result<Classification, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// KeywordIssueClassifier
// ────────────────────────────────────────────────────────────────────────────

struct KeywordRule {
    category: &'static str,
    title: &'static str,
    description: &'static str,
    severity: Severity,
    resolution: &'static str,
    /// Whole words or phrases, lowercase.
    keywords: &'static [&'static str],
}

const RULES: &[KeywordRule] = &[
    KeywordRule {
        category: "security",
        title: "Suspected fraud or unauthorized activity",
        description: "Customers report transactions or account access they did not authorize.",
        severity: Severity::Critical,
        resolution: "Escalate to the fraud team, block affected cards or credentials, and contact the customer within 24 hours.",
        keywords: &["fraud", "unauthorized", "unauthorised", "scam", "hacked", "phishing", "stolen", "suspicious"],
    },
    KeywordRule {
        category: "atm_cash",
        title: "ATM cash dispensing failure",
        description: "ATMs debit the account without dispensing cash, or run out of cash.",
        severity: Severity::High,
        resolution: "Reconcile the ATM journal, auto-reverse unmatched debits, and review cash replenishment schedules.",
        keywords: &["no cash", "not dispensed", "did not dispense", "didn't dispense", "didnt dispense", "out of cash", "cash not", "money not"],
    },
    KeywordRule {
        category: "card_retention",
        title: "Card retained by ATM",
        description: "ATMs capture or retain customer cards during transactions.",
        severity: Severity::High,
        resolution: "Dispatch field service to inspect the card reader and offer expedited card replacement.",
        keywords: &["card stuck", "swallowed", "card retained", "ate my card", "captured my card", "kept my card"],
    },
    KeywordRule {
        category: "authentication",
        title: "Login and authentication failures",
        description: "Customers cannot log in, receive OTPs, or are locked out of their accounts.",
        severity: Severity::High,
        resolution: "Check identity provider and OTP gateway health, and streamline the account unlock flow.",
        keywords: &["login", "log in", "sign in", "password", "otp", "locked out", "authentication", "verification code"],
    },
    KeywordRule {
        category: "transactions",
        title: "Failed or delayed transactions",
        description: "Transfers or payments fail, stay pending, or are not credited to the beneficiary.",
        severity: Severity::High,
        resolution: "Trace failed transfers with the payment switch, auto-refund after the settlement window, and notify customers.",
        keywords: &["transfer", "transaction failed", "payment failed", "not credited", "pending transaction", "neft", "imps", "upi", "refund"],
    },
    KeywordRule {
        category: "availability",
        title: "Service downtime and slow performance",
        description: "The channel is unavailable, times out, or responds slowly.",
        severity: Severity::Medium,
        resolution: "Review monitoring for the reported window, capacity-plan peak hours, and publish status updates during outages.",
        keywords: &["down", "outage", "slow", "timeout", "timed out", "not working", "crash", "crashes", "unavailable", "out of service"],
    },
    KeywordRule {
        category: "fees",
        title: "Unexpected fees and charges",
        description: "Customers see fees or deductions they did not expect.",
        severity: Severity::Medium,
        resolution: "Audit the fee rules applied, refund incorrect charges, and clarify the fee schedule in customer communications.",
        keywords: &["fee", "fees", "charge", "charges", "charged", "deducted", "penalty", "hidden cost"],
    },
    KeywordRule {
        category: "statements",
        title: "Incorrect statements or balance",
        description: "Statements or displayed balances do not match the customer's records.",
        severity: Severity::Medium,
        resolution: "Reconcile the ledger against the statement run and correct any posting errors.",
        keywords: &["statement", "wrong balance", "incorrect balance", "balance mismatch", "wrong amount", "interest"],
    },
    KeywordRule {
        category: "customer_service",
        title: "Poor customer service experience",
        description: "Customers report rude, slow, or unhelpful support.",
        severity: Severity::Medium,
        resolution: "Review the support interactions, coach the staff involved, and follow up with the customer.",
        keywords: &["rude", "staff", "customer service", "support", "no response", "unhelpful", "waiting", "wait time", "queue", "call center", "call centre"],
    },
];

pub struct KeywordIssueClassifier;

#[async_trait]
impl IssueClassifier for KeywordIssueClassifier {
    async fn classify(
        &self,
        feedback: &FeedbackRow,
        _known_titles: &[String],
    ) -> Result<Classification, AppError> {
        Ok(Classification {
            issues: classify_by_keywords(&feedback.review_text, &feedback.service_type),
            method: DetectionMethod::Keyword,
        })
    }
}

/// Matches the rule table against the review text. Rules with more keyword
/// hits rank first; table order breaks ties. With no hits a single generic
/// complaint for the channel is returned.
pub fn classify_by_keywords(review_text: &str, service_type: &str) -> Vec<DetectedIssue> {
    let haystack = format!(" {} ", normalize_words(review_text));

    let mut hits: Vec<(usize, &KeywordRule)> = RULES
        .iter()
        .map(|rule| {
            let count = rule
                .keywords
                .iter()
                .filter(|kw| haystack.contains(&format!(" {} ", normalize_words(kw))))
                .count();
            (count, rule)
        })
        .filter(|(count, _)| *count > 0)
        .collect();
    // stable sort keeps table order for equal counts
    hits.sort_by(|a, b| b.0.cmp(&a.0));

    if hits.is_empty() {
        return vec![DetectedIssue {
            title: format!("General {service_type} complaint"),
            description: format!(
                "Negative {service_type} feedback that matched no known problem pattern: \"{}\"",
                snippet(review_text, 160)
            ),
            category: "general".to_string(),
            severity: Severity::Low,
            suggested_resolution: None,
        }];
    }

    hits.into_iter()
        .take(MAX_ISSUES_PER_FEEDBACK)
        .map(|(_, rule)| DetectedIssue {
            title: rule.title.to_string(),
            description: rule.description.to_string(),
            category: rule.category.to_string(),
            severity: rule.severity,
            suggested_resolution: Some(rule.resolution.to_string()),
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// LlmIssueClassifier
// ────────────────────────────────────────────────────────────────────────────

/// Raw issue shape the model returns. Lenient: every field is optional and
/// validated in `sanitize_llm_issues`.
#[derive(Debug, Deserialize)]
struct LlmIssue {
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    severity: Option<String>,
    suggested_resolution: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LlmClassification {
    #[serde(default)]
    issues: Vec<LlmIssue>,
}

pub struct LlmIssueClassifier {
    llm: LlmClient,
}

impl LlmIssueClassifier {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl IssueClassifier for LlmIssueClassifier {
    async fn classify(
        &self,
        feedback: &FeedbackRow,
        known_titles: &[String],
    ) -> Result<Classification, AppError> {
        let prompt = build_classify_prompt(feedback, known_titles);
        let system = json_system(CLASSIFY_ROLE);

        match self.llm.call_json::<LlmClassification>(&prompt, &system).await {
            Ok(parsed) => {
                let issues = sanitize_llm_issues(parsed.issues);
                if !issues.is_empty() {
                    return Ok(Classification {
                        issues,
                        method: DetectionMethod::Llm,
                    });
                }
                warn!(
                    "LLM returned no usable issues for feedback {}, using keyword rules",
                    feedback.id
                );
            }
            Err(e) => {
                warn!(
                    "LLM classification failed for feedback {}: {e}; using keyword rules",
                    feedback.id
                );
            }
        }

        KeywordIssueClassifier.classify(feedback, known_titles).await
    }
}

fn build_classify_prompt(feedback: &FeedbackRow, known_titles: &[String]) -> String {
    let known = if known_titles.is_empty() {
        "(none)".to_string()
    } else {
        known_titles
            .iter()
            .map(|t| format!("- {t}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    CLASSIFY_PROMPT_TEMPLATE
        .replace("{untrusted_instruction}", UNTRUSTED_INPUT_INSTRUCTION)
        .replace("{service_type}", &feedback.service_type)
        .replace("{rating}", &feedback.rating.to_string())
        .replace("{known_titles}", &known)
        // last, so placeholders inside customer text are left alone
        .replace("{review_text}", &feedback.review_text)
}

fn sanitize_llm_issues(raw: Vec<LlmIssue>) -> Vec<DetectedIssue> {
    raw.into_iter()
        .filter_map(|issue| {
            let title = issue.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
            let title: String = title.chars().take(MAX_TITLE_CHARS).collect();
            let description = issue
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| title.clone());
            let category = issue
                .category
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "general".to_string());
            let severity = issue
                .severity
                .and_then(|s| s.parse::<Severity>().ok())
                .unwrap_or(Severity::Medium);
            let suggested_resolution = issue
                .suggested_resolution
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty());
            Some(DetectedIssue {
                title,
                description,
                category,
                severity,
                suggested_resolution,
            })
        })
        .take(MAX_ISSUES_PER_FEEDBACK)
        .collect()
}

/// Lowercases and collapses every run of non-alphanumerics to one space.
fn normalize_words(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn feedback(text: &str) -> FeedbackRow {
        FeedbackRow {
            id: 42,
            customer_name: None,
            service_type: "ATM".to_string(),
            rating: 1,
            review_text: text.to_string(),
            sentiment: "negative".to_string(),
            status: "new".to_string(),
            source: "manual".to_string(),
            import_batch: None,
            location: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_cash_dispense_rule_matches() {
        let issues = classify_by_keywords("Money debited but cash not dispensed!", "ATM");
        assert_eq!(issues[0].category, "atm_cash");
        assert_eq!(issues[0].severity, Severity::High);
        assert!(issues[0].suggested_resolution.is_some());
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        // "download" must not trigger the "down" availability rule
        let issues = classify_by_keywords("Could not download the app update", "OnlineBanking");
        assert!(issues.iter().all(|i| i.category != "availability"));
    }

    #[test]
    fn test_more_hits_rank_first() {
        let issues = classify_by_keywords(
            "The app is slow, crashes constantly and was down all day. Support was rude.",
            "OnlineBanking",
        );
        assert_eq!(issues[0].category, "availability");
        assert!(issues.iter().any(|i| i.category == "customer_service"));
    }

    #[test]
    fn test_results_capped() {
        let issues = classify_by_keywords(
            "fraud on my account, login OTP never arrives, transfer failed, hidden fees charged, rude staff",
            "OnlineBanking",
        );
        assert_eq!(issues.len(), MAX_ISSUES_PER_FEEDBACK);
        // two hits each, in table order; single-hit rules are dropped
        let categories: Vec<&str> = issues.iter().map(|i| i.category.as_str()).collect();
        assert_eq!(categories, vec!["authentication", "fees", "customer_service"]);
    }

    #[test]
    fn test_no_match_yields_generic_issue() {
        let issues = classify_by_keywords("Terrible experience overall", "CoreBanking");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].title, "General CoreBanking complaint");
        assert_eq!(issues[0].category, "general");
        assert_eq!(issues[0].severity, Severity::Low);
        assert!(issues[0].description.contains("Terrible experience overall"));
    }

    #[test]
    fn test_sanitize_drops_untitled_and_defaults_fields() {
        let raw = vec![
            LlmIssue {
                title: Some("  ".to_string()),
                description: None,
                category: None,
                severity: None,
                suggested_resolution: None,
            },
            LlmIssue {
                title: Some("OTP delays".to_string()),
                description: None,
                category: Some("Authentication".to_string()),
                severity: Some("HIGH".to_string()),
                suggested_resolution: Some("".to_string()),
            },
        ];
        let issues = sanitize_llm_issues(raw);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].title, "OTP delays");
        assert_eq!(issues[0].description, "OTP delays");
        assert_eq!(issues[0].category, "authentication");
        assert_eq!(issues[0].severity, Severity::High);
        assert!(issues[0].suggested_resolution.is_none());
    }

    #[test]
    fn test_prompt_lists_known_titles_and_keeps_customer_text_verbatim() {
        let fb = feedback("Card stuck {known_titles}");
        let prompt = build_classify_prompt(&fb, &["Card retained by ATM".to_string()]);
        assert!(prompt.contains("- Card retained by ATM"));
        assert!(prompt.contains("Card stuck {known_titles}"));
        assert!(prompt.contains("SERVICE CHANNEL: ATM"));
    }

    #[tokio::test]
    async fn test_keyword_classifier_reports_method() {
        let result = KeywordIssueClassifier
            .classify(&feedback("My card was swallowed"), &[])
            .await
            .unwrap();
        assert_eq!(result.method, DetectionMethod::Keyword);
        assert_eq!(result.issues[0].category, "card_retention");
    }

    #[tokio::test]
    async fn test_llm_classifier_uses_model_output() {
        let server = MockServer::start().await;
        let content = json!({"issues": [{
            "title": "Card retained by ATM",
            "description": "ATM kept the card",
            "category": "card_retention",
            "severity": "high",
            "suggested_resolution": "Inspect the card reader"
        }]})
        .to_string();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": content}}]
            })))
            .mount(&server)
            .await;

        let llm = LlmClient::new("k".into(), &server.uri(), "m".into()).unwrap();
        let result = LlmIssueClassifier::new(llm)
            .classify(&feedback("ATM kept my card"), &[])
            .await
            .unwrap();
        assert_eq!(result.method, DetectionMethod::Llm);
        assert_eq!(result.issues[0].title, "Card retained by ATM");
    }

    #[tokio::test]
    async fn test_llm_classifier_falls_back_on_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let llm = LlmClient::new("k".into(), &server.uri(), "m".into()).unwrap();
        let result = LlmIssueClassifier::new(llm)
            .classify(&feedback("Cash not dispensed"), &[])
            .await
            .unwrap();
        assert_eq!(result.method, DetectionMethod::Keyword);
        assert_eq!(result.issues[0].category, "atm_cash");
    }
}
