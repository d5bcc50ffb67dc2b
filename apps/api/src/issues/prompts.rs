// Issue triage LLM prompt templates.
// All prompts for the issues module are defined here.

pub const CLASSIFY_ROLE: &str = "\
You are a triage analyst for a retail bank. You read negative customer \
feedback about banking channels (ATM, OnlineBanking, CoreBanking) and name \
the concrete operational problems it reports, so support teams can fix them. \
Prefer short, reusable issue titles that describe the problem, not the customer.";

/// Replace `{service_type}`, `{rating}`, `{review_text}`, `{known_titles}` and
/// `{untrusted_instruction}` before sending.
pub const CLASSIFY_PROMPT_TEMPLATE: &str = r#"Identify the operational issues reported in this customer feedback.

{untrusted_instruction}

SERVICE CHANNEL: {service_type}
RATING (1-5): {rating}
FEEDBACK:
"""
{review_text}
"""

EXISTING ISSUE TITLES FOR THIS CHANNEL (reuse one EXACTLY if the feedback describes the same problem):
{known_titles}

Return a JSON object with this EXACT schema:
{
  "issues": [
    {
      "title": "short problem title, max 80 characters",
      "description": "one or two sentences describing the problem",
      "category": "atm_cash" | "card_retention" | "authentication" | "transactions" | "availability" | "fees" | "customer_service" | "statements" | "security" | "general",
      "severity": "low" | "medium" | "high" | "critical",
      "suggested_resolution": "concrete remediation steps for the bank's support team"
    }
  ]
}

RULES:
1. Report at most 3 issues. Report only problems actually stated in the feedback.
2. Use "critical" only for fraud, security breaches or loss of customer funds.
3. If an existing title fits, copy it character for character.
4. Return ONLY the JSON object."#;

pub const RESOLUTION_ROLE: &str = "\
You are a senior operations lead at a retail bank. You write practical, \
specific remediation plans for recurring customer-reported problems.";

/// Replace `{title}`, `{description}`, `{service_type}`, `{feedback_samples}`
/// and `{untrusted_instruction}` before sending.
pub const RESOLUTION_PROMPT_TEMPLATE: &str = r#"Draft a resolution plan for this customer-reported issue.

{untrusted_instruction}

ISSUE TITLE: {title}
DESCRIPTION: {description}
SERVICE CHANNEL: {service_type}

SAMPLE CUSTOMER FEEDBACK:
{feedback_samples}

Return a JSON object with this EXACT schema:
{
  "resolution": "numbered remediation steps, plain text, at most 150 words"
}"#;
