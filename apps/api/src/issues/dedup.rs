use std::collections::BTreeSet;

use serde::Serialize;

/// Where a match candidate lives. Declaration order is match priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Issue,
    Pending,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TitleMatch {
    pub kind: CandidateKind,
    pub id: i64,
    pub score: f64,
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "the", "or", "of", "to", "in", "on", "for", "with", "at", "by", "from",
    "is", "are", "was", "were", "be", "my", "our", "your", "issue", "issues", "problem",
    "problems",
];

/// Lowercased content words of a title, with a naive plural strip so
/// "failures" and "failure" compare equal.
pub fn title_tokens(title: &str) -> BTreeSet<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(w))
        .map(|w| {
            if w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") {
                w[..w.len() - 1].to_string()
            } else {
                w.to_string()
            }
        })
        .collect()
}

/// Jaccard similarity over title tokens, 0.0 – 1.0.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    if a.trim().eq_ignore_ascii_case(b.trim()) && !a.trim().is_empty() {
        return 1.0;
    }
    let ta = title_tokens(a);
    let tb = title_tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    intersection as f64 / union as f64
}

/// Finds the candidate a detected title should be folded into.
///
/// Kinds are tried in priority order (approved issues, then pending, then
/// rejected); within a kind the highest score at or above `threshold` wins
/// and ties go to the earliest candidate.
pub fn find_match(title: &str, candidates: &[Candidate], threshold: f64) -> Option<TitleMatch> {
    for kind in [
        CandidateKind::Issue,
        CandidateKind::Pending,
        CandidateKind::Rejected,
    ] {
        let mut best: Option<TitleMatch> = None;
        for candidate in candidates.iter().filter(|c| c.kind == kind) {
            let score = title_similarity(title, &candidate.title);
            if score < threshold {
                continue;
            }
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(TitleMatch {
                    kind,
                    id: candidate.id,
                    score,
                });
            }
        }
        if best.is_some() {
            return best;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(kind: CandidateKind, id: i64, title: &str) -> Candidate {
        Candidate {
            kind,
            id,
            title: title.to_string(),
        }
    }

    #[test]
    fn test_tokens_drop_stopwords_and_plurals() {
        let tokens = title_tokens("Issues with the Login Failures");
        let expected: BTreeSet<String> = ["login", "failure"].iter().map(|s| s.to_string()).collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_identical_titles_score_one() {
        assert_eq!(title_similarity("Card retained by ATM", "card retained by atm "), 1.0);
    }

    #[test]
    fn test_disjoint_titles_score_zero() {
        assert_eq!(title_similarity("ATM cash shortage", "Login failures"), 0.0);
        assert_eq!(title_similarity("", "Login failures"), 0.0);
    }

    #[test]
    fn test_partial_overlap() {
        // {login, authentication, failure} vs {login, failure}
        let score = title_similarity("Login and authentication failures", "Login failure");
        assert!((score - 2.0 / 3.0).abs() < 1e-9, "score was {score}");
    }

    #[test]
    fn test_approved_issue_beats_better_pending_match() {
        let candidates = vec![
            cand(CandidateKind::Pending, 1, "ATM cash dispensing failure"),
            cand(CandidateKind::Issue, 2, "ATM cash dispensing failures reported"),
        ];
        let m = find_match("ATM cash dispensing failure", &candidates, 0.6).unwrap();
        assert_eq!(m.kind, CandidateKind::Issue);
        assert_eq!(m.id, 2);
    }

    #[test]
    fn test_best_score_wins_within_kind_and_ties_go_first() {
        let candidates = vec![
            cand(CandidateKind::Pending, 10, "Slow app performance today"),
            cand(CandidateKind::Pending, 11, "Slow app performance"),
            cand(CandidateKind::Pending, 12, "slow app performance"),
        ];
        let m = find_match("Slow app performance", &candidates, 0.5).unwrap();
        assert_eq!(m.id, 11);
        assert_eq!(m.score, 1.0);
    }

    #[test]
    fn test_rejected_match_is_reported_last() {
        let candidates = vec![cand(CandidateKind::Rejected, 5, "Unexpected fees and charges")];
        let m = find_match("Unexpected fee charges", &candidates, 0.6).unwrap();
        assert_eq!(m.kind, CandidateKind::Rejected);
    }

    #[test]
    fn test_below_threshold_is_no_match() {
        let candidates = vec![cand(CandidateKind::Issue, 1, "Card retained by ATM")];
        assert!(find_match("ATM cash dispensing failure", &candidates, 0.6).is_none());
    }
}
