//! Sufficiency verdict parsing.
//!
//! The evaluator prompt asks the model to answer with three labelled lines:
//!
//! ```text
//! Response: YES|NO
//! Explanation: <text>
//! Additional Information Needed (if NO): <text>
//! ```
//!
//! [`parse_verdict`] extracts whichever markers are present. A missing
//! marker leaves its field empty; it is never an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static RESPONSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Response:\s*(YES|NO)").unwrap());
static EXPLANATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Explanation:\s*(.+)").unwrap());
static ADDITIONAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Additional Information Needed \(if NO\):\s*(.+)").unwrap());

/// The model's judgement on whether the retrieved context suffices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Yes,
    No,
    /// No `Response:` marker was found.
    Unknown,
}

/// Structured form of an evaluator response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SufficiencyVerdict {
    pub decision: Decision,
    pub explanation: Option<String>,
    pub additional_info_needed: Option<String>,
}

impl SufficiencyVerdict {
    pub fn is_sufficient(&self) -> bool {
        self.decision == Decision::Yes
    }
}

/// Parse raw evaluator output into a [`SufficiencyVerdict`].
pub fn parse_verdict(raw: &str) -> SufficiencyVerdict {
    let decision = match RESPONSE_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
    {
        Some("YES") => Decision::Yes,
        Some("NO") => Decision::No,
        _ => Decision::Unknown,
    };

    SufficiencyVerdict {
        decision,
        explanation: capture_trimmed(&EXPLANATION_RE, raw),
        additional_info_needed: capture_trimmed(&ADDITIONAL_RE, raw),
    }
}

fn capture_trimmed(re: &Regex, raw: &str) -> Option<String> {
    re.captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_yes_response() {
        let v = parse_verdict(
            "Response: YES\nExplanation: The pricing sheet covers it.\nAdditional Information Needed (if NO): N/A",
        );
        assert_eq!(v.decision, Decision::Yes);
        assert_eq!(v.explanation.as_deref(), Some("The pricing sheet covers it."));
        assert_eq!(v.additional_info_needed.as_deref(), Some("N/A"));
        assert!(v.is_sufficient());
    }

    #[test]
    fn parses_no_with_missing_info() {
        let v = parse_verdict(
            "Response: NO\nExplanation: Nothing about SLAs.\nAdditional Information Needed (if NO): Uptime commitments",
        );
        assert_eq!(v.decision, Decision::No);
        assert_eq!(
            v.additional_info_needed.as_deref(),
            Some("Uptime commitments")
        );
    }

    #[test]
    fn missing_explanation_keeps_decision() {
        let v = parse_verdict("Response: NO\nAdditional Information Needed (if NO): more");
        assert_eq!(v.decision, Decision::No);
        assert_eq!(v.explanation, None);
    }

    #[test]
    fn no_markers_is_unknown() {
        let v = parse_verdict("I think the context is probably fine.");
        assert_eq!(v.decision, Decision::Unknown);
        assert_eq!(v.explanation, None);
        assert_eq!(v.additional_info_needed, None);
        assert!(!v.is_sufficient());
    }

    #[test]
    fn empty_output_is_unknown() {
        assert_eq!(parse_verdict("").decision, Decision::Unknown);
    }

    #[test]
    fn lowercase_decision_is_not_accepted() {
        assert_eq!(parse_verdict("Response: yes").decision, Decision::Unknown);
    }

    #[test]
    fn marker_may_follow_preamble() {
        let v = parse_verdict("Let me check.\n\n**Evaluation**\nResponse:   YES\nExplanation:  ok  ");
        assert_eq!(v.decision, Decision::Yes);
        assert_eq!(v.explanation.as_deref(), Some("ok"));
    }
}
