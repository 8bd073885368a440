use serde::{Deserialize, Serialize};

use crate::detector::Detection;

/// Alert urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// A label explicitly signals a missing helmet
    Violation,
    /// People are present and no positive helmet detection accompanies them
    PossibleViolation,
}

/// Outcome of evaluating a detection list
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDecision {
    pub should_alert: bool,
    pub severity: Option<Severity>,
    pub message: String,
}

impl AlertDecision {
    fn quiet() -> Self {
        Self {
            should_alert: false,
            severity: None,
            message: String::new(),
        }
    }

    fn raise(severity: Severity, message: &str) -> Self {
        Self {
            should_alert: true,
            severity: Some(severity),
            message: message.to_string(),
        }
    }
}

pub const VIOLATION_MESSAGE: &str = "Violation detected: No helmet!";
pub const POSSIBLE_VIOLATION_MESSAGE: &str = "Person(s) without helmet detected!";

/// Labels that unambiguously signal a missing helmet, matched as
/// case-insensitive substrings of model output
const VIOLATION_KEYWORDS: &[&str] = &[
    "no_helmet",
    "without",
    "nohelmet",
    "violation",
    "unhelmeted",
    "no-helmet",
    "no helmet",
    "without helmet",
    "person_without_helmet",
    "helmet_missing",
    "helmet_off",
];

/// Decide whether a detection list warrants an alert.
///
/// Rules apply in order and the first match wins: an empty list never
/// alerts; any violation keyword raises a violation; otherwise a person
/// with no genuine positive helmet detection raises a possible violation.
/// Pure and deterministic.
pub fn evaluate(detections: &[Detection]) -> AlertDecision {
    if detections.is_empty() {
        return AlertDecision::quiet();
    }

    let labels: Vec<String> = detections
        .iter()
        .map(|d| d.label.to_lowercase())
        .collect();

    let violation = labels
        .iter()
        .any(|label| VIOLATION_KEYWORDS.iter().any(|kw| label.contains(kw)));
    if violation {
        return AlertDecision::raise(Severity::Violation, VIOLATION_MESSAGE);
    }

    let person_present = labels.iter().any(|label| label.contains("person"));
    let helmet_present = labels.iter().any(|label| {
        label.contains("helmet") && !label.contains("no") && !label.contains("missing")
    });
    if person_present && !helmet_present {
        return AlertDecision::raise(Severity::PossibleViolation, POSSIBLE_VIOLATION_MESSAGE);
    }

    AlertDecision::quiet()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(label: &str) -> Detection {
        Detection {
            label: label.to_string(),
            confidence: None,
            bbox: None,
        }
    }

    #[test]
    fn test_empty_list_never_alerts() {
        let decision = evaluate(&[]);
        assert!(!decision.should_alert);
        assert_eq!(decision.severity, None);
        assert!(decision.message.is_empty());
    }

    #[test]
    fn test_violation_keywords_raise_violation() {
        for label in [
            "no_helmet",
            "NO_HELMET",
            "person_without_helmet",
            "Helmet_Missing",
            "helmet_off",
            "worker without helmet",
            "safety-violation",
            "unhelmeted rider",
        ] {
            let decision = evaluate(&[detection(label)]);
            assert!(decision.should_alert, "label {:?} should alert", label);
            assert_eq!(decision.severity, Some(Severity::Violation));
            assert_eq!(decision.message, VIOLATION_MESSAGE);
        }
    }

    #[test]
    fn test_violation_keyword_matches_as_substring() {
        let decision = evaluate(&[detection("class: NoHelmet (0.91)")]);
        assert_eq!(decision.severity, Some(Severity::Violation));
    }

    #[test]
    fn test_person_without_helmet_is_possible_violation() {
        let decision = evaluate(&[detection("person")]);
        assert!(decision.should_alert);
        assert_eq!(decision.severity, Some(Severity::PossibleViolation));
        assert_eq!(decision.message, POSSIBLE_VIOLATION_MESSAGE);

        let decision = evaluate(&[detection("person"), detection("truck")]);
        assert_eq!(decision.severity, Some(Severity::PossibleViolation));
    }

    #[test]
    fn test_person_with_helmet_is_quiet() {
        let decision = evaluate(&[detection("person"), detection("helmet")]);
        assert!(!decision.should_alert);

        let decision = evaluate(&[detection("Person"), detection("Helmet (0.88)")]);
        assert!(!decision.should_alert);
    }

    #[test]
    fn test_negated_helmet_label_does_not_count_as_positive() {
        // "no helmet" matches a violation keyword outright
        let decision = evaluate(&[detection("person"), detection("no helmet")]);
        assert_eq!(decision.severity, Some(Severity::Violation));

        // "helmet missing" matches no violation keyword, but it is not a
        // positive helmet detection either, so rule 3 still fires
        let decision = evaluate(&[detection("person"), detection("helmet missing")]);
        assert_eq!(decision.severity, Some(Severity::PossibleViolation));
    }

    #[test]
    fn test_violation_takes_precedence_over_possible() {
        let decision = evaluate(&[
            detection("person"),
            detection("no_helmet"),
            detection("helmet"),
        ]);
        assert_eq!(decision.severity, Some(Severity::Violation));
        assert_eq!(decision.message, VIOLATION_MESSAGE);
    }

    #[test]
    fn test_non_person_labels_are_quiet() {
        let decision = evaluate(&[detection("car"), detection("dog")]);
        assert!(!decision.should_alert);
    }

    #[test]
    fn test_helmet_only_is_quiet() {
        let decision = evaluate(&[detection("helmet")]);
        assert!(!decision.should_alert);
    }
}
