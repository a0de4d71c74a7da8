//! Keyword-based query classification.
//!
//! Deterministic, allocation-light and fast; used on its own when no model is
//! configured and as the fallback whenever the model path fails.

use super::ClassificationBackend;
use crate::Result;
use crate::models::{DetectionSource, QueryJudgment, QueryType};

/// Confidence for a single keyword hit.
const BASE_CONFIDENCE: f32 = 0.7;
/// Added per extra keyword of the winning type.
const EXTRA_KEYWORD_BONUS: f32 = 0.05;
/// Ceiling for keyword confidence.
const MAX_CONFIDENCE: f32 = 0.9;
/// Confidence when nothing matches.
const GENERAL_CONFIDENCE: f32 = 0.5;

/// Rules in priority order; the first type with any hit wins.
const RULES: &[(QueryType, &[&str])] = &[
    (
        QueryType::User,
        &[
            "my preferred",
            "my preference",
            "my expertise",
            "i prefer",
            "my favorite",
            "my style",
        ],
    ),
    (
        QueryType::Historical,
        &[
            "decision",
            "why did we",
            "history",
            "previously",
            "last time",
            "when did we",
        ],
    ),
    (
        QueryType::Architectural,
        &[
            "dependencies",
            "dependency",
            "architecture",
            "depends on",
            "coupling",
            "module structure",
        ],
    ),
    (
        QueryType::Procedural,
        &[
            "continue",
            "implement",
            "next step",
            "resume",
            "working on",
            "how do i",
            "how to",
        ],
    ),
    (
        QueryType::Factual,
        &["what is", "what are", "explain", "what does", "describe", "define"],
    ),
];

/// Classifies queries by case-insensitive keyword presence.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    /// Creates a keyword classifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classifies `query`. Never fails.
    #[must_use]
    pub fn judge_keywords(&self, query: &str) -> QueryJudgment {
        let lower = query.to_lowercase();

        for (query_type, keywords) in RULES {
            let hits: Vec<&str> = keywords
                .iter()
                .copied()
                .filter(|k| lower.contains(k))
                .collect();
            if let Some(first) = hits.first() {
                let extra = hits.len().saturating_sub(1);
                #[allow(clippy::cast_precision_loss)]
                let confidence =
                    (EXTRA_KEYWORD_BONUS.mul_add(extra as f32, BASE_CONFIDENCE)).min(MAX_CONFIDENCE);
                return QueryJudgment {
                    query_type: *query_type,
                    confidence,
                    reasoning: format!("keyword match: \"{first}\" ({} hit(s))", hits.len()),
                };
            }
        }

        QueryJudgment {
            query_type: QueryType::General,
            confidence: GENERAL_CONFIDENCE,
            reasoning: "no keyword matched; routing to all layers".to_string(),
        }
    }
}

impl ClassificationBackend for KeywordClassifier {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn source(&self) -> DetectionSource {
        DetectionSource::Keyword
    }

    fn judge(&self, query: &str) -> Result<QueryJudgment> {
        Ok(self.judge_keywords(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Continue working on auth", QueryType::Procedural; "continue")]
    #[test_case("How do I implement retries?", QueryType::Procedural; "how do i")]
    #[test_case("What is the login endpoint?", QueryType::Factual; "what is")]
    #[test_case("Explain the cache layer", QueryType::Factual; "explain")]
    #[test_case("Show the dependencies of billing", QueryType::Architectural; "dependencies")]
    #[test_case("Describe the architecture", QueryType::Architectural; "architecture beats describe")]
    #[test_case("What is my preferred testing framework?", QueryType::User; "user beats factual")]
    #[test_case("Why did we choose PostgreSQL?", QueryType::Historical; "why did we")]
    #[test_case("What decision did we make on auth?", QueryType::Historical; "decision beats what")]
    #[test_case("hello there", QueryType::General; "no match")]
    #[test_case("", QueryType::General; "empty")]
    fn test_keyword_rules(query: &str, expected: QueryType) {
        assert_eq!(KeywordClassifier::new().judge_keywords(query).query_type, expected);
    }

    #[test]
    fn test_case_insensitive() {
        let judgment = KeywordClassifier::new().judge_keywords("CONTINUE THE MIGRATION");
        assert_eq!(judgment.query_type, QueryType::Procedural);
    }

    #[test]
    fn test_confidence_grows_with_hits_and_caps() {
        let classifier = KeywordClassifier::new();
        let one = classifier.judge_keywords("implement it");
        let two = classifier.judge_keywords("continue working on it");
        let many = classifier
            .judge_keywords("continue implement next step resume working on how do i how to");

        assert!((one.confidence - 0.7).abs() < 1e-6);
        assert!((two.confidence - 0.75).abs() < 1e-6);
        assert!((many.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_general_confidence() {
        let judgment = KeywordClassifier::new().judge_keywords("hello");
        assert!((judgment.confidence - 0.5).abs() < f32::EPSILON);
    }
}
