//! Complexity signals for compound queries.
//!
//! Each signal counts at most once per query.

use crate::models::ComplexitySignal;
use once_cell::sync::Lazy;
use regex::Regex;

/// Words beyond which a query counts as long.
const LONG_QUERY_WORDS: usize = 10;

#[allow(clippy::expect_used)]
static FLOW_VOCABULARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(flows?|process(es)?|workflows?|pipelines?|lifecycles?|steps?|sequences?)\b",
    )
    .expect("static regex: flow vocabulary")
});

#[allow(clippy::expect_used)]
static SEQUENTIAL_CONNECTOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(then|after)\b").expect("static regex: then/after"));

#[allow(clippy::expect_used)]
static FROM_TO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfrom\s+\S.*?\s+to\s+\S").expect("static regex: from X to Y"));

#[allow(clippy::expect_used)]
static AND_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\band\b").expect("static regex: and"));

#[allow(clippy::expect_used)]
static HOW_DOES_WORK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bhow\s+(does|do)\s+\S.*?\bwork").expect("static regex: how does X work")
});

/// Returns the signals that fire for `query`, in a fixed order.
#[must_use]
pub fn detect_signals(query: &str) -> Vec<ComplexitySignal> {
    let mut signals = Vec::new();

    if FLOW_VOCABULARY.is_match(query) {
        signals.push(ComplexitySignal::FlowVocabulary);
    }
    if SEQUENTIAL_CONNECTOR.is_match(query) {
        signals.push(ComplexitySignal::SequentialConnector);
    }
    if FROM_TO.is_match(query) {
        signals.push(ComplexitySignal::FromToPattern);
    }
    let clauses = AND_SEPARATOR
        .split(query)
        .filter(|clause| !clause.trim().is_empty())
        .count();
    if clauses > 2 {
        signals.push(ComplexitySignal::ManyClauses);
    }
    if HOW_DOES_WORK.is_match(query) {
        signals.push(ComplexitySignal::HowDoesItWork);
    }
    if query.split_whitespace().count() > LONG_QUERY_WORDS {
        signals.push(ComplexitySignal::LongQuery);
    }
    if query.matches('?').count() > 1 {
        signals.push(ComplexitySignal::MultipleQuestions);
    }

    signals
}
