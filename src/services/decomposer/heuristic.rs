//! Connector-splitting decomposition.

use super::DecompositionBackend;
use crate::Result;
use crate::models::{PlanSource, SubQuery};
use once_cell::sync::Lazy;
use regex::Regex;

#[allow(clippy::expect_used)]
static CONNECTOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(and|then)\b").expect("static regex: and/then"));

/// Splits a query on whole-word "and" / "then" into a linear chain.
///
/// `q{i}` depends on `q{i-1}`; priority descends by position. Parts beyond
/// the maximum are merged into the last sub-query. A query without a
/// connector becomes a single sub-query.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicDecomposer;

impl HeuristicDecomposer {
    /// Creates the heuristic.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Splits `query` into at most `max_sub_queries` chained sub-queries.
    #[must_use]
    pub fn split(&self, query: &str, max_sub_queries: usize) -> Vec<SubQuery> {
        let max = max_sub_queries.max(1);
        let parts = split_parts(query, max);

        if parts.len() <= 1 {
            return vec![SubQuery::new("q1", query.trim()).with_priority(1)];
        }

        let count = parts.len();
        parts
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let priority = u8::try_from(count - i).unwrap_or(u8::MAX);
                let sub = SubQuery::new(format!("q{}", i + 1), text).with_priority(priority);
                if i == 0 {
                    sub
                } else {
                    sub.depends_on(format!("q{i}"))
                }
            })
            .collect()
    }
}

impl DecompositionBackend for HeuristicDecomposer {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn source(&self) -> PlanSource {
        PlanSource::Heuristic
    }

    fn plan(&self, query: &str, max_sub_queries: usize) -> Result<Vec<SubQuery>> {
        Ok(self.split(query, max_sub_queries))
    }
}

/// Non-empty trimmed segments between connectors, at most `max` of them.
fn split_parts(query: &str, max: usize) -> Vec<&str> {
    let mut bounds: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    for connector in CONNECTOR.find_iter(query) {
        bounds.push((start, connector.start()));
        start = connector.end();
    }
    bounds.push((start, query.len()));

    let segments: Vec<(usize, usize)> = bounds
        .into_iter()
        .filter(|&(s, e)| !clean(&query[s..e]).is_empty())
        .collect();

    if segments.len() > max {
        let merged_start = segments[max - 1].0;
        let mut kept: Vec<&str> = segments[..max - 1]
            .iter()
            .map(|&(s, e)| clean(&query[s..e]))
            .collect();
        kept.push(clean(&query[merged_start..]));
        return kept;
    }

    segments
        .into_iter()
        .map(|(s, e)| clean(&query[s..e]))
        .collect()
}

fn clean(segment: &str) -> &str {
    segment.trim_matches(|c: char| c.is_whitespace() || c == ',' || c == ';')
}
