//! LLM client abstraction.
//!
//! Provides a unified blocking interface over language-model providers. The
//! classifier and decomposer call it from the blocking thread pool and race
//! it against a timeout, falling back to deterministic heuristics.

mod anthropic;
mod ollama;
pub mod prompts;

pub use anthropic::AnthropicClient;
pub use ollama::OllamaClient;
pub use prompts::{
    CLASSIFICATION_PROMPT, DECOMPOSITION_PROMPT, build_decomposition_prompt, wrap_query,
};

use crate::models::{QueryJudgment, QueryType, SubQuery};
use crate::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Trait for LLM providers.
pub trait LlmProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion for the given prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    fn complete(&self, prompt: &str) -> Result<String>;

    /// Generates a completion with a system prompt.
    ///
    /// Default implementation concatenates system and user prompts.
    /// Providers should override this to use native system prompt support.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    fn complete_with_system(&self, system: &str, user: &str) -> Result<String> {
        let combined = format!("{system}\n\n---\n\nUser message:\n{user}");
        self.complete(&combined)
    }

    /// Classifies a query into a [`QueryType`] with confidence.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the response cannot be parsed.
    fn classify_query(&self, query: &str) -> Result<QueryJudgment> {
        let user = format!("Classify this query:\n\n{}", wrap_query(query));
        let response = self.complete_with_system(CLASSIFICATION_PROMPT, &user)?;
        parse_classification(&response)
    }

    /// Splits a compound query into at most `max_sub_queries` sub-queries.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the response cannot be parsed.
    fn decompose_query(&self, query: &str, max_sub_queries: usize) -> Result<Vec<SubQuery>> {
        let system = build_decomposition_prompt(max_sub_queries);
        let user = format!("Decompose this query:\n\n{}", wrap_query(query));
        let response = self.complete_with_system(&system, &user)?;
        parse_decomposition(&response)
    }
}

impl<T: LlmProvider + ?Sized> LlmProvider for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt)
    }

    fn complete_with_system(&self, system: &str, user: &str) -> Result<String> {
        (**self).complete_with_system(system, user)
    }

    fn classify_query(&self, query: &str) -> Result<QueryJudgment> {
        (**self).classify_query(query)
    }

    fn decompose_query(&self, query: &str, max_sub_queries: usize) -> Result<Vec<SubQuery>> {
        (**self).decompose_query(query, max_sub_queries)
    }
}

/// HTTP client configuration for LLM providers.
#[derive(Debug, Clone, Copy)]
pub struct LlmHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl LlmHttpConfig {
    /// Loads HTTP configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Loads HTTP configuration from config file settings.
    #[must_use]
    pub fn from_config(config: &crate::config::LlmConfig) -> Self {
        let mut settings = Self::default();
        if let Some(timeout_ms) = config.timeout_ms {
            settings.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = config.connect_timeout_ms {
            settings.connect_timeout_ms = connect_timeout_ms;
        }
        settings
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(timeout_ms) = env_u64("STRATA_LLM_TIMEOUT_MS") {
            self.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = env_u64("STRATA_LLM_CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = connect_timeout_ms;
        }
        self
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Builds a blocking HTTP client for LLM requests with configured timeouts.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build LLM HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}

/// Builds the provider named in the configuration, if one is configured.
#[must_use]
pub fn provider_from_config(config: &crate::config::LlmConfig) -> Option<Arc<dyn LlmProvider>> {
    use crate::config::LlmProviderKind;

    let http = LlmHttpConfig::from_config(config).with_env_overrides();
    match config.provider {
        LlmProviderKind::None => None,
        LlmProviderKind::Anthropic => {
            let mut client = AnthropicClient::new().with_http_config(http);
            if let Some(key) = &config.api_key {
                client = client.with_api_key(key.clone());
            }
            if let Some(model) = &config.model {
                client = client.with_model(model.clone());
            }
            if let Some(url) = &config.base_url {
                client = client.with_endpoint(url.clone());
            }
            Some(Arc::new(client))
        },
        LlmProviderKind::Ollama => {
            let mut client = OllamaClient::new().with_http_config(http);
            if let Some(model) = &config.model {
                client = client.with_model(model.clone());
            }
            if let Some(url) = &config.base_url {
                client = client.with_endpoint(url.clone());
            }
            Some(Arc::new(client))
        },
    }
}

#[derive(Debug, Deserialize)]
struct RawJudgment {
    #[serde(rename = "type", alias = "query_type")]
    query_type: String,
    confidence: f32,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSubQuery {
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "text", alias = "question")]
    query: String,
    #[serde(default, alias = "depends_on", alias = "dependsOn")]
    dependencies: Vec<String>,
    #[serde(default)]
    priority: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDecomposition {
    List(Vec<RawSubQuery>),
    Wrapped {
        #[serde(alias = "subqueries", alias = "subQueries")]
        sub_queries: Vec<RawSubQuery>,
    },
}

/// Parses a `{type, confidence[, reasoning]}` classification response.
///
/// # Errors
///
/// Returns `InvalidInput` if the JSON is malformed or the type is unknown.
pub fn parse_classification(response: &str) -> Result<QueryJudgment> {
    let json_str = extract_json_from_response(response);
    let raw: RawJudgment = serde_json::from_str(json_str).map_err(|e| {
        Error::InvalidInput(format!("invalid classification JSON: {e}. Response: {response}"))
    })?;
    let query_type = QueryType::parse(&raw.query_type)
        .ok_or_else(|| Error::InvalidInput(format!("unknown query type '{}'", raw.query_type)))?;
    if !raw.confidence.is_finite() {
        return Err(Error::InvalidInput("confidence is not finite".to_string()));
    }

    Ok(QueryJudgment {
        query_type,
        confidence: raw.confidence.clamp(0.0, 1.0),
        reasoning: raw.reasoning.unwrap_or_default(),
    })
}

/// Parses a sub-query array (bare or wrapped in `{"sub_queries": [...]}`).
///
/// Missing ids are filled in as `q1..qn`; missing priorities descend by position.
///
/// # Errors
///
/// Returns `InvalidInput` if the JSON is malformed.
pub fn parse_decomposition(response: &str) -> Result<Vec<SubQuery>> {
    let json_str = extract_json_from_response(response);
    let raw: RawDecomposition = serde_json::from_str(json_str).map_err(|e| {
        Error::InvalidInput(format!("invalid decomposition JSON: {e}. Response: {response}"))
    })?;
    let list = match raw {
        RawDecomposition::List(list) | RawDecomposition::Wrapped { sub_queries: list } => list,
    };

    let count = list.len();
    Ok(list
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            let fallback_priority = u8::try_from(count.saturating_sub(i)).unwrap_or(u8::MAX);
            SubQuery {
                id: raw
                    .id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| format!("q{}", i + 1)),
                query: raw.query.trim().to_string(),
                dependencies: raw.dependencies,
                priority: raw.priority.unwrap_or(fallback_priority),
            }
        })
        .collect())
}

/// Extracts JSON from an LLM response, handling markdown code blocks and prose.
fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();

    // Fenced block, with or without a language marker
    if let Some(start) = trimmed.find("```") {
        let after_marker = &trimmed[start + 3..];
        let body_start = after_marker.find(['{', '[']).unwrap_or(0);
        let body = &after_marker[body_start..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    // Raw JSON: whichever bracket opens first decides object vs array
    let object = trimmed.find('{');
    let array = trimmed.find('[');
    let (open, close) = match (object, array) {
        (Some(o), Some(a)) if a < o => ('[', ']'),
        (Some(_), _) => ('{', '}'),
        (None, Some(_)) => ('[', ']'),
        (None, None) => return trimmed,
    };
    match (trimmed.find(open), trimmed.rfind(close)) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_raw() {
        let response = r#"{"key": "value"}"#;
        assert_eq!(extract_json_from_response(response), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_markdown() {
        let response = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(extract_json_from_response(response), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_extract_json_with_prefix() {
        let response = "Here is the result: {\"key\": \"value\"} hope this helps";
        assert_eq!(extract_json_from_response(response), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_array_of_objects() {
        let response = r#"Sure: [{"id": "q1"}, {"id": "q2"}]"#;
        assert_eq!(
            extract_json_from_response(response),
            r#"[{"id": "q1"}, {"id": "q2"}]"#
        );
    }

    #[test]
    fn test_parse_classification() {
        let judgment = parse_classification(
            r#"{"type": "ARCHITECTURAL", "confidence": 0.82, "reasoning": "mentions modules"}"#,
        )
        .unwrap();
        assert_eq!(judgment.query_type, QueryType::Architectural);
        assert!((judgment.confidence - 0.82).abs() < f32::EPSILON);
        assert_eq!(judgment.reasoning, "mentions modules");
    }

    #[test]
    fn test_parse_classification_without_reasoning() {
        let judgment = parse_classification(r#"{"type": "user", "confidence": 1.7}"#).unwrap();
        assert_eq!(judgment.query_type, QueryType::User);
        assert!((judgment.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_classification_rejects_unknown_type() {
        let result = parse_classification(r#"{"type": "weather", "confidence": 0.9}"#);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_parse_classification_rejects_garbage() {
        assert!(parse_classification("I think it's factual").is_err());
    }

    #[test]
    fn test_parse_decomposition_fills_ids_and_priorities() {
        let subs = parse_decomposition(
            r#"```json
            [
                {"query": "How does login work?"},
                {"id": "reg", "query": "How does registration work?", "depends_on": ["q1"], "priority": 9}
            ]
            ```"#,
        )
        .unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].id, "q1");
        assert_eq!(subs[0].priority, 2);
        assert_eq!(subs[1].id, "reg");
        assert_eq!(subs[1].dependencies, vec!["q1"]);
        assert_eq!(subs[1].priority, 9);
    }

    #[test]
    fn test_parse_decomposition_wrapped() {
        let subs =
            parse_decomposition(r#"{"sub_queries": [{"id": "a", "text": "x"}]}"#).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].query, "x");
    }
}
