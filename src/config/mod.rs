//! Configuration management.
//!
//! Values come from, in increasing precedence: built-in defaults, a TOML
//! file, and `STRATA_*` environment variables (a `.env` file is honored).

use crate::services::FusionOptions;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration for strata.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Directory for local state (`layer_weights.json`, exports).
    pub state_dir: PathBuf,
    /// Fan-out routing.
    pub router: RouterConfig,
    /// Query classification.
    pub classifier: ClassifierConfig,
    /// Query decomposition.
    pub decomposer: DecomposerConfig,
    /// Multi-hop execution.
    pub executor: ExecutorConfig,
    /// Result fusion.
    pub fusion: FusionOptions,
    /// Feedback learning.
    pub learning: LearningConfig,
    /// LLM provider.
    pub llm: LlmConfig,
    /// Logging and metrics.
    pub observability: ObservabilitySettings,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".strata"),
            router: RouterConfig::default(),
            classifier: ClassifierConfig::default(),
            decomposer: DecomposerConfig::default(),
            executor: ExecutorConfig::default(),
            fusion: FusionOptions::default(),
            learning: LearningConfig::default(),
            llm: LlmConfig::default(),
            observability: ObservabilitySettings::default(),
        }
    }
}

/// Router settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Per-layer call timeout.
    pub layer_timeout_ms: u64,
    /// Whether identical queries are served from the cache.
    pub cache_enabled: bool,
    /// Maximum cached queries (least recently used are evicted).
    pub cache_capacity: usize,
    /// Optional time-to-live for cache entries.
    pub cache_ttl_secs: Option<u64>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            layer_timeout_ms: 5_000,
            cache_enabled: true,
            cache_capacity: 1_000,
            cache_ttl_secs: None,
        }
    }
}

/// Classifier settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Time allowed for the model backend before falling back to keywords.
    pub llm_timeout_ms: u64,
    /// Model judgments below this confidence become `GENERAL`.
    pub min_confidence: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            llm_timeout_ms: 2_000,
            min_confidence: 0.5,
        }
    }
}

/// Decomposer settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DecomposerConfig {
    /// Signals required before a query counts as complex.
    pub complexity_threshold: usize,
    /// Upper bound on sub-queries per plan.
    pub max_sub_queries: usize,
    /// Time allowed for the model backend before falling back to the heuristic.
    pub llm_timeout_ms: u64,
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: 2,
            max_sub_queries: 4,
            llm_timeout_ms: 5_000,
        }
    }
}

/// Multi-hop executor settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Upper bound on one hop (classify + route + fuse).
    pub hop_timeout_ms: u64,
    /// Batch size within a hybrid level.
    pub max_concurrent_hops: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            hop_timeout_ms: 10_000,
            max_concurrent_hops: 3,
        }
    }
}

/// Feedback learning settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Multiplier applied to layers the user marked as correct.
    pub boost_factor: f64,
    /// Multiplier applied to predicted layers the user did not mark.
    pub decay_factor: f64,
    /// Optional lower clamp for learned weights.
    pub min_weight: Option<f64>,
    /// Optional upper clamp for learned weights.
    pub max_weight: Option<f64>,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            boost_factor: 1.1,
            decay_factor: 0.9,
            min_weight: None,
            max_weight: None,
        }
    }
}

/// Available LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    /// No model backend; keyword and heuristic strategies only.
    #[default]
    None,
    /// Anthropic Claude.
    Anthropic,
    /// Ollama (local).
    Ollama,
}

impl LlmProviderKind {
    /// Parses a provider string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" | "" => Some(Self::None),
            "anthropic" | "claude" => Some(Self::Anthropic),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }
}

/// LLM provider configuration.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which provider to use.
    pub provider: LlmProviderKind,
    /// Model name.
    pub model: Option<String>,
    /// API key (Anthropic also reads `ANTHROPIC_API_KEY`).
    pub api_key: Option<String>,
    /// Base URL for the provider.
    pub base_url: Option<String>,
    /// Request timeout.
    pub timeout_ms: Option<u64>,
    /// Connect timeout.
    pub connect_timeout_ms: Option<u64>,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

/// Observability settings from the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Logging settings.
    pub logging: Option<LoggingSettings>,
    /// Metrics settings.
    pub metrics: Option<MetricsSettings>,
}

/// Logging settings from the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `info` or `strata=debug`.
    pub level: Option<String>,
    /// Write logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Metrics settings from the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Whether the Prometheus exporter is installed.
    pub enabled: Option<bool>,
    /// Exporter listen port.
    pub port: Option<u16>,
}

impl StrataConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be parsed or fails validation.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the default location, then applies env overrides.
    ///
    /// Checks the platform config dir, then `~/.config/strata/config.toml`.
    /// Falls back to defaults when no readable file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let from_file = directories::BaseDirs::new().and_then(|base_dirs| {
            let candidates = [
                base_dirs.config_dir().join("strata").join("config.toml"),
                base_dirs
                    .home_dir()
                    .join(".config")
                    .join("strata")
                    .join("config.toml"),
            ];
            candidates
                .iter()
                .filter(|path| path.exists())
                .find_map(|path| match Self::load_from_file(path) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Ignoring config file");
                        None
                    },
                })
        });

        from_file.unwrap_or_else(Self::new).with_env_overrides()
    }

    /// Applies `STRATA_*` environment overrides (reading `.env` first).
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        let _ = dotenvy::dotenv();

        if let Some(dir) = env_string("STRATA_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }

        override_parsed(&mut self.router.layer_timeout_ms, "STRATA_LAYER_TIMEOUT_MS");
        if let Some(enabled) = env_bool("STRATA_CACHE_ENABLED") {
            self.router.cache_enabled = enabled;
        }
        override_parsed(&mut self.router.cache_capacity, "STRATA_CACHE_CAPACITY");
        if let Some(ttl) = env_parsed("STRATA_CACHE_TTL_SECS") {
            self.router.cache_ttl_secs = Some(ttl);
        }

        override_parsed(&mut self.classifier.llm_timeout_ms, "STRATA_CLASSIFIER_TIMEOUT_MS");
        override_parsed(&mut self.classifier.min_confidence, "STRATA_MIN_CONFIDENCE");

        override_parsed(
            &mut self.decomposer.complexity_threshold,
            "STRATA_COMPLEXITY_THRESHOLD",
        );
        override_parsed(&mut self.decomposer.max_sub_queries, "STRATA_MAX_SUB_QUERIES");
        override_parsed(&mut self.decomposer.llm_timeout_ms, "STRATA_DECOMPOSER_TIMEOUT_MS");

        override_parsed(&mut self.executor.hop_timeout_ms, "STRATA_HOP_TIMEOUT_MS");
        override_parsed(
            &mut self.executor.max_concurrent_hops,
            "STRATA_MAX_CONCURRENT_HOPS",
        );

        override_parsed(&mut self.fusion.min_score, "STRATA_MIN_SCORE");
        override_parsed(&mut self.fusion.token_budget, "STRATA_TOKEN_BUDGET");
        if let Some(enabled) = env_bool("STRATA_DIVERSITY_ENABLED") {
            self.fusion.diversity_enabled = enabled;
        }

        if let Some(provider) = env_string("STRATA_LLM_PROVIDER") {
            match LlmProviderKind::parse(&provider) {
                Some(kind) => self.llm.provider = kind,
                None => tracing::warn!(provider = %provider, "Unknown LLM provider, ignoring"),
            }
        }
        if let Some(model) = env_string("STRATA_LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(key) = env_string("STRATA_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = env_string("STRATA_LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }

        self
    }

    /// Checks ranges that would otherwise make the pipeline misbehave.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, why: &str| Err(Error::InvalidInput(format!("{field} {why}")));

        if self.router.cache_enabled && self.router.cache_capacity == 0 {
            return invalid("router.cache_capacity", "must be > 0 when the cache is enabled");
        }
        if !(0.0..=1.0).contains(&self.classifier.min_confidence) {
            return invalid("classifier.min_confidence", "must be within [0, 1]");
        }
        if self.decomposer.max_sub_queries == 0 {
            return invalid("decomposer.max_sub_queries", "must be > 0");
        }
        if self.executor.max_concurrent_hops == 0 {
            return invalid("executor.max_concurrent_hops", "must be > 0");
        }
        if !(0.0..=1.0).contains(&self.fusion.similarity_threshold) {
            return invalid("fusion.similarity_threshold", "must be within [0, 1]");
        }
        if self.learning.boost_factor <= 0.0 || self.learning.decay_factor <= 0.0 {
            return invalid("learning", "factors must be positive");
        }
        if let (Some(min), Some(max)) = (self.learning.min_weight, self.learning.max_weight) {
            if min > max {
                return invalid("learning.min_weight", "must not exceed learning.max_weight");
            }
        }
        Ok(())
    }

    /// Sets the state directory.
    #[must_use]
    pub fn with_state_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_dir = path.into();
        self
    }

    /// Path of the persisted weight document.
    #[must_use]
    pub fn weights_path(&self) -> PathBuf {
        self.state_dir.join(crate::services::WEIGHTS_FILE_NAME)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(key, value = %raw, "Ignoring unparsable environment override");
    }
    parsed
}

fn override_parsed<T: std::str::FromStr>(slot: &mut T, key: &str) {
    if let Some(value) = env_parsed(key) {
        *slot = value;
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).and_then(|v| match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = StrataConfig::new();
        assert_eq!(config.state_dir, PathBuf::from(".strata"));
        assert_eq!(config.router.cache_capacity, 1_000);
        assert!(config.router.cache_enabled);
        assert_eq!(config.classifier.llm_timeout_ms, 2_000);
        assert_eq!(config.decomposer.max_sub_queries, 4);
        assert_eq!(config.executor.max_concurrent_hops, 3);
        assert!((config.learning.boost_factor - 1.1).abs() < f64::EPSILON);
        assert_eq!(config.llm.provider, LlmProviderKind::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = StrataConfig::from_toml(
            r#"
            state_dir = "/tmp/strata-state"

            [router]
            layer_timeout_ms = 250
            cache_ttl_secs = 60

            [fusion]
            token_budget = 2000

            [llm]
            provider = "ollama"
            model = "llama3.2"
            "#,
        )
        .unwrap();

        assert_eq!(config.state_dir, PathBuf::from("/tmp/strata-state"));
        assert_eq!(config.router.layer_timeout_ms, 250);
        assert_eq!(config.router.cache_ttl_secs, Some(60));
        assert_eq!(config.router.cache_capacity, 1_000);
        assert_eq!(config.fusion.token_budget, 2_000);
        assert!((config.fusion.min_score - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.llm.provider, LlmProviderKind::Ollama);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = StrataConfig::from_toml("[executor]\nmax_concurrent_hops = 0\n");
        assert!(matches!(result, Err(Error::InvalidInput(msg)) if msg.contains("max_concurrent_hops")));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[decomposer]\ncomplexity_threshold = 3").unwrap();
        let config = StrataConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.decomposer.complexity_threshold, 3);
        assert_eq!(config.state_dir, PathBuf::from(".strata"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = StrataConfig::load_from_file(Path::new("/nonexistent/strata.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_api_key_redacted_in_debug() {
        let config = LlmConfig {
            api_key: Some("sk-ant-secret".to_string()),
            ..LlmConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-ant-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(LlmProviderKind::parse("Claude"), Some(LlmProviderKind::Anthropic));
        assert_eq!(LlmProviderKind::parse("off"), Some(LlmProviderKind::None));
        assert_eq!(LlmProviderKind::parse("gpt"), None);
    }

    #[test]
    fn test_weights_path() {
        let config = StrataConfig::new().with_state_dir("/var/lib/strata");
        assert_eq!(
            config.weights_path(),
            PathBuf::from("/var/lib/strata/layer_weights.json")
        );
    }
}
