//! Governance log contract and in-memory implementation.
//!
//! The governance log is an append-only audit trail. Feedback records are
//! written here (tagged `type = "feedback"`) and historical or architectural
//! queries read from it through [`GovernanceLayer`].

use super::MemoryLayer;
use crate::models::{LayerId, LayerItem, MemoryItem};
use crate::{Error, Result, current_timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Metadata key holding an entry's type tag.
pub const ENTRY_TYPE_KEY: &str = "type";

/// One append-only governance entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceEntry {
    /// Entry id (UUID v4).
    pub id: String,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Agent that wrote the entry.
    pub agent: String,
    /// Action performed.
    pub action: String,
    /// Action result payload.
    pub result: serde_json::Value,
    /// Free-form metadata, including the `type` tag.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl GovernanceEntry {
    /// Returns the `type` tag, if present.
    #[must_use]
    pub fn entry_type(&self) -> Option<&str> {
        self.metadata
            .get(ENTRY_TYPE_KEY)
            .and_then(serde_json::Value::as_str)
    }
}

/// Filter for [`GovernanceLog::read_entries`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    /// Only entries with this `type` tag.
    pub entry_type: Option<String>,
    /// Skip entries with this `type` tag.
    pub exclude_type: Option<String>,
    /// Only entries written by this agent.
    pub agent: Option<String>,
    /// At most this many entries.
    pub limit: Option<usize>,
}

impl EntryFilter {
    /// Creates an empty filter (matches all).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entry_type: None,
            exclude_type: None,
            agent: None,
            limit: None,
        }
    }

    /// Filters by type tag.
    #[must_use]
    pub fn with_type(mut self, entry_type: impl Into<String>) -> Self {
        self.entry_type = Some(entry_type.into());
        self
    }

    /// Skips entries carrying this type tag.
    #[must_use]
    pub fn without_type(mut self, entry_type: impl Into<String>) -> Self {
        self.exclude_type = Some(entry_type.into());
        self
    }

    /// Filters by agent.
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Limits the number of entries.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if the entry passes the type and agent filters.
    ///
    /// The limit is applied by the log after matching.
    #[must_use]
    pub fn matches(&self, entry: &GovernanceEntry) -> bool {
        let type_ok = self
            .entry_type
            .as_deref()
            .is_none_or(|t| entry.entry_type() == Some(t));
        let excluded = self
            .exclude_type
            .as_deref()
            .is_some_and(|t| entry.entry_type() == Some(t));
        let agent_ok = self.agent.as_deref().is_none_or(|a| entry.agent == a);
        type_ok && !excluded && agent_ok
    }
}

/// Append-only audit log contract.
#[async_trait]
pub trait GovernanceLog: Send + Sync {
    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be stored.
    async fn append_entry(
        &self,
        agent: &str,
        action: &str,
        result: serde_json::Value,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<()>;

    /// Reads entries matching `filter`, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    async fn read_entries(&self, filter: &EntryFilter) -> Result<Vec<GovernanceEntry>>;
}

/// Process-local governance log.
///
/// Entries live in insertion order behind an `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryGovernanceLog {
    entries: RwLock<Vec<GovernanceEntry>>,
}

impl InMemoryGovernanceLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |entries| entries.len())
    }

    /// Returns true if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_error(operation: &str) -> Error {
        Error::OperationFailed {
            operation: operation.to_string(),
            cause: "governance log lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl GovernanceLog for InMemoryGovernanceLog {
    async fn append_entry(
        &self,
        agent: &str,
        action: &str,
        result: serde_json::Value,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<()> {
        let entry = GovernanceEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: current_timestamp(),
            agent: agent.to_string(),
            action: action.to_string(),
            result,
            metadata,
        };
        self.entries
            .write()
            .map_err(|_| Self::lock_error("governance_append"))?
            .push(entry);
        Ok(())
    }

    async fn read_entries(&self, filter: &EntryFilter) -> Result<Vec<GovernanceEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Self::lock_error("governance_read"))?;
        Ok(entries
            .iter()
            .rev()
            .filter(|entry| filter.matches(entry))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

/// Type tag of routing-feedback entries, hidden from the layer.
const FEEDBACK_TYPE: &str = "feedback";

/// Exposes a governance log as the `governance` memory layer.
///
/// Returns entries whose action or result mentions a query term. Feedback
/// entries are excluded before the scan limit applies.
pub struct GovernanceLayer {
    log: Arc<dyn GovernanceLog>,
    scan_limit: usize,
}

impl GovernanceLayer {
    /// Default number of recent entries scanned per query.
    pub const DEFAULT_SCAN_LIMIT: usize = 500;

    /// Creates a layer over `log`.
    #[must_use]
    pub fn new(log: Arc<dyn GovernanceLog>) -> Self {
        Self {
            log,
            scan_limit: Self::DEFAULT_SCAN_LIMIT,
        }
    }

    /// Sets how many recent entries are scanned.
    #[must_use]
    pub const fn with_scan_limit(mut self, limit: usize) -> Self {
        self.scan_limit = limit;
        self
    }

    fn entry_text(entry: &GovernanceEntry) -> String {
        let result = match &entry.result {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        format!("{}: {result}", entry.action)
    }
}

#[async_trait]
impl MemoryLayer for GovernanceLayer {
    fn id(&self) -> LayerId {
        LayerId::Governance
    }

    async fn query(&self, text: &str) -> Result<Vec<LayerItem>> {
        let terms: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 3)
            .map(str::to_lowercase)
            .collect();

        let entries = self
            .log
            .read_entries(
                &EntryFilter::new()
                    .without_type(FEEDBACK_TYPE)
                    .with_limit(self.scan_limit),
            )
            .await?;

        Ok(entries
            .iter()
            .filter_map(|entry| {
                let content = Self::entry_text(entry);
                let lower = content.to_lowercase();
                terms.iter().any(|t| lower.contains(t.as_str())).then(|| {
                    LayerItem::Memory(
                        MemoryItem::new(content, LayerId::Governance)
                            .with_timestamp(entry.timestamp)
                            .with_metadata("agent", entry.agent.clone().into())
                            .with_metadata("entry_id", entry.id.clone().into()),
                    )
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tagged(entry_type: &str) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::from([(ENTRY_TYPE_KEY.to_string(), json!(entry_type))])
    }

    #[tokio::test]
    async fn test_read_most_recent_first() {
        let log = InMemoryGovernanceLog::new();
        log.append_entry("a", "first", json!(1), BTreeMap::new())
            .await
            .unwrap();
        log.append_entry("a", "second", json!(2), BTreeMap::new())
            .await
            .unwrap();

        let entries = log.read_entries(&EntryFilter::new()).await.unwrap();
        assert_eq!(entries[0].action, "second");
        assert_eq!(entries[1].action, "first");
    }

    #[tokio::test]
    async fn test_filter_by_type_agent_and_limit() {
        let log = InMemoryGovernanceLog::new();
        for i in 0..5 {
            log.append_entry("learner", "fb", json!(i), tagged("feedback"))
                .await
                .unwrap();
        }
        log.append_entry("other", "decision", json!("x"), tagged("decision"))
            .await
            .unwrap();

        let feedback = log
            .read_entries(&EntryFilter::new().with_type("feedback"))
            .await
            .unwrap();
        assert_eq!(feedback.len(), 5);

        let limited = log
            .read_entries(&EntryFilter::new().with_agent("learner").with_limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].result, json!(4));
    }

    #[tokio::test]
    async fn test_governance_layer_matches_terms_and_skips_feedback() {
        let log = Arc::new(InMemoryGovernanceLog::new());
        log.append_entry(
            "architect",
            "decision",
            json!("Chose PostgreSQL over MongoDB"),
            tagged("decision"),
        )
        .await
        .unwrap();
        log.append_entry("learner", "routing_feedback", json!("postgresql"), tagged("feedback"))
            .await
            .unwrap();

        let layer = GovernanceLayer::new(log);
        let items = layer.query("Why did we pick PostgreSQL?").await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], LayerItem::Memory(m) if m.content.contains("PostgreSQL")));
    }

    #[tokio::test]
    async fn test_feedback_flood_does_not_hide_older_decisions() {
        let log = Arc::new(InMemoryGovernanceLog::new());
        log.append_entry(
            "architect",
            "decision",
            json!("Chose PostgreSQL for billing"),
            tagged("decision"),
        )
        .await
        .unwrap();
        for i in 0..20 {
            log.append_entry("learner", "routing_feedback", json!(i), tagged("feedback"))
                .await
                .unwrap();
        }

        let layer = GovernanceLayer::new(log).with_scan_limit(5);
        let items = layer.query("Why PostgreSQL for billing?").await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], LayerItem::Memory(m) if m.content.contains("billing")));
    }

    #[tokio::test]
    async fn test_exclude_type_applies_before_limit() {
        let log = InMemoryGovernanceLog::new();
        log.append_entry("a", "old", json!("x"), tagged("decision"))
            .await
            .unwrap();
        for _ in 0..3 {
            log.append_entry("b", "fb", json!("y"), tagged("feedback"))
                .await
                .unwrap();
        }

        let entries = log
            .read_entries(&EntryFilter::new().without_type("feedback").with_limit(1))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "old");
    }
}
