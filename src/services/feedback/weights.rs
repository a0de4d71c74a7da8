//! Persistence of learned layer weights.

use crate::models::{LayerId, LayerWeights};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// File name of the weights document under the state directory.
pub const WEIGHTS_FILE_NAME: &str = "layer_weights.json";

/// Loads and saves [`LayerWeights`].
pub trait WeightStore: Send + Sync {
    /// Loads stored weights; a store with nothing saved yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if stored weights exist but cannot be read.
    fn load(&self) -> Result<LayerWeights>;

    /// Replaces the stored weights.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights cannot be written.
    fn save(&self, weights: &LayerWeights) -> Result<()>;
}

/// Weights stored as a JSON object keyed by layer name.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so readers never observe a partial document.
#[derive(Debug, Clone)]
pub struct FileWeightStore {
    path: PathBuf,
}

impl FileWeightStore {
    /// Creates a store at an explicit path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store at `layer_weights.json` under `state_dir`.
    #[must_use]
    pub fn in_dir(state_dir: impl AsRef<Path>) -> Self {
        Self::new(state_dir.as_ref().join(WEIGHTS_FILE_NAME))
    }

    /// Path of the weights document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WeightStore for FileWeightStore {
    fn load(&self) -> Result<LayerWeights> {
        if !self.path.exists() {
            return Ok(LayerWeights::default());
        }

        let raw = fs::read_to_string(&self.path).map_err(|e| Error::OperationFailed {
            operation: "read_weights_file".to_string(),
            cause: e.to_string(),
        })?;

        // Unknown layer names are skipped so that older files keep loading.
        let stored: std::collections::BTreeMap<String, f64> =
            serde_json::from_str(&raw).map_err(|e| Error::OperationFailed {
                operation: "deserialize_weights".to_string(),
                cause: e.to_string(),
            })?;

        let mut weights = LayerWeights::default();
        for (name, weight) in stored {
            match LayerId::parse(&name) {
                Some(layer) => weights.set(layer, weight),
                None => tracing::warn!(layer = %name, "Skipping unknown layer in weights file"),
            }
        }
        Ok(weights)
    }

    fn save(&self, weights: &LayerWeights) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_state_dir".to_string(),
                cause: e.to_string(),
            })?;
        }

        let json = serde_json::to_string_pretty(weights).map_err(|e| Error::OperationFailed {
            operation: "serialize_weights".to_string(),
            cause: e.to_string(),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| Error::OperationFailed {
            operation: "write_weights_file".to_string(),
            cause: e.to_string(),
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::OperationFailed {
            operation: "rename_weights_file".to_string(),
            cause: e.to_string(),
        })?;

        tracing::debug!(path = %self.path.display(), "Saved layer weights");
        Ok(())
    }
}

/// Process-local weight store.
#[derive(Debug, Default)]
pub struct InMemoryWeightStore {
    weights: RwLock<Option<LayerWeights>>,
}

impl InMemoryWeightStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-loaded with `weights`.
    #[must_use]
    pub fn with_weights(weights: LayerWeights) -> Self {
        Self {
            weights: RwLock::new(Some(weights)),
        }
    }
}

impl WeightStore for InMemoryWeightStore {
    fn load(&self) -> Result<LayerWeights> {
        Ok(self
            .weights
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_default())
    }

    fn save(&self, weights: &LayerWeights) -> Result<()> {
        *self
            .weights
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(weights.clone());
        Ok(())
    }
}
