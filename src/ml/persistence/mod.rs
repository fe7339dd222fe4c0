use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::data::ensure_parent;
use crate::error::Result;

#[cfg(test)]
mod memory;
#[cfg(test)]
pub use memory::MemoryStore;

/// Load/save seam for model artifacts.
///
/// Artifacts are single-writer: a save fully replaces the previous value and
/// callers serialize concurrent fits externally.
pub trait ArtifactStore<T> {
    fn load(&self) -> Result<Option<T>>;
    fn save(&self, artifact: &T) -> Result<()>;
    fn location(&self) -> String;
}

/// Pretty-printed JSON file, replaced atomically on save
pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> ArtifactStore<T> for JsonFileStore<T> {
    fn load(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            debug!("No artifact at {}", self.path.display());
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)?;
        let artifact = serde_json::from_str(&json)?;
        Ok(Some(artifact))
    }

    fn save(&self, artifact: &T) -> Result<()> {
        ensure_parent(&self.path)?;
        let json = to_sorted_json(artifact)?;

        // Readers never observe a half-written file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        info!("Saved artifact to {}", self.path.display());
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Pretty JSON with object keys in sorted order
pub fn to_sorted_json<T: Serialize>(value: &T) -> Result<String> {
    // serde_json::Value maps are BTreeMap-backed without preserve_order
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Write a JSON report (pretty, sorted keys), creating parent directories
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, to_sorted_json(value)?)?;
    debug!("Wrote {}", path.display());
    Ok(())
}
