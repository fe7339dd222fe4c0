use std::sync::Mutex;

use super::ArtifactStore;
use crate::error::{PipelineError, Result};

/// Process-local store for tests
pub struct MemoryStore<T> {
    slot: Mutex<Option<T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self { slot: Mutex::new(None) }
    }

    pub fn with(artifact: T) -> Self {
        Self {
            slot: Mutex::new(Some(artifact)),
        }
    }
}

impl<T: Clone> ArtifactStore<T> for MemoryStore<T> {
    fn load(&self) -> Result<Option<T>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| PipelineError::Config("artifact store lock poisoned".to_string()))?;
        Ok(slot.clone())
    }

    fn save(&self, artifact: &T) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| PipelineError::Config("artifact store lock poisoned".to_string()))?;
        *slot = Some(artifact.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
