//! World settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage tuning for a [`World`](crate::ecs::World).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    /// Columns added to an archetype when a spawn finds no free column.
    pub alloc_chunk_size: usize,
    /// Uninitialized columns allocated when an archetype is first created.
    pub reserve_columns: usize,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            alloc_chunk_size: 64,
            reserve_columns: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings json")]
    Parse(#[from] serde_json::Error),

    #[error("alloc_chunk_size must be at least 1")]
    ZeroChunkSize,
}

impl WorldSettings {
    /// Parse and validate settings. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.alloc_chunk_size == 0 {
            return Err(SettingsError::ZeroChunkSize);
        }
        Ok(())
    }
}
