//! Project settings, read from `pcbprobe.json` next to the state files.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, Result};

pub const SETTINGS_FILE: &str = "pcbprobe.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Create unknown components when a connection references them.
    /// When off, such connections fail with `UnknownComponent`.
    pub implicit_components: bool,
    /// Zero-pad single-digit reference numbers (`D4` -> `D04`).
    pub pad_references: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            implicit_components: true,
            pad_references: false,
        }
    }
}

impl Settings {
    /// Load settings from `dir`, falling back to defaults when the file is absent.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        let settings: Settings = serde_json::from_str(&text)
            .map_err(|e| ProbeError::corrupt(&path, e.to_string()))?;
        tracing::debug!("Loaded settings from {}: {:?}", path.display(), settings);
        Ok(settings)
    }
}
