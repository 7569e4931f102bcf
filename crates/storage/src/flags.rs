use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use trafficlens_core::{Paths, Result};

#[derive(Debug, Serialize, Deserialize)]
struct FlagsFile {
    #[serde(rename = "isRecordingEnabled")]
    is_recording_enabled: bool,
}

/// Durable home of the recording flag.
///
/// One JSON file, one key. Read once at startup, before the event listener
/// sees any traffic, and written on every toggle.
#[derive(Debug, Clone)]
pub struct FlagStore {
    path: PathBuf,
}

impl FlagStore {
    pub fn new(paths: &Paths) -> Self {
        Self {
            path: paths.flags_file(),
        }
    }

    /// Returns the persisted flag, or None when nothing has been written yet.
    pub fn load(&self) -> Result<Option<bool>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let flags: FlagsFile = serde_json::from_str(&content)?;
        debug!(enabled = flags.is_recording_enabled, "recording flag loaded");
        Ok(Some(flags.is_recording_enabled))
    }

    pub fn save(&self, enabled: bool) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&FlagsFile {
            is_recording_enabled: enabled,
        })?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
