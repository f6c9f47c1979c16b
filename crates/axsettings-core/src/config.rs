//! Engine tuning knobs

use crate::deadline::Deadline;
use crate::error::{Error, ErrorCode, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Budget for a whole operation when the caller does not pass one.
    pub default_timeout_ms: u64,
    /// Upper bound for each navigation step within the shared budget.
    pub step_timeout_ms: u64,
    pub search_depth: usize,
    /// Toolbar "Back" presses allowed when unwinding to a selected category.
    pub back_press_limit: usize,
    pub back_press_settle_ms: u64,
    /// Launch the target application without bringing it to the front.
    pub launch_hidden: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 8000,
            step_timeout_ms: 2000,
            search_depth: 30,
            back_press_limit: 8,
            back_press_settle_ms: 250,
            launch_hidden: true,
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            Error::new(
                ErrorCode::InvalidValue,
                format!("Invalid config {}: {}", path.display(), e),
            )
        })
    }

    pub fn default_deadline(&self) -> Deadline {
        Deadline::after_ms(self.default_timeout_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn back_press_settle(&self) -> Duration {
        Duration::from_millis(self.back_press_settle_ms)
    }
}
