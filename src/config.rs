//! Terminal configuration
//!
//! Every field has a default, so a config file only needs to name what it
//! changes. Files are JSON.

use crate::buffer::Color;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lines kept in the buffer before the oldest are evicted
pub const DEFAULT_MAX_HEIGHT: usize = 1000;

/// Bytes buffered between two pipeline stages before the writer waits
pub const DEFAULT_PIPE_CAPACITY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Maximum number of lines held by the line buffer
    pub max_height: usize,
    /// Capacity of each in-memory pipe, in bytes
    pub pipe_capacity: usize,
    /// Suffix of an application package directory
    pub package_suffix: String,
    /// Directory searched for terminal applications
    pub terminal_apps_dir: String,
    /// General system directory, searched last
    pub system_dir: String,
    /// Base for relative command paths and redirection targets
    pub working_dir: String,
    /// Color of ordinary output
    pub default_color: Color,
    /// Color of messages the terminal writes itself (`^C`, notices)
    pub system_color: Color,
    /// Color of errors and stderr output
    pub error_color: Color,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            max_height: DEFAULT_MAX_HEIGHT,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            package_suffix: ".app".to_string(),
            terminal_apps_dir: "/System/Terminal".to_string(),
            system_dir: "/System".to_string(),
            working_dir: "/".to_string(),
            default_color: Color::White,
            system_color: Color::BrightBlack,
            error_color: Color::Red,
        }
    }
}

impl TerminalConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let mut config: TerminalConfig = serde_json::from_str(text)?;
        // Both must hold at least one unit
        config.max_height = config.max_height.max(1);
        config.pipe_capacity = config.pipe_capacity.max(1);
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> String {
        // Plain data with string keys
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
