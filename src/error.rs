//! Error types
//!
//! Nothing here crosses the consumer-facing entry points of the terminal:
//! those turn every failure into an exit code or a buffer line. These types
//! are used at the seams below that surface (process host, config loading,
//! file system snapshots).

use thiserror::Error;

/// Why a process could not be started
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    /// The host has no program registered under this identifier
    #[error("unknown application: {0}")]
    UnknownApplication(String),
    /// The host refused to start the process
    #[error("{app}: {reason}")]
    Rejected { app: String, reason: String },
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// File system snapshot errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_error_display() {
        let err = StartError::UnknownApplication("frob".into());
        assert_eq!(err.to_string(), "unknown application: frob");

        let err = StartError::Rejected {
            app: "echo".into(),
            reason: "host is shutting down".into(),
        };
        assert_eq!(err.to_string(), "echo: host is shutting down");
    }

    #[test]
    fn test_config_error_from_json() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: ConfigError = json_err.into();
        assert!(err.to_string().starts_with("invalid config:"));
    }
}
