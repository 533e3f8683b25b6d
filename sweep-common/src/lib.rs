//! Types shared by every Sweep crate.
//!
//! - [`observability`]: tracing/logging initialisation for binaries and tests
//! - [`SweepError`] and [`Result`]: the error type surfaced at crate boundaries
//! - [`OutputFormat`]: how a run's progress is rendered
//!
//! # Examples
//!
//! ```rust
//! use sweep_common::{OutputFormat, SweepError};
//!
//! let format: OutputFormat = "json".parse().unwrap();
//! assert_eq!(format, OutputFormat::Json);
//!
//! let err = SweepError::BehaviorNotFound("twitter".into());
//! assert_eq!(err.to_string(), "No behavior named twitter");
//! ```
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub mod observability;

pub use sweep_core::TraversalError;

/// How progress values are printed by the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(SweepError::Config(format!("unknown output format: {other}"))),
        }
    }
}

/// Errors surfaced across the Sweep system.
#[derive(thiserror::Error, Debug)]
pub enum SweepError {
    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The browser driver reported an error.
    #[error("Driver error: {0}")]
    Driver(#[from] anyhow::Error),

    /// A traversal ended abnormally.
    #[error("Traversal error: {0}")]
    Traversal(#[from] TraversalError),

    /// `--behavior` named something the registry does not know.
    #[error("No behavior named {0}")]
    BehaviorNotFound(String),

    /// Operation exceeded the configured timeout.
    #[error("Timeout occurred")]
    Timeout,
}

/// Convenient alias for results that use [`SweepError`].
pub type Result<T> = std::result::Result<T, SweepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(" text ".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!(matches!("yaml".parse::<OutputFormat>(), Err(SweepError::Config(_))));
    }

    #[test]
    fn traversal_errors_convert() {
        let err: SweepError = TraversalError::structural("row vanished").into();
        assert!(matches!(err, SweepError::Traversal(_)));
        assert!(err.to_string().contains("row vanished"));
    }

    #[test]
    fn output_format_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&OutputFormat::Json).unwrap(), "\"json\"");
    }
}
