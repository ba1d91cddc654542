//! Error types for the regression suite
//!
//! `RegtestError` covers everything that stops a command. Per-instance
//! outcomes (sanity and extraction failures) live in `crate::sanity` and are
//! reported in a verdict instead of aborting the run.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for suite operations
#[derive(Error, Debug)]
pub enum RegtestError {
    /// I/O error while reading captured output or writing logs
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A rule pattern failed to compile
    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Zero or several test definitions matched the selector
    #[error("{count} tests selected, exactly 1 is required. Add option --name to narrow selection.")]
    Selection { count: usize, candidates: Vec<String> },

    /// No such system in the site configuration
    #[error("Unknown system: {0}")]
    UnknownSystem(String),

    /// No such partition in a system
    #[error("Unknown partition '{partition}' in system '{system}'")]
    UnknownPartition { system: String, partition: String },

    /// No such check in the check tables
    #[error("Unknown check: {0}")]
    UnknownCheck(String),

    /// No such benchmark descriptor
    #[error("Unknown benchmark: {0}")]
    UnknownBenchmark(String),

    /// Site configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Archive download failed
    #[error("Download of '{url}' failed: {message}")]
    Download { url: String, message: String },

    /// Downloaded archive does not match its declared checksum
    #[error("Checksum mismatch for '{path}': expected {expected}, got {actual}")]
    Checksum {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Affinity or GPU binding probe failed
    #[error("Probe error: {0}")]
    Probe(String),

    /// Invalid command line value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Serialization of output data failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Launching the test runner failed
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, RegtestError>;

impl RegtestError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RegtestError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for RegtestError {
    fn from(err: serde_json::Error) -> Self {
        RegtestError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for RegtestError {
    fn from(err: serde_yaml::Error) -> Self {
        RegtestError::Serialization(err.to_string())
    }
}
