//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// No playable media URL could be resolved for a source.
    #[error("Resolution failed for {url}: {reason}")]
    ResolutionFailed { url: String, reason: String },

    /// The capture binary could not be launched.
    #[error("Failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The capture process ended with a failure status.
    #[error("Capture process exited with {}", exit_code_label(.code))]
    ProcessExitedNonZero { code: Option<i32> },

    /// Every allowed attempt failed.
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Persistence failed while {op} {}: {source}", .path.display())]
    Persistence {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Registry(#[from] crate::registry::RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl Error {
    pub fn resolution(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResolutionFailed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn persistence(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Persistence {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short, stable classification used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ResolutionFailed { .. } => "resolution_failed",
            Self::SpawnFailed { .. } => "spawn_failed",
            Self::ProcessExitedNonZero { .. } => "process_exited_non_zero",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::Persistence { .. } => "persistence_failed",
            Self::Serialization(_) => "serialization",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::NotFound { .. } => "not_found",
            Self::Configuration(_) => "configuration",
            Self::Registry(_) => "registry",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }

    /// Whether a session should spend a retry on this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SpawnFailed { .. } | Self::ProcessExitedNonZero { .. } | Self::Io(_) | Self::Other(_)
        )
    }
}
