//! Typed error hierarchy for tether.
//!
//! Three enums map onto the failure taxonomy of a compaction run:
//! - `TetherError`: fatal, returned to the caller (no artifact can be produced or read)
//! - `EvidenceError`: transient VCS failures, retried once and then degraded to "unavailable"
//! - `TransformError`: structural problems in the input text, degraded to a pass-through copy

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that propagate to the caller of the compaction engine.
#[derive(Debug, Error)]
pub enum TetherError {
    #[error("Invalid plan id '{0}': use letters, digits, '.', '_' or '-' (must start with a letter or digit)")]
    InvalidPlanId(String),

    #[error("Failed to write artifact at {path}: {source}")]
    ArtifactWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read artifact at {path}: {source}")]
    ArtifactReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse artifact at {path}: {source}")]
    ArtifactParseFailed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to serialize compacted state: {0}")]
    ArtifactSerializeFailed(#[source] serde_yaml::Error),

    #[error("No compacted state found for plan '{plan_id}'")]
    NoArtifact { plan_id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors raised while reading or writing the version-control history.
#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("{0} is not inside a git repository")]
    NotARepository(PathBuf),

    #[error("Repository at {0} has no working directory")]
    BareRepository(PathBuf),

    #[error("Git operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Git worker thread exited without a result")]
    WorkerLost,

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
}

impl EvidenceError {
    /// Whether a second attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EvidenceError::Timeout(_) | EvidenceError::WorkerLost | EvidenceError::Git(_)
        )
    }
}

/// Errors raised by a compression transform on malformed structure.
#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("Unterminated code fence opened at line {line}")]
    UnterminatedFence { line: usize },

    #[error("Malformed table row at line {line}: expected {expected} columns, found {found}")]
    MalformedTable {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Transform expanded the text from {input} to {output} characters")]
    Expanded { input: usize, output: usize },

    #[error("Transform dropped protected fragment '{anchor}'")]
    AnchorLost { anchor: String },
}
