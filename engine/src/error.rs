//! Error types for the classification engine.
//!
//! `EngineError` covers both the run-level failures (a missing source
//! directory, an invalid job configuration) and the per-file I/O failures the
//! classifier catches, reports, and counts. Only the former ever escapes a run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while preparing or executing a classification run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source directory does not exist
    #[error("source folder '{}' not found", path.display())]
    SourceNotFound { path: PathBuf },

    /// Source path exists but is not a directory
    #[error("source '{}' is not a directory", path.display())]
    SourceNotDirectory { path: PathBuf },

    /// Source directory could not be read
    #[error("source folder '{}' could not be read: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Job configuration rejected before a run started
    #[error("invalid job configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Failed to create a directory under the target tree
    #[error("failed to create directory '{}': {source}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read from a source file
    #[error("failed to read '{}': {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write a destination file
    #[error("failed to write '{}': {source}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Destination already holds a file and would be overwritten
    #[error("destination '{}' already exists", path.display())]
    DestinationExists { path: PathBuf },

    /// Failed to move a file to its destination
    #[error("failed to move '{}' to '{}': {source}", from.display(), to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to delete a file
    #[error("failed to delete '{}': {source}", path.display())]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The background worker thread could not be started
    #[error("failed to start classification worker: {source}")]
    WorkerSpawnFailed {
        #[source]
        source: io::Error,
    },

    /// The background worker ended without producing a summary
    #[error("classification worker terminated abnormally: {message}")]
    WorkerPanicked { message: String },
}

/// A progress event could not be delivered to its observer.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The receiving side of the channel is gone
    #[error("progress observer disconnected")]
    Disconnected,

    /// Writing the event to its output failed
    #[error("failed to write progress event: {0}")]
    Io(#[from] io::Error),

    /// Event payload could not be encoded
    #[error("failed to encode progress event: {0}")]
    Encode(#[from] serde_json::Error),
}
