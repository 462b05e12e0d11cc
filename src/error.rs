//! # Error Types
//!
//! Defines a structured error hierarchy for the snapshot core using `thiserror`.
//! Each error variant carries enough context for meaningful diagnostics without
//! exposing storage internals to the caller. The core returns this type from
//! every public operation — it never panics on the caller-visible path.
//! Best-effort internals (audit writes, per-blob retention deletes) are
//! absorbed explicitly at the call site, not silently inside this type.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for every fallible operation in the snapshot core.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("snapshot store is disabled")]
    Disabled,

    #[error("config file not found: {0:?}")]
    ConfigFileNotFound(PathBuf),

    #[error("invalid config type: {0}")]
    InvalidConfigType(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("storage not initialized at {0:?}")]
    StorageNotInitialized(PathBuf),

    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("checksum mismatch for snapshot {snapshot_id}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        snapshot_id: String,
        expected: String,
        actual: String,
    },

    #[error("target path required: snapshot has no config_path and none was supplied")]
    TargetPathRequired,

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("failed to save index: {source}")]
    IndexSaveFailed {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to save blob {storage_path:?}: {source}")]
    SaveFailed {
        storage_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to delete {storage_path:?}: {source}")]
    DeleteFailed {
        storage_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {storage_path:?}: {source}")]
    ReadFailed {
        storage_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid retention parameter: {0}")]
    InvalidRetentionParameter(String),

    #[error("unsupported snapshot index version: {found} (expected 1)")]
    UnsupportedIndexVersion { found: u32 },

    #[error("malformed index at {path:?}: {message}")]
    CorruptIndex { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
