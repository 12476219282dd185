use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Rejections raised before any file in a batch is processed or written.
///
/// These are always the client's fault and map to a `400` at the
/// HTTP boundary.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("no images were uploaded")]
    EmptyBatch,

    #[error("too many files: got {got}, the limit is {limit} per upload")]
    TooManyFiles { got: usize, limit: usize },

    #[error("file {name:?} is empty")]
    EmptyFile { name: String },

    #[error(
        "file {name:?} is too large: {size} bytes exceeds the {limit} byte limit"
    )]
    FileTooLarge {
        name: String,
        size: usize,
        limit: usize,
    },

    #[error("unsupported image format {mime:?} for file {name:?}")]
    UnsupportedType { name: String, mime: String },
}

/// Failures from the storage layer.
///
/// Directory creation failures on the write path are surfaced here
/// rather than logged and ignored, unlike cleanup unlinks which are
/// always best-effort.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create directory {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to commit staged file to {path:?}: {source}")]
    Commit { path: PathBuf, source: io::Error },

    #[error("failed to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to remove {path:?}: {source}")]
    Remove { path: PathBuf, source: io::Error },
}

/// The overall failure of an upload batch.
///
/// A batch fails as a whole: the first failure aborts outstanding
/// files and already-written artifacts are rolled back before this
/// error reaches the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The payload claimed to be an image but could not be parsed.
    /// Uniformly treated as a client error (`400`).
    #[error("failed to decode {name:?} as an image: {source}")]
    Decode {
        name: String,
        source: image::ImageError,
    },

    #[error("storage failure for {name:?}: {source}")]
    Storage {
        name: String,
        source: StorageError,
    },

    #[error("processing {name:?} timed out after {seconds}s")]
    Timeout { name: String, seconds: u64 },

    /// The file was skipped because a sibling in the batch had
    /// already failed. Never surfaced when a root cause exists.
    #[error("processing aborted after another file in the batch failed")]
    Aborted,

    #[error("image processing worker exited before responding")]
    WorkerGone,
}

impl PipelineError {
    /// Whether the failure is the client's fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Decode { .. })
    }
}
