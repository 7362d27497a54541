use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for all operations in the `layerdiff` crate.
///
/// Every variant is fatal to the diff request that produced it. Inconsistent
/// merge states are not errors; they are reported through `tracing` instead.
#[derive(Debug, Error)]
pub enum DiffError {
    /// A directory or an entry's metadata could not be read.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io { source: std::io::Error, path: PathBuf },

    /// An event path was not located under the expected layer root.
    #[error("Could not strip prefix '{}' from path '{}'", prefix.display(), path.display())]
    StripPrefix { prefix: PathBuf, path: PathBuf },

    /// The native snapshot-diff facility failed or produced unusable output.
    #[error("Snapshot diff failed: {0}")]
    DiffFacility(String),

    /// The storage backend could not provide a mounted layer.
    #[error("Layer '{layer}' is unavailable: {reason}")]
    Backend { layer: String, reason: String },

    /// Packaging a change list into an archive stream failed.
    #[error("Archive error: {0}")]
    Archive(#[source] std::io::Error),

    /// A wrapper for any other error that doesn't fit the specific variants.
    #[error("An unexpected error occurred: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl DiffError {
    /// Wraps an I/O error together with the path it was raised for.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        DiffError::Io { source, path: path.into() }
    }
}

impl From<walkdir::Error> for DiffError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(PathBuf::from).unwrap_or_default();
        match err.into_io_error() {
            Some(source) => DiffError::Io { source, path },
            None => DiffError::Other(format!("filesystem loop detected at '{}'", path.display()).into()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DiffError>;
