//! Content fingerprinting of the image build context.
//!
//! The build context is declared by an ignore file that excludes everything
//! (`*`) and re-includes files with `!glob` lines. The fingerprint is a SHA-1
//! over the bytes of every tracked file in sorted path order, and it stands in
//! for an explicit image tag.
//!
//! Computing the digest means reading the whole context, so the result is
//! cached next to the build root together with the file list it covers. The
//! cache is reused while the file list is unchanged and no tracked file is
//! newer than the cache file.

use std::path::PathBuf;

mod cache;
mod context;

pub use cache::CacheRecord;
pub use context::{ContextFingerprinter, Fingerprint, IgnoreFile, hash_files};

/// Fingerprinting errors.
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    /// Fingerprinting is enabled but there is no ignore file
    #[error("version_by_build_context requires a {} file with negated patterns", path.display())]
    MissingIgnoreFile { path: PathBuf },

    /// The ignore file does not follow the `*` then `!pattern` layout
    #[error(
        "{} line {line} is invalid: the first line must be '*' and every following line must start with '!'",
        path.display()
    )]
    IgnoreFormat { path: PathBuf, line: usize },

    /// A re-inclusion pattern is not a valid glob
    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// Directory traversal failed
    #[error("failed to walk build context: {0}")]
    Walk(#[from] walkdir::Error),

    /// Build root is not representable as a glob prefix
    #[error("build root {} is not valid UTF-8", .0.display())]
    NonUtf8Root(PathBuf),

    /// IO error on a specific path
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for fingerprint operations.
pub type Result<T> = std::result::Result<T, FingerprintError>;

pub(crate) fn io_error(
    path: impl Into<PathBuf>,
) -> impl FnOnce(std::io::Error) -> FingerprintError {
    let path = path.into();
    move |source| FingerprintError::Io { path, source }
}
