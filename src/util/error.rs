//! Error types for the glTF graph loader.

use std::sync::Arc;
use thiserror::Error;

/// Main error type for graph construction and loading.
#[derive(Error, Debug)]
pub enum Error {
    /// `asset.version` / `asset.minVersion` (or container version) not supported
    #[error("Unsupported glTF version: {0}")]
    UnsupportedVersion(String),

    /// A required extension has no registered factory
    #[error("Unsupported required extension: {0}")]
    UnsupportedExtension(String),

    /// Reference field index outside its collection
    #[error("Reference to {collection}[{index}] out of bounds (count: {len})")]
    Reference {
        collection: &'static str,
        index: i64,
        len: usize,
    },

    /// Malformed binary container
    #[error("Invalid binary container: {0}")]
    Format(String),

    /// A record could not be built from its JSON body
    #[error("Invalid record at {path}: {message}")]
    Schema { path: String, message: String },

    /// Descriptors that disagree with each other or with the loaded bytes
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    /// Transport failure while fetching a URI
    #[error("Failed to fetch '{uri}': {message}")]
    Fetch { uri: String, message: String },

    /// Background decode task failed
    #[error("Decode failed: {0}")]
    Decode(String),

    /// The load was cancelled through its token
    #[error("Load cancelled")]
    Cancelled,

    /// Failure memoized by a shared load, replayed to a joined caller
    #[error(transparent)]
    Shared(Arc<Error>),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON syntax error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a schema error for the record at `path`.
    pub fn schema(path: impl Into<String>, msg: impl ToString) -> Self {
        Self::Schema {
            path: path.into(),
            message: msg.to_string(),
        }
    }

    /// Rebuild an error from a memoized outcome.
    ///
    /// Cancellation is never wrapped so callers can keep matching on it.
    pub fn shared(err: Arc<Error>) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Shared(err)
        }
    }

    /// True if this error (or the memoized error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.root().matches_cancelled()
    }

    /// The underlying error with any `Shared` wrapping removed.
    pub fn root(&self) -> &Error {
        match self {
            Self::Shared(inner) => inner.root(),
            other => other,
        }
    }

    fn matches_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::Reference {
            collection: "accessors",
            index: 7,
            len: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains("accessors[7]"));
        assert!(msg.contains("3"));

        let e = Error::UnsupportedVersion("1.0".into());
        assert!(e.to_string().contains("1.0"));
    }

    #[test]
    fn test_shared_cancellation_unwraps() {
        let e = Error::shared(Arc::new(Error::Cancelled));
        assert!(matches!(e, Error::Cancelled));

        let e = Error::shared(Arc::new(Error::decode("bad geometry")));
        assert!(matches!(e, Error::Shared(_)));
        assert!(matches!(e.root(), Error::Decode(_)));
        assert!(!e.is_cancelled());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
