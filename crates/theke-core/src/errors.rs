//! Error types for the Theke core library.

use serde::Serialize;

/// Top-level error enum for the Theke core library.
#[derive(Debug, thiserror::Error)]
pub enum ThekeError {
    #[error("Malformed URI: {0}")]
    MalformedUri(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Unsupported kind: {0}")]
    UnsupportedKind(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("External source inaccessible: {0}")]
    ExternalSourceInaccessible(String),

    #[error("Catalog integrity error: {0}")]
    CatalogIntegrity(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse error classification carried by `navigation-error` events.
///
/// The UI only needs to know which family a failure belongs to, not the
/// underlying driver error, so events carry this instead of the error itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    MalformedUri,
    UnsupportedScheme,
    UnsupportedKind,
    InvalidReference,
    NotFound,
    ExternalSourceInaccessible,
    CatalogIntegrity,
    Backend,
    Config,
    Storage,
}

impl ThekeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ThekeError::MalformedUri(_) => ErrorKind::MalformedUri,
            ThekeError::UnsupportedScheme(_) => ErrorKind::UnsupportedScheme,
            ThekeError::UnsupportedKind(_) => ErrorKind::UnsupportedKind,
            ThekeError::InvalidReference(_) => ErrorKind::InvalidReference,
            ThekeError::NotFound(_) => ErrorKind::NotFound,
            ThekeError::ExternalSourceInaccessible(_) => ErrorKind::ExternalSourceInaccessible,
            ThekeError::CatalogIntegrity(_) => ErrorKind::CatalogIntegrity,
            ThekeError::Backend(_) => ErrorKind::Backend,
            ThekeError::Config(_) | ThekeError::Json(_) => ErrorKind::Config,
            ThekeError::Io(_) | ThekeError::Sqlite(_) => ErrorKind::Storage,
        }
    }

    /// True for failures that should be rendered as a "not found" page
    /// instead of putting the navigator into its error state.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ThekeError::NotFound(_))
    }
}

pub type ThekeResult<T> = Result<T, ThekeError>;
