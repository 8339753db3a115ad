//! All error types for the terraloc crate.
//!
//! These are returned from all fallible operations (reading, merging, projecting, patching).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown format `{0}`")]
    UnknownFormat(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("PO parse error: {0}")]
    PoParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("unsupported image layout: {0}")]
    UnsupportedImage(String),

    #[error("resource error: {message}")]
    Resource {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new resource error with optional source error
    pub fn resource_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::Resource {
            message: message.into(),
            source,
        }
    }

    pub(crate) fn invalid_image(message: impl Into<String>) -> Self {
        Error::InvalidImage(message.into())
    }
}
