use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while querying xeno-canto or writing results to disk.
#[derive(Debug, Error)]
pub enum XcError {
    /// Non-success status or transport failure. `status` is `None` when the
    /// request never produced a response.
    #[error("HTTP error{}: {reason}", .status.map(|s| format!(" {s}")).unwrap_or_default())]
    Http { status: Option<u16>, reason: String },

    #[error("failed to decode search response: {0}")]
    Decode(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unexpected data shape: {0}")]
    DataShape(String),
}

impl XcError {
    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        XcError::Http {
            status: None,
            reason: err.to_string(),
        }
    }

    pub(crate) fn status(code: u16, reason: Option<&str>) -> Self {
        XcError::Http {
            status: Some(code),
            reason: reason.unwrap_or("unknown status").to_string(),
        }
    }

    pub(crate) fn fs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        XcError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for XcError {
    fn from(err: serde_json::Error) -> Self {
        XcError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, XcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_display_with_and_without_status() {
        let e = XcError::status(500, Some("Internal Server Error"));
        assert_eq!(e.to_string(), "HTTP error 500: Internal Server Error");

        let e = XcError::transport("connection refused");
        assert_eq!(e.to_string(), "HTTP error: connection refused");
    }

    #[test]
    fn test_decode_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(XcError::from(err), XcError::Decode(_)));
    }
}
