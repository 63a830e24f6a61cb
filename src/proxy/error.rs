//! Error types for the proxy front end.

use std::io;
use thiserror::Error;

/// Errors that can occur while serving a client connection.
#[derive(Debug, Error)]
pub enum HttpError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// HTTP parsing error.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid HTTP method.
    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    /// Invalid URI.
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Request too large.
    #[error("Request too large: {size} bytes (max: {max})")]
    RequestTooLarge {
        /// Actual size.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Timeout while reading from or writing to the client.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Connection closed by the client.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type for proxy operations.
pub type HttpResult<T> = Result<T, HttpError>;

impl From<httparse::Error> for HttpError {
    fn from(err: httparse::Error) -> Self {
        HttpError::Parse(err.to_string())
    }
}

impl From<http::uri::InvalidUri> for HttpError {
    fn from(err: http::uri::InvalidUri) -> Self {
        HttpError::InvalidUri(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HttpError::RequestTooLarge {
            size: 2_000_000,
            max: 1_000_000,
        };
        assert!(err.to_string().contains("2000000"));

        let err = HttpError::ConnectionClosed;
        assert_eq!(err.to_string(), "Connection closed");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let err = HttpError::from(io_err);
        assert!(matches!(err, HttpError::Io(_)));
    }
}
