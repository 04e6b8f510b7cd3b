//! Error types for Rivulet.

use thiserror::Error;

/// The error value carried by a stream's error notification.
///
/// Whatever a producer pushes is delivered to observers verbatim; the
/// engine never wraps one variant into another.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Error pushed explicitly by a producer
    #[error("{0}")]
    Source(String),

    /// A user-supplied transform failed
    #[error("Projection failed: {0}")]
    Projection(String),

    /// A foreign source reported a failure
    #[error("Interop source failed: {0}")]
    Interop(String),

    /// A user-supplied comparator failed
    #[error("Comparator failed: {0}")]
    Comparator(String),
}

impl StreamError {
    /// Create a source error with the given message.
    pub fn source(msg: impl Into<String>) -> Self {
        StreamError::Source(msg.into())
    }

    /// Create a projection error with the given message.
    pub fn projection(msg: impl Into<String>) -> Self {
        StreamError::Projection(msg.into())
    }

    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            StreamError::Source(_) => "source",
            StreamError::Projection(_) => "projection",
            StreamError::Interop(_) => "interop",
            StreamError::Comparator(_) => "comparator",
        }
    }
}

impl From<String> for StreamError {
    fn from(msg: String) -> Self {
        StreamError::Source(msg)
    }
}

impl From<&str> for StreamError {
    fn from(msg: &str) -> Self {
        StreamError::Source(msg.to_string())
    }
}

/// Root error type for Rivulet operations outside the notification channel.
#[derive(Error, Debug)]
pub enum RivuletError {
    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stream-related errors
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

/// Result type alias for fallible projections and stream items.
pub type StreamResult<T> = Result<T, StreamError>;

/// Result type alias for general Rivulet operations.
pub type RivuletResult<T> = Result<T, RivuletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_is_source() {
        let err: StreamError = "boom".into();
        assert_eq!(err, StreamError::Source("boom".to_string()));
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.as_label(), "source");
    }

    #[test]
    fn test_root_error_wraps_stream_error() {
        let err: RivuletError = StreamError::projection("bad").into();
        assert_eq!(err.to_string(), "Stream error: Projection failed: bad");
    }
}
