//! Error types for event source operations.
//!
//! A fetch either fails as a whole or succeeds as a whole, so a single
//! [`SourceError`] describes everything from connection failures to feeds the
//! parser rejects.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// The category of a source error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceErrorCode {
    /// Connection failed, timed out, or the body could not be read.
    NetworkError,
    /// The server rejected our credentials (401).
    AuthenticationFailed,
    /// The server refused access (403).
    AuthorizationFailed,
    /// The feed does not exist (404, 410).
    NotFound,
    /// Too many requests (429).
    RateLimited,
    /// The server failed (5xx).
    ServerError,
    /// The server answered with a status we do not handle.
    InvalidResponse,
    /// The feed text is not valid iCalendar data.
    ParseError,
    /// The source is misconfigured.
    ConfigurationError,
}

impl SourceErrorCode {
    /// Returns true if the operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    /// Returns a stable name for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkError => "network_error",
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::ParseError => "parse_error",
            Self::ConfigurationError => "configuration_error",
        }
    }
}

impl fmt::Display for SourceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised while fetching or parsing a feed.
///
/// Cloneable: one failed fetch is reported to every caller that was waiting
/// on it.
#[derive(Debug, Clone, Error)]
pub struct SourceError {
    code: SourceErrorCode,
    message: String,
    /// The source that raised the error (e.g. "ics").
    source_name: Option<String>,
    #[source]
    cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl SourceError {
    /// Creates a new error with the given code and message.
    pub fn new(code: SourceErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source_name: None,
            cause: None,
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::NetworkError, message)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::AuthenticationFailed, message)
    }

    /// Creates an authorization error.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::AuthorizationFailed, message)
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::NotFound, message)
    }

    /// Creates a rate limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::RateLimited, message)
    }

    /// Creates a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::ServerError, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::InvalidResponse, message)
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::ParseError, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::ConfigurationError, message)
    }

    /// Sets the name of the source that raised this error.
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Attaches the underlying cause.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> SourceErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the source name, if set.
    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    /// Returns true if the operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref name) = self.source_name {
            write!(f, "[{}] ", name)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_retryable() {
        assert!(SourceErrorCode::NetworkError.is_retryable());
        assert!(SourceErrorCode::RateLimited.is_retryable());
        assert!(SourceErrorCode::ServerError.is_retryable());
        assert!(!SourceErrorCode::ParseError.is_retryable());
        assert!(!SourceErrorCode::NotFound.is_retryable());
    }

    #[test]
    fn error_creation() {
        let err = SourceError::parse("missing END:VCALENDAR");
        assert_eq!(err.code(), SourceErrorCode::ParseError);
        assert_eq!(err.message(), "missing END:VCALENDAR");
        assert!(err.source_name().is_none());
        assert!(!err.is_retryable());
    }

    #[test]
    fn display_includes_source_name() {
        let err = SourceError::rate_limited("slow down").with_source_name("ics");
        assert_eq!(err.to_string(), "[ics] rate_limited: slow down");
    }

    #[test]
    fn clones_share_the_cause() {
        use std::error::Error;
        let io_err = std::io::Error::other("connection reset");
        let err = SourceError::network("request failed").with_cause(io_err);
        let cloned = err.clone();
        assert!(err.source().is_some());
        assert_eq!(
            cloned.source().map(|e| e.to_string()),
            Some("connection reset".to_string())
        );
    }
}
