//! Directory toolkit error types
//!
//! Every failure the core can produce is surfaced synchronously to the caller.
//! Nothing here is retried; only failures reported by the connection
//! collaborator are classified as transient.

use thiserror::Error;

/// Error that can occur while resolving, converting or rendering directory data.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// An attribute or alias reference could not be matched to a registered schema.
    #[error("resolution failed: {message}")]
    Resolution { message: String },

    /// An operation was invoked without the context it needs, or a converter
    /// was configured with an unknown flag or parameter.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// A read-back found zero or more than one matching entry.
    #[error("unable to find directory entry: {identity}")]
    NotFound { identity: String },

    /// A value does not have the shape the selected converter expects.
    #[error("conversion failed for attribute '{attribute}': {message}")]
    Conversion { attribute: String, message: String },

    /// A filter tree was constructed in violation of its contract.
    #[error("invalid filter: {message}")]
    InvalidFilter { message: String },

    /// The connection collaborator failed to complete a request.
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl DirectoryError {
    /// Check if this error is transient and the request may succeed when repeated.
    ///
    /// Only the connection layer decides whether to actually retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, DirectoryError::Connection { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::Resolution { .. } => "RESOLUTION_FAILED",
            DirectoryError::Configuration { .. } => "INVALID_CONFIG",
            DirectoryError::NotFound { .. } => "ENTRY_NOT_FOUND",
            DirectoryError::Conversion { .. } => "CONVERSION_FAILED",
            DirectoryError::InvalidFilter { .. } => "INVALID_FILTER",
            DirectoryError::Connection { .. } => "CONNECTION_FAILED",
        }
    }

    // Convenience constructors

    /// Create a resolution error.
    pub fn resolution(message: impl Into<String>) -> Self {
        DirectoryError::Resolution {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        DirectoryError::Configuration {
            message: message.into(),
        }
    }

    /// Create a not-found error carrying the identity that was searched for.
    pub fn not_found(identity: impl Into<String>) -> Self {
        DirectoryError::NotFound {
            identity: identity.into(),
        }
    }

    /// Create a conversion error for an attribute.
    pub fn conversion(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        DirectoryError::Conversion {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Create an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        DirectoryError::InvalidFilter {
            message: message.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        DirectoryError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for directory toolkit operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_errors_are_transient() {
        assert!(DirectoryError::connection("socket closed").is_transient());

        let permanent = vec![
            DirectoryError::resolution("unknown alias 'foo'"),
            DirectoryError::configuration("missing dn"),
            DirectoryError::not_found("cn=foo,dc=example,dc=com"),
            DirectoryError::conversion("groupType", "expected a boolean"),
            DirectoryError::invalid_filter("not takes one child"),
        ];
        for err in permanent {
            assert!(
                !err.is_transient(),
                "Expected {} to be permanent",
                err.error_code()
            );
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            DirectoryError::resolution("x").error_code(),
            "RESOLUTION_FAILED"
        );
        assert_eq!(DirectoryError::not_found("x").error_code(), "ENTRY_NOT_FOUND");
        assert_eq!(
            DirectoryError::conversion("a", "b").error_code(),
            "CONVERSION_FAILED"
        );
    }

    #[test]
    fn test_error_display() {
        let err = DirectoryError::not_found("cn=foo,dc=foo,dc=bar");
        assert_eq!(
            err.to_string(),
            "unable to find directory entry: cn=foo,dc=foo,dc=bar"
        );

        let err = DirectoryError::conversion("exchangeHideFromGAL", "expected a boolean");
        assert_eq!(
            err.to_string(),
            "conversion failed for attribute 'exchangeHideFromGAL': expected a boolean"
        );
    }

    #[test]
    fn test_error_with_source() {
        let source_err = std::io::Error::new(std::io::ErrorKind::Other, "underlying error");
        let err = DirectoryError::connection_with_source("search failed", source_err);

        if let DirectoryError::Connection { source, .. } = &err {
            assert!(source.is_some());
        } else {
            panic!("Expected Connection variant");
        }
    }
}
