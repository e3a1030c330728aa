//! Error types for fetch operations.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of fetch errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable).
    Network,
    /// The URI can't be fetched by any supported transport.
    Unsupported,
    /// Archive could not be unpacked.
    Format,
    /// Permission denied writing the cache.
    Permission,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Unsupported => "Unsupported URI scheme",
            Self::Format => "Invalid archive",
            Self::Permission => "Permission denied",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check your internet connection and try again",
            Self::Unsupported => "Use a git, http(s) or ftp URI",
            Self::Format => "Remove the cached download and try again",
            Self::Permission => "Check permissions on the working prefix",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while fetching sources.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No transport handles the URI's scheme.
    #[error("unsupported scheme in '{uri}'")]
    UnsupportedScheme {
        /// The rejected URI.
        uri: String,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// A transport command (git, curl) failed.
    #[error("fetch of {uri} failed: {message}")]
    Fetch {
        /// URI being fetched.
        uri: String,
        /// Error message.
        message: String,
    },

    /// Failed to unpack a downloaded archive.
    #[error("cannot extract {path}: {message}")]
    Archive {
        /// Archive on disk.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// IO error during file operations.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// No URIs were given.
    #[error("no source URIs for '{0}'")]
    NoSources(String),
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn fetch(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            uri: uri.into(),
            message: message.into(),
        }
    }

    pub fn archive(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::Archive {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnsupportedScheme { .. } => ErrorCategory::Unsupported,
            Error::Http { .. } | Error::Fetch { .. } => ErrorCategory::Network,
            Error::Archive { .. } => ErrorCategory::Format,
            Error::Io { source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
                ErrorCategory::Permission
            }
            Error::Io { .. } | Error::NoSources(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let err = Error::UnsupportedScheme {
            uri: "gopher://x".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Unsupported);
        assert!(!err.is_retryable());

        assert!(Error::fetch("git://x", "exit 128").is_retryable());
        assert_eq!(
            Error::archive("/tmp/a.zip", "bad header").category(),
            ErrorCategory::Format
        );

        let denied = Error::io("/p", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(denied.category(), ErrorCategory::Permission);
    }

    #[test]
    fn test_from_ureq_status() {
        let err = Error::from(ureq::Error::StatusCode(404));
        assert!(matches!(err, Error::Http { status: Some(404), .. }));
        assert_eq!(err.to_string(), "HTTP request failed: HTTP 404");
    }
}
