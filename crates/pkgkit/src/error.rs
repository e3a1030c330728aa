//! Error types for package-manager operations.
//!
//! Errors are categorized to enable smart retry logic and appropriate
//! user feedback. Output from a failed manager command is classified by
//! [`Error::from_output`].

use thiserror::Error;

/// Categories of package-manager errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable)
    Network,
    /// Another process holds the package database lock (transient)
    Locked,
    /// Package not known to the manager
    NotFound,
    /// Version or dependency conflict
    Conflict,
    /// Permission denied (may need sudo)
    Permission,
    /// Package is already installed
    AlreadyInstalled,
    /// The package manager itself is missing
    ManagerNotFound,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Locked)
    }

    /// Whether this error can be safely ignored (operation already done).
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::AlreadyInstalled)
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check your internet connection and try again",
            Self::Locked => "Wait for the other package manager process to finish",
            Self::NotFound => "Verify the package name for this package manager",
            Self::Conflict => "Resolve the conflict by removing conflicting packages",
            Self::Permission => "Check directory permissions or enable sudo in config.toml",
            Self::AlreadyInstalled => "No action needed - package is already installed",
            Self::ManagerNotFound => "Meet the package manager's own dep first",
            Self::Other => "Check the dep's log file for more information",
        }
    }
}

/// Errors that can occur during package-manager operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-related error (connection, timeout, DNS, etc.)
    #[error("network error: {message}")]
    Network {
        /// Detailed error message from the failed operation
        message: String,
    },

    /// The package database is locked by another process
    #[error("package database locked: {message}")]
    Locked {
        /// Output that reported the lock
        message: String,
    },

    /// Package not found
    #[error("package not found: {name}")]
    NotFound {
        /// Name of the package that could not be found
        name: String,
    },

    /// Version or dependency conflict
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict
        message: String,
    },

    /// Permission denied
    #[error("permission denied: {message}")]
    Permission {
        /// Details about what permission was denied
        message: String,
    },

    /// Package is already installed
    #[error("already installed: {name}")]
    AlreadyInstalled {
        /// Name of the already-installed package
        name: String,
    },

    /// The package manager is not installed
    #[error("{0} not found")]
    ManagerNotFound(String),

    /// Manager command failed for an unclassified reason
    #[error("{message}: {stderr}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// The shell collaborator could not run a command
    #[error(transparent)]
    Shell(#[from] declarative::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } => ErrorCategory::Network,
            Error::Locked { .. } => ErrorCategory::Locked,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            Error::Permission { .. } => ErrorCategory::Permission,
            Error::AlreadyInstalled { .. } => ErrorCategory::AlreadyInstalled,
            Error::ManagerNotFound(_) => ErrorCategory::ManagerNotFound,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this error can be safely ignored.
    pub fn is_ignorable(&self) -> bool {
        self.category().is_ignorable()
    }

    /// Create an error from a failed manager command's stderr.
    pub fn from_output(manager: &str, stderr: &str, packages: &[String]) -> Self {
        let lower = stderr.to_lowercase();
        let message = stderr.trim().to_string();
        let names = packages.join(" ");

        if lower.contains("could not get lock")
            || lower.contains("unable to acquire the dpkg frontend lock")
            || lower.contains("another active homebrew")
        {
            return Error::Locked { message };
        }

        if lower.contains("curl")
            || lower.contains("could not resolve")
            || lower.contains("temporary failure resolving")
            || lower.contains("failed to fetch")
            || lower.contains("connection refused")
            || lower.contains("timed out")
            || lower.contains("failed to download")
            || lower.contains("sha256 mismatch")
        {
            return Error::Network { message };
        }

        if lower.contains("unable to locate package")
            || lower.contains("has no installation candidate")
            || lower.contains("no available formula")
            || lower.contains("no formulae found")
            || lower.contains("no cask with this name")
        {
            return Error::NotFound { name: names };
        }

        if lower.contains("already installed") || lower.contains("is already the newest version") {
            return Error::AlreadyInstalled { name: names };
        }

        if lower.contains("conflict")
            || lower.contains("unmet dependencies")
            || lower.contains("held broken packages")
        {
            return Error::Conflict { message };
        }

        if lower.contains("permission denied")
            || lower.contains("operation not permitted")
            || lower.contains("are you root")
        {
            return Error::Permission { message };
        }

        Error::CommandFailed {
            message: format!("{manager} install failed for {names}"),
            stderr: message,
        }
    }
}

/// Result type for package-manager operations.
pub type Result<T> = std::result::Result<T, Error>;
