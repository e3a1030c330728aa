//! # pkgkit
//!
//! Package-manager backends for declarative deps.
//!
//! This crate provides:
//! - The [`PackageManager`] trait the `bin` template installs through
//! - Homebrew and apt backends driven through a [`declarative::Shell`]
//! - Classification of manager output into retryable and fatal errors
//!
//! ## Example
//!
//! ```ignore
//! use declarative::Host;
//! use std::sync::Arc;
//!
//! let manager = pkgkit::detect(&Host::detect(), shell).expect("supported host");
//! manager.update_pkg_lists_if_required()?;
//! manager.install(&["ripgrep".to_string()])?;
//! ```
//!
//! ## Retry Logic
//!
//! Network errors and package database locks during installation are
//! retried with exponential backoff. Configure retry behavior with
//! [`RetryConfig`].

pub mod backend;
pub mod error;
pub mod retry;

pub use backend::{PackageManager, apt::AptBackend, brew::BrewBackend, detect};
pub use error::{Error, ErrorCategory, Result};
pub use retry::RetryConfig;
