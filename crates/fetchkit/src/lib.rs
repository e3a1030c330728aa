//! Fetching dep sources and source archives.
//!
//! A [`Fetcher`] maps a list of URIs onto a local directory under the
//! working prefix:
//!
//! - `git` URIs are cloned into `sources/<key>` once and fetched and reset on
//!   every later call.
//! - `http(s)` and `ftp` archives are downloaded into `downloads/` once, keyed
//!   by URI, then unpacked into `build/<key>`.
//!
//! ```no_run
//! use fetchkit::Fetcher;
//! use std::path::Path;
//!
//! let fetcher = Fetcher::new(Path::new("/home/me/.choro"));
//! let uris = vec!["https://example.com/jq-1.7.tar.gz".to_string()];
//! let dir = fetcher.fetch(&uris, "jq")?;
//! # Ok::<(), fetchkit::Error>(())
//! ```

pub mod archive;
pub mod error;
pub mod fetch;

pub use error::{Error, ErrorCategory, Result};
pub use fetch::{
    Fetcher, Runner, Scheme, SystemRunner, archive_name, cache_key_for, safe_key,
};
