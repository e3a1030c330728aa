//! Fetching source URIs into the working prefix.

use crate::archive;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Maximum download size (500 MB)
const MAX_DOWNLOAD_SIZE: u64 = 500 * 1024 * 1024;

const USER_AGENT: &str = concat!("choro/", env!("CARGO_PKG_VERSION"));

/// Transport chosen from a URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Git,
    Http,
    Ftp,
}

impl Scheme {
    pub fn of(uri: &str) -> Result<Self> {
        let lower = uri.to_ascii_lowercase();
        if lower.starts_with("git://")
            || lower.starts_with("git@")
            || lower.starts_with("git+")
            || lower.starts_with("ssh://")
            || lower.trim_end_matches('/').ends_with(".git")
        {
            Ok(Self::Git)
        } else if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(Self::Http)
        } else if lower.starts_with("ftp://") {
            Ok(Self::Ftp)
        } else {
            Err(Error::UnsupportedScheme {
                uri: uri.to_string(),
            })
        }
    }
}

/// Runs external transport programs (`git`, `curl`).
pub trait Runner: Send + Sync {
    fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<()>;
}

/// [`Runner`] backed by `std::process::Command`.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<()> {
        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        let line = format!("{program} {}", args.join(" "));
        log::debug!("Running {line}");
        let output = command
            .output()
            .map_err(|e| Error::fetch(&line, e.to_string()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::fetch(
                line,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

/// Fetches git repositories and archives into a cache under the working
/// prefix.
///
/// Repositories are cloned into `sources/<key>` and updated in place on
/// later calls. Archives are downloaded once into `downloads/<uri key>/` and
/// unpacked into `build/<key>`. Keys are sanitised into a single path
/// component before use.
pub struct Fetcher {
    sources_dir: PathBuf,
    downloads_dir: PathBuf,
    build_dir: PathBuf,
    runner: Box<dyn Runner>,
}

impl Fetcher {
    pub fn new(prefix: &Path) -> Self {
        Self {
            sources_dir: prefix.join("sources"),
            downloads_dir: prefix.join("downloads"),
            build_dir: prefix.join("build"),
            runner: Box::new(SystemRunner),
        }
    }

    #[must_use]
    pub fn with_runner(mut self, runner: impl Runner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    pub fn sources_dir(&self) -> &Path {
        &self.sources_dir
    }

    /// Fetch the first URI that works, returning its local path.
    ///
    /// Unsupported schemes fail straight away; transport failures fall
    /// through to the next URI, and the last one is reported.
    pub fn fetch(&self, uris: &[String], cache_key: &str) -> Result<PathBuf> {
        let cache_key = safe_key(cache_key);
        let cache_key = cache_key.as_str();
        let mut last_error = None;
        for uri in uris {
            let scheme = Scheme::of(uri)?;
            match self.fetch_one(scheme, uri, cache_key) {
                Ok(path) => return Ok(path),
                Err(e) => {
                    log::warn!("Fetching {uri} failed: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::NoSources(cache_key.to_string())))
    }

    /// Where a previous fetch of `uri` under `cache_key` left its files, if
    /// it did.
    pub fn cached(&self, uri: &str, cache_key: &str) -> Option<PathBuf> {
        let key = safe_key(cache_key);
        match Scheme::of(uri).ok()? {
            Scheme::Git => {
                let dest = self.sources_dir.join(&key);
                dest.join(".git").is_dir().then_some(dest)
            }
            Scheme::Http | Scheme::Ftp => {
                let dest = self.build_dir.join(&key);
                dest.is_dir().then(|| archive::source_root(&dest))
            }
        }
    }

    fn fetch_one(&self, scheme: Scheme, uri: &str, cache_key: &str) -> Result<PathBuf> {
        match scheme {
            Scheme::Git => self.fetch_git(uri, cache_key),
            Scheme::Http | Scheme::Ftp => {
                let archive = self.download(scheme, uri)?;
                archive::extract(&archive, &self.build_dir.join(cache_key))
            }
        }
    }

    fn fetch_git(&self, uri: &str, cache_key: &str) -> Result<PathBuf> {
        let dest = self.sources_dir.join(cache_key);
        let uri = uri.strip_prefix("git+").unwrap_or(uri);

        if dest.join(".git").is_dir() {
            log::info!("Updating {} from {uri}", dest.display());
            self.runner
                .run("git", &["fetch", "--quiet", "origin"], Some(&dest))?;
            self.runner.run(
                "git",
                &["reset", "--hard", "--quiet", "origin/HEAD"],
                Some(&dest),
            )?;
        } else {
            log::info!("Cloning {uri} into {}", dest.display());
            ensure_dir(&self.sources_dir)?;
            if dest.exists() {
                fs::remove_dir_all(&dest).map_err(|e| Error::io(&dest, e))?;
            }
            let target = dest.to_string_lossy();
            self.runner
                .run("git", &["clone", "--quiet", uri, &target], None)?;
        }
        Ok(dest)
    }

    /// Download an archive unless it is already cached.
    fn download(&self, scheme: Scheme, uri: &str) -> Result<PathBuf> {
        let dir = self.downloads_dir.join(cache_key_for(uri));
        ensure_dir(&dir)?;
        let path = dir.join(archive_name(uri));
        if path.is_file() {
            log::debug!("Using cached {}", path.display());
            return Ok(path);
        }

        // Write beside the target so an interrupted download is never reused.
        let partial = path.with_extension("part");
        log::info!("Downloading {uri}");
        match scheme {
            Scheme::Ftp => {
                let out = partial.to_string_lossy();
                self.runner.run("curl", &["-fsSL", "-o", &out, uri], None)?;
            }
            _ => {
                let bytes = download_bytes(uri)?;
                fs::write(&partial, bytes).map_err(|e| Error::io(&partial, e))?;
            }
        }
        fs::rename(&partial, &path).map_err(|e| Error::io(&path, e))?;
        Ok(path)
    }
}

fn download_bytes(uri: &str) -> Result<Vec<u8>> {
    let agent = ureq::Agent::new_with_defaults();
    let mut response = agent.get(uri).header("User-Agent", USER_AGENT).call()?;
    let bytes = response
        .body_mut()
        .with_config()
        .limit(MAX_DOWNLOAD_SIZE)
        .read_to_vec()?;
    Ok(bytes)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
}

/// File name an archive is cached under: the URI's last path segment, or a
/// hashed key when it has none.
pub fn archive_name(uri: &str) -> String {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let after_host = path.split_once("://").map_or(path, |(_, rest)| rest);
    match after_host.split_once('/') {
        Some((_, rest)) => match rest.rsplit('/').next() {
            Some(last) if !last.is_empty() => last.to_string(),
            _ => cache_key_for(uri),
        },
        None => cache_key_for(uri),
    }
}

/// `key` as a single path component: anything but ASCII alphanumerics,
/// `-`, `_` and `.` becomes `_`, and leading dots are dropped.
pub fn safe_key(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        cache_key_for(key)
    } else {
        cleaned.to_string()
    }
}

/// Stable directory name for a URI: a readable stem plus a short hash.
///
/// `https://github.com/me/deps.git` becomes `deps-1a2b3c4d`.
pub fn cache_key_for(uri: &str) -> String {
    let trimmed = uri.trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    let stem = last
        .trim_end_matches(".git")
        .trim_end_matches(".tar.gz")
        .trim_end_matches(".tgz")
        .trim_end_matches(".zip");
    let stem: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let hash = blake3::hash(uri.as_bytes()).to_hex();
    let short = &hash.as_str()[..8];
    if stem.is_empty() {
        short.to_string()
    } else {
        format!("{stem}-{short}")
    }
}
