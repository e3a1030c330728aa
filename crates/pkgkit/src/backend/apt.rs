//! Debian/Ubuntu backend using `dpkg-query` and `apt-get`.

use super::{PackageManager, missing, quote};
use crate::error::{Error, Result};
use crate::retry::{RetryConfig, with_retry};
use declarative::{DepRef, Shell, ShellOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

/// Package lists older than this are refreshed before installing.
const LISTS_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

pub struct AptBackend {
    shell: Arc<dyn Shell>,
    retry: RetryConfig,
    lists_dir: PathBuf,
    updated: AtomicBool,
}

impl AptBackend {
    pub fn new(shell: Arc<dyn Shell>) -> Self {
        Self {
            shell,
            retry: RetryConfig::default(),
            lists_dir: PathBuf::from("/var/lib/apt/lists"),
            updated: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Use a different package lists directory (for testing).
    #[must_use]
    pub fn with_lists_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lists_dir = dir.into();
        self
    }

    fn lists_are_stale(&self) -> bool {
        match newest_mtime(&self.lists_dir) {
            Some(modified) => SystemTime::now()
                .duration_since(modified)
                .is_ok_and(|age| age > LISTS_MAX_AGE),
            None => true,
        }
    }
}

impl PackageManager for AptBackend {
    fn key(&self) -> &'static str {
        "apt"
    }

    fn is_available(&self) -> bool {
        self.shell.succeeds("command -v apt-get")
    }

    fn installed_version(&self, package: &str) -> Result<Option<String>> {
        let command = format!(
            "dpkg-query -W -f='${{Status}}|${{Version}}' {}",
            quote(package)
        );
        let output = self.shell.run(&command, &ShellOptions::default())?;
        if !output.success {
            return Ok(None);
        }
        Ok(parse_dpkg_status(&output.stdout_str()))
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        let missing = missing(self, packages)?;
        if missing.is_empty() {
            return Ok(());
        }

        let words: Vec<String> = missing.iter().map(|p| quote(p)).collect();
        let command = format!(
            "DEBIAN_FRONTEND=noninteractive apt-get install -y {}",
            words.join(" ")
        );
        log::info!("Installing with apt: {}", missing.join(", "));

        with_retry(&self.retry, "apt-get install", || {
            let output = self
                .shell
                .run(&command, &ShellOptions::logged("apt").with_sudo(true))?;
            if output.success {
                return Ok(());
            }
            match Error::from_output("apt", &output.stderr_str(), &missing) {
                e if e.is_ignorable() => Ok(()),
                e => Err(e),
            }
        })
    }

    fn manager_dep(&self) -> DepRef {
        DepRef::new("apt").in_source("core")
    }

    fn update_pkg_lists_if_required(&self) -> Result<()> {
        if self.updated.load(Ordering::SeqCst) || !self.lists_are_stale() {
            return Ok(());
        }

        log::info!("Package lists are stale, running apt-get update");
        with_retry(&self.retry, "apt-get update", || {
            let output = self
                .shell
                .run("apt-get update", &ShellOptions::logged("apt").with_sudo(true))?;
            if output.success {
                Ok(())
            } else {
                Err(Error::from_output("apt", &output.stderr_str(), &[]))
            }
        })?;
        self.updated.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn prefix(&self) -> PathBuf {
        PathBuf::from("/usr")
    }
}

/// Parse `install ok installed|1:2.34.1-1ubuntu1` into `2.34.1-1ubuntu1`.
fn parse_dpkg_status(output: &str) -> Option<String> {
    let (status, version) = output.trim().split_once('|')?;
    if !status.ends_with(" installed") || version.is_empty() {
        return None;
    }
    let version = version.split_once(':').map_or(version, |(_, rest)| rest);
    Some(version.to_string())
}

fn newest_mtime(dir: &Path) -> Option<SystemTime> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok()?.metadata().ok()?.modified().ok())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::ScriptedShell;
    use declarative::VersionConstraint;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_parse_dpkg_status() {
        assert_eq!(
            parse_dpkg_status("install ok installed|1:2.34.1-1ubuntu1").as_deref(),
            Some("2.34.1-1ubuntu1")
        );
        assert_eq!(
            parse_dpkg_status("install ok installed|13.0.0-4").as_deref(),
            Some("13.0.0-4")
        );
        assert_eq!(parse_dpkg_status("deinstall ok config-files|1.0"), None);
        assert_eq!(parse_dpkg_status("garbage"), None);
    }

    #[test]
    fn test_has_with_constraint() {
        let shell = ScriptedShell::default()
            .answer("dpkg-query -W -f='${Status}|${Version}' git", true, "install ok installed|1:2.34.1-1", "")
            .answer("dpkg-query", false, "", "no packages found");
        let apt = AptBackend::new(Arc::new(shell));

        assert!(apt.has("git", None).unwrap());
        let newer = VersionConstraint::parse(">= 2.40").unwrap();
        assert!(!apt.has("git", Some(&newer)).unwrap());
        let older = VersionConstraint::parse("~> 2.34").unwrap();
        assert!(apt.has("git", Some(&older)).unwrap());
        assert!(!apt.has("jq", None).unwrap());
    }

    #[test]
    fn test_install_skips_installed_packages() {
        let shell = Arc::new(
            ScriptedShell::default()
                .answer("dpkg-query -W -f='${Status}|${Version}' git", true, "install ok installed|2.40", "")
                .answer("dpkg-query", false, "", ""),
        );
        let apt = AptBackend::new(shell.clone()).with_retry(fast());

        apt.install(&["git".to_string(), "jq".to_string()]).unwrap();
        let installs: Vec<_> = shell
            .commands()
            .into_iter()
            .filter(|(c, _)| c.contains("apt-get install"))
            .collect();
        assert_eq!(
            installs,
            vec![(
                "DEBIAN_FRONTEND=noninteractive apt-get install -y jq".to_string(),
                true
            )]
        );
    }

    #[test]
    fn test_install_classifies_failure() {
        let shell = ScriptedShell::default()
            .answer("dpkg-query", false, "", "")
            .answer("DEBIAN_FRONTEND", false, "", "E: Unable to locate package nope");
        let apt = AptBackend::new(Arc::new(shell)).with_retry(fast());
        let err = apt.install(&["nope".to_string()]).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_update_runs_once_when_stale() {
        let lists = tempfile::tempdir().unwrap();
        let shell = Arc::new(ScriptedShell::default());
        let apt = AptBackend::new(shell.clone())
            .with_retry(fast())
            .with_lists_dir(lists.path().join("missing"));

        apt.update_pkg_lists_if_required().unwrap();
        apt.update_pkg_lists_if_required().unwrap();
        let updates = shell
            .commands()
            .iter()
            .filter(|(c, _)| c == "apt-get update")
            .count();
        assert_eq!(updates, 1);
    }

    #[test]
    fn test_fresh_lists_skip_update() {
        let lists = tempfile::tempdir().unwrap();
        std::fs::write(lists.path().join("archive_Packages"), "").unwrap();
        let shell = Arc::new(ScriptedShell::default());
        let apt = AptBackend::new(shell.clone()).with_lists_dir(lists.path());

        apt.update_pkg_lists_if_required().unwrap();
        assert!(shell.commands().is_empty());
    }
}
