//! Homebrew backend using `brew` commands.

use super::{PackageManager, missing, quote};
use crate::error::{Error, Result};
use crate::retry::{RetryConfig, with_retry};
use declarative::{DepRef, Shell, ShellOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Common install locations, checked before `PATH`.
const BREW_PATHS: [&str; 3] = [
    "/opt/homebrew/bin/brew",              // Apple Silicon
    "/usr/local/bin/brew",                 // Intel
    "/home/linuxbrew/.linuxbrew/bin/brew", // Linux
];

pub struct BrewBackend {
    shell: Arc<dyn Shell>,
    retry: RetryConfig,
}

impl BrewBackend {
    pub fn new(shell: Arc<dyn Shell>) -> Self {
        Self {
            shell,
            retry: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Path to the brew executable.
    fn brew(&self) -> Result<String> {
        if let Some(path) = BREW_PATHS.iter().find(|p| Path::new(p).exists()) {
            return Ok((*path).to_string());
        }
        let output = self.shell.run("command -v brew", &ShellOptions::default())?;
        let path = output.stdout_str().trim().to_string();
        if output.success && !path.is_empty() {
            Ok(path)
        } else {
            Err(Error::ManagerNotFound("Homebrew".to_string()))
        }
    }
}

impl PackageManager for BrewBackend {
    fn key(&self) -> &'static str {
        "brew"
    }

    fn is_available(&self) -> bool {
        self.brew().is_ok()
    }

    fn installed_version(&self, package: &str) -> Result<Option<String>> {
        let command = format!("{} info --json=v2 {}", self.brew()?, quote(package));
        let output = self.shell.run(&command, &ShellOptions::default())?;
        if !output.success {
            return Ok(None);
        }
        let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        Ok(parse_installed_version(&json))
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        let missing = missing(self, packages)?;
        if missing.is_empty() {
            return Ok(());
        }

        let brew = self.brew()?;
        let words: Vec<String> = missing.iter().map(|p| quote(p)).collect();
        let command = format!("{brew} install {}", words.join(" "));
        log::info!("Installing with brew: {}", missing.join(", "));

        with_retry(&self.retry, "brew install", || {
            let output = self.shell.run(&command, &ShellOptions::logged("brew"))?;
            if output.success {
                return Ok(());
            }
            match Error::from_output("brew", &output.stderr_str(), &missing) {
                e if e.is_ignorable() => Ok(()),
                e => Err(e),
            }
        })
    }

    fn manager_dep(&self) -> DepRef {
        DepRef::new("homebrew").in_source("core")
    }

    fn update_pkg_lists_if_required(&self) -> Result<()> {
        // brew refreshes its own formulae before installing.
        Ok(())
    }

    fn prefix(&self) -> PathBuf {
        self.brew()
            .ok()
            .and_then(|brew| {
                self.shell
                    .run(&format!("{brew} --prefix"), &ShellOptions::default())
                    .ok()
            })
            .filter(|output| output.success)
            .map(|output| PathBuf::from(output.stdout_str().trim()))
            .unwrap_or_else(|| PathBuf::from("/opt/homebrew"))
    }
}

/// Version of the installed formula or cask in `brew info --json=v2` output.
fn parse_installed_version(json: &serde_json::Value) -> Option<String> {
    let formula = json["formulae"]
        .as_array()
        .and_then(|arr| arr.first())
        .and_then(|f| f["installed"].as_array())
        .and_then(|installed| installed.last())
        .and_then(|i| i["version"].as_str());

    let cask = || {
        json["casks"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|c| c["installed"].as_str())
    };

    formula.or_else(cask).map(str::to_string)
}
