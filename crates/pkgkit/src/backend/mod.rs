//! Package-manager abstraction.
//!
//! The [`PackageManager`] trait is what the `bin` template talks to. Each
//! backend drives its manager's CLI through the injected [`Shell`], so
//! tests can substitute a scripted shell.

pub mod apt;
pub mod brew;

use crate::error::Result;
use declarative::{DepRef, Host, Shell, VersionConstraint};
use std::path::PathBuf;
use std::sync::Arc;

/// One host package ecosystem.
pub trait PackageManager: Send + Sync {
    /// Key used in per-host field mappings (`brew`, `apt`)
    fn key(&self) -> &'static str;

    /// Check if the manager itself is usable.
    fn is_available(&self) -> bool;

    /// Installed version of a package, or `None` if it isn't installed.
    fn installed_version(&self, package: &str) -> Result<Option<String>>;

    /// Install packages. Already-installed packages are skipped.
    fn install(&self, packages: &[String]) -> Result<()>;

    /// The dep that makes this manager usable.
    fn manager_dep(&self) -> DepRef;

    /// Refresh package lists when they are stale.
    fn update_pkg_lists_if_required(&self) -> Result<()>;

    /// Where the manager installs things.
    fn prefix(&self) -> PathBuf;

    /// Check if a package is installed, optionally at a matching version.
    ///
    /// A version the constraint cannot parse does not match.
    fn has(&self, package: &str, constraint: Option<&VersionConstraint>) -> Result<bool> {
        let installed = self.installed_version(package)?;
        Ok(match (installed, constraint) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(version), Some(constraint)) => constraint.matches_str(&version),
        })
    }

    /// Check if a command resolves on `PATH`.
    fn cmd_in_path(&self, command: &str) -> bool {
        which::which(command).is_ok()
    }
}

/// Pick the backend for a host, if one is supported.
pub fn detect(host: &Host, shell: Arc<dyn Shell>) -> Option<Arc<dyn PackageManager>> {
    match host.pkg_manager.as_deref()? {
        "brew" => Some(Arc::new(brew::BrewBackend::new(shell))),
        "apt" => Some(Arc::new(apt::AptBackend::new(shell))),
        other => {
            log::debug!("No package manager backend for '{other}'");
            None
        }
    }
}

/// Keep only the packages that are not installed yet.
fn missing(manager: &dyn PackageManager, packages: &[String]) -> Result<Vec<String>> {
    let mut missing = Vec::new();
    for package in packages {
        if !manager.has(package, None)? {
            missing.push(package.clone());
        }
    }
    Ok(missing)
}

/// Quote a word for `sh`.
fn quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.+:/@=".contains(c))
    {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use declarative::{CommandOutput, Result, Shell, ShellOptions};
    use std::sync::Mutex;

    /// Shell double answering commands by prefix.
    #[derive(Default)]
    pub struct ScriptedShell {
        pub answers: Vec<(String, CommandOutput)>,
        pub log: Mutex<Vec<(String, bool)>>,
    }

    impl ScriptedShell {
        pub fn answer(mut self, prefix: &str, success: bool, stdout: &str, stderr: &str) -> Self {
            self.answers.push((
                prefix.to_string(),
                CommandOutput {
                    stdout: stdout.as_bytes().to_vec(),
                    stderr: stderr.as_bytes().to_vec(),
                    success,
                    status: Some(i32::from(!success)),
                },
            ));
            self
        }

        /// Commands run so far, with whether they asked for sudo.
        pub fn commands(&self) -> Vec<(String, bool)> {
            self.log.lock().unwrap().clone()
        }
    }

    impl Shell for ScriptedShell {
        fn run(&self, command: &str, options: &ShellOptions) -> Result<CommandOutput> {
            self.log
                .lock()
                .unwrap()
                .push((command.to_string(), options.sudo));
            Ok(self
                .answers
                .iter()
                .find(|(prefix, _)| command.starts_with(prefix.as_str()))
                .map(|(_, output)| output.clone())
                .unwrap_or_else(|| CommandOutput {
                    success: true,
                    status: Some(0),
                    ..CommandOutput::default()
                }))
        }
    }
}
