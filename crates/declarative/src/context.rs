//! Execution context and collaborator traits
//!
//! Lifecycle closures receive a [`DepContext`] instead of relying on an
//! implicit receiver. Shell execution and progress reporting are injected
//! through traits so the engine does not depend on a terminal or a real
//! shell.

use crate::error::{Error, Result};
use crate::field::FieldSet;
use crate::host::Host;
use crate::scope::{Scope, Value};
use crate::types::{CommandOutput, MetResult, Outcome};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options for one shell invocation
#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    /// Run through `sudo`
    pub sudo: bool,
    /// Append command and output to the dep's log file
    pub log: bool,
    /// Log file name, usually the dep name
    pub label: Option<String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
}

impl ShellOptions {
    pub fn logged(label: impl Into<String>) -> Self {
        Self {
            log: true,
            label: Some(label.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    #[must_use]
    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }
}

/// Shell-execution collaborator
///
/// Implementations run `command` through a POSIX shell. `run` only fails
/// when the command could not be started; a non-zero exit is reported in
/// the returned output.
pub trait Shell: Send + Sync {
    /// Run a command and capture its output
    fn run(&self, command: &str, options: &ShellOptions) -> Result<CommandOutput>;

    /// Run a command, failing on a non-zero exit
    fn run_checked(&self, command: &str, options: &ShellOptions) -> Result<CommandOutput> {
        let output = self.run(command, options)?;
        if !output.success {
            return Err(Error::shell(command, output.status, output.stderr_str()));
        }
        Ok(output)
    }

    /// Run a command and return just success/failure
    fn succeeds(&self, command: &str) -> bool {
        self.run(command, &ShellOptions::default())
            .is_ok_and(|output| output.success)
    }
}

/// Progress callback for a resolution run
///
/// Implement this trait to receive updates as deps are visited.
pub trait ProgressCallback: Send {
    /// Called before a dep's requirements are resolved
    fn on_dep_start(&mut self, name: &str, depth: usize);

    /// Called once a dep has an outcome
    fn on_dep_complete(&mut self, name: &str, depth: usize, outcome: &Outcome);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_dep_start(&mut self, _name: &str, _depth: usize) {}
    fn on_dep_complete(&mut self, _name: &str, _depth: usize, _outcome: &Outcome) {}
}

/// Everything a lifecycle closure can see about the dep it is running for
pub struct DepContext {
    source: String,
    name: String,
    base_name: String,
    fields: FieldSet,
    scope: Scope,
    host: Arc<Host>,
    shell: Arc<dyn Shell>,
    dry_run: bool,
    dep_check: Option<MetResult>,
}

impl DepContext {
    /// Create a context; `scope` should already contain the dep's fields.
    pub fn new(
        source: impl Into<String>,
        name: impl Into<String>,
        base_name: impl Into<String>,
        fields: FieldSet,
        scope: Scope,
        host: Arc<Host>,
        shell: Arc<dyn Shell>,
    ) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            base_name: base_name.into(),
            fields,
            scope,
            host,
            shell,
            dry_run: false,
            dep_check: None,
        }
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The dep name without its template suffix
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// `source:name`
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.source, self.name)
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// A field value, if set or defaulted
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// A field or variable that must be present
    pub fn value(&self, name: &str) -> Result<&Value> {
        self.field(name)
            .or_else(|| self.scope.get(name))
            .ok_or_else(|| Error::UndefinedVar(name.to_string()))
    }

    /// A field as a list; empty when unset
    pub fn list(&self, name: &str) -> Vec<String> {
        self.field(name).map(Value::to_list).unwrap_or_default()
    }

    pub fn var(&self, key: &str) -> Option<&Value> {
        self.scope.get(key)
    }

    /// Set a variable visible to this dep's later lifecycle steps
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.scope.set(key, value);
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Substitute `{{key}}` placeholders from this dep's scope
    pub fn render(&self, text: &str) -> Result<String> {
        self.scope.render(text)
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn shell(&self) -> &dyn Shell {
        self.shell.as_ref()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Result of the dep's own `met?` check while the template's check runs
    pub fn dep_check(&self) -> Option<&MetResult> {
        self.dep_check.as_ref()
    }

    pub(crate) fn set_dep_check(&mut self, result: Option<MetResult>) {
        self.dep_check = result;
    }

    /// Run a command, logged under this dep's name, failing on non-zero exit
    pub fn run(&self, command: &str) -> Result<CommandOutput> {
        self.shell
            .run_checked(command, &ShellOptions::logged(&self.name))
    }

    /// Run a command as root
    pub fn sudo(&self, command: &str) -> Result<CommandOutput> {
        self.shell
            .run_checked(command, &ShellOptions::logged(&self.name).with_sudo(true))
    }

    /// Run a command in `dir`
    pub fn run_in(&self, dir: &Path, command: &str) -> Result<CommandOutput> {
        self.shell
            .run_checked(command, &ShellOptions::logged(&self.name).in_dir(dir))
    }

    /// Run a command and report whether it exited successfully
    pub fn succeeds(&self, command: &str) -> bool {
        self.shell.succeeds(command)
    }

    /// Run a block field. Returns `false` when the field has no block.
    pub fn call_block(&mut self, name: &str) -> anyhow::Result<bool> {
        let Some(block) = self.fields.block(name).cloned() else {
            return Ok(false);
        };
        block(self)?;
        Ok(true)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{MockShell, context};
    use super::*;

    #[test]
    fn test_run_checked_reports_failure() {
        let shell = Arc::new(MockShell::failing(&["false"]));
        let ctx = context(shell.clone());

        assert!(ctx.run("true").is_ok());
        let err = ctx.run("false").unwrap_err();
        assert!(matches!(err, Error::Shell { status: Some(1), .. }));
        assert!(!ctx.succeeds("false"));
        assert_eq!(shell.commands(), vec!["true", "false", "false"]);
    }

    #[test]
    fn test_vars_and_render() {
        let mut ctx = context(Arc::new(MockShell::default()));
        ctx.set_var("who", "world");
        assert_eq!(ctx.render("{{greeting}} {{who}}").unwrap(), "hello world");
        assert_eq!(ctx.value("who").unwrap().to_string(), "world");
        assert!(matches!(ctx.value("nope"), Err(Error::UndefinedVar(_))));
        assert_eq!(ctx.qualified_name(), "local:demo");
    }

    #[test]
    fn test_call_block_without_block() {
        let mut ctx = context(Arc::new(MockShell::default()));
        assert!(!ctx.call_block("otherwise").unwrap());
    }
}
