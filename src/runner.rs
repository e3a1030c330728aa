//! Shell execution for lifecycle steps.

use chrono::Local;
use declarative::{CommandOutput, Shell, ShellOptions};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Runs commands with `sh -c`, optionally through `sudo`, appending logged
/// runs to `<logs>/<label>.log`.
pub struct ShellRunner {
    logs_dir: PathBuf,
    allow_sudo: bool,
    is_root: bool,
}

impl ShellRunner {
    pub fn new(logs_dir: impl Into<PathBuf>, allow_sudo: bool) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            allow_sudo,
            is_root: is_root(),
        }
    }

    fn command_for(&self, command: &str, sudo: bool) -> declarative::Result<Command> {
        if sudo && !self.is_root {
            if !self.allow_sudo {
                return Err(declarative::Error::shell(
                    command,
                    None,
                    "sudo is disabled in config.toml",
                ));
            }
            let mut cmd = Command::new("sudo");
            cmd.args(["sh", "-c", command]);
            return Ok(cmd);
        }
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        Ok(cmd)
    }

    fn log_path(&self, label: &str) -> PathBuf {
        let file: String = label
            .chars()
            .map(|c| if c == '/' || c == ':' { '_' } else { c })
            .collect();
        self.logs_dir.join(format!("{file}.log"))
    }

    fn append_log(&self, label: &str, command: &str, output: &CommandOutput) {
        let path = self.log_path(label);
        if let Err(e) = write_log(&path, command, output) {
            log::warn!("Could not write {}: {e}", path.display());
        }
    }
}

fn write_log(path: &Path, command: &str, output: &CommandOutput) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(
        file,
        "==> {} $ {command}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;
    file.write_all(&output.stdout)?;
    file.write_all(&output.stderr)?;
    match output.status {
        Some(code) => writeln!(file, "<== exit {code}"),
        None => writeln!(file, "<== killed by signal"),
    }
}

impl Shell for ShellRunner {
    fn run(&self, command: &str, options: &ShellOptions) -> declarative::Result<CommandOutput> {
        log::debug!(
            "Running{} `{command}`",
            if options.sudo { " (sudo)" } else { "" }
        );

        let mut cmd = self.command_for(command, options.sudo)?;
        if let Some(dir) = &options.cwd {
            cmd.current_dir(dir);
        }
        // sudo prompts on the terminal
        cmd.stdin(Stdio::inherit());

        let output = cmd
            .output()
            .map_err(|e| declarative::Error::shell(command, None, e.to_string()))?;
        let output = CommandOutput::from(output);

        if options.log {
            let label = options.label.as_deref().unwrap_or("choro");
            self.append_log(label, command, &output);
        }
        Ok(output)
    }
}

fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_output() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = ShellRunner::new(tmp.path(), false);

        let output = runner
            .run("echo out; echo err >&2; exit 3", &ShellOptions::default())
            .unwrap();
        assert!(!output.success);
        assert_eq!(output.status, Some(3));
        assert_eq!(output.stdout_str().trim(), "out");
        assert_eq!(output.stderr_str().trim(), "err");
    }

    #[test]
    fn test_logged_run_appends_to_dep_log() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = ShellRunner::new(tmp.path(), false);
        let options = ShellOptions::logged("core:ripgrep.bin");

        runner.run("echo first", &options).unwrap();
        runner.run("echo second", &options).unwrap();

        let log = fs::read_to_string(tmp.path().join("core_ripgrep.bin.log")).unwrap();
        assert!(log.contains("$ echo first"));
        assert!(log.contains("second\n"));
        assert_eq!(log.matches("<== exit 0").count(), 2);
    }

    #[test]
    fn test_run_in_directory() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("marker"), "").unwrap();
        let runner = ShellRunner::new(tmp.path().join("logs"), false);

        let output = runner
            .run("ls", &ShellOptions::default().in_dir(tmp.path()))
            .unwrap();
        assert!(output.stdout_str().contains("marker"));
    }

    #[test]
    fn test_sudo_refused_when_disabled() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = ShellRunner {
            logs_dir: tmp.path().to_path_buf(),
            allow_sudo: false,
            is_root: false,
        };
        let err = runner
            .run("true", &ShellOptions::default().with_sudo(true))
            .unwrap_err();
        assert!(err.to_string().contains("sudo is disabled"));
    }

    #[test]
    fn test_root_skips_sudo() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = ShellRunner {
            logs_dir: tmp.path().to_path_buf(),
            allow_sudo: false,
            is_root: true,
        };
        let output = runner
            .run("true", &ShellOptions::default().with_sudo(true))
            .unwrap();
        assert!(output.success);
    }
}
