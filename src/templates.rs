//! Built-in templates (`bin`, `external`, `src`) and the `core` source.

use anyhow::{Context, Result, anyhow};
use declarative::{
    Body, CommandRequirement, Coercion, Dep, DepContext, FieldDefault, MetResult,
    Registry, ShellOptions, SourceLocation, Template, Value, VersionConstraint,
};
use fetchkit::Fetcher;
use pkgkit::PackageManager;
use std::sync::Arc;

/// Name of the source holding the built-in deps
pub const CORE_SOURCE: &str = "core";

const HOMEBREW_INSTALL: &str = "NONINTERACTIVE=1 /bin/bash -c \"$(curl -fsSL https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh)\"";

/// Register the built-in templates and the `core` source.
pub fn register(
    registry: &mut Registry,
    manager: Option<Arc<dyn PackageManager>>,
    fetcher: Arc<Fetcher>,
) -> Result<()> {
    registry
        .templates
        .define_builtin(bin_template(manager.clone())?)?;
    registry.templates.define_builtin(external_template()?)?;
    registry.templates.define_builtin(src_template(fetcher)?)?;

    registry.sources.begin_load(CORE_SOURCE, SourceLocation::Implicit)?;
    registry.add_dep(CORE_SOURCE, homebrew_dep())?;
    registry.add_dep(CORE_SOURCE, apt_dep(manager))?;
    registry.sources.finish_load(CORE_SOURCE)?;
    Ok(())
}

/// Deps installed through the host's package manager.
fn bin_template(manager: Option<Arc<dyn PackageManager>>) -> Result<Template> {
    let requires_manager = manager.clone();
    let met_manager = manager.clone();
    let meet_manager = manager;

    let template = Template::new("bin")
        .with_fields(|d| {
            d.accepts_list_for(
                "installs",
                FieldDefault::computed(|f| Some(Value::from(f.base_name()))),
                Coercion::None,
                Some("via"),
            )?;
            d.accepts_value_for("via", FieldDefault::None)?;
            d.accepts_list_for(
                "provides",
                FieldDefault::computed(|f| f.get("installs").cloned()),
                Coercion::Basename,
                None,
            )?;
            d.accepts_value_for("version", FieldDefault::None)?;
            Ok(())
        })?
        .with_body(
            Body::default()
                .requires_with(move |_ctx| {
                    Ok(requires_manager
                        .iter()
                        .map(|m| m.manager_dep())
                        .collect())
                })
                .met(move |ctx| {
                    let Some(manager) = &met_manager else {
                        return Ok(MetResult::unmeetable(
                            "no supported package manager on this host",
                        ));
                    };
                    provided_commands_met(ctx, |cmd| manager.cmd_in_path(cmd))
                })
                .meet(move |ctx| {
                    let manager = meet_manager
                        .as_ref()
                        .ok_or_else(|| anyhow!("no supported package manager on this host"))?;
                    manager.update_pkg_lists_if_required()?;
                    manager.install(&ctx.list("installs"))?;
                    Ok(())
                }),
        );
    Ok(template)
}

/// Check every `provides` entry is on `PATH` at an acceptable version.
///
/// The dep's `version` field applies to entries without their own
/// constraint; a bare number there means "at least".
fn provided_commands_met(
    ctx: &DepContext,
    in_path: impl Fn(&str) -> bool,
) -> Result<MetResult> {
    let fallback = match ctx.field("version").map(ToString::to_string) {
        Some(text) if !text.trim().is_empty() => Some(minimum_version(&text)?),
        _ => None,
    };

    for entry in ctx.list("provides") {
        let mut requirement = CommandRequirement::parse(&entry)?;
        if requirement.constraint.is_none() {
            requirement.constraint.clone_from(&fallback);
        }

        if !in_path(&requirement.command) {
            log::info!("{}: {} is not in PATH", ctx.name(), requirement.command);
            return Ok(MetResult::NotMet);
        }
        if requirement.constraint.is_some() {
            let output = ctx.shell().run(
                &format!("{} --version", requirement.command),
                &ShellOptions::default(),
            )?;
            let text = format!("{}{}", output.stdout_str(), output.stderr_str());
            if !requirement.satisfied_by(&text) {
                log::info!("{}: {} does not satisfy {requirement}", ctx.name(), text.trim());
                return Ok(MetResult::NotMet);
            }
        }
    }
    Ok(MetResult::Met)
}

fn minimum_version(text: &str) -> Result<VersionConstraint> {
    let text = text.trim();
    let constraint = if text.starts_with(|c: char| c.is_ascii_digit()) {
        VersionConstraint::parse(&format!(">= {text}"))
    } else {
        VersionConstraint::parse(text)
    };
    constraint.with_context(|| format!("invalid version '{text}'"))
}

/// Deps that only a person can meet.
fn external_template() -> Result<Template> {
    let template = Template::new("external")
        .with_fields(|d| {
            d.accepts_value_for("instructions", FieldDefault::None)?;
            d.accepts_block_for("otherwise", None)?;
            Ok(())
        })?
        .with_body(Body::default().met(|ctx| {
            match ctx.dep_check() {
                Some(MetResult::Met) => return Ok(MetResult::Met),
                Some(unmeetable @ MetResult::Unmeetable { .. }) => return Ok(unmeetable.clone()),
                _ => {}
            }
            ctx.call_block("otherwise")?;
            let instructions = ctx
                .field("instructions")
                .map_or_else(|| format!("{} has to be set up by hand", ctx.name()), ToString::to_string);
            Ok(MetResult::unmeetable(instructions))
        }));
    Ok(template)
}

/// Deps built from a source archive or checkout.
fn src_template(fetcher: Arc<Fetcher>) -> Result<Template> {
    let template = Template::new("src")
        .with_fields(|d| {
            d.accepts_list_for("source", FieldDefault::None, Coercion::None, None)?;
            d.accepts_value_for("prefix", "/usr/local")?;
            d.accepts_value_for("configure", "./configure --prefix={{prefix}}")?;
            d.accepts_value_for("build", "make")?;
            d.accepts_value_for("install", "make install")?;
            d.accepts_list_for(
                "provides",
                FieldDefault::computed(|f| Some(Value::from(f.base_name()))),
                Coercion::Basename,
                None,
            )?;
            Ok(())
        })?
        .with_body(
            Body::default()
                .met(|ctx| {
                    let ctx: &DepContext = ctx;
                    provided_commands_met(ctx, |cmd| ctx.succeeds(&format!("command -v {cmd}")))
                })
                .meet(move |ctx| {
                    let uris = ctx.list("source");
                    let dir = fetcher
                        .fetch(&uris, ctx.base_name())
                        .with_context(|| format!("fetching {}", ctx.name()))?;
                    for step in ["configure", "build", "install"] {
                        let text = ctx.field(step).map(ToString::to_string).unwrap_or_default();
                        if text.trim().is_empty() {
                            continue;
                        }
                        let command = ctx.render(&text)?;
                        ctx.run_in(&dir, &command)?;
                    }
                    Ok(())
                }),
        );
    Ok(template)
}

fn homebrew_dep() -> Dep {
    Dep::new("homebrew").body(
        Body::default()
            .met(|ctx| {
                if !ctx.host().is_macos() && !ctx.host().is_linux() {
                    return Ok(MetResult::unmeetable("Homebrew needs macOS or Linux"));
                }
                Ok(MetResult::from(ctx.succeeds("command -v brew")
                    || ctx.succeeds("test -x /opt/homebrew/bin/brew")
                    || ctx.succeeds("test -x /usr/local/bin/brew")))
            })
            .meet(|ctx| {
                ctx.run(HOMEBREW_INSTALL)?;
                Ok(())
            }),
    )
}

fn apt_dep(manager: Option<Arc<dyn PackageManager>>) -> Dep {
    Dep::new("apt").body(Body::default().met(move |ctx| {
        if ctx.succeeds("command -v apt-get") {
            return Ok(MetResult::Met);
        }
        let reason = match &manager {
            Some(m) => format!("apt is not available; this host uses {}", m.key()),
            None => "apt is only available on Debian-based systems".to_string(),
        };
        Ok(MetResult::unmeetable(reason))
    }))
}

#[cfg(test)]
pub(crate) mod testing {
    use declarative::{CommandOutput, Shell, ShellOptions};
    use std::sync::Mutex;

    /// Shell double: commands matching a prefix get a canned answer,
    /// everything else succeeds with empty output.
    #[derive(Default)]
    pub struct FakeShell {
        answers: Vec<(String, bool, String)>,
        pub log: Mutex<Vec<String>>,
    }

    impl FakeShell {
        pub fn answer(mut self, prefix: &str, success: bool, stdout: &str) -> Self {
            self.answers
                .push((prefix.to_string(), success, stdout.to_string()));
            self
        }

        pub fn commands(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl Shell for FakeShell {
        fn run(&self, command: &str, _: &ShellOptions) -> declarative::Result<CommandOutput> {
            self.log.lock().unwrap().push(command.to_string());
            let (success, stdout) = self
                .answers
                .iter()
                .find(|(prefix, _, _)| command.starts_with(prefix.as_str()))
                .map_or((true, String::new()), |(_, s, out)| (*s, out.clone()));
            Ok(CommandOutput {
                stdout: stdout.into_bytes(),
                stderr: Vec::new(),
                success,
                status: Some(i32::from(!success)),
            })
        }
    }
}
