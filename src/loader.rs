//! Loading dep sources from directories of TOML files.
//!
//! Each `*.toml` file may hold `uses`, `[[template]]` and `[[dep]]` tables.
//! Lifecycle steps are shell snippets rendered against the dep's variables;
//! a `met` snippet exiting with status 2 marks the dep unmeetable.

use anyhow::{Context, Result, bail};
use declarative::{
    Body, Coercion, Dep, DepContext, DepRef, FieldDefault, FieldInput, MetResult, Registry,
    ShellOptions, SourceLocation, Template, Value,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Exit status of a `met` snippet that means "cannot be met automatically"
pub const UNMEETABLE_STATUS: i32 = 2;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DepFile {
    #[serde(default)]
    uses: Vec<String>,
    #[serde(default, rename = "template")]
    templates: Vec<TemplateDef>,
    #[serde(default, rename = "dep")]
    deps: Vec<DepDef>,
}

#[derive(Debug, Deserialize)]
struct TemplateDef {
    name: String,
    #[serde(default)]
    accepts_value_for: BTreeMap<String, ValueFieldDef>,
    #[serde(default)]
    accepts_list_for: BTreeMap<String, ListFieldDef>,
    #[serde(flatten)]
    lifecycle: LifecycleDef,
    #[serde(flatten)]
    unknown: BTreeMap<String, toml::Value>,
}

/// `{ default = .. }` or just the default value.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ValueFieldDef {
    Spec {
        #[serde(default)]
        default: Option<Value>,
    },
    Literal(Value),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListFieldDef {
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    choose_with: Option<String>,
    /// Reduce entries to their last path component
    #[serde(default)]
    basename: bool,
}

#[derive(Debug, Default, Deserialize)]
struct LifecycleDef {
    #[serde(default)]
    requires: Vec<RequireDef>,
    before: Option<String>,
    met: Option<String>,
    meet: Option<String>,
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RequireDef {
    Name(String),
    With {
        dep: String,
        #[serde(default)]
        with: BTreeMap<String, Value>,
    },
}

#[derive(Debug, Deserialize)]
struct DepDef {
    name: String,
    template: Option<String>,
    #[serde(flatten)]
    lifecycle: LifecycleDef,
    /// Everything else sets a declared field
    #[serde(flatten)]
    fields: BTreeMap<String, FieldDef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldDef {
    Plain(Value),
    PerHost(BTreeMap<String, Value>),
}

impl From<FieldDef> for FieldInput {
    fn from(def: FieldDef) -> Self {
        match def {
            FieldDef::Plain(value) => FieldInput::Plain(value),
            FieldDef::PerHost(choices) => FieldInput::PerHost(choices.into_iter().collect()),
        }
    }
}

/// Loads sources into a [`Registry`], following `uses` between them.
pub struct Loader<'a> {
    registry: &'a mut Registry,
}

impl<'a> Loader<'a> {
    pub fn new(registry: &'a mut Registry) -> Self {
        Self { registry }
    }

    /// Make a source available for loading and `uses`, at the lowest
    /// precedence so far. Registering a known name again keeps the first.
    pub fn register(&mut self, name: &str, location: SourceLocation) -> Result<()> {
        if self.registry.sources.get(name).is_none() {
            self.registry
                .sources
                .add(declarative::Source::new(name, location))?;
        }
        Ok(())
    }

    /// Load every registered source.
    pub fn load_all(&mut self) -> Result<()> {
        let names: Vec<String> = self
            .registry
            .sources
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        for name in names {
            self.load(&name)?;
        }
        Ok(())
    }

    /// Load one source and, first, the sources it uses.
    pub fn load(&mut self, name: &str) -> Result<()> {
        let location = match self.registry.sources.get(name) {
            Some(source) => source.location().clone(),
            None => bail!(declarative::Error::SourceNotFound {
                name: name.to_string()
            }),
        };

        if !self.registry.sources.begin_load(name, location.clone())? {
            return Ok(());
        }

        let files = match &location {
            SourceLocation::Implicit => Vec::new(),
            SourceLocation::Local(dir) | SourceLocation::Remote { path: dir, .. } => dep_files(dir)
                .into_iter()
                .map(|file| {
                    read_file(&file).with_context(|| format!("in {}", file.display()))
                })
                .collect::<Result<Vec<_>>>()?,
        };

        for used in files.iter().flat_map(|f| &f.uses) {
            self.load(used)
                .with_context(|| format!("loading source '{used}'"))?;
        }

        // Templates first so deps in any file of this source can bind to them
        let mut deps = Vec::new();
        for file in files {
            for def in file.templates {
                let template = def.name.clone();
                self.registry.templates.define(build_template(def)?)?;
                if let Some(source) = self.registry.sources.get_mut(name) {
                    source.note_template(template);
                }
            }
            deps.extend(file.deps);
        }
        for def in deps {
            let dep = def.name.clone();
            self.registry
                .add_dep(name, build_dep(def)?)
                .with_context(|| format!("in dep '{dep}' of source '{name}'"))?;
        }

        self.registry.sources.finish_load(name)?;
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<DepFile> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// `*.toml` files under `dir`, skipping VCS metadata, in a stable order.
fn dep_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    files.sort();
    files
}

fn build_template(def: TemplateDef) -> Result<Template> {
    let TemplateDef {
        name,
        accepts_value_for,
        accepts_list_for,
        lifecycle,
        unknown,
    } = def;
    if let Some(key) = unknown.keys().next() {
        bail!("template '{name}' has unknown key '{key}'");
    }

    let template = Template::new(name).with_fields(|d| {
        for (field, spec) in accepts_value_for {
            let default = match spec {
                ValueFieldDef::Spec { default } => default.map_or(FieldDefault::None, Into::into),
                ValueFieldDef::Literal(value) => value.into(),
            };
            d.accepts_value_for(&field, default)?;
        }
        for (field, spec) in accepts_list_for {
            let coercion = if spec.basename {
                Coercion::Basename
            } else {
                Coercion::None
            };
            d.accepts_list_for(
                &field,
                spec.default.map_or(FieldDefault::None, Into::into),
                coercion,
                spec.choose_with.as_deref(),
            )?;
        }
        Ok(())
    })?;
    Ok(template.with_body(build_body(lifecycle)?))
}

fn build_dep(def: DepDef) -> Result<Dep> {
    let mut dep = Dep::new(def.name);
    if let Some(template) = def.template {
        dep = dep.template(template);
    }
    for (field, value) in def.fields {
        dep = dep.set(field, FieldInput::from(value));
    }
    Ok(dep.body(build_body(def.lifecycle)?))
}

fn build_body(def: LifecycleDef) -> Result<Body> {
    let mut body = Body::default();

    for requirement in def.requires {
        let dep_ref = match requirement {
            RequireDef::Name(name) => DepRef::parse(&name)?,
            RequireDef::With { dep, with } => with
                .into_iter()
                .fold(DepRef::parse(&dep)?, |r, (k, v)| r.with_arg(k, v)),
        };
        body = body.requires(dep_ref);
    }

    if let Some(snippet) = def.met {
        body = body.met(move |ctx| run_met(ctx, &snippet));
    }
    if let Some(snippet) = def.before {
        body = body.before(move |ctx| run_step(ctx, &snippet));
    }
    if let Some(snippet) = def.meet {
        body = body.meet(move |ctx| run_step(ctx, &snippet));
    }
    if let Some(snippet) = def.after {
        body = body.after(move |ctx| run_step(ctx, &snippet));
    }
    Ok(body)
}

fn run_met(ctx: &mut DepContext, snippet: &str) -> anyhow::Result<MetResult> {
    let command = ctx.render(snippet)?;
    let output = ctx
        .shell()
        .run(&command, &ShellOptions::logged(ctx.qualified_name()))?;
    Ok(match output.status {
        Some(0) => MetResult::Met,
        Some(UNMEETABLE_STATUS) => {
            let message = output.stderr_str().trim().to_string();
            MetResult::unmeetable(if message.is_empty() {
                format!("`{command}` reported unmeetable")
            } else {
                message
            })
        }
        _ => MetResult::NotMet,
    })
}

fn run_step(ctx: &mut DepContext, snippet: &str) -> anyhow::Result<()> {
    let command = ctx.render(snippet)?;
    ctx.run(&command)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::testing::FakeShell;
    use declarative::{Engine, Host, Outcome, Shell};
    use std::sync::Arc;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    fn host() -> Arc<Host> {
        Arc::new(Host::new("linux", Some("ubuntu"), Some("apt")))
    }

    #[test]
    fn test_load_deps_and_templates() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "apps.toml",
            r#"
[[template]]
name = "app"
accepts_value_for = { path = "/Applications" }
met = "test -d '{{path}}/{{basename}}.app'"
meet = "cp -R '{{basename}}.app' '{{path}}'"

[[dep]]
name = "Firefox.app"
"#,
        );

        let mut registry = Registry::default();
        let mut loader = Loader::new(&mut registry);
        loader
            .register("local", SourceLocation::Local(tmp.path().to_path_buf()))
            .unwrap();
        loader.load_all().unwrap();

        let source = registry.sources.get("local").unwrap();
        assert_eq!(source.templates(), ["app".to_string()]);
        let dep = source.find("Firefox.app").unwrap();
        assert_eq!(dep.bound_template().unwrap().name(), "app");

        let shell = Arc::new(FakeShell::default().answer("test -d", false, ""));
        let mut engine = Engine::new(&registry, host(), shell.clone());
        let outcome = engine.meet(&DepRef::new("Firefox.app"));

        assert!(matches!(outcome, Outcome::Failed { .. }));
        assert_eq!(
            shell.commands(),
            vec![
                "test -d '/Applications/Firefox.app'",
                "cp -R 'Firefox.app' '/Applications'",
                "test -d '/Applications/Firefox.app'",
            ]
        );
    }

    #[test]
    fn test_requires_with_arguments_and_per_host_fields() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "tools.toml",
            r#"
[[template]]
name = "pkg"
accepts_list_for = { installs = { choose_with = "via" } }
met = "check {{installs}}"

[[dep]]
name = "greeting"
met = "test -f /tmp/{{who}}"

[[dep]]
name = "ripgrep.pkg"
installs = { apt = "ripgrep", brew = "rg-brew" }
requires = [{ dep = "greeting", with = { who = "world" } }]
"#,
        );

        let mut registry = Registry::default();
        let mut loader = Loader::new(&mut registry);
        loader
            .register("local", SourceLocation::Local(tmp.path().to_path_buf()))
            .unwrap();
        loader.load_all().unwrap();

        let shell = Arc::new(FakeShell::default());
        let mut engine = Engine::new(&registry, host(), shell.clone());
        assert_eq!(engine.meet(&DepRef::new("ripgrep.pkg")), Outcome::Met);
        assert_eq!(shell.commands(), vec!["test -f /tmp/world", "check ripgrep"]);
    }

    #[test]
    fn test_met_exit_status_two_is_unmeetable() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "x.toml",
            r#"
[[dep]]
name = "licence"
met = "exit 2"
meet = "echo never"
"#,
        );

        let mut registry = Registry::default();
        let mut loader = Loader::new(&mut registry);
        loader
            .register("local", SourceLocation::Local(tmp.path().to_path_buf()))
            .unwrap();
        loader.load_all().unwrap();

        let tmp_logs = tempfile::tempdir().unwrap();
        let shell: Arc<dyn Shell> = Arc::new(crate::runner::ShellRunner::new(tmp_logs.path(), false));
        let mut engine = Engine::new(&registry, host(), shell);
        let outcome = engine.meet(&DepRef::new("licence"));
        assert_eq!(outcome, Outcome::unmeetable("`exit 2` reported unmeetable"));
    }

    #[test]
    fn test_uses_loads_other_source_first() {
        let tmp = tempfile::tempdir().unwrap();
        let shared = tmp.path().join("shared");
        let mine = tmp.path().join("mine");
        write(
            &shared,
            "t.toml",
            r#"
[[template]]
name = "marker"
met = "test -f {{basename}}"
"#,
        );
        write(
            &mine,
            "d.toml",
            r#"
uses = ["shared"]

[[dep]]
name = "done.marker"
"#,
        );

        let mut registry = Registry::default();
        let mut loader = Loader::new(&mut registry);
        loader
            .register("mine", SourceLocation::Local(mine.clone()))
            .unwrap();
        loader
            .register("shared", SourceLocation::Local(shared.clone()))
            .unwrap();
        loader.load_all().unwrap();

        let dep = registry.sources.get("mine").unwrap().find("done.marker").unwrap();
        assert_eq!(dep.base_name(), "done");
        assert_eq!(
            registry.sources.get("shared").unwrap().state(),
            declarative::LoadState::Loaded
        );
    }

    #[test]
    fn test_uses_cycle_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        write(&a, "a.toml", "uses = [\"b\"]\n");
        write(&b, "b.toml", "uses = [\"a\"]\n");

        let mut registry = Registry::default();
        let mut loader = Loader::new(&mut registry);
        loader.register("a", SourceLocation::Local(a)).unwrap();
        loader.register("b", SourceLocation::Local(b)).unwrap();
        let err = loader.load_all().unwrap_err();
        assert!(format!("{err:#}").contains("already loading"));
    }

    #[test]
    fn test_unknown_field_fails_load() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "bad.toml",
            r#"
[[dep]]
name = "thing"
colour = "blue"
"#,
        );

        let mut registry = Registry::default();
        let mut loader = Loader::new(&mut registry);
        loader
            .register("local", SourceLocation::Local(tmp.path().to_path_buf()))
            .unwrap();
        let err = loader.load_all().unwrap_err();
        let definition = err
            .chain()
            .find_map(|e| e.downcast_ref::<declarative::Error>())
            .unwrap();
        assert!(definition.is_definition_error());
    }

    #[test]
    fn test_template_from_later_file_binds() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.toml", "[[dep]]\nname = \"zsh.tool\"\n");
        write(
            tmp.path(),
            "z.toml",
            "[[template]]\nname = \"tool\"\nmet = \"command -v {{basename}}\"\n",
        );

        let mut registry = Registry::default();
        let mut loader = Loader::new(&mut registry);
        loader
            .register("local", SourceLocation::Local(tmp.path().to_path_buf()))
            .unwrap();
        loader.load_all().unwrap();

        let dep = registry.sources.get("local").unwrap().find("zsh.tool").unwrap();
        assert_eq!(dep.bound_template().unwrap().name(), "tool");
    }

    #[test]
    fn test_dep_files_skip_hidden_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join(".git"), "config.toml", "");
        write(&tmp.path().join("b"), "two.toml", "");
        write(tmp.path(), "one.toml", "");
        write(tmp.path(), "README.md", "");

        let files = dep_files(tmp.path());
        assert_eq!(
            files,
            vec![tmp.path().join("b/two.toml"), tmp.path().join("one.toml")]
        );
    }
}
