//! Sources and the registry that owns them.
//!
//! A [`Source`] is a named, ordered collection of dep definitions. The
//! [`SourceRegistry`] keeps sources in precedence order: a bare dep name is
//! looked up in each source in turn and the first match wins.

use crate::dep::{Dep, DepRef};
use crate::error::{Error, Result};
use crate::scope::Scope;
use crate::template::TemplateRegistry;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Where a source's definitions come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// Defined in code
    Implicit,
    /// A directory on this machine
    Local(PathBuf),
    /// Fetched from `uri` into `path`
    Remote { uri: String, path: PathBuf },
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Implicit => f.write_str("(built in)"),
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote { uri, .. } => f.write_str(uri),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
        })
    }
}

#[derive(Debug)]
pub struct Source {
    name: String,
    location: SourceLocation,
    state: LoadState,
    deps: Vec<Dep>,
    templates: Vec<String>,
}

impl Source {
    pub fn new(name: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            name: name.into(),
            location,
            state: LoadState::Unloaded,
            deps: Vec::new(),
            templates: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Add a dep, binding it to its template and validating its fields.
    pub fn add_dep(&mut self, mut dep: Dep, templates: &TemplateRegistry) -> Result<()> {
        if self.find(dep.name()).is_some() {
            return Err(Error::DuplicateDep {
                source_name: self.name.clone(),
                name: dep.name().to_string(),
            });
        }

        let template = templates.binding_for(dep.name(), dep.explicit_template())?;
        dep.bind(template)?;
        log::trace!("{}: defined dep '{}'", self.name, dep.name());
        self.deps.push(dep);
        Ok(())
    }

    /// Record that this source defined a template.
    pub fn note_template(&mut self, name: impl Into<String>) {
        self.templates.push(name.into());
    }

    pub fn find(&self, name: &str) -> Option<&Dep> {
        self.deps.iter().find(|d| d.name() == name)
    }

    pub fn deps(&self) -> &[Dep] {
        &self.deps
    }

    pub fn templates(&self) -> &[String] {
        &self.templates
    }
}

/// All known sources, in lookup precedence order.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source at the lowest precedence.
    pub fn add(&mut self, source: Source) -> Result<&mut Source> {
        if self.get(source.name()).is_some() {
            return Err(Error::DuplicateSource(source.name));
        }
        self.sources.push(source);
        let last = self.sources.len() - 1;
        Ok(&mut self.sources[last])
    }

    pub fn get(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Source> {
        self.sources.iter_mut().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    /// Mark a source as loading, registering it if it is new.
    ///
    /// Returns `false` when it is already loaded and there is nothing to do.
    pub fn begin_load(&mut self, name: &str, location: SourceLocation) -> Result<bool> {
        if self.get(name).is_none() {
            self.add(Source::new(name, location))?;
        }
        let source = self.get_mut(name).ok_or_else(|| Error::SourceNotFound {
            name: name.to_string(),
        })?;

        match source.state {
            LoadState::Loading => Err(Error::SourceLoadCycle(name.to_string())),
            LoadState::Loaded => Ok(false),
            LoadState::Unloaded => {
                source.state = LoadState::Loading;
                log::debug!("Loading source '{name}'");
                Ok(true)
            }
        }
    }

    pub fn finish_load(&mut self, name: &str) -> Result<()> {
        let source = self.get_mut(name).ok_or_else(|| Error::SourceNotFound {
            name: name.to_string(),
        })?;
        source.state = LoadState::Loaded;
        log::debug!("Loaded source '{name}' ({} deps)", source.deps.len());
        Ok(())
    }

    /// Find the dep a reference points at.
    pub fn locate(&self, reference: &DepRef) -> Result<(&Source, &Dep)> {
        let not_found = || Error::DepNotFound {
            name: match &reference.source {
                Some(source) => format!("{source}:{}", reference.name),
                None => reference.name.clone(),
            },
        };

        if let Some(source_name) = &reference.source {
            let source = self.get(source_name).ok_or_else(|| Error::SourceNotFound {
                name: source_name.clone(),
            })?;
            return source
                .find(&reference.name)
                .map(|dep| (source, dep))
                .ok_or_else(not_found);
        }

        self.sources
            .iter()
            .find_map(|source| source.find(&reference.name).map(|dep| (source, dep)))
            .ok_or_else(not_found)
    }
}

/// Templates, sources and global variables for one process.
///
/// Populated at startup; the engine borrows it immutably for a whole run.
#[derive(Debug)]
pub struct Registry {
    pub templates: TemplateRegistry,
    pub sources: SourceRegistry,
    globals: Arc<Scope>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Scope::new("global"))
    }
}

impl Registry {
    pub fn new(globals: Scope) -> Self {
        Self {
            templates: TemplateRegistry::new(),
            sources: SourceRegistry::new(),
            globals: globals.into_shared(),
        }
    }

    pub fn globals(&self) -> &Arc<Scope> {
        &self.globals
    }

    /// Add a dep to a registered source.
    pub fn add_dep(&mut self, source: &str, dep: Dep) -> Result<()> {
        let target = self
            .sources
            .get_mut(source)
            .ok_or_else(|| Error::SourceNotFound {
                name: source.to_string(),
            })?;
        target.add_dep(dep, &self.templates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Template;

    fn registry() -> Registry {
        let mut registry = Registry::default();
        registry
            .templates
            .define_builtin(
                Template::new("bin")
                    .with_fields(|d| d.accepts_value_for("version", "").map(|_| ()))
                    .unwrap(),
            )
            .unwrap();
        for name in ["cwd", "local"] {
            registry
                .sources
                .add(Source::new(name, SourceLocation::Implicit))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_precedence_and_qualified_lookup() {
        let mut registry = registry();
        registry.add_dep("local", Dep::new("git")).unwrap();
        registry.add_dep("cwd", Dep::new("git")).unwrap();
        registry.add_dep("local", Dep::new("curl")).unwrap();

        let (source, _) = registry.sources.locate(&DepRef::new("git")).unwrap();
        assert_eq!(source.name(), "cwd");

        let (source, _) = registry
            .sources
            .locate(&DepRef::parse("local:git").unwrap())
            .unwrap();
        assert_eq!(source.name(), "local");

        let (source, _) = registry.sources.locate(&DepRef::new("curl")).unwrap();
        assert_eq!(source.name(), "local");
    }

    #[test]
    fn test_lookup_errors() {
        let registry = registry();
        assert!(matches!(
            registry.sources.locate(&DepRef::new("nope")),
            Err(Error::DepNotFound { name }) if name == "nope"
        ));
        assert!(matches!(
            registry.sources.locate(&DepRef::parse("remote:x").unwrap()),
            Err(Error::SourceNotFound { name }) if name == "remote"
        ));
        assert!(matches!(
            registry.sources.locate(&DepRef::parse("local:x").unwrap()),
            Err(Error::DepNotFound { name }) if name == "local:x"
        ));
    }

    #[test]
    fn test_duplicate_dep() {
        let mut registry = registry();
        registry.add_dep("local", Dep::new("git")).unwrap();
        let err = registry.add_dep("local", Dep::new("git")).unwrap_err();
        assert!(matches!(err, Error::DuplicateDep { .. }));
        assert!(err.is_definition_error());
    }

    #[test]
    fn test_add_dep_binds_template() {
        let mut registry = registry();
        registry
            .add_dep("local", Dep::new("ripgrep.bin").set("version", "13"))
            .unwrap();
        let dep = registry.sources.get("local").unwrap().find("ripgrep.bin").unwrap();
        assert_eq!(dep.bound_template().map(|t| t.name()), Some("bin"));
        assert_eq!(dep.base_name(), "ripgrep");
        assert!(dep.definer().is_frozen());

        let err = registry
            .add_dep("local", Dep::new("fd").template("nope"))
            .unwrap_err();
        assert!(matches!(err, Error::TemplateNotFound(_)));
    }

    #[test]
    fn test_load_cycle() {
        let mut sources = SourceRegistry::new();
        assert!(sources.begin_load("a", SourceLocation::Implicit).unwrap());
        assert!(matches!(
            sources.begin_load("a", SourceLocation::Implicit),
            Err(Error::SourceLoadCycle(_))
        ));
        sources.finish_load("a").unwrap();
        assert!(!sources.begin_load("a", SourceLocation::Implicit).unwrap());
        assert_eq!(sources.get("a").unwrap().state(), LoadState::Loaded);
    }
}
