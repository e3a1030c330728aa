use crate::paths;
use anyhow::{Context, Result};
use declarative::{Scope, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Working prefix (default `~/.choro`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Force colored output on or off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<bool>,

    /// Allow shell steps to run through `sudo`
    #[serde(default = "default_sudo")]
    pub sudo: bool,

    /// Remote dep sources, in lookup order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<RemoteSource>,

    /// Seeds for the global variable scope
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, ConfigValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSource {
    pub name: String,
    pub uri: String,
}

/// A `vars` entry. Mirrors [`Value`] so it can be written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl From<&ConfigValue> for Value {
    fn from(value: &ConfigValue) -> Self {
        match value {
            ConfigValue::Bool(b) => Value::Bool(*b),
            ConfigValue::Int(i) => Value::Int(*i),
            ConfigValue::Str(s) => Value::Str(s.clone()),
            ConfigValue::List(items) => Value::List(items.clone()),
        }
    }
}

fn default_sudo() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: None,
            color: None,
            sudo: default_sudo(),
            sources: Vec::new(),
            vars: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load `config.toml` from the config directory.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    /// Load a config file; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&paths::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))
    }

    /// Resolved working prefix
    pub fn prefix_path(&self) -> Result<PathBuf> {
        paths::prefix_dir(self.prefix.as_deref())
    }

    /// Add or replace a remote source by name.
    pub fn add_source(&mut self, source: RemoteSource) {
        match self.sources.iter_mut().find(|s| s.name == source.name) {
            Some(existing) => *existing = source,
            None => self.sources.push(source),
        }
    }

    /// The global variable scope seeded from `vars`
    pub fn globals(&self) -> Scope {
        let mut scope = Scope::new("global");
        for (key, value) in &self.vars {
            scope.set(key.clone(), Value::from(value));
        }
        scope
    }
}
