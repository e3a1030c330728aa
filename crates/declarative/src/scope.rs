//! Variable scopes.
//!
//! A [`Scope`] is one layer of named values with an optional parent. Lookups
//! walk the layer newest-entry-first and then fall back to the parent, so a
//! child overrides what it sets and inherits everything else. Layers are
//! append-only; once a layer is shared behind an `Arc` it never changes.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// A field or variable value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Normalise scalar-or-list input into a list.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.clone(),
            Self::Str(s) => vec![s.clone()],
            other => vec![other.to_string()],
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Str(s) => !s.is_empty() && s != "false" && s != "no",
            Self::List(items) => !items.is_empty(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => f.write_str(&items.join(" ")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

impl From<Vec<&str>> for Value {
    fn from(items: Vec<&str>) -> Self {
        Self::List(items.into_iter().map(str::to_string).collect())
    }
}

/// One layer of variables.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    label: String,
    parent: Option<Arc<Scope>>,
    entries: Vec<(String, Value)>,
}

impl Scope {
    /// Create a root layer.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            parent: None,
            entries: Vec::new(),
        }
    }

    /// Create a layer on top of `parent`.
    pub fn child(parent: &Arc<Scope>, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            parent: Some(Arc::clone(parent)),
            entries: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Append a value to this layer, shadowing earlier entries with the
    /// same key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .or_else(|| self.parent.as_deref().and_then(|p| p.get(key)))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Every visible key, outermost layer first, without duplicates.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = self
            .parent
            .as_deref()
            .map(Scope::keys)
            .unwrap_or_default();
        for (key, _) in &self.entries {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }

    /// Substitute `{{key}}` placeholders with values from this scope.
    ///
    /// Unknown keys are an error; an unterminated `{{` is left as is.
    pub fn render(&self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            out.push_str(&rest[..start]);
            let key = rest[start + 2..start + 2 + len].trim();
            let value = self
                .get(key)
                .ok_or_else(|| Error::UndefinedVar(key.to_string()))?;
            out.push_str(&value.to_string());
            rest = &rest[start + 2 + len + 2..];
        }

        out.push_str(rest);
        Ok(out)
    }

    pub fn into_shared(self) -> Arc<Scope> {
        Arc::new(self)
    }
}
