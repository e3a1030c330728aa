//! Deps and dep references.
//!
//! A [`Dep`] is a named unit of desired state: field values, a `requires`
//! list and the lifecycle [`Body`] (`before`, `met?`, `meet`, `after`).
//! Lifecycle steps are closures over an explicit [`DepContext`].

use crate::context::DepContext;
use crate::error::{Error, Result};
use crate::field::{Definer, FieldInput};
use crate::scope::Value;
use crate::template::Template;
use crate::types::MetResult;
use std::fmt;
use std::sync::Arc;

/// A `met?` check.
pub type MetFn = Arc<dyn Fn(&mut DepContext) -> anyhow::Result<MetResult> + Send + Sync>;

/// A `before`, `meet` or `after` step, or a block field.
pub type ActionFn = Arc<dyn Fn(&mut DepContext) -> anyhow::Result<()> + Send + Sync>;

/// Requirements computed from a dep's runtime field values.
pub type RequiresFn = Arc<dyn Fn(&DepContext) -> anyhow::Result<Vec<DepRef>> + Send + Sync>;

/// A reference to a dep: `[source:]name` plus call-site arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepRef {
    pub source: Option<String>,
    pub name: String,
    pub args: Vec<(String, Value)>,
}

impl DepRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            source: None,
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Parse `name` or `source:name`.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        let (source, name) = match reference.split_once(':') {
            Some((source, name)) => (Some(source), name),
            None => (None, reference),
        };

        let valid = |s: &str| !s.is_empty() && !s.contains(char::is_whitespace);
        if !valid(name) || source.is_some_and(|s| !valid(s)) || name.contains(':') {
            return Err(Error::InvalidRef(reference.to_string()));
        }

        Ok(Self {
            source: source.map(str::to_string),
            name: name.to_string(),
            args: Vec::new(),
        })
    }

    /// Parse a reference followed by `key=value` arguments, as typed on
    /// the command line.
    pub fn parse_with_args<S: AsRef<str>>(reference: &str, args: &[S]) -> Result<Self> {
        let mut dep_ref = Self::parse(reference)?;
        for arg in args {
            let (key, value) = arg
                .as_ref()
                .split_once('=')
                .ok_or_else(|| Error::InvalidRef(format!("{reference} {}", arg.as_ref())))?;
            dep_ref = dep_ref.with_arg(key.trim(), value.trim());
        }
        Ok(dep_ref)
    }

    /// Qualify the reference with a source name.
    #[must_use]
    pub fn in_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.push((key.into(), value.into()));
        self
    }

    /// Canonical form of the arguments, used to tell instantiations apart.
    pub fn signature(&self) -> String {
        let mut pairs: Vec<String> = self
            .args
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs.join(",")
    }
}

impl fmt::Display for DepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{source}:")?;
        }
        f.write_str(&self.name)?;
        let signature = self.signature();
        if !signature.is_empty() {
            write!(f, " [{signature}]")?;
        }
        Ok(())
    }
}

/// One entry of a `requires` list.
#[derive(Clone)]
pub enum Requirement {
    Ref(DepRef),
    /// Evaluated once the dep is instantiated
    Computed(RequiresFn),
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ref(r) => f.debug_tuple("Ref").field(r).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<DepRef> for Requirement {
    fn from(r: DepRef) -> Self {
        Self::Ref(r)
    }
}

/// Lifecycle of a dep or template.
#[derive(Clone, Default)]
pub struct Body {
    pub requires: Vec<Requirement>,
    pub before: Option<ActionFn>,
    pub met: Option<MetFn>,
    pub meet: Option<ActionFn>,
    pub after: Option<ActionFn>,
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("requires", &self.requires)
            .field("before", &self.before.is_some())
            .field("met", &self.met.is_some())
            .field("meet", &self.meet.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

impl Body {
    #[must_use]
    pub fn requires(mut self, requirement: impl Into<Requirement>) -> Self {
        self.requires.push(requirement.into());
        self
    }

    #[must_use]
    pub fn requires_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&DepContext) -> anyhow::Result<Vec<DepRef>> + Send + Sync + 'static,
    {
        self.requires.push(Requirement::Computed(Arc::new(f)));
        self
    }

    #[must_use]
    pub fn before<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut DepContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(f));
        self
    }

    /// Set the `met?` check. It may return a `bool` or a [`MetResult`].
    #[must_use]
    pub fn met<F, R>(mut self, f: F) -> Self
    where
        F: Fn(&mut DepContext) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<MetResult>,
    {
        self.met = Some(Arc::new(move |ctx: &mut DepContext| -> anyhow::Result<MetResult> {
            f(ctx).map(Into::into)
        }));
        self
    }

    #[must_use]
    pub fn meet<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut DepContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.meet = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn after<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut DepContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(f));
        self
    }
}

/// A dep definition.
#[derive(Debug, Clone)]
pub struct Dep {
    name: String,
    explicit_template: Option<String>,
    definer: Definer,
    inputs: Vec<(String, FieldInput)>,
    body: Body,
    template: Option<Arc<Template>>,
}

impl Dep {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            definer: Definer::new(name.clone()),
            name,
            explicit_template: None,
            inputs: Vec::new(),
            body: Body::default(),
            template: None,
        }
    }

    /// Bind to a template by name instead of by suffix.
    #[must_use]
    pub fn template(mut self, name: impl Into<String>) -> Self {
        self.explicit_template = Some(name.into());
        self
    }

    /// Set a field value for this definition.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, input: impl Into<FieldInput>) -> Self {
        self.inputs.push((field.into(), input.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Declare extra fields on the dep itself.
    pub fn with_fields<F>(mut self, f: F) -> Result<Self>
    where
        F: FnOnce(&mut Definer) -> Result<()>,
    {
        f(&mut self.definer)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn explicit_template(&self) -> Option<&str> {
        self.explicit_template.as_deref()
    }

    /// The name without a `.template` suffix for the bound template.
    pub fn base_name(&self) -> &str {
        match (&self.template, self.explicit_template.is_some()) {
            (Some(template), false) => self
                .name
                .strip_suffix(template.name())
                .and_then(|rest| rest.strip_suffix('.'))
                .unwrap_or(&self.name),
            _ => &self.name,
        }
    }

    pub fn definer(&self) -> &Definer {
        &self.definer
    }

    pub fn inputs(&self) -> &[(String, FieldInput)] {
        &self.inputs
    }

    pub fn lifecycle(&self) -> &Body {
        &self.body
    }

    pub fn bound_template(&self) -> Option<&Arc<Template>> {
        self.template.as_ref()
    }

    /// Attach the resolved template and validate field inputs against the
    /// combined declaration, which becomes read-only.
    pub(crate) fn bind(&mut self, template: Option<Arc<Template>>) -> Result<()> {
        let mut definer = match &template {
            Some(t) => Definer::extend(t.definer(), &self.definer, self.name.clone()),
            None => self.definer.clone(),
        };
        definer.validate(&self.inputs)?;
        definer.freeze();
        self.definer = definer;
        self.template = template;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_refs() {
        let r = DepRef::parse("core:homebrew").unwrap();
        assert_eq!(r.source.as_deref(), Some("core"));
        assert_eq!(r.name, "homebrew");

        let r = DepRef::parse("ripgrep.bin").unwrap();
        assert_eq!(r.source, None);
        assert_eq!(r.to_string(), "ripgrep.bin");

        assert!(DepRef::parse("").is_err());
        assert!(DepRef::parse("a:b:c").is_err());
        assert!(DepRef::parse(":x").is_err());
    }

    #[test]
    fn test_parse_with_args() {
        let r = DepRef::parse_with_args("git.bin", &["version=2.40", "via = brew"]).unwrap();
        assert_eq!(r.args.len(), 2);
        assert_eq!(r.signature(), "version=2.40,via=brew");
        assert!(DepRef::parse_with_args("git", &["oops"]).is_err());
    }

    #[test]
    fn test_signature_is_order_independent() {
        let a = DepRef::new("x").with_arg("b", "2").with_arg("a", "1");
        let b = DepRef::new("x").with_arg("a", "1").with_arg("b", "2");
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.to_string(), "x [a=1,b=2]");
        assert_eq!(DepRef::new("x").signature(), "");
    }

    #[test]
    fn test_body_builder() {
        let body = Body::default()
            .requires(DepRef::new("a"))
            .met(|_| Ok(true))
            .meet(|_| Ok(()));
        assert_eq!(body.requires.len(), 1);
        assert!(body.met.is_some());
        assert!(body.before.is_none());
    }

    #[test]
    fn test_bind_rejects_unknown_fields() {
        let mut dep = Dep::new("plain").set("installs", "x");
        let err = dep.bind(None).unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
    }
}
