//! Template registry.
//!
//! Templates are reusable field declarations plus a lifecycle body. A dep
//! binds to one explicitly or by naming itself `something.template`.

use crate::dep::Body;
use crate::error::{Error, Result};
use crate::field::Definer;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

static TEMPLATE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid template name regex"));

/// Name no template may take.
pub const RESERVED: &str = "base";

/// A reusable blueprint for a family of deps.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    definer: Definer,
    body: Body,
    builtin: bool,
}

impl Template {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            definer: Definer::new(name.clone()),
            name,
            body: Body::default(),
            builtin: false,
        }
    }

    /// Declare the template's fields.
    pub fn with_fields<F>(mut self, f: F) -> Result<Self>
    where
        F: FnOnce(&mut Definer) -> Result<()>,
    {
        f(&mut self.definer)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definer(&self) -> &Definer {
        &self.definer
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn is_builtin(&self) -> bool {
        self.builtin
    }
}

/// Every registered template, by name.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, Arc<Template>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user template.
    pub fn define(&mut self, template: Template) -> Result<Arc<Template>> {
        validate_name(&template.name)?;
        if let Some(existing) = self.templates.get(&template.name) {
            if existing.builtin {
                return Err(Error::InvalidTemplateName {
                    name: template.name,
                    reason: "collides with a built-in template".to_string(),
                });
            }
            return Err(Error::DuplicateTemplate(template.name));
        }
        self.insert(template, false)
    }

    /// Register a built-in template. Its name becomes reserved.
    pub fn define_builtin(&mut self, template: Template) -> Result<Arc<Template>> {
        validate_name(&template.name)?;
        if self.templates.contains_key(&template.name) {
            return Err(Error::DuplicateTemplate(template.name));
        }
        self.insert(template, true)
    }

    fn insert(&mut self, mut template: Template, builtin: bool) -> Result<Arc<Template>> {
        template.builtin = builtin;
        template.definer.freeze();
        let template = Arc::new(template);
        log::debug!("Defined template '{}'", template.name);
        self.templates
            .insert(template.name.clone(), Arc::clone(&template));
        Ok(template)
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<Template>> {
        self.templates.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Template>> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Decide which template, if any, a dep binds to.
    ///
    /// An explicit name must be registered. Otherwise a `name.suffix` dep
    /// binds to `suffix` when such a template exists.
    pub fn binding_for(&self, dep_name: &str, explicit: Option<&str>) -> Result<Option<Arc<Template>>> {
        if let Some(name) = explicit {
            return self
                .lookup(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| Error::TemplateNotFound(name.to_string()));
        }

        Ok(dep_name
            .rsplit_once('.')
            .and_then(|(_, suffix)| self.lookup(suffix))
            .cloned())
    }
}

fn validate_name(name: &str) -> Result<()> {
    let reason = if name == RESERVED {
        "reserved name"
    } else if !TEMPLATE_NAME.is_match(name) {
        "must match ^[a-z][a-z0-9_]*$"
    } else {
        return Ok(());
    };
    Err(Error::InvalidTemplateName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TemplateRegistry {
        let mut registry = TemplateRegistry::new();
        registry.define_builtin(Template::new("bin")).unwrap();
        registry
    }

    #[test]
    fn test_name_validation() {
        let mut registry = registry();
        for bad in ["App", "1app", "my-app", "", "base"] {
            let err = registry.define(Template::new(bad)).unwrap_err();
            assert!(
                matches!(err, Error::InvalidTemplateName { .. }),
                "{bad} should be rejected"
            );
        }
        assert!(registry.define(Template::new("app_2")).is_ok());
    }

    #[test]
    fn test_duplicates_and_builtins() {
        let mut registry = registry();
        registry.define(Template::new("app")).unwrap();
        assert!(matches!(
            registry.define(Template::new("app")),
            Err(Error::DuplicateTemplate(name)) if name == "app"
        ));
        assert!(matches!(
            registry.define(Template::new("bin")),
            Err(Error::InvalidTemplateName { .. })
        ));
        assert!(registry.lookup("bin").unwrap().is_builtin());
    }

    #[test]
    fn test_defined_templates_are_frozen() {
        let mut registry = registry();
        let template = Template::new("app")
            .with_fields(|d| d.accepts_value_for("path", "/Applications").map(|_| ()))
            .unwrap();
        let template = registry.define(template).unwrap();
        assert!(template.definer().is_frozen());
        assert!(template.definer().accepts("path"));
    }

    #[test]
    fn test_binding() {
        let registry = registry();
        assert_eq!(
            registry
                .binding_for("ripgrep.bin", None)
                .unwrap()
                .map(|t| t.name().to_string()),
            Some("bin".to_string())
        );
        assert!(registry.binding_for("node.js", None).unwrap().is_none());
        assert!(registry.binding_for("ripgrep", None).unwrap().is_none());
        assert!(registry.binding_for("ripgrep", Some("bin")).unwrap().is_some());
        assert!(matches!(
            registry.binding_for("ripgrep", Some("nope")),
            Err(Error::TemplateNotFound(_))
        ));
    }
}
