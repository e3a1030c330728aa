//! Field declarations.
//!
//! A [`Definer`] is the set of fields a dep or template accepts. Each field
//! has a kind (single value, list, or deferred block), a default, an optional
//! coercion, and, for lists, an optional per-host chooser. Definitions supply
//! [`FieldInput`]s, and [`FieldSet::resolve`] binds them against the definer
//! when a dep is instantiated.

use crate::dep::ActionFn;
use crate::error::{Error, Result};
use crate::host::Host;
use crate::scope::Value;
use std::fmt;
use std::sync::Arc;

/// Deferred default computed from the dep's name and earlier fields.
pub type ComputedFn = Arc<dyn Fn(&FieldLookup<'_>) -> Option<Value> + Send + Sync>;

/// How a field's raw value is normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coercion {
    #[default]
    None,
    /// Keep only the last path component of the leading word:
    /// `/usr/bin/rg >= 13` becomes `rg >= 13`
    Basename,
}

impl Coercion {
    pub fn apply(&self, raw: &str) -> String {
        match self {
            Self::None => raw.to_string(),
            Self::Basename => {
                let raw = raw.trim();
                let (path, rest) = raw.split_once(char::is_whitespace).unwrap_or((raw, ""));
                let name = path.rsplit('/').next().unwrap_or(path);
                if rest.is_empty() {
                    name.to_string()
                } else {
                    format!("{name} {}", rest.trim_start())
                }
            }
        }
    }
}

/// Default of a value or list field.
#[derive(Clone, Default)]
pub enum FieldDefault {
    #[default]
    None,
    Literal(Value),
    Computed(ComputedFn),
}

impl FieldDefault {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&FieldLookup<'_>) -> Option<Value> + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl<T: Into<Value>> From<T> for FieldDefault {
    fn from(value: T) -> Self {
        Self::Literal(value.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Value,
    List,
    Block,
}

/// Declaration of one accepted field.
#[derive(Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub default: FieldDefault,
    pub coercion: Coercion,
    /// Field whose value, when set, overrides the host classification key
    /// used to resolve per-host inputs. Per-host inputs are only accepted
    /// when this is present.
    pub choose_with: Option<String>,
    pub default_block: Option<ActionFn>,
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("coercion", &self.coercion)
            .field("choose_with", &self.choose_with)
            .field("default_block", &self.default_block.is_some())
            .finish()
    }
}

/// The fields a dep or template exposes.
#[derive(Debug, Clone, Default)]
pub struct Definer {
    owner: String,
    fields: Vec<FieldSpec>,
    frozen: bool,
}

impl Definer {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            fields: Vec::new(),
            frozen: false,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Declare a single-value field.
    pub fn accepts_value_for(
        &mut self,
        name: &str,
        default: impl Into<FieldDefault>,
    ) -> Result<&mut Self> {
        self.declare(FieldSpec {
            name: name.to_string(),
            kind: FieldKind::Value,
            default: default.into(),
            coercion: Coercion::None,
            choose_with: None,
            default_block: None,
        })
    }

    /// Declare a list field. Scalars are normalised to one-element lists.
    pub fn accepts_list_for(
        &mut self,
        name: &str,
        default: impl Into<FieldDefault>,
        coercion: Coercion,
        choose_with: Option<&str>,
    ) -> Result<&mut Self> {
        self.declare(FieldSpec {
            name: name.to_string(),
            kind: FieldKind::List,
            default: default.into(),
            coercion,
            choose_with: choose_with.map(str::to_string),
            default_block: None,
        })
    }

    /// Declare a deferred block, run later through the dep's context.
    pub fn accepts_block_for(&mut self, name: &str, default: Option<ActionFn>) -> Result<&mut Self> {
        self.declare(FieldSpec {
            name: name.to_string(),
            kind: FieldKind::Block,
            default: FieldDefault::None,
            coercion: Coercion::None,
            choose_with: None,
            default_block: default,
        })
    }

    fn declare(&mut self, spec: FieldSpec) -> Result<&mut Self> {
        if self.frozen {
            return Err(Error::FrozenField {
                owner: self.owner.clone(),
                field: spec.name,
            });
        }
        self.fields.retain(|f| f.name != spec.name);
        self.fields.push(spec);
        Ok(self)
    }

    /// Make the declaration read-only.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Combine `base` with `extension`; the extension's declarations win.
    pub fn extend(base: &Definer, extension: &Definer, owner: impl Into<String>) -> Definer {
        let mut fields: Vec<FieldSpec> = base
            .fields
            .iter()
            .filter(|f| !extension.accepts(&f.name))
            .cloned()
            .collect();
        fields.extend(extension.fields.iter().cloned());
        Definer {
            owner: owner.into(),
            fields,
            frozen: false,
        }
    }

    /// Check that every input names a declared field of a compatible kind.
    pub fn validate(&self, inputs: &[(String, FieldInput)]) -> Result<()> {
        for (name, input) in inputs {
            let spec = self.get(name).ok_or_else(|| Error::UnknownField {
                owner: self.owner.clone(),
                field: name.clone(),
            })?;
            check_shape(&self.owner, spec, input)?;
        }
        Ok(())
    }
}

fn check_shape(owner: &str, spec: &FieldSpec, input: &FieldInput) -> Result<()> {
    let reason = match (spec.kind, input) {
        (FieldKind::Block, FieldInput::Block(_)) => return Ok(()),
        (FieldKind::Block, _) => "expected a block",
        (_, FieldInput::Block(_)) => "a block is only accepted by block fields",
        (_, FieldInput::PerHost(_)) if spec.choose_with.is_none() => {
            "per-host values need a field declared with a chooser"
        }
        _ => return Ok(()),
    };
    Err(Error::InvalidField {
        owner: owner.to_string(),
        field: spec.name.clone(),
        reason: reason.to_string(),
    })
}

/// A value supplied for a field at definition time or at the call site.
#[derive(Clone)]
pub enum FieldInput {
    Plain(Value),
    /// Host classification key to value, resolved once per instantiation
    PerHost(Vec<(String, Value)>),
    Block(ActionFn),
}

impl fmt::Debug for FieldInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(v) => f.debug_tuple("Plain").field(v).finish(),
            Self::PerHost(choices) => f.debug_tuple("PerHost").field(choices).finish(),
            Self::Block(_) => f.write_str("Block(..)"),
        }
    }
}

impl<T: Into<Value>> From<T> for FieldInput {
    fn from(value: T) -> Self {
        Self::Plain(value.into())
    }
}

/// Read access to fields resolved so far, for computed defaults.
pub struct FieldLookup<'a> {
    base_name: &'a str,
    resolved: &'a [(String, Value)],
}

impl FieldLookup<'_> {
    /// The dep's name without any `.template` suffix.
    pub fn base_name(&self) -> &str {
        self.base_name
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.resolved.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

/// Field values bound for one dep instantiation.
#[derive(Clone, Default)]
pub struct FieldSet {
    owner: String,
    values: Vec<(String, Value)>,
    blocks: Vec<(String, ActionFn)>,
    declared: Vec<String>,
    frozen: bool,
}

impl fmt::Debug for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSet")
            .field("owner", &self.owner)
            .field("values", &self.values)
            .field("blocks", &self.blocks.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("frozen", &self.frozen)
            .finish()
    }
}

impl FieldSet {
    /// Bind `layers` of inputs against `definer`; later layers win.
    ///
    /// Fields are resolved in declaration order, so a computed default can
    /// read any field declared before it. A field named as another's chooser
    /// is resolved ahead of that field wherever it was declared.
    pub fn resolve(
        definer: &Definer,
        base_name: &str,
        layers: &[&[(String, FieldInput)]],
        host: &Host,
    ) -> Result<Self> {
        for layer in layers {
            definer.validate(layer)?;
        }

        let mut set = Self {
            owner: definer.owner().to_string(),
            declared: definer.fields().iter().map(|f| f.name.clone()).collect(),
            ..Self::default()
        };

        for spec in resolution_order(definer) {
            let input = layers
                .iter()
                .rev()
                .find_map(|layer| layer.iter().rev().find(|(k, _)| *k == spec.name))
                .map(|(_, input)| input);

            if spec.kind == FieldKind::Block {
                let block = match input {
                    Some(FieldInput::Block(block)) => Some(block.clone()),
                    _ => spec.default_block.clone(),
                };
                if let Some(block) = block {
                    set.blocks.push((spec.name.clone(), block));
                }
                continue;
            }

            let explicit = match input {
                Some(FieldInput::Plain(value)) => Some(value.clone()),
                Some(FieldInput::PerHost(choices)) => set.choose(spec, choices, host),
                _ => None,
            };
            let value = explicit.or_else(|| match &spec.default {
                FieldDefault::None => None,
                FieldDefault::Literal(value) => Some(value.clone()),
                FieldDefault::Computed(f) => f(&FieldLookup {
                    base_name,
                    resolved: &set.values,
                }),
            });

            if let Some(value) = value {
                set.values.push((spec.name.clone(), coerce(spec, value)));
            }
        }

        Ok(set)
    }

    fn choose(&self, spec: &FieldSpec, choices: &[(String, Value)], host: &Host) -> Option<Value> {
        let forced = spec
            .choose_with
            .as_deref()
            .and_then(|chooser| self.get(chooser))
            .map(ToString::to_string);

        match forced {
            Some(key) => choices.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone()),
            None => host.choose(choices).cloned(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn block(&self, name: &str) -> Option<&ActionFn> {
        self.blocks.iter().find(|(k, _)| k == name).map(|(_, b)| b)
    }

    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }

    /// Override a field before the instance starts running.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        if !self.declared.iter().any(|d| d == name) {
            return Err(Error::UnknownField {
                owner: self.owner.clone(),
                field: name.to_string(),
            });
        }
        if self.frozen {
            return Err(Error::FrozenField {
                owner: self.owner.clone(),
                field: name.to_string(),
            });
        }
        self.values.retain(|(k, _)| k != name);
        self.values.push((name.to_string(), value.into()));
        Ok(())
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

/// Declaration order, with each field's chooser chain pulled in front of it.
fn resolution_order(definer: &Definer) -> Vec<&FieldSpec> {
    let mut order: Vec<&FieldSpec> = Vec::with_capacity(definer.fields().len());
    for spec in definer.fields() {
        let mut chain = vec![spec];
        let mut current = spec;
        while let Some(chooser) = current.choose_with.as_deref().and_then(|n| definer.get(n)) {
            if chain.iter().any(|s| s.name == chooser.name) {
                break;
            }
            chain.push(chooser);
            current = chooser;
        }
        for field in chain.into_iter().rev() {
            if !order.iter().any(|o| o.name == field.name) {
                order.push(field);
            }
        }
    }
    order
}

fn coerce(spec: &FieldSpec, value: Value) -> Value {
    match spec.kind {
        FieldKind::List => Value::List(
            value
                .to_list()
                .iter()
                .map(|item| spec.coercion.apply(item))
                .collect(),
        ),
        _ if spec.coercion == Coercion::None => value,
        _ => Value::Str(spec.coercion.apply(&value.to_string())),
    }
}
