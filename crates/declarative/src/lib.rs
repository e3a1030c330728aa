//! # Declarative
//!
//! A framework for declarative system provisioning.
//!
//! Desired state is described as named **deps**. Each dep has a `met?`
//! check telling whether its state already holds and a `meet` action that
//! makes it hold, plus a list of deps it `requires`. The [`Engine`] walks
//! the requirement graph depth-first, meets every instantiation at most
//! once per run, and reports each dep as met, changed, failed or
//! unmeetable.
//!
//! ## Core Concepts
//!
//! - **Dep**: a named unit with fields, `requires`, and lifecycle closures
//! - **Template**: reusable fields and lifecycle shared by a family of deps
//! - **Definer**: the typed, defaulted fields a dep or template accepts
//! - **Scope**: layered variables (globals, call-site arguments, fields)
//! - **Source**: a named collection of deps, searched in precedence order
//! - **Engine**: resolution with memoization, cycle detection and dry runs
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Body, Dep, DepRef, Engine, Host, Registry, Source, SourceLocation};
//! use std::sync::Arc;
//!
//! let mut registry = Registry::default();
//! registry.sources.add(Source::new("local", SourceLocation::Implicit))?;
//! registry.add_dep(
//!     "local",
//!     Dep::new("hello").body(
//!         Body::default()
//!             .met(|ctx| Ok(ctx.succeeds("test -f /tmp/hello")))
//!             .meet(|ctx| ctx.run("touch /tmp/hello").map(|_| ()).map_err(Into::into)),
//!     ),
//! )?;
//!
//! let mut engine = Engine::new(&registry, Arc::new(Host::detect()), shell);
//! let outcome = engine.meet(&DepRef::parse("hello")?);
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`Shell`]: runs commands, optionally logged or through sudo
//! - [`ProgressCallback`]: receives per-dep progress updates
//!
//! This allows the crate to be used without hard dependencies on a
//! terminal or a real shell.

pub mod context;
pub mod dep;
pub mod engine;
pub mod error;
pub mod field;
pub mod host;
pub mod scope;
pub mod source;
pub mod template;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use context::{DepContext, NoProgress, ProgressCallback, Shell, ShellOptions};
pub use dep::{ActionFn, Body, Dep, DepRef, MetFn, Requirement, RequiresFn};
pub use engine::{DepReport, Engine, RunOptions};
pub use error::{Error, Result};
pub use field::{Coercion, Definer, FieldDefault, FieldInput, FieldKind, FieldLookup, FieldSet};
pub use host::Host;
pub use scope::{Scope, Value};
pub use source::{LoadState, Registry, Source, SourceLocation, SourceRegistry};
pub use template::{Template, TemplateRegistry};
pub use types::{CommandOutput, MetResult, Outcome, RunSummary};
pub use version::{CommandRequirement, Operator, VersionConstraint, VersionValue};
