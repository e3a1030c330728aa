//! Error types for dep definition and resolution.
//!
//! Errors fall into two groups. Definition errors (bad template names,
//! field misuse, duplicate definitions) are load-time failures that abort a
//! run before anything executes. Everything else is a runtime condition the
//! engine converts into a `failed` or `unmeetable` outcome for the dep that
//! hit it.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while defining or resolving deps.
#[derive(Debug, Error)]
pub enum Error {
    /// No source defines the requested dep
    #[error("dep not found: {name}")]
    DepNotFound {
        /// The reference as written by the caller
        name: String,
    },

    /// A `source:name` reference named a source that isn't loaded
    #[error("source not found: {name}")]
    SourceNotFound {
        /// Name of the missing source
        name: String,
    },

    /// Template name failed validation or is reserved
    #[error("invalid template name '{name}': {reason}")]
    InvalidTemplateName {
        /// Rejected name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// A template with this name is already registered
    #[error("template '{0}' is already defined")]
    DuplicateTemplate(String),

    /// An explicit template binding names an unregistered template
    #[error("template '{0}' is not defined")]
    TemplateNotFound(String),

    /// A dep with this name already exists in the source
    #[error("dep '{name}' is already defined in source '{source_name}'")]
    DuplicateDep {
        /// Source holding the earlier definition
        source_name: String,
        /// Dep name
        name: String,
    },

    /// A source with this name is already registered
    #[error("source '{0}' is already registered")]
    DuplicateSource(String),

    /// A field was set that the dep or template does not declare
    #[error("{owner} does not accept field '{field}'")]
    UnknownField {
        /// Dep or template name
        owner: String,
        /// Offending field
        field: String,
    },

    /// A field was declared or set after its owner was frozen
    #[error("field '{field}' of {owner} is frozen")]
    FrozenField {
        /// Dep or template name
        owner: String,
        /// Offending field
        field: String,
    },

    /// A field was given a value of the wrong shape
    #[error("invalid value for field '{field}' of {owner}: {reason}")]
    InvalidField {
        /// Dep or template name
        owner: String,
        /// Offending field
        field: String,
        /// What was wrong with it
        reason: String,
    },

    /// A `{{placeholder}}` or field read named nothing in scope
    #[error("undefined variable '{0}'")]
    UndefinedVar(String),

    /// A version string could not be parsed
    #[error("invalid version string '{0}'")]
    VersionStr(String),

    /// A dep reference could not be parsed
    #[error("invalid dep reference '{0}'")]
    InvalidRef(String),

    /// A dep (transitively) requires itself
    #[error("cyclic dependency: {}", .chain.join(" -> "))]
    CyclicDependency {
        /// The deps on the cycle, first and last being the same dep
        chain: Vec<String>,
    },

    /// A source tried to load itself while already loading
    #[error("source '{0}' is already loading")]
    SourceLoadCycle(String),

    /// A shell command could not be run or exited unsuccessfully
    #[error("command `{command}` failed{}: {}", describe_status(.status), .stderr.trim())]
    Shell {
        /// Command line as given to the shell
        command: String,
        /// Exit status, if the process ran at all
        status: Option<i32>,
        /// Captured standard error
        stderr: String,
    },
}

impl Error {
    /// Whether this error comes from a malformed definition rather than
    /// from a runtime condition.
    ///
    /// Definition errors abort a run before execution begins.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTemplateName { .. }
                | Self::DuplicateTemplate(_)
                | Self::TemplateNotFound(_)
                | Self::DuplicateDep { .. }
                | Self::DuplicateSource(_)
                | Self::UnknownField { .. }
                | Self::FrozenField { .. }
                | Self::InvalidField { .. }
                | Self::SourceLoadCycle(_)
        )
    }

    /// Create a shell error for a command that exited unsuccessfully.
    pub fn shell(command: impl Into<String>, status: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::Shell {
            command: command.into(),
            status,
            stderr: stderr.into(),
        }
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!(" with exit code {code}"),
        None => String::new(),
    }
}
