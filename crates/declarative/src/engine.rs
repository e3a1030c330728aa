//! Resolution engine - resolves deps depth-first and drives their lifecycle
//!
//! One [`Engine`] is one run. It borrows the [`Registry`] for the whole run,
//! memoizes outcomes per `(source, dep, arguments)` so every instantiation
//! is met at most once, and detects cycles on the current resolution path.

use crate::context::{DepContext, NoProgress, ProgressCallback, Shell};
use crate::dep::{ActionFn, Body, Dep, DepRef, MetFn, Requirement};
use crate::error::{Error, Result};
use crate::field::{FieldInput, FieldSet};
use crate::host::Host;
use crate::scope::{Scope, Value};
use crate::source::{Registry, Source};
use crate::types::{MetResult, Outcome, RunSummary};
use std::collections::HashMap;
use std::sync::Arc;

/// Options for a run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Check everything, change nothing
    pub dry_run: bool,
}

/// Outcome of one dep within a run, in completion order
#[derive(Debug, Clone)]
pub struct DepReport {
    pub name: String,
    pub depth: usize,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VisitKey {
    source: String,
    name: String,
    signature: String,
}

impl VisitKey {
    fn display(&self) -> String {
        format!("{}:{}", self.source, self.name)
    }
}

#[derive(Debug, Clone)]
enum Visit {
    InProgress,
    Done(Outcome),
}

pub struct Engine<'r> {
    registry: &'r Registry,
    host: Arc<Host>,
    shell: Arc<dyn Shell>,
    options: RunOptions,
    progress: Box<dyn ProgressCallback + 'r>,
    visits: HashMap<VisitKey, Visit>,
    stack: Vec<VisitKey>,
    reports: Vec<DepReport>,
}

impl<'r> Engine<'r> {
    pub fn new(registry: &'r Registry, host: Arc<Host>, shell: Arc<dyn Shell>) -> Self {
        Self {
            registry,
            host,
            shell,
            options: RunOptions::default(),
            progress: Box::new(NoProgress),
            visits: HashMap::new(),
            stack: Vec::new(),
            reports: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Box<dyn ProgressCallback + 'r>) -> Self {
        self.progress = progress;
        self
    }

    /// Resolve and run the dep a reference points at
    pub fn meet(&mut self, reference: &DepRef) -> Outcome {
        self.visit(reference, 0)
    }

    /// Resolve and run a dep with extra call-site arguments
    pub fn resolve_and_run(&mut self, reference: &DepRef, inline: &[(String, Value)]) -> Outcome {
        let mut reference = reference.clone();
        reference.args.extend(inline.iter().cloned());
        self.visit(&reference, 0)
    }

    pub fn reports(&self) -> &[DepReport] {
        &self.reports
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for report in &self.reports {
            summary.add_outcome(&report.outcome);
        }
        summary
    }

    fn visit(&mut self, reference: &DepRef, depth: usize) -> Outcome {
        let registry = self.registry;
        let (source, dep) = match registry.sources.locate(reference) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("{e}");
                let outcome = Outcome::failed(e.to_string());
                self.report(reference.to_string(), depth, &outcome);
                return outcome;
            }
        };

        let key = VisitKey {
            source: source.name().to_string(),
            name: dep.name().to_string(),
            signature: reference.signature(),
        };
        let display = key.display();

        if let Some(pos) = self.stack.iter().position(|k| *k == key) {
            let mut chain: Vec<String> = self.stack[pos..].iter().map(VisitKey::display).collect();
            chain.push(display);
            let reason = Error::CyclicDependency {
                chain: chain.clone(),
            }
            .to_string();
            log::warn!("{reason}");
            return Outcome::Unmeetable {
                reason,
                cycle: Some(chain),
            };
        }

        if let Some(Visit::Done(outcome)) = self.visits.get(&key) {
            log::debug!("{display}: already {}", outcome.label());
            return outcome.clone();
        }

        self.progress.on_dep_start(&display, depth);
        self.visits.insert(key.clone(), Visit::InProgress);
        self.stack.push(key.clone());

        let outcome = match self.instantiate(source, dep, reference) {
            Ok(mut ctx) => self.process(dep, &display, &mut ctx, depth),
            Err(e) => Outcome::failed(e.to_string()),
        };

        self.stack.pop();
        self.visits.insert(key, Visit::Done(outcome.clone()));
        self.report(display, depth, &outcome);
        outcome
    }

    fn report(&mut self, name: String, depth: usize, outcome: &Outcome) {
        self.progress.on_dep_complete(&name, depth, outcome);
        self.reports.push(DepReport {
            name,
            depth,
            outcome: outcome.clone(),
        });
    }

    /// Bind fields and build the dep's scope chain: globals, then call-site
    /// variables, then field values.
    fn instantiate(&self, source: &Source, dep: &Dep, reference: &DepRef) -> Result<DepContext> {
        let definer = dep.definer();
        let mut inline: Vec<(String, FieldInput)> = Vec::new();
        let mut args = Scope::child(self.registry.globals(), "args");
        args.set("name", dep.name());
        args.set("basename", dep.base_name());
        args.set("source", source.name());
        for (key, value) in &reference.args {
            if definer.accepts(key) {
                inline.push((key.clone(), FieldInput::Plain(value.clone())));
            } else {
                args.set(key.clone(), value.clone());
            }
        }

        let mut fields = FieldSet::resolve(
            definer,
            dep.base_name(),
            &[dep.inputs(), &inline],
            &self.host,
        )?;
        fields.freeze();

        let mut field_scope = Scope::child(&args.into_shared(), "fields");
        for (key, value) in fields.values() {
            field_scope.set(key.clone(), value.clone());
        }
        let scope = Scope::child(&field_scope.into_shared(), dep.name());

        Ok(DepContext::new(
            source.name(),
            dep.name(),
            dep.base_name(),
            fields,
            scope,
            Arc::clone(&self.host),
            Arc::clone(&self.shell),
        )
        .with_dry_run(self.options.dry_run))
    }

    fn process(&mut self, dep: &Dep, display: &str, ctx: &mut DepContext, depth: usize) -> Outcome {
        let empty = Body::default();
        let template = dep.bound_template().map_or(&empty, |t| t.body());
        let own = dep.lifecycle();

        let requirements = match expand_requirements(&[template, own], ctx) {
            Ok(requirements) => requirements,
            Err(e) => return Outcome::failed(format!("requires: {e:#}")),
        };

        for requirement in &requirements {
            let outcome = self.visit(requirement, depth + 1);
            if outcome.is_failure() {
                log::info!("{display}: prerequisite {requirement} {}", outcome.label());
                return prerequisite_failure(display, requirement, &outcome);
            }
        }

        converge(display, template, own, ctx)
    }
}

fn expand_requirements(bodies: &[&Body], ctx: &DepContext) -> anyhow::Result<Vec<DepRef>> {
    let mut refs = Vec::new();
    for body in bodies {
        for requirement in &body.requires {
            match requirement {
                Requirement::Ref(r) => refs.push(r.clone()),
                Requirement::Computed(f) => refs.extend(f(ctx)?),
            }
        }
    }
    Ok(refs)
}

/// Turn a requirement's failure into this dep's outcome.
///
/// A cycle through this dep keeps the cyclic diagnostic; anything else
/// makes this dep `failed`, pointing at the first failing prerequisite.
fn prerequisite_failure(display: &str, requirement: &DepRef, outcome: &Outcome) -> Outcome {
    match outcome {
        Outcome::Unmeetable {
            reason,
            cycle: Some(chain),
        } if chain.iter().any(|name| name == display) => Outcome::Unmeetable {
            reason: reason.clone(),
            cycle: Some(chain.clone()),
        },
        Outcome::Failed {
            prerequisite: Some(root),
            ..
        } => Outcome::Failed {
            reason: format!("prerequisite {requirement} failed"),
            prerequisite: Some(root.clone()),
        },
        other => Outcome::Failed {
            reason: format!("prerequisite {requirement} {}", other.label()),
            prerequisite: Some(requirement.to_string()),
        },
    }
}

/// Run `met?`, and if needed the meet steps and a second `met?`.
fn converge(display: &str, template: &Body, own: &Body, ctx: &mut DepContext) -> Outcome {
    match check(template, own, ctx) {
        Ok(MetResult::Met) => {
            log::info!("{display}: met");
            return Outcome::Met;
        }
        Ok(MetResult::Unmeetable { reason }) => {
            log::info!("{display}: unmeetable: {reason}");
            return Outcome::unmeetable(reason);
        }
        Ok(MetResult::NotMet) => {}
        Err(e) => return Outcome::failed(format!("met? check failed: {e:#}")),
    }

    if ctx.is_dry_run() {
        log::info!("{display}: would meet");
        return Outcome::WouldChange;
    }

    log::info!("{display}: meeting");
    // Dep steps bracket the template's.
    let steps: [(&str, &Option<ActionFn>); 6] = [
        ("before", &own.before),
        ("before", &template.before),
        ("meet", &template.meet),
        ("meet", &own.meet),
        ("after", &template.after),
        ("after", &own.after),
    ];
    for (step, action) in steps {
        if let Some(action) = action
            && let Err(e) = action(ctx)
        {
            log::warn!("{display}: {step} failed: {e:#}");
            return Outcome::failed(format!("{step} failed: {e:#}"));
        }
    }

    match check(template, own, ctx) {
        Ok(MetResult::Met) => {
            log::info!("{display}: changed");
            Outcome::Changed
        }
        Ok(MetResult::NotMet) => Outcome::failed("still not met after meet"),
        Ok(MetResult::Unmeetable { reason }) => {
            Outcome::failed(format!("still not met after meet: {reason}"))
        }
        Err(e) => Outcome::failed(format!("met? check failed after meet: {e:#}")),
    }
}

/// The dep's own check runs first; the template's check can read its
/// result. The dep is met only if both agree.
fn check(template: &Body, own: &Body, ctx: &mut DepContext) -> anyhow::Result<MetResult> {
    let own_result = run_check(own.met.as_ref(), ctx)?;
    ctx.set_dep_check(own_result.clone());
    let template_result = run_check(template.met.as_ref(), ctx);
    ctx.set_dep_check(None);

    let mut combined = MetResult::Met;
    for result in [own_result, template_result?].into_iter().flatten() {
        match result {
            MetResult::Unmeetable { .. } => return Ok(result),
            MetResult::NotMet => combined = MetResult::NotMet,
            MetResult::Met => {}
        }
    }
    Ok(combined)
}

fn run_check(met: Option<&MetFn>, ctx: &mut DepContext) -> anyhow::Result<Option<MetResult>> {
    met.map(|f| f(ctx)).transpose()
}
