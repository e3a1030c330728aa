use anyhow::{Context as AnyhowContext, Result};
use declarative::{DepRef, Engine, Outcome, RunOptions};
use std::sync::Arc;

use crate::Context;
use crate::app::App;
use crate::cli::MeetArgs;
use crate::ui::{self, Reporter};

/// Meet the dep named on the command line.
pub fn run(ctx: &Context, app: &App, args: &MeetArgs) -> Result<Outcome> {
    let reference = DepRef::parse_with_args(&args.dep, &args.args)
        .with_context(|| format!("Invalid dep '{}'", args.dep))?;
    Ok(meet(ctx, app, &reference))
}

/// One run of the engine over `reference`, with the tree and a summary
/// printed as it goes.
pub fn meet(ctx: &Context, app: &App, reference: &DepRef) -> Outcome {
    if ctx.dry_run && !ctx.quiet {
        ui::warn("Dry run - no changes will be made");
    }

    let mut engine = Engine::new(&app.registry, Arc::clone(&app.host), Arc::clone(&app.shell))
        .with_options(RunOptions {
            dry_run: ctx.dry_run,
        })
        .with_progress(Box::new(Reporter::new(ctx.quiet)));
    let outcome = engine.meet(reference);
    let summary = engine.summary();

    if !ctx.quiet {
        println!();
    }
    let line = format!("{reference}: {}", ui::summary_line(&summary));
    if outcome.is_success() {
        ui::success(&line);
    } else {
        ui::error(&line);
        if let Outcome::Failed {
            prerequisite: Some(first),
            ..
        } = &outcome
        {
            ui::dim(&format!("first failure: {first}"));
        }
        ui::dim(&format!("logs: {}", app.prefix.logs().display()));
    }
    outcome
}
