mod app;
mod cli;
mod commands;
mod config;
mod loader;
mod paths;
mod progress;
mod runner;
mod templates;
mod ui;

use anyhow::{Result, bail};
use app::App;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, MeetArgs, SourcesCommand};
use config::Config;
use declarative::Outcome;
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub dry_run: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        dry_run: cli.dry_run,
    };
    log::trace!("verbosity {}", ctx.verbose);

    // Commands that work without loading any source
    match &cli.command {
        Command::Version => {
            println!("choro {}", env!("CARGO_PKG_VERSION"));
            return Ok(ExitCode::SUCCESS);
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(*shell, &mut cmd, "choro", &mut io::stdout());
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let mut config = Config::load()?;
    if let Some(color) = cli.color_override().or(config.color) {
        colored::control::set_override(color);
    }

    match cli.command {
        Command::Sources {
            command: Some(SourcesCommand::Add { name, uri }),
        } => {
            let prefix = paths::WorkPrefix::new(config.prefix_path()?);
            prefix.ensure()?;
            let fetcher = fetchkit::Fetcher::new(prefix.root());
            commands::sources::add(&ctx, &mut config, &fetcher, &name, &uri)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Sources {
            command: Some(SourcesCommand::Update { jobs }),
        } => {
            let prefix = paths::WorkPrefix::new(config.prefix_path()?);
            prefix.ensure()?;
            commands::sources::update(&ctx, &config, &prefix, jobs)?;
            Ok(ExitCode::SUCCESS)
        }
        command => {
            let app = App::load()?;
            dispatch(&ctx, &app, command)
        }
    }
}

fn dispatch(ctx: &Context, app: &App, command: Command) -> Result<ExitCode> {
    match command {
        Command::Meet(args) => meet(ctx, app, &args),
        Command::Implicit(words) => {
            let Some(args) = MeetArgs::from_implicit(words) else {
                bail!("No dep given");
            };
            meet(ctx, app, &args)
        }
        Command::List { filter } => {
            commands::list::run(ctx, &app.registry, filter.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Sources { .. } => {
            commands::sources::list(ctx, &app.registry)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Templates => {
            commands::templates::run(&app.registry)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Console => {
            commands::console::run(ctx, app)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Version | Command::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn meet(ctx: &Context, app: &App, args: &MeetArgs) -> Result<ExitCode> {
    Ok(exit_code(&commands::meet::run(ctx, app, args)?))
}

fn exit_code(outcome: &Outcome) -> ExitCode {
    if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
