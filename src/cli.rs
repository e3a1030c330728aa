use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "choro")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative machine provisioning: describe deps, then meet them", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Show debug logging (same as -vv)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Check deps without changing anything
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Force colored output
    #[arg(long, global = true, overrides_with = "no_color")]
    pub color: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Color override from flags, if any
    pub fn color_override(&self) -> Option<bool> {
        if self.no_color {
            Some(false)
        } else if self.color {
            Some(true)
        } else {
            None
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match (self.verbose, self.debug) {
            (_, true) | (2, _) => log::LevelFilter::Debug,
            (0, false) => log::LevelFilter::Warn,
            (1, false) => log::LevelFilter::Info,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Meet a dep and everything it requires
    Meet(MeetArgs),

    /// List loaded deps
    List {
        /// Only show deps whose name contains this
        filter: Option<String>,
    },

    /// Manage dep sources
    Sources {
        #[command(subcommand)]
        command: Option<SourcesCommand>,
    },

    /// List registered templates and their fields
    Templates,

    /// Print the version
    Version,

    /// Read dep names interactively and meet each one
    Console,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// `choro <dep> [key=value ...]` is `choro meet <dep> ...`
    #[command(external_subcommand)]
    Implicit(Vec<String>),
}

#[derive(clap::Args)]
pub struct MeetArgs {
    /// Dep to meet, optionally as `source:name`
    pub dep: String,

    /// Arguments passed to the dep as `key=value`
    pub args: Vec<String>,
}

impl MeetArgs {
    /// Split `choro <dep> key=value ...` into dep and arguments.
    pub fn from_implicit(mut words: Vec<String>) -> Option<Self> {
        if words.is_empty() {
            return None;
        }
        let dep = words.remove(0);
        Some(Self { dep, args: words })
    }
}

#[derive(Subcommand)]
pub enum SourcesCommand {
    /// Fetch a remote source and add it to config.toml
    Add {
        /// Name deps are qualified with
        name: String,
        /// Git, http(s) or ftp URI
        uri: String,
    },

    /// Refresh every remote source
    Update {
        /// Number of parallel fetches
        #[arg(short, long, default_value = "4")]
        jobs: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_explicit_meet() {
        let cli = Cli::parse_from(["choro", "--dry-run", "meet", "core:apt", "via=apt"]);
        assert!(cli.dry_run);
        let Command::Meet(args) = cli.command else {
            panic!("expected meet");
        };
        assert_eq!(args.dep, "core:apt");
        assert_eq!(args.args, vec!["via=apt"]);
    }

    #[test]
    fn test_bare_dep_is_implicit_meet() {
        let cli = Cli::parse_from(["choro", "ripgrep.bin", "version=13"]);
        let Command::Implicit(words) = cli.command else {
            panic!("expected implicit meet");
        };
        let args = MeetArgs::from_implicit(words).unwrap();
        assert_eq!(args.dep, "ripgrep.bin");
        assert_eq!(args.args, vec!["version=13"]);
    }

    #[test]
    fn test_log_levels() {
        let cli = Cli::parse_from(["choro", "version"]);
        assert_eq!(cli.log_level(), log::LevelFilter::Warn);
        let cli = Cli::parse_from(["choro", "--debug", "version"]);
        assert_eq!(cli.log_level(), log::LevelFilter::Debug);
        let cli = Cli::parse_from(["choro", "-q", "-vvv", "version"]);
        assert_eq!(cli.log_level(), log::LevelFilter::Error);
    }

    #[test]
    fn test_color_flags() {
        let cli = Cli::parse_from(["choro", "--no-color", "version"]);
        assert_eq!(cli.color_override(), Some(false));
        let cli = Cli::parse_from(["choro", "version"]);
        assert_eq!(cli.color_override(), None);
    }

    #[test]
    fn test_sources_subcommands() {
        let cli = Cli::parse_from(["choro", "sources"]);
        assert!(matches!(cli.command, Command::Sources { command: None }));
        let cli = Cli::parse_from(["choro", "sources", "add", "team", "https://x.example/d.git"]);
        assert!(matches!(
            cli.command,
            Command::Sources {
                command: Some(SourcesCommand::Add { .. })
            }
        ));
    }
}
