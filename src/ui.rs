use colored::{ColoredString, Colorize};
use declarative::{Outcome, ProgressCallback, RunSummary};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Glyph for a dep outcome
pub fn outcome_glyph(outcome: &Outcome) -> ColoredString {
    match outcome {
        Outcome::Met => "✓".green(),
        Outcome::Changed => "→".cyan(),
        Outcome::WouldChange => "~".yellow(),
        Outcome::Failed { .. } => "✗".red(),
        Outcome::Unmeetable { .. } => "⊘".magenta(),
    }
}

/// One line describing how a dep ended
pub fn outcome_line(name: &str, outcome: &Outcome) -> String {
    let mut line = format!("{} {} {}", outcome_glyph(outcome), name, outcome.label().dimmed());
    if let Some(cycle) = outcome.cycle() {
        line.push_str(&format!(" ({})", cycle.join(" -> ")));
    } else if let Some(reason) = outcome.reason() {
        line.push_str(&format!(": {reason}"));
    }
    line
}

/// `3 met, 1 changed, 1 failed`, skipping zero counts
pub fn summary_line(summary: &RunSummary) -> String {
    let parts: Vec<String> = [
        (summary.met, "met"),
        (summary.changed, "changed"),
        (summary.would_change, "would change"),
        (summary.failed, "failed"),
        (summary.unmeetable, "unmeetable"),
    ]
    .into_iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, label)| format!("{count} {label}"))
    .collect();

    if parts.is_empty() {
        "nothing to do".to_string()
    } else {
        parts.join(", ")
    }
}

/// Prints the dep tree as the engine walks it.
///
/// Each dep is announced when it starts and again with its outcome, both
/// indented by requirement depth. In quiet mode only problems are shown.
pub struct Reporter {
    quiet: bool,
}

impl Reporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

impl ProgressCallback for Reporter {
    fn on_dep_start(&mut self, name: &str, depth: usize) {
        if self.quiet {
            return;
        }
        println!("{}{} {}", indent(depth), "·".dimmed(), name.bold());
    }

    fn on_dep_complete(&mut self, name: &str, depth: usize, outcome: &Outcome) {
        if self.quiet && outcome.is_success() {
            return;
        }
        println!("{}{}", indent(depth), outcome_line(name, outcome));
    }
}
