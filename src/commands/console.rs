use anyhow::Result;
use declarative::DepRef;
use dialoguer::Input;

use crate::Context;
use crate::app::App;
use crate::commands::meet;
use crate::ui;

/// What one line of console input asks for
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Empty,
    Quit,
    Meet(DepRef),
}

fn parse_line(line: &str) -> Result<Line> {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Ok(Line::Empty);
    };
    if matches!(first, "exit" | "quit") {
        return Ok(Line::Quit);
    }
    let args: Vec<&str> = words.collect();
    Ok(Line::Meet(DepRef::parse_with_args(first, &args)?))
}

/// Prompt for deps until `exit` or end of input. Each line is its own run
/// against the already-loaded sources.
pub fn run(ctx: &Context, app: &App) -> Result<()> {
    if !ctx.quiet {
        ui::info("Enter a dep to meet, optionally with key=value arguments. `exit` quits.");
    }

    loop {
        let input = match Input::<String>::new()
            .with_prompt("choro")
            .allow_empty(true)
            .interact_text()
        {
            Ok(input) => input,
            Err(e) => {
                log::debug!("Console input ended: {e}");
                break;
            }
        };

        match parse_line(&input) {
            Ok(Line::Empty) => {}
            Ok(Line::Quit) => break,
            Ok(Line::Meet(reference)) => {
                meet::meet(ctx, app, &reference);
            }
            Err(e) => ui::error(&format!("{e:#}")),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines() {
        assert_eq!(parse_line("   ").unwrap(), Line::Empty);
        assert_eq!(parse_line("quit").unwrap(), Line::Quit);
        assert_eq!(
            parse_line("core:apt").unwrap(),
            Line::Meet(DepRef::new("apt").in_source("core"))
        );

        let Line::Meet(reference) = parse_line("git.bin  version=2.40").unwrap() else {
            panic!("expected a dep");
        };
        assert_eq!(reference.signature(), "version=2.40");
    }

    #[test]
    fn test_bad_line_is_an_error() {
        assert!(parse_line("git.bin oops").is_err());
    }
}
