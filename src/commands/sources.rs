use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use declarative::Registry;
use fetchkit::Fetcher;
use rayon::prelude::*;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::Context;
use crate::app;
use crate::config::{Config, RemoteSource};
use crate::paths::WorkPrefix;
use crate::progress;
use crate::ui;

/// Print every source with its location and load state.
pub fn list(ctx: &Context, registry: &Registry) -> Result<()> {
    ui::header("Sources");
    for source in registry.sources.iter() {
        println!(
            "  {} {} {}",
            source.name().bold(),
            source.location().to_string().dimmed(),
            format!("[{}, {} deps]", source.state(), source.deps().len()).dimmed()
        );
    }
    if !ctx.quiet {
        println!();
        ui::dim("Sources are searched top to bottom");
    }
    Ok(())
}

/// Fetch a remote source and record it in `config.toml`.
pub fn add(ctx: &Context, config: &mut Config, fetcher: &Fetcher, name: &str, uri: &str) -> Result<()> {
    if matches!(name, app::CWD_SOURCE | app::LOCAL_SOURCE | crate::templates::CORE_SOURCE) {
        bail!("'{name}' is a reserved source name");
    }
    let remote = RemoteSource {
        name: name.to_string(),
        uri: uri.to_string(),
    };
    let path = app::refresh(fetcher, &remote)?;
    config.add_source(remote);
    config.save().context("Could not save config.toml")?;

    if !ctx.quiet {
        ui::success(&format!("Added source '{name}'"));
        ui::kv("Checkout", &path.display().to_string());
    }
    Ok(())
}

/// Refresh every remote source in parallel.
pub fn update(ctx: &Context, config: &Config, prefix: &WorkPrefix, jobs: usize) -> Result<()> {
    if config.sources.is_empty() {
        ui::info("No remote sources configured");
        return Ok(());
    }

    let fetcher = Fetcher::new(prefix.root());
    let failures = update_all(&fetcher, &config.sources, jobs)?;
    let updated = config.sources.len() - failures.len();

    println!();
    if failures.is_empty() {
        ui::success(&format!("Updated {updated} sources"));
        return Ok(());
    }

    ui::warn(&format!("Updated {updated}, {} failed", failures.len()));
    if !ctx.quiet {
        for (name, error) in &failures {
            println!("  {} {} - {}", "✗".red(), name, error.dimmed());
        }
    }
    bail!("{} sources could not be updated", failures.len())
}

/// Fetch each source on a pool of `jobs` threads, returning the failures.
fn update_all(
    fetcher: &Fetcher,
    sources: &[RemoteSource],
    jobs: usize,
) -> Result<Vec<(String, String)>> {
    let pb = progress::bar(sources.len() as u64, "Updating");
    let done = AtomicUsize::new(0);
    let failures: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Could not start worker pool")?;

    pool.install(|| {
        sources.par_iter().for_each(|source| {
            match fetcher.fetch(std::slice::from_ref(&source.uri), &source.name) {
                Ok(_) => {
                    done.fetch_add(1, Ordering::Relaxed);
                    pb.set_message(format!("{} ✓", source.name));
                }
                Err(e) => {
                    pb.set_message(format!("{} ✗", source.name));
                    if let Ok(mut failures) = failures.lock() {
                        failures.push((source.name.clone(), e.to_string()));
                    }
                }
            }
            pb.inc(1);
        });
    });
    pb.finish_and_clear();

    log::debug!("{} sources updated", done.load(Ordering::Relaxed));
    let mut failures = failures.into_inner().unwrap_or_default();
    failures.sort();
    Ok(failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchkit::Runner;
    use std::fs;
    use std::path::Path;

    /// Clones by creating the checkout; URIs containing "broken" fail.
    struct FakeGit;

    impl Runner for FakeGit {
        fn run(&self, _program: &str, args: &[&str], _cwd: Option<&Path>) -> fetchkit::Result<()> {
            if args.iter().any(|a| a.contains("broken")) {
                return Err(fetchkit::Error::fetch(args.join(" "), "repository not found"));
            }
            if args.first() == Some(&"clone") {
                if let Some(target) = args.last() {
                    fs::create_dir_all(Path::new(target).join(".git")).unwrap();
                }
            }
            Ok(())
        }
    }

    fn remote(name: &str, uri: &str) -> RemoteSource {
        RemoteSource {
            name: name.into(),
            uri: uri.into(),
        }
    }

    #[test]
    fn test_update_all_collects_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(tmp.path()).with_runner(FakeGit);
        let sources = vec![
            remote("team", "https://git.example/team.git"),
            remote("gone", "https://git.example/broken.git"),
            remote("mine", "git@git.example:me/deps.git"),
        ];

        let failures = update_all(&fetcher, &sources, 2).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "gone");
        assert!(tmp.path().join("sources/team/.git").is_dir());
        assert!(tmp.path().join("sources/mine/.git").is_dir());
    }

    #[test]
    fn test_reserved_names_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(tmp.path()).with_runner(FakeGit);
        let ctx = Context {
            verbose: 0,
            quiet: true,
            dry_run: false,
        };
        let mut config = Config::default();
        let err = add(&ctx, &mut config, &fetcher, "core", "https://git.example/x.git").unwrap_err();
        assert!(err.to_string().contains("reserved"));
        assert!(config.sources.is_empty());
    }
}
