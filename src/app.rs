//! Startup: everything a command needs, assembled once per process.

use crate::config::{Config, RemoteSource};
use crate::loader::Loader;
use crate::paths::{self, WorkPrefix};
use crate::progress;
use crate::runner::ShellRunner;
use crate::templates;
use anyhow::{Context, Result};
use declarative::{Host, Registry, Shell, SourceLocation};
use fetchkit::Fetcher;
use std::path::PathBuf;
use std::sync::Arc;

/// Source names with a fixed meaning
pub const CWD_SOURCE: &str = "cwd";
pub const LOCAL_SOURCE: &str = "local";

/// Where the user's own deps live
#[derive(Debug, Clone)]
pub struct DepDirs {
    pub cwd: Option<PathBuf>,
    pub local: PathBuf,
}

impl DepDirs {
    pub fn discover() -> Result<Self> {
        Ok(Self {
            cwd: paths::cwd_deps_dir(),
            local: paths::local_deps_dir()?,
        })
    }
}

pub struct App {
    pub prefix: WorkPrefix,
    pub host: Arc<Host>,
    pub shell: Arc<dyn Shell>,
    pub registry: Registry,
}

impl App {
    /// Load config and every dep source for this machine.
    pub fn load() -> Result<Self> {
        let config = Config::load()?;
        let prefix = WorkPrefix::new(config.prefix_path()?);
        prefix.ensure()?;
        let shell: Arc<dyn Shell> = Arc::new(ShellRunner::new(prefix.logs(), config.sudo));
        let host = Arc::new(Host::detect());
        log::debug!(
            "Host: os={} flavour={:?} pkg_manager={:?}",
            host.os,
            host.flavour,
            host.pkg_manager
        );
        Self::assemble(config, prefix, host, shell, &DepDirs::discover()?)
    }

    /// Build the registry from explicit parts.
    pub fn assemble(
        config: Config,
        prefix: WorkPrefix,
        host: Arc<Host>,
        shell: Arc<dyn Shell>,
        dirs: &DepDirs,
    ) -> Result<Self> {
        let fetcher = Arc::new(Fetcher::new(prefix.root()));
        let manager = pkgkit::detect(&host, Arc::clone(&shell));
        let mut registry = Registry::new(config.globals());

        {
            let mut loader = Loader::new(&mut registry);
            if let Some(dir) = &dirs.cwd {
                loader.register(CWD_SOURCE, SourceLocation::Local(dir.clone()))?;
            }
            loader.register(LOCAL_SOURCE, SourceLocation::Local(dirs.local.clone()))?;
            for remote in &config.sources {
                match checkout(&fetcher, remote) {
                    Ok(path) => loader.register(
                        &remote.name,
                        SourceLocation::Remote {
                            uri: remote.uri.clone(),
                            path,
                        },
                    )?,
                    Err(e) => log::warn!("Skipping source '{}': {e:#}", remote.name),
                }
            }
        }

        templates::register(&mut registry, manager, fetcher)?;
        Loader::new(&mut registry)
            .load_all()
            .context("Could not load dep sources")?;

        Ok(Self {
            prefix,
            host,
            shell,
            registry,
        })
    }
}

/// The local checkout of a remote source, fetching it the first time.
pub fn checkout(fetcher: &Fetcher, remote: &RemoteSource) -> Result<PathBuf> {
    if let Some(path) = fetcher.cached(&remote.uri, &remote.name) {
        log::debug!("Using {} for source '{}'", path.display(), remote.name);
        return Ok(path);
    }
    refresh(fetcher, remote)
}

/// Fetch or update a remote source.
pub fn refresh(fetcher: &Fetcher, remote: &RemoteSource) -> Result<PathBuf> {
    let pb = progress::spinner(&format!("Fetching {}", remote.name));
    match fetcher.fetch(std::slice::from_ref(&remote.uri), &remote.name) {
        Ok(path) => {
            progress::finish_success(&pb, &format!("Fetched {}", remote.name));
            Ok(path)
        }
        Err(e) => {
            progress::finish_error(&pb, &format!("Could not fetch {}", remote.name));
            Err(e).with_context(|| format!("fetching {}", remote.uri))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::testing::FakeShell;
    use declarative::{DepRef, Engine, Outcome};
    use std::fs;
    use std::path::Path;

    /// Fails every transport call, so any fetch attempt shows up as an error.
    struct RefusingRunner;

    impl fetchkit::Runner for RefusingRunner {
        fn run(&self, program: &str, _: &[&str], _: Option<&Path>) -> fetchkit::Result<()> {
            Err(fetchkit::Error::fetch(program, "no network in tests"))
        }
    }

    fn assemble(dirs: &DepDirs, prefix: &Path, config: Config) -> App {
        App::assemble(
            config,
            WorkPrefix::new(prefix),
            Arc::new(Host::new("linux", Some("debian"), None)),
            Arc::new(FakeShell::default()),
            dirs,
        )
        .unwrap()
    }

    #[test]
    fn test_source_precedence() {
        let tmp = tempfile::tempdir().unwrap();
        let cwd = tmp.path().join("cwd");
        let local = tmp.path().join("local");
        fs::create_dir_all(&cwd).unwrap();
        fs::create_dir_all(&local).unwrap();
        fs::write(cwd.join("a.toml"), "[[dep]]\nname = \"tool\"\nmet = \"from-cwd\"\n").unwrap();
        fs::write(local.join("a.toml"), "[[dep]]\nname = \"tool\"\nmet = \"from-local\"\n").unwrap();

        let dirs = DepDirs {
            cwd: Some(cwd),
            local,
        };
        let app = assemble(&dirs, &tmp.path().join("prefix"), Config::default());

        let names: Vec<&str> = app.registry.sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec![CWD_SOURCE, LOCAL_SOURCE, templates::CORE_SOURCE]);

        let (source, _) = app.registry.sources.locate(&DepRef::new("tool")).unwrap();
        assert_eq!(source.name(), CWD_SOURCE);
    }

    #[test]
    fn test_missing_local_dir_is_empty_source() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = DepDirs {
            cwd: None,
            local: tmp.path().join("nope"),
        };
        let app = assemble(&dirs, &tmp.path().join("prefix"), Config::default());
        assert!(app.registry.sources.get(LOCAL_SOURCE).unwrap().deps().is_empty());
        assert!(app.registry.templates.lookup("bin").is_some());
    }

    #[test]
    fn test_config_vars_are_globals() {
        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("local");
        fs::create_dir_all(&local).unwrap();
        fs::write(local.join("a.toml"), "[[dep]]\nname = \"greet\"\nmet = \"hello {{who}}\"\n").unwrap();

        let mut config = Config::default();
        config
            .vars
            .insert("who".into(), crate::config::ConfigValue::Str("ada".into()));
        let dirs = DepDirs { cwd: None, local };
        let app = assemble(&dirs, &tmp.path().join("prefix"), config);

        let shell = Arc::new(FakeShell::default());
        let mut engine = Engine::new(&app.registry, Arc::clone(&app.host), shell.clone());
        assert_eq!(engine.meet(&DepRef::new("greet")), Outcome::Met);
        assert_eq!(shell.commands(), vec!["hello ada"]);
    }

    #[test]
    fn test_existing_checkout_is_not_refetched() {
        let tmp = tempfile::tempdir().unwrap();
        let prefix = WorkPrefix::new(tmp.path());
        let checkout_dir = prefix.root().join("sources").join("team");
        fs::create_dir_all(checkout_dir.join(".git")).unwrap();
        let fetcher = Fetcher::new(prefix.root()).with_runner(RefusingRunner);
        let remote = RemoteSource {
            name: "team".into(),
            uri: "https://github.com/team/deps.git".into(),
        };
        assert_eq!(checkout(&fetcher, &remote).unwrap(), checkout_dir);
    }

    #[test]
    fn test_unpacked_archive_source_is_not_refetched() {
        let tmp = tempfile::tempdir().unwrap();
        let prefix = WorkPrefix::new(tmp.path());
        let unpacked = prefix.root().join("build").join("team").join("deps-1.0");
        fs::create_dir_all(&unpacked).unwrap();
        let fetcher = Fetcher::new(prefix.root()).with_runner(RefusingRunner);
        let remote = RemoteSource {
            name: "team".into(),
            uri: "https://example.invalid/team/deps-1.0.tar.gz".into(),
        };
        assert_eq!(checkout(&fetcher, &remote).unwrap(), unpacked);
    }

    #[test]
    fn test_missing_checkout_is_fetched() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(tmp.path()).with_runner(RefusingRunner);
        let remote = RemoteSource {
            name: "team".into(),
            uri: "https://github.com/team/deps.git".into(),
        };
        let err = checkout(&fetcher, &remote).unwrap_err();
        assert!(format!("{err:#}").contains("no network in tests"));
    }
}
