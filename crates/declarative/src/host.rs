//! Host classification.
//!
//! Per-host field values are keyed by classification names such as
//! `ubuntu`, `debian`, `apt`, `linux`, `macos` or the catch-all `any`.
//! [`Host::keys`] lists the keys that apply to the running machine, most
//! specific first, and [`Host::choose`] picks the first matching entry.

use std::path::Path;

/// Catch-all classification key.
pub const ANY: &str = "any";

/// What kind of machine we are running on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    /// `macos`, `linux`, ... as in `std::env::consts::OS`
    pub os: String,
    /// Distribution id (`ubuntu`, `fedora`, ...), if known
    pub flavour: Option<String>,
    /// Distributions this one derives from (`ID_LIKE`)
    pub like: Vec<String>,
    /// Native package manager key (`brew`, `apt`, `dnf`, `pacman`)
    pub pkg_manager: Option<String>,
    pub arch: String,
}

impl Host {
    /// Classify the running machine.
    pub fn detect() -> Self {
        let os = std::env::consts::OS.to_string();
        let (flavour, like) = if os == "linux" {
            std::fs::read_to_string(Path::new("/etc/os-release"))
                .map(|content| parse_os_release(&content))
                .unwrap_or_default()
        } else {
            (None, Vec::new())
        };

        let pkg_manager = pkg_manager_for(&os, flavour.as_deref(), &like).map(str::to_string);
        log::debug!(
            "Detected host: os={os} flavour={} pkg_manager={}",
            flavour.as_deref().unwrap_or("-"),
            pkg_manager.as_deref().unwrap_or("-")
        );

        Self {
            os,
            flavour,
            like,
            pkg_manager,
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// Build a classification by hand.
    pub fn new(os: &str, flavour: Option<&str>, pkg_manager: Option<&str>) -> Self {
        Self {
            os: os.to_string(),
            flavour: flavour.map(str::to_string),
            like: Vec::new(),
            pkg_manager: pkg_manager.map(str::to_string),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    pub fn is_macos(&self) -> bool {
        self.os == "macos"
    }

    pub fn is_linux(&self) -> bool {
        self.os == "linux"
    }

    /// Classification keys, most specific first, ending with [`ANY`].
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        keys.extend(self.flavour.as_deref());
        keys.extend(self.like.iter().map(String::as_str));
        keys.extend(self.pkg_manager.as_deref());
        keys.push(&self.os);
        if self.is_macos() {
            keys.push("osx");
        }
        keys.push(ANY);
        keys
    }

    /// Pick the entry for the most specific key that applies to this host.
    pub fn choose<'a, T>(&self, choices: &'a [(String, T)]) -> Option<&'a T> {
        self.keys().into_iter().find_map(|key| {
            choices
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, value)| value)
        })
    }
}

/// Extract `ID` and `ID_LIKE` from `/etc/os-release` content.
fn parse_os_release(content: &str) -> (Option<String>, Vec<String>) {
    let mut id = None;
    let mut like = Vec::new();

    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(['"', '\'']);
        match key.trim() {
            "ID" => id = Some(value.to_lowercase()),
            "ID_LIKE" => like = value.split_whitespace().map(str::to_lowercase).collect(),
            _ => {}
        }
    }

    (id, like)
}

fn pkg_manager_for(os: &str, flavour: Option<&str>, like: &[String]) -> Option<&'static str> {
    if os == "macos" {
        return Some("brew");
    }

    flavour
        .into_iter()
        .chain(like.iter().map(String::as_str))
        .find_map(|id| match id {
            "debian" | "ubuntu" | "raspbian" | "linuxmint" | "pop" => Some("apt"),
            "fedora" | "rhel" | "centos" | "rocky" | "almalinux" => Some("dnf"),
            "arch" | "manjaro" | "endeavouros" => Some("pacman"),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_os_release() {
        let content = r#"
NAME="Ubuntu"
ID=ubuntu
ID_LIKE=debian
VERSION_ID="22.04"
"#;
        let (id, like) = parse_os_release(content);
        assert_eq!(id.as_deref(), Some("ubuntu"));
        assert_eq!(like, vec!["debian"]);
        assert_eq!(pkg_manager_for("linux", id.as_deref(), &like), Some("apt"));
    }

    #[test]
    fn test_pkg_manager_from_like() {
        let like = vec!["rhel".to_string(), "fedora".to_string()];
        assert_eq!(pkg_manager_for("linux", Some("ol"), &like), Some("dnf"));
        assert_eq!(pkg_manager_for("linux", Some("gentoo"), &[]), None);
        assert_eq!(pkg_manager_for("macos", None, &[]), Some("brew"));
    }

    #[test]
    fn test_keys_most_specific_first() {
        let host = Host::new("linux", Some("ubuntu"), Some("apt"));
        assert_eq!(host.keys(), vec!["ubuntu", "apt", "linux", "any"]);

        let mac = Host::new("macos", None, Some("brew"));
        assert_eq!(mac.keys(), vec!["brew", "macos", "osx", "any"]);
    }

    #[test]
    fn test_choose() {
        let choices = vec![
            ("any".to_string(), "generic"),
            ("apt".to_string(), "debian-ish"),
            ("brew".to_string(), "mac"),
        ];
        let host = Host::new("linux", Some("ubuntu"), Some("apt"));
        assert_eq!(host.choose(&choices), Some(&"debian-ish"));

        let other = Host::new("linux", Some("gentoo"), None);
        assert_eq!(other.choose(&choices), Some(&"generic"));

        assert_eq!(host.choose::<&str>(&[]), None);
    }

    #[test]
    fn test_detect_has_os() {
        let host = Host::detect();
        assert!(!host.os.is_empty());
        assert!(host.keys().contains(&ANY));
    }
}
