// ABOUTME: Configuration types and discovery for haul.yml.
// ABOUTME: Every section is optional; missing files and fields fall back to defaults.

use crate::error::{Error, Result};
use crate::registry::RegistrySettings;
use crate::runtime::{RuntimeConfig, RuntimeType};
use crate::tunnel::SshSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "haul.yml";
pub const CONFIG_FILENAME_ALT: &str = "haul.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".haul/config.yml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub ssh: SshSettings,

    /// The machine haul runs on.
    #[serde(default)]
    pub local: RuntimeConfig,

    /// The machine images are sent to.
    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub runtime: RuntimeType,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.expand_home(home_dir().as_deref());
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Find the config file for `dir`: project files first, then the user config.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        candidates
            .into_iter()
            .chain(user_config_path())
            .find(|path| path.is_file())
    }

    /// Load `explicit` if given (it must exist), else the discovered file, else defaults.
    pub fn resolve(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => match Self::discover(dir) {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }

    fn expand_home(&mut self, home: Option<&Path>) {
        if let Some(key) = self.ssh.key.take() {
            self.ssh.key = Some(expand_tilde(&key, home));
        }
        if let Some(known_hosts) = self.ssh.known_hosts.take() {
            self.ssh.known_hosts = Some(expand_tilde(&known_hosts, home));
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

fn user_config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|home| home.join(".config")))?;
    Some(base.join("haul").join("config.yml"))
}

fn expand_tilde(path: &Path, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::Transport;
    use std::time::Duration;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
        assert_eq!(Config::from_yaml("\n  \n").unwrap(), Config::default());
    }

    #[test]
    fn full_document() {
        let yaml = r#"
registry:
  image: registry:2.8
  port: 5050
  bind: 127.0.0.1
  readiness:
    max_wait: 10s
    poll_interval: 250ms
ssh:
  transport: native
  key: /keys/id_ed25519
  trust_first_connection: true
  command_timeout: 5m
local:
  runtime: podman
remote:
  runtime: podman
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.registry.image.as_str(), "registry:2.8");
        assert_eq!(config.registry.port, 5050);
        assert_eq!(config.registry.readiness.max_wait, Duration::from_secs(10));
        assert_eq!(
            config.registry.readiness.poll_interval,
            Duration::from_millis(250)
        );
        assert_eq!(config.ssh.transport, Transport::Native);
        assert_eq!(config.ssh.key, Some(PathBuf::from("/keys/id_ed25519")));
        assert!(config.ssh.trust_first_connection);
        assert_eq!(config.ssh.command_timeout, Duration::from_secs(300));
        assert_eq!(config.local.runtime, Some(RuntimeType::Podman));
        assert_eq!(config.remote.runtime, RuntimeType::Podman);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = Config::from_yaml("registry:\n  port: 0\n").unwrap();
        assert_eq!(config.registry.port, 0);
        assert_eq!(config.registry.readiness.max_wait, Duration::from_secs(5));
        assert_eq!(config.ssh.transport, Transport::Openssh);
    }

    #[test]
    fn unknown_keys_and_bad_images_are_rejected() {
        assert!(Config::from_yaml("registy:\n  port: 1\n").is_err());
        assert!(Config::from_yaml("registry:\n  image: 'bad image'\n").is_err());
    }

    #[test]
    fn tilde_expands_against_home() {
        let home = Path::new("/home/alice");
        assert_eq!(
            expand_tilde(Path::new("~/.ssh/id"), Some(home)),
            PathBuf::from("/home/alice/.ssh/id")
        );
        assert_eq!(
            expand_tilde(Path::new("/abs/id"), Some(home)),
            PathBuf::from("/abs/id")
        );
        assert_eq!(
            expand_tilde(Path::new("~/.ssh/id"), None),
            PathBuf::from("~/.ssh/id")
        );
    }
}
