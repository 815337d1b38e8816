// src/config.rs

//! Installation environment and `googet.conf`
//!
//! Path discovery happens once, in [`Environment::discover`]; the resulting
//! value is passed to every component instead of being read from globals.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::packages::Arch;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable overriding the installation root
pub const ROOT_ENV_VAR: &str = "GOOGETROOT";

/// Name of the optional config file inside the root
pub const CONFIG_FILE: &str = "googet.conf";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 600;

/// Platform default installation root
pub fn default_root() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\ProgramData\GooGet")
    } else {
        PathBuf::from("/var/lib/googet")
    }
}

/// Contents of `googet.conf`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub archs: Option<Vec<Arch>>,
    pub proxy_server: Option<String>,
    pub http_timeout_secs: Option<u64>,
    pub script_timeout_secs: Option<u64>,
}

impl Config {
    /// Load a config file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))
    }
}

/// Everything a component needs to know about the installation
#[derive(Debug, Clone)]
pub struct Environment {
    pub root: PathBuf,
    pub cache_dir: PathBuf,
    pub db_path: PathBuf,
    pub lock_path: PathBuf,
    pub repo_dir: PathBuf,
    /// Accepted architectures, most preferred first
    pub archs: Vec<Arch>,
    pub proxy_server: Option<String>,
    pub http_timeout: Duration,
    pub script_timeout: Duration,
    pub cancel: CancelToken,
}

impl Environment {
    /// Environment rooted at `root` with default settings
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            cache_dir: root.join("cache"),
            db_path: root.join("googet.db"),
            lock_path: root.join("googet.lock"),
            repo_dir: root.join("repos"),
            root,
            archs: default_archs(),
            proxy_server: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            script_timeout: Duration::from_secs(DEFAULT_SCRIPT_TIMEOUT_SECS),
            cancel: CancelToken::new(),
        }
    }

    /// Resolve the root (explicit flag, then `GOOGETROOT`, then the platform
    /// default) and apply `googet.conf`
    pub fn discover(explicit_root: Option<PathBuf>) -> Result<Self> {
        let root = explicit_root
            .or_else(|| std::env::var_os(ROOT_ENV_VAR).map(PathBuf::from))
            .unwrap_or_else(default_root);
        let root = std::path::absolute(&root).map_err(|e| {
            Error::InitError(format!("Failed to resolve root {}: {}", root.display(), e))
        })?;
        let mut env = Self::with_root(root);
        let config = Config::load(&env.root.join(CONFIG_FILE))?;
        env.apply(config);
        Ok(env)
    }

    pub fn apply(&mut self, config: Config) {
        if let Some(archs) = config.archs.filter(|a| !a.is_empty()) {
            self.archs = archs;
        }
        self.proxy_server = config.proxy_server;
        if let Some(secs) = config.http_timeout_secs {
            self.http_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = config.script_timeout_secs {
            self.script_timeout = Duration::from_secs(secs);
        }
    }

    /// Create the root, cache and repo directories
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.root, &self.cache_dir, &self.repo_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                Error::InitError(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// Rank of an arch in the preference list (lower is better)
    pub fn arch_rank(&self, arch: Arch) -> usize {
        self.archs
            .iter()
            .position(|a| *a == arch)
            .unwrap_or(self.archs.len())
    }
}

fn default_archs() -> Vec<Arch> {
    vec![Arch::host(), Arch::Noarch]
}
