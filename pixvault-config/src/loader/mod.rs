//! Compose a [`Config`] from files, inline JSON and environment overrides.

pub mod error;

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Config;
use error::ConfigLoadError;

pub const CONFIG_PATH_ENV: &str = "PIXVAULT_CONFIG_PATH";
pub const CONFIG_JSON_ENV: &str = "PIXVAULT_CONFIG_JSON";
pub const ROOTS_ENV: &str = "PIXVAULT_ROOTS";
pub const LOG_ENV: &str = "PIXVAULT_LOG";
pub const ARTIFACT_ROOT_ENV: &str = "PIXVAULT_ARTIFACT_ROOT";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const DATABASE_URL_FILE_ENV: &str = "DATABASE_URL_FILE";

const CANDIDATES: &[&str] = &[
    "pixvault.toml",
    "pixvault.json",
    "config/pixvault.toml",
    "config/pixvault.json",
];

/// Where the base configuration came from, before environment overrides.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Result of [`ConfigLoader::load`].
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub source: ConfigSource,
    /// Problems worth logging that do not prevent startup.
    pub warnings: Vec<String>,
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Loads configuration with this precedence:
///
/// 1. `$PIXVAULT_CONFIG_PATH` (TOML or JSON file)
/// 2. `$PIXVAULT_CONFIG_JSON` (inline JSON)
/// 3. the first existing candidate file under the base directory
///    (`pixvault.toml`, `pixvault.json`, `config/pixvault.{toml,json}`)
/// 4. defaults
///
/// `DATABASE_URL` (or `DATABASE_URL_FILE`), `PIXVAULT_ROOTS`,
/// `PIXVAULT_ARTIFACT_ROOT` and `PIXVAULT_LOG` then override the result.
pub struct ConfigLoader {
    env: EnvLookup,
    base_dir: PathBuf,
}

impl fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Reads the process environment; candidate files resolve against the
    /// current directory.
    pub fn new() -> Self {
        Self {
            env: Box::new(|key| env::var(key).ok()),
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Replace the environment lookup.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    fn var(&self, key: &str) -> Option<String> {
        (self.env)(key).filter(|value| !value.trim().is_empty())
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (mut config, source) = self.load_base()?;
        let mut warnings = Vec::new();

        self.apply_env_overrides(&mut config)?;

        config
            .pipeline
            .validate()
            .map_err(|err| ConfigLoadError::Invalid(err.to_string()))?;

        if config.library.roots.iter().all(|root| root.ignore) {
            warnings.push(format!(
                "no library roots configured; set library.roots or {ROOTS_ENV}"
            ));
        }
        for root in config.library.roots.iter().filter(|root| !root.ignore) {
            if !root.path.is_dir() {
                warnings.push(format!("library root {} is not a directory", root.path.display()));
            }
        }
        if config.database.url.is_none() {
            warnings.push("no database configured; the catalog is in-memory only".into());
        }

        debug!(?source, warnings = warnings.len(), "configuration loaded");
        Ok(ConfigLoad {
            config,
            source,
            warnings,
        })
    }

    fn load_base(&self) -> Result<(Config, ConfigSource), ConfigLoadError> {
        if let Some(raw) = self.var(CONFIG_PATH_ENV) {
            let path = self.resolve(Path::new(raw.trim()));
            let config = Config::load_from_file(&path).map_err(|err| parse_error(&path, err))?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Some(raw) = self.var(CONFIG_JSON_ENV) {
            let config = Config::parse_json(&raw).map_err(|err| ConfigLoadError::Parse {
                origin: CONFIG_JSON_ENV.into(),
                message: format!("{err:#}"),
            })?;
            return Ok((config, ConfigSource::EnvInline));
        }

        if let Some(path) = self.find_default_file() {
            let config = Config::load_from_file(&path).map_err(|err| parse_error(&path, err))?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((Config::default(), ConfigSource::Default))
    }

    fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigLoadError> {
        if let Some(url) = self.var(DATABASE_URL_ENV) {
            config.database.url = Some(url);
        } else if let Some(file) = self.var(DATABASE_URL_FILE_ENV) {
            let path = self.resolve(Path::new(file.trim()));
            let secret = fs::read_to_string(&path)
                .map_err(|source| ConfigLoadError::SecretFile { path, source })?;
            let secret = secret.trim();
            if !secret.is_empty() {
                config.database.url = Some(secret.to_string());
            }
        }

        if let Some(raw) = self.var(ROOTS_ENV) {
            for path in env::split_paths(&OsString::from(raw)) {
                if !path.as_os_str().is_empty() {
                    config.add_root(self.resolve(&path));
                }
            }
        }

        if let Some(root) = self.var(ARTIFACT_ROOT_ENV) {
            config.pipeline.transform.artifact_root = PathBuf::from(root);
        }

        if let Some(filter) = self.var(LOG_ENV) {
            config.logging.filter = filter;
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        CANDIDATES
            .iter()
            .map(|candidate| self.base_dir.join(candidate))
            .find(|path| path.is_file())
    }
}

fn parse_error(path: &Path, err: anyhow::Error) -> ConfigLoadError {
    ConfigLoadError::Parse {
        origin: path.display().to_string(),
        message: format!("{err:#}"),
    }
}
