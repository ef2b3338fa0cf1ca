use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use pixvault_core::config::PipelineConfig;
use pixvault_core::types::WatchedPath;
use serde::{Deserialize, Serialize};

/// Fully composed configuration for the PixVault server.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub library: LibraryConfig,
    pub database: DatabaseConfig,
    /// Worker counts, debounce window, lock strategy and artifact settings.
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Directories seeded into the path registry. Roots marked `ignore` hide
    /// their subtree from scanning and watching.
    pub roots: Vec<RootConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RootConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub ignore: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. Without one the catalog lives in memory and
    /// is lost on exit.
    pub url: Option<String>,
    pub max_connections: u32,
    /// Apply bundled migrations at startup.
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives used when `RUST_LOG` is
    /// unset.
    pub filter: String,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,pixvault_core=info,scan::summary=info".into(),
            ansi: true,
        }
    }
}

impl Config {
    /// Registry seed derived from `library.roots`.
    pub fn watched_paths(&self) -> Vec<WatchedPath> {
        self.library
            .roots
            .iter()
            .map(|root| WatchedPath {
                path: root.path.clone(),
                ignore: root.ignore,
            })
            .collect()
    }

    /// Add `path` as an unignored root unless it is already listed.
    pub fn add_root(&mut self, path: PathBuf) {
        if !self.library.roots.iter().any(|root| root.path == path) {
            self.library.roots.push(RootConfig {
                path,
                ignore: false,
            });
        }
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents)
                .with_context(|| format!("invalid config {}", path.display())),
            Some("toml") | Some("tml") => toml::from_str(&contents)
                .map_err(|err| anyhow!("invalid config {}: {}", path.display(), err)),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        // TOML first, then JSON.
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).map_err(|err| anyhow!("invalid config json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixvault_core::config::{LockStrategy, WatchIsolation};

    #[test]
    fn toml_overrides_only_what_it_names() {
        let config = Config::parse_from_str(
            r#"
            [[library.roots]]
            path = "/photos"

            [[library.roots]]
            path = "/photos/tmp"
            ignore = true

            [pipeline.ingest]
            lock_strategy = "in_process"

            [pipeline.watch]
            debounce_ms = 500
            isolation = { mode = "subprocess", program = "/usr/bin/pixvault-server", args = ["watch-worker"] }
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.library.roots.len(), 2);
        assert!(config.library.roots[1].ignore);
        assert_eq!(config.pipeline.ingest.lock_strategy, LockStrategy::InProcess);
        assert_eq!(config.pipeline.watch.debounce_ms, 500);
        assert_eq!(
            config.pipeline.watch.isolation,
            WatchIsolation::Subprocess {
                program: PathBuf::from("/usr/bin/pixvault-server"),
                args: vec!["watch-worker".into()],
            }
        );
        assert_eq!(config.pipeline.scan.file_workers, 4);
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn json_is_accepted_when_toml_fails() {
        let config =
            Config::parse_from_str(r#"{"database": {"url": "postgres://db/pixvault"}}"#, "inline")
                .unwrap();
        assert_eq!(config.database.url.as_deref(), Some("postgres://db/pixvault"));
    }

    #[test]
    fn garbage_reports_both_parsers() {
        let err = Config::parse_from_str("[[[", "inline").unwrap_err().to_string();
        assert!(err.contains("toml error"));
        assert!(err.contains("json error"));
    }

    #[test]
    fn add_root_skips_duplicates() {
        let mut config = Config::default();
        config.add_root(PathBuf::from("/a"));
        config.add_root(PathBuf::from("/a"));
        assert_eq!(config.watched_paths(), vec![WatchedPath::new("/a")]);
    }
}
