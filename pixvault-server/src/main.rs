use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use pixvault_config::{Config, ConfigLoad, ConfigLoader, ConfigSource};
use pixvault_core::config::WatchIsolation;
use pixvault_core::watch::run_watch_worker;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;

use app::{App, BuildOptions};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "pixvault-server")]
#[command(about = "Content-addressed photo and video ingestion service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone, Default)]
struct ServeArgs {
    /// Additional library root (repeatable)
    #[arg(long = "root", value_name = "DIR")]
    roots: Vec<PathBuf>,

    /// PostgreSQL URL (overrides config and DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Skip the bulk scan of registered roots at startup
    #[arg(long, env = "PIXVAULT_SKIP_INITIAL_SCAN", default_value_t = false)]
    skip_initial_scan: bool,

    /// Run each filesystem monitor in a child `watch-worker` process
    #[arg(long, env = "PIXVAULT_ISOLATE_WATCH", default_value_t = false)]
    isolate_watch: bool,

    /// Do not delete leftover lock files at startup
    #[arg(long, default_value_t = false)]
    keep_stale_locks: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan, watch and generate artifacts until interrupted (the default)
    Serve,
    /// Scan the given directories once and exit
    Scan {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Watch directories and print raw events as JSON lines (used for
    /// isolated watching)
    WatchWorker {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // stdout carries the event stream; nothing else may write there.
    if let Some(Command::WatchWorker { paths }) = &cli.command {
        init_tracing("warn", false, true);
        let paths = paths.clone();
        return tokio::task::spawn_blocking(move || run_watch_worker(&paths, io::stdout().lock(), true))
            .await
            .context("watch worker panicked")?
            .context("watch worker failed");
    }

    let ConfigLoad {
        config,
        source,
        warnings,
    } = ConfigLoader::new()
        .load()
        .context("failed to load configuration")?;
    let config = apply_cli(config, &cli.serve)?;

    init_tracing(&config.logging.filter, config.logging.ansi, false);

    if let Some(path) = env_file {
        info!(path = %path.display(), "loaded .env file");
    }
    match &source {
        ConfigSource::Default => info!("no config file found; using defaults"),
        ConfigSource::EnvPath(path) | ConfigSource::File(path) => {
            info!(path = %path.display(), "configuration loaded")
        }
        ConfigSource::EnvInline => info!("configuration loaded from inline environment json"),
    }
    for warning in &warnings {
        warn!(message = %warning, "configuration warning");
    }

    match cli.command {
        Some(Command::Scan { paths }) => run_scan(&config, &cli.serve, paths).await,
        Some(Command::Db(DbCommand::Migrate)) => {
            app::migrate_only(&config.database).await?;
            info!("database migrations applied");
            Ok(())
        }
        Some(Command::Serve | Command::WatchWorker { .. }) | None => run_server(&config, &cli.serve).await,
    }
}

fn init_tracing(default_filter: &str, ansi: bool, to_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(use_ansi(ansi, to_stderr))
        .with_writer(move || -> Box<dyn io::Write> {
            if to_stderr {
                Box::new(io::stderr())
            } else {
                Box::new(io::stdout())
            }
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// Colour only when asked to and the stream being written is a terminal.
fn use_ansi(requested: bool, to_stderr: bool) -> bool {
    requested
        && if to_stderr {
            io::stderr().is_terminal()
        } else {
            io::stdout().is_terminal()
        }
}

/// Fold command-line overrides into the loaded configuration.
fn apply_cli(mut config: Config, args: &ServeArgs) -> anyhow::Result<Config> {
    for root in &args.roots {
        let root = std::path::absolute(root)
            .with_context(|| format!("invalid root {}", root.display()))?;
        config.add_root(root);
    }
    if let Some(url) = &args.database_url {
        config.database.url = Some(url.clone());
    }
    if args.isolate_watch {
        let program = std::env::current_exe().context("cannot locate own executable")?;
        config.pipeline.watch.isolation = WatchIsolation::Subprocess {
            program,
            args: vec!["watch-worker".into()],
        };
    }
    config
        .pipeline
        .validate()
        .context("invalid pipeline configuration")?;
    Ok(config)
}

fn build_options(args: &ServeArgs) -> BuildOptions {
    BuildOptions {
        keep_stale_locks: args.keep_stale_locks,
    }
}

async fn run_scan(config: &Config, args: &ServeArgs, paths: Vec<PathBuf>) -> anyhow::Result<()> {
    let app = App::build(config, build_options(args)).await?;
    let notifications = app.spawn_notification_log();

    for path in paths {
        let report = app
            .scanner
            .scan(&path)
            .await
            .with_context(|| format!("scan of {} failed", path.display()))?;
        println!(
            "{}: {} files, {} new, {} already catalogued, {} locked, {} errors",
            report.root.display(),
            report.files_seen,
            report.created,
            report.skipped_exists,
            report.skipped_locked,
            report.errors
        );
    }

    app.drain().await;
    notifications.abort();
    Ok(())
}

async fn run_server(config: &Config, args: &ServeArgs) -> anyhow::Result<()> {
    let app = App::build(config, build_options(args)).await?;
    let notifications = app.spawn_notification_log();

    if !args.skip_initial_scan {
        match app.scanner.scan_registered().await {
            Ok(reports) => {
                let created: usize = reports.iter().map(|r| r.created).sum();
                info!(target: "scan::summary", roots = reports.len(), created, "initial scan complete");
            }
            Err(err) => {
                error!(error = %err, "initial scan aborted");
                return Err(err.into());
            }
        }
    }

    let roots = app.registry.snapshot().await.top_roots();
    if roots.is_empty() {
        warn!("no library roots to watch");
    }
    for root in &roots {
        if let Err(err) = app.supervisor.start(root).await {
            error!(root = %root.display(), error = %err, "failed to start watching");
        }
    }

    info!(roots = roots.len(), "pixvault is running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutting down");
    app.supervisor.stop().await;
    app.drain().await;
    notifications.abort();
    Ok(())
}
