use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, spawn_blocking};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::convert::raw_events_from_notify;
use crate::error::{Result, VaultError};
use crate::types::RawEvent;

/// What a monitor reports to the consumer. Isolated workers write these as
/// JSON lines on stdout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatchMessage {
    Event(RawEvent),
    Error { message: String },
}

/// A running low-level monitor for one root. Dropping it stops monitoring.
pub(crate) enum Monitor {
    InProcess(RecommendedWatcher),
    Subprocess(SubprocessMonitor),
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Monitor::InProcess(_) => f.write_str("Monitor::InProcess"),
            Monitor::Subprocess(sub) => f
                .debug_struct("Monitor::Subprocess")
                .field("root", &sub.root)
                .finish(),
        }
    }
}

impl Monitor {
    /// Stop the monitor and wait for its reader, if it has one.
    pub(crate) async fn shutdown(self) {
        match self {
            Monitor::InProcess(watcher) => drop(watcher),
            Monitor::Subprocess(sub) => {
                sub.cancel.cancel();
                if let Err(err) = sub.reader.await {
                    warn!(root = %sub.root.display(), error = %err, "watch worker reader panicked");
                }
            }
        }
    }
}

pub(crate) struct SubprocessMonitor {
    root: PathBuf,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

/// Start a notify watcher for `root`. Blocking; call from `spawn_blocking`.
pub(crate) fn watch_in_process(
    root: &Path,
    tx: mpsc::Sender<WatchMessage>,
) -> Result<RecommendedWatcher> {
    let root_for_log = root.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => {
                for raw in raw_events_from_notify(event) {
                    if let Err(err) = tx.blocking_send(WatchMessage::Event(raw)) {
                        debug!(
                            root = %root_for_log.display(),
                            error = %err,
                            "watch channel closed; dropping event"
                        );
                        return;
                    }
                }
            }
            Err(err) => {
                let _ = tx.blocking_send(WatchMessage::Error {
                    message: err.to_string(),
                });
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|err| {
        VaultError::Watch(format!(
            "failed to create watcher for {}: {err}",
            root.display()
        ))
    })?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|err| VaultError::Watch(format!("failed to watch {}: {err}", root.display())))?;

    Ok(watcher)
}

pub(crate) async fn spawn_in_process(
    root: PathBuf,
    tx: mpsc::Sender<WatchMessage>,
) -> Result<Monitor> {
    let watcher = spawn_blocking(move || watch_in_process(&root, tx))
        .await
        .map_err(|err| VaultError::Watch(format!("watcher initialization panicked: {err}")))??;
    Ok(Monitor::InProcess(watcher))
}

/// Run `program args.. <root>` and forward the JSON lines it prints.
///
/// The child's stdin stays open for its lifetime so a worker can exit once
/// its parent is gone. When the child exits on its own the consumer gets a
/// [`WatchMessage::Error`].
pub(crate) fn spawn_subprocess(
    program: &Path,
    args: &[String],
    root: PathBuf,
    tx: mpsc::Sender<WatchMessage>,
    cancel: CancellationToken,
) -> Result<Monitor> {
    let mut child = Command::new(program)
        .args(args)
        .arg(&root)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| {
            VaultError::Watch(format!(
                "failed to spawn watch worker {}: {err}",
                program.display()
            ))
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| VaultError::Watch("watch worker has no stdout".into()))?;

    info!(
        root = %root.display(),
        program = %program.display(),
        pid = child.id(),
        "started isolated watch worker"
    );

    let reader_root = root.clone();
    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        let root = reader_root;
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = reader_cancel.cancelled() => {
                    if let Err(err) = child.kill().await {
                        debug!(root = %root.display(), error = %err, "watch worker already gone");
                    }
                    break;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<WatchMessage>(&line) {
                            Ok(message) => {
                                if tx.send(message).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                warn!(root = %root.display(), error = %err, "malformed line from watch worker");
                            }
                        }
                    }
                    Ok(None) => {
                        let status = child.wait().await;
                        let message = match status {
                            Ok(status) => format!("watch worker for {} exited: {status}", root.display()),
                            Err(err) => format!("watch worker for {} vanished: {err}", root.display()),
                        };
                        let _ = tx.send(WatchMessage::Error { message }).await;
                        break;
                    }
                    Err(err) => {
                        let _ = tx
                            .send(WatchMessage::Error {
                                message: format!("reading watch worker for {}: {err}", root.display()),
                            })
                            .await;
                        break;
                    }
                },
            }
        }
    });

    Ok(Monitor::Subprocess(SubprocessMonitor {
        root,
        cancel,
        reader,
    }))
}
