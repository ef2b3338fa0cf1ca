use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::thread;

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};

use super::convert::raw_events_from_notify;
use super::monitor::WatchMessage;
use crate::error::{Result, VaultError};

enum Signal {
    Notify(std::result::Result<Event, notify::Error>),
    ParentGone,
}

/// Child side of isolated watching.
///
/// Watches `roots` recursively and writes one [`WatchMessage`] JSON line per
/// raw event to `out`. Returns when `out` can no longer be written or, with
/// `exit_on_stdin_eof`, when the parent closes our stdin. A crash here takes
/// down only the worker process.
pub fn run_watch_worker<W: Write>(
    roots: &[PathBuf],
    out: W,
    exit_on_stdin_eof: bool,
) -> Result<()> {
    if roots.is_empty() {
        return Err(VaultError::Watch("no paths to watch".into()));
    }

    let (tx, rx) = std_mpsc::channel::<Signal>();

    let mut watchers = Vec::with_capacity(roots.len());
    for root in roots {
        let notify_tx = tx.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                let _ = notify_tx.send(Signal::Notify(res));
            },
            NotifyConfig::default(),
        )
        .map_err(|err| {
            VaultError::Watch(format!("failed to create watcher for {}: {err}", root.display()))
        })?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|err| VaultError::Watch(format!("failed to watch {}: {err}", root.display())))?;
        watchers.push(watcher);
    }

    if exit_on_stdin_eof {
        let parent_tx = tx.clone();
        thread::Builder::new()
            .name("watch-worker-stdin".into())
            .spawn(move || {
                let mut sink = [0u8; 256];
                let mut stdin = io::stdin().lock();
                while matches!(stdin.read(&mut sink), Ok(n) if n > 0) {}
                let _ = parent_tx.send(Signal::ParentGone);
            })?;
    }
    drop(tx);

    let mut out = BufWriter::new(out);
    for signal in rx {
        let messages: Vec<WatchMessage> = match signal {
            Signal::Notify(Ok(event)) => raw_events_from_notify(event)
                .into_iter()
                .map(WatchMessage::Event)
                .collect(),
            Signal::Notify(Err(err)) => vec![WatchMessage::Error {
                message: err.to_string(),
            }],
            Signal::ParentGone => break,
        };
        if messages.is_empty() {
            continue;
        }
        for message in &messages {
            serde_json::to_writer(&mut out, message)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
    }

    drop(watchers);
    Ok(())
}
