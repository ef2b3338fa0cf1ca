//! Per-path quiet-period debouncing.
//!
//! Every path with pending raw events owns one window and one timer in a
//! shared `DelayQueue`. Each new event for the path resets its timer; when the
//! timer finally fires the window resolves to exactly one canonical event and
//! is discarded.
//!
//! Some backends report a rename three times: a deletion at the source, a
//! creation at the destination and the paired move. The move absorbs the other
//! two so the rename settles as a single `Moved`.

use std::collections::HashMap;
use std::fmt;
use std::future::poll_fn;
use std::path::{Path, PathBuf};
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use tokio_util::time::DelayQueue;
use tokio_util::time::delay_queue::Key;

use crate::types::{CanonicalEvent, CanonicalEventKind, RawEvent, RawEventKind};

/// Collapse one window's raw events into its canonical event.
///
/// Precedence: a trailing deletion wins; otherwise any creation means the file
/// appeared (at the first creation's path); otherwise the last rename wins;
/// plain modifications count as an appearance.
pub fn resolve_window(key: &Path, events: &[RawEvent]) -> Option<CanonicalEvent> {
    let last = events.last()?;
    let timestamp = Utc::now();

    if last.kind == RawEventKind::Deleted {
        return Some(CanonicalEvent {
            path: key.to_path_buf(),
            kind: CanonicalEventKind::Removed,
            timestamp,
            dest_path: None,
        });
    }

    if let Some(created) = events.iter().find(|e| e.kind == RawEventKind::Created) {
        return Some(CanonicalEvent {
            path: created.path.clone(),
            kind: CanonicalEventKind::Appeared,
            timestamp,
            dest_path: None,
        });
    }

    if let Some(moved) = events.iter().rev().find(|e| e.kind == RawEventKind::Moved) {
        return Some(CanonicalEvent {
            path: moved.path.clone(),
            kind: CanonicalEventKind::Moved,
            timestamp,
            dest_path: moved.dest_path.clone(),
        });
    }

    Some(CanonicalEvent {
        path: key.to_path_buf(),
        kind: CanonicalEventKind::Appeared,
        timestamp,
        dest_path: None,
    })
}

struct Window {
    events: Vec<RawEvent>,
    timer: Key,
}

pub struct Debouncer {
    quiet: Duration,
    windows: HashMap<PathBuf, Window>,
    timers: DelayQueue<PathBuf>,
}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("quiet", &self.quiet)
            .field("pending_paths", &self.windows.len())
            .finish()
    }
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            windows: HashMap::new(),
            timers: DelayQueue::new(),
        }
    }

    /// Add a raw event to its path's window, opening the window or pushing
    /// its deadline back.
    pub fn push(&mut self, event: RawEvent) {
        if event.kind == RawEventKind::Moved
            && let Some(dest) = &event.dest_path
            && dest != &event.path
        {
            self.absorb_rename_halves(&event.path, dest);
        }

        let key = event.window_key().to_path_buf();
        match self.windows.get_mut(&key) {
            Some(window) => {
                window.events.push(event);
                self.timers.reset(&window.timer, self.quiet);
            }
            None => {
                let timer = self.timers.insert(key.clone(), self.quiet);
                self.windows.insert(
                    key,
                    Window {
                        events: vec![event],
                        timer,
                    },
                );
            }
        }
    }

    /// Drop the source's deletions and the destination's creation that were
    /// reported for the rename `from` -> `to`.
    fn absorb_rename_halves(&mut self, from: &Path, to: &Path) {
        let only_deletions = self.windows.get(from).is_some_and(|window| {
            window.events.iter().all(|e| e.kind == RawEventKind::Deleted)
        });
        if only_deletions && let Some(window) = self.windows.remove(from) {
            self.timers.remove(&window.timer);
        }

        if let Some(window) = self.windows.get_mut(to) {
            window
                .events
                .retain(|e| !(e.kind == RawEventKind::Created && e.path == to));
        }
    }

    /// Paths with an open window.
    pub fn pending(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drop every open window and timer without emitting anything.
    pub fn clear(&mut self) {
        self.windows.clear();
        self.timers.clear();
    }

    pub fn poll_fired(&mut self, cx: &mut Context<'_>) -> Poll<Option<CanonicalEvent>> {
        loop {
            match self.timers.poll_expired(cx) {
                Poll::Ready(Some(expired)) => {
                    let key = expired.into_inner();
                    if let Some(window) = self.windows.remove(&key)
                        && let Some(event) = resolve_window(&key, &window.events)
                    {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    /// Next window to go quiet. `None` when nothing is pending.
    pub async fn next_fired(&mut self) -> Option<CanonicalEvent> {
        poll_fn(|cx| self.poll_fired(cx)).await
    }
}
