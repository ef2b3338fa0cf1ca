use std::path::PathBuf;

use notify::Event;
use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind, RenameMode};

use crate::types::{RawEvent, RawEventKind};

/// Translate one notify event into the raw events the debouncer consumes.
///
/// Reads (`Access`) are dropped so the ingestor's own hashing does not feed
/// back into the watcher; only a close-after-write counts as a modification.
/// Metadata-only changes are dropped too.
pub fn raw_events_from_notify(event: Event) -> Vec<RawEvent> {
    let Event { kind, paths, .. } = event;

    match kind {
        EventKind::Create(_) => each(paths, RawEventKind::Created),
        EventKind::Remove(_) => each(paths, RawEventKind::Deleted),
        EventKind::Modify(ModifyKind::Name(mode)) => renamed(mode, paths),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => each(paths, RawEventKind::Modified),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            each(paths, RawEventKind::Modified)
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn each(paths: Vec<PathBuf>, kind: RawEventKind) -> Vec<RawEvent> {
    paths
        .into_iter()
        .map(|path| RawEvent::new(kind, path))
        .collect()
}

fn renamed(mode: RenameMode, paths: Vec<PathBuf>) -> Vec<RawEvent> {
    match mode {
        RenameMode::Both => {
            let mut paths = paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => vec![RawEvent::moved(from, to)],
                (Some(only), None) => vec![presence(only)],
                _ => Vec::new(),
            }
        }
        RenameMode::From => each(paths, RawEventKind::Deleted),
        RenameMode::To => each(paths, RawEventKind::Created),
        // Backends that cannot tell the two halves apart (FSEvents) report
        // each side separately; the filesystem says which side this is.
        RenameMode::Any | RenameMode::Other => paths.into_iter().map(presence).collect(),
    }
}

fn presence(path: PathBuf) -> RawEvent {
    if path.exists() {
        RawEvent::new(RawEventKind::Created, path)
    } else {
        RawEvent::new(RawEventKind::Deleted, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    fn kinds(events: &[RawEvent]) -> Vec<RawEventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn create_remove_and_data_changes_map_directly() {
        let created = raw_events_from_notify(event(
            EventKind::Create(CreateKind::File),
            &["/w/a.jpg"],
        ));
        assert_eq!(kinds(&created), vec![RawEventKind::Created]);

        let removed = raw_events_from_notify(event(
            EventKind::Remove(RemoveKind::File),
            &["/w/a.jpg"],
        ));
        assert_eq!(kinds(&removed), vec![RawEventKind::Deleted]);

        let written = raw_events_from_notify(event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/w/a.jpg"],
        ));
        assert_eq!(kinds(&written), vec![RawEventKind::Modified]);
    }

    #[test]
    fn reads_and_metadata_changes_are_dropped() {
        assert!(
            raw_events_from_notify(event(
                EventKind::Access(AccessKind::Open(AccessMode::Read)),
                &["/w/a.jpg"],
            ))
            .is_empty()
        );
        assert!(
            raw_events_from_notify(event(
                EventKind::Access(AccessKind::Close(AccessMode::Read)),
                &["/w/a.jpg"],
            ))
            .is_empty()
        );
        assert!(
            raw_events_from_notify(event(
                EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
                &["/w/a.jpg"],
            ))
            .is_empty()
        );

        let closed = raw_events_from_notify(event(
            EventKind::Access(AccessKind::Close(AccessMode::Write)),
            &["/w/a.jpg"],
        ));
        assert_eq!(kinds(&closed), vec![RawEventKind::Modified]);
    }

    #[test]
    fn paired_rename_becomes_a_move_keyed_by_destination() {
        let events = raw_events_from_notify(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/w/tmp.part", "/w/final.jpg"],
        ));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, RawEventKind::Moved);
        assert_eq!(events[0].path, PathBuf::from("/w/tmp.part"));
        assert_eq!(events[0].window_key(), PathBuf::from("/w/final.jpg"));
    }

    #[test]
    fn rename_halves_become_delete_and_create() {
        let from = raw_events_from_notify(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/w/old.jpg"],
        ));
        assert_eq!(kinds(&from), vec![RawEventKind::Deleted]);

        let to = raw_events_from_notify(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/w/new.jpg"],
        ));
        assert_eq!(kinds(&to), vec![RawEventKind::Created]);
    }

    #[test]
    fn ambiguous_rename_checks_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("here.jpg");
        std::fs::write(&present, b"x").unwrap();
        let absent = dir.path().join("gone.jpg");

        let mut raw = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any)));
        raw = raw.add_path(present).add_path(absent);
        let events = raw_events_from_notify(raw);
        assert_eq!(
            kinds(&events),
            vec![RawEventKind::Created, RawEventKind::Deleted]
        );
    }
}
