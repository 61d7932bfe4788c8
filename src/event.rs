//! Event types exchanged between the backend, the watcher, and subscribers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A change under the watched root, as reported to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// The kind of change.
    pub kind: EventKind,

    /// Absolute path of the affected entry.
    pub path: PathBuf,
}

impl Event {
    /// Create a new event.
    pub fn new(kind: EventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Kind of change reported to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An entry appeared under the root.
    Added,

    /// An entry was removed.
    Removed,

    /// An entry's contents changed.
    Modified,

    /// An entry was renamed; the path carries the new name.
    Renamed,

    /// Anything else the platform reports.
    Other,
}

/// A raw notification from the backend primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveEvent {
    /// The kind of notification.
    pub kind: PrimitiveEventKind,

    /// Absolute path of the affected entry (not the watched directory).
    pub path: PathBuf,
}

impl PrimitiveEvent {
    /// Create a new primitive event.
    pub fn new(kind: PrimitiveEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Kind of a primitive backend notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveEventKind {
    /// An entry was created.
    Created,

    /// An entry was deleted.
    Deleted,

    /// An entry's contents changed.
    Modified,

    /// An entry was renamed; the path carries the new name.
    Renamed,

    /// Anything else the platform reports.
    Other,
}

impl From<PrimitiveEventKind> for EventKind {
    fn from(kind: PrimitiveEventKind) -> Self {
        match kind {
            PrimitiveEventKind::Created => Self::Added,
            PrimitiveEventKind::Deleted => Self::Removed,
            PrimitiveEventKind::Modified => Self::Modified,
            PrimitiveEventKind::Renamed => Self::Renamed,
            PrimitiveEventKind::Other => Self::Other,
        }
    }
}

impl From<notify::EventKind> for PrimitiveEventKind {
    fn from(kind: notify::EventKind) -> Self {
        match kind {
            notify::EventKind::Create(_) => Self::Created,
            notify::EventKind::Remove(_) => Self::Deleted,
            notify::EventKind::Modify(modify_kind) => match modify_kind {
                notify::event::ModifyKind::Name(rename) => match rename {
                    // The old name of a rename is not tracked.
                    notify::event::RenameMode::From | notify::event::RenameMode::Other => {
                        Self::Other
                    }
                    _ => Self::Renamed,
                },
                _ => Self::Modified,
            },
            _ => Self::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind, RenameMode};
    use pretty_assertions::assert_eq;
    use std::path::Path;

    #[test]
    fn test_event_creation() {
        let event = Event::new(EventKind::Added, "/test/file.txt");
        assert_eq!(event.kind, EventKind::Added);
        assert_eq!(event.path, Path::new("/test/file.txt"));
    }

    #[test]
    fn test_notify_kind_mapping() {
        assert_eq!(
            PrimitiveEventKind::from(notify::EventKind::Create(CreateKind::File)),
            PrimitiveEventKind::Created
        );
        assert_eq!(
            PrimitiveEventKind::from(notify::EventKind::Remove(RemoveKind::Folder)),
            PrimitiveEventKind::Deleted
        );
        assert_eq!(
            PrimitiveEventKind::from(notify::EventKind::Modify(ModifyKind::Data(
                DataChange::Content
            ))),
            PrimitiveEventKind::Modified
        );
        assert_eq!(
            PrimitiveEventKind::from(notify::EventKind::Modify(ModifyKind::Name(
                RenameMode::To
            ))),
            PrimitiveEventKind::Renamed
        );
        assert_eq!(
            PrimitiveEventKind::from(notify::EventKind::Modify(ModifyKind::Name(
                RenameMode::From
            ))),
            PrimitiveEventKind::Other
        );
        assert_eq!(
            PrimitiveEventKind::from(notify::EventKind::Modify(ModifyKind::Metadata(
                MetadataKind::Permissions
            ))),
            PrimitiveEventKind::Modified
        );
    }

    #[test]
    fn test_event_serde_round_trip() {
        let event = Event::new(EventKind::Added, "/repo/parent/child");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"added\""), "kinds serialize snake_case: {json}");
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_semantic_kind_mapping() {
        assert_eq!(
            EventKind::from(PrimitiveEventKind::Created),
            EventKind::Added
        );
        assert_eq!(
            EventKind::from(PrimitiveEventKind::Deleted),
            EventKind::Removed
        );
        assert_eq!(
            EventKind::from(PrimitiveEventKind::Renamed),
            EventKind::Renamed
        );
    }
}
