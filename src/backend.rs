//! The OS notification backend contract and its `notify`-based adapter.

use std::io;
use std::path::Path;
use std::sync::Mutex;

use notify::event::{ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, WatchError};
use crate::event::{PrimitiveEvent, PrimitiveEventKind};

/// Capacity of the primitive event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Capacity of the backend error channel.
const ERROR_CHANNEL_CAPACITY: usize = 64;

/// A uniform, non-recursive directory-watch primitive.
///
/// One registration per directory; notifications for entries inside any
/// registered directory arrive on the single stream returned by
/// [`WatchBackend::events`]. Within one directory events keep the order the
/// platform reported them; across directories no order is promised.
pub trait WatchBackend: Send + Sync + 'static {
    /// Register a single directory. Registering a directory that is already
    /// in the watch set is not an error.
    fn add(&self, dir: &Path) -> Result<()>;

    /// Take the primitive event stream. Yields `Some` exactly once; the
    /// stream has a single consumer.
    fn events(&self) -> Option<mpsc::Receiver<PrimitiveEvent>>;

    /// Take the backend error stream. Yields `Some` exactly once.
    fn errors(&self) -> Option<mpsc::Receiver<WatchError>>;

    /// Release all OS handles. Both streams terminate.
    fn close(&self);
}

/// Production backend over `notify`'s recommended platform watcher.
///
/// Every directory is registered with [`RecursiveMode::NonRecursive`], so the
/// engine sees the same per-directory primitive whether the platform's
/// native mechanism is recursive (FSEvents, ReadDirectoryChangesW) or not
/// (inotify).
pub struct NotifyBackend {
    watcher: Mutex<Option<RecommendedWatcher>>,
    events: Mutex<Option<mpsc::Receiver<PrimitiveEvent>>>,
    errors: Mutex<Option<mpsc::Receiver<WatchError>>>,
}

impl NotifyBackend {
    /// Create the platform watcher and the channel bridge into async land.
    pub fn new() -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);

        // The callback runs on notify's own thread, so blocking sends are
        // fine and preserve per-directory ordering.
        let watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for primitive in translate(event) {
                        if event_tx.blocking_send(primitive).is_err() {
                            // Consumer gone; we are shutting down.
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = error_tx.blocking_send(WatchError::Backend(e));
                }
            },
        )?;

        Ok(Self {
            watcher: Mutex::new(Some(watcher)),
            events: Mutex::new(Some(event_rx)),
            errors: Mutex::new(Some(error_rx)),
        })
    }
}

impl WatchBackend for NotifyBackend {
    fn add(&self, dir: &Path) -> Result<()> {
        if !dir.exists() {
            return Err(WatchError::NotFound(dir.to_path_buf()));
        }
        let mut guard = self.watcher.lock().unwrap();
        let Some(watcher) = guard.as_mut() else {
            return Err(WatchError::Closed);
        };
        // Always re-issue the watch: a directory that was deleted and
        // recreated needs a fresh OS watch, and re-watching a live one is
        // harmless.
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| classify_add_error(e, dir))
    }

    fn events(&self) -> Option<mpsc::Receiver<PrimitiveEvent>> {
        self.events.lock().unwrap().take()
    }

    fn errors(&self) -> Option<mpsc::Receiver<WatchError>> {
        self.errors.lock().unwrap().take()
    }

    fn close(&self) {
        // Dropping the watcher releases the OS handles and the callback's
        // channel senders, terminating both streams.
        if self.watcher.lock().unwrap().take().is_some() {
            debug!("notify backend closed");
        }
    }
}

/// Map a registration failure onto the error taxonomy.
fn classify_add_error(err: notify::Error, dir: &Path) -> WatchError {
    match &err.kind {
        notify::ErrorKind::PathNotFound => WatchError::NotFound(dir.to_path_buf()),
        notify::ErrorKind::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {
            WatchError::NotFound(dir.to_path_buf())
        }
        notify::ErrorKind::Io(io_err) if io_err.kind() == io::ErrorKind::PermissionDenied => {
            WatchError::Permission(dir.to_path_buf())
        }
        _ => WatchError::Backend(err),
    }
}

/// Flatten a notify event into per-path primitive events.
///
/// Rename reporting keeps only the new name: `From` halves are dropped, and
/// a two-path `Both` event yields a single `Renamed` for its final path.
fn translate(event: notify::Event) -> Vec<PrimitiveEvent> {
    match event.kind {
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Vec::new(),
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event
            .paths
            .last()
            .map(|path| PrimitiveEvent::new(PrimitiveEventKind::Renamed, path.clone()))
            .into_iter()
            .collect(),
        kind => {
            let kind = PrimitiveEventKind::from(kind);
            event
                .paths
                .into_iter()
                .map(|path| PrimitiveEvent::new(kind, path))
                .collect()
        }
    }
}
