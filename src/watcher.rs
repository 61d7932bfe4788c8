//! The recursive watcher engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use crate::backend::WatchBackend;
use crate::clients::{ClientHub, ClientId, FileWatchClient};
use crate::error::{Result, WatchError};
use crate::event::{Event, EventKind, PrimitiveEvent, PrimitiveEventKind};
use crate::filter::is_watchable;

/// Lifecycle of a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchState {
    New,
    Running,
    Closed,
}

/// Recursive directory watcher.
///
/// Maintains the invariant that every existing non-excluded directory under
/// the root is registered with the backend, translates primitive events into
/// semantic events, and publishes them to subscribers.
pub struct FileWatcher {
    root: PathBuf,
    backend: Arc<dyn WatchBackend>,
    hub: Arc<ClientHub>,
    state: Arc<RwLock<WatchState>>,
    producer: Mutex<Option<JoinHandle<()>>>,
}

impl FileWatcher {
    /// Create a watcher over `root`. The root must be an absolute path in
    /// the platform's native form.
    pub fn new(root: impl Into<PathBuf>, backend: impl WatchBackend) -> Self {
        Self {
            root: root.into(),
            backend: Arc::new(backend),
            hub: Arc::new(ClientHub::new()),
            state: Arc::new(RwLock::new(WatchState::New)),
            producer: Mutex::new(None),
        }
    }

    /// The root this watcher covers.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bootstrap watches over the existing tree and begin publishing events.
    ///
    /// Registers the root and every non-excluded directory under it, parents
    /// before children, then starts the producer task. The startup sweep
    /// emits no events. Individual subdirectories that cannot be registered
    /// are logged and skipped; a missing root is fatal.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.write().await;
        match *state {
            WatchState::New => {}
            WatchState::Running => return Err(WatchError::AlreadyStarted),
            WatchState::Closed => return Err(WatchError::NotRunning),
        }
        if !self.root.is_dir() {
            return Err(WatchError::RootMissing(self.root.clone()));
        }

        self.backend.add(&self.root)?;
        sweep_below(self.backend.as_ref(), &self.root, &self.root, None);

        let events = self.backend.events().ok_or(WatchError::Closed)?;
        let errors = self.backend.errors().ok_or(WatchError::Closed)?;
        let task = tokio::spawn(run_producer(
            self.root.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.hub),
            Arc::clone(&self.state),
            events,
            errors,
        ));
        *self.producer.lock().await = Some(task);

        *state = WatchState::Running;
        info!("file watcher started on {}", self.root.display());
        Ok(())
    }

    /// Register a subscriber. Only valid while running.
    pub async fn add_client(&self, client: Arc<dyn FileWatchClient>) -> Result<ClientId> {
        let state = self.state.read().await;
        match *state {
            WatchState::Running => self.hub.add_client(client).await,
            WatchState::New | WatchState::Closed => Err(WatchError::NotRunning),
        }
    }

    /// Deregister a subscriber; once this returns, no further events are
    /// delivered to it. Unknown ids are ignored.
    pub async fn remove_client(&self, id: ClientId) {
        self.hub.remove_client(id).await;
    }

    /// Shut down: release the backend's OS handles, stop the producer, and
    /// deliver `on_closed` to every subscriber. Idempotent.
    pub async fn close(&self) {
        let was_started = {
            let mut state = self.state.write().await;
            if *state == WatchState::Closed {
                return;
            }
            let was_started = *state == WatchState::Running;
            *state = WatchState::Closed;
            was_started
        };

        self.backend.close();
        if was_started {
            // Closing the backend ends its event stream; the producer
            // notices, closes the hub, and exits.
            if let Some(task) = self.producer.lock().await.take() {
                let _ = task.await;
            }
        } else {
            self.hub.close().await;
        }
        info!("file watcher closed");
    }
}

/// Producer loop: drains the backend's streams until they terminate, then
/// propagates the shutdown to subscribers.
async fn run_producer(
    root: PathBuf,
    backend: Arc<dyn WatchBackend>,
    hub: Arc<ClientHub>,
    state: Arc<RwLock<WatchState>>,
    mut events: mpsc::Receiver<PrimitiveEvent>,
    mut errors: mpsc::Receiver<WatchError>,
) {
    let mut errors_open = true;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => handle_primitive(&root, backend.as_ref(), &hub, event).await,
                None => break,
            },
            error = errors.recv(), if errors_open => match error {
                Some(error) => {
                    warn!("backend error: {error}");
                    hub.broadcast_error(error).await;
                }
                None => errors_open = false,
            },
        }
    }
    debug!("backend event stream ended");
    *state.write().await = WatchState::Closed;
    hub.close().await;
}

/// Translate one primitive event, maintaining the watch set along the way.
async fn handle_primitive(
    root: &Path,
    backend: &dyn WatchBackend,
    hub: &ClientHub,
    event: PrimitiveEvent,
) {
    if !is_watchable(root, &event.path) {
        trace!("dropping event under excluded path: {}", event.path.display());
        return;
    }
    match event.kind {
        PrimitiveEventKind::Created if is_real_directory(&event.path) => {
            // A directory appeared. Watch it and everything already inside
            // it before reporting, so the Added for the directory precedes
            // any event about its contents and nothing written in the
            // meantime is missed. A directory whose registration fails is
            // not reported; missing watches degrade gracefully.
            let mut burst = Vec::new();
            match backend.add(&event.path) {
                Ok(()) => burst.push(Event::new(EventKind::Added, event.path.clone())),
                Err(e) => debug!("failed to watch {}: {e}", event.path.display()),
            }
            sweep_below(backend, root, &event.path, Some(&mut burst));
            for event in burst {
                hub.broadcast_event(event).await;
            }
        }
        kind => {
            hub.broadcast_event(Event::new(EventKind::from(kind), event.path))
                .await;
        }
    }
}

/// True for directories only, never for symlinks to directories: a symlink
/// target inside the root is already watched transitively, so the link is
/// reported but not traversed.
fn is_real_directory(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|metadata| metadata.file_type().is_dir())
        .unwrap_or(false)
}

/// Walk the tree below `dir`, registering every non-excluded directory with
/// the backend, parents before children. Excluded subtrees are pruned
/// without descending. When `events` is supplied, an `Added` is recorded for
/// each encountered entry (files included), in discovery order.
///
/// Registration and read failures on individual entries are logged and
/// skipped; the rest of the tree is still covered. A directory whose
/// registration fails is still walked, but no `Added` is recorded for it.
fn sweep_below(
    backend: &dyn WatchBackend,
    root: &Path,
    dir: &Path,
    mut events: Option<&mut Vec<Event>>,
) {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| is_watchable(root, entry.path()));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("skipping unreadable entry under {}: {e}", dir.display());
                continue;
            }
        };
        if entry.file_type().is_dir() {
            if let Err(e) = backend.add(entry.path()) {
                debug!("failed to watch {}: {e}", entry.path().display());
                continue;
            }
        }
        if let Some(events) = events.as_deref_mut() {
            events.push(Event::new(EventKind::Added, entry.path()));
        }
    }
}
