//! Error types for the file watcher.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors that can occur while watching a directory tree.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The configured root did not exist at start.
    #[error("watch root does not exist: {0}")]
    RootMissing(PathBuf),

    /// The watcher was already started.
    #[error("watcher already started")]
    AlreadyStarted,

    /// The watcher is not running.
    #[error("watcher is not running")]
    NotRunning,

    /// A directory to be watched does not exist.
    #[error("directory not found: {0}")]
    NotFound(PathBuf),

    /// A directory to be watched is not accessible.
    #[error("permission denied: {0}")]
    Permission(PathBuf),

    /// Failure in the notification backend.
    #[error("backend error: {0}")]
    Backend(#[from] notify::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A subscriber's queue dropped its oldest undelivered events.
    #[error("subscriber queue overflowed, {0} events dropped")]
    Overflow(u64),

    /// The watcher has shut down.
    #[error("watcher closed")]
    Closed,
}
