//! # Filewatch
//!
//! This crate provides recursive directory watching with a single, uniform
//! event stream, on platforms whose native notification primitives disagree
//! about recursion and semantics.
//!
//! ## Features
//!
//! - **Recursive Watching**: Every existing directory under the root is
//!   watched, and the watch set follows directory creations and deletions
//! - **Exclusion Policy**: `.git` and `node_modules` subtrees are neither
//!   watched nor reported
//! - **Fan-out**: Events are delivered to any number of subscribers; a slow
//!   subscriber never blocks the producer or its peers
//! - **Uniform Backend**: The OS primitive is abstracted behind a minimal
//!   per-directory contract
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        File Watcher                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  WatchBackend ──► FileWatcher ──► ClientHub ──► subscribers    │
//! │       │                │               │                        │
//! │       ▼                ▼               ▼                        │
//! │  NotifyBackend    is_watchable    FileWatchClient              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use filewatch::{FileWatcher, NotifyBackend};
//!
//! let backend = NotifyBackend::new()?;
//! let watcher = FileWatcher::new("/path/to/repo", backend);
//! watcher.start().await?;
//! let id = watcher.add_client(subscriber).await?;
//! ```

pub mod backend;
pub mod clients;
pub mod error;
pub mod event;
pub mod filter;
pub mod watcher;

pub use backend::{NotifyBackend, WatchBackend};
pub use clients::{ClientId, FileWatchClient};
pub use error::{Result, WatchError};
pub use event::{Event, EventKind, PrimitiveEvent, PrimitiveEventKind};
pub use filter::is_watchable;
pub use watcher::FileWatcher;
