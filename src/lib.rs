//! # layerdiff Core Library
//!
//! This crate computes the filesystem changes between a container image layer
//! and its parent layer, both backed by snapshots of a copy-on-write filesystem,
//! and packages them as a layer archive.
//!
//! The native snapshot-diff facility reports changed inodes quickly but is blind
//! to hard-link-only updates inside an otherwise unchanged directory. The engine
//! repairs that with shallow per-directory metadata comparisons and merges every
//! source of changes into one deduplicated list.
//!
//! ## Key Modules
//!
//! - [`metadata`]: One-level metadata snapshots of a directory.
//! - [`compare`]: Shallow comparison of two directory snapshots.
//! - [`changes`]: The ordered, conflict-resolving change list.
//! - [`native`]: The native snapshot-diff facility (`zfs diff`) and its parser.
//! - [`builder`]: Reconciles raw diff events into a finished change list.
//! - [`archive`]: Tree enumeration and lazy tar export of change lists.
//! - [`storage`]: Acquisition and release of mounted layers.
//! - [`driver`]: The two operations a storage driver calls.
//!
//! ## Examples
//!
//! ```no_run
//! use layerdiff::{DiffConfig, DirBackend, LayerDiffer, ZfsDiff};
//! use std::sync::Arc;
//!
//! let config = DiffConfig::from_env();
//! let differ = LayerDiffer::new(
//!     Arc::new(DirBackend::new("/var/lib/layers").with_dataset("tank/docker")),
//!     ZfsDiff::new(&config),
//!     config,
//! );
//! for change in differ.changes("child", "parent")? {
//!     println!("{change}");
//! }
//! # Ok::<(), layerdiff::DiffError>(())
//! ```

pub mod archive;
pub mod builder;
pub mod changes;
pub mod cli;
pub mod common;
pub mod compare;
pub mod config;
pub mod driver;
pub mod error;
pub mod metadata;
pub mod native;
pub mod storage;

pub use archive::ArchiveStream;
pub use changes::ChangeList;
pub use common::{Change, ChangeKind, EntryMetadata, EntryType, EventKind, RawChangeEvent};
pub use config::DiffConfig;
pub use driver::LayerDiffer;
pub use error::{DiffError, Result};
pub use native::{DiffReference, NativeDiff, RecordedDiff, ZfsDiff};
pub use storage::{DirBackend, StorageBackend};
