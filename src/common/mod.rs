//! Common types shared by every stage of the diff pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;

/// Metadata for a single directory entry, captured once per scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Device number of a special file (`st_rdev`); zero for everything else.
    pub rdev: u64,
    pub mtime_sec: i64,
    pub mtime_nsec: i64,
    pub size: u64,
    /// Raw `security.capability` value, if the entry carries one.
    pub capability: Option<Vec<u8>>,
}

impl EntryMetadata {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }
}

/// Entry type as reported by the native diff facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
}

/// What happened to an inode between the two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Removed,
    Modified,
    Renamed,
}

/// One change event as produced by the native diff facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChangeEvent {
    pub path: PathBuf,
    /// Destination of a rename; `None` for every other kind.
    pub new_path: Option<PathBuf>,
    pub entry_type: EntryType,
    pub kind: EventKind,
}

impl RawChangeEvent {
    pub fn new(kind: EventKind, entry_type: EntryType, path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), new_path: None, entry_type, kind }
    }

    pub fn renamed(entry_type: EntryType, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            path: from.into(),
            new_path: Some(to.into()),
            entry_type,
            kind: EventKind::Renamed,
        }
    }
}

/// Kind of a change in the finished change list.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ChangeKind::Add => "A",
            ChangeKind::Modify => "C",
            ChangeKind::Delete => "D",
        };
        f.write_str(tag)
    }
}

/// A single entry of the output change list. `path` is always `/`-rooted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl Change {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self { path: path.into(), kind }
    }

    pub fn add(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Add)
    }

    pub fn modify(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Modify)
    }

    pub fn delete(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Delete)
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path.display())
    }
}
