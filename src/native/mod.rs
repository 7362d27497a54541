//! # Native Snapshot Diff
//!
//! The snapshot-diff facility reports changed inodes between a point-in-time
//! snapshot and a live dataset without walking the tree. [`ZfsDiff`] shells out
//! to `zfs diff`; [`RecordedDiff`] replays previously captured output.

mod parse;
mod zfs;

pub use parse::{parse_diff_line, parse_diff_output};
pub use zfs::ZfsDiff;

use crate::common::RawChangeEvent;
use crate::error::{DiffError, Result};

use std::fmt;
use std::path::Path;

/// Identifies the prior state a diff is computed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffReference {
    /// Origin snapshot, e.g. `tank/layers/parent@child`.
    pub snapshot: String,
    /// Dataset compared with the snapshot; defaults to the snapshot's own dataset.
    pub target: Option<String>,
}

impl DiffReference {
    pub fn new(snapshot: impl Into<String>) -> Self {
        Self { snapshot: snapshot.into(), target: None }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

impl fmt::Display for DiffReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{} -> {}", self.snapshot, target),
            None => f.write_str(&self.snapshot),
        }
    }
}

/// A source of raw change events between a snapshot and the current layer.
pub trait NativeDiff: Send + Sync {
    /// Returns the events in the order the facility produced them.
    fn changes(&self, reference: &DiffReference) -> Result<Vec<RawChangeEvent>>;
}

impl<T: NativeDiff + ?Sized> NativeDiff for Box<T> {
    fn changes(&self, reference: &DiffReference) -> Result<Vec<RawChangeEvent>> {
        (**self).changes(reference)
    }
}

/// Replays captured `zfs diff -F -H` output, ignoring the reference.
#[derive(Debug, Clone, Default)]
pub struct RecordedDiff {
    output: String,
}

impl RecordedDiff {
    pub fn new(output: impl Into<String>) -> Self {
        Self { output: output.into() }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let output = std::fs::read_to_string(path).map_err(|e| DiffError::io(e, path))?;
        Ok(Self { output })
    }
}

impl NativeDiff for RecordedDiff {
    fn changes(&self, _reference: &DiffReference) -> Result<Vec<RawChangeEvent>> {
        parse_diff_output(&self.output)
    }
}
