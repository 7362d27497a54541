//! # Shallow Comparator
//!
//! Compares the immediate children of one directory across two layers. The two
//! metadata scans run in parallel and are both joined before either result is
//! inspected; there is no early cancellation when one side fails.

use crate::common::{Change, EntryMetadata};
use crate::error::{DiffError, Result};
use crate::metadata::{collect_dir_metadata, MetadataSnapshot};

use std::ffi::OsString;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use tracing::debug;

/// Scans `old_dir` and `new_dir` in parallel and compares their children.
///
/// `dir` is the `/`-rooted layer path both directories represent; every
/// returned change is a direct child of it.
pub fn shallow_compare(dir: &Path, old_dir: &Path, new_dir: &Path) -> Result<Vec<Change>> {
    let (old, new) = rayon::join(
        || scan_task(old_dir),
        || scan_task(new_dir),
    );
    let (old, new) = (old?, new?);

    let changes = compare_snapshots(dir, &old, new);
    debug!(dir = %dir.display(), old = old.len(), changes = changes.len(), "shallow compare");
    Ok(changes)
}

/// Runs one scan, turning a panic into an error so the other side is still joined.
fn scan_task(dir: &Path) -> Result<MetadataSnapshot> {
    panic::catch_unwind(AssertUnwindSafe(|| collect_dir_metadata(dir)))
        .unwrap_or_else(|_| Err(DiffError::Other(format!("metadata scan of '{}' panicked", dir.display()).into())))
}

/// Diffs two snapshots of the same directory.
///
/// Deletes and modifies come first (sorted by name), adds for entries only
/// present in `new` follow (also sorted), so output is deterministic.
pub fn compare_snapshots(dir: &Path, old: &MetadataSnapshot, mut new: MetadataSnapshot) -> Vec<Change> {
    let mut changes = Vec::new();

    let mut old_names: Vec<&OsString> = old.entries.keys().collect();
    old_names.sort();
    for name in old_names {
        let old_meta = &old.entries[name];
        match new.entries.remove(name) {
            None => changes.push(Change::delete(dir.join(name))),
            Some(new_meta) => {
                if !same_entry(old_meta, &new_meta) {
                    changes.push(Change::modify(dir.join(name)));
                }
            }
        }
    }

    let mut added: Vec<OsString> = new.entries.into_keys().collect();
    added.sort();
    changes.extend(added.into_iter().map(|name| Change::add(dir.join(name))));

    changes
}

/// Returns true if two entries carry the same metadata.
///
/// Size and modification time only count for non-directories.
pub fn same_entry(old: &EntryMetadata, new: &EntryMetadata) -> bool {
    if old.mode != new.mode || old.uid != new.uid || old.gid != new.gid || old.rdev != new.rdev {
        return false;
    }
    if !old.is_dir() && (!same_mtime(old, new) || old.size != new.size) {
        return false;
    }
    old.capability == new.capability
}

/// Seconds must match; nanoseconds only when both sides recorded them.
fn same_mtime(a: &EntryMetadata, b: &EntryMetadata) -> bool {
    a.mtime_sec == b.mtime_sec && (a.mtime_nsec == b.mtime_nsec || a.mtime_nsec == 0 || b.mtime_nsec == 0)
}
