//! # Change-List Builder
//!
//! Turns raw inode-level events from the native diff facility into a finished,
//! deduplicated change list for one layer.
//!
//! The facility reports a directory as modified when a hard link inside it is
//! retargeted, but says nothing about which child changed. Every modified
//! directory therefore gets a shallow comparison against its parent-layer
//! counterpart. Created and renamed directories are enumerated in full, and
//! events already covered by such an enumeration are suppressed.

use crate::archive::enumerate_subtree;
use crate::changes::ChangeList;
use crate::common::{Change, ChangeKind, EntryType, EventKind, RawChangeEvent};
use crate::compare::shallow_compare;
use crate::error::{DiffError, Result};
use crate::native::{DiffReference, NativeDiff};

use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Builds the change list of the layer mounted at `layer_root` relative to the
/// parent mounted at `parent_root`.
///
/// Any error aborts the build; a partial list is never returned.
pub fn build_change_list<D>(
    diff: &D,
    layer_root: &Path,
    parent_root: &Path,
    reference: &DiffReference,
) -> Result<Vec<Change>>
where
    D: NativeDiff + ?Sized,
{
    let events = diff.changes(reference)?;
    let total = events.len();

    let mut list = ChangeList::new();
    for event in events {
        apply_event(&mut list, event, layer_root, parent_root)?;
    }

    info!(%reference, events = total, changes = list.len(), "built change list");
    Ok(list.finalize())
}

/// Folds one raw event into `list`.
pub fn apply_event(
    list: &mut ChangeList,
    event: RawChangeEvent,
    layer_root: &Path,
    parent_root: &Path,
) -> Result<()> {
    let path = relativize(layer_root, &event.path)?;
    let new_path = event.new_path.as_deref().map(|p| relativize(layer_root, p)).transpose()?;
    debug!(path = %path.display(), kind = ?event.kind, entry = ?event.entry_type, "diff event");

    match (event.entry_type, event.kind) {
        (EntryType::Directory, EventKind::Modified) => {
            let children = shallow_compare(
                &path,
                &on_disk(parent_root, &path),
                &on_disk(layer_root, &path),
            )?;
            // The layer root has no archive entry of its own.
            if path != Path::new("/") {
                list.merge(Change::modify(&path));
            }
            list.merge_all(children);
        }
        (EntryType::Directory, EventKind::Created) => {
            if enumerated_by_parent(list, &path) {
                debug!(path = %path.display(), "created directory already enumerated");
            } else {
                // An Add from a shallow compare of the parent names the
                // directory only; its children still need enumerating.
                list.merge_all(enumerate_subtree(layer_root, &path)?);
            }
        }
        (EntryType::Directory, EventKind::Removed) => list.merge(Change::delete(&path)),
        (EntryType::Directory, EventKind::Renamed) => {
            let to = rename_destination(&path, new_path)?;
            list.merge(Change::delete(path));
            // Moved children get no events of their own.
            list.merge_all(enumerate_subtree(layer_root, &to)?);
        }
        (EntryType::File, kind) => {
            if parent_covered(list, &path) {
                debug!(path = %path.display(), "covered by parent directory record");
                return Ok(());
            }
            match kind {
                EventKind::Created => list.merge(Change::add(path)),
                EventKind::Removed => list.merge(Change::delete(path)),
                EventKind::Modified => list.merge(Change::modify(path)),
                EventKind::Renamed => merge_rename(list, path, new_path)?,
            }
        }
    }

    Ok(())
}

fn merge_rename(list: &mut ChangeList, from: PathBuf, to: Option<PathBuf>) -> Result<()> {
    let to = rename_destination(&from, to)?;
    list.merge(Change::delete(from));
    list.merge(Change::add(to));
    Ok(())
}

fn rename_destination(from: &Path, to: Option<PathBuf>) -> Result<PathBuf> {
    to.ok_or_else(|| DiffError::DiffFacility(format!("rename of '{}' has no destination", from.display())))
}

fn parent_covered(list: &ChangeList, path: &Path) -> bool {
    path.parent().map_or(false, |parent| list.contains(parent))
}

/// True when the parent was itself created, so its enumeration already
/// walked `path` and everything below it.
fn enumerated_by_parent(list: &ChangeList, path: &Path) -> bool {
    path.parent().map_or(false, |parent| list.kind_of(parent) == Some(ChangeKind::Add))
}

/// Rewrites a mounted-filesystem path into a `/`-rooted layer path.
pub fn relativize(root: &Path, path: &Path) -> Result<PathBuf> {
    let rel = path.strip_prefix(root).map_err(|_| DiffError::StripPrefix {
        prefix: root.to_path_buf(),
        path: path.to_path_buf(),
    })?;

    let mut rooted = PathBuf::from("/");
    for component in rel.components() {
        match component {
            Component::Normal(part) => rooted.push(part),
            Component::CurDir => {}
            _ => {
                return Err(DiffError::StripPrefix {
                    prefix: root.to_path_buf(),
                    path: path.to_path_buf(),
                })
            }
        }
    }
    Ok(rooted)
}

/// Maps a `/`-rooted layer path back onto a mounted root.
pub(crate) fn on_disk(root: &Path, layer_path: &Path) -> PathBuf {
    match layer_path.strip_prefix("/") {
        Ok(rel) => root.join(rel),
        Err(_) => root.join(layer_path),
    }
}
