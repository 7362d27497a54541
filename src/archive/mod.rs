//! # Layer Archive Export
//!
//! Packages a layer (or just the entries named by a change list) into a tar
//! stream, and enumerates trees into `Add`-only change lists.
//!
//! ## Stream layout
//!
//! - Entries are written in path order, so every parent precedes its children.
//! - A `Delete` becomes an empty whiteout entry named `<dir>/.wh.<name>`.
//! - `Add`/`Modify` entries are read from the mounted layer without following
//!   symlinks. Regular files sharing an inode are written once, then as hard
//!   links to the first name.
//! - `security.capability` travels as a `SCHILY.xattr.*` PAX record.
//!
//! Packaging runs on a dedicated writer thread and is consumed lazily through
//! [`ArchiveStream`], which reads from the mounted filesystem after the call
//! that created it has returned.

mod stream;

pub use stream::ArchiveStream;

use crate::builder::{on_disk, relativize};
use crate::common::{Change, ChangeKind};
use crate::config::DiffConfig;
use crate::error::{DiffError, Result};
use crate::metadata::{read_capability, CAPABILITY_XATTR};

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tar::{EntryType, Header, HeaderMode};
use tracing::debug;
use walkdir::WalkDir;

/// Prefix marking a deleted entry in a layer archive.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// Enumerates every entry below `root` as an `Add`. The root itself is excluded.
pub fn recursive_enumerate(root: &Path) -> Result<Vec<Change>> {
    walk_adds(root, root, 1)
}

/// Enumerates `dir` (a `/`-rooted layer path) and all of its descendants as `Add`s.
pub fn enumerate_subtree(root: &Path, dir: &Path) -> Result<Vec<Change>> {
    walk_adds(root, &on_disk(root, dir), 0)
}

fn walk_adds(root: &Path, start: &Path, min_depth: usize) -> Result<Vec<Change>> {
    let mut changes = Vec::new();
    let walker = WalkDir::new(start)
        .min_depth(min_depth)
        .follow_links(false)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry?;
        changes.push(Change::add(relativize(root, entry.path())?));
    }
    Ok(changes)
}

/// Packages the entire content of the layer mounted at `root`.
pub fn package_full(root: &Path, config: &DiffConfig) -> Result<ArchiveStream> {
    let changes = recursive_enumerate(root)?;
    package_changes(root, changes, config)
}

/// Packages exactly the entries named by `changes`, read from `root`.
pub fn package_changes(root: &Path, mut changes: Vec<Change>, config: &DiffConfig) -> Result<ArchiveStream> {
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    let root = root.to_path_buf();
    debug!(root = %root.display(), entries = changes.len(), "packaging layer archive");

    ArchiveStream::spawn(config, move |sink| write_changes(sink, &root, &changes).map(|_| ()))
        .map_err(DiffError::Archive)
}

/// Writes a tar archive of `changes` into `out` and returns the finished writer.
pub fn write_changes<W: Write>(out: W, root: &Path, changes: &[Change]) -> io::Result<W> {
    let mut builder = tar::Builder::new(out);
    builder.follow_symlinks(false);

    let mut links: HashMap<(u64, u64), PathBuf> = HashMap::new();
    let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);

    for change in changes {
        let name = match change.path.strip_prefix("/") {
            Ok(name) if !name.as_os_str().is_empty() => name,
            _ => continue,
        };
        match change.kind {
            ChangeKind::Delete => append_whiteout(&mut builder, name, now)?,
            ChangeKind::Add | ChangeKind::Modify => {
                append_entry(&mut builder, &root.join(name), name, &mut links)
                    .map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", change.path.display())))?
            }
        }
    }

    builder.into_inner()
}

/// Name of the whiteout entry recording the deletion of `name`.
pub fn whiteout_name(name: &Path) -> PathBuf {
    let mut base = OsString::from(WHITEOUT_PREFIX);
    base.push(name.file_name().unwrap_or(name.as_os_str()));
    match name.parent() {
        Some(parent) => parent.join(base),
        None => PathBuf::from(base),
    }
}

fn append_whiteout<W: Write>(builder: &mut tar::Builder<W>, name: &Path, mtime: u64) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(0);
    header.set_mode(0);
    header.set_mtime(mtime);
    builder.append_data(&mut header, whiteout_name(name), io::empty())
}

fn append_entry<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &Path,
    name: &Path,
    links: &mut HashMap<(u64, u64), PathBuf>,
) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;

    if meta.file_type().is_file() && meta.nlink() > 1 {
        let key = (meta.dev(), meta.ino());
        if let Some(target) = links.get(&key) {
            let mut header = Header::new_gnu();
            header.set_metadata_in_mode(&meta, HeaderMode::Complete);
            header.set_entry_type(EntryType::Link);
            header.set_size(0);
            return builder.append_link(&mut header, name, target);
        }
        links.insert(key, name.to_path_buf());
    }

    if let Some(capability) = read_capability(path)? {
        let key = format!("SCHILY.xattr.{CAPABILITY_XATTR}");
        builder.append_pax_extensions([(key.as_str(), capability.as_slice())])?;
    }

    builder.append_path_with_name(path, name)
}
