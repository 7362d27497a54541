//! # Metadata Snapshot Collector
//!
//! Gathers a flat record of entry metadata for the immediate children of one
//! directory. The walk stops at every subdirectory boundary: sibling changes the
//! snapshot-diff facility cannot see (hard-link retargets inside an otherwise
//! unchanged directory) are recovered from this one level alone.

use crate::common::EntryMetadata;
use crate::error::{DiffError, Result};

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use walkdir::WalkDir;

/// Name of the extended attribute compared alongside regular metadata.
pub const CAPABILITY_XATTR: &str = "security.capability";

/// Metadata of every immediate child of one directory, keyed by raw entry name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataSnapshot {
    pub entries: HashMap<OsString, EntryMetadata>,
}

impl MetadataSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: impl AsRef<OsStr>) -> Option<&EntryMetadata> {
        self.entries.get(name.as_ref())
    }

    pub fn insert(&mut self, name: impl Into<OsString>, meta: EntryMetadata) {
        self.entries.insert(name.into(), meta);
    }
}

/// Collects metadata for the immediate children of `dir`.
///
/// Subdirectories are recorded but never descended into.
pub fn collect_dir_metadata(dir: &Path) -> Result<MetadataSnapshot> {
    let mut snapshot = MetadataSnapshot::default();

    let walker = WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false);
    for entry in walker {
        let entry = entry?;
        let name = entry.file_name().to_os_string();
        let meta = entry.metadata().map_err(DiffError::from)?;
        let capability = read_capability(entry.path()).map_err(|e| DiffError::io(e, entry.path()))?;
        snapshot.insert(name, entry_metadata(&meta, capability));
    }

    Ok(snapshot)
}

fn entry_metadata(meta: &Metadata, capability: Option<Vec<u8>>) -> EntryMetadata {
    EntryMetadata {
        mode: meta.mode(),
        uid: meta.uid(),
        gid: meta.gid(),
        rdev: meta.rdev(),
        mtime_sec: meta.mtime(),
        mtime_nsec: meta.mtime_nsec(),
        size: meta.size(),
        capability,
    }
}

/// Reads the `security.capability` attribute of `path` without following symlinks.
///
/// Missing attributes and filesystems without xattr support both yield `None`.
#[cfg(target_os = "linux")]
pub fn read_capability(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let c_name = c"security.capability";

    let mut buf = vec![0u8; 128];
    loop {
        // SAFETY: both strings are NUL-terminated and `buf` is valid for `buf.len()` bytes.
        let n = unsafe {
            libc::lgetxattr(
                c_path.as_ptr(),
                c_name.as_ptr(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if n >= 0 {
            buf.truncate(n as usize);
            return Ok(Some(buf));
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ENODATA) | Some(libc::ENOTSUP) => return Ok(None),
            Some(libc::ERANGE) => {
                let len = buf.len() * 2;
                buf.resize(len, 0);
            }
            _ => return Err(err),
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn read_capability(_path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    Ok(None)
}
