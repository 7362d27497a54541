#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

use layerdiff::{Change, ChangeKind};

/// A layer store with a `parent` and a `layer` directory.
///
/// parent: a, b ("old"), d, dir/e ("one")
/// layer:  a, b ("new content"), c, dir/e (hard link to b)
pub fn scenario_store() -> TempDir {
    let store = tempdir().unwrap();
    let parent = store.path().join("parent");
    let layer = store.path().join("layer");

    fs::create_dir_all(parent.join("dir")).unwrap();
    fs::write(parent.join("a"), b"same").unwrap();
    fs::write(parent.join("b"), b"old").unwrap();
    fs::write(parent.join("d"), b"doomed").unwrap();
    fs::write(parent.join("dir/e"), b"one").unwrap();

    fs::create_dir_all(layer.join("dir")).unwrap();
    fs::write(layer.join("a"), b"same").unwrap();
    fs::write(layer.join("b"), b"new content").unwrap();
    fs::write(layer.join("c"), b"fresh").unwrap();
    fs::hard_link(layer.join("b"), layer.join("dir/e")).unwrap();

    store
}

/// What `zfs diff` reports for [`scenario_store`]: nothing for `/dir/e`.
pub fn scenario_events(layer_root: &Path) -> String {
    diff_output(
        layer_root,
        &[("M", "F", "b"), ("+", "F", "c"), ("-", "F", "d"), ("M", "/", "dir")],
    )
}

/// Renders `zfs diff -F -H` lines for paths relative to `layer_root`.
pub fn diff_output(layer_root: &Path, lines: &[(&str, &str, &str)]) -> String {
    lines
        .iter()
        .map(|(change, kind, rel)| format!("{change}\t{kind}\t{}\n", layer_root.join(rel).display()))
        .collect()
}

pub fn sorted(mut changes: Vec<Change>) -> Vec<Change> {
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    changes
}

pub fn change(kind: ChangeKind, path: &str) -> Change {
    Change::new(PathBuf::from(path), kind)
}
