mod common;

use common::{change, diff_output, scenario_events, scenario_store, sorted};
use layerdiff::{
    ChangeKind::*, DiffConfig, DiffError, DiffReference, DirBackend, LayerDiffer, RecordedDiff, StorageBackend,
};
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

fn differ(store: &std::path::Path, events: String) -> LayerDiffer<DirBackend, RecordedDiff> {
    LayerDiffer::new(
        Arc::new(DirBackend::new(store)),
        RecordedDiff::new(events),
        DiffConfig { chunk_size: 512, max_inflight: 2, ..DiffConfig::default() },
    )
}

/// Reads a tar stream into `name -> (entry type, link target)`.
fn tar_entries(data: &[u8]) -> HashMap<PathBuf, (tar::EntryType, Option<PathBuf>)> {
    let mut archive = tar::Archive::new(data);
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            let path = entry.path().unwrap().into_owned();
            let link = entry.link_name().unwrap().map(|l| l.into_owned());
            (path, (entry.header().entry_type(), link))
        })
        .collect()
}

#[test]
fn changes_releases_both_layers() {
    let store = scenario_store();
    let layer = store.path().join("layer");
    let differ = differ(store.path(), scenario_events(&layer));

    let changes = differ.changes("layer", "parent").unwrap();

    assert_eq!(
        sorted(changes),
        vec![
            change(Modify, "/b"),
            change(Add, "/c"),
            change(Delete, "/d"),
            change(Modify, "/dir"),
            change(Modify, "/dir/e"),
        ]
    );
    assert_eq!(differ.backend().active_total(), 0);
}

#[test]
fn no_parent_reports_every_entry_as_added() {
    let store = scenario_store();
    let differ = differ(store.path(), String::new());

    let changes = differ.changes("layer", "").unwrap();

    assert_eq!(
        changes,
        vec![
            change(Add, "/a"),
            change(Add, "/b"),
            change(Add, "/c"),
            change(Add, "/dir"),
            change(Add, "/dir/e"),
        ]
    );
    assert_eq!(differ.backend().active_total(), 0);
}

#[test]
fn failures_still_release_layers() {
    let store = scenario_store();
    let layer = store.path().join("layer");

    // Missing parent layer.
    let d = differ(store.path(), scenario_events(&layer));
    assert!(matches!(d.changes("layer", "missing"), Err(DiffError::Backend { .. })));
    assert_eq!(d.backend().active_total(), 0);

    // Unparseable diff output.
    let d = differ(store.path(), "?\tF\tnonsense\n".to_string());
    assert!(matches!(d.changes("layer", "parent"), Err(DiffError::DiffFacility(_))));
    assert_eq!(d.backend().active_total(), 0);

    // Same failure through the archive path.
    assert!(d.diff("layer", "parent").is_err());
    assert_eq!(d.backend().active_total(), 0);
}

#[test]
fn diff_archive_holds_changes_and_whiteouts() {
    let store = scenario_store();
    let layer = store.path().join("layer");
    let differ = differ(store.path(), scenario_events(&layer));

    let mut stream = differ.diff("layer", "parent").unwrap();
    assert_eq!(differ.backend().active("layer"), 1);
    assert_eq!(differ.backend().active("parent"), 0);

    let mut data = Vec::new();
    stream.read_to_end(&mut data).unwrap();
    stream.close();
    assert_eq!(differ.backend().active_total(), 0);

    let entries = tar_entries(&data);
    let mut names: Vec<_> = entries.keys().cloned().collect();
    names.sort();
    let mut expected: Vec<_> = ["b", "c", ".wh.d", "dir", "dir/e"].iter().map(PathBuf::from).collect();
    expected.sort();
    assert_eq!(names, expected);

    assert_eq!(entries[&PathBuf::from(".wh.d")].0, tar::EntryType::Regular);
    assert_eq!(entries[&PathBuf::from("dir")].0, tar::EntryType::Directory);
    // `dir/e` shares an inode with `b`, which sorts first.
    assert_eq!(
        entries[&PathBuf::from("dir/e")],
        (tar::EntryType::Link, Some(PathBuf::from("b")))
    );
}

#[test]
fn full_archive_without_parent() {
    let store = scenario_store();
    let differ = differ(store.path(), String::new());

    let mut stream = differ.diff("layer", "").unwrap();
    let mut data = Vec::new();
    stream.read_to_end(&mut data).unwrap();
    drop(stream);
    assert_eq!(differ.backend().active_total(), 0);

    let entries = tar_entries(&data);
    for name in ["a", "b", "c", "dir", "dir/e"] {
        assert!(entries.contains_key(&PathBuf::from(name)), "missing {name}");
    }
    assert!(!entries.keys().any(|k| k.to_string_lossy().contains(".wh.")));
}

#[test]
fn abandoned_stream_releases_layer_once() {
    let store = scenario_store();
    let layer = store.path().join("layer");
    let differ = differ(store.path(), scenario_events(&layer));

    let mut stream = differ.diff("layer", "parent").unwrap();
    let mut first = [0u8; 16];
    stream.read_exact(&mut first).unwrap();
    stream.close();
    stream.close();
    drop(stream);

    assert_eq!(differ.backend().active_total(), 0);
}

#[test]
fn vanished_entry_fails_the_read_and_releases() {
    let store = scenario_store();
    let layer = store.path().join("layer");
    // Claims a file that is not in the layer.
    let differ = differ(store.path(), diff_output(&layer, &[("+", "F", "ghost")]));

    let mut stream = differ.diff("layer", "parent").unwrap();
    let mut data = Vec::new();
    assert!(stream.read_to_end(&mut data).is_err());
    drop(stream);

    assert_eq!(differ.backend().active_total(), 0);
}

/// Records every acquire so tests can count mount cycles.
#[derive(Debug)]
struct CountingBackend {
    inner: DirBackend,
    acquired: Mutex<Vec<String>>,
}

impl CountingBackend {
    fn acquisitions(&self, id: &str) -> usize {
        self.acquired.lock().unwrap().iter().filter(|a| *a == id).count()
    }
}

impl StorageBackend for CountingBackend {
    fn acquire(&self, id: &str) -> layerdiff::Result<PathBuf> {
        self.acquired.lock().unwrap().push(id.to_string());
        self.inner.acquire(id)
    }

    fn release(&self, id: &str) {
        self.inner.release(id)
    }

    fn origin(&self, layer: &str, parent: &str) -> layerdiff::Result<DiffReference> {
        self.inner.origin(layer, parent)
    }
}

#[test]
fn diff_acquires_each_layer_once() {
    let store = scenario_store();
    let layer = store.path().join("layer");
    let backend = Arc::new(CountingBackend {
        inner: DirBackend::new(store.path()),
        acquired: Mutex::new(Vec::new()),
    });
    let differ = LayerDiffer::new(Arc::clone(&backend), RecordedDiff::new(scenario_events(&layer)), DiffConfig::default());

    let mut stream = differ.diff("layer", "parent").unwrap();
    assert_eq!(backend.inner.active("layer"), 1);
    assert_eq!(backend.inner.active("parent"), 0);

    let mut data = Vec::new();
    stream.read_to_end(&mut data).unwrap();
    drop(stream);

    assert_eq!(backend.acquisitions("layer"), 1);
    assert_eq!(backend.acquisitions("parent"), 1);
    assert_eq!(backend.inner.active_total(), 0);
}
