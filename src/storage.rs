//! Storage backend seam: acquisition and release of mounted layers.

use crate::error::{DiffError, Result};
use crate::native::DiffReference;

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Provides mounted layer roots to the diff engine.
///
/// Every successful `acquire` is paired with exactly one `release`.
pub trait StorageBackend: Send + Sync {
    /// Mounts (or pins) layer `id` and returns its root path.
    fn acquire(&self, id: &str) -> Result<PathBuf>;

    /// Drops one reference taken by `acquire`.
    fn release(&self, id: &str);

    /// Reference the native diff facility needs to diff `layer` against `parent`.
    fn origin(&self, layer: &str, parent: &str) -> Result<DiffReference>;
}

/// Layers stored as plain directories `<root>/<id>`.
///
/// Acquisitions are reference counted so tests and callers can check that every
/// acquire was released.
#[derive(Debug)]
pub struct DirBackend {
    root: PathBuf,
    dataset: Option<String>,
    active: Mutex<HashMap<String, usize>>,
}

impl DirBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), dataset: None, active: Mutex::new(HashMap::new()) }
    }

    /// Sets the dataset prefix used when naming origin snapshots.
    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of outstanding acquisitions of `id`.
    pub fn active(&self, id: &str) -> usize {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).get(id).copied().unwrap_or(0)
    }

    /// Total outstanding acquisitions across all layers.
    pub fn active_total(&self) -> usize {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).values().sum()
    }

    fn layer_path(&self, id: &str) -> Result<PathBuf> {
        let mut components = Path::new(id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(id)),
            _ => Err(DiffError::Backend { layer: id.to_string(), reason: "invalid layer id".into() }),
        }
    }
}

impl StorageBackend for DirBackend {
    fn acquire(&self, id: &str) -> Result<PathBuf> {
        let path = self.layer_path(id)?;
        if !path.is_dir() {
            return Err(DiffError::Backend {
                layer: id.to_string(),
                reason: format!("no layer directory at '{}'", path.display()),
            });
        }

        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let count = active.entry(id.to_string()).or_insert(0);
        *count += 1;
        debug!(layer = id, refs = *count, "acquired layer");
        Ok(path)
    }

    fn release(&self, id: &str) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let remaining = match active.get_mut(id) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => {
                warn!(layer = id, "release without matching acquire");
                return;
            }
        };
        if remaining == 0 {
            active.remove(id);
        }
        debug!(layer = id, refs = remaining, "released layer");
    }

    fn origin(&self, layer: &str, parent: &str) -> Result<DiffReference> {
        Ok(match &self.dataset {
            Some(dataset) => DiffReference::new(format!("{dataset}/{parent}@{layer}"))
                .with_target(format!("{dataset}/{layer}")),
            None => DiffReference::new(format!("{parent}@{layer}")),
        })
    }
}
