//! # Layer Diff Façade
//!
//! The two operations a storage driver calls: produce the change list of a
//! layer against its parent, and produce that change list packaged as a layer
//! archive. Mounted layers are released on every exit path.

use crate::archive::{package_changes, package_full, recursive_enumerate, ArchiveStream};
use crate::builder::build_change_list;
use crate::common::Change;
use crate::config::DiffConfig;
use crate::error::Result;
use crate::native::NativeDiff;
use crate::storage::StorageBackend;

use scopeguard::{guard, ScopeGuard};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Computes layer diffs on top of a storage backend and a native diff facility.
pub struct LayerDiffer<B, D> {
    backend: Arc<B>,
    native: D,
    config: DiffConfig,
}

impl<B, D> LayerDiffer<B, D>
where
    B: StorageBackend + 'static,
    D: NativeDiff,
{
    pub fn new(backend: Arc<B>, native: D, config: DiffConfig) -> Self {
        Self { backend, native, config }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// Returns the changes of `layer` relative to `parent`.
    ///
    /// An empty `parent` yields every entry of the layer as an `Add`.
    #[instrument(skip(self))]
    pub fn changes(&self, layer: &str, parent: &str) -> Result<Vec<Change>> {
        let layer_root = self.backend.acquire(layer)?;
        let _layer = guard((), |_| self.backend.release(layer));

        if parent.is_empty() {
            return recursive_enumerate(&layer_root);
        }
        self.changes_against(layer, &layer_root, parent)
    }

    fn changes_against(&self, layer: &str, layer_root: &Path, parent: &str) -> Result<Vec<Change>> {
        let parent_root = self.backend.acquire(parent)?;
        let _parent = guard((), |_| self.backend.release(parent));

        let reference = self.backend.origin(layer, parent)?;
        build_change_list(&self.native, layer_root, &parent_root, &reference)
    }

    /// Returns a lazily read archive of `layer`'s changes against `parent`.
    ///
    /// One acquisition of the layer covers both the change list and the stream;
    /// it is released when the returned stream is closed or dropped.
    #[instrument(skip(self))]
    pub fn diff(&self, layer: &str, parent: &str) -> Result<ArchiveStream> {
        let layer_root = self.backend.acquire(layer)?;
        let held = guard((), |_| self.backend.release(layer));

        let stream = if parent.is_empty() {
            package_full(&layer_root, &self.config)?
        } else {
            let changes = self.changes_against(layer, &layer_root, parent)?;
            package_changes(&layer_root, changes, &self.config)?
        };

        // The stream owns the acquisition from here on.
        ScopeGuard::into_inner(held);
        let backend = Arc::clone(&self.backend);
        let id = layer.to_string();
        Ok(stream.on_close(move || {
            debug!(layer = %id, "archive stream closed");
            backend.release(&id);
        }))
    }
}
