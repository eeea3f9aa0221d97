//! Name-serialized raster operations over any backend.

use tracing::{info, instrument};

use raster_core::{CellType, RasterDataset, RasterError, RasterResult};

use crate::backend::RasterBackend;
use crate::lock::NameLocks;

/// Coordinates raster reads and writes across backends.
///
/// Mutations acquire a per-name lock keyed by the backend's lock
/// scope, so two saves of the same raster never interleave while
/// writes to different names or different backends proceed freely.
/// Reads take no lock; every backend publishes atomically.
pub struct RasterService {
    locks: NameLocks,
}

impl RasterService {
    pub fn new() -> Self {
        Self {
            locks: NameLocks::new(),
        }
    }

    /// Load a raster with its stored index.
    pub async fn load(
        &self,
        backend: &dyn RasterBackend,
        name: &str,
    ) -> RasterResult<RasterDataset> {
        backend.read_dataset(name, None).await
    }

    /// Load a raster and clip it onto `mask`'s grid.
    ///
    /// Cells of the mask the source does not cover are filled with
    /// `default_value`. The result carries `out_type`.
    pub async fn load_masked(
        &self,
        backend: &dyn RasterBackend,
        name: &str,
        mask: &RasterDataset,
        default_value: f64,
        out_type: CellType,
    ) -> RasterResult<RasterDataset> {
        let source = self.load(backend, name).await?;
        source.masked_by(mask, default_value, out_type)
    }

    #[instrument(skip(self, backend, dataset), fields(name = %name))]
    pub async fn save(
        &self,
        backend: &dyn RasterBackend,
        name: &str,
        dataset: &RasterDataset,
    ) -> RasterResult<()> {
        let _guard = self.locks.acquire(&backend.lock_scope(), name).await;
        backend.write_dataset(name, dataset).await?;
        info!("Saved raster");
        Ok(())
    }

    /// Remove a raster. Removing an absent name is a no-op.
    #[instrument(skip(self, backend), fields(name = %name))]
    pub async fn delete(&self, backend: &dyn RasterBackend, name: &str) -> RasterResult<()> {
        let _guard = self.locks.acquire(&backend.lock_scope(), name).await;
        backend.remove(name).await?;
        info!("Deleted raster");
        Ok(())
    }

    /// Copy a raster between names, possibly across backends.
    #[instrument(skip(self, source, target), fields(from = %source_name, to = %target_name))]
    pub async fn copy(
        &self,
        source: &dyn RasterBackend,
        source_name: &str,
        target: &dyn RasterBackend,
        target_name: &str,
    ) -> RasterResult<()> {
        let dataset = source.read_dataset(source_name, None).await?;
        let _guard = self.locks.acquire(&target.lock_scope(), target_name).await;
        target.write_dataset(target_name, &dataset).await?;
        info!("Copied raster");
        Ok(())
    }

    /// Rename a raster within one backend, replacing any existing
    /// raster under the new name.
    #[instrument(skip(self, backend), fields(old = %old_name, new = %new_name))]
    pub async fn rename(
        &self,
        backend: &dyn RasterBackend,
        old_name: &str,
        new_name: &str,
    ) -> RasterResult<()> {
        let scope = backend.lock_scope();
        if old_name == new_name {
            let _guard = self.locks.acquire(&scope, old_name).await;
            return backend.rename(old_name, new_name).await;
        }

        // Both names are write targets. Locking in lexicographic order
        // keeps two opposing renames from deadlocking.
        let (first, second) = if old_name < new_name {
            (old_name, new_name)
        } else {
            (new_name, old_name)
        };
        let _first = self.locks.acquire(&scope, first).await;
        let _second = self.locks.acquire(&scope, second).await;
        backend.rename(old_name, new_name).await?;
        info!("Renamed raster");
        Ok(())
    }

    pub async fn exists(&self, backend: &dyn RasterBackend, name: &str) -> RasterResult<bool> {
        backend.exists(name).await
    }
}

impl Default for RasterService {
    fn default() -> Self {
        Self::new()
    }
}
