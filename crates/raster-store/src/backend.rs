//! Storage backend contract shared by the file and database backends.

use std::sync::Arc;

use async_trait::async_trait;

use raster_core::{PositionIndex, RasterDataset, RasterError, RasterHeader, RasterResult};

/// Capability contract of one raster store.
///
/// Both backends speak the same payload and index encodings, so a
/// raster written through one can be read back through the other with
/// identical values. Writes replace any raster already stored under
/// the name; partially written state is never visible under a final
/// name.
#[async_trait]
pub trait RasterBackend: Send + Sync {
    /// Stable identity of this backend instance. Write locks are
    /// scoped to it, so two backends never contend for one name.
    fn lock_scope(&self) -> String;

    /// Whether a raster is stored under `name`.
    async fn exists(&self, name: &str) -> RasterResult<bool>;

    /// Read and validate the header stored under `name`.
    async fn read_header(&self, name: &str) -> RasterResult<RasterHeader>;

    /// Read the position index stored with `name`. Dense rasters store
    /// no index; the identity scan is synthesized from the header.
    async fn read_index(
        &self,
        name: &str,
        header: &RasterHeader,
    ) -> RasterResult<Arc<PositionIndex>>;

    /// Materialize the dataset stored under `name`.
    ///
    /// Pass an index to share one mask across datasets; it must match
    /// the stored header. `None` reads or synthesizes the stored index.
    async fn read_dataset(
        &self,
        name: &str,
        index: Option<Arc<PositionIndex>>,
    ) -> RasterResult<RasterDataset>;

    /// Persist `dataset` under `name`, replacing any existing raster.
    async fn write_dataset(&self, name: &str, dataset: &RasterDataset) -> RasterResult<()>;

    /// Delete `name`. Removing an absent raster is a no-op, so
    /// deletion stays idempotent.
    async fn remove(&self, name: &str) -> RasterResult<()>;

    /// Move a raster to a new name. Backends with a native rename
    /// override this; the default rewrites the payload and deletes the
    /// old name.
    async fn rename(&self, old_name: &str, new_name: &str) -> RasterResult<()> {
        let dataset = self.read_dataset(old_name, None).await?;
        self.write_dataset(new_name, &dataset).await?;
        if old_name != new_name {
            self.remove(old_name).await?;
        }
        Ok(())
    }
}

/// Reject names that would escape the backend's namespace or collide
/// with its file suffixes.
pub(crate) fn validate_name(name: &str) -> RasterResult<()> {
    if name.is_empty() {
        return Err(RasterError::InvalidName("name is empty".to_string()));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(RasterError::InvalidName(format!(
            "'{}' must not contain path separators",
            name
        )));
    }
    Ok(())
}
