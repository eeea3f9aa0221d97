//! Filesystem-backed raster storage.
//!
//! Layout under the root directory:
//! - `<name>.rst`: magic, version, header document, then the payload
//! - `<name>.idx`: encoded position index, present only when masked
//!
//! Writes land in `.partial` temporaries and are published by rename,
//! so a crash mid-write never leaves a half-written raster visible
//! under its final name.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument};

use raster_core::{codec, PositionIndex, RasterDataset, RasterError, RasterHeader, RasterResult};

use crate::backend::{validate_name, RasterBackend};
use crate::config::FileBackendConfig;

/// Magic prefix of primary raster files.
const PRIMARY_MAGIC: &[u8; 4] = b"RSTB";
/// Current primary file format version.
const FORMAT_VERSION: u16 = 1;
/// Bytes before the header document: magic, version, header length.
const PREFIX_LEN: usize = 10;
/// Upper bound on a stored header document, rejecting nonsense lengths
/// before any allocation.
const MAX_HEADER_LEN: u32 = 1024 * 1024;

const PRIMARY_EXT: &str = "rst";
const SIDECAR_EXT: &str = "idx";

/// Raster store over a local directory.
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Open a backend rooted at the configured directory, creating it
    /// if missing.
    pub async fn new(config: FileBackendConfig) -> RasterResult<Self> {
        fs::create_dir_all(&config.root_dir)
            .await
            .map_err(write_error)?;
        Ok(Self {
            root: config.root_dir,
        })
    }

    fn primary_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, PRIMARY_EXT))
    }

    fn sidecar_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, SIDECAR_EXT))
    }

    /// Open the primary file and parse through the header document,
    /// leaving the file positioned at the payload trailer.
    async fn read_prefix(&self, name: &str) -> RasterResult<(RasterHeader, fs::File)> {
        let path = self.primary_path(name);
        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| read_error(name, e))?;

        let mut prefix = [0u8; PREFIX_LEN];
        file.read_exact(&mut prefix)
            .await
            .map_err(|e| truncation_error(name, e))?;
        let mut cursor = &prefix[..];
        let mut magic = [0u8; 4];
        cursor.copy_to_slice(&mut magic);
        if &magic != PRIMARY_MAGIC {
            return Err(RasterError::CorruptPayload(format!(
                "'{}' is not a raster file",
                name
            )));
        }
        let version = cursor.get_u16_le();
        if version != FORMAT_VERSION {
            return Err(RasterError::CorruptPayload(format!(
                "'{}' uses unsupported format version {}",
                name, version
            )));
        }
        let header_len = cursor.get_u32_le();
        if header_len > MAX_HEADER_LEN {
            return Err(RasterError::CorruptPayload(format!(
                "'{}' declares an implausible header length {}",
                name, header_len
            )));
        }

        let mut header_bytes = vec![0u8; header_len as usize];
        file.read_exact(&mut header_bytes)
            .await
            .map_err(|e| truncation_error(name, e))?;
        let header = RasterHeader::from_json(&header_bytes)?;
        Ok((header, file))
    }

    async fn read_payload(
        &self,
        name: &str,
        header: &RasterHeader,
        file: &mut fs::File,
    ) -> RasterResult<Vec<u8>> {
        let mut trailer = [0u8; 12];
        file.read_exact(&mut trailer)
            .await
            .map_err(|e| truncation_error(name, e))?;
        let mut cursor = &trailer[..];
        let payload_len = cursor.get_u64_le();
        let crc = cursor.get_u32_le();
        if payload_len != codec::payload_len(header) {
            return Err(RasterError::CorruptPayload(format!(
                "'{}' stores {} payload bytes, header declares {}",
                name,
                payload_len,
                codec::payload_len(header)
            )));
        }

        let mut payload = vec![0u8; payload_len as usize];
        file.read_exact(&mut payload)
            .await
            .map_err(|e| truncation_error(name, e))?;
        if codec::checksum(&payload) != crc {
            return Err(RasterError::CorruptPayload(format!(
                "'{}' payload fails its checksum",
                name
            )));
        }
        Ok(payload)
    }
}

#[async_trait]
impl RasterBackend for FileBackend {
    fn lock_scope(&self) -> String {
        format!("file:{}", self.root.display())
    }

    #[instrument(skip(self), fields(name = %name))]
    async fn exists(&self, name: &str) -> RasterResult<bool> {
        validate_name(name)?;
        match fs::metadata(self.primary_path(name)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RasterError::StorageError(e.to_string())),
        }
    }

    #[instrument(skip(self), fields(name = %name))]
    async fn read_header(&self, name: &str) -> RasterResult<RasterHeader> {
        validate_name(name)?;
        let (header, _) = self.read_prefix(name).await?;
        Ok(header)
    }

    #[instrument(skip(self, header), fields(name = %name))]
    async fn read_index(
        &self,
        name: &str,
        header: &RasterHeader,
    ) -> RasterResult<Arc<PositionIndex>> {
        validate_name(name)?;
        if header.is_dense() {
            return Ok(Arc::new(PositionIndex::dense(header.rows, header.cols)));
        }
        let bytes = match fs::read(self.sidecar_path(name)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RasterError::CorruptPayload(format!(
                    "masked raster '{}' has no index sidecar",
                    name
                )));
            }
            Err(e) => return Err(RasterError::StorageError(e.to_string())),
        };
        let index = codec::decode_index(header.rows, header.cols, &bytes)?;
        if index.valid_cell_count() != header.valid_cell_count {
            return Err(RasterError::CorruptPayload(format!(
                "'{}' sidecar indexes {} cells, header declares {}",
                name,
                index.valid_cell_count(),
                header.valid_cell_count
            )));
        }
        Ok(Arc::new(index))
    }

    #[instrument(skip(self, index), fields(name = %name))]
    async fn read_dataset(
        &self,
        name: &str,
        index: Option<Arc<PositionIndex>>,
    ) -> RasterResult<RasterDataset> {
        validate_name(name)?;
        let (header, mut file) = self.read_prefix(name).await?;
        let index = match index {
            Some(index) => index,
            None => self.read_index(name, &header).await?,
        };
        let payload = self.read_payload(name, &header, &mut file).await?;
        debug!(payload_len = payload.len(), "Read raster payload");
        codec::decode_payload(header, index, &payload)
    }

    #[instrument(skip(self, dataset), fields(name = %name))]
    async fn write_dataset(&self, name: &str, dataset: &RasterDataset) -> RasterResult<()> {
        validate_name(name)?;
        let header = dataset.header();
        let header_json = header.to_json()?;
        let payload = codec::encode_payload(dataset);

        let mut frame = BytesMut::with_capacity(PREFIX_LEN + header_json.len() + 12);
        frame.put_slice(PRIMARY_MAGIC);
        frame.put_u16_le(FORMAT_VERSION);
        frame.put_u32_le(header_json.len() as u32);
        frame.put_slice(&header_json);
        frame.put_u64_le(payload.len() as u64);
        frame.put_u32_le(codec::checksum(&payload));

        let primary = self.primary_path(name);
        let sidecar = self.sidecar_path(name);
        let primary_tmp = temp_path(&primary);

        debug!(
            payload_len = payload.len(),
            dense = header.is_dense(),
            "Writing raster"
        );
        let mut file = fs::File::create(&primary_tmp).await.map_err(write_error)?;
        file.write_all(&frame).await.map_err(write_error)?;
        file.write_all(&payload).await.map_err(write_error)?;
        file.flush().await.map_err(write_error)?;
        file.sync_all().await.map_err(write_error)?;
        drop(file);

        // The primary rename is the commit point, so a masked raster's
        // sidecar must be in place before it.
        if header.is_dense() {
            publish(&primary_tmp, &primary).await?;
            remove_if_present(&sidecar).await?;
        } else {
            let sidecar_tmp = temp_path(&sidecar);
            fs::write(&sidecar_tmp, codec::encode_index(dataset.index()))
                .await
                .map_err(write_error)?;
            publish(&sidecar_tmp, &sidecar).await?;
            publish(&primary_tmp, &primary).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(name = %name))]
    async fn remove(&self, name: &str) -> RasterResult<()> {
        validate_name(name)?;
        remove_if_present(&self.primary_path(name)).await?;
        remove_if_present(&self.sidecar_path(name)).await
    }

    #[instrument(skip(self), fields(old = %old_name, new = %new_name))]
    async fn rename(&self, old_name: &str, new_name: &str) -> RasterResult<()> {
        validate_name(old_name)?;
        validate_name(new_name)?;
        if !self.exists(old_name).await? {
            return Err(RasterError::NotFound(old_name.to_string()));
        }
        if old_name == new_name {
            return Ok(());
        }

        // Copy the sidecar rather than move it: the old raster stays
        // readable until the primary rename commits.
        let old_sidecar = self.sidecar_path(old_name);
        let new_sidecar = self.sidecar_path(new_name);
        let had_sidecar = match fs::copy(&old_sidecar, &new_sidecar).await {
            Ok(_) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(write_error(e)),
        };

        publish(&self.primary_path(old_name), &self.primary_path(new_name)).await?;
        if had_sidecar {
            remove_if_present(&old_sidecar).await?;
        } else {
            // A dense raster may be replacing a masked one.
            remove_if_present(&new_sidecar).await?;
        }
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".partial");
    PathBuf::from(os)
}

async fn publish(src: &Path, dst: &Path) -> RasterResult<()> {
    if fs::rename(src, dst).await.is_err() {
        // Fall back to copy + delete for cross-filesystem moves.
        fs::copy(src, dst).await.map_err(write_error)?;
        fs::remove_file(src).await.map_err(write_error)?;
    }
    Ok(())
}

async fn remove_if_present(path: &Path) -> RasterResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(write_error(e)),
    }
}

fn read_error(name: &str, err: std::io::Error) -> RasterError {
    if err.kind() == std::io::ErrorKind::NotFound {
        RasterError::NotFound(name.to_string())
    } else {
        RasterError::StorageError(format!("failed to open '{}': {}", name, err))
    }
}

fn truncation_error(name: &str, err: std::io::Error) -> RasterError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        RasterError::CorruptPayload(format!("'{}' is truncated", name))
    } else {
        RasterError::StorageError(err.to_string())
    }
}

fn write_error(err: std::io::Error) -> RasterError {
    if err.kind() == std::io::ErrorKind::PermissionDenied {
        RasterError::WriteDenied(err.to_string())
    } else {
        RasterError::StorageError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use test_utils::{assert_datasets_match, fixtures};

    async fn backend_in(dir: &Path) -> FileBackend {
        FileBackend::new(FileBackendConfig {
            root_dir: dir.to_path_buf(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_sparse_multi_layer() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        let dataset = fixtures::pattern_dataset(2);

        backend.write_dataset("dem", &dataset).await.unwrap();
        let loaded = backend.read_dataset("dem", None).await.unwrap();
        assert_datasets_match!(dataset, loaded, 0.0);
    }

    #[tokio::test]
    async fn test_round_trip_dense_has_no_sidecar() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        let dataset = fixtures::dense_dataset(3, 4, 1);

        backend.write_dataset("dem", &dataset).await.unwrap();
        assert!(dir.path().join("dem.rst").exists());
        assert!(!dir.path().join("dem.idx").exists());

        let loaded = backend.read_dataset("dem", None).await.unwrap();
        assert!(loaded.index().is_dense());
        assert_datasets_match!(dataset, loaded, 0.0);
    }

    #[tokio::test]
    async fn test_masked_raster_writes_sidecar() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        backend
            .write_dataset("basin", &fixtures::pattern_dataset(1))
            .await
            .unwrap();
        assert!(dir.path().join("basin.idx").exists());
    }

    #[tokio::test]
    async fn test_overwrite_masked_with_dense_clears_sidecar() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        backend
            .write_dataset("dem", &fixtures::pattern_dataset(1))
            .await
            .unwrap();
        assert!(dir.path().join("dem.idx").exists());

        backend
            .write_dataset("dem", &fixtures::dense_dataset(4, 4, 1))
            .await
            .unwrap();
        assert!(!dir.path().join("dem.idx").exists());
        let loaded = backend.read_dataset("dem", None).await.unwrap();
        assert!(loaded.header().is_dense());
    }

    #[tokio::test]
    async fn test_int16_round_trip_is_exact() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        let dataset = fixtures::int16_dataset();
        backend.write_dataset("landuse", &dataset).await.unwrap();
        let loaded = backend.read_dataset("landuse", None).await.unwrap();
        assert_datasets_match!(dataset, loaded, 0.0);
    }

    #[tokio::test]
    async fn test_missing_raster_is_not_found() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        assert!(!backend.exists("ghost").await.unwrap());
        assert!(matches!(
            backend.read_header("ghost").await,
            Err(RasterError::NotFound(_))
        ));
        assert!(matches!(
            backend.read_dataset("ghost", None).await,
            Err(RasterError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        backend
            .write_dataset("dem", &fixtures::pattern_dataset(1))
            .await
            .unwrap();
        assert!(backend.exists("dem").await.unwrap());

        backend.remove("dem").await.unwrap();
        assert!(!backend.exists("dem").await.unwrap());
        assert!(!dir.path().join("dem.idx").exists());
        backend.remove("dem").await.unwrap();
    }

    #[tokio::test]
    async fn test_double_write_reads_like_single_write() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        let dataset = fixtures::pattern_dataset(1);
        backend.write_dataset("dem", &dataset).await.unwrap();
        backend.write_dataset("dem", &dataset).await.unwrap();
        let loaded = backend.read_dataset("dem", None).await.unwrap();
        assert_datasets_match!(dataset, loaded, 0.0);
    }

    #[tokio::test]
    async fn test_truncated_primary_is_corrupt() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        backend
            .write_dataset("dem", &fixtures::pattern_dataset(1))
            .await
            .unwrap();

        let path = dir.path().join("dem.rst");
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        assert!(matches!(
            backend.read_dataset("dem", None).await,
            Err(RasterError::CorruptPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_flipped_payload_byte_fails_checksum() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        backend
            .write_dataset("dem", &fixtures::pattern_dataset(1))
            .await
            .unwrap();

        let path = dir.path().join("dem.rst");
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            backend.read_dataset("dem", None).await,
            Err(RasterError::CorruptPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_magic_is_corrupt() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        std::fs::write(dir.path().join("dem.rst"), b"GARBAGE FILE CONTENT").unwrap();
        assert!(matches!(
            backend.read_header("dem").await,
            Err(RasterError::CorruptPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_masked_raster_without_sidecar_is_corrupt() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        backend
            .write_dataset("basin", &fixtures::pattern_dataset(1))
            .await
            .unwrap();
        std::fs::remove_file(dir.path().join("basin.idx")).unwrap();

        assert!(matches!(
            backend.read_dataset("basin", None).await,
            Err(RasterError::CorruptPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_read_with_shared_index() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        let dataset = fixtures::pattern_dataset(1);
        backend.write_dataset("dem", &dataset).await.unwrap();

        let shared = fixtures::sparse_index_4x4();
        let loaded = backend
            .read_dataset("dem", Some(Arc::clone(&shared)))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(loaded.index(), &shared));

        // An index that disagrees with the stored header is rejected.
        let wrong = Arc::new(PositionIndex::dense(4, 4));
        assert!(matches!(
            backend.read_dataset("dem", Some(wrong)).await,
            Err(RasterError::ShapeMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_rename_carries_sidecar() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        let dataset = fixtures::pattern_dataset(1);
        backend.write_dataset("old", &dataset).await.unwrap();

        backend.rename("old", "new").await.unwrap();
        assert!(!backend.exists("old").await.unwrap());
        assert!(!dir.path().join("old.idx").exists());
        let loaded = backend.read_dataset("new", None).await.unwrap();
        assert_datasets_match!(dataset, loaded, 0.0);
    }

    #[tokio::test]
    async fn test_rename_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        assert!(matches!(
            backend.rename("ghost", "dem").await,
            Err(RasterError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rename_to_same_name_is_noop() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        let dataset = fixtures::pattern_dataset(1);
        backend.write_dataset("dem", &dataset).await.unwrap();
        backend.rename("dem", "dem").await.unwrap();
        let loaded = backend.read_dataset("dem", None).await.unwrap();
        assert_datasets_match!(dataset, loaded, 0.0);
    }

    #[tokio::test]
    async fn test_bad_names_are_rejected() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        let dataset = fixtures::pattern_dataset(1);
        assert!(matches!(
            backend.write_dataset("../dem", &dataset).await,
            Err(RasterError::InvalidName(_))
        ));
        assert!(matches!(
            backend.read_dataset("a/b", None).await,
            Err(RasterError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_no_partial_files_survive_write() {
        let dir = tempdir().unwrap();
        let backend = backend_in(dir.path()).await;
        backend
            .write_dataset("dem", &fixtures::pattern_dataset(1))
            .await
            .unwrap();
        let mut entries = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect::<Vec<_>>();
        entries.sort();
        assert_eq!(entries, vec!["dem.idx", "dem.rst"]);
    }
}
