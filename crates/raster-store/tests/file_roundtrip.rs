//! Integration test: write masked rasters through the file backend and
//! read them back.
//!
//! Exercises the storage contract end-to-end through the public
//! interface only:
//! 1. Build a 4x4 raster with 10 of 16 cells valid
//! 2. Write it via the backend trait
//! 3. Read it back and verify every value in ordinal order
//! 4. Check mask semantics survive the round trip

use std::sync::Arc;

use raster_core::{PositionIndex, RasterDataset, RasterError, RasterHeader, DEFAULT_NODATA};
use raster_store::{FileBackend, FileBackendConfig, RasterBackend};
use test_utils::{
    assert_datasets_match, dense_dataset, int16_dataset, pattern_dataset, SPARSE_4X4_MASK,
};

async fn temp_backend(dir: &tempfile::TempDir) -> FileBackend {
    FileBackend::new(FileBackendConfig {
        root_dir: dir.path().to_path_buf(),
    })
    .await
    .expect("Failed to create backend")
}

/// 4x4 grid, 10 valid cells, one layer of known values.
fn ten_cell_dataset() -> (RasterDataset, Vec<f64>) {
    let index = PositionIndex::from_mask(4, 4, &SPARSE_4X4_MASK).expect("Failed to build index");
    let mut header = RasterHeader::new(4, 4, 100.0, 50.0, 50.0);
    header.valid_cell_count = index.valid_cell_count();
    assert_eq!(header.valid_cell_count, 10);

    let values: Vec<f64> = (0..10).map(|i| i as f64 * 2.5 - 3.0).collect();
    let dataset = RasterDataset::from_layers(header, Arc::new(index), vec![values.clone()])
        .expect("Failed to build dataset");
    (dataset, values)
}

#[tokio::test]
async fn test_ten_of_sixteen_cells_roundtrip() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = temp_backend(&dir).await;
    let (dataset, values) = ten_cell_dataset();

    backend
        .write_dataset("sparse4", &dataset)
        .await
        .expect("Failed to write");
    let loaded = backend
        .read_dataset("sparse4", None)
        .await
        .expect("Failed to read");

    assert_eq!(loaded.header().valid_cell_count, 10);
    let layer = loaded.layer(0).expect("Layer 0 should exist");
    assert_eq!(layer.len(), 10);
    for (ordinal, expected) in values.iter().enumerate() {
        assert!(
            (layer[ordinal] - expected).abs() < 1e-9,
            "Mismatch at ordinal {}: expected {}, got {}",
            ordinal,
            expected,
            layer[ordinal]
        );
    }
}

#[tokio::test]
async fn test_reloaded_raster_keeps_mask_semantics() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = temp_backend(&dir).await;
    let (dataset, _) = ten_cell_dataset();

    backend
        .write_dataset("sparse4", &dataset)
        .await
        .expect("Failed to write");
    let mut loaded = backend
        .read_dataset("sparse4", None)
        .await
        .expect("Failed to read");

    // (0, 2) is excluded by the mask: reads yield the no-data value,
    // writes are rejected.
    assert_eq!(loaded.value(0, 0, 2), DEFAULT_NODATA);
    let err = loaded.set_value(0, 0, 2, 1.0).unwrap_err();
    assert!(matches!(err, RasterError::OutOfMask { row: 0, col: 2 }));

    // (0, 0) is valid and stays writable.
    loaded
        .set_value(0, 0, 0, 42.0)
        .expect("Valid cell should accept a write");
    assert_eq!(loaded.value(0, 0, 0), 42.0);
}

#[tokio::test]
async fn test_integer_values_roundtrip_exactly() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = temp_backend(&dir).await;
    let dataset = int16_dataset();

    backend
        .write_dataset("int16", &dataset)
        .await
        .expect("Failed to write");
    let loaded = backend
        .read_dataset("int16", None)
        .await
        .expect("Failed to read");

    assert_datasets_match!(&loaded, &dataset, 0.0);
}

#[tokio::test]
async fn test_multilayer_roundtrip() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = temp_backend(&dir).await;
    let dataset = pattern_dataset(3);

    backend
        .write_dataset("layers", &dataset)
        .await
        .expect("Failed to write");
    let loaded = backend
        .read_dataset("layers", None)
        .await
        .expect("Failed to read");

    assert_eq!(loaded.header().layer_count, 3);
    assert_datasets_match!(&loaded, &dataset, 0.0);
}

#[tokio::test]
async fn test_dense_roundtrip() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = temp_backend(&dir).await;
    let dataset = dense_dataset(3, 5, 2);

    backend
        .write_dataset("dense", &dataset)
        .await
        .expect("Failed to write");
    let loaded = backend
        .read_dataset("dense", None)
        .await
        .expect("Failed to read");

    assert!(loaded.index().is_dense());
    assert_datasets_match!(&loaded, &dataset, 0.0);
}

#[tokio::test]
async fn test_overwrite_is_observably_single_write() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = temp_backend(&dir).await;
    let (dataset, _) = ten_cell_dataset();

    backend
        .write_dataset("twice", &dataset)
        .await
        .expect("Failed to write");
    backend
        .write_dataset("twice", &dataset)
        .await
        .expect("Failed to overwrite");

    let loaded = backend
        .read_dataset("twice", None)
        .await
        .expect("Failed to read");
    assert_datasets_match!(&loaded, &dataset, 0.0);
}
