//! Integration test: service operations over file backends.
//!
//! Runs the façade end-to-end:
//! 1. Save and load through the service
//! 2. Copy a raster between two backend roots
//! 3. Rename and delete, including the idempotent and missing cases
//! 4. Load through a mask covering part of the source grid

use std::sync::Arc;

use raster_core::{CellType, PositionIndex, RasterDataset, RasterError, RasterHeader};
use raster_store::{FileBackend, FileBackendConfig, RasterService};
use test_utils::{assert_datasets_match, dense_dataset, pattern_dataset, pattern_value};

async fn temp_backend(dir: &tempfile::TempDir) -> FileBackend {
    FileBackend::new(FileBackendConfig {
        root_dir: dir.path().to_path_buf(),
    })
    .await
    .expect("Failed to create backend")
}

/// Dense 2x2 mask grid with the given origin, cell size 100.
fn mask_grid(x_origin: f64, y_origin: f64) -> RasterDataset {
    let header = RasterHeader::new(2, 2, 100.0, x_origin, y_origin);
    RasterDataset::filled(header, Arc::new(PositionIndex::dense(2, 2)), 1.0)
        .expect("Failed to build mask")
}

#[tokio::test]
async fn test_copy_between_backends_preserves_raster() {
    let dir_a = tempfile::tempdir().expect("Failed to create temp dir");
    let dir_b = tempfile::tempdir().expect("Failed to create temp dir");
    let backend_a = temp_backend(&dir_a).await;
    let backend_b = temp_backend(&dir_b).await;
    let service = RasterService::new();
    let dataset = pattern_dataset(2);

    service
        .save(&backend_a, "origin", &dataset)
        .await
        .expect("Failed to save");
    service
        .copy(&backend_a, "origin", &backend_b, "migrated")
        .await
        .expect("Failed to copy");

    assert!(service.exists(&backend_a, "origin").await.unwrap());
    assert!(service.exists(&backend_b, "migrated").await.unwrap());
    let migrated = service
        .load(&backend_b, "migrated")
        .await
        .expect("Failed to load copy");
    assert_datasets_match!(&migrated, &dataset, 0.0);
}

#[tokio::test]
async fn test_copy_missing_source_reports_not_found() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = temp_backend(&dir).await;
    let service = RasterService::new();

    let err = service
        .copy(&backend, "ghost", &backend, "anywhere")
        .await
        .unwrap_err();
    assert!(matches!(err, RasterError::NotFound(_)));
}

#[tokio::test]
async fn test_rename_moves_raster() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = temp_backend(&dir).await;
    let service = RasterService::new();
    let dataset = pattern_dataset(1);

    service
        .save(&backend, "before", &dataset)
        .await
        .expect("Failed to save");
    service
        .rename(&backend, "before", "after")
        .await
        .expect("Failed to rename");

    assert!(!service.exists(&backend, "before").await.unwrap());
    let renamed = service
        .load(&backend, "after")
        .await
        .expect("Failed to load renamed raster");
    assert_datasets_match!(&renamed, &dataset, 0.0);

    let err = service.rename(&backend, "before", "elsewhere").await.unwrap_err();
    assert!(matches!(err, RasterError::NotFound(_)));
}

#[tokio::test]
async fn test_rename_replaces_existing_target() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = temp_backend(&dir).await;
    let service = RasterService::new();
    let keep = pattern_dataset(2);
    let lose = pattern_dataset(1);

    service.save(&backend, "winner", &keep).await.unwrap();
    service.save(&backend, "loser", &lose).await.unwrap();
    service
        .rename(&backend, "winner", "loser")
        .await
        .expect("Failed to rename over existing raster");

    let result = service.load(&backend, "loser").await.unwrap();
    assert_datasets_match!(&result, &keep, 0.0);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = temp_backend(&dir).await;
    let service = RasterService::new();
    let dataset = pattern_dataset(1);

    service.save(&backend, "doomed", &dataset).await.unwrap();
    service
        .delete(&backend, "doomed")
        .await
        .expect("Failed to delete");
    assert!(!service.exists(&backend, "doomed").await.unwrap());
    service
        .delete(&backend, "doomed")
        .await
        .expect("Second delete should be a no-op");
}

#[tokio::test]
async fn test_load_missing_raster_reports_not_found() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = temp_backend(&dir).await;
    let service = RasterService::new();

    let err = service.load(&backend, "ghost").await.unwrap_err();
    assert!(matches!(err, RasterError::NotFound(_)));
}

#[tokio::test]
async fn test_load_masked_clips_to_mask_grid() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = temp_backend(&dir).await;
    let service = RasterService::new();

    // Source: dense 4x4, cell size 100, lower-left center (50, 50).
    let source = dense_dataset(4, 4, 1);
    service.save(&backend, "terrain", &source).await.unwrap();

    // Mask sits fully inside the source, offset one cell in.
    let mask = mask_grid(150.0, 150.0);
    let clipped = service
        .load_masked(&backend, "terrain", &mask, -1.0, CellType::Float64)
        .await
        .expect("Failed to load through mask");

    assert_eq!(clipped.header().rows, 2);
    assert_eq!(clipped.header().cols, 2);
    assert_eq!(clipped.value(0, 0, 0), pattern_value(0, 1, 1));
    assert_eq!(clipped.value(0, 0, 1), pattern_value(0, 1, 2));
    assert_eq!(clipped.value(0, 1, 0), pattern_value(0, 2, 1));
    assert_eq!(clipped.value(0, 1, 1), pattern_value(0, 2, 2));
}

#[tokio::test]
async fn test_load_masked_fills_uncovered_cells() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = temp_backend(&dir).await;
    let service = RasterService::new();

    let source = dense_dataset(4, 4, 1);
    service.save(&backend, "terrain", &source).await.unwrap();

    // Mask hangs off the source's top-right corner: only its
    // lower-left cell lands on the grid.
    let mask = mask_grid(350.0, 350.0);
    let clipped = service
        .load_masked(&backend, "terrain", &mask, -1.0, CellType::Float64)
        .await
        .expect("Failed to load through mask");

    assert_eq!(clipped.value(0, 0, 0), -1.0);
    assert_eq!(clipped.value(0, 0, 1), -1.0);
    assert_eq!(clipped.value(0, 1, 0), pattern_value(0, 0, 3));
    assert_eq!(clipped.value(0, 1, 1), -1.0);
}
