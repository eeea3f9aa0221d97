//! Common test fixtures for raster-engine tests.
//!
//! This module provides pre-defined grids and datasets representing the
//! storage scenarios the backends must handle.

use std::sync::Arc;

use raster_core::{CellType, PositionIndex, RasterDataset, RasterHeader};

/// 4x4 validity mask with 10 valid cells (`-` is masked):
///   V V - V
///   - V V -
///   V - V V
///   - V - V
pub const SPARSE_4X4_MASK: [bool; 16] = [
    true, true, false, true, //
    false, true, true, false, //
    true, false, true, true, //
    false, true, false, true,
];

/// The six masked cells of [`SPARSE_4X4_MASK`].
pub const SPARSE_4X4_MASKED: [(u32, u32); 6] = [(0, 2), (1, 0), (1, 3), (2, 1), (3, 0), (3, 2)];

/// Header for a demo grid: square 100-unit cells, lower-left cell
/// centered at (50, 50).
pub fn demo_header(rows: u32, cols: u32) -> RasterHeader {
    RasterHeader::new(rows, cols, 100.0, 50.0, 50.0)
}

/// Position index over [`SPARSE_4X4_MASK`].
pub fn sparse_index_4x4() -> Arc<PositionIndex> {
    Arc::new(PositionIndex::from_mask(4, 4, &SPARSE_4X4_MASK).unwrap())
}

/// Predictable cell value: recoverable layer, row, and col by eye.
pub fn pattern_value(layer: usize, row: u32, col: u32) -> f64 {
    (layer as u32 * 100_000 + col * 1000 + row) as f64
}

/// Sparse 4x4 dataset over [`SPARSE_4X4_MASK`] valued by
/// [`pattern_value`].
pub fn pattern_dataset(layer_count: u32) -> RasterDataset {
    let index = sparse_index_4x4();
    let mut header = demo_header(4, 4);
    header.layer_count = layer_count;
    header.valid_cell_count = index.valid_cell_count();
    fill_pattern(header, index)
}

/// Dense dataset valued by [`pattern_value`].
pub fn dense_dataset(rows: u32, cols: u32, layer_count: u32) -> RasterDataset {
    let index = Arc::new(PositionIndex::dense(rows, cols));
    let mut header = demo_header(rows, cols);
    header.layer_count = layer_count;
    fill_pattern(header, index)
}

/// Sparse 4x4 dataset stored as 16-bit integers.
pub fn int16_dataset() -> RasterDataset {
    let index = sparse_index_4x4();
    let mut header = demo_header(4, 4);
    header.valid_cell_count = index.valid_cell_count();
    header.cell_type = CellType::Int16;
    fill_pattern(header, index)
}

fn fill_pattern(header: RasterHeader, index: Arc<PositionIndex>) -> RasterDataset {
    let mut dataset = RasterDataset::filled(header, Arc::clone(&index), 0.0).unwrap();
    for layer in 0..dataset.layer_count() {
        for (_, row, col) in index.iter() {
            dataset
                .set_value(layer, row, col, pattern_value(layer, row, col))
                .unwrap();
        }
    }
    dataset
}
