//! Raster header: grid geometry, mask summary, and value encoding.

use serde::{Deserialize, Serialize};

use crate::cell::CellType;
use crate::error::{RasterError, RasterResult};

/// Nodata marker used when none is specified.
pub const DEFAULT_NODATA: f64 = -9999.0;

/// Descriptive metadata persisted alongside every raster.
///
/// Origins anchor the center of the lower-left cell, while row indices
/// count from the top of the grid. `valid_cell_count` is the length of
/// every stored layer after masked cells are compacted away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterHeader {
    /// Number of grid rows.
    pub rows: u32,
    /// Number of grid columns.
    pub cols: u32,
    /// Edge length of one square cell, in map units.
    pub cell_size: f64,
    /// X coordinate of the center of the lower-left cell.
    pub x_origin: f64,
    /// Y coordinate of the center of the lower-left cell.
    pub y_origin: f64,
    /// Sentinel value representing "no data" in layer values.
    pub nodata: f64,
    /// Number of value layers stored for the grid.
    pub layer_count: u32,
    /// Number of unmasked cells; the length of each stored layer.
    pub valid_cell_count: u64,
    /// Numeric encoding of stored cell values.
    #[serde(default)]
    pub cell_type: CellType,
    /// Spatial reference text, carried through storage unparsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srs: Option<String>,
}

impl RasterHeader {
    /// Create a dense single-layer header with default nodata and encoding.
    pub fn new(rows: u32, cols: u32, cell_size: f64, x_origin: f64, y_origin: f64) -> Self {
        Self {
            rows,
            cols,
            cell_size,
            x_origin,
            y_origin,
            nodata: DEFAULT_NODATA,
            layer_count: 1,
            valid_cell_count: rows as u64 * cols as u64,
            cell_type: CellType::Float64,
            srs: None,
        }
    }

    /// Total number of grid cells, masked or not.
    pub fn cell_count(&self) -> u64 {
        self.rows as u64 * self.cols as u64
    }

    /// Whether every grid cell is valid (no mask).
    pub fn is_dense(&self) -> bool {
        self.valid_cell_count == self.cell_count()
    }

    /// Check structural consistency.
    pub fn validate(&self) -> RasterResult<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(RasterError::MalformedHeader(format!(
                "grid dimensions must be positive, got {}x{}",
                self.rows, self.cols
            )));
        }
        // Written as a negated comparison so NaN fails too.
        if !(self.cell_size > 0.0) || !self.cell_size.is_finite() {
            return Err(RasterError::MalformedHeader(format!(
                "cell_size must be positive and finite, got {}",
                self.cell_size
            )));
        }
        if !self.x_origin.is_finite() || !self.y_origin.is_finite() {
            return Err(RasterError::MalformedHeader(format!(
                "origin must be finite, got ({}, {})",
                self.x_origin, self.y_origin
            )));
        }
        if !self.nodata.is_finite() {
            return Err(RasterError::MalformedHeader(format!(
                "nodata must be finite, got {}",
                self.nodata
            )));
        }
        if self.layer_count == 0 {
            return Err(RasterError::MalformedHeader(
                "layer_count must be at least 1".to_string(),
            ));
        }
        if self.valid_cell_count > self.cell_count() {
            return Err(RasterError::MalformedHeader(format!(
                "valid_cell_count {} exceeds grid capacity {}",
                self.valid_cell_count,
                self.cell_count()
            )));
        }
        Ok(())
    }

    /// Grid cell containing map point (x, y), or `None` when the point
    /// falls outside the grid extent. Rows count from the top.
    pub fn cell_of(&self, x: f64, y: f64) -> Option<(u32, u32)> {
        let col = ((x - self.x_origin) / self.cell_size + 0.5).floor();
        let row_from_bottom = ((y - self.y_origin) / self.cell_size + 0.5).floor();
        if col < 0.0
            || row_from_bottom < 0.0
            || col >= self.cols as f64
            || row_from_bottom >= self.rows as f64
        {
            return None;
        }
        let row = self.rows - 1 - row_from_bottom as u32;
        Some((row, col as u32))
    }

    /// Map coordinates of the center of cell (row, col).
    pub fn cell_center(&self, row: u32, col: u32) -> (f64, f64) {
        let x = self.x_origin + col as f64 * self.cell_size;
        let y = self.y_origin + (self.rows - 1 - row) as f64 * self.cell_size;
        (x, y)
    }

    /// Serialize to the JSON document form used by both backends.
    pub fn to_json(&self) -> RasterResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse and validate a JSON header document.
    pub fn from_json(bytes: &[u8]) -> RasterResult<Self> {
        let header: Self = serde_json::from_slice(bytes)?;
        header.validate()?;
        Ok(header)
    }
}
