//! Position index mapping grid coordinates to compacted layer ordinals.

use crate::error::{RasterError, RasterResult};

/// Packs (row, col) into one sortable key. Row-major scan order is
/// exactly ascending key order.
fn pack(row: u32, col: u32) -> u64 {
    (row as u64) << 32 | col as u64
}

fn unpack(key: u64) -> (u32, u32) {
    ((key >> 32) as u32, key as u32)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum IndexCells {
    /// Every cell is valid; ordinals are computed arithmetically.
    Dense,
    /// Strictly ascending packed (row, col) keys of the valid cells.
    Sparse { keys: Vec<u64> },
}

/// Bidirectional mapping between grid coordinates and dense ordinals.
///
/// Valid cells are numbered 0..n in row-major scan order, skipping
/// masked cells entirely. Layer arrays are indexed by these ordinals,
/// so a raster never stores values for masked cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionIndex {
    rows: u32,
    cols: u32,
    cells: IndexCells,
}

impl PositionIndex {
    /// Index over a grid with no masked cells.
    pub fn dense(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            cells: IndexCells::Dense,
        }
    }

    /// Build from a row-major validity mask of length rows*cols.
    pub fn from_mask(rows: u32, cols: u32, mask: &[bool]) -> RasterResult<Self> {
        let cell_count = rows as usize * cols as usize;
        if mask.len() != cell_count {
            return Err(RasterError::ShapeMismatch(format!(
                "mask has {} cells, grid is {}x{}",
                mask.len(),
                rows,
                cols
            )));
        }
        let keys: Vec<u64> = mask
            .iter()
            .enumerate()
            .filter(|(_, valid)| **valid)
            .map(|(i, _)| pack((i / cols as usize) as u32, (i % cols as usize) as u32))
            .collect();
        if keys.len() == cell_count {
            return Ok(Self::dense(rows, cols));
        }
        Ok(Self {
            rows,
            cols,
            cells: IndexCells::Sparse { keys },
        })
    }

    /// Rebuild from persisted (row, col) pairs in scan order.
    ///
    /// Pairs must be in-bounds and strictly ascending; anything else
    /// means the stored index bytes are damaged.
    pub fn from_pairs(
        rows: u32,
        cols: u32,
        pairs: impl IntoIterator<Item = (u32, u32)>,
    ) -> RasterResult<Self> {
        let mut keys = Vec::new();
        let mut last: Option<u64> = None;
        for (row, col) in pairs {
            if row >= rows || col >= cols {
                return Err(RasterError::CorruptPayload(format!(
                    "index entry ({}, {}) outside {}x{} grid",
                    row, col, rows, cols
                )));
            }
            let key = pack(row, col);
            if let Some(prev) = last {
                if key <= prev {
                    return Err(RasterError::CorruptPayload(format!(
                        "index entries out of scan order at ({}, {})",
                        row, col
                    )));
                }
            }
            last = Some(key);
            keys.push(key);
        }
        if keys.len() as u64 == rows as u64 * cols as u64 {
            return Ok(Self::dense(rows, cols));
        }
        Ok(Self {
            rows,
            cols,
            cells: IndexCells::Sparse { keys },
        })
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Number of valid cells (the length of every layer array).
    pub fn valid_cell_count(&self) -> u64 {
        match &self.cells {
            IndexCells::Dense => self.rows as u64 * self.cols as u64,
            IndexCells::Sparse { keys } => keys.len() as u64,
        }
    }

    /// Whether the index covers every grid cell.
    pub fn is_dense(&self) -> bool {
        matches!(self.cells, IndexCells::Dense)
    }

    /// Layer ordinal of cell (row, col), or `None` if the cell is
    /// masked or outside the grid.
    pub fn ordinal_of(&self, row: u32, col: u32) -> Option<usize> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        match &self.cells {
            IndexCells::Dense => Some(row as usize * self.cols as usize + col as usize),
            IndexCells::Sparse { keys } => keys.binary_search(&pack(row, col)).ok(),
        }
    }

    /// Grid coordinates of a layer ordinal, or `None` past the end.
    pub fn coordinate_of(&self, ordinal: usize) -> Option<(u32, u32)> {
        match &self.cells {
            IndexCells::Dense => {
                if ordinal as u64 >= self.valid_cell_count() {
                    return None;
                }
                Some((
                    (ordinal / self.cols as usize) as u32,
                    (ordinal % self.cols as usize) as u32,
                ))
            }
            IndexCells::Sparse { keys } => keys.get(ordinal).map(|key| unpack(*key)),
        }
    }

    /// Iterate valid cells as (ordinal, row, col) in scan order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u32, u32)> + '_ {
        (0..self.valid_cell_count() as usize).filter_map(move |ordinal| {
            self.coordinate_of(ordinal)
                .map(|(row, col)| (ordinal, row, col))
        })
    }
}
