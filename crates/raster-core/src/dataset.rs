//! In-memory raster: header, shared position index, and value layers.

use std::sync::Arc;

use crate::cell::CellType;
use crate::error::{RasterError, RasterResult};
use crate::header::RasterHeader;
use crate::index::PositionIndex;

/// Tolerance for nodata and cell-size comparisons.
const VALUE_EPSILON: f64 = 1e-6;

/// A masked raster held in memory.
///
/// Layers store one f64 per valid cell, ordered by the position index.
/// The index is shared: every layer of a dataset, and any dataset
/// derived from the same mask, points at the same `Arc`.
#[derive(Debug, Clone)]
pub struct RasterDataset {
    header: RasterHeader,
    index: Arc<PositionIndex>,
    layers: Vec<Vec<f64>>,
}

impl RasterDataset {
    /// Create a dataset with every valid cell set to `fill`.
    pub fn filled(
        header: RasterHeader,
        index: Arc<PositionIndex>,
        fill: f64,
    ) -> RasterResult<Self> {
        header.validate()?;
        check_index_shape(&header, &index)?;
        let cells = header.valid_cell_count as usize;
        let layers = vec![vec![fill; cells]; header.layer_count as usize];
        Ok(Self {
            header,
            index,
            layers,
        })
    }

    /// Assemble a dataset from prebuilt layer vectors.
    pub fn from_layers(
        header: RasterHeader,
        index: Arc<PositionIndex>,
        layers: Vec<Vec<f64>>,
    ) -> RasterResult<Self> {
        header.validate()?;
        check_index_shape(&header, &index)?;
        if layers.len() != header.layer_count as usize {
            return Err(RasterError::ShapeMismatch(format!(
                "expected {} layers, got {}",
                header.layer_count,
                layers.len()
            )));
        }
        for (i, layer) in layers.iter().enumerate() {
            if layer.len() as u64 != header.valid_cell_count {
                return Err(RasterError::ShapeMismatch(format!(
                    "layer {} has {} values, expected {}",
                    i,
                    layer.len(),
                    header.valid_cell_count
                )));
            }
        }
        Ok(Self {
            header,
            index,
            layers,
        })
    }

    pub fn header(&self) -> &RasterHeader {
        &self.header
    }

    /// The shared coordinate-to-ordinal index.
    pub fn index(&self) -> &Arc<PositionIndex> {
        &self.index
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Borrow one layer's compacted values.
    pub fn layer(&self, layer: usize) -> RasterResult<&[f64]> {
        self.layers
            .get(layer)
            .map(|values| values.as_slice())
            .ok_or(RasterError::LayerOutOfRange {
                layer,
                layer_count: self.layers.len(),
            })
    }

    /// Whether `value` is the header's nodata marker.
    pub fn is_nodata(&self, value: f64) -> bool {
        (value - self.header.nodata).abs() < VALUE_EPSILON
    }

    /// Value at (row, col) in `layer`. Returns nodata for masked cells,
    /// coordinates outside the grid, and layers out of range; reads
    /// never fail.
    pub fn value(&self, layer: usize, row: u32, col: u32) -> f64 {
        let values = match self.layers.get(layer) {
            Some(values) => values,
            None => return self.header.nodata,
        };
        match self.index.ordinal_of(row, col) {
            Some(ordinal) => values[ordinal],
            None => self.header.nodata,
        }
    }

    /// Value at map point (x, y) in `layer`, nodata outside the grid.
    pub fn value_at(&self, layer: usize, x: f64, y: f64) -> f64 {
        match self.header.cell_of(x, y) {
            Some((row, col)) => self.value(layer, row, col),
            None => self.header.nodata,
        }
    }

    /// Write `value` at (row, col) in `layer`. Unlike reads, writes to
    /// masked or out-of-grid cells are errors.
    pub fn set_value(&mut self, layer: usize, row: u32, col: u32, value: f64) -> RasterResult<()> {
        let layer_count = self.layers.len();
        let values = self
            .layers
            .get_mut(layer)
            .ok_or(RasterError::LayerOutOfRange { layer, layer_count })?;
        let ordinal = self
            .index
            .ordinal_of(row, col)
            .ok_or(RasterError::OutOfMask { row, col })?;
        values[ordinal] = value;
        Ok(())
    }

    /// Extract the cells covered by `mask` into a new dataset.
    ///
    /// The output takes the mask's grid and valid set; each output cell
    /// samples this dataset at the same map location. Cells the source
    /// does not cover, and source nodata, become `default_value`. Both
    /// grids must share one cell size.
    pub fn masked_by(
        &self,
        mask: &RasterDataset,
        default_value: f64,
        out_type: CellType,
    ) -> RasterResult<RasterDataset> {
        if (self.header.cell_size - mask.header.cell_size).abs() > VALUE_EPSILON {
            return Err(RasterError::ShapeMismatch(format!(
                "cell size {} does not match mask cell size {}",
                self.header.cell_size, mask.header.cell_size
            )));
        }

        let out_header = RasterHeader {
            rows: mask.header.rows,
            cols: mask.header.cols,
            cell_size: mask.header.cell_size,
            x_origin: mask.header.x_origin,
            y_origin: mask.header.y_origin,
            nodata: self.header.nodata,
            layer_count: self.header.layer_count,
            valid_cell_count: mask.header.valid_cell_count,
            cell_type: out_type,
            srs: self.header.srs.clone(),
        };

        let cells = out_header.valid_cell_count as usize;
        let mut layers = vec![vec![out_header.nodata; cells]; self.layers.len()];
        for (ordinal, row, col) in mask.index.iter() {
            let (x, y) = mask.header.cell_center(row, col);
            let source_cell = self.header.cell_of(x, y);
            for (layer, values) in layers.iter_mut().enumerate() {
                let sampled = match source_cell {
                    Some((src_row, src_col)) => self.value(layer, src_row, src_col),
                    None => self.header.nodata,
                };
                values[ordinal] = if self.is_nodata(sampled) {
                    default_value
                } else {
                    sampled
                };
            }
        }

        RasterDataset::from_layers(out_header, Arc::clone(&mask.index), layers)
    }
}

fn check_index_shape(header: &RasterHeader, index: &PositionIndex) -> RasterResult<()> {
    if index.rows() != header.rows || index.cols() != header.cols {
        return Err(RasterError::ShapeMismatch(format!(
            "index covers {}x{}, header declares {}x{}",
            index.rows(),
            index.cols(),
            header.rows,
            header.cols
        )));
    }
    if index.valid_cell_count() != header.valid_cell_count {
        return Err(RasterError::ShapeMismatch(format!(
            "index has {} valid cells, header declares {}",
            index.valid_cell_count(),
            header.valid_cell_count
        )));
    }
    Ok(())
}
