//! Zone decomposition: split a raster into labeled regions and merge
//! per-zone results back onto the full grid.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dataset::RasterDataset;
use crate::error::{RasterError, RasterResult};
use crate::header::RasterHeader;
use crate::index::PositionIndex;

/// One labeled region of a zoned raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// Zone label, the rounded cell value in the zone raster.
    pub id: i32,
    pub min_row: u32,
    pub max_row: u32,
    pub min_col: u32,
    pub max_col: u32,
    /// Ordinals of the zone's cells in the full-grid index, scan order.
    pub ordinals: Vec<usize>,
}

/// Partition of a raster's valid cells into zones by cell value.
///
/// Built once from a zone raster, then used to crop per-zone datasets
/// out of any raster sharing the same grid, and to merge processed
/// parts back together.
#[derive(Debug, Clone)]
pub struct ZoneSet {
    header: RasterHeader,
    index: Arc<PositionIndex>,
    zones: Vec<Zone>,
}

impl ZoneSet {
    /// Group the valid cells of `zone_raster` by rounded layer-0 value.
    /// Valid cells holding nodata belong to no zone.
    pub fn from_mask(zone_raster: &RasterDataset) -> RasterResult<ZoneSet> {
        let values = zone_raster.layer(0)?;
        let index = zone_raster.index();
        let mut grouped: BTreeMap<i32, Zone> = BTreeMap::new();
        for (ordinal, row, col) in index.iter() {
            let value = values[ordinal];
            if zone_raster.is_nodata(value) {
                continue;
            }
            let id = value.round() as i32;
            let zone = grouped.entry(id).or_insert_with(|| Zone {
                id,
                min_row: row,
                max_row: row,
                min_col: col,
                max_col: col,
                ordinals: Vec::new(),
            });
            zone.min_row = zone.min_row.min(row);
            zone.max_row = zone.max_row.max(row);
            zone.min_col = zone.min_col.min(col);
            zone.max_col = zone.max_col.max(col);
            zone.ordinals.push(ordinal);
        }
        Ok(ZoneSet {
            header: zone_raster.header().clone(),
            index: Arc::clone(index),
            zones: grouped.into_values().collect(),
        })
    }

    /// Zones in ascending id order.
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn zone(&self, id: i32) -> Option<&Zone> {
        self.zones.iter().find(|zone| zone.id == id)
    }

    /// Crop one zone out of `source` as a standalone dataset.
    ///
    /// The output grid is the zone's bounding box; its valid set is the
    /// zone's cells. `source` must share the grid the zones were built
    /// from.
    pub fn extract(&self, zone_id: i32, source: &RasterDataset) -> RasterResult<RasterDataset> {
        let zone = self.zone(zone_id).ok_or_else(|| {
            RasterError::ShapeMismatch(format!("zone {} not present in zone set", zone_id))
        })?;
        if source.index() != &self.index {
            return Err(RasterError::ShapeMismatch(
                "source does not share the zone set's grid".to_string(),
            ));
        }

        let cell_size = self.header.cell_size;
        let rows = zone.max_row - zone.min_row + 1;
        let cols = zone.max_col - zone.min_col + 1;
        let source_header = source.header();
        let header = RasterHeader {
            rows,
            cols,
            cell_size,
            x_origin: self.header.x_origin + zone.min_col as f64 * cell_size,
            y_origin: self.header.y_origin
                + (self.header.rows - 1 - zone.max_row) as f64 * cell_size,
            nodata: source_header.nodata,
            layer_count: source_header.layer_count,
            valid_cell_count: zone.ordinals.len() as u64,
            cell_type: source_header.cell_type,
            srs: source_header.srs.clone(),
        };

        // Localizing preserves scan order: both offsets are constant.
        let mut pairs = Vec::with_capacity(zone.ordinals.len());
        for &ordinal in &zone.ordinals {
            let (row, col) = self.index.coordinate_of(ordinal).ok_or_else(|| {
                RasterError::ShapeMismatch(format!(
                    "zone {} references ordinal {} past the index",
                    zone_id, ordinal
                ))
            })?;
            pairs.push((row - zone.min_row, col - zone.min_col));
        }
        let index = Arc::new(PositionIndex::from_pairs(rows, cols, pairs)?);

        let mut layers = Vec::with_capacity(source.layer_count());
        for layer in 0..source.layer_count() {
            let values = source.layer(layer)?;
            layers.push(zone.ordinals.iter().map(|&o| values[o]).collect());
        }
        RasterDataset::from_layers(header, index, layers)
    }

    /// Merge per-zone datasets back onto the full grid.
    ///
    /// Cells in zones with no part stay nodata. Every part must carry
    /// exactly its zone's cells, in the zone's scan order, with one
    /// shared layer count.
    pub fn merge(&self, parts: &[(i32, &RasterDataset)]) -> RasterResult<RasterDataset> {
        let (_, first) = parts.first().ok_or_else(|| {
            RasterError::ShapeMismatch("cannot merge zero zone parts".to_string())
        })?;
        let layer_count = first.layer_count();
        let nodata = first.header().nodata;

        let mut header = self.header.clone();
        header.nodata = nodata;
        header.layer_count = layer_count as u32;
        header.valid_cell_count = self.index.valid_cell_count();
        header.cell_type = first.header().cell_type;
        header.srs = first.header().srs.clone();

        let cells = header.valid_cell_count as usize;
        let mut layers = vec![vec![nodata; cells]; layer_count];
        for (zone_id, part) in parts {
            let zone = self.zone(*zone_id).ok_or_else(|| {
                RasterError::ShapeMismatch(format!("zone {} not present in zone set", zone_id))
            })?;
            if part.layer_count() != layer_count {
                return Err(RasterError::ShapeMismatch(format!(
                    "zone {} part has {} layers, expected {}",
                    zone_id,
                    part.layer_count(),
                    layer_count
                )));
            }
            if part.header().valid_cell_count as usize != zone.ordinals.len() {
                return Err(RasterError::ShapeMismatch(format!(
                    "zone {} part has {} cells, zone covers {}",
                    zone_id,
                    part.header().valid_cell_count,
                    zone.ordinals.len()
                )));
            }
            for (layer, merged) in layers.iter_mut().enumerate() {
                let values = part.layer(layer)?;
                for (k, &ordinal) in zone.ordinals.iter().enumerate() {
                    merged[ordinal] = values[k];
                }
            }
        }
        RasterDataset::from_layers(header, Arc::clone(&self.index), layers)
    }
}
