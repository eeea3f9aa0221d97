//! Core raster model: masked grids, position indexes, and binary encoding.

pub mod cell;
pub mod codec;
pub mod dataset;
pub mod error;
pub mod header;
pub mod index;
pub mod zones;

pub use cell::CellType;
pub use dataset::RasterDataset;
pub use error::{RasterError, RasterResult};
pub use header::{RasterHeader, DEFAULT_NODATA};
pub use index::PositionIndex;
pub use zones::{Zone, ZoneSet};
