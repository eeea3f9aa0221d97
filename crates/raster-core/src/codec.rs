//! Binary encoding of layer payloads and persisted position indexes.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::dataset::RasterDataset;
use crate::error::{RasterError, RasterResult};
use crate::header::RasterHeader;
use crate::index::PositionIndex;

/// Magic prefix of encoded index bytes.
const INDEX_MAGIC: &[u8; 4] = b"RIDX";
/// Current index encoding version.
const INDEX_VERSION: u16 = 1;

/// Exact byte length of a dataset payload for `header`.
pub fn payload_len(header: &RasterHeader) -> u64 {
    header.layer_count as u64 * header.valid_cell_count * header.cell_type.byte_width() as u64
}

/// CRC32 of stored bytes, kept next to them for corruption checks.
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Encode all layers, in order, with the header's cell type.
pub fn encode_payload(dataset: &RasterDataset) -> Bytes {
    let header = dataset.header();
    let mut buf = BytesMut::with_capacity(payload_len(header) as usize);
    for layer in 0..dataset.layer_count() {
        // layer() cannot fail inside 0..layer_count
        if let Ok(values) = dataset.layer(layer) {
            for value in values {
                header.cell_type.encode_value(*value, &mut buf);
            }
        }
    }
    buf.freeze()
}

/// Decode a payload back into a dataset. The byte length must match
/// the header exactly; anything else means damaged storage.
pub fn decode_payload(
    header: RasterHeader,
    index: Arc<PositionIndex>,
    mut bytes: &[u8],
) -> RasterResult<RasterDataset> {
    let expected = payload_len(&header);
    if bytes.len() as u64 != expected {
        return Err(RasterError::CorruptPayload(format!(
            "payload is {} bytes, header declares {}",
            bytes.len(),
            expected
        )));
    }
    let cells = header.valid_cell_count as usize;
    let mut layers = Vec::with_capacity(header.layer_count as usize);
    for _ in 0..header.layer_count {
        let mut values = Vec::with_capacity(cells);
        for _ in 0..cells {
            values.push(header.cell_type.decode_value(&mut bytes));
        }
        layers.push(values);
    }
    RasterDataset::from_layers(header, index, layers)
}

/// Encode the valid-cell coordinates of a sparse index.
///
/// The same bytes serve as the file sidecar body and the database
/// index stream, so the two backends stay interchangeable.
pub fn encode_index(index: &PositionIndex) -> Bytes {
    let count = index.valid_cell_count();
    let mut buf = BytesMut::with_capacity(14 + count as usize * 8);
    buf.put_slice(INDEX_MAGIC);
    buf.put_u16_le(INDEX_VERSION);
    buf.put_u64_le(count);
    for (_, row, col) in index.iter() {
        buf.put_u32_le(row);
        buf.put_u32_le(col);
    }
    buf.freeze()
}

/// Decode index bytes for a grid of the given dimensions.
pub fn decode_index(rows: u32, cols: u32, mut bytes: &[u8]) -> RasterResult<PositionIndex> {
    if bytes.len() < 14 {
        return Err(RasterError::CorruptPayload(format!(
            "index blob truncated at {} bytes",
            bytes.len()
        )));
    }
    if &bytes[..4] != INDEX_MAGIC {
        return Err(RasterError::CorruptPayload(
            "index blob lacks RIDX magic".to_string(),
        ));
    }
    bytes.advance(4);
    let version = bytes.get_u16_le();
    if version != INDEX_VERSION {
        return Err(RasterError::CorruptPayload(format!(
            "unsupported index version {}",
            version
        )));
    }
    let count = bytes.get_u64_le();
    // saturating_mul: a damaged count must not overflow the check.
    if bytes.len() as u64 != count.saturating_mul(8) {
        return Err(RasterError::CorruptPayload(format!(
            "index blob declares {} cells but carries {} bytes",
            count,
            bytes.len()
        )));
    }
    let mut pairs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let row = bytes.get_u32_le();
        let col = bytes.get_u32_le();
        pairs.push((row, col));
    }
    PositionIndex::from_pairs(rows, cols, pairs)
}
