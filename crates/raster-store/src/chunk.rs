//! Payload chunking for size-bounded blob storage.

use bytes::Bytes;

/// Default upper bound on one stored chunk, comfortably below typical
/// database row and document ceilings.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 256 * 1024;

/// Number of chunks a payload of `len` bytes splits into. Empty
/// payloads produce no chunks at all.
pub fn chunk_count(len: u64, max_chunk_size: usize) -> u32 {
    if len == 0 {
        return 0;
    }
    ((len + max_chunk_size as u64 - 1) / max_chunk_size as u64) as u32
}

/// Split `payload` into ordered chunks of at most `max_chunk_size`
/// bytes each. Chunks are slices of the source buffer, not copies.
pub fn split_payload(payload: &Bytes, max_chunk_size: usize) -> Vec<Bytes> {
    let count = chunk_count(payload.len() as u64, max_chunk_size);
    let mut chunks = Vec::with_capacity(count as usize);
    let mut offset = 0;
    while offset < payload.len() {
        let end = (offset + max_chunk_size).min(payload.len());
        chunks.push(payload.slice(offset..end));
        offset = end;
    }
    chunks
}
