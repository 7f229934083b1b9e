use byteorder::{ByteOrder, LittleEndian};

/// Computes the checksum stored in a CFDATA header.  The reserve bytes and
/// the payload are checksummed as one stream, four bytes at a time; the
/// block's two size fields are folded in last.
pub(crate) fn data_block_checksum(
    reserve: &[u8],
    payload: &[u8],
    compressed_size: u16,
    uncompressed_size: u16,
) -> u32 {
    let value = if reserve.is_empty() {
        fold(payload)
    } else {
        let mut joined = Vec::with_capacity(reserve.len() + payload.len());
        joined.extend_from_slice(reserve);
        joined.extend_from_slice(payload);
        fold(&joined)
    };
    value ^ (compressed_size as u32 | ((uncompressed_size as u32) << 16))
}

fn fold(bytes: &[u8]) -> u32 {
    let mut words = bytes.chunks_exact(4);
    let mut value = 0u32;
    for word in &mut words {
        value ^= LittleEndian::read_u32(word);
    }
    // Leftover bytes are combined most-significant first.
    let tail = words
        .remainder()
        .iter()
        .fold(0u32, |acc, &byte| (acc << 8) | byte as u32);
    value ^ tail
}
