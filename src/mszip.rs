use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::Result;

const MSZIP_SIGNATURE: u16 = 0x4B43; // "CK" stored little-endian
const MSZIP_SIGNATURE_LEN: usize = 2;
pub(crate) const DEFLATE_MAX_DICT_LEN: usize = 0x8000;

/// Inflates the MSZIP blocks of one folder, in order.  Each block is a raw
/// DEFLATE stream that may refer back into the previous blocks' output, so
/// the last 32 KiB of output are kept as the dictionary for the next block.
pub struct MsZipDecompressor {
    decompressor: flate2::Decompress,
    dictionary: Vec<u8>,
}

impl MsZipDecompressor {
    /// Creates a decompressor with an empty dictionary.
    pub fn new() -> MsZipDecompressor {
        MsZipDecompressor {
            decompressor: flate2::Decompress::new(false),
            dictionary: Vec::with_capacity(DEFLATE_MAX_DICT_LEN),
        }
    }

    /// Returns the history the next block will be decoded against.
    pub fn dictionary(&self) -> &[u8] {
        &self.dictionary
    }

    /// Decompresses one complete block (signature included).  With
    /// `strict_signature` unset, a block that doesn't start with "CK" is
    /// logged and its bytes after the two-byte prefix are inflated anyway.
    pub fn decompress_block(
        &mut self,
        data: &[u8],
        uncompressed_size: usize,
        strict_signature: bool,
    ) -> Result<Vec<u8>> {
        if data.len() < MSZIP_SIGNATURE_LEN {
            corrupt_data!(
                "MSZIP block is only {} bytes long",
                data.len()
            );
        }
        let signature = (data[0] as u16) | ((data[1] as u16) << 8);
        if signature != MSZIP_SIGNATURE {
            if strict_signature {
                corrupt_data!(
                    "Invalid MSZIP block signature 0x{:04x}",
                    signature
                );
            }
            tracing::warn!(
                signature = format_args!("{:#06x}", signature),
                "MSZIP block has a bad signature; inflating it anyway"
            );
        }
        let data = &data[MSZIP_SIGNATURE_LEN..];
        self.decompressor.reset(false);
        if !self.dictionary.is_empty() {
            self.prime_with_dictionary()?;
        }
        let mut out = Vec::<u8>::with_capacity(uncompressed_size);
        let flush = flate2::FlushDecompress::Finish;
        if let Err(error) = self.decompressor.decompress_vec(data, &mut out, flush)
        {
            corrupt_data!("MSZIP decompression failed: {}", error);
        }
        if out.len() != uncompressed_size {
            corrupt_data!(
                "MSZIP block has the wrong uncompressed size \
                 (expected {}, was actually {})",
                uncompressed_size,
                out.len()
            );
        }
        self.remember(&out);
        Ok(out)
    }

    // The pure-Rust inflater has no preset-dictionary call, so the history
    // goes in as one stored (uncompressed) DEFLATE block instead.
    fn prime_with_dictionary(&mut self) -> Result<()> {
        debug_assert!(self.dictionary.len() <= DEFLATE_MAX_DICT_LEN);
        let length = self.dictionary.len() as u16;
        let mut stored: Vec<u8> = Vec::with_capacity(5 + self.dictionary.len());
        stored.push(0);
        stored.write_u16::<LittleEndian>(length).map_err(io_to_data)?;
        stored.write_u16::<LittleEndian>(!length).map_err(io_to_data)?;
        stored.extend_from_slice(&self.dictionary);
        let mut sink = Vec::with_capacity(self.dictionary.len());
        let flush = flate2::FlushDecompress::Sync;
        match self.decompressor.decompress_vec(&stored, &mut sink, flush) {
            Ok(flate2::Status::Ok) => Ok(()),
            other => corrupt_data!(
                "Could not load MSZIP dictionary: {:?}",
                other
            ),
        }
    }

    fn remember(&mut self, out: &[u8]) {
        if out.len() >= DEFLATE_MAX_DICT_LEN {
            let start = out.len() - DEFLATE_MAX_DICT_LEN;
            self.dictionary.clear();
            self.dictionary.extend_from_slice(&out[start..]);
        } else {
            let total = self.dictionary.len() + out.len();
            if total > DEFLATE_MAX_DICT_LEN {
                self.dictionary.drain(..(total - DEFLATE_MAX_DICT_LEN));
            }
            self.dictionary.extend_from_slice(out);
        }
    }
}

impl Default for MsZipDecompressor {
    fn default() -> Self {
        MsZipDecompressor::new()
    }
}

fn io_to_data(error: std::io::Error) -> crate::Error {
    crate::Error::CorruptData(error.to_string())
}
