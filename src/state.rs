use std::borrow::Cow;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::checksum::data_block_checksum;
use crate::error::Result;
use crate::header::FolderEntry;
use crate::mszip::MsZipDecompressor;

/// Result of pulling data blocks for a folder.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Fill {
    /// The requested range has been decoded.
    Ready,
    /// This volume has no more data for the folder; the rest (if any) is in
    /// the next volume.
    VolumeExhausted,
}

/// How data blocks are checked while decoding.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BlockChecks {
    pub verify_checksums: bool,
    pub strict_signature: bool,
}

/// The decoding state of one folder's stream.  It survives the move to the
/// next volume when the folder continues there.
pub(crate) struct FolderStream {
    decompressor: MsZipDecompressor,
    chunks_consumed: usize,
    pending_tail: Option<Vec<u8>>,
    // Decoded bytes no file has claimed yet, starting at folder offset
    // `window_start`.
    window: Vec<u8>,
    window_start: u64,
}

impl FolderStream {
    pub fn new() -> FolderStream {
        FolderStream {
            decompressor: MsZipDecompressor::new(),
            chunks_consumed: 0,
            pending_tail: None,
            window: Vec::new(),
            window_start: 0,
        }
    }

    /// Total decoded bytes of this folder so far, across volumes.
    pub fn produced(&self) -> u64 {
        self.window_start + self.window.len() as u64
    }

    /// Folder offset of the first byte still held.
    pub fn window_start(&self) -> u64 {
        self.window_start
    }

    pub fn chunks_consumed(&self) -> usize {
        self.chunks_consumed
    }

    pub fn has_pending_tail(&self) -> bool {
        self.pending_tail.is_some()
    }

    /// Starts consuming a new volume's blocks for this folder.
    pub fn enter_volume(&mut self) {
        self.chunks_consumed = 0;
    }

    /// Decodes this volume's next blocks for `folder` until `target` bytes
    /// of the folder exist or the volume has no more of them.
    pub fn fill(
        &mut self,
        folder: &FolderEntry,
        volume: &[u8],
        target: u64,
        checks: BlockChecks,
    ) -> Result<Fill> {
        while self.produced() < target {
            let chunk = match folder.chunks().get(self.chunks_consumed) {
                Some(chunk) => chunk,
                None => return Ok(Fill::VolumeExhausted),
            };
            let index = self.chunks_consumed;
            self.chunks_consumed += 1;
            let end = chunk.data_offset + chunk.compressed_size as usize;
            let payload = match volume.get(chunk.data_offset..end) {
                Some(payload) => payload,
                None => corrupt_header!(
                    "Data block {} lies outside the volume",
                    index
                ),
            };
            if checks.verify_checksums && chunk.checksum != 0 {
                let actual = data_block_checksum(
                    &chunk.reserve_data,
                    payload,
                    chunk.compressed_size,
                    chunk.uncompressed_size,
                );
                if actual != chunk.checksum {
                    corrupt_data!(
                        "Checksum error in data block {} \
                         (expected {:08x}, actual {:08x})",
                        index,
                        chunk.checksum,
                        actual
                    );
                }
            }
            if chunk.continues_in_next_volume() {
                tracing::debug!(
                    block = index,
                    bytes = payload.len(),
                    "data block continues in next volume"
                );
                self.pending_tail
                    .get_or_insert_with(Vec::new)
                    .extend_from_slice(payload);
                return Ok(Fill::VolumeExhausted);
            }
            let data: Cow<'_, [u8]> = match self.pending_tail.take() {
                Some(mut tail) => {
                    tail.extend_from_slice(payload);
                    Cow::Owned(tail)
                }
                None => Cow::Borrowed(payload),
            };
            let decoded = self.decompressor.decompress_block(
                &data,
                chunk.uncompressed_size as usize,
                checks.strict_signature,
            )?;
            self.window.extend_from_slice(&decoded);
        }
        Ok(Fill::Ready)
    }

    /// Drops held bytes before folder offset `offset`.
    pub fn release_until(&mut self, offset: u64) {
        let count = offset
            .saturating_sub(self.window_start)
            .min(self.window.len() as u64) as usize;
        self.window.drain(..count);
        self.window_start += count as u64;
    }

    /// Returns the held bytes of `start..start + length`.  The range must
    /// already be decoded and not yet released.
    pub fn slice(&self, start: u64, length: usize) -> &[u8] {
        let from = (start - self.window_start) as usize;
        &self.window[from..from + length]
    }
}

/// Everything one extraction run carries from step to step.
pub(crate) struct ExtractionState {
    /// One stream per folder of the current volume.
    pub streams: Vec<FolderStream>,
    /// The last folder of the previous volume, which may continue as folder
    /// 0 of the current one.
    pub carried: Option<FolderStream>,
    /// Every volume opened so far.
    pub visited: HashSet<PathBuf>,
    pub volumes_processed: usize,
    pub files_written: usize,
    pub bytes_written: u64,
}

impl ExtractionState {
    pub fn new() -> ExtractionState {
        ExtractionState {
            streams: Vec::new(),
            carried: None,
            visited: HashSet::new(),
            volumes_processed: 0,
            files_written: 0,
            bytes_written: 0,
        }
    }

    /// Sets up the streams for a freshly parsed volume.  When `continues` is
    /// set, the carried stream becomes folder 0.
    pub fn enter_volume(&mut self, num_folders: usize, continues: bool) {
        let carried = self.carried.take();
        self.streams = (0..num_folders).map(|_| FolderStream::new()).collect();
        if let (true, Some(mut stream)) = (continues, carried) {
            stream.enter_volume();
            if let Some(first) = self.streams.first_mut() {
                *first = stream;
            }
        }
        self.volumes_processed += 1;
    }

    /// Takes the last folder's stream so it can continue in the next
    /// volume.
    pub fn carry_last_folder(&mut self) {
        self.carried = self.streams.pop();
        self.streams.clear();
    }
}
