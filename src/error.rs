use std::io;
use std::path::PathBuf;

use crate::ctype::CompressionType;

/// Everything that can stop an extraction run.
///
/// None of these are retried; the engine surfaces the first one and stops.
/// Files written before the failure are left in place.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A cabinet header, folder table or file table is malformed or
    /// truncated.
    #[error("Corrupt cabinet header: {0}")]
    CorruptHeader(String),

    /// A folder uses a compression scheme other than MSZIP.
    #[error("Unsupported compression type {0:?} (only MSZIP folders can be extracted)")]
    UnsupportedCompression(CompressionType),

    /// A data block could not be decoded (bad signature, checksum, inflate
    /// error or size mismatch), or a folder ran out of data early.
    #[error("Corrupt folder data: {0}")]
    CorruptData(String),

    /// A file lies before data that has already been released from its
    /// folder's stream.
    #[error("Unsupported folder layout: {0}")]
    UnsupportedLayout(String),

    /// A volume named by the previous volume (or the first volume itself)
    /// does not exist.
    #[error("Cabinet volume not found. Path: '{}'", .0.display())]
    MissingVolume(PathBuf),

    /// An archived name would escape the output directory.
    #[error("Refusing to extract unsafe path: {0:?}")]
    UnsafePath(String),

    /// The run was stopped through its cancellation token.
    #[error("Extraction was cancelled")]
    Cancelled,

    /// Reading a volume or writing an output file failed.
    #[error("I/O failed. Path: '{}'", .1.display())]
    Io(#[source] io::Error, PathBuf),
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
