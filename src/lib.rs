//! Extraction of multi-volume [Windows
//! cabinet](https://en.wikipedia.org/wiki/Cabinet_(file_format)) (CAB) sets.
//!
//! A cabinet set is a chain of volumes, each naming the next one in its
//! header.  A folder's compressed stream may be split across the boundary
//! between two volumes, down to a single data block whose bytes are divided
//! between them.  The [`Extractor`] walks the chain from its first volume,
//! carries the MSZIP decoding state from one volume to the next and hands
//! every file to an [`OutputSink`] as soon as its bytes are complete.
//!
//! ```no_run
//! # fn main() -> multicab::Result<()> {
//! let summary = multicab::extract_to_dir("disk1.cab", "out", false)?;
//! println!("{} files from {} volumes", summary.files, summary.volumes);
//! # Ok(())
//! # }
//! ```
//!
//! Volumes are read through a [`VolumeSource`], so a run can just as well be
//! driven from memory:
//!
//! ```no_run
//! use multicab::{Extractor, MemorySink, MemoryVolumes};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut volumes = MemoryVolumes::new();
//! volumes.insert("disk1.cab", std::fs::read("disk1.cab")?);
//! let mut sink = MemorySink::new();
//! Extractor::new("disk1.cab", volumes, &mut sink)
//!     .on_progress(|p| println!("{} (volume {})", p.file_name, p.volumes_processed))
//!     .run()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

#[macro_use]
mod macros;

mod checksum;
mod consts;
mod ctype;
mod cursor;
mod datetime;
mod engine;
mod error;
mod header;
mod mszip;
mod sink;
mod state;
mod volume;

pub use crate::ctype::CompressionType;
pub use crate::engine::{
    extract_to_dir, CancellationToken, ExtractOptions, ExtractionSummary,
    Extractor, Progress,
};
pub use crate::error::{Error, Result};
pub use crate::header::{
    CabinetHeader, DataChunk, FileEntry, FolderEntry, FolderRef, ReserveSizes,
    VolumeLink,
};
pub use crate::mszip::MsZipDecompressor;
pub use crate::sink::{DirectorySink, MemorySink, OutputSink};
pub use crate::volume::{DiskVolumes, MemoryVolumes, VolumeSource};
