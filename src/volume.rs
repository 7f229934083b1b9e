use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Where extraction gets its volumes from.  All filesystem access of a run
/// goes through this trait, so the engine can be driven from memory.
pub trait VolumeSource {
    /// Returns true if the volume is present.
    fn exists(&self, volume: &Path) -> bool;

    /// Returns the size of the volume in bytes.
    fn volume_len(&mut self, volume: &Path) -> Result<u64>;

    /// Reads exactly `length` bytes starting at `offset`.
    fn read_range(
        &mut self,
        volume: &Path,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>>;

    /// Returns the path of the volume named `next_name` by `current`.  By
    /// default volumes of a set live side by side.
    fn resolve_next_volume(&self, current: &Path, next_name: &str) -> PathBuf {
        match current.parent() {
            Some(dir) => dir.join(next_name),
            None => PathBuf::from(next_name),
        }
    }

    /// Deletes a volume that is no longer needed.
    fn purge(&mut self, volume: &Path) -> Result<()>;

    /// Reads a whole volume into memory.
    fn read_volume(&mut self, volume: &Path) -> Result<Vec<u8>> {
        if !self.exists(volume) {
            return Err(Error::MissingVolume(volume.to_path_buf()));
        }
        let length = self.volume_len(volume)?;
        let length = match usize::try_from(length) {
            Ok(length) => length,
            Err(_) => corrupt_header!(
                "Volume {} is too large ({} bytes)",
                volume.display(),
                length
            ),
        };
        self.read_range(volume, 0, length)
    }
}

impl<V: VolumeSource + ?Sized> VolumeSource for &mut V {
    fn exists(&self, volume: &Path) -> bool {
        (**self).exists(volume)
    }

    fn volume_len(&mut self, volume: &Path) -> Result<u64> {
        (**self).volume_len(volume)
    }

    fn read_range(
        &mut self,
        volume: &Path,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>> {
        (**self).read_range(volume, offset, length)
    }

    fn resolve_next_volume(&self, current: &Path, next_name: &str) -> PathBuf {
        (**self).resolve_next_volume(current, next_name)
    }

    fn purge(&mut self, volume: &Path) -> Result<()> {
        (**self).purge(volume)
    }

    fn read_volume(&mut self, volume: &Path) -> Result<Vec<u8>> {
        (**self).read_volume(volume)
    }
}

/// Volumes stored as files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskVolumes;

impl DiskVolumes {
    /// Creates a source reading from the local filesystem.
    pub fn new() -> DiskVolumes {
        DiskVolumes
    }
}

impl VolumeSource for DiskVolumes {
    fn exists(&self, volume: &Path) -> bool {
        volume.is_file()
    }

    fn volume_len(&mut self, volume: &Path) -> Result<u64> {
        let metadata = fs::metadata(volume).map_err(|e| io_error(e, volume))?;
        Ok(metadata.len())
    }

    fn read_range(
        &mut self,
        volume: &Path,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>> {
        let mut file = File::open(volume).map_err(|e| io_error(e, volume))?;
        file.seek(SeekFrom::Start(offset)).map_err(|e| io_error(e, volume))?;
        let mut data = vec![0u8; length];
        file.read_exact(&mut data).map_err(|e| io_error(e, volume))?;
        Ok(data)
    }

    fn purge(&mut self, volume: &Path) -> Result<()> {
        tracing::debug!(path = %volume.display(), "purging volume");
        fs::remove_file(volume).map_err(|e| io_error(e, volume))
    }
}

/// Volumes held in memory, keyed by path.  Purged volumes are removed from
/// the map.
#[derive(Debug, Default, Clone)]
pub struct MemoryVolumes {
    volumes: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryVolumes {
    /// Creates an empty source.
    pub fn new() -> MemoryVolumes {
        MemoryVolumes { volumes: HashMap::new() }
    }

    /// Adds (or replaces) a volume.
    pub fn insert<P: Into<PathBuf>>(&mut self, path: P, data: Vec<u8>) {
        self.volumes.insert(path.into(), data);
    }

    /// Returns true if the volume is still held (i.e. was not purged).
    pub fn contains(&self, path: &Path) -> bool {
        self.volumes.contains_key(path)
    }

    /// Returns the number of volumes held.
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    /// Returns true if no volumes are held.
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

impl VolumeSource for MemoryVolumes {
    fn exists(&self, volume: &Path) -> bool {
        self.volumes.contains_key(volume)
    }

    fn volume_len(&mut self, volume: &Path) -> Result<u64> {
        match self.volumes.get(volume) {
            Some(data) => Ok(data.len() as u64),
            None => Err(Error::MissingVolume(volume.to_path_buf())),
        }
    }

    fn read_range(
        &mut self,
        volume: &Path,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>> {
        let data = match self.volumes.get(volume) {
            Some(data) => data,
            None => return Err(Error::MissingVolume(volume.to_path_buf())),
        };
        let start = offset as usize;
        match start.checked_add(length) {
            Some(end) if offset <= data.len() as u64 && end <= data.len() => {
                Ok(data[start..end].to_vec())
            }
            _ => Err(io_error(
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "Cannot read {} bytes at offset {} (volume is {} bytes)",
                        length,
                        offset,
                        data.len()
                    ),
                ),
                volume,
            )),
        }
    }

    fn purge(&mut self, volume: &Path) -> Result<()> {
        match self.volumes.remove(volume) {
            Some(_) => Ok(()),
            None => Err(Error::MissingVolume(volume.to_path_buf())),
        }
    }
}

pub(crate) fn io_error(error: io::Error, path: &Path) -> Error {
    Error::Io(error, path.to_path_buf())
}
