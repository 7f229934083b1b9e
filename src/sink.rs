use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::volume::io_error;

/// Receives each extracted file once its whole content has been decoded.
pub trait OutputSink {
    /// Stores `data` under the archive-relative, `/`-separated
    /// `relative_path`, replacing any earlier content.
    fn write(&mut self, relative_path: &str, data: &[u8]) -> Result<()>;
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn write(&mut self, relative_path: &str, data: &[u8]) -> Result<()> {
        (**self).write(relative_path, data)
    }
}

/// Writes files into a directory tree, creating intermediate directories as
/// needed.  Each file is written to a temporary sibling first and renamed
/// into place, so an interrupted run never leaves a truncated file behind.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Creates a sink writing under `root`.
    pub fn new<P: Into<PathBuf>>(root: P) -> DirectorySink {
        DirectorySink { root: root.into() }
    }

    /// Returns the directory files are written under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an archive-relative name onto a path under the root.
    pub fn host_path(&self, relative_path: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in relative_path.split('/') {
            let mut components = Path::new(part).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(name)), None) => path.push(name),
                _ => return Err(Error::UnsafePath(relative_path.to_string())),
            }
        }
        Ok(path)
    }
}

impl OutputSink for DirectorySink {
    fn write(&mut self, relative_path: &str, data: &[u8]) -> Result<()> {
        let path = self.host_path(relative_path)?;
        let parent = match path.parent() {
            Some(parent) => parent,
            None => return Err(Error::UnsafePath(relative_path.to_string())),
        };
        fs::create_dir_all(parent).map_err(|e| io_error(e, parent))?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| io_error(e, parent))?;
        temp.write_all(data).map_err(|e| io_error(e, temp.path()))?;
        temp.persist(&path).map_err(|e| io_error(e.error, &path))?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "wrote file");
        Ok(())
    }
}

/// Keeps extracted files in memory, keyed by archive-relative name.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> MemorySink {
        MemorySink { files: BTreeMap::new() }
    }

    /// Returns the content written for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Returns all files written so far, sorted by name.
    pub fn files(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.files
    }

    /// Consumes the sink, returning the files written.
    pub fn into_files(self) -> BTreeMap<String, Vec<u8>> {
        self.files
    }
}

impl OutputSink for MemorySink {
    fn write(&mut self, relative_path: &str, data: &[u8]) -> Result<()> {
        self.files.insert(relative_path.to_string(), data.to_vec());
        Ok(())
    }
}
