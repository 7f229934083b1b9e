use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::header::{CabinetHeader, FolderRef};
use crate::sink::{DirectorySink, OutputSink};
use crate::state::{BlockChecks, ExtractionState, Fill};
use crate::volume::{DiskVolumes, VolumeSource};

/// Settings for one extraction run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExtractOptions {
    /// Delete each volume once the engine has moved past it.  This bounds
    /// the disk space a long volume set needs while it is being unpacked.
    pub purge: bool,
    /// Check the stored checksum of every data block that has one.
    pub verify_checksums: bool,
    /// Inflate MSZIP blocks whose "CK" signature is wrong instead of
    /// failing (a warning is logged for each one).
    pub lenient_signature: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            purge: false,
            verify_checksums: true,
            lenient_signature: false,
        }
    }
}

/// Reported once for every file written.
#[derive(Clone, Copy, Debug)]
pub struct Progress<'a> {
    /// Volumes opened so far, including the current one.
    pub volumes_processed: usize,
    /// The volume the file's last bytes came from.
    pub volume_path: &'a Path,
    /// Archive-relative name of the file just written.
    pub file_name: &'a str,
}

/// Totals of a finished run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExtractionSummary {
    /// Volumes opened.
    pub volumes: usize,
    /// Files written.
    pub files: usize,
    /// Decompressed bytes written.
    pub bytes: u64,
}

/// A flag that stops a run between two steps.  Clones share the flag, so
/// one can be handed to another thread.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    /// Requests that every run holding this token stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once `cancel` has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct OpenVolume {
    path: PathBuf,
    bytes: Vec<u8>,
    header: CabinetHeader,
}

enum Phase {
    ParsingVolume(PathBuf),
    EmittingFile(OpenVolume, usize),
    AdvancingVolume(OpenVolume),
    Done,
}

enum Emitted {
    Written,
    Skipped,
    NeedsNextVolume,
    EndOfVolume,
}

/// Extracts every file of a volume chain, starting at its first volume and
/// following each volume's next-cabinet link.
///
/// The run is a loop over explicit phases (parse a volume, emit its files
/// one by one, advance to the next volume), so arbitrarily long chains use
/// constant stack.  Nothing is shared between runs.
pub struct Extractor<'a, V, S> {
    first_volume: PathBuf,
    source: V,
    sink: S,
    options: ExtractOptions,
    progress: Option<Box<dyn FnMut(&Progress<'_>) + 'a>>,
    cancellation: CancellationToken,
}

impl<'a, V: VolumeSource, S: OutputSink> Extractor<'a, V, S> {
    /// Creates an extractor with default options.
    pub fn new<P: Into<PathBuf>>(
        first_volume: P,
        source: V,
        sink: S,
    ) -> Extractor<'a, V, S> {
        Extractor {
            first_volume: first_volume.into(),
            source,
            sink,
            options: ExtractOptions::default(),
            progress: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Replaces the run's options.
    pub fn options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets a callback invoked after every file written.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&Progress<'_>) + 'a,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Makes the run stop with [`Error::Cancelled`] once `token` is
    /// cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Runs the extraction and hands the outcome to `on_complete`, which is
    /// called exactly once.
    pub fn run_with_completion<F>(self, on_complete: F)
    where
        F: FnOnce(Result<ExtractionSummary>),
    {
        on_complete(self.run())
    }

    /// Runs the extraction to the end of the chain.  The first error stops
    /// the run; files written before it stay on disk.
    pub fn run(mut self) -> Result<ExtractionSummary> {
        let mut state = ExtractionState::new();
        let mut phase = Phase::ParsingVolume(self.first_volume.clone());
        loop {
            if self.cancellation.is_cancelled() {
                tracing::warn!(
                    volumes = state.volumes_processed,
                    files = state.files_written,
                    "extraction cancelled"
                );
                return Err(Error::Cancelled);
            }
            phase = match phase {
                Phase::ParsingVolume(path) => {
                    let volume = self.open_volume(path, &mut state)?;
                    Phase::EmittingFile(volume, 0)
                }
                Phase::EmittingFile(volume, index) => {
                    match self.emit_file(&volume, &mut state, index)? {
                        Emitted::Written | Emitted::Skipped => {
                            Phase::EmittingFile(volume, index + 1)
                        }
                        Emitted::NeedsNextVolume | Emitted::EndOfVolume => {
                            Phase::AdvancingVolume(volume)
                        }
                    }
                }
                Phase::AdvancingVolume(volume) => {
                    self.advance(volume, &mut state)?
                }
                Phase::Done => break,
            };
        }
        let summary = ExtractionSummary {
            volumes: state.volumes_processed,
            files: state.files_written,
            bytes: state.bytes_written,
        };
        tracing::info!(
            volumes = summary.volumes,
            files = summary.files,
            bytes = summary.bytes,
            "extraction finished"
        );
        Ok(summary)
    }

    fn checks(&self) -> BlockChecks {
        BlockChecks {
            verify_checksums: self.options.verify_checksums,
            strict_signature: !self.options.lenient_signature,
        }
    }

    fn open_volume(
        &mut self,
        path: PathBuf,
        state: &mut ExtractionState,
    ) -> Result<OpenVolume> {
        state.visited.insert(path.clone());
        let bytes = self.source.read_volume(&path)?;
        let header = CabinetHeader::parse(&bytes)?;
        let has_tail = state
            .carried
            .as_ref()
            .map_or(false, |stream| stream.has_pending_tail());
        let continues = has_tail
            || header
                .files()
                .iter()
                .any(|file| file.folder == FolderRef::ContinuedFromPrevious)
            || state
                .carried
                .as_ref()
                .map_or(false, |stream| picks_up_at(&header, stream.produced()));
        if has_tail && header.folders().is_empty() {
            corrupt_data!(
                "Volume {} has no folder to finish the previous volume's \
                 split data block",
                path.display()
            );
        }
        if !continues && state.carried.is_some() {
            tracing::debug!("previous volume's last folder does not continue");
        }
        state.enter_volume(header.folders().len(), continues);
        tracing::info!(
            path = %path.display(),
            volume = state.volumes_processed,
            folders = header.folders().len(),
            files = header.files().len(),
            continues,
            "opened volume"
        );
        Ok(OpenVolume { path, bytes, header })
    }

    fn emit_file(
        &mut self,
        volume: &OpenVolume,
        state: &mut ExtractionState,
        index: usize,
    ) -> Result<Emitted> {
        let header = &volume.header;
        let file = match header.files().get(index) {
            Some(file) => file,
            None => return Ok(Emitted::EndOfVolume),
        };
        let folder_index = header.resolve_folder(file.folder);
        let folder = &header.folders()[folder_index];
        let stream = &mut state.streams[folder_index];
        let start = file.logical_offset as u64;
        let size = file.uncompressed_size as usize;
        let end = start + size as u64;

        if start < stream.window_start() {
            if file.folder == FolderRef::ContinuedFromPrevious
                && end <= stream.window_start()
            {
                tracing::debug!(
                    name = file.name(),
                    "file was completed from the previous volume; skipping"
                );
                return Ok(Emitted::Skipped);
            }
            unsupported_layout!(
                "File {:?} starts at offset {} of folder {}, but the folder \
                 stream has already moved past offset {}",
                file.name(),
                start,
                folder_index,
                stream.window_start()
            );
        }
        if start > stream.produced() {
            tracing::debug!(
                name = file.name(),
                gap = start - stream.produced(),
                "decoding past a gap in the folder"
            );
        }
        stream.release_until(start);
        match stream.fill(folder, &volume.bytes, end, self.checks())? {
            Fill::Ready => {}
            Fill::VolumeExhausted if header.next_volume().is_some() => {
                tracing::debug!(
                    name = file.name(),
                    folder = folder_index,
                    blocks = stream.chunks_consumed(),
                    "file continues in the next volume"
                );
                return Ok(Emitted::NeedsNextVolume);
            }
            Fill::VolumeExhausted => corrupt_data!(
                "Folder {} ends at offset {}, but {:?} needs data up to \
                 offset {}",
                folder_index,
                stream.produced(),
                file.name(),
                end
            ),
        }
        stream.release_until(start);
        self.sink.write(file.name(), stream.slice(start, size))?;
        stream.release_until(end);

        state.files_written += 1;
        state.bytes_written += size as u64;
        tracing::debug!(name = file.name(), bytes = size, "extracted file");
        if let Some(callback) = self.progress.as_mut() {
            callback(&Progress {
                volumes_processed: state.volumes_processed,
                volume_path: &volume.path,
                file_name: file.name(),
            });
        }
        Ok(Emitted::Written)
    }

    fn advance(
        &mut self,
        volume: OpenVolume,
        state: &mut ExtractionState,
    ) -> Result<Phase> {
        let next_name = match volume.header.next_volume() {
            Some(link) => link.cabinet_name().to_string(),
            None => {
                if self.options.purge {
                    self.source.purge(&volume.path)?;
                }
                return Ok(Phase::Done);
            }
        };
        // Decode whatever this volume still holds for its last folder, so a
        // split block's head is captured before the volume goes away.
        if let (Some(folder), Some(stream)) =
            (volume.header.folders().last(), state.streams.last_mut())
        {
            stream.fill(folder, &volume.bytes, u64::MAX, self.checks())?;
        }
        state.carry_last_folder();
        let next_path =
            self.source.resolve_next_volume(&volume.path, &next_name);
        if state.visited.contains(&next_path) {
            corrupt_header!(
                "Volume chain loops: {} links back to {}",
                volume.path.display(),
                next_path.display()
            );
        }
        if !self.source.exists(&next_path) {
            return Err(Error::MissingVolume(next_path));
        }
        if self.options.purge {
            self.source.purge(&volume.path)?;
        }
        tracing::debug!(
            from = %volume.path.display(),
            to = %next_path.display(),
            "advancing to next volume"
        );
        Ok(Phase::ParsingVolume(next_path))
    }
}

impl<'a, V, S> fmt::Debug for Extractor<'a, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("first_volume", &self.first_volume)
            .field("options", &self.options)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

// True when the volume's folder 0 lists files no earlier than `produced`,
// the decoded length of the previous volume's last folder.  A folder that
// starts in this volume lists its first file at offset 0.
fn picks_up_at(header: &CabinetHeader, produced: u64) -> bool {
    if produced == 0 {
        return false;
    }
    header
        .files()
        .iter()
        .filter(|file| file.folder == FolderRef::Folder(0))
        .map(|file| file.logical_offset as u64)
        .min()
        .map_or(false, |first| first >= produced)
}

/// Extracts the chain starting at `first_volume` into `destination`,
/// reading volumes from disk.  With `purge` set, each volume is deleted once
/// it has been consumed.
pub fn extract_to_dir<P, Q>(
    first_volume: P,
    destination: Q,
    purge: bool,
) -> Result<ExtractionSummary>
where
    P: Into<PathBuf>,
    Q: Into<PathBuf>,
{
    let options = ExtractOptions { purge, ..ExtractOptions::default() };
    Extractor::new(first_volume, DiskVolumes::new(), DirectorySink::new(destination))
        .options(options)
        .run()
}
