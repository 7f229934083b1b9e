use std::slice;

use time::PrimitiveDateTime;

use crate::consts;
use crate::ctype::CompressionType;
use crate::cursor::ByteCursor;
use crate::datetime::datetime_from_bits;
use crate::error::{Error, Result};

/// The parsed header, folder table and file table of one cabinet volume.
#[derive(Debug, Clone)]
pub struct CabinetHeader {
    reserved: [u32; 3],
    cabinet_size: u32,
    file_table_offset: u32,
    version_major: u8,
    version_minor: u8,
    flags: u16,
    cabinet_set_id: u16,
    cabinet_set_index: u16,
    reserve_sizes: Option<ReserveSizes>,
    reserve_data: Vec<u8>,
    previous_volume: Option<VolumeLink>,
    next_volume: Option<VolumeLink>,
    folders: Vec<FolderEntry>,
    files: Vec<FileEntry>,
}

/// Sizes of the application-defined reserve areas of a volume.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ReserveSizes {
    /// Bytes reserved in the volume header.
    pub header: u16,
    /// Bytes reserved after each folder entry.
    pub folder: u8,
    /// Bytes reserved in each data block header.
    pub data_block: u8,
}

/// A link from one volume to a neighbouring volume of the same set.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VolumeLink {
    cabinet_name: String,
    disk_label: String,
}

/// Metadata about one folder in a volume.
#[derive(Debug, Clone)]
pub struct FolderEntry {
    data_table_offset: u32,
    compression_type: CompressionType,
    reserve_data: Vec<u8>,
    chunks: Vec<DataChunk>,
}

/// One CFDATA block of a folder.
#[derive(Debug, Clone)]
pub struct DataChunk {
    pub(crate) checksum: u32,
    pub(crate) compressed_size: u16,
    pub(crate) uncompressed_size: u16,
    pub(crate) reserve_data: Vec<u8>,
    pub(crate) data_offset: usize,
}

/// The folder a file entry's data lives in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FolderRef {
    /// A folder of this volume, by index.
    Folder(u16),
    /// The file started in the previous volume; its data continues in this
    /// volume's first folder.
    ContinuedFromPrevious,
    /// The file continues into the next volume; its data lives in this
    /// volume's last folder.
    SpansAllFolders,
}

/// Metadata about one file stored in a volume.
#[derive(Debug, Clone)]
pub struct FileEntry {
    name: String,
    datetime: Option<PrimitiveDateTime>,
    attributes: u16,
    pub(crate) uncompressed_size: u32,
    pub(crate) logical_offset: u32,
    pub(crate) folder: FolderRef,
}

impl CabinetHeader {
    /// Parses a whole volume.  Fails with [`Error::CorruptHeader`] if any
    /// table runs past the end of `volume`, and with
    /// [`Error::UnsupportedCompression`] if a folder isn't MSZIP.
    pub fn parse(volume: &[u8]) -> Result<CabinetHeader> {
        let mut cursor = ByteCursor::new(volume);
        let signature = cursor.read_u32()?;
        if signature != consts::FILE_SIGNATURE {
            corrupt_header!("Not a cabinet file (invalid file signature)");
        }
        let reserved1 = cursor.read_u32()?;
        let cabinet_size = cursor.read_u32()?;
        let reserved2 = cursor.read_u32()?;
        let file_table_offset = cursor.read_u32()?;
        let reserved3 = cursor.read_u32()?;
        let version_minor = cursor.read_u8()?;
        let version_major = cursor.read_u8()?;
        let num_folders = cursor.read_u16()? as usize;
        let num_files = cursor.read_u16()? as usize;
        let flags = cursor.read_u16()?;
        let cabinet_set_id = cursor.read_u16()?;
        let cabinet_set_index = cursor.read_u16()?;
        let reserve_sizes = if (flags & consts::FLAG_RESERVE_PRESENT) != 0 {
            Some(ReserveSizes {
                header: cursor.read_u16()?,
                folder: cursor.read_u8()?,
                data_block: cursor.read_u8()?,
            })
        } else {
            None
        };
        let sizes = reserve_sizes.unwrap_or_default();
        let reserve_data = cursor.take(sizes.header as usize)?.to_vec();
        let previous_volume = if (flags & consts::FLAG_PREV_CABINET) != 0 {
            Some(VolumeLink::parse(&mut cursor)?)
        } else {
            None
        };
        let next_volume = if (flags & consts::FLAG_NEXT_CABINET) != 0 {
            Some(VolumeLink::parse(&mut cursor)?)
        } else {
            None
        };
        let mut folders = Vec::with_capacity(num_folders);
        for _ in 0..num_folders {
            folders.push(FolderEntry::parse(&mut cursor, sizes)?);
        }
        cursor.seek(file_table_offset as usize)?;
        let mut files = Vec::with_capacity(num_files);
        for _ in 0..num_files {
            let entry = FileEntry::parse(&mut cursor)?;
            if let FolderRef::Folder(index) = entry.folder {
                if index as usize >= num_folders {
                    corrupt_header!(
                        "File {:?} refers to folder {} (volume has {} folders)",
                        entry.name,
                        index,
                        num_folders
                    );
                }
            } else if num_folders == 0 {
                corrupt_header!(
                    "File {:?} continues across volumes, but this volume \
                     has no folders",
                    entry.name
                );
            }
            files.push(entry);
        }
        tracing::debug!(
            set_id = cabinet_set_id,
            index = cabinet_set_index,
            folders = num_folders,
            files = num_files,
            next = next_volume.as_ref().map(VolumeLink::cabinet_name),
            "parsed cabinet header"
        );
        Ok(CabinetHeader {
            reserved: [reserved1, reserved2, reserved3],
            cabinet_size,
            file_table_offset,
            version_major,
            version_minor,
            flags,
            cabinet_set_id,
            cabinet_set_index,
            reserve_sizes,
            reserve_data,
            previous_volume,
            next_volume,
            folders,
            files,
        })
    }

    /// Returns the three reserved header fields, which carry no meaning.
    pub fn reserved_fields(&self) -> [u32; 3] {
        self.reserved
    }

    /// Returns the total size of the volume, as recorded in its header.
    pub fn cabinet_size(&self) -> u32 {
        self.cabinet_size
    }

    /// Returns the byte offset of the file table within the volume.
    pub fn file_table_offset(&self) -> u32 {
        self.file_table_offset
    }

    /// Returns the format version as `(major, minor)`.
    pub fn version(&self) -> (u8, u8) {
        (self.version_major, self.version_minor)
    }

    /// Returns the raw header flags.
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Returns the set ID shared by every volume of one chain.
    pub fn cabinet_set_id(&self) -> u16 {
        self.cabinet_set_id
    }

    /// Returns the zero-based position of this volume in its chain.
    pub fn cabinet_set_index(&self) -> u16 {
        self.cabinet_set_index
    }

    /// Returns the reserve area sizes, if the volume declares any.
    pub fn reserve_sizes(&self) -> Option<ReserveSizes> {
        self.reserve_sizes
    }

    /// Returns the application-defined reserve data stored in the header.
    pub fn reserve_data(&self) -> &[u8] {
        &self.reserve_data
    }

    /// Returns the link to the previous volume of the set, if any.
    pub fn previous_volume(&self) -> Option<&VolumeLink> {
        self.previous_volume.as_ref()
    }

    /// Returns the link to the next volume of the set, if any.  Extraction
    /// follows this link until a volume without one is reached.
    pub fn next_volume(&self) -> Option<&VolumeLink> {
        self.next_volume.as_ref()
    }

    /// Returns the folder entries of this volume.
    pub fn folders(&self) -> &[FolderEntry] {
        &self.folders
    }

    /// Returns an iterator over the file entries, in file table order.
    pub fn file_entries(&self) -> slice::Iter<'_, FileEntry> {
        self.files.iter()
    }

    pub(crate) fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Maps a file's folder reference onto a folder index of this volume.
    pub fn resolve_folder(&self, folder: FolderRef) -> usize {
        match folder {
            FolderRef::Folder(index) => index as usize,
            FolderRef::ContinuedFromPrevious => 0,
            FolderRef::SpansAllFolders => self.folders.len().saturating_sub(1),
        }
    }
}

impl VolumeLink {
    fn parse(cursor: &mut ByteCursor<'_>) -> Result<VolumeLink> {
        let cabinet_name = cursor.read_string(false)?;
        let disk_label = cursor.read_string(false)?;
        Ok(VolumeLink { cabinet_name, disk_label })
    }

    /// Returns the file name of the linked volume.
    pub fn cabinet_name(&self) -> &str {
        &self.cabinet_name
    }

    /// Returns the label of the disk the linked volume was shipped on.
    pub fn disk_label(&self) -> &str {
        &self.disk_label
    }
}

impl FolderEntry {
    fn parse(
        cursor: &mut ByteCursor<'_>,
        sizes: ReserveSizes,
    ) -> Result<FolderEntry> {
        let data_table_offset = cursor.read_u32()?;
        let num_chunks = cursor.read_u16()? as usize;
        let compression_bits = cursor.read_u16()?;
        let compression_type = CompressionType::from_bitfield(compression_bits)?;
        if compression_type != CompressionType::MsZip {
            return Err(Error::UnsupportedCompression(compression_type));
        }
        let reserve_data = cursor.take(sizes.folder as usize)?.to_vec();

        let resume_at = cursor.position();
        cursor.seek(data_table_offset as usize)?;
        let mut chunks = Vec::with_capacity(num_chunks);
        for _ in 0..num_chunks {
            chunks.push(DataChunk::parse(cursor, sizes.data_block)?);
        }
        cursor.seek(resume_at)?;

        Ok(FolderEntry {
            data_table_offset,
            compression_type,
            reserve_data,
            chunks,
        })
    }

    /// Returns the offset of this folder's first data block header.
    pub fn data_table_offset(&self) -> u32 {
        self.data_table_offset
    }

    /// Returns the scheme used to compress this folder's data.
    pub fn compression_type(&self) -> CompressionType {
        self.compression_type
    }

    /// Returns the number of data blocks stored for this folder in this
    /// volume.
    pub fn num_data_blocks(&self) -> usize {
        self.chunks.len()
    }

    /// Returns the application-defined reserve data for this folder.
    pub fn reserve_data(&self) -> &[u8] {
        &self.reserve_data
    }

    /// Returns this folder's data blocks, in stream order.
    pub fn chunks(&self) -> &[DataChunk] {
        &self.chunks
    }
}

impl DataChunk {
    fn parse(cursor: &mut ByteCursor<'_>, reserve_size: u8) -> Result<DataChunk> {
        let checksum = cursor.read_u32()?;
        let compressed_size = cursor.read_u16()?;
        let uncompressed_size = cursor.read_u16()?;
        let reserve_data = cursor.take(reserve_size as usize)?.to_vec();
        let data_offset = cursor.position();
        cursor.skip(compressed_size as usize)?;
        Ok(DataChunk {
            checksum,
            compressed_size,
            uncompressed_size,
            reserve_data,
            data_offset,
        })
    }

    /// Returns the number of compressed bytes in this block.
    pub fn compressed_size(&self) -> u16 {
        self.compressed_size
    }

    /// Returns the number of bytes this block decompresses to.  Zero marks a
    /// block whose compressed bytes continue in the next volume.
    pub fn uncompressed_size(&self) -> u16 {
        self.uncompressed_size
    }

    /// Returns true if this block's compressed bytes are only the first part
    /// of a block completed by the next volume.
    pub fn continues_in_next_volume(&self) -> bool {
        self.uncompressed_size == 0
    }

    /// Returns the absolute offset of the compressed bytes in the volume.
    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// Returns the checksum stored for this block (zero if none).
    pub fn checksum(&self) -> u32 {
        self.checksum
    }
}

impl FolderRef {
    fn from_raw(raw: u16) -> FolderRef {
        match raw {
            consts::IFOLD_CONTINUED_FROM_PREV
            | consts::IFOLD_CONTINUED_PREV_AND_NEXT => {
                FolderRef::ContinuedFromPrevious
            }
            consts::IFOLD_CONTINUED_TO_NEXT => FolderRef::SpansAllFolders,
            index => FolderRef::Folder(index),
        }
    }
}

impl FileEntry {
    fn parse(cursor: &mut ByteCursor<'_>) -> Result<FileEntry> {
        let uncompressed_size = cursor.read_u32()?;
        let logical_offset = cursor.read_u32()?;
        let folder = FolderRef::from_raw(cursor.read_u16()?);
        let date = cursor.read_u16()?;
        let time = cursor.read_u16()?;
        let attributes = cursor.read_u16()?;
        let is_utf8 = (attributes & consts::ATTR_NAME_IS_UTF) != 0;
        let name = cursor.read_string(is_utf8)?.replace('\\', "/");
        Ok(FileEntry {
            name,
            datetime: datetime_from_bits(date, time),
            attributes,
            uncompressed_size,
            logical_offset,
            folder,
        })
    }

    /// Returns the archive-relative name of the file, with `/` separators.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Modification time, or `None` when the stored MS-DOS bits do not
    /// form a valid date and time.
    pub fn datetime(&self) -> Option<PrimitiveDateTime> {
        self.datetime
    }

    /// Size of the extracted file in bytes.
    pub fn uncompressed_size(&self) -> u32 {
        self.uncompressed_size
    }

    /// Returns the offset of this file within its folder's decompressed
    /// stream.
    pub fn logical_offset(&self) -> u32 {
        self.logical_offset
    }

    /// Returns the folder this file's data lives in.
    pub fn folder(&self) -> FolderRef {
        self.folder
    }

    /// Read-only attribute bit.
    pub fn is_read_only(&self) -> bool {
        (self.attributes & consts::ATTR_READ_ONLY) != 0
    }

    /// Hidden attribute bit.
    pub fn is_hidden(&self) -> bool {
        (self.attributes & consts::ATTR_HIDDEN) != 0
    }

    /// System attribute bit.
    pub fn is_system(&self) -> bool {
        (self.attributes & consts::ATTR_SYSTEM) != 0
    }

    /// Archive attribute bit, set when the file changed since its last
    /// backup.
    pub fn is_archive(&self) -> bool {
        (self.attributes & consts::ATTR_ARCH) != 0
    }

    /// Whether the installer should run this file once it is extracted.
    pub fn is_exec(&self) -> bool {
        (self.attributes & consts::ATTR_EXEC) != 0
    }

    /// Whether the stored name is UTF-8 rather than Latin-1.
    pub fn is_name_utf(&self) -> bool {
        (self.attributes & consts::ATTR_NAME_IS_UTF) != 0
    }
}
