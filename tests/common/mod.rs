#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use multicab::MemoryVolumes;

pub const SET_ID: u16 = 0x1234;

/// Fixed MS-DOS date/time for every entry (2019-01-02 12:00:00).
const DOS_DATE: u16 = 0x4e22;
const DOS_TIME: u16 = 0x6000;
const ATTR_ARCH: u16 = 0x20;

/// Where a set is cut into volumes: before global data block `block`.  With
/// `head` set, that block is split and its first `head` compressed bytes
/// stay in the earlier volume.
#[derive(Clone, Copy, Debug)]
pub struct Cut {
    pub block: usize,
    pub head: Option<usize>,
}

impl Cut {
    pub fn at(block: usize) -> Cut {
        Cut { block, head: None }
    }

    pub fn split(block: usize, head: usize) -> Cut {
        Cut { block, head: Some(head) }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Reserve {
    pub header: u16,
    pub folder: u8,
    pub data_block: u8,
}

struct FixtureFile {
    name: String,
    data: Vec<u8>,
    listed: bool,
}

struct Chunk {
    folder: usize,
    payload: Vec<u8>,
    uncompressed: usize,
}

/// Writes cabinet volume sets with MSZIP folders.
pub struct SetBuilder {
    base_name: String,
    folders: Vec<Vec<FixtureFile>>,
    block_size: usize,
    cuts: Vec<Cut>,
    reserve: Option<Reserve>,
    checksums: bool,
    reverse_file_table: bool,
}

impl SetBuilder {
    pub fn new(base_name: &str) -> SetBuilder {
        SetBuilder {
            base_name: base_name.to_string(),
            folders: Vec::new(),
            block_size: 0x8000,
            cuts: Vec::new(),
            reserve: None,
            checksums: true,
            reverse_file_table: false,
        }
    }

    pub fn folder(mut self) -> SetBuilder {
        self.folders.push(Vec::new());
        self
    }

    /// Adds a file to the last folder.
    pub fn file(self, name: &str, data: &[u8]) -> SetBuilder {
        self.push_file(name, data, true)
    }

    /// Adds data to the last folder's stream without a file entry.
    pub fn unlisted(self, name: &str, data: &[u8]) -> SetBuilder {
        self.push_file(name, data, false)
    }

    fn push_file(mut self, name: &str, data: &[u8], listed: bool) -> SetBuilder {
        if self.folders.is_empty() {
            self.folders.push(Vec::new());
        }
        if let Some(folder) = self.folders.last_mut() {
            folder.push(FixtureFile {
                name: name.to_string(),
                data: data.to_vec(),
                listed,
            });
        }
        self
    }

    pub fn block_size(mut self, size: usize) -> SetBuilder {
        self.block_size = size;
        self
    }

    pub fn cut(mut self, cut: Cut) -> SetBuilder {
        self.cuts.push(cut);
        self
    }

    pub fn reserve(mut self, reserve: Reserve) -> SetBuilder {
        self.reserve = Some(reserve);
        self
    }

    pub fn without_checksums(mut self) -> SetBuilder {
        self.checksums = false;
        self
    }

    pub fn reverse_file_table(mut self) -> SetBuilder {
        self.reverse_file_table = true;
        self
    }

    pub fn volume_name(&self, index: usize) -> String {
        format!("{}{}.cab", self.base_name, index + 1)
    }

    /// Returns `(name, bytes)` for every volume, in chain order.
    pub fn build(&self) -> Vec<(String, Vec<u8>)> {
        let volumes = self.distribute_chunks();
        let num_volumes = volumes.len();
        // Uncompressed bytes of each folder held by earlier volumes.
        let mut folder_done = vec![0usize; self.folders.len()];
        let mut output = Vec::with_capacity(num_volumes);
        for (index, chunks) in volumes.iter().enumerate() {
            let mut present: Vec<usize> = Vec::new();
            for chunk in chunks {
                if present.last() != Some(&chunk.folder) {
                    present.push(chunk.folder);
                }
            }
            let mut entries = Vec::new();
            for (local, &folder) in present.iter().enumerate() {
                let start_of_volume = folder_done[folder];
                let held: usize = chunks
                    .iter()
                    .filter(|chunk| chunk.folder == folder)
                    .map(|chunk| chunk.uncompressed)
                    .sum();
                let end_of_volume = start_of_volume + held;
                let continues_later = volumes[index + 1..]
                    .iter()
                    .any(|later| later.iter().any(|c| c.folder == folder));
                let mut offset = 0;
                for file in &self.folders[folder] {
                    let start = offset;
                    let end = start + file.data.len();
                    offset = end;
                    if !file.listed {
                        continue;
                    }
                    let included = if file.data.is_empty() {
                        start >= start_of_volume
                            && (start < end_of_volume || !continues_later)
                    } else {
                        start < end_of_volume && end > start_of_volume
                    };
                    if !included {
                        continue;
                    }
                    let before = start < start_of_volume;
                    let after = end > end_of_volume;
                    let ifolder = match (before, after) {
                        (false, false) => local as u16,
                        (true, false) => 0xfffd,
                        (false, true) => 0xfffe,
                        (true, true) => 0xffff,
                    };
                    entries.push((file, start as u32, ifolder));
                }
                folder_done[folder] = end_of_volume;
            }
            if self.reverse_file_table {
                entries.reverse();
            }
            output.push((
                self.volume_name(index),
                self.write_volume(index, num_volumes, chunks, &present, &entries),
            ));
        }
        output
    }

    /// Builds the set and loads it into a memory source.
    pub fn build_source(&self) -> MemoryVolumes {
        let mut source = MemoryVolumes::new();
        for (name, bytes) in self.build() {
            source.insert(name, bytes);
        }
        source
    }

    fn distribute_chunks(&self) -> Vec<Vec<Chunk>> {
        let mut blocks = Vec::new();
        for (folder, files) in self.folders.iter().enumerate() {
            let stream: Vec<u8> =
                files.iter().flat_map(|file| file.data.iter().copied()).collect();
            for (uncompressed, payload) in compress_blocks(&stream, self.block_size)
            {
                blocks.push(Chunk { folder, payload, uncompressed });
            }
        }
        let mut cuts = self.cuts.clone();
        cuts.sort_by_key(|cut| cut.block);
        let mut cuts = cuts.into_iter().peekable();
        let mut volumes = vec![Vec::new()];
        for (index, block) in blocks.into_iter().enumerate() {
            match cuts.next_if(|cut| cut.block == index) {
                Some(Cut { head: Some(head), .. }) => {
                    let (first, rest) = block.payload.split_at(head);
                    push_chunk(&mut volumes, Chunk {
                        folder: block.folder,
                        payload: first.to_vec(),
                        uncompressed: 0,
                    });
                    volumes.push(Vec::new());
                    push_chunk(&mut volumes, Chunk {
                        folder: block.folder,
                        payload: rest.to_vec(),
                        uncompressed: block.uncompressed,
                    });
                }
                Some(Cut { head: None, .. }) => {
                    volumes.push(Vec::new());
                    push_chunk(&mut volumes, block);
                }
                None => push_chunk(&mut volumes, block),
            }
        }
        volumes
    }

    fn write_volume(
        &self,
        index: usize,
        num_volumes: usize,
        chunks: &[Chunk],
        present: &[usize],
        entries: &[(&FixtureFile, u32, u16)],
    ) -> Vec<u8> {
        let previous = if index > 0 {
            Some(self.volume_name(index - 1))
        } else {
            None
        };
        let next = if index + 1 < num_volumes {
            Some(self.volume_name(index + 1))
        } else {
            None
        };
        let reserve = self.reserve;
        let mut flags = 0u16;
        let mut header_len = 36;
        if let Some(reserve) = reserve {
            flags |= 0x4;
            header_len += 4 + reserve.header as usize;
        }
        if let Some(name) = &previous {
            flags |= 0x1;
            header_len += link_len(name, index);
        }
        if let Some(name) = &next {
            flags |= 0x2;
            header_len += link_len(name, index + 2);
        }
        let folder_reserve = reserve.map_or(0, |r| r.folder as usize);
        let data_reserve = reserve.map_or(0, |r| r.data_block as usize);
        let file_table_offset = header_len + present.len() * (8 + folder_reserve);
        let file_table_len: usize =
            entries.iter().map(|(file, _, _)| 17 + file.name.len()).sum();
        let data_start = file_table_offset + file_table_len;
        let data_len: usize = chunks
            .iter()
            .map(|chunk| 8 + data_reserve + chunk.payload.len())
            .sum();
        let total = data_start + data_len;

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"MSCF");
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(total as u32).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(file_table_offset as u32).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u8(3).unwrap();
        out.write_u8(1).unwrap();
        out.write_u16::<LittleEndian>(present.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(entries.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(flags).unwrap();
        out.write_u16::<LittleEndian>(SET_ID).unwrap();
        out.write_u16::<LittleEndian>(index as u16).unwrap();
        if let Some(reserve) = reserve {
            out.write_u16::<LittleEndian>(reserve.header).unwrap();
            out.write_u8(reserve.folder).unwrap();
            out.write_u8(reserve.data_block).unwrap();
            out.extend(std::iter::repeat(0xa5).take(reserve.header as usize));
        }
        if let Some(name) = &previous {
            write_link(&mut out, name, index);
        }
        if let Some(name) = &next {
            write_link(&mut out, name, index + 2);
        }

        let mut block_offset = data_start;
        for &folder in present {
            let folder_chunks: Vec<&Chunk> =
                chunks.iter().filter(|chunk| chunk.folder == folder).collect();
            out.write_u32::<LittleEndian>(block_offset as u32).unwrap();
            out.write_u16::<LittleEndian>(folder_chunks.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(1).unwrap();
            out.extend(std::iter::repeat(0x5a).take(folder_reserve));
            block_offset += folder_chunks
                .iter()
                .map(|chunk| 8 + data_reserve + chunk.payload.len())
                .sum::<usize>();
        }
        assert_eq!(out.len(), file_table_offset);

        for (file, offset, ifolder) in entries {
            out.write_u32::<LittleEndian>(file.data.len() as u32).unwrap();
            out.write_u32::<LittleEndian>(*offset).unwrap();
            out.write_u16::<LittleEndian>(*ifolder).unwrap();
            out.write_u16::<LittleEndian>(DOS_DATE).unwrap();
            out.write_u16::<LittleEndian>(DOS_TIME).unwrap();
            out.write_u16::<LittleEndian>(ATTR_ARCH).unwrap();
            out.extend_from_slice(file.name.as_bytes());
            out.push(0);
        }
        assert_eq!(out.len(), data_start);

        let reserve_bytes = vec![0x3c; data_reserve];
        for chunk in chunks {
            let compressed = chunk.payload.len() as u16;
            let uncompressed = chunk.uncompressed as u16;
            let checksum = if self.checksums {
                checksum(&reserve_bytes, &chunk.payload, compressed, uncompressed)
            } else {
                0
            };
            out.write_u32::<LittleEndian>(checksum).unwrap();
            out.write_u16::<LittleEndian>(compressed).unwrap();
            out.write_u16::<LittleEndian>(uncompressed).unwrap();
            out.extend_from_slice(&reserve_bytes);
            out.extend_from_slice(&chunk.payload);
        }
        assert_eq!(out.len(), total);
        out
    }
}

/// A volume with no folders or files whose header links on to `next`.
pub fn empty_linked_volume(index: u16, next: &str) -> Vec<u8> {
    let total = 36 + link_len(next, index as usize + 2);
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"MSCF");
    out.write_u32::<LittleEndian>(0).unwrap();
    out.write_u32::<LittleEndian>(total as u32).unwrap();
    out.write_u32::<LittleEndian>(0).unwrap();
    out.write_u32::<LittleEndian>(total as u32).unwrap();
    out.write_u32::<LittleEndian>(0).unwrap();
    out.write_u8(3).unwrap();
    out.write_u8(1).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u16::<LittleEndian>(0x2).unwrap();
    out.write_u16::<LittleEndian>(SET_ID).unwrap();
    out.write_u16::<LittleEndian>(index).unwrap();
    write_link(&mut out, next, index as usize + 2);
    assert_eq!(out.len(), total);
    out
}

fn push_chunk(volumes: &mut Vec<Vec<Chunk>>, chunk: Chunk) {
    if let Some(volume) = volumes.last_mut() {
        volume.push(chunk);
    }
}

fn disk_label(number: usize) -> String {
    format!("Disk {}", number)
}

fn link_len(name: &str, disk: usize) -> usize {
    name.len() + 1 + disk_label(disk).len() + 1
}

fn write_link(out: &mut Vec<u8>, name: &str, disk: usize) {
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    out.extend_from_slice(disk_label(disk).as_bytes());
    out.push(0);
}

/// Compresses `data` into MSZIP blocks of at most `block_size` input bytes
/// each.  One compressor is shared by all blocks, so later blocks refer back
/// into earlier ones.
pub fn compress_blocks(data: &[u8], block_size: usize) -> Vec<(usize, Vec<u8>)> {
    let mut compressor = flate2::Compress::new(Compression::best(), false);
    let mut blocks = Vec::new();
    let mut slices = data.chunks(block_size).peekable();
    while let Some(slice) = slices.next() {
        let is_last = slices.peek().is_none();
        let mut out = Vec::with_capacity(2 * slice.len() + 256);
        out.extend_from_slice(b"CK");
        let flush = if is_last {
            flate2::FlushCompress::Finish
        } else {
            flate2::FlushCompress::Sync
        };
        let before = compressor.total_in();
        compressor.compress_vec(slice, &mut out, flush).unwrap();
        assert_eq!((compressor.total_in() - before) as usize, slice.len());
        if !is_last {
            // An empty final block ends this block's DEFLATE stream.
            out.extend_from_slice(&[0x03, 0x00]);
        }
        assert!(out.len() <= u16::MAX as usize);
        blocks.push((slice.len(), out));
    }
    blocks
}

pub fn checksum(
    reserve: &[u8],
    payload: &[u8],
    compressed: u16,
    uncompressed: u16,
) -> u32 {
    let bytes: Vec<u8> = reserve.iter().chain(payload).copied().collect();
    let mut words = bytes.chunks_exact(4);
    let mut value = 0u32;
    for word in &mut words {
        value ^= u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
    }
    let tail = words
        .remainder()
        .iter()
        .fold(0u32, |acc, &byte| (acc << 8) | byte as u32);
    value ^ tail ^ (compressed as u32 | ((uncompressed as u32) << 16))
}

/// Deterministic text that compresses well.
pub fn lorem(size: usize) -> Vec<u8> {
    lipsum::lipsum(size / 4 + 8)
        .into_bytes()
        .into_iter()
        .cycle()
        .take(size)
        .collect()
}

/// Deterministic bytes that barely compress.
pub fn noise(size: usize, seed: u64) -> Vec<u8> {
    use rand::{RngCore, SeedableRng};
    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    let mut data = vec![0u8; size];
    rng.fill_bytes(&mut data);
    data
}
