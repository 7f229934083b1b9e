use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use multicab::{CabinetHeader, DiskVolumes, FolderRef, VolumeSource};

// ========================================================================= //

/// Prints the headers of every volume in a cabinet set.
#[derive(Parser, Debug)]
#[command(name = "lscab", version)]
struct Args {
    /// First volume of the set.
    volume: PathBuf,

    /// Stop after the first volume.
    #[arg(short, long)]
    single: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut source = DiskVolumes::new();
    let mut path = args.volume.clone();
    let mut seen = HashSet::new();
    loop {
        if !seen.insert(path.clone()) {
            bail!("Volume chain loops back to {}", path.display());
        }
        let bytes = source.read_volume(&path)?;
        let header = CabinetHeader::parse(&bytes)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        print_header(&path, &header);
        let next = match header.next_volume() {
            Some(link) if !args.single => link.cabinet_name().to_string(),
            _ => break,
        };
        path = source.resolve_next_volume(&path, &next);
    }
    Ok(())
}

fn print_header(path: &std::path::Path, header: &CabinetHeader) {
    let (major, minor) = header.version();
    println!("{}:", path.display());
    println!("  version = {}.{}", major, minor);
    println!(
        "  set = 0x{:04x}, index = {}",
        header.cabinet_set_id(),
        header.cabinet_set_index()
    );
    println!("  size = {} bytes", header.cabinet_size());
    if let Some(sizes) = header.reserve_sizes() {
        println!("  reserve_sizes = {:?}", sizes);
    }
    if let Some(link) = header.previous_volume() {
        println!(
            "  previous = {:?} on {:?}",
            link.cabinet_name(),
            link.disk_label()
        );
    }
    if let Some(link) = header.next_volume() {
        println!("  next = {:?} on {:?}", link.cabinet_name(), link.disk_label());
    }
    for (index, folder) in header.folders().iter().enumerate() {
        println!("  Folder #{}:", index);
        println!("    compression_type = {}", folder.compression_type());
        println!("    reserve_data = {:?}", folder.reserve_data());
        println!("    num_data_blocks = {}", folder.num_data_blocks());
        if folder.chunks().last().map_or(false, |c| c.continues_in_next_volume())
        {
            println!("    last block continues in the next volume");
        }
    }
    for file in header.file_entries() {
        let folder = match file.folder() {
            FolderRef::Folder(index) => format!("#{}", index),
            FolderRef::ContinuedFromPrevious => "<prev".to_string(),
            FolderRef::SpansAllFolders => "next>".to_string(),
        };
        let datetime = match file.datetime() {
            Some(datetime) => datetime.to_string(),
            None => "invalid datetime".to_string(),
        };
        println!(
            "  {:>6} {:>10} @{:<10} {} {}",
            folder,
            file.uncompressed_size(),
            file.logical_offset(),
            datetime,
            file.name()
        );
    }
}
