use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use multicab::{DirectorySink, DiskVolumes, ExtractOptions, Extractor};

// ========================================================================= //

/// Extracts every file of a cabinet volume set.
#[derive(Parser, Debug)]
#[command(name = "cabextract", version)]
struct Args {
    /// First volume of the set.
    volume: PathBuf,

    /// Directory to extract into.
    #[arg(short = 'd', long, default_value = ".")]
    directory: PathBuf,

    /// Delete each volume once it has been consumed.
    #[arg(long)]
    purge: bool,

    /// Don't check data block checksums.
    #[arg(long)]
    no_verify: bool,

    /// Inflate MSZIP blocks that lack the "CK" signature.
    #[arg(long)]
    lenient: bool,

    /// Log every volume and file.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let options = ExtractOptions {
        purge: args.purge,
        verify_checksums: !args.no_verify,
        lenient_signature: args.lenient,
    };
    let summary = Extractor::new(
        &args.volume,
        DiskVolumes::new(),
        DirectorySink::new(&args.directory),
    )
    .options(options)
    .on_progress(|progress| {
        println!(
            "[{}] {}",
            progress.volumes_processed, progress.file_name
        )
    })
    .run()
    .with_context(|| format!("Failed to extract {}", args.volume.display()))?;
    println!(
        "Extracted {} files ({} bytes) from {} volumes",
        summary.files, summary.bytes, summary.volumes
    );
    Ok(())
}
