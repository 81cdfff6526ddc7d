//! Command-line Mach-O inspector.
//!
//! Decodes a file (or a directory tree with `--recursive`) and emits one
//! pretty-printed JSON report per input, either to stdout or as
//! `<sha256>.json` files per decoded slice under `--output`.

use clap::Parser;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use walkdir::WalkDir;

use machp::{inspect_file, Report};

#[derive(Parser)]
#[command(name = "machp")]
#[command(about = "Mach-O binary inspector")]
struct Cli {
    /// Input file, or a directory with --recursive
    path: PathBuf,

    /// Recurse into directories and inspect every regular file
    #[arg(short, long)]
    recursive: bool,

    /// Write one <sha256>.json per decoded slice into this directory
    /// instead of printing to stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    let files = if cli.recursive {
        collect_files(&cli.path)
    } else {
        vec![cli.path.clone()]
    };

    if files.is_empty() {
        eprintln!("No files found under {}", cli.path.display());
        return ExitCode::FAILURE;
    }

    let failures: usize = files
        .par_iter()
        .map(|path| match process_file(path, cli.output.as_deref()) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Error parsing file {}: {e}", path.display());
                1
            }
        })
        .sum();

    if failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn collect_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) if e.file_type().is_file() => Some(e.into_path()),
            Ok(_) => None,
            Err(e) => {
                log::warn!("walk error: {e}");
                None
            }
        })
        .collect()
}

fn process_file(path: &Path, output: Option<&Path>) -> machp::Result<()> {
    let report = inspect_file(path)?;
    match output {
        Some(dir) => write_slice_reports(&report, dir),
        None => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| machp::Error::Parsing(format!("serializing report: {e}")))?;
            println!("{json}");
            Ok(())
        }
    }
}

/// One file per decoded slice, named by the slice's SHA-256.
fn write_slice_reports(report: &Report, dir: &Path) -> machp::Result<()> {
    std::fs::create_dir_all(dir)?;
    for slice in report.all_slices() {
        let json = serde_json::to_string_pretty(slice)
            .map_err(|e| machp::Error::Parsing(format!("serializing slice report: {e}")))?;
        let path = dir.join(format!("{}.json", slice.sha256));
        std::fs::write(&path, json)?;
        log::debug!("wrote {}", path.display());
    }
    Ok(())
}
