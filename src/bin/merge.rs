use clap::Parser;
use davrelay::merge::ChunkProblem;
use davrelay::merge_from_manifest;
use davrelay::progress::count_bar;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "davrelay-merge")]
#[command(about = "Merge chunk files based on manifest checksums", long_about = None)]
#[command(version)]
struct Args {
    /// Path to manifest file
    #[arg(long, default_value = "manifest.txt")]
    manifest: PathBuf,

    /// Directory containing chunk files
    #[arg(long, default_value = "chunks")]
    chunks_dir: PathBuf,

    /// Directory to save merged files (default: same as manifest location)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("davrelay={},davrelay_merge={}", log_level, log_level))
        .init();

    let pb = count_bar(0, "🔄 Merging");
    let report = match merge_from_manifest(
        &args.manifest,
        &args.chunks_dir,
        args.output_dir.as_deref(),
        &pb,
    ) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    };

    for output in &report.merged {
        info!("✓ Merged: {}", output.display());
    }
    for (group, problems) in &report.skipped {
        for problem in problems {
            match problem {
                ChunkProblem::Missing(chunk) => warn!("✗ {}: missing chunk {}", group, chunk),
                ChunkProblem::Mismatch {
                    chunk,
                    expected,
                    actual,
                } => warn!(
                    "✗ {}: checksum mismatch for {} (expected {}, got {})",
                    group, chunk, expected, actual
                ),
                ChunkProblem::Io(reason) => warn!("✗ {}: {}", group, reason),
            }
        }
    }

    if !report.is_complete() {
        eprintln!(
            "❌ {} group(s) could not be merged",
            report.skipped.len()
        );
        std::process::exit(1);
    }
}
