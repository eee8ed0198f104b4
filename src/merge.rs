//! Chunk grouping and merging back into the original files.

use crate::checksum::{checksums_match, compute_file_sha256};
use crate::chunker::{base_name, split_chunk_name};
use crate::error::TransferError;
use crate::manifest::Manifest;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const MERGE_BUFFER_SIZE: usize = 1024 * 1024;

/// Chunks that reassemble into one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGroup {
    /// Original file name, the chunk name without `.partNNN`.
    pub base_name: String,
    /// Chunk names in sequence order.
    pub chunks: Vec<String>,
}

/// Groups chunk names by base file name.
///
/// Groups appear in order of first appearance; chunks inside a group are
/// sorted by index, so the input order does not matter.
pub fn group_chunks<'a, I>(names: I) -> Vec<ChunkGroup>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut groups: Vec<ChunkGroup> = Vec::new();
    for name in names {
        let base = base_name(name);
        match groups.iter_mut().find(|g| g.base_name == base) {
            Some(group) => group.chunks.push(name.to_string()),
            None => groups.push(ChunkGroup {
                base_name: base.to_string(),
                chunks: vec![name.to_string()],
            }),
        }
    }

    for group in &mut groups {
        group
            .chunks
            .sort_by(|a, b| chunk_order(a).cmp(&chunk_order(b)).then_with(|| a.cmp(b)));
    }
    groups
}

fn chunk_order(name: &str) -> u64 {
    split_chunk_name(name).map(|(_, idx)| idx).unwrap_or(0)
}

/// Concatenates a group's chunks from `chunk_dir` into `output`.
///
/// Streams through a bounded buffer.
///
/// # Returns
///
/// Bytes written.
pub fn merge_group(
    group: &ChunkGroup,
    chunk_dir: &Path,
    output: &Path,
    pb: &indicatif::ProgressBar,
) -> Result<u64, TransferError> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::with_capacity(MERGE_BUFFER_SIZE, std::fs::File::create(output)?);
    let mut total = 0u64;

    for name in &group.chunks {
        pb.set_message(format!("| 🔄 Merging: {}", name));
        let file = std::fs::File::open(chunk_dir.join(name))?;
        let mut reader = BufReader::with_capacity(MERGE_BUFFER_SIZE, file);
        total += io::copy(&mut reader, &mut out)?;
        pb.inc(1);
    }
    out.flush()?;

    Ok(total)
}

/// Merges every group of an already verified manifest into `output_dir`.
///
/// # Returns
///
/// Paths of the files written, one per group.
pub fn merge_all(
    manifest: &Manifest,
    chunk_dir: &Path,
    output_dir: &Path,
    pb: &indicatif::ProgressBar,
) -> Result<Vec<PathBuf>, TransferError> {
    let groups = group_chunks(manifest.entries().iter().map(|e| e.chunk_name.as_str()));
    pb.set_length(manifest.len() as u64);

    let mut outputs = Vec::with_capacity(groups.len());
    for group in &groups {
        let output = output_dir.join(&group.base_name);
        info!(
            "🔄 Merging {} chunk(s) into {}",
            group.chunks.len(),
            output.display()
        );
        let bytes = merge_group(group, chunk_dir, &output, pb)?;
        info!("✅ Merged file written to {} ({} bytes)", output.display(), bytes);
        outputs.push(output);
    }

    pb.finish_with_message(format!("✅ Merged {} file(s)", outputs.len()));
    Ok(outputs)
}

/// Why a group was not merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkProblem {
    Missing(String),
    Mismatch {
        chunk: String,
        expected: String,
        actual: String,
    },
    /// Reading a chunk or writing the output failed.
    Io(String),
}

/// Outcome of [`merge_from_manifest`].
#[derive(Debug, Default)]
pub struct MergeReport {
    /// Output files written.
    pub merged: Vec<PathBuf>,
    /// Groups left out, with every problem found in them.
    pub skipped: Vec<(String, Vec<ChunkProblem>)>,
}

impl MergeReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Verifies and merges chunks listed in a manifest file.
///
/// Each group is checked in full before merging. A group with a missing,
/// unreadable or mismatched chunk is skipped, as is one whose output cannot
/// be written; the remaining groups are still merged.
/// `output_dir` defaults to the directory holding the manifest.
pub fn merge_from_manifest(
    manifest_path: &Path,
    chunk_dir: &Path,
    output_dir: Option<&Path>,
    pb: &indicatif::ProgressBar,
) -> Result<MergeReport, TransferError> {
    let output_dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => manifest_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&output_dir)?;

    info!("Reading manifest from {}", manifest_path.display());
    let manifest = Manifest::load(manifest_path)?;
    let groups = group_chunks(manifest.entries().iter().map(|e| e.chunk_name.as_str()));
    info!(
        "Found {} chunk(s) in {} file group(s)",
        manifest.len(),
        groups.len()
    );
    for group in &groups {
        info!("  - {} ({} chunks)", group.base_name, group.chunks.len());
    }
    pb.set_length(manifest.len() as u64);

    let mut report = MergeReport::default();
    for group in groups {
        let problems = verify_group(&group, &manifest, chunk_dir);
        if !problems.is_empty() {
            warn!("⚠️  Skipping {} due to errors", group.base_name);
            report.skipped.push((group.base_name, problems));
            continue;
        }

        let output = output_dir.join(&group.base_name);
        match merge_group(&group, chunk_dir, &output, pb) {
            Ok(_) => {
                info!("✅ Successfully merged {}", group.base_name);
                report.merged.push(output);
            }
            Err(e) => {
                error!("  ✗ Failed to merge {}: {}", group.base_name, e);
                if output.is_file() {
                    let _ = std::fs::remove_file(&output);
                }
                report
                    .skipped
                    .push((group.base_name, vec![ChunkProblem::Io(e.to_string())]));
            }
        }
    }

    pb.finish_with_message(format!(
        "Merged {} file(s), skipped {}",
        report.merged.len(),
        report.skipped.len()
    ));
    Ok(report)
}

fn verify_group(
    group: &ChunkGroup,
    manifest: &Manifest,
    chunk_dir: &Path,
) -> Vec<ChunkProblem> {
    let mut problems = Vec::new();
    for name in &group.chunks {
        let path = chunk_dir.join(name);
        if !path.is_file() {
            error!("  ✗ Missing chunk: {}", name);
            problems.push(ChunkProblem::Missing(name.clone()));
            continue;
        }

        let expected = manifest.checksum_of(name).unwrap_or_default();
        let actual = match compute_file_sha256(&path) {
            Ok(actual) => actual,
            Err(e) => {
                error!("  ✗ Could not read {}: {}", name, e);
                problems.push(ChunkProblem::Io(format!("{}: {}", name, e)));
                continue;
            }
        };
        if checksums_match(expected, &actual) {
            info!("  ✓ Verified: {}", name);
        } else {
            error!(
                "  ✗ Checksum mismatch for {}: expected {}, got {}",
                name, expected, actual
            );
            problems.push(ChunkProblem::Mismatch {
                chunk: name.clone(),
                expected: expected.to_string(),
                actual,
            });
        }
    }
    problems
}
