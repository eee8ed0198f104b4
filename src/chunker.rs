//! Splitting a source file into fixed-size chunk files.

use crate::error::TransferError;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Marker between the base file name and the chunk index.
pub const PART_MARKER: &str = ".part";

/// Narrowest index width; wider only when a file has 1000+ chunks.
pub const MIN_INDEX_WIDTH: usize = 3;

const COPY_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// A chunk written to local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFile {
    /// File name, `<base>.partNNN`.
    pub name: String,
    /// Full local path.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
}

/// Number of chunks a file of `file_size` bytes splits into.
pub fn chunk_count(file_size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    file_size.div_ceil(chunk_size)
}

/// Digits needed so every index of `count` chunks has the same width.
pub fn index_width(count: u64) -> usize {
    let last = count.saturating_sub(1);
    last.to_string().len().max(MIN_INDEX_WIDTH)
}

/// Builds `<base>.part<index>` with the index zero-padded to `width`.
pub fn chunk_name(base: &str, index: u64, width: usize) -> String {
    format!("{}{}{:0width$}", base, PART_MARKER, index, width = width)
}

/// Splits a chunk name into its base file name and index.
///
/// Returns `None` when the name has no `.partNNN` suffix.
pub fn split_chunk_name(name: &str) -> Option<(&str, u64)> {
    let pos = name.rfind(PART_MARKER)?;
    let digits = &name[pos + PART_MARKER.len()..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = digits.parse().ok()?;
    Some((&name[..pos], index))
}

/// Base file name a chunk belongs to; names without a suffix are their own base.
pub fn base_name(name: &str) -> &str {
    split_chunk_name(name).map(|(base, _)| base).unwrap_or(name)
}

/// Splits `source` into chunk files inside `chunk_dir`, named after the
/// source file itself. See [`split_file_as`].
pub fn split_file(
    source: &Path,
    chunk_dir: &Path,
    chunk_size: u64,
    pb: &indicatif::ProgressBar,
) -> Result<Vec<ChunkFile>, TransferError> {
    let base = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            TransferError::MissingInput(format!("source {} has no file name", source.display()))
        })?;
    split_file_as(source, base, chunk_dir, chunk_size, pb)
}

/// Splits `source` into `<base>.partNNN` chunk files inside `chunk_dir`.
///
/// Each chunk holds `chunk_size` bytes except possibly the last; a zero-byte
/// source produces no chunks. Data is streamed, so memory use is bounded by the
/// copy buffer rather than the chunk size.
///
/// # Returns
///
/// The chunks in sequence order.
pub fn split_file_as(
    source: &Path,
    base: &str,
    chunk_dir: &Path,
    chunk_size: u64,
    pb: &indicatif::ProgressBar,
) -> Result<Vec<ChunkFile>, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidConfig(
            "chunk size must be greater than zero".to_string(),
        ));
    }

    let file = std::fs::File::open(source)?;
    let file_size = file.metadata()?.len();
    let count = chunk_count(file_size, chunk_size);
    let width = index_width(count);
    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, file);

    std::fs::create_dir_all(chunk_dir)?;
    info!(
        "✂️  Splitting {} ({} bytes) into {} chunk(s) of up to {} bytes",
        base, file_size, count, chunk_size
    );
    pb.set_length(file_size);

    let mut chunks = Vec::with_capacity(count as usize);
    for index in 0..count {
        let name = chunk_name(base, index, width);
        let path = chunk_dir.join(&name);
        let mut out = BufWriter::with_capacity(COPY_BUFFER_SIZE, std::fs::File::create(&path)?);
        let written = io::copy(&mut (&mut reader).take(chunk_size), &mut out)?;
        out.flush()?;

        if written == 0 {
            // Source shrank while we were reading it.
            drop(out);
            std::fs::remove_file(&path)?;
            break;
        }

        debug!("Created chunk {} ({} bytes)", name, written);
        pb.inc(written);
        chunks.push(ChunkFile {
            name,
            path,
            size: written,
        });
    }

    pb.finish_with_message(format!("✅ Split {} into {} chunk(s)", base, chunks.len()));
    Ok(chunks)
}
