//! SHA-256 file checksums shared by both sides of a transfer.

use crate::error::TransferError;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Block size used when streaming a file through the hasher.
const HASH_BLOCK_SIZE: usize = 1024 * 1024;

/// Computes the SHA-256 hash of a local file.
///
/// The file is read in 1 MiB blocks so memory use does not depend on its size.
///
/// # Returns
///
/// The digest as 64 lowercase hexadecimal characters, or an error.
pub fn compute_file_sha256(path: &Path) -> Result<String, TransferError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::with_capacity(HASH_BLOCK_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BLOCK_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Same as [`compute_file_sha256`], run on the blocking pool.
pub async fn compute_file_sha256_async(path: &Path) -> Result<String, TransferError> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || compute_file_sha256(&path))
        .await
        .map_err(TransferError::join)?
}

/// Compares two hex digests ignoring case and surrounding whitespace.
pub fn checksums_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}
