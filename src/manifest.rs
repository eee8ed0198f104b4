//! The transfer manifest: ordered chunk names with their checksums.
//!
//! On disk a manifest is UTF-8 text with one `<sha256>  <chunk name>` line per
//! chunk, in chunk sequence order, with no header.

use crate::checksum::{checksums_match, compute_file_sha256};
use crate::error::TransferError;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// One line of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub chunk_name: String,
    pub checksum: String,
}

/// The transfer plan shared by producer and consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    /// Entries in manifest order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expected checksum for a chunk.
    pub fn checksum_of(&self, chunk_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.chunk_name == chunk_name)
            .map(|e| e.checksum.as_str())
    }

    /// Reads and parses a manifest file.
    pub fn load(path: &Path) -> Result<Self, TransferError> {
        std::fs::read_to_string(path)?.parse()
    }

    /// Writes the manifest text to `path`.
    pub fn write_to(&self, path: &Path) -> Result<(), TransferError> {
        std::fs::write(path, self.to_string())?;
        Ok(())
    }

    /// Checks every chunk in `chunk_dir` against its recorded checksum.
    ///
    /// # Returns
    ///
    /// Names of chunks that are missing or whose bytes changed.
    pub fn find_altered(&self, chunk_dir: &Path) -> Result<Vec<String>, TransferError> {
        let mut altered = Vec::new();
        for entry in &self.entries {
            let path = chunk_dir.join(&entry.chunk_name);
            if !path.is_file() {
                altered.push(entry.chunk_name.clone());
                continue;
            }
            if !checksums_match(&entry.checksum, &compute_file_sha256(&path)?) {
                altered.push(entry.chunk_name.clone());
            }
        }
        Ok(altered)
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}  {}", entry.checksum, entry.chunk_name)?;
        }
        Ok(())
    }
}

impl FromStr for Manifest {
    type Err = TransferError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let malformed = |reason: &str| TransferError::Manifest {
                line: idx + 1,
                reason: reason.to_string(),
            };

            let (checksum, rest) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| malformed("expected `<checksum> <chunk name>`"))?;
            let chunk_name = rest.trim();
            if chunk_name.is_empty() {
                return Err(malformed("missing chunk name"));
            }
            if chunk_name.contains(['/', '\\']) || chunk_name == "." || chunk_name == ".." {
                return Err(malformed("chunk name must be a plain file name"));
            }
            if !checksum.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(malformed("checksum is not hexadecimal"));
            }
            if !seen.insert(chunk_name.to_string()) {
                return Err(malformed("duplicate chunk name"));
            }

            entries.push(ManifestEntry {
                chunk_name: chunk_name.to_string(),
                checksum: checksum.to_string(),
            });
        }

        Ok(Self { entries })
    }
}

/// Builds a manifest from every file in `chunk_dir`.
///
/// Files are taken in lexicographic order, which is sequence order because
/// chunk indices share one zero-padded width.
pub fn build_manifest(chunk_dir: &Path) -> Result<Manifest, TransferError> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(chunk_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    info!("📝 Creating manifest for {} chunk(s)", names.len());

    let entries = names
        .into_iter()
        .map(|chunk_name| {
            let checksum = compute_file_sha256(&chunk_dir.join(&chunk_name))?;
            Ok(ManifestEntry {
                chunk_name,
                checksum,
            })
        })
        .collect::<Result<Vec<_>, TransferError>>()?;

    Ok(Manifest::new(entries))
}
