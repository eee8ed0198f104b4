//! Getting the source file onto the producer's disk.

use crate::download::download_with_retry;
use crate::error::TransferError;
use crate::types::Config;
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where the producer gets the file to relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Plain HTTP(S) download.
    Http(String),
    /// Magnet link handed to a [`MagnetAcquirer`].
    Magnet(String),
    /// A file already on local disk. Never deleted by cleanup.
    Local(PathBuf),
}

impl Source {
    /// Classifies a user-supplied link or path.
    pub fn parse(link: &str) -> Result<Self, TransferError> {
        let link = link.trim();
        if link.is_empty() {
            return Err(TransferError::MissingInput("download link".to_string()));
        }
        if link.starts_with("magnet:?") {
            Ok(Source::Magnet(link.to_string()))
        } else if link.starts_with("http://") || link.starts_with("https://") {
            Ok(Source::Http(link.to_string()))
        } else {
            let path = link.strip_prefix("file://").unwrap_or(link);
            Ok(Source::Local(PathBuf::from(path)))
        }
    }

    /// Whether the file at the end of acquisition belongs to the session.
    pub fn is_owned(&self) -> bool {
        !matches!(self, Source::Local(_))
    }
}

/// Fetches the content behind a magnet link.
///
/// The workflow only relies on this contract; how the torrent is fetched is
/// up to the implementation.
#[async_trait]
pub trait MagnetAcquirer: Send + Sync {
    /// Downloads `magnet_uri` into `staging_dir`.
    ///
    /// # Returns
    ///
    /// Path of the downloaded content, either a single file or a directory.
    async fn acquire(&self, magnet_uri: &str, staging_dir: &Path) -> Result<PathBuf, TransferError>;
}

/// Runs an external torrent client, e.g. `aria2c --seed-time=0 --dir {dir} {magnet}`.
pub struct CommandAcquirer {
    command: Vec<String>,
}

impl CommandAcquirer {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    fn render_args(&self, magnet_uri: &str, staging_dir: &Path) -> Vec<String> {
        let dir = staging_dir.to_string_lossy();
        self.command
            .iter()
            .map(|arg| arg.replace("{magnet}", magnet_uri).replace("{dir}", &dir))
            .collect()
    }
}

#[async_trait]
impl MagnetAcquirer for CommandAcquirer {
    async fn acquire(&self, magnet_uri: &str, staging_dir: &Path) -> Result<PathBuf, TransferError> {
        let args = self.render_args(magnet_uri, staging_dir);
        let (program, rest) = args.split_first().ok_or_else(|| {
            TransferError::InvalidConfig("torrent command is empty".to_string())
        })?;

        tokio::fs::create_dir_all(staging_dir).await?;
        info!("🧲 Fetching magnet link with {}", program);
        let status = tokio::process::Command::new(program)
            .args(rest)
            .status()
            .await
            .map_err(|e| TransferError::AcquisitionFailed(format!("cannot run {}: {}", program, e)))?;
        if !status.success() {
            return Err(TransferError::AcquisitionFailed(format!(
                "{} exited with {}",
                program, status
            )));
        }

        single_entry_or_dir(staging_dir)
    }
}

/// The only entry of `dir`, or `dir` itself when it holds several.
fn single_entry_or_dir(dir: &Path) -> Result<PathBuf, TransferError> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    match entries.len() {
        0 => Err(TransferError::AcquisitionFailed(
            "torrent finished without producing any files".to_string(),
        )),
        1 => Ok(entries.remove(0)),
        _ => Ok(dir.to_path_buf()),
    }
}

/// Packs a directory into one gzip-compressed tar file at `dest`.
pub fn archive_directory(dir: &Path, dest: &Path) -> Result<(), TransferError> {
    let root = dir
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("content"));

    let file = std::fs::File::create(dest)?;
    let encoder = GzEncoder::new(std::io::BufWriter::new(file), Compression::fast());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(&root, dir)?;
    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    std::io::Write::flush(&mut writer)?;
    Ok(())
}

/// Brings `source` onto local disk as a single file named after `file_name`.
///
/// Directory results are archived to `<file_name>.tar.gz`.
///
/// # Returns
///
/// Path of the file to chunk.
pub async fn acquire_source(
    source: &Source,
    file_name: &str,
    config: &Config,
    acquirer: &dyn MagnetAcquirer,
) -> Result<PathBuf, TransferError> {
    match source {
        Source::Http(url) => {
            let dest = config.work_dir.join(file_name);
            let client = reqwest::Client::new();
            download_with_retry(
                &client,
                url,
                &dest,
                config.download_attempts,
                config.download_retry_delay,
            )
            .await?;
            Ok(dest)
        }
        Source::Magnet(uri) => {
            let staging = staging_dir(config);
            let fetched = acquirer.acquire(uri, &staging).await?;
            let meta = tokio::fs::metadata(&fetched).await?;
            if meta.is_dir() {
                let dest = config.work_dir.join(format!("{}.tar.gz", file_name));
                info!(
                    "📦 Archiving torrent folder {} into {}",
                    fetched.display(),
                    dest.display()
                );
                let (src, dst) = (fetched.clone(), dest.clone());
                tokio::task::spawn_blocking(move || archive_directory(&src, &dst))
                    .await
                    .map_err(TransferError::join)??;
                Ok(dest)
            } else {
                let dest = config.work_dir.join(file_name);
                tokio::fs::rename(&fetched, &dest).await?;
                Ok(dest)
            }
        }
        Source::Local(path) => {
            let meta = tokio::fs::metadata(path).await.map_err(|e| {
                TransferError::MissingInput(format!("source {}: {}", path.display(), e))
            })?;
            if !meta.is_file() {
                return Err(TransferError::MissingInput(format!(
                    "source {} is not a regular file",
                    path.display()
                )));
            }
            Ok(path.clone())
        }
    }
}

/// Scratch directory for torrent downloads.
pub(crate) fn staging_dir(config: &Config) -> PathBuf {
    config.work_dir.join("staging")
}
