//! Producer side: acquire, chunk, and feed chunks to the relay one at a time.

use crate::acquire::{acquire_source, staging_dir, MagnetAcquirer, Source};
use crate::chunker::split_file_as;
use crate::download::remote_file_size;
use crate::error::TransferError;
use crate::manifest::build_manifest;
use crate::progress::{bytes_bar, count_bar};
use crate::relay::{Presence, Relay};
use crate::space::{gb, local_free_space, Capacity};
use crate::types::Config;
use crate::wait::{poll_until, Deadline};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// What the producer was asked to send.
#[derive(Debug, Clone)]
pub struct ProducerRequest {
    pub source: Source,
    /// Base name of the file as the consumer will see it. A local source is
    /// relayed under this name without being renamed on disk.
    pub file_name: String,
}

/// Outcome of a completed producer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerSummary {
    pub chunks: usize,
    pub bytes: u64,
}

/// Runs a full producer session.
///
/// This is the producer entry point. It performs the following steps:
///
/// 1. Checks local and relay capacity
/// 2. Acquires the source (HTTP, magnet or local file)
/// 3. Splits it into chunks and writes the manifest
/// 4. Uploads the manifest, then each chunk once the relay has room for it,
///    waiting for the consumer to delete every chunk before sending the next
/// 5. Removes the local source, chunks and manifest
///
/// # Returns
///
/// Chunk and byte counts on success, or the first fatal error.
pub async fn run_producer(
    config: &Config,
    relay: &dyn Relay,
    acquirer: &dyn MagnetAcquirer,
    request: &ProducerRequest,
) -> Result<ProducerSummary, TransferError> {
    config.validate()?;
    let file_name = request.file_name.trim();
    if file_name.is_empty() {
        return Err(TransferError::MissingInput("file name".to_string()));
    }
    if file_name.contains(['/', '\\']) {
        return Err(TransferError::InvalidConfig(format!(
            "file name {:?} must not contain a path",
            file_name
        )));
    }

    tokio::fs::create_dir_all(&config.work_dir).await?;
    preflight(config, relay, &request.source).await?;
    info!("Storage checks passed. Proceeding...");

    let owned = request.source.is_owned();
    let source_path = match acquire_source(&request.source, file_name, config, acquirer).await {
        Ok(path) => path,
        Err(e) => {
            let partial = owned.then(|| config.work_dir.join(file_name));
            cleanup(config, partial.as_deref()).await;
            return Err(e);
        }
    };

    // Local files keep their path; downloads were already stored under the
    // requested name (plus `.tar.gz` for archived torrent folders).
    let chunk_base = match &request.source {
        Source::Local(_) => file_name.to_string(),
        _ => source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string()),
    };
    let result = transfer(config, relay, &source_path, &chunk_base).await;
    cleanup(config, owned.then_some(source_path.as_path())).await;

    if let Ok(summary) = &result {
        info!(
            "✅ All {} chunk(s) uploaded and acknowledged by consumer",
            summary.chunks
        );
    }
    result
}

async fn preflight(
    config: &Config,
    relay: &dyn Relay,
    source: &Source,
) -> Result<(), TransferError> {
    let quota = relay.quota().await;
    if let (Some(used), Some(available)) = (quota.used, quota.available) {
        info!(
            "☁️  Relay used: {:.2} GB, available: {:.2} GB",
            gb(used),
            gb(available)
        );
    }

    let source_size = match source {
        Source::Http(url) => {
            let size = remote_file_size(&reqwest::Client::new(), url).await;
            match size {
                Some(size) => info!("Remote file size: {:.2} GB", gb(size)),
                None => warn!("⚠️  Could not determine remote file size"),
            }
            size
        }
        Source::Local(path) => tokio::fs::metadata(path).await.ok().map(|m| m.len()),
        Source::Magnet(_) => None,
    };

    let work_dir = config.work_dir.clone();
    let local_free = tokio::task::spawn_blocking(move || local_free_space(&work_dir))
        .await
        .map_err(TransferError::join)?;

    Capacity {
        local_free,
        source_size,
        chunk_size: config.chunk_size,
        relay: quota,
    }
    .check()
}

async fn transfer(
    config: &Config,
    relay: &dyn Relay,
    source_path: &Path,
    chunk_base: &str,
) -> Result<ProducerSummary, TransferError> {
    let chunk_dir = config.chunk_dir();
    // Leftovers from an earlier session would end up in the manifest.
    if tokio::fs::metadata(&chunk_dir).await.is_ok() {
        warn!("Removing stale chunk directory {}", chunk_dir.display());
        tokio::fs::remove_dir_all(&chunk_dir).await?;
    }

    let split_pb = bytes_bar(0, "✂️  Chunking");
    let (src, base, dir, size) = (
        source_path.to_path_buf(),
        chunk_base.to_string(),
        chunk_dir.clone(),
        config.chunk_size,
    );
    let chunks = tokio::task::spawn_blocking(move || {
        split_file_as(&src, &base, &dir, size, &split_pb)
    })
    .await
    .map_err(TransferError::join)??;

    let dir = chunk_dir.clone();
    let manifest = tokio::task::spawn_blocking(move || build_manifest(&dir))
        .await
        .map_err(TransferError::join)??;
    let manifest_path = config.manifest_path();
    manifest.write_to(&manifest_path)?;
    info!("📝 Manifest saved: {}", manifest_path.display());

    relay.make_collection(&config.remote_dir).await?;
    upload_until_accepted(relay, &manifest_path, &config.manifest_name, config).await?;
    info!("Manifest uploaded. Now uploading chunks one by one...");

    let total_bytes: u64 = chunks.iter().map(|c| c.size).sum();
    let overall = count_bar(manifest.len() as u64, "📦 Relaying chunks");

    for entry in manifest.entries() {
        let name = entry.chunk_name.as_str();
        let path = chunk_dir.join(name);
        let size = tokio::fs::metadata(&path).await?.len();

        overall.set_message(format!("| ⬆️  {}", name));
        wait_for_capacity(relay, size, config).await?;
        upload_until_accepted(relay, &path, name, config).await?;

        overall.set_message(format!("| ⏳ Waiting for consumer to take {}", name));
        info!("Waiting for consumer to delete {} from relay...", name);
        await_ack(relay, name, config).await?;
        overall.inc(1);
    }
    overall.finish_with_message("✅ All chunks acknowledged");

    Ok(ProducerSummary {
        chunks: manifest.len(),
        bytes: total_bytes,
    })
}

/// Blocks until the relay reports at least `needed` free bytes.
///
/// Polls the quota every `quota_poll_interval`. An unknown quota lets the
/// upload proceed immediately.
pub async fn wait_for_capacity(
    relay: &dyn Relay,
    needed: u64,
    config: &Config,
) -> Result<(), TransferError> {
    let deadline = Deadline::start(config.max_wait);
    let mut probes = 0u64;

    loop {
        match relay.quota().await.available {
            None => {
                warn!("⚠️  Could not determine relay free space; proceeding with upload");
                return Ok(());
            }
            Some(available) if available >= needed => return Ok(()),
            Some(available) => {
                if probes % 5 == 0 {
                    info!(
                        "Not enough relay space: need {:.2} GB, available {:.2} GB. Waiting for consumer to free space...",
                        gb(needed),
                        gb(available)
                    );
                }
                probes += 1;
                deadline.check("relay capacity")?;
                tokio::time::sleep(config.quota_poll_interval).await;
            }
        }
    }
}

/// Uploads `local` as `name`, re-attempting failed uploads so a chunk is
/// never skipped.
///
/// A failed upload may still have been stored, with only the reply lost.
/// The relay is checked before sending again: a present object counts as
/// uploaded, and only an explicit absence triggers another PUT. A second
/// copy must never reappear after the consumer has deleted the first.
async fn upload_until_accepted(
    relay: &dyn Relay,
    local: &Path,
    name: &str,
    config: &Config,
) -> Result<(), TransferError> {
    let deadline = Deadline::start(config.max_wait);
    loop {
        match relay.upload(local, name).await {
            Ok(()) => return Ok(()),
            Err(e) => error!("Upload of {} failed: {}", name, e),
        }

        loop {
            match relay.probe(name).await {
                Presence::Present => {
                    warn!("{} is on the relay despite the upload error; treating it as uploaded", name);
                    return Ok(());
                }
                Presence::Absent => break,
                Presence::Unknown => {
                    deadline.check(&format!("upload of {}", name))?;
                    tokio::time::sleep(config.poll_interval).await;
                }
            }
        }

        deadline.check(&format!("upload of {}", name))?;
        tokio::time::sleep(config.quota_poll_interval).await;
    }
}

/// Waits until the consumer has deleted `name` from the relay.
///
/// Only an explicit "not found" counts; a failed probe keeps waiting.
pub async fn await_ack(relay: &dyn Relay, name: &str, config: &Config) -> Result<(), TransferError> {
    poll_until(
        &format!("consumer to delete {}", name),
        config.poll_interval,
        config.max_wait,
        move || async move { relay.probe(name).await == Presence::Absent },
    )
    .await
}

async fn cleanup(config: &Config, owned_source: Option<&Path>) {
    if let Some(path) = owned_source {
        match tokio::fs::remove_file(path).await {
            Ok(()) => info!("Removed original file: {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }

    let dirs: [PathBuf; 2] = [config.chunk_dir(), staging_dir(config)];
    for dir in dirs {
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", dir.display(), e);
            }
        }
    }
    if let Err(e) = tokio::fs::remove_file(config.manifest_path()).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove local manifest: {}", e);
        }
    }
    info!("Producer cleanup done.");
}
