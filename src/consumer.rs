//! Consumer side: take chunks off the relay, verify, acknowledge and merge.

use crate::checksum::{checksums_match, compute_file_sha256_async};
use crate::error::TransferError;
use crate::manifest::{Manifest, ManifestEntry};
use crate::merge::merge_all;
use crate::progress::count_bar;
use crate::relay::Relay;
use crate::types::Config;
use crate::wait::{poll_until, retry_fixed};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outcome of a completed consumer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSummary {
    pub chunks: usize,
    /// Merged files, one per chunk group.
    pub outputs: Vec<PathBuf>,
}

/// Runs a full consumer session.
///
/// 1. Waits for the manifest to appear on the relay and downloads it
/// 2. For each chunk in manifest order: waits for it, downloads and verifies
///    it (retrying on mismatch), then deletes it from the relay, which lets
///    the producer send the next one
/// 3. Merges chunk groups into the output directory
/// 4. Deletes the relay manifest and the local chunks and manifest
///
/// On error the local chunks and manifest are left in place so the merge
/// utility can be used on them.
pub async fn run_consumer(
    config: &Config,
    relay: &dyn Relay,
) -> Result<ConsumerSummary, TransferError> {
    config.validate()?;
    let chunk_dir = config.chunk_dir();
    tokio::fs::create_dir_all(&chunk_dir).await?;

    let manifest_name = config.manifest_name.as_str();
    info!("Waiting for {} to appear on relay...", manifest_name);
    wait_for_object(relay, manifest_name, config).await?;

    let manifest_path = config.manifest_path();
    retry_fixed(
        "Manifest download",
        config.download_attempts,
        config.download_retry_delay,
        |_| relay.download(manifest_name, &manifest_path),
    )
    .await?;
    let manifest = Manifest::load(&manifest_path)?;
    info!("📝 Manifest lists {} chunk(s)", manifest.len());

    let overall = count_bar(manifest.len() as u64, "📦 Receiving chunks");
    for entry in manifest.entries() {
        let name = entry.chunk_name.as_str();
        info!("=== Handling chunk: {} ===", name);

        overall.set_message(format!("| ⏳ Waiting for {}", name));
        wait_for_object(relay, name, config).await?;

        overall.set_message(format!("| ⬇️  {}", name));
        fetch_verified(relay, entry, &chunk_dir, config).await?;
        acknowledge(relay, name, config).await?;
        overall.inc(1);
    }
    overall.finish_with_message("✅ All chunks downloaded and verified");

    let outputs = if manifest.is_empty() {
        info!("No chunks in manifest. Nothing to merge.");
        Vec::new()
    } else {
        let merge_pb = count_bar(manifest.len() as u64, "🔄 Merging");
        let output_dir = config.output_dir();
        let (m, dir) = (manifest.clone(), chunk_dir.clone());
        tokio::task::spawn_blocking(move || merge_all(&m, &dir, &output_dir, &merge_pb))
            .await
            .map_err(TransferError::join)??
    };

    if let Err(e) = relay.delete(manifest_name).await {
        warn!("Could not remove manifest from relay: {}", e);
    }
    cleanup(&chunk_dir, &manifest_path).await;

    Ok(ConsumerSummary {
        chunks: manifest.len(),
        outputs,
    })
}

/// Polls until `name` exists on the relay.
pub async fn wait_for_object(
    relay: &dyn Relay,
    name: &str,
    config: &Config,
) -> Result<(), TransferError> {
    poll_until(
        name,
        config.poll_interval,
        config.max_wait,
        move || async move { relay.exists(name).await },
    )
    .await
}

/// Downloads a chunk until its checksum matches the manifest.
///
/// Every failed attempt, whether a transport error or a mismatch, removes the
/// local copy. After `verify_attempts` attempts the session must abort:
/// skipping the chunk would corrupt the merged file.
///
/// # Returns
///
/// Local path of the verified chunk.
pub async fn fetch_verified(
    relay: &dyn Relay,
    entry: &ManifestEntry,
    chunk_dir: &Path,
    config: &Config,
) -> Result<PathBuf, TransferError> {
    let local = chunk_dir.join(&entry.chunk_name);

    let result = retry_fixed(
        &format!("Fetch of {}", entry.chunk_name),
        config.verify_attempts,
        config.verify_retry_delay,
        |_| {
            let local = local.clone();
            async move {
                let outcome = download_and_check(relay, entry, &local).await;
                if outcome.is_err() {
                    let _ = tokio::fs::remove_file(&local).await;
                }
                outcome
            }
        },
    )
    .await;

    match result {
        Ok(()) => {
            info!("✅ Checksum OK for {}", entry.chunk_name);
            Ok(local)
        }
        Err(e) => Err(TransferError::VerificationFailed {
            chunk: entry.chunk_name.clone(),
            attempts: config.verify_attempts,
            source: Box::new(e),
        }),
    }
}

async fn download_and_check(
    relay: &dyn Relay,
    entry: &ManifestEntry,
    local: &Path,
) -> Result<(), TransferError> {
    relay.download(&entry.chunk_name, local).await?;
    let actual = compute_file_sha256_async(local).await?;
    if checksums_match(&entry.checksum, &actual) {
        Ok(())
    } else {
        Err(TransferError::ChecksumMismatch {
            chunk: entry.chunk_name.clone(),
            expected: entry.checksum.clone(),
            actual,
        })
    }
}

/// Deletes a verified chunk from the relay; this is what unblocks the producer.
async fn acknowledge(relay: &dyn Relay, name: &str, config: &Config) -> Result<(), TransferError> {
    retry_fixed(
        &format!("Delete of {}", name),
        config.download_attempts,
        config.download_retry_delay,
        |_| relay.delete(name),
    )
    .await
}

async fn cleanup(chunk_dir: &Path, manifest_path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(chunk_dir).await {
        warn!("Could not remove {}: {}", chunk_dir.display(), e);
    }
    if let Err(e) = tokio::fs::remove_file(manifest_path).await {
        warn!("Could not remove {}: {}", manifest_path.display(), e);
    }
    info!("Consumer cleanup done.");
}
