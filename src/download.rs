//! HTTP(S) source downloads.

use crate::error::TransferError;
use crate::progress::bytes_bar;
use crate::wait::retry_fixed;
use futures_util::StreamExt;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{info, warn};

/// Asks the server for the size of `url` without downloading it.
///
/// # Returns
///
/// The `Content-Length` of a HEAD request, or `None` if the server did not
/// say or could not be reached.
pub async fn remote_file_size(client: &reqwest::Client, url: &str) -> Option<u64> {
    let response = match client
        .head(url)
        .timeout(Duration::from_secs(10))
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            warn!("HEAD request failed for {}: {}", url, e);
            return None;
        }
    };
    if !response.status().is_success() {
        warn!("HEAD request for {} returned HTTP {}", url, response.status());
        return None;
    }

    response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|&size| size > 0)
}

/// Downloads a file from a URL once, streaming it to disk.
///
/// # Returns
///
/// `Ok(())` when the body was written completely, or an error.
pub(crate) async fn download_file_simple(
    client: &reqwest::Client,
    url: &str,
    filename: &Path,
) -> Result<(), TransferError> {
    if let Some(parent) = filename.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let download_response = client.get(url).send().await?.error_for_status()?;
    let content_length = download_response.content_length();
    let pb = bytes_bar(content_length.unwrap_or(0), "⬇️  Download source");

    let mut file = BufWriter::new(tokio::fs::File::create(filename).await?);
    let mut byte_stream = download_response.bytes_stream();
    while let Some(piece) = byte_stream.next().await {
        let chunk = piece?;
        file.write_all(&chunk).await?;
        pb.inc(chunk.len() as u64);
    }
    file.flush().await?;

    let file_size = tokio::fs::metadata(filename).await?.len();
    if let Some(content_length) = content_length {
        if file_size != content_length {
            pb.abandon();
            return Err(TransferError::IoError(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "File size mismatch for {}: expected {} bytes, got {} bytes",
                    filename.display(),
                    content_length,
                    file_size
                ),
            )));
        }
    } else {
        warn!(
            "Content-Length header was not present for {}. Cannot verify file size.",
            url
        );
    }

    pb.finish_with_message("✅ Source downloaded");
    Ok(())
}

/// Downloads `url` to `filename`, retrying with a fixed delay.
///
/// `attempts` counts the first try. Exhausting the budget is fatal for the
/// session and is reported as [`TransferError::AcquisitionFailed`].
pub async fn download_with_retry(
    client: &reqwest::Client,
    url: &str,
    filename: &Path,
    attempts: usize,
    delay: Duration,
) -> Result<(), TransferError> {
    retry_fixed("Download", attempts, delay, |_| {
        download_file_simple(client, url, filename)
    })
    .await
    .map_err(|e| {
        TransferError::AcquisitionFailed(format!(
            "failed to download {} after {} attempts: {}",
            url, attempts, e
        ))
    })?;

    info!("✅ File downloaded successfully: {}", filename.display());
    Ok(())
}
