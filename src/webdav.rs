//! WebDAV implementation of the relay client.

use crate::error::TransferError;
use crate::progress::bytes_bar;
use crate::quota::{parse_quota, Quota, QUOTA_PROPFIND_BODY};
use crate::relay::{Presence, Relay};
use crate::types::{Config, Credentials};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, Method, RequestBuilder, StatusCode, Url};
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

const STREAM_BUFFER_SIZE: usize = 1024 * 1024;

/// Relay client speaking WebDAV over HTTP(S) with basic auth.
pub struct WebDavRelay {
    client: Client,
    root: Url,
    relay_dir: Vec<String>,
    credentials: Credentials,
    mkcol: Method,
    propfind: Method,
}

impl WebDavRelay {
    /// Creates a client for `config.base_url` and `config.remote_dir`.
    pub fn new(config: &Config, credentials: Credentials) -> Result<Self, TransferError> {
        let root = Url::parse(&config.base_url).map_err(|e| {
            TransferError::InvalidConfig(format!("base url {:?}: {}", config.base_url, e))
        })?;
        if root.cannot_be_a_base() {
            return Err(TransferError::InvalidConfig(format!(
                "base url {:?} cannot hold a path",
                config.base_url
            )));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .read_timeout(config.read_timeout)
            .build()?;

        Ok(Self {
            client,
            root,
            relay_dir: split_path(&config.remote_dir),
            credentials,
            mkcol: dav_method("MKCOL")?,
            propfind: dav_method("PROPFIND")?,
        })
    }

    /// URL of an object inside the relay directory.
    pub fn object_url(&self, name: &str) -> Url {
        let mut segments: Vec<&str> = self.relay_dir.iter().map(String::as_str).collect();
        segments.push(name);
        self.url_with(&segments, false)
    }

    /// URL of a collection below the WebDAV root, with a trailing slash.
    pub fn collection_url(&self, path: &str) -> Url {
        let segments = split_path(path);
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        self.url_with(&segments, true)
    }

    fn url_with(&self, segments: &[&str], trailing_slash: bool) -> Url {
        let mut url = self.root.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
            if trailing_slash {
                path.push("");
            }
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.credentials.username, Some(self.credentials.password()))
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn dav_method(name: &str) -> Result<Method, TransferError> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| TransferError::InvalidConfig(format!("HTTP method {}: {}", name, e)))
}

/// Maps a HEAD status to a presence answer.
pub(crate) fn presence_from_status(status: StatusCode) -> Presence {
    if status.is_success() {
        Presence::Present
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        Presence::Absent
    } else {
        Presence::Unknown
    }
}

#[async_trait]
impl Relay for WebDavRelay {
    async fn probe(&self, name: &str) -> Presence {
        let url = self.object_url(name);
        match self.request(Method::HEAD, url).send().await {
            Ok(response) => {
                let presence = presence_from_status(response.status());
                if presence == Presence::Unknown {
                    warn!("HEAD {} returned HTTP {}", name, response.status());
                }
                presence
            }
            Err(e) => {
                warn!("Failed to probe {} on relay: {}", name, e);
                Presence::Unknown
            }
        }
    }

    async fn make_collection(&self, path: &str) -> Result<(), TransferError> {
        let url = self.collection_url(path);
        let status = self.request(self.mkcol.clone(), url).send().await?.status();
        // 405 means the collection already exists.
        if status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED {
            debug!("Relay collection {} ready (HTTP {})", path, status);
            Ok(())
        } else {
            Err(TransferError::RelayStatus {
                operation: "MKCOL",
                target: path.to_string(),
                status,
            })
        }
    }

    async fn upload(&self, local: &Path, name: &str) -> Result<(), TransferError> {
        let file = tokio::fs::File::open(local).await?;
        let len = file.metadata().await?.len();
        let pb = bytes_bar(len, format!("⬆️  Upload {}", name));

        let counter = pb.clone();
        let stream = ReaderStream::with_capacity(file, STREAM_BUFFER_SIZE)
            .inspect_ok(move |bytes| counter.inc(bytes.len() as u64));

        let response = self
            .request(Method::PUT, self.object_url(name))
            .header(CONTENT_LENGTH, len)
            .body(Body::wrap_stream(stream))
            .send()
            .await;

        let status = match response {
            Ok(r) => r.status(),
            Err(e) => {
                pb.abandon_with_message(format!("❌ Upload {} failed", name));
                return Err(e.into());
            }
        };
        if !status.is_success() {
            pb.abandon_with_message(format!("❌ Upload {} failed", name));
            return Err(TransferError::RelayStatus {
                operation: "PUT",
                target: name.to_string(),
                status,
            });
        }

        pb.finish_with_message(format!("✅ Uploaded {}", name));
        info!("Uploaded {} ({} bytes)", name, len);
        Ok(())
    }

    async fn download(&self, name: &str, local: &Path) -> Result<(), TransferError> {
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self.request(Method::GET, self.object_url(name)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::RelayStatus {
                operation: "GET",
                target: name.to_string(),
                status,
            });
        }
        let content_length = response.content_length();
        let pb = bytes_bar(content_length.unwrap_or(0), format!("⬇️  Download {}", name));

        let mut file = BufWriter::new(tokio::fs::File::create(local).await?);
        let mut byte_stream = response.bytes_stream();
        while let Some(piece) = byte_stream.next().await {
            let chunk = piece?;
            file.write_all(&chunk).await?;
            pb.inc(chunk.len() as u64);
        }
        file.flush().await?;

        let file_size = tokio::fs::metadata(local).await?.len();
        if let Some(expected) = content_length {
            if file_size != expected {
                pb.abandon_with_message(format!("❌ Download {} incomplete", name));
                return Err(TransferError::IoError(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "File size mismatch for {}: expected {} bytes, got {} bytes",
                        name, expected, file_size
                    ),
                )));
            }
        }

        pb.finish_with_message(format!("✅ Downloaded {}", name));
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), TransferError> {
        let status = self
            .request(Method::DELETE, self.object_url(name))
            .send()
            .await?
            .status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            info!("🗑️  Deleted {} from relay", name);
            Ok(())
        } else {
            Err(TransferError::RelayStatus {
                operation: "DELETE",
                target: name.to_string(),
                status,
            })
        }
    }

    async fn quota(&self) -> Quota {
        let response = self
            .request(self.propfind.clone(), self.root.clone())
            .header("Depth", "0")
            .header(CONTENT_TYPE, "application/xml")
            .body(QUOTA_PROPFIND_BODY)
            .send()
            .await;

        let body = match response {
            Ok(r) if r.status().is_success() => r.text().await,
            Ok(r) => {
                warn!("Failed to fetch relay quota: HTTP {}", r.status());
                return Quota::UNKNOWN;
            }
            Err(e) => {
                warn!("Failed to fetch relay quota: {}", e);
                return Quota::UNKNOWN;
            }
        };

        match body.map_err(TransferError::from).and_then(|b| parse_quota(&b)) {
            Ok(quota) => quota,
            Err(e) => {
                warn!("Failed to read relay quota: {}", e);
                Quota::UNKNOWN
            }
        }
    }
}
