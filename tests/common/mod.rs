//! In-memory relay shared by the session tests.

#![allow(dead_code)]

use async_trait::async_trait;
use davrelay::{Config, Presence, Quota, Relay, TransferError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A relay backed by a map, recording every mutating call.
#[derive(Default)]
pub struct MemoryRelay {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    events: Mutex<Vec<String>>,
    quotas: Mutex<VecDeque<Quota>>,
    corrupt_downloads: AtomicUsize,
    failing_uploads: AtomicUsize,
    lost_replies: Mutex<HashSet<String>>,
    pub quota_probes: AtomicUsize,
    pub downloads: AtomicUsize,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quota answers handed out in order; once drained, quota is unknown.
    pub fn with_quotas(quotas: impl IntoIterator<Item = Quota>) -> Self {
        let relay = Self::new();
        relay.quotas.lock().unwrap().extend(quotas);
        relay
    }

    /// The next `n` downloads deliver a flipped first byte.
    pub fn corrupt_next(&self, n: usize) {
        self.corrupt_downloads.store(n, Ordering::SeqCst);
    }

    /// The next `n` uploads are rejected with HTTP 507.
    pub fn fail_next_uploads(&self, n: usize) {
        self.failing_uploads.store(n, Ordering::SeqCst);
    }

    /// The next upload of `name` is stored but reported as failed.
    pub fn lose_upload_reply(&self, name: &str) {
        self.lost_replies.lock().unwrap().insert(name.to_string());
    }

    pub fn put(&self, name: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(name.to_string(), data.to_vec());
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn probe(&self, name: &str) -> Presence {
        if self.objects.lock().unwrap().contains_key(name) {
            Presence::Present
        } else {
            Presence::Absent
        }
    }

    async fn make_collection(&self, path: &str) -> Result<(), TransferError> {
        self.record(format!("mkcol {}", path));
        Ok(())
    }

    async fn upload(&self, local: &Path, name: &str) -> Result<(), TransferError> {
        if take_one(&self.failing_uploads) {
            self.record(format!("rejected {}", name));
            return Err(TransferError::RelayStatus {
                operation: "PUT",
                target: name.to_string(),
                status: reqwest::StatusCode::INSUFFICIENT_STORAGE,
            });
        }
        let data = tokio::fs::read(local).await?;
        self.put(name, &data);
        self.record(format!("upload {}", name));
        if self.lost_replies.lock().unwrap().remove(name) {
            return Err(TransferError::IoError(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )));
        }
        Ok(())
    }

    async fn download(&self, name: &str, local: &Path) -> Result<(), TransferError> {
        let mut data = self
            .objects
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| TransferError::RelayStatus {
                operation: "GET",
                target: name.to_string(),
                status: reqwest::StatusCode::NOT_FOUND,
            })?;
        self.downloads.fetch_add(1, Ordering::SeqCst);

        if take_one(&self.corrupt_downloads) {
            if let Some(first) = data.first_mut() {
                *first ^= 0xff;
            }
        }

        tokio::fs::write(local, &data).await?;
        self.record(format!("download {}", name));
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), TransferError> {
        self.objects.lock().unwrap().remove(name);
        self.record(format!("delete {}", name));
        Ok(())
    }

    async fn quota(&self) -> Quota {
        self.quota_probes.fetch_add(1, Ordering::SeqCst);
        self.quotas
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Quota::UNKNOWN)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// A config with millisecond waits rooted at `work_dir`.
pub fn fast_config(work_dir: &Path) -> Config {
    Config {
        work_dir: work_dir.to_path_buf(),
        chunk_size: 1024,
        poll_interval: Duration::from_millis(5),
        quota_poll_interval: Duration::from_millis(5),
        max_wait: Some(Duration::from_secs(10)),
        download_retry_delay: Duration::from_millis(1),
        verify_retry_delay: Duration::from_millis(1),
        ..Config::default()
    }
}

pub fn known(available: u64) -> Quota {
    Quota {
        used: Some(0),
        available: Some(available),
    }
}
