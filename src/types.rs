//! Session configuration and credentials.

use crate::error::TransferError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default chunk size: 1 GiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024 * 1024;

/// Configuration for one producer or consumer session.
///
/// Built once (defaults, optional JSON file, then command line overrides) and
/// passed explicitly to every workflow function.
///
/// # Example
///
/// ```
/// use davrelay::Config;
/// use std::time::Duration;
///
/// let config = Config {
///     base_url: "https://cloud.example.org/remote.php/webdav/".to_string(),
///     chunk_size: 256 * 1024 * 1024,
///     max_wait: Some(Duration::from_secs(6 * 3600)),
///     ..Config::default()
/// };
/// assert_eq!(config.remote_dir, "chunks");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// WebDAV root the relay directory lives under (e.g. `<https://host/remote.php/webdav/>`)
    pub base_url: String,
    /// Relay directory below `base_url` holding the manifest and chunks.
    pub remote_dir: String,
    /// Object name of the manifest, both locally and on the relay.
    pub manifest_name: String,
    /// Local scratch directory for sources, chunks and the manifest.
    pub work_dir: PathBuf,
    /// Where the consumer writes merged files (default: `work_dir`).
    pub output_dir: Option<PathBuf>,
    /// Chunk size in bytes.
    pub chunk_size: u64,
    /// Interval between relay presence probes.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Interval between quota probes while waiting for relay capacity.
    #[serde(with = "humantime_serde")]
    pub quota_poll_interval: Duration,
    /// Longest silence tolerated while reading a relay response.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Upper bound for any single wait; `None` waits forever.
    #[serde(with = "humantime_serde::option")]
    pub max_wait: Option<Duration>,
    /// Total attempts for source downloads.
    pub download_attempts: usize,
    #[serde(with = "humantime_serde")]
    pub download_retry_delay: Duration,
    /// Total attempts to fetch a chunk whose checksum matches the manifest.
    pub verify_attempts: usize,
    #[serde(with = "humantime_serde")]
    pub verify_retry_delay: Duration,
    /// Command used to fetch magnet links. `{magnet}` and `{dir}` are substituted.
    pub torrent_command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://dms.uom.lk/remote.php/webdav/".to_string(),
            remote_dir: "chunks".to_string(),
            manifest_name: "manifest.txt".to_string(),
            work_dir: PathBuf::from("."),
            output_dir: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: Duration::from_secs(5),
            quota_poll_interval: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            max_wait: None,
            download_attempts: 3,
            download_retry_delay: Duration::from_secs(5),
            verify_attempts: 3,
            verify_retry_delay: Duration::from_secs(3),
            torrent_command: ["aria2c", "--seed-time=0", "--dir", "{dir}", "{magnet}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Loads a configuration from a JSON file; absent fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, TransferError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Rejects settings no session can run with.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.chunk_size == 0 {
            return Err(TransferError::InvalidConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.download_attempts == 0 || self.verify_attempts == 0 {
            return Err(TransferError::InvalidConfig(
                "attempt budgets must be at least 1".to_string(),
            ));
        }
        if self.read_timeout.is_zero() {
            return Err(TransferError::InvalidConfig(
                "read timeout must be greater than zero".to_string(),
            ));
        }
        if self.manifest_name.is_empty() || self.manifest_name.contains('/') {
            return Err(TransferError::InvalidConfig(format!(
                "manifest name {:?} must be a plain file name",
                self.manifest_name
            )));
        }
        Ok(())
    }

    /// Local directory holding chunk files.
    pub fn chunk_dir(&self) -> PathBuf {
        self.work_dir.join("chunks")
    }

    /// Local path of the manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.work_dir.join(&self.manifest_name)
    }

    /// Directory merged files are written to.
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.work_dir.clone())
    }
}

/// WebDAV login. The password is kept out of `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Serde helpers storing durations as humantime strings (`"5s"`, `"1h 30m"`).
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(text) => humantime::parse_duration(&text)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}
