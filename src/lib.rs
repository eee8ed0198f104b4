//! davrelay - move large files between two machines through a WebDAV drop folder
//!
//! The producer splits a file into fixed-size chunks and pushes them through a
//! quota-limited WebDAV directory one at a time. The consumer downloads each
//! chunk, verifies it against the manifest and deletes it, which is the only
//! signal the producer waits for before sending the next one. At most one
//! chunk (plus the manifest) occupies the relay at any moment.
//!
//! # Features
//!
//! - **Bounded relay usage**: one chunk in flight, quota-gated uploads
//! - **SHA-256 verification**: every chunk is checked against the manifest
//! - **Automatic retry**: fixed-budget retries for downloads and bad chunks
//! - **Multiple sources**: HTTP(S), magnet links (external engine), local files
//! - **Standalone merge**: rebuild files from a manifest and a chunk directory
//!
//! # Example
//!
//! ```no_run
//! use davrelay::{run_consumer, Config, Credentials, WebDavRelay};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let relay = WebDavRelay::new(&config, Credentials::new("user", "password"))?;
//! let summary = run_consumer(&config, &relay).await?;
//! println!("merged {:?}", summary.outputs);
//! # Ok(())
//! # }
//! ```

pub mod acquire;
pub mod checksum;
pub mod chunker;
pub mod consumer;
pub mod download;
pub mod error;
pub mod manifest;
pub mod merge;
pub mod producer;
pub mod progress;
pub mod prompt;
pub mod quota;
pub mod relay;
pub mod space;
pub mod types;
pub mod wait;
pub mod webdav;

#[cfg(test)]
mod test_server;

pub use acquire::{CommandAcquirer, MagnetAcquirer, Source};
pub use consumer::{run_consumer, ConsumerSummary};
pub use error::TransferError;
pub use manifest::{build_manifest, Manifest, ManifestEntry};
pub use merge::{merge_from_manifest, MergeReport};
pub use producer::{run_producer, ProducerRequest, ProducerSummary};
pub use quota::Quota;
pub use relay::{Presence, Relay};
pub use types::{Config, Credentials, DEFAULT_CHUNK_SIZE};
pub use webdav::WebDavRelay;
