//! The shared relay storage both sides talk to.

use crate::error::TransferError;
use crate::quota::Quota;
use async_trait::async_trait;
use std::path::Path;

/// Result of a metadata probe against a relay object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// The relay explicitly reported the object.
    Present,
    /// The relay explicitly reported that the object does not exist.
    Absent,
    /// No definite answer (transport error, auth failure, server error).
    Unknown,
}

/// Primitive operations on a flat relay directory.
///
/// Names are object names inside the relay directory. Implementations do not
/// retry; retry budgets belong to the workflows.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Probes for an object without fetching it.
    async fn probe(&self, name: &str) -> Presence;

    /// True only when the relay explicitly reports the object.
    async fn exists(&self, name: &str) -> bool {
        self.probe(name).await == Presence::Present
    }

    /// Creates a collection below the relay root; an existing one is fine.
    async fn make_collection(&self, path: &str) -> Result<(), TransferError>;

    /// Uploads the full contents of `local` as `name`.
    async fn upload(&self, local: &Path, name: &str) -> Result<(), TransferError>;

    /// Downloads `name` into `local`, replacing any existing file.
    async fn download(&self, name: &str, local: &Path) -> Result<(), TransferError>;

    /// Removes `name`; removing a missing object is not an error.
    async fn delete(&self, name: &str) -> Result<(), TransferError>;

    /// Best-effort storage usage; [`Quota::UNKNOWN`] when unavailable.
    async fn quota(&self) -> Quota;
}
