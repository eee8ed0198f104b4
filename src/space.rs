//! Local disk and relay capacity checks run before a producer session.

use crate::error::TransferError;
use crate::quota::Quota;
use std::path::Path;
use sysinfo::Disks;
use tracing::{info, warn};

/// Free bytes on the filesystem holding `path`, if it can be determined.
pub fn local_free_space(path: &Path) -> Option<u64> {
    let target = std::fs::canonicalize(path).ok()?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| target.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| d.available_space())
}

/// Inputs for the pre-transfer capacity check.
#[derive(Debug, Clone, Copy)]
pub struct Capacity {
    /// Free local bytes, `None` if unknown.
    pub local_free: Option<u64>,
    /// Expected source size, `None` if the source did not say.
    pub source_size: Option<u64>,
    pub chunk_size: u64,
    pub relay: Quota,
}

impl Capacity {
    /// Local bytes a session needs: the whole source or one chunk, whichever is larger.
    pub fn local_required(&self) -> u64 {
        self.source_size
            .map_or(self.chunk_size, |size| size.max(self.chunk_size))
    }

    /// Fails when a known free space cannot hold what the session needs.
    ///
    /// Unknown values are logged and do not block.
    pub fn check(&self) -> Result<(), TransferError> {
        let required = self.local_required();
        match self.local_free {
            Some(free) if free <= required => {
                return Err(TransferError::InsufficientSpace {
                    location: "local",
                    required,
                    available: free,
                });
            }
            Some(free) => info!(
                "💾 Local free space: {:.2} GB (need {:.2} GB)",
                gb(free),
                gb(required)
            ),
            None => warn!("⚠️  Could not determine local free space; skipping local check"),
        }

        match self.relay.available {
            Some(avail) if avail <= self.chunk_size => Err(TransferError::InsufficientSpace {
                location: "relay",
                required: self.chunk_size,
                available: avail,
            }),
            Some(avail) => {
                info!("☁️  Relay free space: {:.2} GB", gb(avail));
                Ok(())
            }
            None => {
                warn!("⚠️  Could not fetch relay quota; skipping relay space checks");
                Ok(())
            }
        }
    }
}

pub(crate) fn gb(bytes: u64) -> f64 {
    bytes as f64 / 1e9
}
