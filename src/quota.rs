//! Relay storage quota and the WebDAV PROPFIND response it is read from.

use crate::error::TransferError;
use quick_xml::events::Event;
use quick_xml::Reader;

/// PROPFIND body asking only for the two quota properties (RFC 4331).
pub(crate) const QUOTA_PROPFIND_BODY: &str = r#"<?xml version="1.0"?><propfind xmlns="DAV:"><prop><quota-available-bytes/><quota-used-bytes/></prop></propfind>"#;

/// Relay storage usage as last reported.
///
/// `None` means the relay did not say; callers treat an unknown
/// `available` as "proceed" rather than as zero capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quota {
    pub used: Option<u64>,
    pub available: Option<u64>,
}

impl Quota {
    /// The "could not determine" sentinel.
    pub const UNKNOWN: Quota = Quota {
        used: None,
        available: None,
    };

    pub fn is_known(&self) -> bool {
        self.available.is_some()
    }

    /// Whether `needed` bytes fit; `None` when free space is unknown.
    pub fn fits(&self, needed: u64) -> Option<bool> {
        self.available.map(|a| a >= needed)
    }
}

#[derive(Clone, Copy)]
enum Field {
    Used,
    Available,
}

/// Reads `quota-used-bytes` and `quota-available-bytes` from a multistatus body.
///
/// Elements are matched by local name, so any namespace prefix works. Missing
/// or negative values (Nextcloud reports `-3` for unlimited) stay unknown.
pub fn parse_quota(xml: &str) -> Result<Quota, TransferError> {
    let mut reader = Reader::from_str(xml);
    let mut quota = Quota::UNKNOWN;
    let mut current: Option<Field> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                current = match e.local_name().as_ref() {
                    b"quota-used-bytes" => Some(Field::Used),
                    b"quota-available-bytes" => Some(Field::Available),
                    _ => None,
                };
            }
            Event::Text(t) => {
                if let Some(field) = current {
                    let text = t.unescape()?;
                    let value = text.trim().parse::<i64>().ok().and_then(|v| u64::try_from(v).ok());
                    match field {
                        Field::Used => quota.used = quota.used.or(value),
                        Field::Available => quota.available = quota.available.or(value),
                    }
                }
            }
            Event::End(_) => current = None,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(quota)
}
