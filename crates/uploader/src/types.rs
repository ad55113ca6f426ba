//! Public data types: payloads and snapshots.

use std::fmt;

use bytes::Bytes;

use stowage_protocol::TransportError;

use crate::machine::{BatchState, UnitState};

/// One file to upload: a name, an optional MIME type, and its contents.
///
/// Contents are cheaply cloneable so a unit can retain the payload across
/// retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    pub name: String,
    pub mime_type: Option<String>,
    pub content: Bytes,
}

impl FileSource {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            content: content.into(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Orchestrator-local identifier for one unit. Stable for the lifetime of
/// the unit, unrelated to the server-assigned file id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub(crate) u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point-in-time view of one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSnapshot {
    pub unit: UnitId,
    pub state: UnitState,
    /// Percentage of this unit's payload, unset before the first report.
    pub progress: Option<u8>,
    /// Bytes confirmed on the wire for the current attempt.
    pub loaded: u64,
    /// Failure of the most recent attempt, if any.
    pub error: Option<TransportError>,
    /// Server-assigned file identifier, populated on success.
    pub id: Option<String>,
    /// Bucket the file was requested into, replaced by the server-assigned
    /// bucket on success.
    pub bucket_id: Option<String>,
    pub file_name: String,
    pub file_size: u64,
}

/// Point-in-time view of the whole batch, published after every processed
/// message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSnapshot {
    pub state: BatchState,
    /// Byte-weighted aggregate percentage, unset while idle.
    pub progress: Option<u8>,
    /// Aggregate bytes confirmed for the current attempt.
    pub loaded: u64,
    /// Sum of sizes of units not yet uploaded.
    pub total: u64,
    pub units: Vec<UnitSnapshot>,
}

impl BatchSnapshot {
    pub fn is_uploading(&self) -> bool {
        self.state == BatchState::Uploading
    }

    pub fn is_uploaded(&self) -> bool {
        self.state == BatchState::Uploaded
    }

    pub fn is_error(&self) -> bool {
        self.state == BatchState::Error
    }
}
