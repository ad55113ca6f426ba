//! Concurrent multi-file upload orchestration.
//!
//! One actor per file (a unit), a parent orchestrator that fans out
//! commands and aggregates byte-weighted progress, and a one-shot adapter
//! for callers that want a single awaitable result. Actors communicate
//! only through channels; a unit never observes its siblings, and every
//! aggregate is recomputed from the full unit set on settlement so that
//! duplicate or reordered delivery cannot corrupt it.
//!
//! The wire side is abstracted behind [`stowage_transport::Transport`];
//! a unit's failure stays local and surfaces as a value in snapshots and
//! outcomes, never as a panic or a torn-down batch.

mod batch;
mod machine;
mod outcome;
#[cfg(test)]
mod testutil;
mod types;
mod unit;

pub use batch::UploadOrchestrator;
pub use machine::{BatchState, UnitState};
pub use outcome::{UploadOutcome, upload_files};
pub use types::{BatchSnapshot, FileSource, UnitId, UnitSnapshot};

pub use stowage_protocol::{FileMetadata, TransportError};
pub use stowage_transport::{Transport, TransportConfig};

/// Errors from an orchestrator handle.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The orchestrator task is gone (shut down or handle dropped).
    #[error("upload batch closed")]
    Closed,
}
