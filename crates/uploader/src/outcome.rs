//! Single-shot upload for callers that want call-and-await instead of a
//! snapshot stream.

use std::sync::Arc;

use stowage_transport::{Transport, TransportConfig};

use crate::UploadError;
use crate::batch::UploadOrchestrator;
use crate::machine::{BatchState, UnitState};
use crate::types::{FileSource, UnitSnapshot};

/// Outcome of a one-shot batch upload.
///
/// On success `units` holds every unit. On failure it holds only the
/// errored units, each carrying its own error payload, so a caller can
/// re-drive exactly the failed files without re-uploading successful ones.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub is_error: bool,
    pub units: Vec<UnitSnapshot>,
}

/// Uploads `files` as one batch and resolves once the whole batch settles.
///
/// Settles exactly once, on the first uploaded/error sighting, then
/// detaches its observer and shuts the private orchestrator down — one
/// adapter per batch, by construction. An empty `files` settles
/// immediately with success and no units.
pub async fn upload_files(
    transport: Arc<dyn Transport>,
    config: TransportConfig,
    files: Vec<FileSource>,
    bucket_id: Option<String>,
) -> Result<UploadOutcome, UploadError> {
    if files.is_empty() {
        return Ok(UploadOutcome {
            is_error: false,
            units: Vec::new(),
        });
    }

    let orchestrator = UploadOrchestrator::spawn(transport);
    let mut changes = orchestrator.watch();
    orchestrator.add(files, bucket_id).await?;
    orchestrator.upload(None, None, config)?;

    let outcome = loop {
        changes.changed().await.map_err(|_| UploadError::Closed)?;
        let snapshot = changes.borrow_and_update().clone();
        match snapshot.state {
            BatchState::Uploaded => {
                break UploadOutcome {
                    is_error: false,
                    units: snapshot.units,
                };
            }
            BatchState::Error => {
                break UploadOutcome {
                    is_error: true,
                    units: snapshot
                        .units
                        .into_iter()
                        .filter(|unit| unit.state == UnitState::Error)
                        .collect(),
                };
            }
            _ => {}
        }
    };

    drop(changes);
    orchestrator.shutdown();
    Ok(outcome)
}
