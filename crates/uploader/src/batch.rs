//! Batch orchestrator.
//!
//! Owns a dynamic collection of unit handles, fans out commands, and
//! aggregates byte-weighted progress. All mutation happens on the
//! orchestrator's single message loop, so updates from different units are
//! naturally serialized — there is no shared mutable state and no locking.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stowage_transport::{Transport, TransportConfig};

use crate::UploadError;
use crate::machine::{self, BatchState, UnitState};
use crate::types::{BatchSnapshot, FileSource, UnitId, UnitSnapshot};
use crate::unit::{UnitCommand, UnitEvent, UnitMsg, spawn_unit};

/// Handle to a running upload batch.
///
/// Commands are fire-and-forget into the orchestrator task; state is
/// observed through [`snapshot`](Self::snapshot) or the
/// [`watch`](Self::watch) stream. Dropping the handle shuts the batch
/// down.
pub struct UploadOrchestrator {
    cmd_tx: mpsc::UnboundedSender<BatchCommand>,
    snapshot_rx: watch::Receiver<BatchSnapshot>,
    cancel: CancellationToken,
}

enum BatchCommand {
    Add {
        files: Vec<FileSource>,
        bucket_id: Option<String>,
        reply: oneshot::Sender<Vec<UnitId>>,
    },
    Upload {
        files: Option<Vec<FileSource>>,
        bucket_id: Option<String>,
        config: TransportConfig,
    },
    Cancel,
    RemoveStopped,
    DestroyUnit {
        unit: UnitId,
    },
    Clear,
}

impl UploadOrchestrator {
    /// Spawns a fresh orchestrator for one batch.
    ///
    /// A batch is not designed for concurrent reuse: once its units have
    /// been uploaded and cleared, prefer a fresh instance over driving a
    /// second, unrelated batch through the same handle.
    pub fn spawn(transport: Arc<dyn Transport>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(BatchSnapshot::default());
        let cancel = CancellationToken::new();

        let actor = OrchestratorActor {
            transport,
            units: Vec::new(),
            next_unit: 0,
            state: BatchState::Idle,
            progress: None,
            loaded: 0,
            total: 0,
            clearing: false,
            cmd_rx,
            events_tx,
            events_rx,
            snapshot_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(actor.run());

        Self {
            cmd_tx,
            snapshot_rx,
            cancel,
        }
    }

    /// Adds files as new units with their payloads attached, and returns
    /// their identifiers. Recomputes the batch total.
    pub async fn add(
        &self,
        files: Vec<FileSource>,
        bucket_id: Option<String>,
    ) -> Result<Vec<UnitId>, UploadError> {
        let (reply, rx) = oneshot::channel();
        self.send(BatchCommand::Add {
            files,
            bucket_id,
            reply,
        })?;
        rx.await.map_err(|_| UploadError::Closed)
    }

    /// Starts an upload attempt for every pending unit, adding `files`
    /// first when given.
    ///
    /// Guarded on at least one pending unit; a guard miss is a logged
    /// no-op, not an error.
    pub fn upload(
        &self,
        files: Option<Vec<FileSource>>,
        bucket_id: Option<String>,
        config: TransportConfig,
    ) -> Result<(), UploadError> {
        self.send(BatchCommand::Upload {
            files,
            bucket_id,
            config,
        })
    }

    /// Cancels the batch: best-effort per unit, aggregate progress unset,
    /// back to idle. Units keep their payloads for a retry.
    pub fn cancel(&self) -> Result<(), UploadError> {
        self.send(BatchCommand::Cancel)
    }

    /// Drops units that have reached the stopped state. Units in any other
    /// state are unaffected.
    pub fn remove_stopped(&self) -> Result<(), UploadError> {
        self.send(BatchCommand::RemoveStopped)
    }

    /// Destroys one unit. The unit is marked stopped once it confirms and
    /// stays in the set until [`remove_stopped`](Self::remove_stopped).
    pub fn destroy_unit(&self, unit: UnitId) -> Result<(), UploadError> {
        self.send(BatchCommand::DestroyUnit { unit })
    }

    /// Destroys every unit and resets to an empty batch once all have
    /// stopped.
    pub fn clear(&self) -> Result<(), UploadError> {
        self.send(BatchCommand::Clear)
    }

    /// Current batch snapshot.
    pub fn snapshot(&self) -> BatchSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// A receiver yielding a fresh snapshot after every processed message.
    pub fn watch(&self) -> watch::Receiver<BatchSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Stops the orchestrator task, destroying all units.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn send(&self, cmd: BatchCommand) -> Result<(), UploadError> {
        self.cmd_tx.send(cmd).map_err(|_| UploadError::Closed)
    }
}

/// Bookkeeping the orchestrator holds per unit: the unit's address plus a
/// mirror of its last reported state, maintained exclusively from unit
/// events.
struct UnitEntry {
    unit: UnitId,
    tx: mpsc::UnboundedSender<UnitMsg>,
    file_name: String,
    file_size: u64,
    state: UnitState,
    progress: Option<u8>,
    loaded: u64,
    error: Option<stowage_protocol::TransportError>,
    file_id: Option<String>,
    bucket_id: Option<String>,
}

impl UnitEntry {
    fn pending(&self) -> bool {
        matches!(self.state, UnitState::Idle | UnitState::Error)
    }

    fn snapshot(&self) -> UnitSnapshot {
        UnitSnapshot {
            unit: self.unit,
            state: self.state,
            progress: self.progress,
            loaded: self.loaded,
            error: self.error.clone(),
            id: self.file_id.clone(),
            bucket_id: self.bucket_id.clone(),
            file_name: self.file_name.clone(),
            file_size: self.file_size,
        }
    }
}

struct OrchestratorActor {
    transport: Arc<dyn Transport>,
    units: Vec<UnitEntry>,
    next_unit: u64,
    state: BatchState,
    progress: Option<u8>,
    loaded: u64,
    total: u64,
    /// Set while a clear is waiting for every unit to stop.
    clearing: bool,
    cmd_rx: mpsc::UnboundedReceiver<BatchCommand>,
    events_tx: mpsc::UnboundedSender<UnitEvent>,
    events_rx: mpsc::UnboundedReceiver<UnitEvent>,
    snapshot_tx: watch::Sender<BatchSnapshot>,
    cancel: CancellationToken,
}

impl OrchestratorActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }
            self.publish();
        }

        for entry in &self.units {
            let _ = entry.tx.send(UnitMsg::Command(UnitCommand::Destroy));
        }
        debug!("orchestrator task ended");
    }

    fn handle_command(&mut self, cmd: BatchCommand) {
        match cmd {
            BatchCommand::Add {
                files,
                bucket_id,
                reply,
            } => {
                let ids = self.add_files(files, bucket_id);
                let _ = reply.send(ids);
            }
            BatchCommand::Upload {
                files,
                bucket_id,
                config,
            } => {
                if let Some(files) = files {
                    self.add_files(files, bucket_id);
                }
                self.start_upload(config);
            }
            BatchCommand::Cancel => self.cancel_units(),
            BatchCommand::RemoveStopped => {
                let before = self.units.len();
                self.units.retain(|entry| entry.state != UnitState::Stopped);
                let removed = before - self.units.len();
                if removed > 0 {
                    debug!(removed, "pruned stopped units");
                }
            }
            BatchCommand::DestroyUnit { unit } => {
                if let Some(entry) = self.units.iter().find(|entry| entry.unit == unit) {
                    let _ = entry.tx.send(UnitMsg::Command(UnitCommand::Destroy));
                }
            }
            BatchCommand::Clear => self.clear(),
        }
    }

    fn add_files(&mut self, files: Vec<FileSource>, bucket_id: Option<String>) -> Vec<UnitId> {
        let mut ids = Vec::with_capacity(files.len());
        for file in files {
            self.next_unit += 1;
            let unit = UnitId(self.next_unit);
            let (tx, _task) = spawn_unit(unit, Arc::clone(&self.transport), self.events_tx.clone());
            let _ = tx.send(UnitMsg::Command(UnitCommand::Attach {
                file: file.clone(),
                file_id: None,
                bucket_id: bucket_id.clone(),
            }));
            self.units.push(UnitEntry {
                unit,
                tx,
                file_name: file.name,
                file_size: file.content.len() as u64,
                state: UnitState::Idle,
                progress: None,
                loaded: 0,
                error: None,
                file_id: None,
                bucket_id: bucket_id.clone(),
            });
            ids.push(unit);
            debug!(unit = %unit, "unit added");
        }
        self.recompute_total();
        ids
    }

    fn start_upload(&mut self, config: TransportConfig) {
        if !self.units.iter().any(UnitEntry::pending) {
            debug!("upload command ignored: no pending units");
            return;
        }

        self.loaded = 0;
        self.progress = None;
        self.recompute_total();
        self.state = BatchState::Uploading;

        let mut driven = 0;
        for entry in &mut self.units {
            if !entry.pending() {
                continue;
            }
            let _ = entry.tx.send(UnitMsg::Command(UnitCommand::Upload {
                config: config.clone(),
            }));
            entry.state = UnitState::Uploading;
            entry.progress = None;
            entry.loaded = 0;
            entry.error = None;
            driven += 1;
        }
        info!(units = driven, total = self.total, "batch upload started");
    }

    fn cancel_units(&mut self) {
        for entry in &self.units {
            let _ = entry.tx.send(UnitMsg::Command(UnitCommand::Cancel));
        }
        self.state = BatchState::Idle;
        self.progress = None;
        self.loaded = 0;
        info!("batch cancelled");
    }

    fn clear(&mut self) {
        self.clearing = true;
        for entry in &self.units {
            if entry.state != UnitState::Stopped {
                let _ = entry.tx.send(UnitMsg::Command(UnitCommand::Destroy));
            }
        }
        self.finish_clear_if_done();
    }

    fn handle_event(&mut self, event: UnitEvent) {
        match event {
            UnitEvent::Progress { unit, delta, loaded } => {
                let Some(entry) = self.entry_mut(unit) else {
                    return;
                };
                if entry.state != UnitState::Uploading {
                    return;
                }
                entry.loaded = loaded;
                entry.progress = machine::percentage(loaded, entry.file_size);
                if self.state == BatchState::Uploading {
                    self.loaded += delta;
                    self.progress = machine::percentage(self.loaded, self.total);
                }
            }
            UnitEvent::Uploaded { unit, metadata } => {
                let Some(entry) = self.entry_mut(unit) else {
                    return;
                };
                if entry.state == UnitState::Uploaded {
                    return;
                }
                entry.state = UnitState::Uploaded;
                entry.progress = Some(100);
                entry.loaded = entry.file_size;
                entry.error = None;
                entry.file_id = Some(metadata.id.clone());
                entry.bucket_id = Some(metadata.bucket_id.clone());
                debug!(unit = %unit, id = %metadata.id, "unit uploaded");
                self.settle();
            }
            UnitEvent::Failed { unit, error } => {
                let Some(entry) = self.entry_mut(unit) else {
                    return;
                };
                if entry.state == UnitState::Error {
                    return;
                }
                entry.state = UnitState::Error;
                entry.error = Some(error);
                self.settle();
            }
            UnitEvent::Cancelled { unit } => {
                let Some(entry) = self.entry_mut(unit) else {
                    return;
                };
                entry.state = UnitState::Idle;
                entry.progress = None;
                entry.loaded = 0;
            }
            UnitEvent::Stopped { unit } => {
                let Some(entry) = self.entry_mut(unit) else {
                    return;
                };
                entry.state = UnitState::Stopped;
                self.recompute_total();
                self.finish_clear_if_done();
            }
        }
    }

    /// Re-evaluates the completion predicates over the current full unit
    /// set. Never a running counter, so duplicate or reordered settlement
    /// delivery cannot corrupt the result.
    fn settle(&mut self) {
        if self.state != BatchState::Uploading {
            return;
        }
        match machine::derive_batch_state(self.units.iter().map(|entry| entry.state)) {
            BatchState::Uploaded => {
                self.state = BatchState::Uploaded;
                self.progress = Some(100);
                self.loaded =
                    machine::uploaded_total(self.units.iter().map(|e| (e.state, e.file_size)));
                info!(loaded = self.loaded, "batch uploaded");
            }
            BatchState::Error => {
                self.state = BatchState::Error;
                let failed = self
                    .units
                    .iter()
                    .filter(|entry| entry.state == UnitState::Error)
                    .count();
                warn!(failed, "batch settled with errors");
            }
            _ => {}
        }
    }

    fn finish_clear_if_done(&mut self) {
        if !self.clearing {
            return;
        }
        if self.units.iter().all(|e| e.state == UnitState::Stopped) {
            self.units.clear();
            self.state = BatchState::Idle;
            self.progress = None;
            self.loaded = 0;
            self.total = 0;
            self.clearing = false;
            info!("batch cleared");
        }
    }

    fn recompute_total(&mut self) {
        self.total = machine::pending_total(self.units.iter().map(|e| (e.state, e.file_size)));
    }

    fn entry_mut(&mut self, unit: UnitId) -> Option<&mut UnitEntry> {
        let entry = self.units.iter_mut().find(|entry| entry.unit == unit);
        if entry.is_none() {
            debug!(unit = %unit, "event for unknown unit dropped");
        }
        entry
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(BatchSnapshot {
            state: self.state,
            progress: self.progress,
            loaded: self.loaded,
            total: self.total,
            units: self.units.iter().map(UnitEntry::snapshot).collect(),
        });
    }
}
