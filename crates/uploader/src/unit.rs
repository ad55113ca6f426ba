//! Per-file upload actor.
//!
//! Each unit is a spawned task with private state and a single inbox.
//! Parent commands and transport callbacks share the inbox, so the unit's
//! own event stream is totally ordered: progress always precedes the
//! terminal outcome, and every transition runs to completion before the
//! next message.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use stowage_protocol::{FileMetadata, TransportError};
use stowage_transport::{Transport, TransportConfig, UploadRequest};

use crate::machine::{self, UnitEffect, UnitInput, UnitState};
use crate::types::{FileSource, UnitId};

/// Commands a unit accepts from its orchestrator.
#[derive(Debug)]
pub(crate) enum UnitCommand {
    /// Attach or replace the payload; returns the unit to idle.
    Attach {
        file: FileSource,
        file_id: Option<String>,
        bucket_id: Option<String>,
    },
    /// Start one transfer attempt.
    Upload { config: TransportConfig },
    /// Best-effort cancel; the in-flight transfer is not aborted.
    Cancel,
    /// Remove the unit from service. The task ends after notifying the
    /// parent.
    Destroy,
}

/// Everything that can land in a unit's inbox.
#[derive(Debug)]
pub(crate) enum UnitMsg {
    Command(UnitCommand),
    /// Cumulative bytes reported by the transfer task of `generation`.
    Progress { generation: u64, loaded: u64 },
    /// Terminal outcome of the transfer task of `generation`.
    Settled {
        generation: u64,
        result: Result<FileMetadata, TransportError>,
    },
}

/// Notifications a unit sends to its orchestrator.
#[derive(Debug)]
pub(crate) enum UnitEvent {
    /// Bytes newly confirmed on the wire.
    Progress { unit: UnitId, delta: u64, loaded: u64 },
    /// Settled successfully.
    Uploaded {
        unit: UnitId,
        metadata: Box<FileMetadata>,
    },
    /// Settled with a failure.
    Failed { unit: UnitId, error: TransportError },
    /// Returned to idle after a cancel.
    Cancelled { unit: UnitId },
    /// Destroyed; the parent may drop the handle.
    Stopped { unit: UnitId },
}

/// Spawns a unit task. The returned sender is the unit's only address;
/// dropping it ends the task.
pub(crate) fn spawn_unit(
    unit: UnitId,
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<UnitEvent>,
) -> (mpsc::UnboundedSender<UnitMsg>, JoinHandle<()>) {
    let (tx, inbox) = mpsc::unbounded_channel();
    let actor = UnitActor {
        unit,
        state: UnitState::Idle,
        file: None,
        file_id: None,
        bucket_id: None,
        loaded: 0,
        generation: 0,
        transport,
        inbox,
        self_tx: tx.clone(),
        events,
    };
    let task = tokio::spawn(actor.run());
    (tx, task)
}

struct UnitActor {
    unit: UnitId,
    state: UnitState,
    file: Option<FileSource>,
    file_id: Option<String>,
    bucket_id: Option<String>,
    /// Cumulative bytes confirmed for the current attempt.
    loaded: u64,
    /// Attempt counter. Transport messages from an older generation are
    /// stale and dropped.
    generation: u64,
    transport: Arc<dyn Transport>,
    inbox: mpsc::UnboundedReceiver<UnitMsg>,
    self_tx: mpsc::UnboundedSender<UnitMsg>,
    events: mpsc::UnboundedSender<UnitEvent>,
}

impl UnitActor {
    async fn run(mut self) {
        while let Some(msg) = self.inbox.recv().await {
            if self.handle(msg).is_break() {
                break;
            }
        }
        debug!(unit = %self.unit, "unit task ended");
    }

    fn handle(&mut self, msg: UnitMsg) -> ControlFlow<()> {
        match msg {
            UnitMsg::Command(cmd) => self.handle_command(cmd),
            UnitMsg::Progress { generation, loaded } => {
                self.handle_progress(generation, loaded);
                ControlFlow::Continue(())
            }
            UnitMsg::Settled { generation, result } => {
                self.handle_settled(generation, result);
                ControlFlow::Continue(())
            }
        }
    }

    fn handle_command(&mut self, cmd: UnitCommand) -> ControlFlow<()> {
        match cmd {
            UnitCommand::Attach {
                file,
                file_id,
                bucket_id,
            } => {
                let (next, effect) = machine::unit_transition(self.state, UnitInput::Attach);
                if effect != Some(UnitEffect::AttachFile) {
                    debug!(unit = %self.unit, state = ?self.state, "attach ignored");
                    return ControlFlow::Continue(());
                }
                self.state = next;
                self.file = Some(file);
                self.file_id = file_id;
                self.bucket_id = bucket_id;
                self.loaded = 0;
            }
            UnitCommand::Upload { config } => {
                let input = UnitInput::StartUpload {
                    has_file: self.file.is_some(),
                };
                let (next, effect) = machine::unit_transition(self.state, input);
                if effect != Some(UnitEffect::BeginTransfer) {
                    debug!(unit = %self.unit, state = ?self.state, "upload command ignored");
                    return ControlFlow::Continue(());
                }
                self.state = next;
                self.begin_transfer(config);
            }
            UnitCommand::Cancel => {
                let (next, effect) = machine::unit_transition(self.state, UnitInput::Cancel);
                if effect != Some(UnitEffect::ResetProgress) {
                    return ControlFlow::Continue(());
                }
                // The transfer keeps running; bumping the generation makes
                // its eventual outcome stale.
                self.state = next;
                self.generation += 1;
                self.loaded = 0;
                debug!(unit = %self.unit, "cancelled, back to idle");
                let _ = self.events.send(UnitEvent::Cancelled { unit: self.unit });
            }
            UnitCommand::Destroy => {
                let (next, effect) = machine::unit_transition(self.state, UnitInput::Destroy);
                if effect == Some(UnitEffect::NotifyStopped) {
                    self.state = next;
                    let _ = self.events.send(UnitEvent::Stopped { unit: self.unit });
                    return ControlFlow::Break(());
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_progress(&mut self, generation: u64, loaded: u64) {
        if generation != self.generation {
            debug!(unit = %self.unit, generation, "dropping stale progress");
            return;
        }
        let (_, effect) = machine::unit_transition(self.state, UnitInput::Progress);
        if effect != Some(UnitEffect::RecordProgress) {
            return;
        }
        // Cumulative bytes, not event count: duplicate or non-increasing
        // reports produce no delta.
        if loaded <= self.loaded {
            return;
        }
        let delta = loaded - self.loaded;
        self.loaded = loaded;
        let _ = self.events.send(UnitEvent::Progress {
            unit: self.unit,
            delta,
            loaded,
        });
    }

    fn handle_settled(&mut self, generation: u64, result: Result<FileMetadata, TransportError>) {
        if generation != self.generation {
            warn!(unit = %self.unit, generation, "dropping stale completion");
            return;
        }
        match result {
            Ok(metadata) => {
                let (next, effect) = machine::unit_transition(self.state, UnitInput::Success);
                if effect != Some(UnitEffect::RecordSuccess) {
                    return;
                }
                self.state = next;
                self.file_id = Some(metadata.id.clone());
                self.bucket_id = Some(metadata.bucket_id.clone());
                self.loaded = self.file.as_ref().map(FileSource::size).unwrap_or(0);
                debug!(unit = %self.unit, id = %metadata.id, "uploaded");
                let _ = self.events.send(UnitEvent::Uploaded {
                    unit: self.unit,
                    metadata: Box::new(metadata),
                });
            }
            Err(error) => {
                let (next, effect) = machine::unit_transition(self.state, UnitInput::Failure);
                if effect != Some(UnitEffect::RecordFailure) {
                    return;
                }
                self.state = next;
                warn!(unit = %self.unit, status = error.status, "upload failed: {}", error.message);
                let _ = self.events.send(UnitEvent::Failed {
                    unit: self.unit,
                    error,
                });
            }
        }
    }

    /// Spawns the transfer task for a fresh attempt. The task forwards
    /// cumulative progress and the terminal outcome into the inbox,
    /// stamped with the attempt generation.
    fn begin_transfer(&mut self, config: TransportConfig) {
        let Some(file) = self.file.clone() else {
            return;
        };
        self.generation += 1;
        self.loaded = 0;
        let generation = self.generation;

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let request = UploadRequest {
            bucket_id: self.bucket_id.clone(),
            file_id: self.file_id.clone(),
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            content: file.content,
            progress: Some(progress_tx),
        };

        let transport = Arc::clone(&self.transport);
        let inbox = self.self_tx.clone();
        tokio::spawn(async move {
            let mut call = transport.upload(config, request);
            let mut progress_open = true;
            let result = loop {
                tokio::select! {
                    maybe = progress_rx.recv(), if progress_open => match maybe {
                        Some(loaded) => {
                            let _ = inbox.send(UnitMsg::Progress { generation, loaded });
                        }
                        None => progress_open = false,
                    },
                    result = &mut call => break result,
                }
            };
            // Progress strictly precedes settlement: drain what is left
            // before reporting the outcome.
            while let Ok(loaded) = progress_rx.try_recv() {
                let _ = inbox.send(UnitMsg::Progress { generation, loaded });
            }
            let _ = inbox.send(UnitMsg::Settled { generation, result });
        });
    }
}
