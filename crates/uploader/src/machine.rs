//! Pure state machines for units and batches.
//!
//! Transitions are data: the actor loops execute the returned effect, so
//! every reachable (state, input) pair is testable without I/O.

/// Lifecycle of a single file upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// Has (or awaits) a payload, not transferring.
    Idle,
    /// A transfer is in flight.
    Uploading,
    /// Settled successfully; the server record is known.
    Uploaded,
    /// Settled with a transport failure.
    Error,
    /// Destroyed. Terminal; the unit accepts nothing further.
    Stopped,
}

impl UnitState {
    /// Uploaded or Error: the unit has reached a terminal outcome within
    /// the current batch.
    pub fn is_settled(self) -> bool {
        matches!(self, UnitState::Uploaded | UnitState::Error)
    }
}

/// Everything that can drive a unit transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitInput {
    /// Attach or replace the payload.
    Attach,
    /// Start a transfer; guarded on an attached payload.
    StartUpload { has_file: bool },
    /// Transport reported cumulative bytes.
    Progress,
    /// Transport finished successfully.
    Success,
    /// Transport failed.
    Failure,
    /// Best-effort cancel; the in-flight transfer is not aborted.
    Cancel,
    /// Remove the unit from service.
    Destroy,
}

/// Side effect the actor must execute after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitEffect {
    AttachFile,
    BeginTransfer,
    RecordProgress,
    RecordSuccess,
    RecordFailure,
    ResetProgress,
    NotifyStopped,
}

/// The unit transition function. Pure and total: invalid pairs return the
/// same state with no effect.
pub fn unit_transition(state: UnitState, input: UnitInput) -> (UnitState, Option<UnitEffect>) {
    use UnitState::*;

    match (state, input) {
        (Idle | Uploaded | Error, UnitInput::Attach) => (Idle, Some(UnitEffect::AttachFile)),
        (Idle | Uploaded | Error, UnitInput::StartUpload { has_file: true }) => {
            (Uploading, Some(UnitEffect::BeginTransfer))
        }
        (Uploading, UnitInput::Progress) => (Uploading, Some(UnitEffect::RecordProgress)),
        (Uploading, UnitInput::Success) => (Uploaded, Some(UnitEffect::RecordSuccess)),
        (Uploading, UnitInput::Failure) => (Error, Some(UnitEffect::RecordFailure)),
        (Uploading, UnitInput::Cancel) => (Idle, Some(UnitEffect::ResetProgress)),
        (Stopped, UnitInput::Destroy) => (Stopped, None),
        (_, UnitInput::Destroy) => (Stopped, Some(UnitEffect::NotifyStopped)),
        (state, _) => (state, None),
    }
}

/// Batch-level state derived from the unit set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchState {
    #[default]
    Idle,
    Uploading,
    Uploaded,
    Error,
}

/// Evaluates the batch completion predicates over the current full unit
/// set. Stopped units are out of service and do not participate.
///
/// All uploaded wins; all settled with at least one error is a batch
/// error; an empty set is idle; anything else is still uploading.
pub fn derive_batch_state<I>(states: I) -> BatchState
where
    I: IntoIterator<Item = UnitState>,
{
    let mut any = false;
    let mut all_uploaded = true;
    let mut all_settled = true;
    let mut any_error = false;

    for state in states {
        if state == UnitState::Stopped {
            continue;
        }
        any = true;
        all_uploaded &= state == UnitState::Uploaded;
        all_settled &= state.is_settled();
        any_error |= state == UnitState::Error;
    }

    if !any {
        BatchState::Idle
    } else if all_uploaded {
        BatchState::Uploaded
    } else if all_settled && any_error {
        BatchState::Error
    } else {
        BatchState::Uploading
    }
}

/// Sum of sizes of units not yet uploaded. Recomputed from the full set
/// whenever membership changes; never patched incrementally.
pub fn pending_total<I>(units: I) -> u64
where
    I: IntoIterator<Item = (UnitState, u64)>,
{
    units
        .into_iter()
        .filter(|(state, _)| !matches!(state, UnitState::Uploaded | UnitState::Stopped))
        .map(|(_, size)| size)
        .sum()
}

/// Sum of sizes of uploaded units.
pub fn uploaded_total<I>(units: I) -> u64
where
    I: IntoIterator<Item = (UnitState, u64)>,
{
    units
        .into_iter()
        .filter(|(state, _)| *state == UnitState::Uploaded)
        .map(|(_, size)| size)
        .sum()
}

/// Byte-weighted percentage, rounded, clamped at 100. Unset while the
/// total is unknown or zero.
pub fn percentage(loaded: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let pct = (loaded as f64 * 100.0 / total as f64).round() as u64;
    Some(pct.min(100) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use UnitState::*;

    #[test]
    fn attach_valid_from_idle_uploaded_error() {
        for state in [Idle, Uploaded, Error] {
            let (next, effect) = unit_transition(state, UnitInput::Attach);
            assert_eq!(next, Idle);
            assert_eq!(effect, Some(UnitEffect::AttachFile));
        }
    }

    #[test]
    fn attach_ignored_while_uploading_or_stopped() {
        for state in [Uploading, Stopped] {
            let (next, effect) = unit_transition(state, UnitInput::Attach);
            assert_eq!(next, state);
            assert_eq!(effect, None);
        }
    }

    #[test]
    fn upload_guarded_on_attached_file() {
        let (next, effect) = unit_transition(Idle, UnitInput::StartUpload { has_file: false });
        assert_eq!(next, Idle);
        assert_eq!(effect, None);

        let (next, effect) = unit_transition(Idle, UnitInput::StartUpload { has_file: true });
        assert_eq!(next, Uploading);
        assert_eq!(effect, Some(UnitEffect::BeginTransfer));
    }

    #[test]
    fn retry_from_settled_states() {
        for state in [Uploaded, Error] {
            let (next, effect) = unit_transition(state, UnitInput::StartUpload { has_file: true });
            assert_eq!(next, Uploading);
            assert_eq!(effect, Some(UnitEffect::BeginTransfer));
        }
    }

    #[test]
    fn transport_outcomes_only_meaningful_while_uploading() {
        assert_eq!(
            unit_transition(Uploading, UnitInput::Success),
            (Uploaded, Some(UnitEffect::RecordSuccess))
        );
        assert_eq!(
            unit_transition(Uploading, UnitInput::Failure),
            (Error, Some(UnitEffect::RecordFailure))
        );
        assert_eq!(
            unit_transition(Uploading, UnitInput::Progress),
            (Uploading, Some(UnitEffect::RecordProgress))
        );

        for state in [Idle, Uploaded, Error, Stopped] {
            assert_eq!(unit_transition(state, UnitInput::Success), (state, None));
            assert_eq!(unit_transition(state, UnitInput::Failure), (state, None));
            assert_eq!(unit_transition(state, UnitInput::Progress), (state, None));
        }
    }

    #[test]
    fn cancel_only_meaningful_while_uploading() {
        assert_eq!(
            unit_transition(Uploading, UnitInput::Cancel),
            (Idle, Some(UnitEffect::ResetProgress))
        );
        for state in [Idle, Uploaded, Error, Stopped] {
            assert_eq!(unit_transition(state, UnitInput::Cancel), (state, None));
        }
    }

    #[test]
    fn destroy_valid_from_any_non_terminal_state() {
        for state in [Idle, Uploading, Uploaded, Error] {
            let (next, effect) = unit_transition(state, UnitInput::Destroy);
            assert_eq!(next, Stopped);
            assert_eq!(effect, Some(UnitEffect::NotifyStopped));
        }
    }

    #[test]
    fn stopped_accepts_nothing() {
        for input in [
            UnitInput::Attach,
            UnitInput::StartUpload { has_file: true },
            UnitInput::Progress,
            UnitInput::Success,
            UnitInput::Failure,
            UnitInput::Cancel,
            UnitInput::Destroy,
        ] {
            assert_eq!(unit_transition(Stopped, input), (Stopped, None));
        }
    }

    #[test]
    fn batch_state_empty_set_is_idle() {
        assert_eq!(derive_batch_state(std::iter::empty()), BatchState::Idle);
        assert_eq!(derive_batch_state([Stopped, Stopped]), BatchState::Idle);
    }

    #[test]
    fn batch_state_all_uploaded() {
        assert_eq!(derive_batch_state([Uploaded]), BatchState::Uploaded);
        assert_eq!(
            derive_batch_state([Uploaded, Uploaded, Uploaded]),
            BatchState::Uploaded
        );
        // Stopped units do not participate.
        assert_eq!(
            derive_batch_state([Uploaded, Stopped]),
            BatchState::Uploaded
        );
    }

    #[test]
    fn batch_state_error_requires_full_settlement() {
        assert_eq!(
            derive_batch_state([Uploaded, Error]),
            BatchState::Error
        );
        assert_eq!(derive_batch_state([Error, Error]), BatchState::Error);
        // One unit still in flight keeps the batch uploading.
        assert_eq!(
            derive_batch_state([Uploaded, Error, Uploading]),
            BatchState::Uploading
        );
        // An idle unit added mid-batch also blocks settlement.
        assert_eq!(
            derive_batch_state([Uploaded, Error, Idle]),
            BatchState::Uploading
        );
    }

    #[test]
    fn batch_state_every_reachable_subset_of_two() {
        // For two units, enumerate all state pairs and check the predicate
        // cases exhaustively.
        for a in [Idle, Uploading, Uploaded, Error] {
            for b in [Idle, Uploading, Uploaded, Error] {
                let derived = derive_batch_state([a, b]);
                let expected = if a == Uploaded && b == Uploaded {
                    BatchState::Uploaded
                } else if a.is_settled() && b.is_settled() {
                    BatchState::Error
                } else {
                    BatchState::Uploading
                };
                assert_eq!(derived, expected, "states {a:?},{b:?}");
            }
        }
    }

    #[test]
    fn pending_total_excludes_uploaded_and_stopped() {
        let units = [
            (Idle, 10),
            (Uploading, 20),
            (Uploaded, 30),
            (Error, 40),
            (Stopped, 50),
        ];
        assert_eq!(pending_total(units), 70);
        assert_eq!(uploaded_total(units), 30);
    }

    #[test]
    fn percentage_rounds_and_clamps() {
        assert_eq!(percentage(0, 0), None);
        assert_eq!(percentage(5, 0), None);
        assert_eq!(percentage(0, 60), Some(0));
        assert_eq!(percentage(30, 60), Some(50));
        assert_eq!(percentage(1, 3), Some(33));
        assert_eq!(percentage(2, 3), Some(67));
        assert_eq!(percentage(60, 60), Some(100));
        // Loaded past the pending-only total stays pinned at 100.
        assert_eq!(percentage(90, 60), Some(100));
    }
}
