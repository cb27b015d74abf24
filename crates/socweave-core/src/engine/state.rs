//! Typed state deltas and the guarded merge contract.
//!
//! Steps never mutate [`RunState`] directly: each returns a [`StateDelta`]
//! and the executor applies it inside a single-writer critical section.
//! Scalar fields are last-writer-overwrite; the action log is
//! concatenation-on-apply, so concurrent branches each contribute entries
//! without data loss. Status transitions are re-derived and guarded on every
//! apply.

use serde_json::{json, Value};

use socweave_types::error::MergeError;
use socweave_types::log::ActionLog;
use socweave_types::run::{Decision, Enrichment, PlaybookChoice, RunState, RunStatus};
use socweave_types::score::{ExploitabilityScore, SeverityScore, ValidityScore};

// ---------------------------------------------------------------------------
// FieldWrite
// ---------------------------------------------------------------------------

/// One scalar field write in a delta.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldWrite {
    Enrichment(Enrichment),
    Validity(ValidityScore),
    Severity(SeverityScore),
    Exploitability(ExploitabilityScore),
    Playbooks(PlaybookChoice),
    Decision(Decision),
    CaseRef(String),
    StatusNote(String),
    /// Explicit status transition, checked against the transition table.
    Status(RunStatus),
}

impl FieldWrite {
    /// Field name for step-log summaries.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Enrichment(_) => "enrichment",
            Self::Validity(_) => "validity",
            Self::Severity(_) => "severity",
            Self::Exploitability(_) => "exploitability",
            Self::Playbooks(_) => "playbooks",
            Self::Decision(_) => "decision",
            Self::CaseRef(_) => "case_ref",
            Self::StatusNote(_) => "status_note",
            Self::Status(_) => "status",
        }
    }
}

// ---------------------------------------------------------------------------
// StateDelta
// ---------------------------------------------------------------------------

/// The partial state update a step returns to the executor.
///
/// A convergence step invoked before its upstream fields are present returns
/// the empty delta, which merges as a no-op.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub writes: Vec<FieldWrite>,
    pub logs: Vec<ActionLog>,
}

impl StateDelta {
    /// The no-op delta.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.logs.is_empty()
    }

    /// Builder: add a field write.
    pub fn write(mut self, write: FieldWrite) -> Self {
        self.writes.push(write);
        self
    }

    /// Builder: append a log entry.
    pub fn log(mut self, entry: ActionLog) -> Self {
        self.logs.push(entry);
        self
    }

    /// Compact JSON summary for step-log output columns.
    pub fn summary(&self) -> Value {
        json!({
            "fields": self.writes.iter().map(|w| w.field_name()).collect::<Vec<_>>(),
            "log_events": self.logs.iter().map(|l| l.event.as_str()).collect::<Vec<_>>(),
        })
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Apply a delta to the run state under the merge contract.
///
/// Must only be called from the executor's serialized apply path (or the
/// HITL gate, which owns the state exclusively while resolving). A finalized
/// run accepts log appends and the administrative unlock transition, nothing
/// else.
pub fn apply_delta(state: &mut RunState, delta: StateDelta) -> Result<(), MergeError> {
    if state.status.is_terminal() {
        let only_unlock = delta
            .writes
            .iter()
            .all(|w| matches!(w, FieldWrite::Status(RunStatus::AwaitingHuman)));
        if !only_unlock {
            return Err(MergeError::Finalized);
        }
    }

    for write in delta.writes {
        match write {
            FieldWrite::Enrichment(v) => state.enrichment = Some(v),
            FieldWrite::Validity(v) => state.validity = Some(v),
            FieldWrite::Severity(v) => state.severity = Some(v),
            FieldWrite::Exploitability(v) => state.exploitability = Some(v),
            FieldWrite::Playbooks(v) => state.playbooks = Some(v),
            FieldWrite::Decision(v) => state.decision = Some(v),
            FieldWrite::CaseRef(v) => state.case_ref = Some(v),
            FieldWrite::StatusNote(v) => state.status_note = Some(v),
            FieldWrite::Status(to) => {
                if !state.status.can_transition(to) {
                    return Err(MergeError::IllegalTransition {
                        from: state.status,
                        to,
                    });
                }
                state.status = to;
            }
        }
    }

    advance_derived_status(state);

    // Log merge is concatenation, never replacement.
    state.logs.extend(delta.logs);

    Ok(())
}

/// Advance the derived portion of the status machine from field presence.
///
/// Only the forward content-driven transitions are derived here; the branch
/// steps and the HITL gate write AwaitingHuman/Finalized explicitly.
fn advance_derived_status(state: &mut RunState) {
    if state.status == RunStatus::Intake && state.enrichment.is_some() {
        state.status = RunStatus::Enriched;
    }
    if state.status == RunStatus::Enriched && state.scores_complete() {
        state.status = RunStatus::Scored;
    }
    if state.status == RunStatus::Scored && state.decision.is_some() {
        state.status = RunStatus::Decided;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
