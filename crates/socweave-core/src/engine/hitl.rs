//! Human-in-the-loop gate: outcome resolution and transitions.
//!
//! The gate's state machine is `PENDING -> {APPROVED, DISMISSED}` with an
//! administrative unlock that resets the *effective* read back to pending
//! without deleting history. The outcome is never cached: every read
//! recomputes it from the append-only log, so replay always reflects true
//! history.

use chrono::{DateTime, Utc};
use serde_json::json;

use socweave_types::error::MergeError;
use socweave_types::log::{events, ActionLog};
use socweave_types::run::{RunState, RunStatus};

use crate::collaborator::StepServices;

use super::state::{apply_delta, FieldWrite, StateDelta};
use super::steps::{StepKind, StepRunner};

// ---------------------------------------------------------------------------
// Outcome resolution
// ---------------------------------------------------------------------------

/// Effective analyst outcome of a run's HITL gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitlOutcome {
    Pending,
    Approved,
    Dismissed,
}

/// Resolve the effective outcome from the append-only log.
///
/// Scans for `human_approved` / `human_dismissed` / `hitl_unlocked` entries
/// and selects the newest by the key (timestamp-present, timestamp, append
/// index): entries with unparseable or missing timestamps lose to timestamped
/// ones, and among ties the most recently appended entry wins. An unlock
/// marker that is newest resets the effective outcome to pending. Absence of
/// any such entry is pending.
pub fn resolve_outcome(logs: &[ActionLog]) -> HitlOutcome {
    let mut best: Option<((bool, DateTime<Utc>, usize), HitlOutcome)> = None;

    for (idx, entry) in logs.iter().enumerate() {
        let outcome = match entry.event.as_str() {
            events::HUMAN_APPROVED => HitlOutcome::Approved,
            events::HUMAN_DISMISSED => HitlOutcome::Dismissed,
            events::HITL_UNLOCKED => HitlOutcome::Pending,
            _ => continue,
        };

        let key = (
            entry.at.is_some(),
            entry.at.unwrap_or(DateTime::<Utc>::MIN_UTC),
            idx,
        );
        if best.as_ref().map_or(true, |(current, _)| key > *current) {
            best = Some((key, outcome));
        }
    }

    best.map_or(HitlOutcome::Pending, |(_, outcome)| outcome)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from HITL transitions.
#[derive(Debug, thiserror::Error)]
pub enum HitlError {
    #[error("run is not awaiting human review (status {0:?})")]
    NotAwaitingHuman(RunStatus),

    #[error("outcome already recorded: {0:?}")]
    AlreadyResolved(HitlOutcome),

    #[error("no recorded outcome to unlock")]
    NothingToUnlock,

    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("step '{step}' failed during approval: {error}")]
    StepFailed { step: &'static str, error: String },
}

// ---------------------------------------------------------------------------
// HitlGate
// ---------------------------------------------------------------------------

/// Transitions of the HITL gate. The caller owns the state exclusively while
/// resolving (the run is paused, the executor is not touching it).
pub struct HitlGate;

impl HitlGate {
    fn guard_pending(state: &RunState) -> Result<(), HitlError> {
        let outcome = resolve_outcome(&state.logs);
        if outcome != HitlOutcome::Pending {
            return Err(HitlError::AlreadyResolved(outcome));
        }
        if state.status != RunStatus::AwaitingHuman {
            return Err(HitlError::NotAwaitingHuman(state.status));
        }
        Ok(())
    }

    /// Approve: invoke the remaining automated-branch steps against current
    /// state, merge their deltas, then append the terminal approval marker.
    pub async fn approve<S: StepServices>(
        state: &mut RunState,
        runner: &StepRunner<S>,
        actor: &str,
    ) -> Result<(), HitlError> {
        Self::guard_pending(state)?;

        for step in [StepKind::UploadCase, StepKind::UpdateStatus] {
            let delta = runner.run(step, state).await.map_err(|e| HitlError::StepFailed {
                step: step.as_str(),
                error: e.to_string(),
            })?;
            apply_delta(state, delta)?;
        }

        let mut details = serde_json::Map::new();
        details.insert("by".to_string(), json!(actor));
        details.insert("action".to_string(), json!("upload_case"));
        apply_delta(
            state,
            StateDelta::empty().log(ActionLog::now(events::HUMAN_APPROVED, details)),
        )?;

        tracing::info!(run_id = %state.run_id, by = actor, "HITL approved");
        Ok(())
    }

    /// Dismiss: append the terminal dismissal marker and finalize without
    /// invoking the automated-branch steps.
    pub fn dismiss(state: &mut RunState, actor: &str) -> Result<(), HitlError> {
        Self::guard_pending(state)?;

        let mut details = serde_json::Map::new();
        details.insert("by".to_string(), json!(actor));
        apply_delta(
            state,
            StateDelta::empty()
                .write(FieldWrite::StatusNote("Dismissed by analyst".to_string()))
                .write(FieldWrite::Status(RunStatus::Finalized))
                .log(ActionLog::now(events::HUMAN_DISMISSED, details)),
        )?;

        tracing::info!(run_id = %state.run_id, by = actor, "HITL dismissed");
        Ok(())
    }

    /// Administrative unlock: append a marker that resets the effective
    /// outcome to pending for re-inspection. History is never erased.
    pub fn unlock(state: &mut RunState, actor: &str) -> Result<(), HitlError> {
        if resolve_outcome(&state.logs) == HitlOutcome::Pending {
            return Err(HitlError::NothingToUnlock);
        }

        let mut details = serde_json::Map::new();
        details.insert("by".to_string(), json!(actor));
        apply_delta(
            state,
            StateDelta::empty()
                .write(FieldWrite::Status(RunStatus::AwaitingHuman))
                .log(ActionLog::now(events::HITL_UNLOCKED, details)),
        )?;

        tracing::info!(run_id = %state.run_id, by = actor, "HITL unlocked");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
