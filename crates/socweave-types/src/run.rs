//! Run state and execution tracking types.
//!
//! [`RunState`] is the per-run record threaded through the pipeline: written
//! field-by-field as steps complete, exclusively owned by one run identifier,
//! and immutable once finalized. [`RunStatus`] replaces key-presence checks
//! with an explicit status machine whose transitions are guarded on every
//! delta application. [`RunRecord`] and [`StepLog`] are the persistence-facing
//! records the checkpoint store works with.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::alert::Alert;
use crate::error::RoutingError;
use crate::log::ActionLog;
use crate::score::{ExploitabilityScore, SeverityScore, ValidityScore};

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// The routing token produced by the decision gate.
///
/// The output domain is exactly these two values; route strings outside it
/// are rejected with [`RoutingError`] at deserialization boundaries rather
/// than coerced to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePath {
    /// Escalate into the automated action branch (case upload).
    Automate,
    /// Queue for human analyst review.
    HumanReview,
}

impl RoutePath {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Automate => "automate",
            Self::HumanReview => "human_review",
        }
    }
}

impl FromStr for RoutePath {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automate" => Ok(Self::Automate),
            "human_review" => Ok(Self::HumanReview),
            other => Err(RoutingError::UnknownRoute(other.to_string())),
        }
    }
}

/// The escalation decision: a pure function of scores, thresholds, and any
/// rule-forced override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the run escalates into the automated branch.
    pub escalate: bool,
    /// Routing token selecting exactly one downstream branch.
    pub route: RoutePath,
    pub rationale: String,
}

// ---------------------------------------------------------------------------
// Step outputs
// ---------------------------------------------------------------------------

/// Aggregated search hits, written once by the enrichment step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    /// Hits from internal data sources (SIEM, EDR, CMDB, ...). Opaque to the
    /// engine -- only counted, never interpreted.
    #[serde(default)]
    pub internal: Vec<Value>,
    /// Hits from external OSINT sources.
    #[serde(default)]
    pub external: Vec<Value>,
}

impl Enrichment {
    pub fn counts(&self) -> (usize, usize) {
        (self.internal.len(), self.external.len())
    }
}

/// Playbook actions chosen by policy, recomputable idempotently from
/// (alert, scores, policy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookChoice {
    /// Remediation action names, in selection order.
    pub names: Vec<String>,
    pub rationale: String,
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Explicit run lifecycle status with guarded transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Alert ingested, nothing computed yet.
    Intake,
    /// Enrichment written.
    Enriched,
    /// All three scores present.
    Scored,
    /// Decision written.
    Decided,
    /// Routed to the human review branch, awaiting an analyst outcome.
    AwaitingHuman,
    /// Terminal: automated branch completed or a terminal HITL outcome
    /// reached.
    Finalized,
}

impl RunStatus {
    /// Whether a transition from `self` to `to` is legal.
    ///
    /// Self-transitions are allowed (idempotent re-application), and
    /// `Finalized -> AwaitingHuman` is the administrative HITL unlock.
    pub fn can_transition(self, to: RunStatus) -> bool {
        use RunStatus::*;
        if self == to {
            return true;
        }
        matches!(
            (self, to),
            (Intake, Enriched)
                | (Enriched, Scored)
                | (Scored, Decided)
                | (Decided, AwaitingHuman)
                | (Decided, Finalized)
                | (AwaitingHuman, Finalized)
                | (Finalized, AwaitingHuman)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized)
    }
}

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// The aggregate per-run state threaded through the pipeline.
///
/// Created empty at run start, mutated field-by-field by the merge engine as
/// steps complete, and read-only to every tier outside the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Run identifier (UUIDv7). One checkpoint lineage per identifier.
    pub run_id: Uuid,
    /// The alert under triage. Immutable.
    pub alert: Alert,
    /// Lifecycle status.
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity: Option<ValidityScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<SeverityScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploitability: Option<ExploitabilityScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbooks: Option<PlaybookChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    /// External case reference returned by the upload collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_ref: Option<String>,
    /// Free-text status note for display ("Queued for human triage", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_note: Option<String>,
    /// Append-only action log. Append is the only mutation this field sees.
    #[serde(default)]
    pub logs: Vec<ActionLog>,
}

impl RunState {
    /// Create the empty state for a fresh run.
    pub fn new(run_id: Uuid, alert: Alert) -> Self {
        Self {
            run_id,
            alert,
            status: RunStatus::Intake,
            enrichment: None,
            validity: None,
            severity: None,
            exploitability: None,
            playbooks: None,
            decision: None,
            case_ref: None,
            status_note: None,
            logs: Vec::new(),
        }
    }

    /// Whether all three score fields are present.
    pub fn scores_complete(&self) -> bool {
        self.validity.is_some() && self.severity.is_some() && self.exploitability.is_some()
    }

    /// Serialize to a JSON snapshot for checkpointing.
    pub fn to_snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Restore from a JSON snapshot.
    pub fn from_snapshot(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

// ---------------------------------------------------------------------------
// Persistence records
// ---------------------------------------------------------------------------

/// A persisted run row: the checkpoint lineage head for one run identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    /// Alert identifier (denormalized for querying).
    pub alert_id: String,
    pub status: RunStatus,
    /// Full `RunState` snapshot as JSON.
    pub state: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Status of an individual step execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepLogStatus {
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Execution log for a single step attempt within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLog {
    /// UUIDv7 step execution id.
    pub id: Uuid,
    pub run_id: Uuid,
    /// Step name (one of the pipeline's step identifiers).
    pub step: String,
    pub status: StepLogStatus,
    /// Attempt number (1-based, increments on retry).
    pub attempt: u32,
    /// Summary of the merged delta, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
