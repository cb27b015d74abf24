//! Append-only action log entries.
//!
//! [`ActionLog`] is the single tagged entry type the engine produces. Append
//! is the only mutation the log field of a run ever sees; concurrent branches
//! each contribute entries and the merge engine concatenates them. Display
//! tiers may de-duplicate with [`dedupe`], which is order-independent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Canonical event names emitted by the engine.
///
/// Kept as string constants rather than an enum so the details mapping stays
/// free-form per event while the event tag itself stays closed in practice.
pub mod events {
    pub const ENRICHED: &str = "enriched";
    pub const SCORED_VALIDITY: &str = "scored_validity";
    pub const SCORED_SEVERITY: &str = "scored_severity";
    pub const SCORED_EXPLOITABILITY: &str = "scored_exploitability";
    pub const SELECTED_PLAYBOOKS: &str = "selected_playbooks";
    pub const DECISION_MADE: &str = "decision_made";
    pub const CASE_UPLOADED: &str = "case_uploaded";
    pub const TRIAGE_NOTIFIED: &str = "triage_notified";
    pub const CASE_STATUS_UPDATED: &str = "case_status_updated";
    pub const STATUS_NOOP: &str = "status_noop";
    pub const HUMAN_APPROVED: &str = "human_approved";
    pub const HUMAN_DISMISSED: &str = "human_dismissed";
    pub const HITL_UNLOCKED: &str = "hitl_unlocked";
}

// ---------------------------------------------------------------------------
// ActionLog
// ---------------------------------------------------------------------------

/// One entry in a run's append-only action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLog {
    /// When the event happened. `None` for entries whose source lost the
    /// timestamp; outcome resolution ranks these below timestamped entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
    /// Event name (see [`events`]).
    pub event: String,
    /// Structured event details.
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl ActionLog {
    /// Create an entry stamped with the current time.
    pub fn now(event: &str, details: Map<String, Value>) -> Self {
        Self {
            at: Some(Utc::now()),
            event: event.to_string(),
            details,
        }
    }

    /// Create an entry with no details.
    pub fn event(event: &str) -> Self {
        Self::now(event, Map::new())
    }
}

/// De-duplicate entries by (timestamp, event, details), preserving the first
/// occurrence's position. Intended for display only -- the raw log keeps
/// every appended entry in application order.
pub fn dedupe(entries: &[ActionLog]) -> Vec<ActionLog> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let key = (
            entry.at.map(|t| t.timestamp_micros()),
            entry.event.clone(),
            Value::Object(entry.details.clone()).to_string(),
        );
        if seen.insert(key) {
            out.push(entry.clone());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(event: &str, at: Option<DateTime<Utc>>) -> ActionLog {
        ActionLog {
            at,
            event: event.to_string(),
            details: Map::new(),
        }
    }

    #[test]
    fn log_json_roundtrip() {
        let mut details = Map::new();
        details.insert("internal".to_string(), json!(3));
        details.insert("external".to_string(), json!(1));
        let log = ActionLog::now(events::ENRICHED, details);

        let json_str = serde_json::to_string(&log).unwrap();
        let parsed: ActionLog = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.event, "enriched");
        assert_eq!(parsed.details["internal"], json!(3));
        assert!(parsed.at.is_some());
    }

    #[test]
    fn missing_timestamp_deserializes_as_none() {
        let parsed: ActionLog =
            serde_json::from_value(json!({ "event": "human_approved" })).unwrap();
        assert!(parsed.at.is_none());
        assert!(parsed.details.is_empty());
    }

    #[test]
    fn dedupe_removes_exact_duplicates_only() {
        let t = Utc::now();
        let a = entry("enriched", Some(t));
        let b = entry("enriched", Some(t));
        let c = entry("decision_made", Some(t));
        let out = dedupe(&[a.clone(), b, c.clone()]);
        assert_eq!(out, vec![a, c]);
    }

    #[test]
    fn dedupe_is_order_independent_on_set_membership() {
        let t = Utc::now();
        let a = entry("enriched", Some(t));
        let b = entry("decision_made", Some(t));
        let forward = dedupe(&[a.clone(), b.clone(), a.clone()]);
        let backward = dedupe(&[b.clone(), a.clone(), a.clone()]);
        assert_eq!(forward.len(), 2);
        assert_eq!(backward.len(), 2);
    }

    #[test]
    fn dedupe_keeps_entries_differing_only_in_details() {
        let t = Utc::now();
        let mut d1 = Map::new();
        d1.insert("by".to_string(), json!("analyst-a"));
        let mut d2 = Map::new();
        d2.insert("by".to_string(), json!("analyst-b"));
        let out = dedupe(&[
            ActionLog { at: Some(t), event: "human_approved".into(), details: d1 },
            ActionLog { at: Some(t), event: "human_approved".into(), details: d2 },
        ]);
        assert_eq!(out.len(), 2);
    }
}
