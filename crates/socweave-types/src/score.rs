//! Score records produced by the remote scoring collaborators.
//!
//! Each score is written exactly once by its dedicated pipeline step and never
//! mutated within a run. Collaborator responses are deserialized and then
//! passed through `validate()` so malformed or out-of-range payloads fail
//! loudly instead of silently defaulting.

use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

// ---------------------------------------------------------------------------
// Validity
// ---------------------------------------------------------------------------

/// Classification of whether the alert is real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidityLabel {
    #[serde(rename = "False Positive")]
    FalsePositive,
    #[serde(rename = "False Negative")]
    FalseNegative,
    #[serde(rename = "True Positive")]
    TruePositive,
    #[serde(rename = "True Negative")]
    TrueNegative,
}

/// Validity assessment: is the alert a true positive?
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidityScore {
    pub label: ValidityLabel,
    /// Belief the alert is real (true positive), in [0, 1].
    pub likelihood: f64,
    pub rationale: String,
}

impl ValidityScore {
    /// Range-check the record as received from the collaborator.
    pub fn validate(&self) -> Result<(), CollaboratorError> {
        if !(0.0..=1.0).contains(&self.likelihood) {
            return Err(CollaboratorError::MalformedScore(format!(
                "validity likelihood {} outside [0, 1]",
                self.likelihood
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Organizational impact label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImpactLabel {
    Low,
    Medium,
    High,
}

/// Severity assessment: how much damage if real?
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityScore {
    /// Numeric level: 1 = low, 2 = moderate, 3 = high.
    pub level: u8,
    pub impact: ImpactLabel,
    pub rationale: String,
}

impl SeverityScore {
    /// Range-check the record as received from the collaborator.
    pub fn validate(&self) -> Result<(), CollaboratorError> {
        if !(1..=3).contains(&self.level) {
            return Err(CollaboratorError::MalformedScore(format!(
                "severity level {} outside 1..=3",
                self.level
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Exploitability
// ---------------------------------------------------------------------------

/// Categorical exploitability level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExploitLevel {
    #[serde(rename = "Not Exploitable")]
    NotExploitable,
    Low,
    Medium,
    Critical,
}

/// Exploitability assessment: can the condition actually be exploited?
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploitabilityScore {
    pub level: ExploitLevel,
    /// Likelihood of successful exploitation, in [0, 1].
    pub likelihood: f64,
    pub rationale: String,
}

impl ExploitabilityScore {
    /// Range-check the record as received from the collaborator.
    pub fn validate(&self) -> Result<(), CollaboratorError> {
        if !(0.0..=1.0).contains(&self.likelihood) {
            return Err(CollaboratorError::MalformedScore(format!(
                "exploitability likelihood {} outside [0, 1]",
                self.likelihood
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_label_wire_format() {
        let json = serde_json::to_string(&ValidityLabel::TruePositive).unwrap();
        assert_eq!(json, "\"True Positive\"");
        let parsed: ValidityLabel = serde_json::from_str("\"False Positive\"").unwrap();
        assert_eq!(parsed, ValidityLabel::FalsePositive);
    }

    #[test]
    fn exploit_level_wire_format() {
        let json = serde_json::to_string(&ExploitLevel::NotExploitable).unwrap();
        assert_eq!(json, "\"Not Exploitable\"");
        let parsed: ExploitLevel = serde_json::from_str("\"Critical\"").unwrap();
        assert_eq!(parsed, ExploitLevel::Critical);
    }

    #[test]
    fn validity_validate_rejects_out_of_range_likelihood() {
        let score = ValidityScore {
            label: ValidityLabel::TruePositive,
            likelihood: 1.7,
            rationale: "corroborated by two sensors".to_string(),
        };
        let err = score.validate().unwrap_err();
        assert!(err.to_string().contains("outside [0, 1]"));
    }

    #[test]
    fn severity_validate_rejects_level_zero_and_four() {
        for level in [0u8, 4u8] {
            let score = SeverityScore {
                level,
                impact: ImpactLabel::Medium,
                rationale: "payments segment host".to_string(),
            };
            assert!(score.validate().is_err(), "level {level} should be rejected");
        }
    }

    #[test]
    fn valid_scores_pass_validation() {
        let v = ValidityScore {
            label: ValidityLabel::TruePositive,
            likelihood: 0.82,
            rationale: "active host, matching OSINT".to_string(),
        };
        let s = SeverityScore {
            level: 2,
            impact: ImpactLabel::Medium,
            rationale: "single workstation".to_string(),
        };
        let e = ExploitabilityScore {
            level: ExploitLevel::Medium,
            likelihood: 0.5,
            rationale: "patch available but not applied".to_string(),
        };
        assert!(v.validate().is_ok());
        assert!(s.validate().is_ok());
        assert!(e.validate().is_ok());
    }

    #[test]
    fn score_json_roundtrip() {
        let score = ExploitabilityScore {
            level: ExploitLevel::Medium,
            likelihood: 0.4,
            rationale: "requires local access".to_string(),
        };
        let json = serde_json::to_string(&score).unwrap();
        let parsed: ExploitabilityScore = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, score);
    }
}
