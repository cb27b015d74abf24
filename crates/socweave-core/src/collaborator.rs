//! External collaborator traits and the canned in-process implementation.
//!
//! The engine only ever talks to the outside world through [`StepServices`]:
//! the three remote scorers, the internal/external search providers, the case
//! manager, and the analyst notification channel. Implementations live in
//! the infrastructure layer (`socweave-infra`); [`StaticServices`] provides
//! deterministic canned responses for tests and offline runs.

use serde_json::{json, Value};

use socweave_types::alert::Alert;
use socweave_types::error::CollaboratorError;
use socweave_types::run::Enrichment;
use socweave_types::score::{
    ExploitLevel, ExploitabilityScore, ImpactLabel, SeverityScore, ValidityLabel, ValidityScore,
};

// ---------------------------------------------------------------------------
// CaseReceipt
// ---------------------------------------------------------------------------

/// Result of uploading an incident to the case manager.
#[derive(Debug, Clone)]
pub struct CaseReceipt {
    /// Case identifier assigned by the external system.
    pub case_id: String,
    /// Raw collaborator response, kept for the audit log.
    pub response: Value,
}

// ---------------------------------------------------------------------------
// StepServices
// ---------------------------------------------------------------------------

/// External service calls available to pipeline steps.
///
/// Every method is an await point; the engine treats the bodies as opaque and
/// only validates the returned records. Failures propagate as
/// [`CollaboratorError`] -- never silent no-ops. Side effects on the remote
/// systems may not be idempotent; the engine only guarantees at-least-once
/// invocation with idempotent state merge.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait StepServices: Send + Sync {
    /// Score whether the alert is a true positive.
    fn score_validity(
        &self,
        alert: &Alert,
        enrichment: &Enrichment,
    ) -> impl std::future::Future<Output = Result<ValidityScore, CollaboratorError>> + Send;

    /// Score organizational impact.
    fn score_severity(
        &self,
        alert: &Alert,
        enrichment: &Enrichment,
    ) -> impl std::future::Future<Output = Result<SeverityScore, CollaboratorError>> + Send;

    /// Score exploitability.
    fn score_exploitability(
        &self,
        alert: &Alert,
        enrichment: &Enrichment,
    ) -> impl std::future::Future<Output = Result<ExploitabilityScore, CollaboratorError>> + Send;

    /// Search internal data sources (SIEM, EDR, CMDB, ...) for an indicator.
    fn search_internal(
        &self,
        indicator: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Value>, CollaboratorError>> + Send;

    /// Search external OSINT sources for an indicator.
    fn search_external(
        &self,
        indicator: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Value>, CollaboratorError>> + Send;

    /// Upload an incident payload to the case manager.
    fn upload_case(
        &self,
        payload: &Value,
    ) -> impl std::future::Future<Output = Result<CaseReceipt, CollaboratorError>> + Send;

    /// Update the status of a previously uploaded case.
    fn update_case_status(
        &self,
        case_id: &str,
        status: &str,
    ) -> impl std::future::Future<Output = Result<Value, CollaboratorError>> + Send;

    /// Notify the analyst triage channel.
    fn notify_analysts(
        &self,
        payload: &Value,
    ) -> impl std::future::Future<Output = Result<Value, CollaboratorError>> + Send;
}

// ---------------------------------------------------------------------------
// StaticServices
// ---------------------------------------------------------------------------

/// Canned collaborator responses for tests and offline demo runs.
///
/// Scores are fixed at construction so the pipeline stays deterministic;
/// search/upload/notify return representative payloads.
#[derive(Debug, Clone)]
pub struct StaticServices {
    pub validity: ValidityScore,
    pub severity: SeverityScore,
    pub exploitability: ExploitabilityScore,
}

impl StaticServices {
    /// Canned scores that take the automation route under default thresholds.
    pub fn escalating() -> Self {
        Self {
            validity: ValidityScore {
                label: ValidityLabel::TruePositive,
                likelihood: 0.7,
                rationale: "corroborated across EDR and OSINT".to_string(),
            },
            severity: SeverityScore {
                level: 2,
                impact: ImpactLabel::Medium,
                rationale: "host in payments segment".to_string(),
            },
            exploitability: ExploitabilityScore {
                level: ExploitLevel::Medium,
                likelihood: 0.5,
                rationale: "exposed service, patch pending".to_string(),
            },
        }
    }

    /// Canned scores that fall through to the human review route.
    pub fn inconclusive() -> Self {
        Self {
            validity: ValidityScore {
                label: ValidityLabel::FalsePositive,
                likelihood: 0.3,
                rationale: "weak evidence, conflicting signals".to_string(),
            },
            severity: SeverityScore {
                level: 1,
                impact: ImpactLabel::Low,
                rationale: "isolated workstation".to_string(),
            },
            exploitability: ExploitabilityScore {
                level: ExploitLevel::Low,
                likelihood: 0.2,
                rationale: "no exposed surface".to_string(),
            },
        }
    }
}

impl StepServices for StaticServices {
    async fn score_validity(
        &self,
        _alert: &Alert,
        _enrichment: &Enrichment,
    ) -> Result<ValidityScore, CollaboratorError> {
        Ok(self.validity.clone())
    }

    async fn score_severity(
        &self,
        _alert: &Alert,
        _enrichment: &Enrichment,
    ) -> Result<SeverityScore, CollaboratorError> {
        Ok(self.severity.clone())
    }

    async fn score_exploitability(
        &self,
        _alert: &Alert,
        _enrichment: &Enrichment,
    ) -> Result<ExploitabilityScore, CollaboratorError> {
        Ok(self.exploitability.clone())
    }

    async fn search_internal(&self, indicator: &str) -> Result<Vec<Value>, CollaboratorError> {
        Ok(vec![
            json!({"source": "EDR", "hit": true, "host": "srv-42", "note": "process spawn chain"}),
            json!({"source": "CMDB", "owner": "Payments", "criticality": "High", "query": indicator}),
        ])
    }

    async fn search_external(&self, indicator: &str) -> Result<Vec<Value>, CollaboratorError> {
        Ok(vec![
            json!({"source": "AbuseIPDB", "score": 85, "ip": indicator, "tags": ["bruteforce"]}),
            json!({"source": "GreyNoise", "classification": "malicious", "ip": indicator}),
        ])
    }

    async fn upload_case(&self, _payload: &Value) -> Result<CaseReceipt, CollaboratorError> {
        let case_id = format!("INC-{}", uuid::Uuid::now_v7().simple());
        Ok(CaseReceipt {
            response: json!({"result": "ok", "incident_id": case_id}),
            case_id,
        })
    }

    async fn update_case_status(
        &self,
        case_id: &str,
        status: &str,
    ) -> Result<Value, CollaboratorError> {
        Ok(json!({"result": "ok", "incident_id": case_id, "status": status}))
    }

    async fn notify_analysts(&self, _payload: &Value) -> Result<Value, CollaboratorError> {
        Ok(json!({"queued": true, "channel": "soc-triage"}))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn alert() -> Alert {
        Alert {
            id: "AL-1".to_string(),
            source: "SIEM".to_string(),
            title: "test".to_string(),
            description: "test".to_string(),
            indicators: vec![],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn static_scores_pass_validation() {
        for services in [StaticServices::escalating(), StaticServices::inconclusive()] {
            let enrichment = Enrichment::default();
            let v = services.score_validity(&alert(), &enrichment).await.unwrap();
            let s = services.score_severity(&alert(), &enrichment).await.unwrap();
            let e = services
                .score_exploitability(&alert(), &enrichment)
                .await
                .unwrap();
            v.validate().unwrap();
            s.validate().unwrap();
            e.validate().unwrap();
        }
    }

    #[tokio::test]
    async fn upload_assigns_distinct_case_ids() {
        let services = StaticServices::escalating();
        let a = services.upload_case(&json!({})).await.unwrap();
        let b = services.upload_case(&json!({})).await.unwrap();
        assert_ne!(a.case_id, b.case_id);
        assert!(a.case_id.starts_with("INC-"));
    }
}
