//! Live collaborator wiring.
//!
//! [`LiveServices`] implements the core's `StepServices` trait by composing
//! the HTTP clients, following the dependency-inversion pattern used across
//! the workspace: the trait lives in core, the implementation lives here.

use std::time::Duration;

use serde_json::Value;

use socweave_core::collaborator::{CaseReceipt, StepServices};
use socweave_types::alert::Alert;
use socweave_types::error::CollaboratorError;
use socweave_types::run::Enrichment;
use socweave_types::score::{ExploitabilityScore, SeverityScore, ValidityScore};

use crate::config::EngineConfig;
use crate::http::case::CaseClient;
use crate::http::notify::NotifyClient;
use crate::http::scoring::{ScoringClient, ScoringEndpoints};
use crate::http::search::SearchClient;

/// Real collaborator implementations behind the `StepServices` seam.
pub struct LiveServices {
    scoring: ScoringClient,
    search: SearchClient,
    case: CaseClient,
    notify: NotifyClient,
}

impl LiveServices {
    /// Wire all clients from the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("socweave/0.1")
            .build()
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        let endpoints = &config.endpoints;
        Ok(Self {
            scoring: ScoringClient::new(
                client.clone(),
                ScoringEndpoints {
                    validity_url: endpoints.validity_url.clone(),
                    severity_url: endpoints.severity_url.clone(),
                    exploitability_url: endpoints.exploitability_url.clone(),
                },
            ),
            search: SearchClient::new(
                client.clone(),
                endpoints.search_internal_url.clone(),
                endpoints.search_external_url.clone(),
            ),
            case: CaseClient::new(client.clone(), endpoints.case_url.clone()),
            notify: NotifyClient::new(client, endpoints.notify_url.clone()),
        })
    }
}

impl StepServices for LiveServices {
    async fn score_validity(
        &self,
        alert: &Alert,
        enrichment: &Enrichment,
    ) -> Result<ValidityScore, CollaboratorError> {
        self.scoring.validity(alert, enrichment).await
    }

    async fn score_severity(
        &self,
        alert: &Alert,
        enrichment: &Enrichment,
    ) -> Result<SeverityScore, CollaboratorError> {
        self.scoring.severity(alert, enrichment).await
    }

    async fn score_exploitability(
        &self,
        alert: &Alert,
        enrichment: &Enrichment,
    ) -> Result<ExploitabilityScore, CollaboratorError> {
        self.scoring.exploitability(alert, enrichment).await
    }

    async fn search_internal(&self, indicator: &str) -> Result<Vec<Value>, CollaboratorError> {
        self.search.internal(indicator).await
    }

    async fn search_external(&self, indicator: &str) -> Result<Vec<Value>, CollaboratorError> {
        self.search.external(indicator).await
    }

    async fn upload_case(&self, payload: &Value) -> Result<CaseReceipt, CollaboratorError> {
        self.case.upload(payload).await
    }

    async fn update_case_status(
        &self,
        case_id: &str,
        status: &str,
    ) -> Result<Value, CollaboratorError> {
        self.case.update_status(case_id, status).await
    }

    async fn notify_analysts(&self, payload: &Value) -> Result<Value, CollaboratorError> {
        self.notify.notify(payload).await
    }
}
