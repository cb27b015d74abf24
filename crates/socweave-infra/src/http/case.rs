//! Case manager client: incident upload and status updates.

use serde_json::{json, Value};

use socweave_core::collaborator::CaseReceipt;
use socweave_types::error::CollaboratorError;

/// HTTP client for the external case manager.
pub struct CaseClient {
    client: reqwest::Client,
    base_url: String,
}

impl CaseClient {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Upload an incident payload; the response must carry the assigned
    /// incident id.
    pub async fn upload(&self, payload: &Value) -> Result<CaseReceipt, CollaboratorError> {
        let response = self
            .client
            .post(format!("{}/incidents", self.base_url))
            .json(payload)
            .send()
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        let data: Value = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Protocol(e.to_string()))?;

        parse_receipt(data)
    }

    /// Update the status of a previously uploaded incident.
    pub async fn update_status(
        &self,
        case_id: &str,
        status: &str,
    ) -> Result<Value, CollaboratorError> {
        let response = self
            .client
            .post(format!("{}/incidents/{case_id}/status", self.base_url))
            .json(&json!({"status": status}))
            .send()
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| CollaboratorError::Protocol(e.to_string()))
    }
}

/// Interpret an upload response: the incident id is required.
fn parse_receipt(data: Value) -> Result<CaseReceipt, CollaboratorError> {
    let case_id = data
        .get("incident_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            CollaboratorError::Protocol(format!("upload response missing incident_id: {data}"))
        })?;

    Ok(CaseReceipt {
        case_id,
        response: data,
    })
}
