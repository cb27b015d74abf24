//! JSON-RPC scoring collaborator client.
//!
//! The three scoring agents speak JSON-RPC 2.0 with a single `message/send`
//! method: the request carries the (alert, enrichment) pair as a text part,
//! and the response's first text part is the score record as JSON. Every
//! deviation -- RPC error, missing result, undecodable or out-of-range score
//! -- fails loudly as a [`CollaboratorError`]; nothing is silently defaulted.

use serde_json::{json, Value};
use uuid::Uuid;

use socweave_types::alert::Alert;
use socweave_types::error::CollaboratorError;
use socweave_types::run::Enrichment;
use socweave_types::score::{ExploitabilityScore, SeverityScore, ValidityScore};

/// Endpoints of the three scoring agents.
#[derive(Debug, Clone)]
pub struct ScoringEndpoints {
    pub validity_url: String,
    pub severity_url: String,
    pub exploitability_url: String,
}

/// JSON-RPC client for the scoring collaborators.
pub struct ScoringClient {
    client: reqwest::Client,
    endpoints: ScoringEndpoints,
}

impl ScoringClient {
    pub fn new(client: reqwest::Client, endpoints: ScoringEndpoints) -> Self {
        Self { client, endpoints }
    }

    pub async fn validity(
        &self,
        alert: &Alert,
        enrichment: &Enrichment,
    ) -> Result<ValidityScore, CollaboratorError> {
        let text = self
            .send(&self.endpoints.validity_url, alert, enrichment)
            .await?;
        let score: ValidityScore = serde_json::from_str(&text).map_err(|e| {
            CollaboratorError::MalformedScore(format!("validity: {e}; text={text:?}"))
        })?;
        score.validate()?;
        Ok(score)
    }

    pub async fn severity(
        &self,
        alert: &Alert,
        enrichment: &Enrichment,
    ) -> Result<SeverityScore, CollaboratorError> {
        let text = self
            .send(&self.endpoints.severity_url, alert, enrichment)
            .await?;
        let score: SeverityScore = serde_json::from_str(&text).map_err(|e| {
            CollaboratorError::MalformedScore(format!("severity: {e}; text={text:?}"))
        })?;
        score.validate()?;
        Ok(score)
    }

    pub async fn exploitability(
        &self,
        alert: &Alert,
        enrichment: &Enrichment,
    ) -> Result<ExploitabilityScore, CollaboratorError> {
        let text = self
            .send(&self.endpoints.exploitability_url, alert, enrichment)
            .await?;
        let score: ExploitabilityScore = serde_json::from_str(&text).map_err(|e| {
            CollaboratorError::MalformedScore(format!("exploitability: {e}; text={text:?}"))
        })?;
        score.validate()?;
        Ok(score)
    }

    async fn send(
        &self,
        url: &str,
        alert: &Alert,
        enrichment: &Enrichment,
    ) -> Result<String, CollaboratorError> {
        let payload = serde_json::to_string(&json!({
            "alert": alert,
            "enrichment": enrichment,
        }))
        .map_err(|e| CollaboratorError::Protocol(e.to_string()))?;

        let body = build_request(&payload);
        let response = self
            .client
            .post(url.trim_end_matches('/'))
            .json(&body)
            .send()
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        let data: Value = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Protocol(e.to_string()))?;

        extract_text(&data)
    }
}

/// Build the JSON-RPC 2.0 `message/send` request envelope.
fn build_request(text_payload: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": Uuid::now_v7().simple().to_string(),
        "method": "message/send",
        "params": {
            "message": {
                "role": "user",
                "parts": [
                    {"kind": "text", "text": text_payload},
                ],
                "messageId": Uuid::now_v7().simple().to_string(),
            }
        },
    })
}

/// Extract the first text part from a `message/send` response.
fn extract_text(data: &Value) -> Result<String, CollaboratorError> {
    if let Some(error) = data.get("error").filter(|e| !e.is_null()) {
        return Err(CollaboratorError::Failure(format!(
            "scoring agent returned error: {error}"
        )));
    }

    let result = data
        .get("result")
        .filter(|r| !r.is_null())
        .ok_or_else(|| CollaboratorError::Protocol(format!("missing 'result' in response: {data}")))?;

    result
        .get("parts")
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            CollaboratorError::Protocol(format!("unexpected 'result' format: {result}"))
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
