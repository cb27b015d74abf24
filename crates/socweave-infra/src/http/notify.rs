//! Analyst notification client.
//!
//! Posts triage payloads to the SOC notification webhook. Failures propagate
//! as step failures -- a notification that did not go out is never reported
//! as success.

use serde_json::Value;

use socweave_types::error::CollaboratorError;

/// HTTP client for the analyst notification webhook.
pub struct NotifyClient {
    client: reqwest::Client,
    webhook_url: String,
}

impl NotifyClient {
    pub fn new(client: reqwest::Client, webhook_url: String) -> Self {
        Self {
            client,
            webhook_url,
        }
    }

    /// Send a payload to the triage channel and return the channel's
    /// response record.
    pub async fn notify(&self, payload: &Value) -> Result<Value, CollaboratorError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(payload)
            .send()
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CollaboratorError::Failure(format!(
                "notification webhook returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CollaboratorError::Protocol(e.to_string()))
    }
}
