//! Search collaborator client (internal data sources and external OSINT).
//!
//! The engine only counts and aggregates the returned hit records; their
//! contents stay opaque. A response that is not a JSON array is a protocol
//! error, not an empty result.

use serde_json::{json, Value};

use socweave_types::error::CollaboratorError;

/// HTTP client for the internal/external indicator search services.
pub struct SearchClient {
    client: reqwest::Client,
    internal_url: String,
    external_url: String,
}

impl SearchClient {
    pub fn new(client: reqwest::Client, internal_url: String, external_url: String) -> Self {
        Self {
            client,
            internal_url,
            external_url,
        }
    }

    /// Query internal data sources (SIEM, EDR, CMDB, ...) for an indicator.
    pub async fn internal(&self, indicator: &str) -> Result<Vec<Value>, CollaboratorError> {
        self.query(&self.internal_url, indicator).await
    }

    /// Query external OSINT sources for an indicator.
    pub async fn external(&self, indicator: &str) -> Result<Vec<Value>, CollaboratorError> {
        self.query(&self.external_url, indicator).await
    }

    async fn query(&self, url: &str, indicator: &str) -> Result<Vec<Value>, CollaboratorError> {
        let response = self
            .client
            .post(url)
            .json(&json!({"indicator": indicator}))
            .send()
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        let data: Value = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Protocol(e.to_string()))?;

        parse_hits(data)
    }
}

/// Interpret a search response as a hit list.
fn parse_hits(data: Value) -> Result<Vec<Value>, CollaboratorError> {
    match data {
        Value::Array(hits) => Ok(hits),
        other => Err(CollaboratorError::Protocol(format!(
            "expected hit array, got: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_response_is_hit_list() {
        let hits = parse_hits(json!([{"source": "EDR"}, {"source": "CMDB"}])).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn empty_array_is_no_hits() {
        assert!(parse_hits(json!([])).unwrap().is_empty());
    }

    #[test]
    fn non_array_response_is_protocol_error() {
        let err = parse_hits(json!({"hits": []})).unwrap_err();
        assert!(matches!(err, CollaboratorError::Protocol(_)));
    }
}
