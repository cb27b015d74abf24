//! Alert and indicator types.
//!
//! An [`Alert`] is the immutable input of a triage run: once ingested it is
//! never mutated. Indicators carry a typed value plus optional free-text
//! context supplied by the detection source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Indicator
// ---------------------------------------------------------------------------

/// The kind of observable an indicator describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorType {
    Ip,
    Domain,
    Hash,
    Url,
    Email,
    User,
    Process,
    File,
    Host,
}

impl IndicatorType {
    /// Whether indicators of this type are worth querying against external
    /// OSINT sources (network observables only).
    pub fn is_network_observable(self) -> bool {
        matches!(self, Self::Ip | Self::Domain | Self::Url)
    }
}

/// A single observable attached to an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    /// Observable kind.
    #[serde(rename = "type")]
    pub indicator_type: IndicatorType,
    /// Raw observable value (IP address, domain name, hash, ...).
    pub value: String,
    /// Optional context from the detection source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

// ---------------------------------------------------------------------------
// Alert
// ---------------------------------------------------------------------------

/// A security alert as received from the detection tier.
///
/// Immutable once ingested -- the engine only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Source-assigned alert identifier.
    pub id: String,
    /// Originating system (SIEM, EDR, mail gateway, ...).
    #[serde(default = "default_source")]
    pub source: String,
    /// Short human-readable title.
    pub title: String,
    /// Longer free-text description.
    pub description: String,
    /// Ordered list of observables.
    #[serde(default)]
    pub indicators: Vec<Indicator>,
    /// When the alert was raised.
    pub created_at: DateTime<Utc>,
}

fn default_source() -> String {
    "SIEM".to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn alert_json_roundtrip() {
        let alert = Alert {
            id: "AL-1042".to_string(),
            source: "EDR".to_string(),
            title: "Suspicious process chain on srv-42".to_string(),
            description: "cmd.exe spawning powershell with encoded payload".to_string(),
            indicators: vec![Indicator {
                indicator_type: IndicatorType::Host,
                value: "srv-42".to_string(),
                context: Some("payments segment".to_string()),
            }],
            created_at: Utc::now(),
        };

        let json_str = serde_json::to_string(&alert).unwrap();
        let parsed: Alert = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.id, "AL-1042");
        assert_eq!(parsed.indicators.len(), 1);
        assert_eq!(parsed.indicators[0].indicator_type, IndicatorType::Host);
    }

    #[test]
    fn alert_defaults_source_and_indicators() {
        let alert: Alert = serde_json::from_value(json!({
            "id": "AL-1",
            "title": "Brute force against VPN",
            "description": "200 failed logins",
            "created_at": "2026-08-01T09:00:00Z"
        }))
        .unwrap();
        assert_eq!(alert.source, "SIEM");
        assert!(alert.indicators.is_empty());
    }

    #[test]
    fn indicator_type_wire_format_is_snake_case() {
        let json_str = serde_json::to_string(&IndicatorType::Ip).unwrap();
        assert_eq!(json_str, "\"ip\"");
        let parsed: IndicatorType = serde_json::from_str("\"domain\"").unwrap();
        assert_eq!(parsed, IndicatorType::Domain);
    }

    #[test]
    fn network_observables_only_for_ip_domain_url() {
        assert!(IndicatorType::Ip.is_network_observable());
        assert!(IndicatorType::Domain.is_network_observable());
        assert!(IndicatorType::Url.is_network_observable());
        assert!(!IndicatorType::Hash.is_network_observable());
        assert!(!IndicatorType::User.is_network_observable());
    }
}
