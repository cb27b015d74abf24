//! Engine configuration loader.
//!
//! Reads `config.toml` from the data directory and deserializes it into
//! [`EngineConfig`]. Falls back to defaults when the file is missing or
//! malformed -- engine configuration is operational plumbing, unlike the
//! policy document, whose validation failures are fatal by design.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Collaborator endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    /// Validity scoring collaborator (JSON-RPC).
    pub validity_url: String,
    /// Severity scoring collaborator (JSON-RPC).
    pub severity_url: String,
    /// Exploitability scoring collaborator (JSON-RPC).
    pub exploitability_url: String,
    /// Internal data search service.
    pub search_internal_url: String,
    /// External OSINT search service.
    pub search_external_url: String,
    /// Case manager base URL.
    pub case_url: String,
    /// Analyst notification webhook.
    pub notify_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            validity_url: "http://localhost:9101/".to_string(),
            severity_url: "http://localhost:9102/".to_string(),
            exploitability_url: "http://localhost:9103/".to_string(),
            search_internal_url: "http://localhost:9110/internal".to_string(),
            search_external_url: "http://localhost:9110/external".to_string(),
            case_url: "http://localhost:9120".to_string(),
            notify_url: "http://localhost:9130/notify".to_string(),
        }
    }
}

/// Engine configuration loaded from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite database URL; `None` selects the in-memory repository.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Collaborator endpoints.
    #[serde(default)]
    pub endpoints: Endpoints,
    /// HTTP request timeout for collaborator calls, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            endpoints: Endpoints::default(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Load engine configuration from `{data_dir}/config.toml`.
///
/// - Missing file: returns [`EngineConfig::default()`].
/// - Unreadable or unparseable file: logs a warning and returns the default.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no config.toml at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(tmp.path()).await;
        assert!(config.database_url.is_none());
        assert_eq!(config.request_timeout_secs, 120);
        assert_eq!(config.endpoints.validity_url, "http://localhost:9101/");
    }

    #[tokio::test]
    async fn valid_toml_is_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
database_url = "sqlite:///var/lib/socweave/runs.db"
request_timeout_secs = 30

[endpoints]
validity_url = "http://scorers.internal:9101/"
severity_url = "http://scorers.internal:9102/"
exploitability_url = "http://scorers.internal:9103/"
search_internal_url = "http://search.internal/internal"
search_external_url = "http://search.internal/external"
case_url = "http://cases.internal"
notify_url = "http://notify.internal/hook"
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(
            config.database_url.as_deref(),
            Some("sqlite:///var/lib/socweave/runs.db")
        );
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.endpoints.case_url, "http://cases.internal");
    }

    #[tokio::test]
    async fn invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "not { valid toml !!!")
            .await
            .unwrap();
        let config = load_engine_config(tmp.path()).await;
        assert!(config.database_url.is_none());
    }
}
