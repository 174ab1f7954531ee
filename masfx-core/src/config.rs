//! Run configuration.
//!
//! Loaded once from a TOML file and passed to the feed client, the
//! credential resolver and the warehouse client at construction time.

use crate::error::EtlError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "MASFX_CONFIG";
/// Config file used when `MASFX_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "masfx.toml";

/// Complete configuration for one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtlConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    pub warehouse: WarehouseConfig,
    pub credentials: CredentialSource,
}

/// Where the rate feed lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_resource_id")]
    pub resource_id: String,
    /// Page size sent to the datastore; the datastore default applies when unset.
    #[serde(default)]
    pub limit: Option<u32>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            resource_id: default_resource_id(),
            limit: None,
        }
    }
}

fn default_base_url() -> String {
    "https://eservices.mas.gov.sg/api/action/datastore/search.json".into()
}

fn default_resource_id() -> String {
    "95932927-c8bc-4e7a-b484-68a66a24edfe".into()
}

/// Destination table location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub project_id: String,
    /// BigQuery dataset location, e.g. `asia-southeast1`.
    pub location: String,
    pub dataset_id: String,
    pub table_id: String,
    /// Load job status poll interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl WarehouseConfig {
    /// Fully qualified `project.dataset.table` identifier.
    pub fn table_ref(&self) -> String {
        format!("{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// Where to find the service-account key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CredentialSource {
    /// Key file at a fixed path.
    File { path: PathBuf },
    /// Key file whose path is held in an environment variable.
    Env {
        #[serde(default = "default_credentials_var")]
        var: String,
    },
}

fn default_credentials_var() -> String {
    "GOOGLE_APPLICATION_CREDENTIALS".into()
}

impl EtlConfig {
    /// Load the config from `MASFX_CONFIG`, falling back to `masfx.toml`.
    pub fn from_env() -> Result<Self, EtlError> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::from_file(&path)
    }

    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, EtlError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, EtlError> {
        let config: Self =
            toml::from_str(content).map_err(|e| EtlError::Config(format!("parse config TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), EtlError> {
        let required = [
            ("feed.base_url", &self.feed.base_url),
            ("feed.resource_id", &self.feed.resource_id),
            ("warehouse.project_id", &self.warehouse.project_id),
            ("warehouse.location", &self.warehouse.location),
            ("warehouse.dataset_id", &self.warehouse.dataset_id),
            ("warehouse.table_id", &self.warehouse.table_id),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(EtlError::Config(format!("'{key}' must not be empty")));
            }
        }
        if self.warehouse.poll_interval_ms == 0 {
            return Err(EtlError::Config(
                "'warehouse.poll_interval_ms' must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [warehouse]
        project_id = "analytics-prod"
        location = "asia-southeast1"
        dataset_id = "fx"
        table_id = "mas_fx_rates"

        [credentials]
        source = "file"
        path = "/secrets/sa.json"
    "#;

    #[test]
    fn minimal_config_uses_feed_defaults() {
        let config = EtlConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.feed, FeedConfig::default());
        assert_eq!(config.warehouse.poll_interval_ms, 1000);
        assert_eq!(config.warehouse.table_ref(), "analytics-prod.fx.mas_fx_rates");
        assert_eq!(
            config.credentials,
            CredentialSource::File {
                path: PathBuf::from("/secrets/sa.json")
            }
        );
    }

    #[test]
    fn env_credentials_default_variable() {
        let toml = r#"
            [feed]
            resource_id = "abc"
            limit = 500

            [warehouse]
            project_id = "p"
            location = "US"
            dataset_id = "d"
            table_id = "t"

            [credentials]
            source = "env"
        "#;
        let config = EtlConfig::from_toml(toml).unwrap();
        assert_eq!(config.feed.resource_id, "abc");
        assert_eq!(config.feed.limit, Some(500));
        assert_eq!(
            config.credentials,
            CredentialSource::Env {
                var: "GOOGLE_APPLICATION_CREDENTIALS".into()
            }
        );
    }

    #[test]
    fn empty_identifier_is_rejected() {
        let toml = MINIMAL.replace("table_id = \"mas_fx_rates\"", "table_id = \"\"");
        let err = EtlConfig::from_toml(&toml).unwrap_err();
        assert!(matches!(err, EtlError::Config(ref msg) if msg.contains("warehouse.table_id")));
    }

    #[test]
    fn missing_warehouse_section_is_rejected() {
        let toml = r#"
            [credentials]
            source = "env"
        "#;
        assert!(matches!(EtlConfig::from_toml(toml), Err(EtlError::Config(_))));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("masfx.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = EtlConfig::from_file(&path).unwrap();
        assert_eq!(config.warehouse.dataset_id, "fx");

        let missing = EtlConfig::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(EtlError::Config(_))));
    }
}
