use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::IngestError;

fn default_db_port() -> u16 {
    5432
}

fn default_schema() -> String {
    "gar".to_string()
}

fn default_batch_size() -> usize {
    5000
}

fn default_update_batch_size() -> usize {
    1000
}

/// Runtime configuration for a single-region ingest run.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db_host: String,
    #[serde(default = "default_db_port")]
    pub db_port: u16,
    pub db_user: String,
    #[serde(default)]
    pub db_password: String,
    pub db_name: String,
    #[serde(default = "default_schema")]
    pub db_schema: String,

    /// Directory holding the extracted GAR XML files.
    pub xml_directory: PathBuf,

    /// Two-digit region code; also searched as a subdirectory of
    /// `xml_directory`.
    #[serde(default)]
    pub region_code: Option<String>,

    /// Rows per INSERT batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Rows per UPDATE batch during parent filling.
    #[serde(default = "default_update_batch_size")]
    pub update_batch_size: usize,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, IngestError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            IngestError::Config(format!(
                "failed to read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| IngestError::Config(format!("failed to parse config file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), IngestError> {
        if self.db_host.is_empty() {
            return Err(IngestError::Config("db_host must not be empty".into()));
        }
        if self.db_name.is_empty() {
            return Err(IngestError::Config("db_name must not be empty".into()));
        }
        if self.db_schema.is_empty()
            || !self
                .db_schema
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(IngestError::Config(format!(
                "db_schema {:?} must be a plain identifier",
                self.db_schema
            )));
        }
        if self.batch_size == 0 || self.update_batch_size == 0 {
            return Err(IngestError::Config("batch sizes must be positive".into()));
        }
        Ok(())
    }

    pub fn pg_conn_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            self.db_host, self.db_port, self.db_user, self.db_password, self.db_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_host = "localhost"
            db_user = "gar"
            db_name = "gar"
            xml_directory = "/data/gar"
            "#,
        )
        .unwrap();

        assert_eq!(config.db_port, 5432);
        assert_eq!(config.db_schema, "gar");
        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.update_batch_size, 1000);
        assert!(config.region_code.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_suspicious_schema_name() {
        let mut config: Config = toml::from_str(
            r#"
            db_host = "localhost"
            db_user = "gar"
            db_name = "gar"
            xml_directory = "/data/gar"
            "#,
        )
        .unwrap();
        config.db_schema = "gar; drop table houses".into();
        assert!(config.validate().is_err());
    }
}
