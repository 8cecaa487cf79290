//! Client for the public FIAS download-file web service.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_API_BASE: &str = "https://fias.nalog.ru/WebServices/Public";

const VERSION_TIMEOUT: Duration = Duration::from_secs(30);

/// The service's description of the latest published GAR snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "VersionId")]
    pub version_id: i64,

    /// Full-region archive; used for a first install.
    #[serde(rename = "GarXMLFullURL")]
    pub full_url: Option<String>,

    /// Delta archive; smaller, but still applied as a full rebuild.
    #[serde(rename = "GarXMLDeltaURL")]
    pub delta_url: Option<String>,
}

impl VersionInfo {
    pub fn version(&self) -> String {
        self.version_id.to_string()
    }
}

pub struct FiasApi {
    client: reqwest::Client,
    base: String,
}

impl FiasApi {
    pub fn new(base: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(VERSION_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base: base.into(),
        })
    }

    /// Fetch the latest published version descriptor.
    pub async fn last_version(&self) -> Result<VersionInfo> {
        let url = format!("{}/GetLastDownloadFileInfo", self.base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()
            .context("version service returned an error status")?;
        response
            .json::<VersionInfo>()
            .await
            .context("parsing version service response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_service_payload() {
        let info: VersionInfo = serde_json::from_str(
            r#"{
                "VersionId": 20240801,
                "TextVersion": "БД ФИАС от 01.08.2024",
                "GarXMLFullURL": "https://fias-file.nalog.ru/downloads/gar_xml.zip",
                "GarXMLDeltaURL": "https://fias-file.nalog.ru/downloads/gar_delta_xml.zip"
            }"#,
        )
        .unwrap();

        assert_eq!(info.version(), "20240801");
        assert!(info.full_url.is_some());
        assert!(info.delta_url.is_some());
    }

    #[test]
    fn tolerates_missing_download_urls() {
        let info: VersionInfo = serde_json::from_str(r#"{"VersionId": 5}"#).unwrap();
        assert!(info.full_url.is_none());
        assert!(info.delta_url.is_none());
    }
}
