//! WoWInterface marketplace client.
//!
//! WoWInterface publishes one current file per project, so every result is a
//! stable release and downloads are recorded as manual downloads.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::cache::TimedCache;
use super::{MarketplaceClient, MarketplaceFile, MarketplaceRecord, ReleaseChannel, http_client};
use crate::addons::{AddonError, AddonType};

/// Default API base URL.
const DEFAULT_BASE_URL: &str = "https://api.mmoui.com/v3/game/WOW";

/// Cache expiration time (5 minutes).
const CACHE_EXPIRATION_SECS: u64 = 300;

/// File details entry.
#[derive(Debug, Deserialize)]
struct WowiFile {
    #[serde(rename = "UID")]
    uid: String,
    #[serde(rename = "UIName")]
    name: String,
    #[serde(rename = "UIVersion", default)]
    version: Option<String>,
    /// Upload time of the current file, in epoch milliseconds.
    #[serde(rename = "UIDate", default)]
    date: Option<u64>,
    #[serde(rename = "UIAuthorName", default)]
    author: Option<String>,
    #[serde(rename = "UIDescription", default)]
    description: Option<String>,
    #[serde(rename = "UIDownload", default)]
    download: Option<String>,
    #[serde(rename = "UIFileInfoURL", default)]
    info_url: Option<String>,
}

impl From<WowiFile> for MarketplaceRecord {
    fn from(f: WowiFile) -> Self {
        // The project id never changes; the upload time does
        let file_id = f.date.unwrap_or_else(|| f.uid.parse().unwrap_or(0));
        Self {
            id: f.uid,
            name: f.name,
            author: f.author,
            summary: f.description,
            url: f.info_url,
            files: vec![MarketplaceFile {
                id: file_id,
                version: f.version.unwrap_or_default(),
                channel: ReleaseChannel::Stable,
                download_url: f.download.filter(|u| !u.is_empty()),
                flavors: Vec::new(),
            }],
        }
    }
}

/// WoWInterface API client.
pub struct WowInterfaceClient {
    /// HTTP client.
    client: reqwest::blocking::Client,
    /// API base URL.
    base_url: String,
    /// Project details by id.
    cache: RwLock<TimedCache<String, MarketplaceRecord>>,
}

impl Default for WowInterfaceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WowInterfaceClient {
    /// Creates a client against the public API.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a client against a custom base URL.
    #[must_use]
    pub fn with_base_url(base_url: &str) -> Self {
        assert!(!base_url.is_empty(), "Base URL must not be empty");

        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: RwLock::new(TimedCache::new(Duration::from_secs(CACHE_EXPIRATION_SECS))),
        }
    }

    /// Clears cached project details.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    fn fetch_details(&self, id: u64) -> Result<MarketplaceRecord, AddonError> {
        let url = format!("{}/filedetails/{}.json", self.base_url, id);
        debug!("[WOWI] GET {}", url);
        let start = Instant::now();

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| {
                warn!("[WOWI] HTTP request failed: {}", e);
                AddonError::Network(e.to_string())
            })?;

        let status = response.status();
        debug!("[WOWI] Response: {} in {:?}", status, start.elapsed());

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AddonError::NotFound(format!("WoWInterface addon {}", id)));
        }
        if !status.is_success() {
            return Err(AddonError::Network(format!("WoWInterface API error: {}", status)));
        }

        let files: Vec<WowiFile> = response
            .json()
            .map_err(|e| AddonError::Network(format!("Failed to parse response: {}", e)))?;
        first_record(files, id)
    }
}

/// The API answers with an array; an empty one means an unknown id.
fn first_record(files: Vec<WowiFile>, id: u64) -> Result<MarketplaceRecord, AddonError> {
    files
        .into_iter()
        .next()
        .map(MarketplaceRecord::from)
        .ok_or_else(|| AddonError::NotFound(format!("WoWInterface addon {}", id)))
}

impl MarketplaceClient for WowInterfaceClient {
    fn provider_name(&self) -> &'static str {
        "WoWInterface"
    }

    fn source_type(&self) -> AddonType {
        AddonType::ManualDownload
    }

    fn get_details(&self, id: &str) -> Result<MarketplaceRecord, AddonError> {
        let numeric: u64 = id.trim().parse().map_err(|_| {
            AddonError::Validation(format!("Invalid WoWInterface addon id: '{}'", id))
        })?;
        let key = numeric.to_string();

        if let Ok(cache) = self.cache.read() {
            if let Some(record) = cache.get(&key) {
                debug!("[WOWI] Returning cached addon {}", key);
                return Ok(record);
            }
        }

        let record = self.fetch_details(numeric)?;
        info!("[WOWI] Addon {} '{}'", record.id, record.name);

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, record.clone());
        }
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_id() {
        let client = WowInterfaceClient::new();
        assert!(matches!(
            client.get_details("details-damage-meter"),
            Err(AddonError::Validation(_))
        ));
    }

    #[test]
    fn test_file_details() {
        let json = r#"[{"UID":"23056","UIName":"Details! Damage Meter","UIVersion":"11.0.2",
            "UIAuthorName":"Terciob","UIDownload":"https://cdn.wowinterface.com/downloads/getfile.php?id=23056",
            "UIFileInfoURL":"https://www.wowinterface.com/downloads/info23056"}]"#;
        let files: Vec<WowiFile> = serde_json::from_str(json).unwrap();
        let record = first_record(files, 23056).unwrap();

        assert_eq!(record.name, "Details! Damage Meter");
        assert_eq!(record.files.len(), 1);
        assert_eq!(record.files[0].version, "11.0.2");

        let client = WowInterfaceClient::new();
        assert!(client.resolve_download_url(&record, ReleaseChannel::Stable).is_some());
        assert_eq!(client.source_type(), AddonType::ManualDownload);
    }

    #[test]
    fn test_new_upload_is_a_new_release() {
        let installed = r#"[{"UID":"5108","UIName":"Bagnon","UIVersion":"10.0","UIDate":1700000000000}]"#;
        let current = r#"[{"UID":"5108","UIName":"Bagnon","UIVersion":"11.0","UIDate":1720000000000}]"#;
        let installed = first_record(serde_json::from_str(installed).unwrap(), 5108).unwrap();
        let current = first_record(serde_json::from_str(current).unwrap(), 5108).unwrap();

        let key = |r: &MarketplaceRecord| {
            r.latest_file(ReleaseChannel::Stable)
                .unwrap()
                .release_key(AddonType::ManualDownload)
        };
        assert_ne!(key(&installed), key(&current));
        assert_eq!(current.id, "5108");
    }

    #[test]
    fn test_empty_details_is_not_found() {
        assert!(matches!(first_record(Vec::new(), 1), Err(AddonError::NotFound(_))));
    }
}
