//! CurseForge marketplace client.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::cache::TimedCache;
use super::{MarketplaceClient, MarketplaceFile, MarketplaceRecord, ReleaseChannel, http_client};
use crate::addons::{AddonError, AddonType, Flavor};

/// Default API base URL.
const DEFAULT_BASE_URL: &str = "https://api.curseforge.com";

/// Cache expiration time (5 minutes).
const CACHE_EXPIRATION_SECS: u64 = 300;

/// API envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Project ("mod") as returned by the API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfMod {
    id: u64,
    name: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    links: Option<CfLinks>,
    #[serde(default)]
    authors: Vec<CfAuthor>,
    #[serde(default)]
    latest_files: Vec<CfFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfLinks {
    #[serde(default)]
    website_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CfAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfFile {
    id: u64,
    display_name: String,
    /// 1 = release, 2 = beta, 3 = alpha.
    release_type: u8,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    sortable_game_versions: Vec<CfGameVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfGameVersion {
    #[serde(default)]
    game_version_type_id: Option<u64>,
}

/// Maps a game version type id to a client flavor.
fn flavor_of_type(type_id: u64) -> Option<Flavor> {
    match type_id {
        517 => Some(Flavor::Retail),
        67408 => Some(Flavor::Classic),
        73246 => Some(Flavor::Tbc),
        73713 => Some(Flavor::Wrath),
        77522 => Some(Flavor::Cata),
        79434 => Some(Flavor::Mists),
        _ => None,
    }
}

impl CfFile {
    fn flavors(&self) -> Vec<Flavor> {
        let mut flavors: Vec<Flavor> = self
            .sortable_game_versions
            .iter()
            .filter_map(|v| v.game_version_type_id.and_then(flavor_of_type))
            .collect();
        flavors.dedup();
        flavors
    }

    fn channel(&self) -> ReleaseChannel {
        match self.release_type {
            2 => ReleaseChannel::Beta,
            3 => ReleaseChannel::Alpha,
            _ => ReleaseChannel::Stable,
        }
    }
}

impl From<CfMod> for MarketplaceRecord {
    fn from(m: CfMod) -> Self {
        Self {
            id: m.id.to_string(),
            name: m.name,
            author: m.authors.into_iter().next().map(|a| a.name),
            summary: m.summary,
            url: m.links.and_then(|l| l.website_url),
            files: m
                .latest_files
                .into_iter()
                .map(|f| MarketplaceFile {
                    id: f.id,
                    channel: f.channel(),
                    flavors: f.flavors(),
                    version: f.display_name,
                    download_url: f.download_url,
                })
                .collect(),
        }
    }
}

/// CurseForge API client.
pub struct CurseForgeClient {
    /// HTTP client.
    client: reqwest::blocking::Client,
    /// API base URL.
    base_url: String,
    /// API key; required for every request.
    api_key: Option<String>,
    /// Project details by id.
    cache: RwLock<TimedCache<String, MarketplaceRecord>>,
}

impl CurseForgeClient {
    /// Creates a client against the public API.
    #[must_use]
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    /// Creates a client against a custom base URL.
    #[must_use]
    pub fn with_base_url(base_url: &str, api_key: Option<String>) -> Self {
        assert!(!base_url.is_empty(), "Base URL must not be empty");

        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            cache: RwLock::new(TimedCache::new(Duration::from_secs(CACHE_EXPIRATION_SECS))),
        }
    }

    /// Clears cached project details.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    fn fetch_mod(&self, id: u64, api_key: &str) -> Result<MarketplaceRecord, AddonError> {
        let url = format!("{}/v1/mods/{}", self.base_url, id);
        debug!("[CURSEFORGE] GET {}", url);
        let start = Instant::now();

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("x-api-key", api_key)
            .send()
            .map_err(|e| {
                warn!("[CURSEFORGE] HTTP request failed: {}", e);
                AddonError::Network(e.to_string())
            })?;

        let status = response.status();
        debug!("[CURSEFORGE] Response: {} in {:?}", status, start.elapsed());

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AddonError::NotFound(format!("CurseForge project {}", id)));
        }
        if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AddonError::Validation(
                "CurseForge rejected the API key".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(AddonError::Network(format!("CurseForge API error: {}", status)));
        }

        let body: Envelope<CfMod> = response
            .json()
            .map_err(|e| AddonError::Network(format!("Failed to parse response: {}", e)))?;
        Ok(body.data.into())
    }
}

impl MarketplaceClient for CurseForgeClient {
    fn provider_name(&self) -> &'static str {
        "CurseForge"
    }

    fn source_type(&self) -> AddonType {
        AddonType::Marketplace
    }

    fn get_details(&self, id: &str) -> Result<MarketplaceRecord, AddonError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AddonError::Validation("CurseForge API key is not configured".to_string())
        })?;
        let numeric: u64 = id.trim().parse().map_err(|_| {
            AddonError::Validation(format!("Invalid CurseForge project id: '{}'", id))
        })?;
        let key = numeric.to_string();

        if let Ok(cache) = self.cache.read() {
            if let Some(record) = cache.get(&key) {
                debug!("[CURSEFORGE] Returning cached project {}", key);
                return Ok(record);
            }
        }

        let record = self.fetch_mod(numeric, api_key)?;
        info!(
            "[CURSEFORGE] Project {} '{}' has {} files",
            record.id,
            record.name,
            record.files.len()
        );

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
    fn test_missing_api_key() {
        let client = CurseForgeClient::new(None);
        assert!(matches!(
            client.get_details("12345"),
            Err(AddonError::Validation(ref m)) if m.contains("API key")
        ));

        let blank = CurseForgeClient::new(Some("   ".to_string()));
        assert!(matches!(blank.get_details("1"), Err(AddonError::Validation(_))));
    }

    #[test]
    fn test_invalid_id() {
        let client = CurseForgeClient::new(Some("key".to_string()));
        assert!(matches!(
            client.get_details("weakauras"),
            Err(AddonError::Validation(ref m)) if m.contains("project id")
        ));
    }

    #[test]
    fn test_mod_conversion() {
        let json = r#"{"data":{"id":65387,"name":"WeakAuras","summary":"Powerful display framework",
            "links":{"websiteUrl":"https://www.curseforge.com/wow/addons/weakauras-2"},
            "authors":[{"name":"Stanzilla"}],
            "latestFiles":[
                {"id":100,"displayName":"5.0.0","releaseType":1,"downloadUrl":"https://edge/100.zip"},
                {"id":101,"displayName":"5.1.0-beta","releaseType":2,"downloadUrl":null}
            ]}}"#;
        let body: Envelope<CfMod> = serde_json::from_str(json).unwrap();
        let record: MarketplaceRecord = body.data.into();

        assert_eq!(record.id, "65387");
        assert_eq!(record.author.as_deref(), Some("Stanzilla"));
        assert_eq!(record.files[1].channel, ReleaseChannel::Beta);

        let client = CurseForgeClient::new(Some("key".to_string()));
        assert_eq!(
            client.resolve_download_url(&record, ReleaseChannel::Stable).as_deref(),
            Some("https://edge/100.zip")
        );
        // Newest beta has downloads disabled
        assert_eq!(client.resolve_download_url(&record, ReleaseChannel::Beta), None);
    }

    #[test]
    fn test_classic_files_are_not_picked() {
        let json = r#"{"data":{"id":2,"name":"Bagnon","latestFiles":[
                {"id":300,"displayName":"10.2.0","releaseType":1,"downloadUrl":"https://edge/300.zip",
                 "sortableGameVersions":[{"gameVersionTypeId":517}]},
                {"id":301,"displayName":"10.2.0-classic","releaseType":1,"downloadUrl":"https://edge/301.zip",
                 "sortableGameVersions":[{"gameVersionTypeId":67408},{"gameVersionTypeId":77522}]}
            ]}}"#;
        let body: Envelope<CfMod> = serde_json::from_str(json).unwrap();
        let record: MarketplaceRecord = body.data.into();

        assert_eq!(record.files[1].flavors, vec![Flavor::Classic, Flavor::Cata]);
        assert_eq!(record.latest_file(ReleaseChannel::Stable).unwrap().id, 300);
    }
}
