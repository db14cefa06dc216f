//! Remote addon sources.
//!
//! Commands consume providers only through the traits defined here:
//!
//! - **VersionControlClient**: shallow clones and remote revisions (`git`)
//! - **ArchiveFetcher**: archive download and extraction (`reqwest`, `zip`)
//! - **MarketplaceClient**: project lookup and download URL resolution, one
//!   implementation per site (CurseForge, WoWInterface)

mod archive;
mod cache;
mod curseforge;
mod git;
mod wowinterface;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::addons::{AddonError, AddonType, Flavor};

pub use archive::HttpArchiveFetcher;
pub use cache::TimedCache;
pub use curseforge::CurseForgeClient;
pub use git::GitCli;
pub use wowinterface::WowInterfaceClient;

/// User agent sent with every HTTP request.
pub(crate) const USER_AGENT: &str = concat!("addonkeeper/", env!("CARGO_PKG_VERSION"));

/// HTTP request timeout.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Client flavor whose files marketplace installs pick.
///
/// The locator only accepts `_retail_` addon directories.
pub const TARGET_FLAVOR: Flavor = Flavor::Retail;

/// Hosts accepted for repository installs.
pub const SUPPORTED_HOSTS: &[&str] = &["github.com", "gitlab.com"];

/// Release tier offered by a marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    #[default]
    Stable,
    Beta,
    Alpha,
}

impl ReleaseChannel {
    /// Parses a channel from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "stable" | "release" => Some(Self::Stable),
            "beta" => Some(Self::Beta),
            "alpha" => Some(Self::Alpha),
            _ => None,
        }
    }

    /// Returns true if a file on `self` is acceptable when `wanted` was asked.
    ///
    /// A more stable file always qualifies.
    #[must_use]
    pub fn satisfies(&self, wanted: ReleaseChannel) -> bool {
        *self <= wanted
    }
}

/// One downloadable file of a marketplace project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplaceFile {
    /// Provider file identifier; higher is newer.
    pub id: u64,
    /// Version label shown by the provider.
    pub version: String,
    pub channel: ReleaseChannel,
    /// Absent when the author disabled third-party downloads.
    pub download_url: Option<String>,
    /// Client flavors the file targets; empty when the provider does not say.
    pub flavors: Vec<Flavor>,
}

impl MarketplaceFile {
    /// Returns true if the file can be installed into a `flavor` client.
    #[must_use]
    pub fn supports(&self, flavor: Flavor) -> bool {
        self.flavors.is_empty() || self.flavors.contains(&flavor)
    }

    /// Identifier recorded as the installed release and compared on checks.
    ///
    /// Manual-download sites keep one file id per project, so their version
    /// label is part of the key.
    #[must_use]
    pub fn release_key(&self, source: AddonType) -> String {
        match source {
            AddonType::ManualDownload if !self.version.is_empty() => {
                format!("{}@{}", self.id, self.version)
            }
            _ => self.id.to_string(),
        }
    }
}

/// Project details from a marketplace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplaceRecord {
    pub id: String,
    pub name: String,
    pub author: Option<String>,
    pub summary: Option<String>,
    /// Project page.
    pub url: Option<String>,
    pub files: Vec<MarketplaceFile>,
}

impl MarketplaceRecord {
    /// Returns the newest file acceptable for `channel` on the retail client.
    #[must_use]
    pub fn latest_file(&self, channel: ReleaseChannel) -> Option<&MarketplaceFile> {
        self.files
            .iter()
            .filter(|f| f.channel.satisfies(channel) && f.supports(TARGET_FLAVOR))
            .max_by_key(|f| f.id)
    }
}

/// Git-style source control.
pub trait VersionControlClient: Send + Sync {
    /// Shallow-clones `url` into `dest`.
    fn clone_repo(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<(), AddonError>;

    /// Returns the current revision of the remote branch (default branch if
    /// `None`).
    fn remote_revision(&self, url: &str, branch: Option<&str>) -> Option<String>;
}

/// Archive download and extraction.
pub trait ArchiveFetcher: Send + Sync {
    /// Downloads `url` to `dest`.
    fn download(&self, url: &str, dest: &Path) -> Result<(), AddonError>;

    /// Extracts `archive` into `dest_dir`.
    fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<(), AddonError>;
}

/// A curated addon site.
pub trait MarketplaceClient: Send + Sync {
    /// Short provider name for messages.
    fn provider_name(&self) -> &'static str;

    /// Registry type recorded for addons from this provider.
    fn source_type(&self) -> AddonType;

    /// Looks up a project.
    fn get_details(&self, id: &str) -> Result<MarketplaceRecord, AddonError>;

    /// Returns the download URL of the newest file for `channel`.
    fn resolve_download_url(
        &self,
        record: &MarketplaceRecord,
        channel: ReleaseChannel,
    ) -> Option<String> {
        record
            .latest_file(channel)
            .and_then(|f| f.download_url.clone())
    }
}

/// A parsed repository reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    /// Canonical clone URL.
    #[must_use]
    pub fn clone_url(&self) -> String {
        format!("https://{}/{}/{}.git", self.host, self.owner, self.repo)
    }

    /// Web page URL.
    #[must_use]
    pub fn web_url(&self) -> String {
        format!("https://{}/{}/{}", self.host, self.owner, self.repo)
    }
}

/// Parses a repository URL or `owner/repo` shorthand (GitHub).
pub fn parse_repository_url(input: &str) -> Result<RepoRef, AddonError> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AddonError::Validation("Repository URL is empty".to_string()));
    }

    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));

    let (host, path) = match without_scheme {
        Some(rest) => {
            let (host, path) = rest.split_once('/').ok_or_else(|| {
                AddonError::Validation(format!("Invalid repository URL: {}", input))
            })?;
            let host = host.trim_start_matches("www.").to_lowercase();
            (host, path)
        }
        None if trimmed.contains("://") => {
            return Err(AddonError::Validation(format!(
                "Unsupported URL scheme: {}",
                input
            )));
        }
        None => ("github.com".to_string(), trimmed),
    };

    if !SUPPORTED_HOSTS.contains(&host.as_str()) {
        return Err(AddonError::Validation(format!(
            "Unsupported source host '{}' (supported: {})",
            host,
            SUPPORTED_HOSTS.join(", ")
        )));
    }

    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return Err(AddonError::Validation(format!(
            "Repository URL must name owner and repository: {}",
            input
        )));
    }

    let owner = parts[0].to_string();
    let repo = parts[1].trim_end_matches(".git").to_string();
    if repo.is_empty() {
        return Err(AddonError::Validation(format!(
            "Invalid repository name in {}",
            input
        )));
    }

    Ok(RepoRef { host, owner, repo })
}

/// Builds the shared blocking HTTP client.
pub(crate) fn http_client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::blocking::Client::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repository_url() {
        let r = parse_repository_url("https://github.com/WeakAuras/WeakAuras2").unwrap();
        assert_eq!(r.host, "github.com");
        assert_eq!(r.owner, "WeakAuras");
        assert_eq!(r.repo, "WeakAuras2");
        assert_eq!(r.clone_url(), "https://github.com/WeakAuras/WeakAuras2.git");

        let r = parse_repository_url("https://gitlab.com/owner/repo.git/").unwrap();
        assert_eq!(r.host, "gitlab.com");
        assert_eq!(r.repo, "repo");

        let r = parse_repository_url("owner/repo").unwrap();
        assert_eq!(r.host, "github.com");
    }

    #[test]
    fn test_parse_repository_url_rejects() {
        assert!(matches!(
            parse_repository_url("https://bitbucket.org/a/b"),
            Err(AddonError::Validation(_))
        ));
        assert!(matches!(
            parse_repository_url("https://github.com/onlyowner"),
            Err(AddonError::Validation(_))
        ));
        assert!(matches!(
            parse_repository_url("ssh://github.com/a/b"),
            Err(AddonError::Validation(_))
        ));
        assert!(matches!(parse_repository_url("  "), Err(AddonError::Validation(_))));
    }

    #[test]
    fn test_channel_satisfies() {
        assert!(ReleaseChannel::Stable.satisfies(ReleaseChannel::Beta));
        assert!(ReleaseChannel::Beta.satisfies(ReleaseChannel::Beta));
        assert!(!ReleaseChannel::Alpha.satisfies(ReleaseChannel::Stable));
    }

    #[test]
    fn test_latest_file() {
        let record = MarketplaceRecord {
            id: "1".to_string(),
            name: "Foo".to_string(),
            author: None,
            summary: None,
            url: None,
            files: vec![
                MarketplaceFile {
                    id: 10,
                    version: "1.0".to_string(),
                    channel: ReleaseChannel::Stable,
                    download_url: Some("https://x/10.zip".to_string()),
                    flavors: Vec::new(),
                },
                MarketplaceFile {
                    id: 12,
                    version: "1.1-beta".to_string(),
                    channel: ReleaseChannel::Beta,
                    download_url: Some("https://x/12.zip".to_string()),
                    flavors: vec![Flavor::Retail],
                },
                MarketplaceFile {
                    id: 14,
                    version: "1.1-classic".to_string(),
                    channel: ReleaseChannel::Stable,
                    download_url: Some("https://x/14.zip".to_string()),
                    flavors: vec![Flavor::Classic, Flavor::Cata],
                },
            ],
        };
        assert_eq!(record.latest_file(ReleaseChannel::Stable).unwrap().id, 10);
        assert_eq!(record.latest_file(ReleaseChannel::Alpha).unwrap().id, 12);
    }

    #[test]
    fn test_release_key_tracks_manual_download_versions() {
        let mut file = MarketplaceFile {
            id: 5108,
            version: "10.0".to_string(),
            channel: ReleaseChannel::Stable,
            download_url: None,
            flavors: Vec::new(),
        };
        let installed = file.release_key(AddonType::ManualDownload);
        file.version = "11.0".to_string();

        assert_ne!(installed, file.release_key(AddonType::ManualDownload));
        assert_eq!(file.release_key(AddonType::Marketplace), "5108");
    }
}
