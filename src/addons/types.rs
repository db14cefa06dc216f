//! Add-on type definitions.
//!
//! Core data structures for the addon registry: the persisted record, its
//! classification enums, the merge patch used by updates, and the error type
//! shared by every registry and command operation.

use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where an installed addon came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddonType {
    /// Cloned from a version-control host.
    Repository,
    /// Installed from a curated marketplace API.
    Marketplace,
    /// Installed from a manual-download site.
    ManualDownload,
    /// Found on disk, not installed by us.
    #[default]
    Unmanaged,
}

impl AddonType {
    /// Returns true if this addon can be updated from a remote source.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        !matches!(self, Self::Unmanaged)
    }

    /// Returns a display string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repository => "repository",
            Self::Marketplace => "marketplace",
            Self::ManualDownload => "manual-download",
            Self::Unmanaged => "unmanaged",
        }
    }
}

/// Classification of a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddonKind {
    /// Standalone, user-facing addon.
    #[default]
    Addon,
    /// Meant to be depended upon.
    Library,
}

impl AddonKind {
    /// Parses a kind from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "addon" => Some(Self::Addon),
            "library" | "lib" => Some(Self::Library),
            _ => None,
        }
    }

    /// Returns a display string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Addon => "addon",
            Self::Library => "library",
        }
    }
}

/// Client variant a folder targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    /// Current retail client.
    Retail,
    /// Original classic ("era") client.
    Classic,
    /// Burning Crusade classic.
    Tbc,
    /// Wrath classic.
    Wrath,
    /// Cataclysm classic.
    Cata,
    /// Mists classic.
    Mists,
}

impl Flavor {
    /// Derives the flavor from a manifest interface number.
    ///
    /// Interface numbers encode the major client version in the leading
    /// digits (`11507` is 1.15.x, `110002` is 11.0.x).
    #[must_use]
    pub fn from_interface(interface: &str) -> Option<Self> {
        let first = interface.split(',').next()?.trim();
        let value: u32 = first.parse().ok()?;
        match value {
            0 => None,
            1..=19_999 => Some(Self::Classic),
            20_000..=29_999 => Some(Self::Tbc),
            30_000..=39_999 => Some(Self::Wrath),
            40_000..=49_999 => Some(Self::Cata),
            50_000..=59_999 => Some(Self::Mists),
            _ => Some(Self::Retail),
        }
    }

    /// Derives the flavor from a manifest filename suffix.
    #[must_use]
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_lowercase().as_str() {
            "mainline" => Some(Self::Retail),
            "classic" | "vanilla" => Some(Self::Classic),
            "tbc" | "bcc" => Some(Self::Tbc),
            "wrath" | "wotlkc" => Some(Self::Wrath),
            "cata" => Some(Self::Cata),
            "mists" => Some(Self::Mists),
            _ => None,
        }
    }

    /// Returns a display string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retail => "retail",
            Self::Classic => "classic",
            Self::Tbc => "tbc",
            Self::Wrath => "wrath",
            Self::Cata => "cata",
            Self::Mists => "mists",
        }
    }
}

/// One installed addon in the registry.
///
/// `folder` is the unique key. Folders listed in `owned_folders` belong to
/// this record and never have a record of their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonRecord {
    /// On-disk directory name.
    pub folder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Client interface version string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Provider-side project identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(rename = "type", default)]
    pub addon_type: AddonType,
    #[serde(default)]
    pub kind: AddonKind,
    /// Pinned by the user; reconciliation never reclassifies.
    #[serde(default)]
    pub kind_override: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<Flavor>,
    /// Soft reference to another record's folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub owned_folders: Vec<String>,
    #[serde(default)]
    pub required_deps: Vec<String>,
    #[serde(default)]
    pub optional_deps: Vec<String>,
    #[serde(default)]
    pub embedded_libs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    /// Provider release identifier of the installed files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_version: Option<String>,
}

impl AddonRecord {
    /// Creates an unmanaged record for a folder.
    #[must_use]
    pub fn new(folder: impl Into<String>) -> Self {
        let folder = folder.into();
        assert!(!folder.is_empty(), "Addon folder must not be empty");

        Self {
            folder,
            name: None,
            version: None,
            author: None,
            interface: None,
            url: None,
            source_id: None,
            addon_type: AddonType::Unmanaged,
            kind: AddonKind::Addon,
            kind_override: false,
            flavor: None,
            parent: None,
            owned_folders: Vec::new(),
            required_deps: Vec::new(),
            optional_deps: Vec::new(),
            embedded_libs: Vec::new(),
            git_commit: None,
            installed_release: None,
            install_date: None,
            last_updated: None,
            last_checked: None,
            remote_version: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the kind.
    #[must_use]
    pub fn with_kind(mut self, kind: AddonKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the required dependencies.
    #[must_use]
    pub fn with_required_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_deps = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the optional dependencies.
    #[must_use]
    pub fn with_optional_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional_deps = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the owned folders.
    #[must_use]
    pub fn with_owned_folders<I, S>(mut self, folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.owned_folders = folders.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the display name, falling back to the folder.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.folder)
    }

    /// Returns this record's folder followed by every owned folder.
    #[must_use]
    pub fn all_folders(&self) -> Vec<String> {
        let mut folders = Vec::with_capacity(1 + self.owned_folders.len());
        folders.push(self.folder.clone());
        folders.extend(self.owned_folders.iter().cloned());
        folders
    }

    /// Returns true if the remote version differs from the installed one.
    #[must_use]
    pub fn has_update(&self) -> bool {
        let installed = match self.addon_type {
            AddonType::Repository => self.git_commit.as_deref(),
            _ => self.installed_release.as_deref(),
        };
        match (installed, self.remote_version.as_deref()) {
            (Some(local), Some(remote)) => local != remote,
            (None, Some(_)) => true,
            _ => false,
        }
    }

    /// Applies a merge patch.
    ///
    /// Scalar fields are replaced only when set in the patch; array fields
    /// are replaced wholesale.
    pub fn apply(&mut self, patch: AddonPatch) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = patch.$field {
                    self.$field = value;
                })*
            };
        }

        merge!(
            name,
            version,
            author,
            interface,
            url,
            source_id,
            addon_type,
            kind,
            kind_override,
            flavor,
            parent,
            owned_folders,
            required_deps,
            optional_deps,
            embedded_libs,
            git_commit,
            installed_release,
            install_date,
            last_updated,
            last_checked,
            remote_version,
        );
    }
}

/// Partial update for an [`AddonRecord`].
///
/// `None` leaves a field untouched. For nullable fields, `Some(None)` clears
/// the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddonPatch {
    pub name: Option<Option<String>>,
    pub version: Option<Option<String>>,
    pub author: Option<Option<String>>,
    pub interface: Option<Option<String>>,
    pub url: Option<Option<String>>,
    pub source_id: Option<Option<String>>,
    pub addon_type: Option<AddonType>,
    pub kind: Option<AddonKind>,
    pub kind_override: Option<bool>,
    pub flavor: Option<Option<Flavor>>,
    pub parent: Option<Option<String>>,
    pub owned_folders: Option<Vec<String>>,
    pub required_deps: Option<Vec<String>>,
    pub optional_deps: Option<Vec<String>>,
    pub embedded_libs: Option<Vec<String>>,
    pub git_commit: Option<Option<String>>,
    pub installed_release: Option<Option<String>>,
    pub install_date: Option<Option<DateTime<Utc>>>,
    pub last_updated: Option<Option<DateTime<Utc>>>,
    pub last_checked: Option<Option<DateTime<Utc>>>,
    pub remote_version: Option<Option<String>>,
}

/// Add-on error types.
#[derive(Debug, Error)]
pub enum AddonError {
    /// Bad input: unsupported host, missing credential, unparseable id.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote package or local record absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport failure or non-success status.
    #[error("Network error: {0}")]
    Network(String),

    /// Permission or copy failure.
    #[error("Filesystem error: {0}")]
    Filesystem(String),

    /// Registry uniqueness violation.
    #[error("Folder '{0}' is already registered")]
    DuplicateFolder(String),

    /// Folder is bundled under another record.
    #[error("Folder '{folder}' is owned by '{owner}'")]
    FolderOwned { folder: String, owner: String },

    /// Package contained no folder with a recognizable manifest.
    #[error("No addon folders with a manifest found in {0}")]
    NoArtifacts(String),

    /// Registry file could not be read or written.
    #[error("Registry error: {0}")]
    Registry(String),
}

impl From<io::Error> for AddonError {
    fn from(err: io::Error) -> Self {
        Self::Filesystem(err.to_string())
    }
}
