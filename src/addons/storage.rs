//! Registry persistence.
//!
//! Stores the addon registry as TOML at `~/.addonkeeper/registry.toml`.
//! Records are keyed by folder, so a duplicated folder is rejected by the
//! file format itself.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::types::{AddonError, AddonRecord};

/// Maximum registry file size (4MB).
const MAX_FILE_SIZE: u64 = 4 * 1024 * 1024;

/// Current registry file format version.
const FORMAT_VERSION: u32 = 1;

/// Errors that can occur during registry storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// TOML parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// File too large.
    #[error("File too large (max {MAX_FILE_SIZE} bytes)")]
    FileTooLarge,

    /// Contents parsed but violate a registry invariant.
    #[error("Corrupt registry: {0}")]
    Corrupt(String),
}

impl From<StorageError> for AddonError {
    fn from(err: StorageError) -> Self {
        Self::Registry(err.to_string())
    }
}

/// On-disk layout.
#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    #[serde(default)]
    addons: BTreeMap<String, AddonRecord>,
}

/// Registry file manager.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    /// Path to the registry file.
    path: PathBuf,
}

impl RegistryStore {
    /// Creates a store with a custom path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        assert!(!path.as_os_str().is_empty(), "path must not be empty");
        Self { path }
    }

    /// Returns the default registry path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        crate::config::data_directory().join("registry.toml")
    }

    /// Returns the registry file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all records, keyed by folder.
    ///
    /// A missing file is an empty registry.
    pub fn load(&self) -> Result<BTreeMap<String, AddonRecord>, StorageError> {
        if !self.path.exists() {
            debug!("[REGISTRY] No registry file at {:?}, starting empty", self.path);
            return Ok(BTreeMap::new());
        }

        let metadata = fs::metadata(&self.path)?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(StorageError::FileTooLarge);
        }

        let content = fs::read_to_string(&self.path)?;
        let file: RegistryFile = toml::from_str(&content)?;

        if file.version > FORMAT_VERSION {
            return Err(StorageError::Corrupt(format!(
                "unsupported registry version {}",
                file.version
            )));
        }

        for (key, record) in &file.addons {
            if *key != record.folder {
                return Err(StorageError::Corrupt(format!(
                    "record key '{}' does not match folder '{}'",
                    key, record.folder
                )));
            }
        }

        info!("[REGISTRY] Loaded {} records from {:?}", file.addons.len(), self.path);
        Ok(file.addons)
    }

    /// Saves all records.
    pub fn save(&self, records: &BTreeMap<String, AddonRecord>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = RegistryFile {
            version: FORMAT_VERSION,
            addons: records.clone(),
        };
        let content = toml::to_string_pretty(&file)?;

        // Write atomically (write to temp, then rename)
        let temp_path = self.path.with_extension("tmp");
        {
            let mut out = fs::File::create(&temp_path)?;
            out.write_all(content.as_bytes())?;
            out.flush()?;
        }
        fs::rename(&temp_path, &self.path)?;

        debug!("[REGISTRY] Saved {} records to {:?}", records.len(), self.path);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::addons::types::{AddonKind, AddonType};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_records() -> BTreeMap<String, AddonRecord> {
        let mut parent = AddonRecord::new("DBM-Core")
            .with_name("Deadly Boss Mods")
            .with_owned_folders(["DBM-StatusBarTimers", "DBM-GUI"])
            .with_required_deps(["LibStub"])
            .with_optional_deps(["LibSharedMedia-3.0", "LibDBIcon-1.0"]);
        parent.addon_type = AddonType::Repository;
        parent.embedded_libs = vec!["LibStub".to_string(), "CallbackHandler-1.0".to_string()];
        parent.install_date = Some(chrono::Utc::now());

        let lib = AddonRecord::new("LibStub").with_kind(AddonKind::Library);

        let mut records = BTreeMap::new();
        records.insert(parent.folder.clone(), parent);
        records.insert(lib.folder.clone(), lib);
        records
    }

    #[test]
    fn test_default_path() {
        let path = RegistryStore::default_path();
        assert!(path.to_string_lossy().contains("registry.toml"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = RegistryStore::with_path(dir.path().join("registry.toml"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_load_preserves_arrays() {
        let dir = TempDir::new().unwrap();
        let store = RegistryStore::with_path(dir.path().join("nested").join("registry.toml"));
        let records = sample_records();

        store.save(&records).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, records);
        assert_eq!(
            loaded["DBM-Core"].owned_folders,
            vec!["DBM-StatusBarTimers".to_string(), "DBM-GUI".to_string()]
        );
    }

    #[test]
    fn test_duplicate_folder_rejected_by_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.toml");
        fs::write(
            &path,
            "version = 1\n\n[addons.Details]\nfolder = \"Details\"\n\n[addons.Details]\nfolder = \"Details\"\n",
        )
        .unwrap();

        let store = RegistryStore::with_path(path);
        assert!(matches!(store.load(), Err(StorageError::Parse(_))));
    }

    #[test]
    fn test_key_mismatch_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.toml");
        fs::write(&path, "version = 1\n\n[addons.Details]\nfolder = \"Other\"\n").unwrap();

        let store = RegistryStore::with_path(path);
        assert!(matches!(store.load(), Err(StorageError::Corrupt(_))));
    }
}
