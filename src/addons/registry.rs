//! Addon registry.
//!
//! Keyed store of [`AddonRecord`]s with the dependency and ownership queries
//! the reconciler and commands rely on. When a [`RegistryStore`] is attached,
//! every mutation is written through to disk; a failed write leaves the
//! in-memory state unchanged.

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::storage::RegistryStore;
use super::types::{AddonError, AddonPatch, AddonRecord};

/// Persistent keyed store of addon records.
#[derive(Debug, Default)]
pub struct AddonRegistry {
    /// Records keyed by folder.
    records: BTreeMap<String, AddonRecord>,
    /// Backing file, if any.
    store: Option<RegistryStore>,
}

impl AddonRegistry {
    /// Creates an empty in-memory registry.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens a registry backed by the given store.
    pub fn open(store: RegistryStore) -> Result<Self, AddonError> {
        let records = store.load()?;
        Ok(Self {
            records,
            store: Some(store),
        })
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Adds a new record.
    ///
    /// Fails without mutating state if the folder is already registered or
    /// is owned by another record.
    pub fn add(&mut self, record: AddonRecord) -> Result<(), AddonError> {
        if self.records.contains_key(&record.folder) {
            return Err(AddonError::DuplicateFolder(record.folder));
        }
        if let Some(owner) = self.get_owner_of(&record.folder) {
            return Err(AddonError::FolderOwned {
                folder: record.folder,
                owner: owner.folder.clone(),
            });
        }
        self.check_owned_folders(&record.folder, &record.owned_folders)?;

        info!("[REGISTRY] Adding record '{}'", record.folder);
        let folder = record.folder.clone();
        self.commit(|records| {
            records.insert(folder, record);
        })
    }

    /// Returns the record for a folder.
    #[must_use]
    pub fn get_by_folder(&self, folder: &str) -> Option<&AddonRecord> {
        self.records.get(folder)
    }

    /// Returns true if a record exists for the folder.
    #[must_use]
    pub fn contains(&self, folder: &str) -> bool {
        self.records.contains_key(folder)
    }

    /// Merge-patches a record and returns the updated copy.
    pub fn update(&mut self, folder: &str, patch: AddonPatch) -> Result<AddonRecord, AddonError> {
        let mut updated = self
            .records
            .get(folder)
            .cloned()
            .ok_or_else(|| AddonError::NotFound(format!("addon '{}'", folder)))?;
        updated.apply(patch);

        self.check_owned_folders(folder, &updated.owned_folders)?;

        debug!("[REGISTRY] Updating record '{}'", folder);
        let key = folder.to_string();
        let result = updated.clone();
        self.commit(|records| {
            records.insert(key, updated);
        })?;
        Ok(result)
    }

    /// Replaces a whole record, inserting it if absent.
    ///
    /// Used to restore prior state during rollback.
    pub fn put(&mut self, record: AddonRecord) -> Result<(), AddonError> {
        let folder = record.folder.clone();
        self.commit(|records| {
            records.insert(folder, record);
        })
    }

    /// Removes a record and returns it.
    ///
    /// The caller is responsible for filesystem cleanup.
    pub fn remove(&mut self, folder: &str) -> Result<AddonRecord, AddonError> {
        let existing = self
            .records
            .get(folder)
            .cloned()
            .ok_or_else(|| AddonError::NotFound(format!("addon '{}'", folder)))?;

        info!("[REGISTRY] Removing record '{}'", folder);
        self.commit(|records| {
            records.remove(folder);
        })?;
        Ok(existing)
    }

    /// Returns all records ordered by folder.
    #[must_use]
    pub fn get_all(&self) -> Vec<&AddonRecord> {
        self.records.values().collect()
    }

    /// Returns records whose required or optional dependencies name `folder`.
    #[must_use]
    pub fn get_dependents(&self, folder: &str) -> Vec<&AddonRecord> {
        self.records
            .values()
            .filter(|r| {
                r.required_deps.iter().any(|d| d == folder)
                    || r.optional_deps.iter().any(|d| d == folder)
            })
            .collect()
    }

    /// Returns records whose required dependencies name `folder`.
    #[must_use]
    pub fn get_required_dependents(&self, folder: &str) -> Vec<&AddonRecord> {
        self.records
            .values()
            .filter(|r| r.required_deps.iter().any(|d| d == folder))
            .collect()
    }

    /// Returns the record that owns `folder`.
    ///
    /// A record's own folder never matches.
    #[must_use]
    pub fn get_owner_of(&self, folder: &str) -> Option<&AddonRecord> {
        self.records
            .values()
            .find(|r| r.folder != folder && r.owned_folders.iter().any(|f| f == folder))
    }

    /// Rejects owned folders that are registered or claimed elsewhere.
    fn check_owned_folders(&self, owner: &str, owned: &[String]) -> Result<(), AddonError> {
        for folder in owned {
            if folder == owner {
                return Err(AddonError::Validation(format!(
                    "'{}' cannot own itself",
                    owner
                )));
            }
            if self.records.contains_key(folder) {
                return Err(AddonError::DuplicateFolder(folder.clone()));
            }
            if let Some(other) = self
                .records
                .values()
                .find(|r| r.folder != owner && r.owned_folders.contains(folder))
            {
                return Err(AddonError::FolderOwned {
                    folder: folder.clone(),
                    owner: other.folder.clone(),
                });
            }
        }
        Ok(())
    }

    /// Applies a mutation to a copy, persists it, then swaps it in.
    fn commit<F>(&mut self, mutate: F) -> Result<(), AddonError>
    where
        F: FnOnce(&mut BTreeMap<String, AddonRecord>),
    {
        match self.store {
            Some(ref store) => {
                let mut next = self.records.clone();
                mutate(&mut next);
                store.save(&next)?;
                self.records = next;
            }
            None => mutate(&mut self.records),
        }
        Ok(())
    }
}
