//! Transaction log and generic rollback.
//!
//! Commands record every live-directory and registry mutation as it happens.
//! Undo replays the log in reverse, best-effort: a failed step is logged and
//! the remaining steps still run.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::fsops::{MoveError, copy_dir_recursive, move_dir};
use crate::addons::registry::AddonRegistry;
use crate::addons::types::{AddonError, AddonRecord};

/// One reversible mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxAction {
    /// A live folder was created (logged before the copy starts).
    CreatedFolder(PathBuf),
    /// A live folder was moved aside.
    MovedFolder { original: PathBuf, backup: PathBuf },
    /// A registry row was added.
    AddedRecord(String),
    /// A registry row was changed; holds the previous state.
    UpdatedRecord(Box<AddonRecord>),
    /// A registry row was deleted; holds the deleted state.
    RemovedRecord(Box<AddonRecord>),
}

impl TxAction {
    /// Folder path or registry key the action touched.
    #[must_use]
    pub fn target(&self) -> String {
        match self {
            Self::CreatedFolder(path) => path.display().to_string(),
            Self::MovedFolder { original, .. } => original.display().to_string(),
            Self::AddedRecord(folder) => folder.clone(),
            Self::UpdatedRecord(record) | Self::RemovedRecord(record) => record.folder.clone(),
        }
    }
}

/// Ordered log of mutations made by one command.
#[derive(Debug, Default)]
pub struct Transaction {
    entries: Vec<TxAction>,
}

impl Transaction {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an action.
    pub fn record(&mut self, action: TxAction) {
        debug!("[TX] {} {}", action_name(&action), action.target());
        self.entries.push(action);
    }

    /// Moves a live folder to `backup` and logs the move.
    ///
    /// A move whose copy completed is logged even when the live folder could
    /// only be partly deleted, so undo restores it from the backup.
    pub fn move_aside(&mut self, live: &Path, backup: &Path) -> Result<(), AddonError> {
        let result = move_dir(live, backup);
        self.log_move(result, live, backup)
    }

    fn log_move(
        &mut self,
        result: Result<(), MoveError>,
        live: &Path,
        backup: &Path,
    ) -> Result<(), AddonError> {
        let copied = result.as_ref().map_or_else(MoveError::copied, |_| true);
        if copied {
            self.record(TxAction::MovedFolder {
                original: live.to_path_buf(),
                backup: backup.to_path_buf(),
            });
        }
        result.map_err(|e| {
            AddonError::Filesystem(format!("Failed to move {:?} aside: {}", live, e))
        })
    }

    /// Logged actions in execution order.
    #[must_use]
    pub fn entries(&self) -> &[TxAction] {
        &self.entries
    }

    /// Returns the number of logged actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the log and returns its entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<TxAction> {
        self.entries
    }

    /// Replays the log in reverse, undoing each action.
    ///
    /// Returns the number of steps that failed. Failures are logged and
    /// never stop the remaining steps.
    pub fn rollback(&mut self, registry: &mut AddonRegistry) -> usize {
        if self.entries.is_empty() {
            return 0;
        }

        info!("[ROLLBACK] Undoing {} actions", self.entries.len());
        let mut failures = 0;

        while let Some(action) = self.entries.pop() {
            let target = action.target();
            if let Err(e) = undo_action(action, registry) {
                warn!("[ROLLBACK] Failed to undo step for {}: {}", target, e);
                failures += 1;
            }
        }

        if failures > 0 {
            warn!("[ROLLBACK] Finished with {} failed steps", failures);
        } else {
            info!("[ROLLBACK] Complete");
        }
        failures
    }
}

fn undo_action(action: TxAction, registry: &mut AddonRegistry) -> Result<(), AddonError> {
    match action {
        TxAction::CreatedFolder(path) => {
            if path.exists() {
                debug!("[ROLLBACK] Removing {:?}", path);
                fs::remove_dir_all(&path)?;
            }
            Ok(())
        }
        TxAction::MovedFolder { original, backup } => {
            debug!("[ROLLBACK] Restoring {:?}", original);
            if original.exists() {
                if let Err(e) = fs::remove_dir_all(&original) {
                    // Overwrite what is left with the full backup
                    warn!("[ROLLBACK] Could not clear {:?} ({}), copying back", original, e);
                    copy_dir_recursive(&backup, &original)?;
                    return Ok(());
                }
            }
            move_dir(&backup, &original)
                .map_err(|e| AddonError::Filesystem(format!("Failed to restore: {}", e)))
        }
        TxAction::AddedRecord(folder) => match registry.remove(&folder) {
            Ok(_) | Err(AddonError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        },
        TxAction::UpdatedRecord(previous) | TxAction::RemovedRecord(previous) => {
            registry.put(*previous)
        }
    }
}

fn action_name(action: &TxAction) -> &'static str {
    match action {
        TxAction::CreatedFolder(_) => "created",
        TxAction::MovedFolder { .. } => "moved",
        TxAction::AddedRecord(_) => "added",
        TxAction::UpdatedRecord(_) => "updated",
        TxAction::RemovedRecord(_) => "removed",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::addons::types::AddonPatch;
    use tempfile::TempDir;

    #[test]
    fn test_rollback_filesystem() {
        let tmp = TempDir::new().unwrap();
        let live = tmp.path().join("Foo");
        let backup = tmp.path().join("backup").join("Foo");

        fs::create_dir_all(&live).unwrap();
        fs::write(live.join("old.lua"), "old").unwrap();

        let mut tx = Transaction::new();
        tx.move_aside(&live, &backup).unwrap();
        assert!(matches!(tx.entries(), [TxAction::MovedFolder { .. }]));
        tx.record(TxAction::CreatedFolder(live.clone()));
        fs::create_dir_all(&live).unwrap();
        fs::write(live.join("new.lua"), "new").unwrap();

        let mut registry = AddonRegistry::in_memory();
        assert_eq!(tx.rollback(&mut registry), 0);

        assert!(live.join("old.lua").is_file());
        assert!(!live.join("new.lua").exists());
        assert!(!backup.exists());
        assert!(tx.is_empty());
    }

    #[test]
    fn test_partly_deleted_folder_is_restored_from_backup() {
        let tmp = TempDir::new().unwrap();
        let live = tmp.path().join("Foo");
        let backup = tmp.path().join("backup").join("Foo");

        // The copy finished but deleting the live folder stopped half way
        fs::create_dir_all(&backup).unwrap();
        fs::write(backup.join("Foo.toc"), "## Title: Foo").unwrap();
        fs::write(backup.join("core.lua"), "old").unwrap();
        fs::create_dir_all(&live).unwrap();
        fs::write(live.join("core.lua"), "old").unwrap();

        let mut tx = Transaction::new();
        let left = MoveError::SourceLeft(std::io::Error::other("file in use"));
        let err = tx.log_move(Err(left), &live, &backup).unwrap_err();
        assert!(matches!(err, AddonError::Filesystem(_)));
        assert_eq!(tx.len(), 1);

        let mut registry = AddonRegistry::in_memory();
        assert_eq!(tx.rollback(&mut registry), 0);
        assert!(live.join("Foo.toc").is_file());
        assert!(live.join("core.lua").is_file());
    }

    #[test]
    fn test_move_that_never_started_is_not_logged() {
        let tmp = TempDir::new().unwrap();
        let mut tx = Transaction::new();
        let result = tx.move_aside(&tmp.path().join("Missing"), &tmp.path().join("b").join("Missing"));

        assert!(result.is_err());
        assert!(tx.is_empty());
    }

    #[test]
    fn test_rollback_registry() {
        let mut registry = AddonRegistry::in_memory();
        registry.add(AddonRecord::new("Keep")).unwrap();
        let mut tx = Transaction::new();

        registry.add(AddonRecord::new("New")).unwrap();
        tx.record(TxAction::AddedRecord("New".to_string()));

        let previous = registry.get_by_folder("Keep").cloned().unwrap();
        registry
            .update(
                "Keep",
                AddonPatch {
                    version: Some(Some("2.0".to_string())),
                    ..AddonPatch::default()
                },
            )
            .unwrap();
        tx.record(TxAction::UpdatedRecord(Box::new(previous)));

        tx.rollback(&mut registry);

        assert!(!registry.contains("New"));
        assert_eq!(registry.get_by_folder("Keep").unwrap().version, None);
    }

    #[test]
    fn test_rollback_continues_past_failures() {
        let tmp = TempDir::new().unwrap();
        let mut registry = AddonRegistry::in_memory();
        registry.add(AddonRecord::new("Gone")).unwrap();

        let mut tx = Transaction::new();
        tx.record(TxAction::AddedRecord("Gone".to_string()));
        // Backup never existed, so restoring it fails
        tx.record(TxAction::MovedFolder {
            original: tmp.path().join("Missing"),
            backup: tmp.path().join("nowhere").join("Missing"),
        });

        assert_eq!(tx.rollback(&mut registry), 1);
        assert!(!registry.contains("Gone"));
    }
}
