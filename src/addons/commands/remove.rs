//! Remove command.

use std::path::Path;

use tracing::{info, warn};

use super::transaction::{Transaction, TxAction};
use super::update::top_level_record;
use super::{Command, CommandEnv};
use crate::addons::events::CommandContext;
use crate::addons::types::AddonError;

/// Removes a record and every folder it owns.
///
/// Folders are moved into scratch first and discarded with it, so a failure
/// part-way puts everything back.
pub struct RemoveAddon {
    folder: String,
}

impl RemoveAddon {
    /// Creates the command.
    #[must_use]
    pub fn new(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
        }
    }
}

impl Command for RemoveAddon {
    fn name(&self) -> &'static str {
        "remove"
    }

    fn target(&self) -> String {
        self.folder.clone()
    }

    fn execute(
        &self,
        env: &mut CommandEnv<'_>,
        _ctx: &mut CommandContext,
        tx: &mut Transaction,
        scratch: &Path,
    ) -> Result<String, AddonError> {
        let record = top_level_record(env.registry, &self.folder)?;

        let dependents: Vec<String> = env
            .registry
            .get_required_dependents(&record.folder)
            .iter()
            .map(|r| r.folder.clone())
            .collect();
        if !dependents.is_empty() {
            warn!(
                "[REMOVE] '{}' is required by {}",
                record.folder,
                dependents.join(", ")
            );
        }

        let trash = scratch.join("removed");
        let mut moved = 0;
        for folder in record.all_folders() {
            let live = env.addons_dir.join(&folder);
            if !live.exists() {
                continue;
            }
            tx.move_aside(&live, &trash.join(&folder))?;
            moved += 1;
        }

        let removed = env.registry.remove(&record.folder)?;
        tx.record(TxAction::RemovedRecord(Box::new(removed)));

        info!("[REMOVE] Removed '{}' ({} folders)", record.folder, moved);
        Ok(format!(
            "Removed {} ({} folders)",
            record.display_name(),
            moved
        ))
    }
}
