//! Transactional addon commands.
//!
//! Every mutating command stages downloads into a scratch directory, copies
//! into the live addon directory only after staging succeeded, and records
//! each mutation in a [`Transaction`]. On failure the runner replays the log
//! in reverse and then reports the original error. The scratch directory is
//! dropped on every exit path.
//!
//! # Usage
//!
//! ```ignore
//! let mut env = CommandEnv::new(&mut registry, &addons_dir, &parser, &classifier);
//! let (mut ctx, events) = CommandContext::channel();
//! let command = RemoveAddon::new("Details");
//! let outcome = run_command(&command, &mut env, &mut ctx);
//! ```

mod check;
mod deploy;
mod fsops;
mod install;
mod parent;
mod remove;
mod transaction;
mod update;

use std::path::Path;

use tracing::{info, warn};

use super::classifier::KindClassifier;
use super::events::{CommandContext, CommandEvent};
use super::manifest::ManifestParser;
use super::registry::AddonRegistry;
use super::types::{AddonError, AddonType};
use crate::providers::{ArchiveFetcher, MarketplaceClient, VersionControlClient};

pub use check::CheckUpdates;
pub use fsops::{MoveError, copy_dir_recursive, move_dir};
pub use install::{InstallFromMarketplace, InstallFromRepository};
pub use parent::determine_parent;
pub use remove::RemoveAddon;
pub use transaction::{Transaction, TxAction};
pub use update::UpdateAddon;

/// Prefix of scratch directory names.
const SCRATCH_PREFIX: &str = ".addonkeeper-";

/// State a command operates on.
pub struct CommandEnv<'a> {
    pub registry: &'a mut AddonRegistry,
    /// Live addon directory.
    pub addons_dir: &'a Path,
    pub parser: &'a dyn ManifestParser,
    pub classifier: &'a dyn KindClassifier,
}

impl<'a> CommandEnv<'a> {
    /// Bundles the command environment.
    #[must_use]
    pub fn new(
        registry: &'a mut AddonRegistry,
        addons_dir: &'a Path,
        parser: &'a dyn ManifestParser,
        classifier: &'a dyn KindClassifier,
    ) -> Self {
        Self {
            registry,
            addons_dir,
            parser,
            classifier,
        }
    }
}

/// Remote sources used by update and update checks.
#[derive(Clone, Copy)]
pub struct Providers<'a> {
    pub vcs: &'a dyn VersionControlClient,
    pub fetcher: &'a dyn ArchiveFetcher,
    pub marketplaces: &'a [&'a dyn MarketplaceClient],
}

impl<'a> Providers<'a> {
    /// Returns the marketplace client that installs records of `addon_type`.
    #[must_use]
    pub fn marketplace_for(&self, addon_type: AddonType) -> Option<&'a dyn MarketplaceClient> {
        self.marketplaces
            .iter()
            .copied()
            .find(|m| m.source_type() == addon_type)
    }
}

/// A mutating addon operation.
pub trait Command {
    /// Short command name used in events and logs.
    fn name(&self) -> &'static str;

    /// What the command acts on.
    fn target(&self) -> String;

    /// Runs the command, logging every mutation into `tx`.
    ///
    /// `scratch` is a private directory removed after the command finishes.
    fn execute(
        &self,
        env: &mut CommandEnv<'_>,
        ctx: &mut CommandContext,
        tx: &mut Transaction,
        scratch: &Path,
    ) -> Result<String, AddonError>;

    /// Reverts everything logged in `tx`.
    fn undo(&self, env: &mut CommandEnv<'_>, tx: &mut Transaction) {
        let failures = tx.rollback(env.registry);
        if failures > 0 {
            warn!(
                "[ROLLBACK] {} '{}' left {} steps unreverted",
                self.name(),
                self.target(),
                failures
            );
        }
    }
}

/// Result of a command run.
#[derive(Debug)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
    /// The triggering error of a failed run.
    pub error: Option<AddonError>,
    /// Mutations that remain applied; empty after a rollback.
    pub log: Vec<TxAction>,
}

/// Runs a command inside a scratch directory, rolling back on failure.
///
/// Always emits a final [`CommandEvent::Complete`].
pub fn run_command(
    command: &dyn Command,
    env: &mut CommandEnv<'_>,
    ctx: &mut CommandContext,
) -> CommandOutcome {
    info!("[COMMAND] {} '{}'", command.name(), command.target());

    let outcome = match create_scratch(env.addons_dir) {
        Ok(scratch) => {
            let mut tx = Transaction::new();
            let result = command.execute(env, ctx, &mut tx, scratch.path());

            let outcome = match result {
                Ok(message) => {
                    info!("[COMMAND] {} succeeded: {}", command.name(), message);
                    CommandOutcome {
                        success: true,
                        message,
                        error: None,
                        log: tx.into_entries(),
                    }
                }
                Err(err) => {
                    warn!("[COMMAND] {} failed: {}", command.name(), err);
                    command.undo(env, &mut tx);
                    CommandOutcome {
                        success: false,
                        message: err.to_string(),
                        error: Some(err),
                        log: tx.into_entries(),
                    }
                }
            };

            let scratch_path = scratch.path().to_path_buf();
            if let Err(e) = scratch.close() {
                warn!("[COMMAND] Failed to remove scratch {:?}: {}", scratch_path, e);
            }
            outcome
        }
        Err(err) => CommandOutcome {
            success: false,
            message: err.to_string(),
            error: Some(err),
            log: Vec::new(),
        },
    };

    ctx.emit(CommandEvent::Complete {
        success: outcome.success,
        message: outcome.message.clone(),
    });
    outcome
}

/// Creates the scratch directory next to the addon directory so that moves
/// stay on one filesystem, falling back to inside it.
fn create_scratch(addons_dir: &Path) -> Result<tempfile::TempDir, AddonError> {
    if !addons_dir.is_dir() {
        return Err(AddonError::Filesystem(format!(
            "Addon directory {:?} does not exist",
            addons_dir
        )));
    }

    let mut builder = tempfile::Builder::new();
    builder.prefix(SCRATCH_PREFIX);

    if let Some(parent) = addons_dir.parent().filter(|p| !p.as_os_str().is_empty()) {
        match builder.tempdir_in(parent) {
            Ok(dir) => return Ok(dir),
            Err(e) => warn!("[COMMAND] Cannot create scratch in {:?}: {}", parent, e),
        }
    }

    Ok(builder.tempdir_in(addons_dir)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::addons::classifier::HeuristicClassifier;
    use crate::addons::manifest::TocParser;
    use crate::addons::types::AddonRecord;
    use std::fs;
    use tempfile::TempDir;

    /// Creates a live folder, registers it, then fails.
    struct FailingCommand;

    impl Command for FailingCommand {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn target(&self) -> String {
            "Foo".to_string()
        }

        fn execute(
            &self,
            env: &mut CommandEnv<'_>,
            _ctx: &mut CommandContext,
            tx: &mut Transaction,
            scratch: &Path,
        ) -> Result<String, AddonError> {
            assert!(scratch.is_dir());
            let live = env.addons_dir.join("Foo");
            tx.record(TxAction::CreatedFolder(live.clone()));
            fs::create_dir_all(&live)?;
            env.registry.add(AddonRecord::new("Foo"))?;
            tx.record(TxAction::AddedRecord("Foo".to_string()));
            Err(AddonError::Network("connection reset".to_string()))
        }
    }

    #[test]
    fn test_failed_command_rolls_back() {
        let tmp = TempDir::new().unwrap();
        let addons_dir = tmp.path().join("AddOns");
        fs::create_dir_all(&addons_dir).unwrap();

        let mut registry = AddonRegistry::in_memory();
        let parser = TocParser::new();
        let classifier = HeuristicClassifier;
        let mut env = CommandEnv::new(&mut registry, &addons_dir, &parser, &classifier);
        let (mut ctx, events) = CommandContext::channel();

        let outcome = run_command(&FailingCommand, &mut env, &mut ctx);

        assert!(!outcome.success);
        assert!(matches!(outcome.error, Some(AddonError::Network(_))));
        assert!(outcome.log.is_empty());
        assert!(!addons_dir.join("Foo").exists());
        assert!(registry.is_empty());

        let scratch_left = fs::read_dir(tmp.path())
            .unwrap()
            .flatten()
            .any(|e| e.file_name().to_string_lossy().starts_with(SCRATCH_PREFIX));
        assert!(!scratch_left);

        let last = events.try_iter().last().unwrap();
        assert!(matches!(last, CommandEvent::Complete { success: false, .. }));
    }

    #[test]
    fn test_missing_addons_dir() {
        let tmp = TempDir::new().unwrap();
        let addons_dir = tmp.path().join("missing");
        let mut registry = AddonRegistry::in_memory();
        let parser = TocParser::new();
        let classifier = HeuristicClassifier;
        let mut env = CommandEnv::new(&mut registry, &addons_dir, &parser, &classifier);

        let outcome = run_command(&FailingCommand, &mut env, &mut CommandContext::silent());
        assert!(matches!(outcome.error, Some(AddonError::Filesystem(_))));
    }
}
