//! Update command.

use std::path::Path;

use tracing::info;

use super::deploy::{Provenance, deploy};
use super::install::{fetch_marketplace, fetch_repository};
use super::transaction::Transaction;
use super::{Command, CommandEnv, Providers};
use crate::addons::events::{CommandContext, CommandEvent};
use crate::addons::registry::AddonRegistry;
use crate::addons::types::{AddonError, AddonRecord, AddonType};
use crate::providers::{ReleaseChannel, parse_repository_url};

/// Reinstalls a managed addon from its source.
///
/// Live folders are moved into scratch before the new files are copied, so
/// a failed update restores the previous installation.
pub struct UpdateAddon<'a> {
    providers: Providers<'a>,
    folder: String,
    channel: ReleaseChannel,
}

impl<'a> UpdateAddon<'a> {
    /// Creates the command for the stable channel.
    #[must_use]
    pub fn new(providers: Providers<'a>, folder: impl Into<String>) -> Self {
        Self {
            providers,
            folder: folder.into(),
            channel: ReleaseChannel::Stable,
        }
    }

    /// Sets the release channel for marketplace sources.
    #[must_use]
    pub fn with_channel(mut self, channel: ReleaseChannel) -> Self {
        self.channel = channel;
        self
    }
}

impl Command for UpdateAddon<'_> {
    fn name(&self) -> &'static str {
        "update"
    }

    fn target(&self) -> String {
        self.folder.clone()
    }

    fn execute(
        &self,
        env: &mut CommandEnv<'_>,
        ctx: &mut CommandContext,
        tx: &mut Transaction,
        scratch: &Path,
    ) -> Result<String, AddonError> {
        let record = top_level_record(env.registry, &self.folder)?;
        if !record.addon_type.is_managed() {
            return Err(AddonError::Validation(format!(
                "'{}' is not managed and has no source to update from",
                self.folder
            )));
        }

        ctx.emit(CommandEvent::Start {
            command: self.name().to_string(),
            target: self.target(),
        });

        let (staged, display_name, provenance) = match record.addon_type {
            AddonType::Repository => {
                let url = record.url.as_deref().ok_or_else(|| {
                    AddonError::Validation(format!("'{}' has no repository URL", self.folder))
                })?;
                let repo = parse_repository_url(url)?;
                let (staged, revision) =
                    fetch_repository(self.providers.vcs, &repo, None, scratch, env.parser, ctx)?;
                let provenance = Provenance {
                    addon_type: AddonType::Repository,
                    url: Some(repo.web_url()),
                    source_id: Some(format!("{}/{}", repo.owner, repo.repo)),
                    git_commit: revision.clone(),
                    installed_release: None,
                    remote_version: revision,
                };
                (staged, repo.repo, provenance)
            }
            addon_type => {
                let client = self.providers.marketplace_for(addon_type).ok_or_else(|| {
                    AddonError::Validation(format!(
                        "No provider configured for {} addons",
                        addon_type.as_str()
                    ))
                })?;
                let id = record.source_id.as_deref().ok_or_else(|| {
                    AddonError::Validation(format!("'{}' has no source id", self.folder))
                })?;
                let package = fetch_marketplace(
                    client,
                    self.providers.fetcher,
                    id,
                    self.channel,
                    scratch,
                    env.parser,
                    ctx,
                )?;
                let provenance = package.provenance(addon_type);
                (package.staged, package.record.name, provenance)
            }
        };

        let parent = deploy(
            env,
            ctx,
            tx,
            scratch,
            &staged,
            Some(&display_name),
            provenance,
            Some(&record),
        )?;

        info!("[UPDATE] '{}' updated", parent);
        Ok(format!("Updated {}", parent))
    }
}

/// Looks up a record that can be acted on directly.
///
/// Owned folders are rejected in favour of their owner.
pub(super) fn top_level_record(
    registry: &AddonRegistry,
    folder: &str,
) -> Result<AddonRecord, AddonError> {
    if folder.trim().is_empty() || folder.contains(['/', '\\']) {
        return Err(AddonError::Validation(format!(
            "'{}' is not an addon folder name",
            folder
        )));
    }
    if let Some(record) = registry.get_by_folder(folder) {
        return Ok(record.clone());
    }
    match registry.get_owner_of(folder) {
        Some(owner) => Err(AddonError::Validation(format!(
            "'{}' is part of '{}'",
            folder, owner.folder
        ))),
        None => Err(AddonError::NotFound(format!("addon '{}'", folder))),
    }
}
