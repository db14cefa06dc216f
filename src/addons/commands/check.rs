//! Update availability check.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::transaction::{Transaction, TxAction};
use super::{Command, CommandEnv, Providers};
use crate::addons::events::{CommandContext, CommandEvent};
use crate::addons::types::{AddonError, AddonPatch, AddonRecord, AddonType};
use crate::providers::{ReleaseChannel, parse_repository_url};

/// Refreshes `remote_version` and `last_checked` of every managed record.
///
/// Touches only the registry. Sources that cannot be reached are logged and
/// left unchanged.
pub struct CheckUpdates<'a> {
    providers: Providers<'a>,
    channel: ReleaseChannel,
}

impl<'a> CheckUpdates<'a> {
    /// Creates the command for the stable channel.
    #[must_use]
    pub fn new(providers: Providers<'a>) -> Self {
        Self {
            providers,
            channel: ReleaseChannel::Stable,
        }
    }

    /// Sets the release channel for marketplace sources.
    #[must_use]
    pub fn with_channel(mut self, channel: ReleaseChannel) -> Self {
        self.channel = channel;
        self
    }

    fn remote_version(&self, record: &AddonRecord) -> Option<String> {
        match record.addon_type {
            AddonType::Unmanaged => None,
            AddonType::Repository => {
                let repo = parse_repository_url(record.url.as_deref()?)
                    .map_err(|e| warn!("[CHECK] '{}': {}", record.folder, e))
                    .ok()?;
                self.providers.vcs.remote_revision(&repo.clone_url(), None)
            }
            addon_type => {
                let client = self.providers.marketplace_for(addon_type)?;
                let id = record.source_id.as_deref()?;
                let details = client
                    .get_details(id)
                    .map_err(|e| warn!("[CHECK] '{}': {}", record.folder, e))
                    .ok()?;
                details
                    .latest_file(self.channel)
                    .map(|f| f.release_key(addon_type))
            }
        }
    }
}

impl Command for CheckUpdates<'_> {
    fn name(&self) -> &'static str {
        "check"
    }

    fn target(&self) -> String {
        "managed addons".to_string()
    }

    fn execute(
        &self,
        env: &mut CommandEnv<'_>,
        ctx: &mut CommandContext,
        tx: &mut Transaction,
        _scratch: &Path,
    ) -> Result<String, AddonError> {
        ctx.emit(CommandEvent::Start {
            command: self.name().to_string(),
            target: self.target(),
        });

        let managed: Vec<AddonRecord> = env
            .registry
            .get_all()
            .into_iter()
            .filter(|r| r.addon_type.is_managed())
            .cloned()
            .collect();

        let mut available = Vec::new();
        for record in managed {
            let Some(remote) = self.remote_version(&record) else {
                debug!("[CHECK] No remote version for '{}'", record.folder);
                continue;
            };

            let updated = env.registry.update(
                &record.folder,
                AddonPatch {
                    remote_version: Some(Some(remote)),
                    last_checked: Some(Some(Utc::now())),
                    ..AddonPatch::default()
                },
            )?;
            if updated.has_update() {
                available.push(updated.folder.clone());
            }
            tx.record(TxAction::UpdatedRecord(Box::new(record)));
        }

        info!("[CHECK] {} updates available", available.len());
        if available.is_empty() {
            Ok("All addons are up to date".to_string())
        } else {
            Ok(format!(
                "{} updates available: {}",
                available.len(),
                available.join(", ")
            ))
        }
    }
}
