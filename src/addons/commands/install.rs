//! Install commands.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::deploy::{Provenance, deploy, staged_folders};
use super::transaction::Transaction;
use super::{Command, CommandEnv};
use crate::addons::events::{CommandContext, CommandEvent};
use crate::addons::manifest::ManifestParser;
use crate::addons::types::{AddonError, AddonType};
use crate::providers::{
    ArchiveFetcher, MarketplaceClient, MarketplaceRecord, ReleaseChannel, RepoRef,
    VersionControlClient, parse_repository_url,
};

/// Installs an addon from a git repository.
pub struct InstallFromRepository<'a> {
    vcs: &'a dyn VersionControlClient,
    url: String,
    branch: Option<String>,
}

impl<'a> InstallFromRepository<'a> {
    /// Creates the command.
    #[must_use]
    pub fn new(vcs: &'a dyn VersionControlClient, url: impl Into<String>) -> Self {
        Self {
            vcs,
            url: url.into(),
            branch: None,
        }
    }

    /// Installs from a specific branch instead of the default one.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

impl Command for InstallFromRepository<'_> {
    fn name(&self) -> &'static str {
        "install"
    }

    fn target(&self) -> String {
        self.url.clone()
    }

    fn execute(
        &self,
        env: &mut CommandEnv<'_>,
        ctx: &mut CommandContext,
        tx: &mut Transaction,
        scratch: &Path,
    ) -> Result<String, AddonError> {
        ctx.emit(CommandEvent::Start {
            command: self.name().to_string(),
            target: self.target(),
        });

        let repo = parse_repository_url(&self.url)?;
        let branch = self.branch.as_deref();
        let (staged, revision) = fetch_repository(self.vcs, &repo, branch, scratch, env.parser, ctx)?;

        let parent = deploy(
            env,
            ctx,
            tx,
            scratch,
            &staged,
            Some(&repo.repo),
            Provenance {
                addon_type: AddonType::Repository,
                url: Some(repo.web_url()),
                source_id: Some(format!("{}/{}", repo.owner, repo.repo)),
                git_commit: revision.clone(),
                installed_release: None,
                remote_version: revision,
            },
            None,
        )?;

        Ok(format!("Installed {} from {}", parent, repo.web_url()))
    }
}

/// Installs an addon from a marketplace.
pub struct InstallFromMarketplace<'a> {
    client: &'a dyn MarketplaceClient,
    fetcher: &'a dyn ArchiveFetcher,
    id: String,
    channel: ReleaseChannel,
}

impl<'a> InstallFromMarketplace<'a> {
    /// Creates the command for the stable channel.
    #[must_use]
    pub fn new(
        client: &'a dyn MarketplaceClient,
        fetcher: &'a dyn ArchiveFetcher,
        id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            fetcher,
            id: id.into(),
            channel: ReleaseChannel::Stable,
        }
    }

    /// Sets the release channel.
    #[must_use]
    pub fn with_channel(mut self, channel: ReleaseChannel) -> Self {
        self.channel = channel;
        self
    }
}

impl Command for InstallFromMarketplace<'_> {
    fn name(&self) -> &'static str {
        "install"
    }

    fn target(&self) -> String {
        format!("{}:{}", self.client.provider_name(), self.id)
    }

    fn execute(
        &self,
        env: &mut CommandEnv<'_>,
        ctx: &mut CommandContext,
        tx: &mut Transaction,
        scratch: &Path,
    ) -> Result<String, AddonError> {
        ctx.emit(CommandEvent::Start {
            command: self.name().to_string(),
            target: self.target(),
        });

        let package = fetch_marketplace(
            self.client,
            self.fetcher,
            &self.id,
            self.channel,
            scratch,
            env.parser,
            ctx,
        )?;

        let parent = deploy(
            env,
            ctx,
            tx,
            scratch,
            &package.staged,
            Some(&package.record.name),
            package.provenance(self.client.source_type()),
            None,
        )?;

        Ok(format!(
            "Installed {} {} from {}",
            parent,
            package.version,
            self.client.provider_name()
        ))
    }
}

/// A marketplace package staged in scratch.
pub(super) struct MarketplacePackage {
    pub record: MarketplaceRecord,
    pub staged: Vec<PathBuf>,
    /// Release key of the staged file.
    pub release: String,
    pub version: String,
}

impl MarketplacePackage {
    pub(super) fn provenance(&self, addon_type: AddonType) -> Provenance {
        Provenance {
            addon_type,
            url: self.record.url.clone(),
            source_id: Some(self.record.id.clone()),
            git_commit: None,
            installed_release: Some(self.release.clone()),
            remote_version: Some(self.release.clone()),
        }
    }
}

/// Clones a repository into scratch and finds its addon folders.
pub(super) fn fetch_repository(
    vcs: &dyn VersionControlClient,
    repo: &RepoRef,
    branch: Option<&str>,
    scratch: &Path,
    parser: &dyn ManifestParser,
    ctx: &mut CommandContext,
) -> Result<(Vec<PathBuf>, Option<String>), AddonError> {
    ctx.emit(CommandEvent::Downloading {
        target: repo.web_url(),
    });

    let clone_root = scratch.join("clone");
    fs::create_dir_all(&clone_root)?;
    let dest = clone_root.join(&repo.repo);
    vcs.clone_repo(&repo.clone_url(), branch, &dest)?;
    let revision = vcs.remote_revision(&repo.clone_url(), branch);
    debug!("[INSTALL] Remote revision of {}: {:?}", repo.repo, revision);

    ctx.emit(CommandEvent::Extracting {
        target: repo.repo.clone(),
    });

    let git_dir = dest.join(".git");
    if git_dir.exists() {
        fs::remove_dir_all(&git_dir)?;
    }

    // The live folder must carry the manifest's name, not the repository's
    let dest = match parser.declared_name(&dest) {
        Some(name) if !parser.has_manifest(&dest) => {
            let renamed = clone_root.join(&name);
            debug!("[INSTALL] Staging {} as {}", repo.repo, name);
            fs::rename(&dest, &renamed)?;
            renamed
        }
        _ => dest,
    };

    // A repository is either one addon or a set of addon folders
    let staged = if parser.has_manifest(&dest) {
        vec![dest]
    } else {
        staged_folders(&dest, parser)?
    };
    info!("[INSTALL] Staged {} folders from {}", staged.len(), repo.web_url());

    Ok((staged, revision))
}

/// Downloads and extracts a marketplace package into scratch.
pub(super) fn fetch_marketplace(
    client: &dyn MarketplaceClient,
    fetcher: &dyn ArchiveFetcher,
    id: &str,
    channel: ReleaseChannel,
    scratch: &Path,
    parser: &dyn ManifestParser,
    ctx: &mut CommandContext,
) -> Result<MarketplacePackage, AddonError> {
    let record = client.get_details(id)?;
    let file = record.latest_file(channel).cloned();
    let url = client.resolve_download_url(&record, channel).ok_or_else(|| {
        AddonError::NotFound(format!(
            "No downloadable {:?} file for {} on {}",
            channel,
            record.name,
            client.provider_name()
        ))
    })?;
    let (release, version) = file
        .map(|f| (f.release_key(client.source_type()), f.version))
        .unwrap_or_default();

    ctx.emit(CommandEvent::Downloading {
        target: record.name.clone(),
    });
    let archive = scratch.join("package.zip");
    fetcher.download(&url, &archive)?;

    ctx.emit(CommandEvent::Extracting {
        target: record.name.clone(),
    });
    let extract_dir = scratch.join("extract");
    fetcher.extract(&archive, &extract_dir)?;

    let staged = staged_folders(&extract_dir, parser)?;
    info!(
        "[INSTALL] Staged {} folders of {} {}",
        staged.len(),
        record.name,
        version
    );

    Ok(MarketplacePackage {
        record,
        staged,
        release,
        version,
    })
}
