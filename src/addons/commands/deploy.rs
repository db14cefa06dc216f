//! Staged-folder discovery and the copy-and-register step shared by install
//! and update.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use super::fsops::copy_dir_recursive;
use super::parent::determine_parent;
use super::transaction::{Transaction, TxAction};
use super::CommandEnv;
use crate::addons::events::{CommandContext, CommandEvent};
use crate::addons::manifest::ManifestParser;
use crate::addons::reconciler::{Reconciler, list_folders};
use crate::addons::types::{AddonError, AddonPatch, AddonRecord, AddonType};

/// Scratch subdirectory holding live folders moved aside.
const BACKUP_DIR: &str = "backup";

/// Where installed files came from.
#[derive(Debug, Clone, Default)]
pub(super) struct Provenance {
    pub addon_type: AddonType,
    pub url: Option<String>,
    pub source_id: Option<String>,
    pub git_commit: Option<String>,
    pub installed_release: Option<String>,
    pub remote_version: Option<String>,
}

/// Finds addon folders in an extracted package.
///
/// Looks at the immediate subdirectories of `root`; if none has a manifest
/// and there is exactly one subdirectory, looks inside it once more
/// (archives wrapped in a single top-level directory).
pub(super) fn staged_folders(
    root: &Path,
    parser: &dyn ManifestParser,
) -> Result<Vec<PathBuf>, AddonError> {
    let mut dir = root.to_path_buf();

    for _ in 0..2 {
        let subdirs = list_folders(&dir)?;
        let found: Vec<PathBuf> = subdirs
            .iter()
            .map(|name| dir.join(name))
            .filter(|path| parser.has_manifest(path))
            .collect();

        if !found.is_empty() {
            return Ok(found);
        }
        match subdirs.as_slice() {
            [only] => dir = dir.join(only),
            _ => break,
        }
    }

    Err(AddonError::NoArtifacts(root.display().to_string()))
}

/// Copies staged folders into the live directory and registers them under
/// one parent record.
///
/// `replacing` is the record being updated, whose folders may be
/// overwritten. Returns the parent folder.
#[allow(clippy::too_many_arguments)]
pub(super) fn deploy(
    env: &mut CommandEnv<'_>,
    ctx: &mut CommandContext,
    tx: &mut Transaction,
    scratch: &Path,
    staged: &[PathBuf],
    display_name: Option<&str>,
    provenance: Provenance,
    replacing: Option<&AddonRecord>,
) -> Result<String, AddonError> {
    assert!(!staged.is_empty(), "Nothing staged to deploy");

    let mut folders = Vec::with_capacity(staged.len());
    for path in staged {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AddonError::Filesystem(format!("Invalid folder name {:?}", path)))?;
        folders.push(name.to_string());
    }

    let replaceable = replacing.map(AddonRecord::all_folders).unwrap_or_default();
    check_conflicts(env, &folders, &replaceable)?;

    ctx.emit(CommandEvent::Copying {
        folders: folders.clone(),
    });

    let backup_root = scratch.join(BACKUP_DIR);
    for (name, source) in folders.iter().zip(staged) {
        let live = env.addons_dir.join(name);
        if live.exists() {
            tx.move_aside(&live, &backup_root.join(name))?;
        }
        tx.record(TxAction::CreatedFolder(live.clone()));
        debug!("[INSTALL] Copying {:?} -> {:?}", source, live);
        copy_dir_recursive(source, &live).map_err(|e| {
            AddonError::Filesystem(format!("Failed to copy {}: {}", name, e))
        })?;
    }

    // Folders the new package no longer ships
    for stale in replaceable.iter().filter(|f| !folders.contains(f)) {
        let live = env.addons_dir.join(stale);
        if live.exists() {
            info!("[INSTALL] Removing dropped folder '{}'", stale);
            tx.move_aside(&live, &backup_root.join(stale))?;
        }
    }

    let parent = determine_parent(&folders, display_name);
    let mut owned: Vec<String> = folders.iter().filter(|f| **f != parent).cloned().collect();
    owned.sort();

    // Ownership supersedes independent tracking
    for folder in &owned {
        if env.registry.contains(folder) {
            let removed = env.registry.remove(folder)?;
            tx.record(TxAction::RemovedRecord(Box::new(removed)));
        }
    }
    if let Some(previous) = replacing.filter(|r| r.folder != parent) {
        if env.registry.contains(&previous.folder) {
            let removed = env.registry.remove(&previous.folder)?;
            tx.record(TxAction::RemovedRecord(Box::new(removed)));
        }
    }

    let reconciler = Reconciler::new(env.parser, env.classifier);
    let report = reconciler.reconcile(
        env.registry,
        env.addons_dir,
        Some(std::slice::from_ref(&parent)),
        &mut CommandContext::silent(),
    )?;
    for folder in report.added {
        tx.record(TxAction::AddedRecord(folder));
    }
    for previous in report.updated {
        tx.record(TxAction::UpdatedRecord(Box::new(previous)));
    }

    let previous = env
        .registry
        .get_by_folder(&parent)
        .cloned()
        .ok_or_else(|| AddonError::NoArtifacts(parent.clone()))?;

    let now = Utc::now();
    let install_date = replacing.and_then(|r| r.install_date).unwrap_or(now);
    env.registry.update(
        &parent,
        AddonPatch {
            addon_type: Some(provenance.addon_type),
            url: Some(provenance.url),
            source_id: Some(provenance.source_id),
            git_commit: Some(provenance.git_commit),
            installed_release: Some(provenance.installed_release),
            remote_version: Some(provenance.remote_version),
            owned_folders: Some(owned.clone()),
            install_date: Some(Some(install_date)),
            last_updated: Some(Some(now)),
            last_checked: Some(Some(now)),
            ..AddonPatch::default()
        },
    )?;
    tx.record(TxAction::UpdatedRecord(Box::new(previous)));

    if !owned.is_empty() {
        info!("[INSTALL] '{}' owns {:?}", parent, owned);
        ctx.emit(CommandEvent::FolderOwnership {
            parent: parent.clone(),
            owned_folders: owned,
        });
    }

    Ok(parent)
}

/// Rejects folders that belong to other managed records.
fn check_conflicts(
    env: &CommandEnv<'_>,
    folders: &[String],
    replaceable: &[String],
) -> Result<(), AddonError> {
    for folder in folders.iter().filter(|f| !replaceable.contains(f)) {
        if let Some(owner) = env.registry.get_owner_of(folder) {
            return Err(AddonError::FolderOwned {
                folder: folder.clone(),
                owner: owner.folder.clone(),
            });
        }
        // Scanned, unmanaged rows are taken over
        if env
            .registry
            .get_by_folder(folder)
            .is_some_and(|r| r.addon_type.is_managed())
        {
            return Err(AddonError::DuplicateFolder(folder.clone()));
        }
    }
    Ok(())
}
