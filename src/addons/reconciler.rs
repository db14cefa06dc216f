//! Registry reconciliation.
//!
//! Scans addon folders on disk, reads their manifests, links child folders
//! to their parents, classifies each folder and upserts the registry.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use super::classifier::{GraphFacts, KindClassifier, ManifestFlags};
use super::events::{CommandContext, CommandEvent};
use super::manifest::{ManifestData, ManifestParser};
use super::registry::AddonRegistry;
use super::types::{AddonError, AddonPatch, AddonRecord};

/// Characters that separate a parent name from a child suffix.
const NAME_SEPARATORS: [char; 4] = ['_', '-', '.', ' '];

/// Minimum stem length for the dependency-similarity rule.
const MIN_STEM_LEN: usize = 3;

/// Directory names holding bundled libraries.
const LIBS_DIRS: [&str; 2] = ["Libs", "libs"];

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Folders that got a new record.
    pub added: Vec<String>,
    /// Prior state of records that were changed.
    pub updated: Vec<AddonRecord>,
    /// Folders whose record was already current.
    pub unchanged: Vec<String>,
    /// Folders without a manifest.
    pub skipped: Vec<String>,
    /// Folders owned by another record.
    pub claimed: Vec<String>,
}

impl ReconcileReport {
    /// Number of folders that were upserted or confirmed current.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.added.len() + self.updated.len() + self.unchanged.len()
    }
}

/// A folder with a readable manifest.
#[derive(Debug)]
struct ScannedFolder {
    folder: String,
    manifest: ManifestData,
    embedded_libs: Vec<String>,
}

/// Derives registry state from the addon directory.
pub struct Reconciler<'a> {
    parser: &'a dyn ManifestParser,
    classifier: &'a dyn KindClassifier,
}

impl<'a> Reconciler<'a> {
    /// Creates a reconciler over the given collaborators.
    #[must_use]
    pub fn new(parser: &'a dyn ManifestParser, classifier: &'a dyn KindClassifier) -> Self {
        Self { parser, classifier }
    }

    /// Reconciles the registry against `root`.
    ///
    /// With `subset`, only those folder names are scanned; otherwise every
    /// immediate subdirectory of `root`.
    pub fn reconcile(
        &self,
        registry: &mut AddonRegistry,
        root: &Path,
        subset: Option<&[String]>,
        ctx: &mut CommandContext,
    ) -> Result<ReconcileReport, AddonError> {
        let targets = match subset {
            Some(folders) => folders.to_vec(),
            None => list_folders(root)?,
        };
        info!("[RECONCILE] Scanning {} folders in {:?}", targets.len(), root);

        let mut report = ReconcileReport::default();
        let mut scanned = Vec::with_capacity(targets.len());

        for folder in targets {
            let path = root.join(&folder);
            if !path.is_dir() {
                debug!("[RECONCILE] '{}' is not a directory, skipping", folder);
                report.skipped.push(folder);
                continue;
            }
            match self.parser.parse(&path) {
                Some(manifest) => scanned.push(ScannedFolder {
                    embedded_libs: embedded_libs(&path),
                    folder,
                    manifest,
                }),
                None => {
                    debug!("[RECONCILE] No manifest in '{}', skipping", folder);
                    report.skipped.push(folder);
                }
            }
        }

        let parents = derive_parents(&scanned);

        for entry in &scanned {
            if let Some(owner) = registry.get_owner_of(&entry.folder) {
                debug!(
                    "[RECONCILE] '{}' is owned by '{}', skipping",
                    entry.folder, owner.folder
                );
                report.claimed.push(entry.folder.clone());
                continue;
            }

            let existing = registry.get_by_folder(&entry.folder).cloned();
            let patch = self.build_patch(entry, &scanned, &parents, registry, existing.as_ref());

            match existing {
                Some(previous) => {
                    let mut next = previous.clone();
                    next.apply(patch.clone());
                    if next == previous {
                        report.unchanged.push(entry.folder.clone());
                        continue;
                    }
                    registry.update(&entry.folder, patch)?;
                    report.updated.push(previous);
                }
                None => {
                    let mut record = AddonRecord::new(entry.folder.clone());
                    record.apply(patch);
                    registry.add(record)?;
                    report.added.push(entry.folder.clone());
                }
            }
        }

        let processed = report.processed();
        info!(
            "[RECONCILE] Done: {} added, {} updated, {} unchanged, {} skipped, {} claimed",
            report.added.len(),
            report.updated.len(),
            report.unchanged.len(),
            report.skipped.len(),
            report.claimed.len()
        );
        ctx.emit(CommandEvent::ScanComplete { processed });

        Ok(report)
    }

    /// Builds the metadata patch for one scanned folder.
    fn build_patch(
        &self,
        entry: &ScannedFolder,
        scanned: &[ScannedFolder],
        parents: &HashMap<String, String>,
        registry: &AddonRegistry,
        existing: Option<&AddonRecord>,
    ) -> AddonPatch {
        let manifest = &entry.manifest;

        let has_dependents = scanned.iter().any(|other| {
            other.folder != entry.folder
                && other
                    .manifest
                    .dependencies()
                    .iter()
                    .any(|d| d.eq_ignore_ascii_case(&entry.folder))
        }) || registry
            .get_dependents(&entry.folder)
            .iter()
            .any(|r| r.folder != entry.folder);

        let graph = GraphFacts {
            has_dependents,
            has_dependencies: !manifest.dependencies().is_empty(),
        };

        let kind = if existing.is_some_and(|r| r.kind_override) {
            debug!("[RECONCILE] '{}' kind is pinned, not reclassifying", entry.folder);
            None
        } else {
            let flags = ManifestFlags {
                explicit_library: manifest.explicit_library,
            };
            let result = self.classifier.classify(&entry.folder, flags, graph);
            debug!(
                "[RECONCILE] '{}' classified as {} ({:?}: {})",
                entry.folder,
                result.kind.as_str(),
                result.confidence,
                result.reason
            );
            Some(result.kind)
        };

        AddonPatch {
            name: Some(manifest.name.clone()),
            version: Some(manifest.version.clone()),
            author: Some(manifest.author.clone()),
            interface: Some(manifest.interface.clone()),
            flavor: Some(manifest.flavor),
            kind,
            parent: Some(parents.get(&entry.folder).cloned()),
            required_deps: Some(manifest.required_deps.clone()),
            optional_deps: Some(manifest.optional_deps.clone()),
            embedded_libs: Some(entry.embedded_libs.clone()),
            ..AddonPatch::default()
        }
    }
}

/// Lists immediate, non-hidden subdirectories of `root`, sorted.
pub fn list_folders(root: &Path) -> Result<Vec<String>, AddonError> {
    let entries = fs::read_dir(root).map_err(|e| {
        AddonError::Filesystem(format!("Cannot read addon directory {:?}: {}", root, e))
    })?;

    let mut folders: Vec<String> = entries
        .flatten()
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .filter(|name| !name.starts_with('.'))
        .collect();
    folders.sort();
    Ok(folders)
}

/// Names of library folders bundled under `Libs/`.
fn embedded_libs(folder_path: &Path) -> Vec<String> {
    let mut libs = Vec::new();
    for dir in LIBS_DIRS {
        let libs_path = folder_path.join(dir);
        let Ok(entries) = fs::read_dir(&libs_path) else {
            continue;
        };
        for entry in entries.flatten() {
            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                if let Some(name) = entry.file_name().to_str() {
                    if !libs.iter().any(|l: &String| l == name) {
                        libs.push(name.to_string());
                    }
                }
            }
        }
        // Case-insensitive filesystems list the same directory twice
        if !libs.is_empty() {
            break;
        }
    }
    libs.sort();
    libs
}

/// Links scanned folders to a parent within the scanned set.
///
/// Prefix rule first: `Details_DataStorage` belongs to `Details`. Then the
/// dependency-similarity rule: a declared dependency on a candidate that
/// shares the folder's stem (`DBM-StatusBarTimers` depending on
/// `DBM-Core`). A shared dependency alone never links two folders.
fn derive_parents(scanned: &[ScannedFolder]) -> HashMap<String, String> {
    let names: BTreeMap<String, &str> = scanned
        .iter()
        .map(|s| (s.folder.to_lowercase(), s.folder.as_str()))
        .collect();
    let mut parents: HashMap<String, String> = HashMap::new();

    for entry in scanned {
        let by_prefix = scanned
            .iter()
            .filter(|c| c.folder != entry.folder)
            .filter(|c| is_prefix_child(&entry.folder, &c.folder))
            .max_by_key(|c| c.folder.len())
            .map(|c| c.folder.clone());

        let parent = by_prefix.or_else(|| {
            entry
                .manifest
                .dependencies()
                .iter()
                .filter_map(|dep| names.get(&dep.to_lowercase()).copied())
                .find(|candidate| {
                    *candidate != entry.folder && shares_stem(&entry.folder, candidate)
                })
                .map(String::from)
        });

        if let Some(parent) = parent {
            // Never link two folders to each other
            if parents.get(&parent) == Some(&entry.folder) {
                warn!(
                    "[RECONCILE] Ignoring cyclic parent link {} -> {}",
                    entry.folder, parent
                );
                continue;
            }
            debug!("[RECONCILE] '{}' parent is '{}'", entry.folder, parent);
            parents.insert(entry.folder.clone(), parent);
        }
    }

    parents
}

/// True if `child` is `parent` followed by a separator and more text.
fn is_prefix_child(child: &str, parent: &str) -> bool {
    child.len() > parent.len() + 1
        && child.is_char_boundary(parent.len())
        && child[..parent.len()].eq_ignore_ascii_case(parent)
        && child[parent.len()..].starts_with(NAME_SEPARATORS)
}

/// Leading segment of a name up to the first separator.
fn stem(name: &str) -> &str {
    name.split(NAME_SEPARATORS).next().unwrap_or(name)
}

/// True if two names share a common stem or one extends the other.
fn shares_stem(a: &str, b: &str) -> bool {
    let (sa, sb) = (stem(a), stem(b));
    if sa.len() >= MIN_STEM_LEN && sa.eq_ignore_ascii_case(sb) {
        return true;
    }

    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() >= MIN_STEM_LEN
        && long.is_char_boundary(short.len())
        && long[..short.len()].eq_ignore_ascii_case(short)
}
