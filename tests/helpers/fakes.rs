//! In-process provider fakes and an addon-directory fixture.
//!
//! The fakes write fixture files where the real providers would clone,
//! download or extract, so commands run end to end without a network.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;

use addonkeeper::addons::{
    AddonError, AddonRegistry, AddonType, Command, CommandContext, CommandEnv, CommandEvent,
    CommandOutcome, HeuristicClassifier, TocParser, run_command,
};
use addonkeeper::providers::{
    ArchiveFetcher, MarketplaceClient, MarketplaceFile, MarketplaceRecord, ReleaseChannel,
    VersionControlClient,
};

/// Returns a minimal manifest body.
pub fn toc(title: &str) -> String {
    format!("## Interface: 110002\n## Title: {}\n## Version: 1.0.0\n", title)
}

/// Creates `root/folder/folder.toc` with `body`.
pub fn make_addon(root: &Path, folder: &str, body: &str) -> PathBuf {
    let dir = root.join(folder);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{}.toc", folder)), body).unwrap();
    dir
}

/// Writes each `(relative path, content)` pair below `root`.
fn write_files(root: &Path, files: &[(String, String)]) {
    fs::create_dir_all(root).unwrap();
    for (rel, content) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
}

// ============================================================================
// Version control
// ============================================================================

/// Clones by writing a fixed file layout.
#[derive(Default)]
pub struct FakeVcs {
    files: Mutex<Vec<(String, String)>>,
    revision: Mutex<Option<String>>,
    fail_clone: Mutex<bool>,
    pub clones: AtomicUsize,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, rel: &str, content: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .push((rel.to_string(), content.to_string()));
        self
    }

    pub fn with_revision(self, revision: &str) -> Self {
        self.set_revision(revision);
        self
    }

    pub fn set_revision(&self, revision: &str) {
        *self.revision.lock().unwrap() = Some(revision.to_string());
    }

    pub fn set_fail_clone(&self, fail: bool) {
        *self.fail_clone.lock().unwrap() = fail;
    }
}

impl VersionControlClient for FakeVcs {
    fn clone_repo(&self, url: &str, _branch: Option<&str>, dest: &Path) -> Result<(), AddonError> {
        if *self.fail_clone.lock().unwrap() {
            return Err(AddonError::Network(format!("clone of {} refused", url)));
        }
        self.clones.fetch_add(1, Ordering::SeqCst);
        write_files(dest, &self.files.lock().unwrap());
        fs::create_dir_all(dest.join(".git")).unwrap();
        Ok(())
    }

    fn remote_revision(&self, _url: &str, _branch: Option<&str>) -> Option<String> {
        self.revision.lock().unwrap().clone()
    }
}

// ============================================================================
// Archives
// ============================================================================

/// Extracts by writing a fixed file layout.
#[derive(Default)]
pub struct FakeFetcher {
    files: Mutex<Vec<(String, String)>>,
    /// `(link, target)` pairs created as symbolic links on extract.
    symlinks: Vec<(String, String)>,
    pub downloads: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, rel: &str, content: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .push((rel.to_string(), content.to_string()));
        self
    }

    pub fn with_symlink(mut self, link: &str, target: &str) -> Self {
        self.symlinks.push((link.to_string(), target.to_string()));
        self
    }

    /// Replaces the extracted layout.
    pub fn set_files(&self, files: &[(&str, &str)]) {
        *self.files.lock().unwrap() = files
            .iter()
            .map(|(rel, content)| ((*rel).to_string(), (*content).to_string()))
            .collect();
    }
}

impl ArchiveFetcher for FakeFetcher {
    fn download(&self, url: &str, dest: &Path) -> Result<(), AddonError> {
        self.downloads.lock().unwrap().push(url.to_string());
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, b"PK\x05\x06")?;
        Ok(())
    }

    fn extract(&self, _archive: &Path, dest_dir: &Path) -> Result<(), AddonError> {
        write_files(dest_dir, &self.files.lock().unwrap());
        #[cfg(unix)]
        for (link, target) in &self.symlinks {
            let path = dest_dir.join(link);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            std::os::unix::fs::symlink(target, path)?;
        }
        Ok(())
    }
}

// ============================================================================
// Marketplace
// ============================================================================

/// Serves a single project.
pub struct FakeMarketplace {
    name: &'static str,
    source: AddonType,
    record: Mutex<MarketplaceRecord>,
    pub lookups: AtomicUsize,
}

impl FakeMarketplace {
    pub fn new(name: &'static str, source: AddonType, id: &str, project: &str) -> Self {
        Self {
            name,
            source,
            record: Mutex::new(MarketplaceRecord {
                id: id.to_string(),
                name: project.to_string(),
                author: Some("Tester".to_string()),
                summary: None,
                url: Some(format!("https://example.test/projects/{}", id)),
                files: Vec::new(),
            }),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn with_release(self, file_id: u64, version: &str, channel: ReleaseChannel) -> Self {
        self.add_release(file_id, version, channel);
        self
    }

    pub fn add_release(&self, file_id: u64, version: &str, channel: ReleaseChannel) {
        self.record.lock().unwrap().files.push(MarketplaceFile {
            id: file_id,
            version: version.to_string(),
            channel,
            download_url: Some(format!("https://example.test/files/{}.zip", file_id)),
            flavors: Vec::new(),
        });
    }

    /// Replaces the only file with a new upload under the same file id.
    pub fn reupload(&self, version: &str) {
        let mut record = self.record.lock().unwrap();
        for file in &mut record.files {
            file.version = version.to_string();
        }
    }
}

impl MarketplaceClient for FakeMarketplace {
    fn provider_name(&self) -> &'static str {
        self.name
    }

    fn source_type(&self) -> AddonType {
        self.source
    }

    fn get_details(&self, id: &str) -> Result<MarketplaceRecord, AddonError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let record = self.record.lock().unwrap();
        if record.id == id {
            Ok(record.clone())
        } else {
            Err(AddonError::NotFound(format!("project {}", id)))
        }
    }
}

// ============================================================================
// Fixture
// ============================================================================

/// A temporary `Interface/AddOns` directory with an in-memory registry.
pub struct Fixture {
    pub tmp: TempDir,
    pub addons_dir: PathBuf,
    pub registry: AddonRegistry,
    pub parser: TocParser,
    pub classifier: HeuristicClassifier,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let addons_dir = tmp.path().join("Interface").join("AddOns");
        fs::create_dir_all(&addons_dir).unwrap();
        Self {
            tmp,
            addons_dir,
            registry: AddonRegistry::in_memory(),
            parser: TocParser::new(),
            classifier: HeuristicClassifier,
        }
    }

    pub fn env(&mut self) -> CommandEnv<'_> {
        CommandEnv::new(
            &mut self.registry,
            &self.addons_dir,
            &self.parser,
            &self.classifier,
        )
    }

    /// Runs a command and collects every event it emitted.
    pub fn run(&mut self, command: &dyn Command) -> (CommandOutcome, Vec<CommandEvent>) {
        let (mut ctx, events) = CommandContext::channel();
        let outcome = {
            let mut env = self.env();
            run_command(command, &mut env, &mut ctx)
        };
        drop(ctx);
        (outcome, events.iter().collect())
    }

    /// Immediate subdirectories of the addon directory.
    pub fn live_folders(&self) -> Vec<String> {
        addonkeeper::addons::list_folders(&self.addons_dir).unwrap()
    }

    /// Scratch directories left behind next to or inside the addon directory.
    pub fn scratch_leftovers(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for dir in [self.tmp.path().join("Interface"), self.addons_dir.clone()] {
            for entry in fs::read_dir(dir).unwrap().flatten() {
                if entry.file_name().to_string_lossy().starts_with(".addonkeeper-") {
                    found.push(entry.path());
                }
            }
        }
        found
    }
}
