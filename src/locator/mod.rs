//! Game installation discovery.
//!
//! Finds the retail client's `Interface/AddOns` directory by probing
//! well-known install locations or by a bounded, cancellable breadth-first
//! search of a user-chosen root.

mod search;
mod verify;

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, info};

pub use search::SearchProgress;
pub use verify::verify;

/// Primary client-variant directory.
pub const PRIMARY_MARKER: &str = "_retail_";

/// Other client variants; a path through one never verifies.
pub const NON_PRIMARY_MARKERS: &[&str] = &[
    "_classic_",
    "_classic_era_",
    "_classic_ptr_",
    "_classic_beta_",
    "_ptr_",
    "_xptr_",
    "_beta_",
];

/// Path components of the addon directory below the variant root.
pub const ADDONS_COMPONENTS: [&str; 2] = ["Interface", "AddOns"];

/// Maximum search depth below the root.
pub const MAX_SEARCH_DEPTH: usize = 10;

/// Directories visited between scheduler yields.
pub const YIELD_INTERVAL: usize = 50;

/// Directory names never descended into (compared lowercase).
const IGNORED_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".cache",
    ".cargo",
    ".npm",
    ".rustup",
    "node_modules",
    "__pycache__",
    "target",
    "$recycle.bin",
    "system volume information",
    "windows",
    "winsxs",
    "proc",
    "sys",
    "dev",
    "snap",
];

/// Path templates probed below each Windows drive root.
#[cfg(windows)]
const WINDOWS_TEMPLATES: &[&str] = &[
    r"Program Files (x86)\World of Warcraft\_retail_\Interface\AddOns",
    r"Program Files\World of Warcraft\_retail_\Interface\AddOns",
    r"World of Warcraft\_retail_\Interface\AddOns",
    r"Games\World of Warcraft\_retail_\Interface\AddOns",
];

/// Absolute candidates on macOS.
#[cfg(target_os = "macos")]
const MACOS_PATHS: &[&str] = &[
    "/Applications/World of Warcraft/_retail_/Interface/AddOns",
    "/Applications/Games/World of Warcraft/_retail_/Interface/AddOns",
];

/// Home-relative candidates on other Unix desktops (Wine prefixes).
#[cfg(all(unix, not(target_os = "macos")))]
const WINE_PATHS: &[&str] = &[
    ".wine/drive_c/Program Files (x86)/World of Warcraft/_retail_/Interface/AddOns",
    ".wine/drive_c/Program Files/World of Warcraft/_retail_/Interface/AddOns",
    "Games/world-of-warcraft/drive_c/Program Files (x86)/World of Warcraft/_retail_/Interface/AddOns",
    "Games/battlenet/drive_c/Program Files (x86)/World of Warcraft/_retail_/Interface/AddOns",
];

/// Locator errors.
#[derive(Debug, Error)]
pub enum LocatorError {
    /// The search root could not be listed.
    #[error("Cannot read search root {path:?}: {source}")]
    UnreadableRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Cooperative cancellation check.
pub trait CancellationSignal: Send + Sync {
    /// Returns true once cancellation was requested.
    fn is_cancelled(&self) -> bool;
}

/// Shareable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Clears a previous request.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
    }
}

impl CancellationSignal for CancellationFlag {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Finds the addon directory of the retail client.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    /// Lowercase names skipped during search.
    ignored: HashSet<String>,
    max_depth: usize,
}

impl Default for DirectoryLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryLocator {
    /// Creates a locator with the built-in ignore list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ignored: IGNORED_DIRS.iter().map(|s| (*s).to_string()).collect(),
            max_depth: MAX_SEARCH_DEPTH,
        }
    }

    /// Also skips directories with this name during search.
    #[must_use]
    pub fn with_ignored(mut self, name: &str) -> Self {
        self.ignored.insert(name.to_lowercase());
        self
    }

    /// Returns true if search never descends into `name`.
    #[must_use]
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored.contains(&name.to_lowercase())
    }

    /// Probes the platform's well-known install locations.
    ///
    /// Returns `None` ("not configured") if no candidate verifies.
    #[must_use]
    pub fn get_default_path(&self) -> Option<PathBuf> {
        let found = first_verified(candidate_paths());
        match &found {
            Some(path) => info!("[LOCATOR] Found default install at {:?}", path),
            None => debug!("[LOCATOR] No default install found"),
        }
        found
    }
}

/// Returns the first candidate that verifies.
pub fn first_verified<I>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    candidates.into_iter().find(|p| {
        debug!("[LOCATOR] Probing {:?}", p);
        verify(p)
    })
}

#[cfg(windows)]
fn candidate_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    for letter in b'A'..=b'Z' {
        let drive = PathBuf::from(format!("{}:\\", letter as char));
        if !drive.exists() {
            continue;
        }
        for template in WINDOWS_TEMPLATES {
            candidates.push(drive.join(template));
        }
    }
    candidates
}

#[cfg(target_os = "macos")]
fn candidate_paths() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = MACOS_PATHS.iter().map(PathBuf::from).collect();
    if let Some(home) = dirs::home_dir() {
        candidates.push(
            home.join("Applications")
                .join("World of Warcraft")
                .join("_retail_")
                .join("Interface")
                .join("AddOns"),
        );
    }
    candidates
}

#[cfg(all(unix, not(target_os = "macos")))]
fn candidate_paths() -> Vec<PathBuf> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    WINE_PATHS.iter().map(|p| home.join(p)).collect()
}

#[cfg(not(any(windows, unix)))]
fn candidate_paths() -> Vec<PathBuf> {
    Vec::new()
}
