//! Addon registry, reconciliation and commands.
//!
//! # Architecture
//!
//! - **types**: Core data structures (`AddonRecord`, `AddonPatch`, `AddonError`)
//! - **storage**: TOML persistence of the registry file
//! - **registry**: Keyed record store with ownership and dependency queries
//! - **manifest**: Manifest (TOC) parsing behind the `ManifestParser` trait
//! - **classifier**: Addon/library heuristics behind the `KindClassifier` trait
//! - **reconciler**: Derives registry state from folders on disk
//! - **events**: Progress events delivered over a channel
//! - **commands**: Install, update, remove and check with rollback
//!
//! # Usage
//!
//! ```ignore
//! use addonkeeper::addons::{AddonRegistry, CommandContext, Reconciler, RegistryStore};
//!
//! let mut registry = AddonRegistry::open(RegistryStore::with_path(path))?;
//! let reconciler = Reconciler::new(&TocParser::new(), &HeuristicClassifier);
//! reconciler.reconcile(&mut registry, &addons_dir, None, &mut CommandContext::silent())?;
//! ```

mod classifier;
pub mod commands;
mod events;
mod manifest;
mod reconciler;
mod registry;
mod storage;
mod types;

pub use classifier::{
    Classification, Confidence, GraphFacts, HeuristicClassifier, KindClassifier, ManifestFlags,
    is_library_name,
};
pub use commands::{
    CheckUpdates, Command, CommandEnv, CommandOutcome, InstallFromMarketplace,
    InstallFromRepository, Providers, RemoveAddon, Transaction, TxAction, UpdateAddon,
    determine_parent, run_command,
};
pub use events::{CommandContext, CommandEvent};
pub use manifest::{ManifestData, ManifestParser, TocParser};
pub use reconciler::{ReconcileReport, Reconciler, list_folders};
pub use registry::AddonRegistry;
pub use storage::{RegistryStore, StorageError};
pub use types::{AddonError, AddonKind, AddonPatch, AddonRecord, AddonType, Flavor};
