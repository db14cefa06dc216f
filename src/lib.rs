//! addonkeeper
//!
//! Addon manager for the game client: keeps a registry of installed addons
//! in step with the addon directory and installs, updates and removes them
//! with automatic rollback.
//!
//! # Architecture
//!
//! - **Addons Module**: Registry, manifest parsing, reconciliation, commands
//! - **Providers Module**: git, archive and marketplace sources
//! - **Locator Module**: Finds the addon directory on disk
//! - **Config Module**: `~/.addonkeeper/config.toml`
//!
//! # Usage
//!
//! ```no_run
//! use addonkeeper::addons::{
//!     AddonRegistry, CommandContext, HeuristicClassifier, Reconciler, TocParser,
//! };
//!
//! let mut registry = AddonRegistry::in_memory();
//! let parser = TocParser::new();
//! let reconciler = Reconciler::new(&parser, &HeuristicClassifier);
//! let report = reconciler
//!     .reconcile(
//!         &mut registry,
//!         std::path::Path::new("AddOns"),
//!         None,
//!         &mut CommandContext::silent(),
//!     )
//!     .expect("scan failed");
//! println!("{} folders", report.processed());
//! ```

// Clippy configuration - allow common patterns
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::similar_names)]

pub mod addons;
pub mod config;
pub mod locator;
pub mod logging;
pub mod providers;

// Re-export main types
pub use addons::{AddonError, AddonRecord, AddonRegistry};
pub use config::Config;
pub use locator::DirectoryLocator;
