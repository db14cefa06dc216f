//! addonkeeper - Main entry point.
//!
//! Usage: addonkeeper [--addons-dir DIR] <COMMAND>
//!
//! Run `addonkeeper --help` for the command list.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;

use clap::{Parser, Subcommand};

use addonkeeper::addons::{
    AddonKind, AddonPatch, AddonRegistry, CheckUpdates, Command, CommandContext, CommandEnv,
    CommandEvent, HeuristicClassifier, InstallFromMarketplace, InstallFromRepository, Providers,
    Reconciler, RegistryStore, RemoveAddon, TocParser, UpdateAddon, run_command,
};
use addonkeeper::config::Config;
use addonkeeper::locator::{CancellationFlag, DirectoryLocator};
use addonkeeper::logging;
use addonkeeper::providers::{
    CurseForgeClient, GitCli, HttpArchiveFetcher, MarketplaceClient, ReleaseChannel,
    WowInterfaceClient,
};

/// Addon manager for the game client.
#[derive(Parser)]
#[command(name = "addonkeeper", version, about)]
struct Cli {
    /// Addon directory to use instead of the configured one
    #[arg(long, global = true)]
    addons_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the addon directory and save it to the config
    Locate {
        /// Search below this directory instead of probing default locations
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Scan the addon directory and refresh the registry
    Scan,
    /// List registered addons
    List,
    /// Install from a GitHub or GitLab repository
    Install {
        /// Repository URL or owner/repo
        url: String,
        /// Branch to install from
        #[arg(long)]
        branch: Option<String>,
    },
    /// Install from CurseForge by project id
    InstallCurseforge {
        id: String,
        /// Release channel: stable, beta or alpha
        #[arg(long)]
        channel: Option<String>,
    },
    /// Install from WoWInterface by addon id
    InstallWowi { id: String },
    /// Update a managed addon from its source
    Update {
        folder: String,
        /// Release channel: stable, beta or alpha
        #[arg(long)]
        channel: Option<String>,
    },
    /// Remove an addon and every folder it owns
    Remove { folder: String },
    /// Check managed addons for updates
    Check,
    /// Pin an addon's kind so scans never reclassify it
    SetKind {
        folder: String,
        /// addon or library
        kind: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.log) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }

    match run(cli, &mut config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: &mut Config) -> Result<(), String> {
    if let Commands::Locate { root } = &cli.command {
        return locate(root.as_deref(), config);
    }

    let addons_dir = cli
        .addons_dir
        .or_else(|| config.addons_dir.clone())
        .ok_or("Addon directory is not configured; run `addonkeeper locate` first")?;

    let store = RegistryStore::with_path(config.registry_path());
    let mut registry = AddonRegistry::open(store).map_err(|e| e.to_string())?;

    let parser = TocParser::new();
    let classifier = HeuristicClassifier;
    let git = GitCli::new();
    let fetcher = HttpArchiveFetcher::new();
    let curseforge = CurseForgeClient::new(config.curseforge_api_key.clone());
    let wowi = WowInterfaceClient::new();
    let marketplaces: [&dyn MarketplaceClient; 2] = [&curseforge, &wowi];
    let providers = Providers {
        vcs: &git,
        fetcher: &fetcher,
        marketplaces: &marketplaces,
    };

    let mut env = CommandEnv::new(&mut registry, &addons_dir, &parser, &classifier);

    match cli.command {
        Commands::Locate { .. } => Ok(()),
        Commands::Scan => {
            let reconciler = Reconciler::new(&parser, &classifier);
            let report = reconciler
                .reconcile(env.registry, &addons_dir, None, &mut CommandContext::silent())
                .map_err(|e| e.to_string())?;
            println!(
                "Scanned {} folders: {} added, {} updated, {} unchanged, {} without manifest",
                report.processed() + report.skipped.len() + report.claimed.len(),
                report.added.len(),
                report.updated.len(),
                report.unchanged.len(),
                report.skipped.len()
            );
            Ok(())
        }
        Commands::List => {
            list(env.registry);
            Ok(())
        }
        Commands::Install { url, branch } => {
            let mut command = InstallFromRepository::new(&git, url);
            if let Some(branch) = branch {
                command = command.with_branch(branch);
            }
            execute(&command, &mut env)
        }
        Commands::InstallCurseforge { id, channel } => {
            let channel = parse_channel(channel.as_deref(), config.default_channel)?;
            let command = InstallFromMarketplace::new(&curseforge, &fetcher, id).with_channel(channel);
            execute(&command, &mut env)
        }
        Commands::InstallWowi { id } => {
            let command = InstallFromMarketplace::new(&wowi, &fetcher, id);
            execute(&command, &mut env)
        }
        Commands::Update { folder, channel } => {
            let channel = parse_channel(channel.as_deref(), config.default_channel)?;
            let command = UpdateAddon::new(providers, folder).with_channel(channel);
            execute(&command, &mut env)
        }
        Commands::Remove { folder } => execute(&RemoveAddon::new(folder), &mut env),
        Commands::Check => {
            let command = CheckUpdates::new(providers).with_channel(config.default_channel);
            execute(&command, &mut env)
        }
        Commands::SetKind { folder, kind } => {
            let kind = AddonKind::parse(&kind)
                .ok_or_else(|| format!("Unknown kind '{}' (expected addon or library)", kind))?;
            env.registry
                .update(
                    &folder,
                    AddonPatch {
                        kind: Some(kind),
                        kind_override: Some(true),
                        ..AddonPatch::default()
                    },
                )
                .map_err(|e| e.to_string())?;
            println!("{} is now pinned as {}", folder, kind.as_str());
            Ok(())
        }
    }
}

/// Runs a command, printing its progress events.
fn execute(command: &dyn Command, env: &mut CommandEnv<'_>) -> Result<(), String> {
    let (mut ctx, events) = CommandContext::channel();
    let printer = thread::spawn(move || {
        for event in events {
            print_event(&event);
        }
    });

    let outcome = run_command(command, env, &mut ctx);
    drop(ctx);
    let _ = printer.join();

    if outcome.success {
        Ok(())
    } else {
        Err(outcome.message)
    }
}

fn print_event(event: &CommandEvent) {
    match event {
        CommandEvent::Start { command, target } => println!("{} {}", command, target),
        CommandEvent::Downloading { target } => println!("  downloading {}", target),
        CommandEvent::Extracting { target } => println!("  extracting {}", target),
        CommandEvent::Copying { folders } => println!("  copying {}", folders.join(", ")),
        CommandEvent::FolderOwnership {
            parent,
            owned_folders,
        } => println!("  {} owns {}", parent, owned_folders.join(", ")),
        CommandEvent::ScanComplete { processed } => println!("  scanned {} folders", processed),
        CommandEvent::Complete { success, message } => {
            if *success {
                println!("{}", message);
            }
        }
    }
}

fn parse_channel(value: Option<&str>, default: ReleaseChannel) -> Result<ReleaseChannel, String> {
    match value {
        None => Ok(default),
        Some(v) => ReleaseChannel::parse(v)
            .ok_or_else(|| format!("Unknown channel '{}' (expected stable, beta or alpha)", v)),
    }
}

fn list(registry: &AddonRegistry) {
    let records = registry.get_all();
    if records.is_empty() {
        println!("No addons registered; run `addonkeeper scan`");
        return;
    }

    for record in records {
        let mut line = format!(
            "{:<32} {:<12} {:<8} {:<15}",
            record.folder,
            record.version.as_deref().unwrap_or("-"),
            record.kind.as_str(),
            record.addon_type.as_str()
        );
        if record.has_update() {
            line.push_str(" update available");
        }
        if !record.owned_folders.is_empty() {
            line.push_str(&format!(" (+{} folders)", record.owned_folders.len()));
        }
        println!("{}", line);
    }
}

fn locate(root: Option<&Path>, config: &mut Config) -> Result<(), String> {
    let locator = DirectoryLocator::new();

    let found = match root {
        None => locator.get_default_path(),
        Some(root) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| format!("Failed to start runtime: {}", e))?;

            let cancel = CancellationFlag::new();
            let on_interrupt = cancel.clone();
            runtime.block_on(async {
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        on_interrupt.cancel();
                    }
                });
                locator
                    .search(root, &cancel, |progress| {
                        if progress.visited % 500 == 0 {
                            eprintln!("  searched {} directories...", progress.visited);
                        }
                    })
                    .await
            })
            .map_err(|e| e.to_string())?
        }
    };

    let Some(path) = found else {
        return Err("No addon directory found".to_string());
    };

    println!("Found {}", path.display());
    config.addons_dir = Some(path);
    config.save().map_err(|e| e.to_string())
}
