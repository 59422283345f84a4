//! stagepush - publish installers when staged binaries change
//!
//! ## Commands
//!
//! - `publish`: Run one publish cycle
//! - `status`: Show what a publish would do, without doing it
//! - `history`: Show recent publish log entries
//! - `changelog`: Regenerate the remote changelog
//! - `check-update`: Compare an installed copy against the published manifest
//! - `save-credentials`: Write the local storage credential file
//! - `init`: Write a sample configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use stagepush_build::StrategyBuilder;
use stagepush_core::changelog::rebuild_changelog;
use stagepush_core::config::SAMPLE_CONFIG;
use stagepush_core::metrics::METRICS;
use stagepush_core::{
    open_store, CycleOutcome, HtmlChangelogRenderer, PeVersionProbe, PublishConfig,
    PublishCoordinator, PublishLogStore, StorageCredentials, UpdateChecker,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "stagepush")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Publish installers to blob storage when staged binaries change", long_about = None)]
struct Cli {
    /// Path to the publish configuration
    #[arg(short, long, global = true, default_value = "stagepush.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and JSON command output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare, build, upload and record one release if anything changed
    Publish,

    /// Show the publish decision without building or uploading
    Status,

    /// Show recent publish log entries, newest first
    History {
        /// Maximum number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Rebuild and upload the changelog from the publish log
    Changelog,

    /// List components with a newer published version than the installed copy
    CheckUpdate {
        /// Directory holding the installed binaries
        #[arg(long)]
        installed: PathBuf,

        /// Also download the installer to this path (file or directory)
        #[arg(long)]
        download: Option<PathBuf>,
    },

    /// Write the local credential file named by storage.local_credential_path
    SaveCredentials {
        /// Storage account name
        #[arg(long)]
        account: String,

        /// Shared access signature token
        #[arg(long, env = "STAGEPUSH_SAS_TOKEN")]
        sas_token: String,
    },

    /// Write a commented sample configuration
    Init {
        /// Where to write it (default: stagepush.toml)
        #[arg(default_value = "stagepush.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    stagepush_core::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Init { path } => cmd_init(&path),
        Commands::SaveCredentials { account, sas_token } => {
            cmd_save_credentials(&cli.config, &account, &sas_token)
        }
        Commands::Publish => cmd_publish(&cli.config, cli.json).await,
        Commands::Status => cmd_status(&cli.config, cli.json).await,
        Commands::History { limit } => cmd_history(&cli.config, limit, cli.json).await,
        Commands::Changelog => cmd_changelog(&cli.config).await,
        Commands::CheckUpdate {
            installed,
            download,
        } => cmd_check_update(&cli.config, &installed, download.as_deref(), cli.json).await,
    };

    METRICS.flush();
    result
}

fn load_config(path: &Path) -> Result<PublishConfig> {
    PublishConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))
}

/// Cancel `token` on Ctrl-C. The cycle stops at its next step boundary.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current step");
            token.cancel();
        }
    });
}

/// Write a sample configuration, refusing to overwrite an existing file
fn cmd_init(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, SAMPLE_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Wrote sample configuration to {}", path.display());
    Ok(())
}

fn cmd_save_credentials(config_path: &Path, account: &str, sas_token: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let Some(path) = config.storage.local_credential_path.as_deref() else {
        bail!("storage.local_credential_path is not set in {}", config_path.display());
    };

    StorageCredentials {
        account_name: account.to_string(),
        sas_token: sas_token.to_string(),
    }
    .save(path)?;

    println!("Saved credentials for '{}' to {}", account, path.display());
    Ok(())
}

async fn cmd_publish(config_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let coordinator = PublishCoordinator::new(
        &config,
        store.as_ref(),
        &StrategyBuilder,
        &HtmlChangelogRenderer,
        Arc::new(PeVersionProbe),
    )
    .with_cancellation(cancel);

    let report = coordinator.run().await?;

    if json {
        let outcome = match &report.outcome {
            CycleOutcome::NoChange => json!({ "published": false }),
            CycleOutcome::Published {
                product_version,
                artifact_key,
                log_key,
                changelog_key,
                pruned,
            } => json!({
                "published": true,
                "product_version": product_version,
                "artifact_key": artifact_key,
                "log_key": log_key,
                "changelog_key": changelog_key,
                "pruned": pruned,
            }),
        };
        let out = json!({
            "cycle_id": report.cycle_id,
            "reason": report.decision.reason,
            "explanation": report.decision.explanation,
            "outcome": outcome,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Cycle:    {}", report.cycle_id);
    println!("Decision: {}", report.decision.explanation);
    match &report.outcome {
        CycleOutcome::NoChange => println!("Nothing published."),
        CycleOutcome::Published {
            product_version,
            artifact_key,
            changelog_key,
            pruned,
            ..
        } => {
            println!("Published {} as {}", product_version, artifact_key);
            println!("Changelog: {}", changelog_key);
            if *pruned > 0 {
                println!("Pruned {} old log entries", pruned);
            }
        }
    }
    Ok(())
}

async fn cmd_status(config_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let coordinator = PublishCoordinator::new(
        &config,
        store.as_ref(),
        &StrategyBuilder,
        &HtmlChangelogRenderer,
        Arc::new(PeVersionProbe),
    );

    let decision = coordinator.evaluate().await?;

    if json {
        let out = json!({
            "should_publish": decision.should_publish,
            "reason": decision.reason,
            "explanation": decision.explanation,
            "changed_files": decision.changed_files.iter().collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", decision.explanation);
    for entry in decision.changed_files.iter() {
        println!("  {} {}", entry.filename(), entry.version());
    }
    Ok(())
}

async fn cmd_history(config_path: &Path, limit: usize, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let layout = config.layout();
    let log = PublishLogStore::new(store.as_ref(), &layout, config.storage_timeout())
        .load_recent(limit)
        .await?;

    if json {
        let entries: Vec<_> = log
            .entries()
            .iter()
            .map(|entry| {
                json!({
                    "timestamp": entry.timestamp.to_rfc3339(),
                    "product_version": entry.product_version,
                    "files": entry.published_files.iter().collect::<Vec<_>>(),
                    "artifact_sha256": entry.artifact_sha256,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if log.is_empty() {
        println!("No publish history for '{}'", layout.product());
        return Ok(());
    }

    for entry in log.entries() {
        println!("version {}", entry.product_version);
        println!("Date:   {}", entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
        if let Some(sha) = &entry.artifact_sha256 {
            println!("SHA256: {}", sha);
        }
        println!();
        for file in entry.published_files.iter() {
            println!("    {} {}", file.filename(), file.version());
        }
        println!();
    }
    Ok(())
}

async fn cmd_changelog(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let layout = config.layout();

    let update = rebuild_changelog(
        store.as_ref(),
        &layout,
        &HtmlChangelogRenderer,
        config.retention,
        config.storage_timeout(),
    )
    .await?;

    for (key, error) in &update.prune.failed {
        warn!(key = %key, error = %error, "could not prune log entry");
    }
    info!(key = %update.key, entries = update.entries_rendered, "changelog rebuilt");
    println!(
        "Uploaded {} ({} entries, {} pruned)",
        update.key,
        update.entries_rendered,
        update.prune.deleted.len()
    );
    Ok(())
}

async fn cmd_check_update(
    config_path: &Path,
    installed: &Path,
    download: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let checker = UpdateChecker::new(
        store.as_ref(),
        &config.product_name,
        config.storage_timeout(),
    );

    let updates = checker
        .check(installed, &config.scan, Arc::new(PeVersionProbe))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&updates)?);
    } else if updates.is_empty() {
        println!("{} is up to date", installed.display());
    } else {
        for update in &updates {
            match update.installed {
                Some(current) => println!(
                    "  {} {} -> {}",
                    update.filename, current, update.available
                ),
                None => println!("  {} (new) {}", update.filename, update.available),
            }
        }
    }

    if let Some(destination) = download {
        if updates.is_empty() {
            info!("nothing to download");
            return Ok(());
        }
        let key = config.layout().installer_key(&config.installer.output)?;
        let path = checker.download_installer(&key, destination).await?;
        println!("Downloaded {} to {}", key, path.display());
    }
    Ok(())
}
