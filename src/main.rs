//! ramsync: keep memory-backed mirrors of directory trees in sync
//!
//! Thin command line front end over the `ramsync` library. Volumes come from
//! a JSON configuration file; the `diff` command works on any two trees.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use log::debug;
use serde::Serialize;

use ramsync::backend::available_backends;
use ramsync::fingerprint::fingerprint_directory;
use ramsync::logging::{LogFormat, LogSettings, init_logging};
use ramsync::recovery::{RecoveryStatus, verify_integrity_with};
use ramsync::sync::SyncStatus;
use ramsync::{
    ConfigFile, HashAlgorithm, RecoveryManager, SyncEngine, VolumeConfig, VolumeManager, diff,
};

#[derive(Parser)]
#[command(name = "ramsync")]
#[command(version)]
#[command(about = "Disk-backed RAM volumes with hash-based sync and crash recovery")]
struct Cli {
    /// JSON configuration file describing the volumes
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit log lines as JSON objects
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show sync and recovery state of every configured volume
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Sync one volume
    Sync {
        /// Volume name
        name: String,

        #[arg(short, long, value_enum, default_value_t = Direction::ToRam)]
        direction: Direction,

        /// Ignore the configured strategy and do a full sync (to-ram only)
        #[arg(long)]
        full: bool,
    },

    /// Compare the memory tree against the persistent tree
    Verify {
        /// Volume name
        name: String,
    },

    /// Repopulate the memory tree after an unclean shutdown
    Recover {
        /// Volume name
        name: String,

        /// Recover even if the last shutdown was clean
        #[arg(long)]
        force: bool,
    },

    /// Persist the memory tree and mark the volume cleanly shut down
    Shutdown {
        /// Volume name
        name: String,
    },

    /// Fingerprint two trees and show what differs
    Diff {
        /// Reference tree
        source: PathBuf,

        /// Tree compared against the reference
        target: PathBuf,

        /// Glob pattern selecting files (repeatable)
        #[arg(short, long = "pattern", default_value = "*")]
        patterns: Vec<String>,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    ToRam,
    ToDisk,
}

#[derive(Serialize)]
struct VolumeReport {
    name: String,
    sync: SyncStatus,
    recovery: RecoveryStatus,
}

/// Registered volumes with their memory paths resolved
struct Workspace {
    manager: VolumeManager,
    algorithm: HashAlgorithm,
}

impl Workspace {
    fn load(path: &Path) -> Result<Self> {
        let file = ConfigFile::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?;
        let algorithm = file.manager.hash_algorithm;
        let manager = VolumeManager::new(file.manager)?;
        for volume in file.volumes {
            manager.register(volume)?;
        }
        Ok(Self { manager, algorithm })
    }

    fn volume(&self, name: &str) -> Result<VolumeConfig> {
        Ok(self.manager.volume_config(name)?)
    }

    fn recovery(&self) -> RecoveryManager {
        RecoveryManager::new().with_algorithm(self.algorithm)
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let file_log = match &cli.config {
        Some(path) => ConfigFile::load(path).ok().and_then(|f| f.manager.log_file),
        None => None,
    };
    let mut settings = LogSettings::default()
        .verbose(cli.verbose)
        .with_format(if cli.json_logs {
            LogFormat::Json
        } else {
            LogFormat::Text
        });
    if let Some(log_file) = file_log {
        settings = settings.with_log_file(log_file);
    }
    init_logging(&settings)?;

    match cli.command {
        Commands::Diff {
            source,
            target,
            patterns,
            json,
        } => diff_command(&source, &target, &patterns, json),
        command => {
            let path = cli
                .config
                .ok_or_else(|| anyhow!("--config is required for this command"))?;
            let workspace = Workspace::load(&path)?;
            run_volume_command(&workspace, command)
        }
    }
}

fn run_volume_command(workspace: &Workspace, command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Status { json } => status_command(workspace, json),
        Commands::Sync {
            name,
            direction,
            full,
        } => {
            let stats = match direction {
                Direction::ToRam => workspace.manager.sync_to_ram(&name, full)?,
                Direction::ToDisk => workspace.manager.sync_to_disk(&name)?,
            };
            print_json(&stats)?;
            Ok(exit_code(stats.success))
        }
        Commands::Verify { name } => {
            let config = workspace.volume(&name)?;
            let integrity = verify_integrity_with(&config, &config.patterns, workspace.algorithm);
            print_json(&integrity)?;
            Ok(exit_code(!integrity.needs_recovery()))
        }
        Commands::Recover { name, force } => {
            let config = workspace.volume(&name)?;
            let result = workspace.recovery().recover(&config, force);
            print_json(&result)?;
            Ok(exit_code(result.success()))
        }
        Commands::Shutdown { name } => {
            let config = workspace.volume(&name)?;
            let outcome = workspace.recovery().prepare_shutdown(&config);
            print_json(&outcome)?;
            Ok(exit_code(outcome.success()))
        }
        Commands::Diff { .. } => Err(anyhow!("diff does not operate on configured volumes")),
    }
}

fn status_command(workspace: &Workspace, json: bool) -> Result<ExitCode> {
    let recovery = workspace.recovery();
    let mut reports = Vec::new();
    for name in workspace.manager.volume_names() {
        let config = workspace.volume(&name)?;
        let engine = SyncEngine::with_algorithm(config.clone(), workspace.algorithm)?;
        reports.push(VolumeReport {
            name,
            sync: engine.status(),
            recovery: recovery.check_status(&config),
        });
    }

    if json {
        print_json(&reports)?;
        return Ok(ExitCode::SUCCESS);
    }

    println!("Backends: {}", available_backends().join(", "));
    if reports.is_empty() {
        println!("No volumes configured");
    }
    for report in &reports {
        print_volume(report);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_volume(report: &VolumeReport) {
    let sync = &report.sync;
    println!("{}", report.name);
    println!("  disk: {} ({})", sync.disk_path.display(), presence(sync.disk_exists));
    match &sync.ram_path {
        Some(path) => println!("  ram:  {} ({})", path.display(), presence(sync.ram_exists)),
        None => println!("  ram:  not configured"),
    }
    match &sync.differences {
        Some(d) if sync.in_sync => println!("  in sync: yes ({} files)", d.identical),
        Some(d) => println!(
            "  in sync: no ({} disk-only, {} ram-only, {} modified)",
            d.disk_only.len(),
            d.ram_only.len(),
            d.modified.len()
        ),
        None => println!("  in sync: unknown"),
    }
    println!(
        "  clean shutdown: {}, recovery needed: {}",
        yes_no(report.recovery.clean_shutdown),
        yes_no(report.recovery.recovery_needed)
    );
}

fn diff_command(source: &Path, target: &Path, patterns: &[String], json: bool) -> Result<ExitCode> {
    let algorithm = HashAlgorithm::Auto;
    debug!("Diffing {} against {}", source.display(), target.display());
    let source_map = fingerprint_directory(source, patterns, algorithm)
        .with_context(|| format!("Failed to fingerprint {}", source.display()))?;
    let target_map = fingerprint_directory(target, patterns, algorithm)
        .with_context(|| format!("Failed to fingerprint {}", target.display()))?;
    let result = diff(&source_map, &target_map);

    if json {
        print_json(&result)?;
        return Ok(ExitCode::SUCCESS);
    }

    for path in &result.added {
        println!("+ {path}");
    }
    for path in &result.removed {
        println!("- {path}");
    }
    for path in &result.modified {
        println!("~ {path}");
    }
    println!(
        "{} added, {} removed, {} modified, {} unchanged ({} paths)",
        result.added.len(),
        result.removed.len(),
        result.modified.len(),
        result.unchanged.len(),
        result.total()
    );
    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn presence(exists: bool) -> &'static str {
    if exists { "exists" } else { "missing" }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
