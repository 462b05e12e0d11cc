//! # confsnap-cli
//!
//! A thin demonstration binary around the `confsnap` library. This is the
//! kind of external collaborator the core crate explicitly excludes from
//! its own scope (spec §1): it owns argument parsing and terminal output
//! only, never snapshot logic. A real deployment (the Claude-Code hook
//! dispatcher this crate was distilled from) would wire the same
//! `confsnap::Manager` up to its own config loader and rule engine instead
//! of `clap` flags.

use clap::{Parser, Subcommand};
use colored::Colorize;
use confsnap::{
    AuditFilter, AuditLogger, CompositePolicy, CountPolicy, CreateOptions, EngineConfig,
    EnvHostIdentity, FsStorage, Manager, Operation, RestoreOptions, RetentionPolicy, Scope,
    SizePolicy, Storage, StorageRoot, SystemClock, Trigger,
};
use std::path::{Path, PathBuf};

/// confsnap-cli — drive the confsnap snapshot core from the command line
#[derive(Parser, Debug)]
#[command(
    name = "confsnap-cli",
    version,
    about = "Content-addressed snapshot store for configuration files"
)]
struct Cli {
    /// Storage root (contains `.backups/` and `audit.jsonl`)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Operate on a project scope rooted at this absolute path instead of
    /// the global scope
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    /// Explicit scope kind ("global" or "project"). Defaults to "project"
    /// when `--project` is given, otherwise "global". Any other value is
    /// rejected by the core as an unknown scope variant.
    #[arg(long, global = true)]
    scope: Option<String>,

    /// Default retention cap: keep only this many chains when `prune` runs
    /// with no explicit override.
    #[arg(long, global = true)]
    default_keep_chains: Option<usize>,

    /// Default retention cap: evict chains once total stored bytes exceed
    /// this, when `prune` runs with no explicit override.
    #[arg(long, global = true)]
    default_max_bytes: Option<u64>,

    /// Default retention cap: evict chains whose oldest snapshot is older
    /// than this many days, when `prune` runs with no explicit override.
    #[arg(long, global = true)]
    default_max_age_days: Option<i64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture a file as a new snapshot
    Create {
        /// Path to the config file to capture
        path: PathBuf,
        #[arg(short, long, value_enum, default_value = "manual")]
        trigger: CliTrigger,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// List all snapshots in this scope
    List,

    /// Show one snapshot's metadata
    Get { id: String },

    /// Restore a snapshot to a target path
    Restore {
        id: String,
        #[arg(short, long)]
        target: Option<PathBuf>,
        #[arg(long)]
        backup_before_restore: bool,
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value_t = true)]
        validate: bool,
    },

    /// Recompute and compare a snapshot's checksum
    Validate { id: String },

    /// Apply a retention policy, evicting whole chains
    Prune {
        #[arg(long)]
        keep_chains: Option<usize>,
        #[arg(long)]
        max_bytes: Option<u64>,
    },

    /// Query the audit log
    Audit {
        #[arg(long, value_enum)]
        operation: Option<CliOperation>,
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum CliTrigger {
    Manual,
    Automatic,
    BeforeInit,
    Migration,
}

impl From<CliTrigger> for Trigger {
    fn from(t: CliTrigger) -> Self {
        match t {
            CliTrigger::Manual => Trigger::Manual,
            CliTrigger::Automatic => Trigger::Automatic,
            CliTrigger::BeforeInit => Trigger::BeforeInit,
            CliTrigger::Migration => Trigger::Migration,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum CliOperation {
    Create,
    Restore,
    Delete,
    Prune,
    List,
    Get,
}

impl From<CliOperation> for Operation {
    fn from(op: CliOperation) -> Self {
        match op {
            CliOperation::Create => Operation::Create,
            CliOperation::Restore => Operation::Restore,
            CliOperation::Delete => Operation::Delete,
            CliOperation::Prune => Operation::Prune,
            CliOperation::List => Operation::List,
            CliOperation::Get => Operation::Get,
        }
    }
}

#[derive(Parser, Debug)]
struct Args {
    #[command(flatten)]
    cli: Cli,
    #[command(subcommand)]
    command: Command,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("{} {}", "error:".red(), e);
        std::process::exit(1);
    }
}

fn build_manager(cli: &Cli) -> anyhow::Result<Manager> {
    let root = StorageRoot::new(&cli.root);

    let scope_kind = cli.scope.clone().unwrap_or_else(|| {
        if cli.project.is_some() {
            "project".to_string()
        } else {
            "global".to_string()
        }
    });
    let scope = Scope::parse(&scope_kind, cli.project.clone())?;
    let storage: Box<dyn Storage> = Box::new(FsStorage::new(root.path(), scope)?);

    let audit = AuditLogger::new(root.audit_log_path());
    let config = EngineConfig {
        enabled: true,
        max_chains: cli.default_keep_chains,
        max_age: cli.default_max_age_days.map(chrono::Duration::days),
        max_bytes: cli.default_max_bytes,
    };
    Ok(Manager::new(
        storage,
        Box::new(SystemClock::new()),
        Box::new(EnvHostIdentity),
        config,
        audit,
    ))
}

fn run(args: Args) -> anyhow::Result<()> {
    let manager = build_manager(&args.cli)?;

    match args.command {
        Command::Create {
            path,
            trigger,
            tag,
            description,
        } => cmd_create(&manager, &path, trigger.into(), tag, description),
        Command::List => cmd_list(&manager),
        Command::Get { id } => cmd_get(&manager, &id),
        Command::Restore {
            id,
            target,
            backup_before_restore,
            force,
            validate,
        } => cmd_restore(&manager, &id, target, backup_before_restore, force, validate),
        Command::Validate { id } => cmd_validate(&manager, &id),
        Command::Prune {
            keep_chains,
            max_bytes,
        } => cmd_prune(&manager, keep_chains, max_bytes),
        Command::Audit { operation, limit } => cmd_audit(&manager, operation, limit),
    }
}

fn cmd_create(
    manager: &Manager,
    path: &Path,
    trigger: Trigger,
    tag: Option<String>,
    description: Option<String>,
) -> anyhow::Result<()> {
    let snapshot = manager.create_backup(
        path,
        trigger,
        CreateOptions {
            tag,
            description,
            ..Default::default()
        },
    )?;

    eprintln!(
        "{} snapshot {} ({}, {} bytes)",
        "✓".green(),
        snapshot.id.as_str().bold(),
        snapshot.chain_id,
        snapshot.size,
    );
    Ok(())
}

fn cmd_list(manager: &Manager) -> anyhow::Result<()> {
    let snapshots = manager.list_snapshots()?;
    if snapshots.is_empty() {
        eprintln!("No snapshots found.");
        return Ok(());
    }

    eprintln!(
        "{:18}  {:10}  {:>4}  {:>8}  {}",
        "Snapshot ID", "Chain", "Seq", "Size", "Config path"
    );
    for s in &snapshots {
        eprintln!(
            "{:18}  {:10}  {:>4}  {:>8}  {}",
            s.id,
            s.chain_id,
            s.sequence_num,
            s.size,
            s.config_path.display(),
        );
    }
    eprintln!();
    eprintln!("  {} snapshot(s)", snapshots.len());
    Ok(())
}

fn cmd_get(manager: &Manager, id: &str) -> anyhow::Result<()> {
    let snapshot = manager.get_snapshot(id)?;
    eprintln!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn cmd_restore(
    manager: &Manager,
    id: &str,
    target: Option<PathBuf>,
    backup_before_restore: bool,
    force: bool,
    validate: bool,
) -> anyhow::Result<()> {
    let result = manager.restore_snapshot(
        id,
        RestoreOptions {
            target_path: target,
            backup_before_restore,
            force,
            validate,
        },
    )?;

    eprintln!(
        "{} restored {} bytes to {}",
        "✓".green(),
        result.bytes_restored,
        result.restored_path.display(),
    );
    if let Some(backup_id) = result.backup_snapshot {
        eprintln!("  safety snapshot: {backup_id}");
    }
    Ok(())
}

fn cmd_validate(manager: &Manager, id: &str) -> anyhow::Result<()> {
    manager.validate_snapshot(id)?;
    eprintln!("{} checksum verified for {}", "✓".green(), id);
    Ok(())
}

fn cmd_prune(
    manager: &Manager,
    keep_chains: Option<usize>,
    max_bytes: Option<u64>,
) -> anyhow::Result<()> {
    // Explicit flags override the engine's configured retention parameters
    // for this one call; with neither flag given, fall back to whatever
    // `EngineConfig` was built from (`--default-keep-chains` etc).
    let outcome = if keep_chains.is_some() || max_bytes.is_some() {
        let mut policies: Vec<Box<dyn RetentionPolicy>> = Vec::new();
        if let Some(n) = keep_chains {
            policies.push(Box::new(CountPolicy::new(n)?));
        }
        if let Some(bytes) = max_bytes {
            policies.push(Box::new(SizePolicy::new(bytes)?));
        }
        manager.apply_retention(&CompositePolicy::new(policies))?
    } else {
        manager.apply_configured_retention()?
    };

    eprintln!(
        "{} pruned {} snapshot(s) across {} chain(s), freed {} bytes",
        "✓".green(),
        outcome.snapshots_removed,
        outcome.chains_removed,
        outcome.bytes_freed,
    );
    Ok(())
}

fn cmd_audit(
    manager: &Manager,
    operation: Option<CliOperation>,
    limit: usize,
) -> anyhow::Result<()> {
    let filter = AuditFilter {
        operation: operation.map(Into::into),
        limit,
        ..Default::default()
    };
    let entries = manager.query_audit(&filter)?;
    for entry in entries {
        eprintln!("{}", serde_json::to_string(&entry)?);
    }
    Ok(())
}
