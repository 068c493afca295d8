//! magicmount - overlay module files onto read-only partitions
//!
//! Usage:
//!   magicmount mount              - Build the mount tree and mount it
//!   magicmount plan               - Print the mount tree without mounting
//!   magicmount cert <apk>         - Print the v2 signing certificate of an APK

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use magicmount::{
    cert,
    config::Config,
    fs::{DryRunMounter, NixMounter},
    modules,
    tree::{MountReport, PreparedTree, TreeBuilder},
};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "magicmount")]
#[command(version = "0.1.0")]
#[command(about = "Overlay module files onto read-only partitions")]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the mount tree and mount it
    Mount {
        /// Log the mounts instead of performing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the mount tree
    Plan,

    /// Print the hex encoded signing certificate of an APK
    Cert {
        /// APK file
        apk: PathBuf,

        /// Reject APKs whose versionCode comment is below this
        #[arg(long)]
        min_version: Option<u32>,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let builder = FmtSubscriber::builder().with_target(false);
    let result = if std::env::var_os("RUST_LOG").is_some() {
        tracing::subscriber::set_global_default(
            builder.with_env_filter(EnvFilter::from_default_env()).finish(),
        )
    } else {
        tracing::subscriber::set_global_default(builder.with_max_level(log_level).finish())
    };
    if let Err(e) = result {
        eprintln!("Failed to set subscriber: {}", e);
    }

    if let Err(e) = run_command(cli.command, cli.config.as_deref()) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands, config_path: Option<&Path>) -> anyhow::Result<()> {
    match command {
        Commands::Mount { dry_run } => cmd_mount(config_path, dry_run),
        Commands::Plan => cmd_plan(config_path),
        Commands::Cert { apk, min_version } => cmd_cert(&apk, min_version),
    }
}

fn load_config(config_path: Option<&Path>) -> anyhow::Result<Config> {
    match config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Config::from_env().context("loading default configuration"),
    }
}

/// Module names to load, in priority order
fn module_list(config: &Config) -> anyhow::Result<Vec<String>> {
    match &config.modules {
        Some(list) => Ok(modules::select(&config.layout, list)),
        None => modules::discover(&config.layout).with_context(|| {
            format!("listing modules in {}", config.layout.module_root.display())
        }),
    }
}

/// Collect every module and injected file, then prepare the tree.
/// Returns `None` when nothing would be mounted.
fn build_tree<'a>(config: &'a Config, names: &'a [String]) -> anyhow::Result<Option<PreparedTree<'a>>> {
    let mut builder = TreeBuilder::new(&config.layout);

    for name in names {
        builder.add_module(name);
    }

    for entry in &config.inject {
        builder
            .inject(&entry.path, &entry.source)
            .with_context(|| format!("injecting {}", entry.path))?;
    }

    if builder.is_empty() {
        return Ok(None);
    }
    info!("Modules in tree: {}", builder.modules().join(", "));
    Ok(Some(builder.build(config.partitions.as_slice())))
}

fn cmd_mount(config_path: Option<&Path>, dry_run: bool) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    config.mount.dry_run |= dry_run;

    let names = module_list(&config)?;
    let Some(tree) = build_tree(&config, &names)? else {
        info!("Nothing to mount");
        return Ok(());
    };

    let report = if config.mount.dry_run {
        let mut mounter = DryRunMounter::default();
        let report = tree.realize(&config.layout, &mut mounter);
        info!("[dry-run] {} mounts would be issued", mounter.count);
        report
    } else {
        let mounter = NixMounter::new(config.mount.read_only, Some(config.mount.tmpfs_mode.clone()));
        tree.realize(&config.layout, mounter)
    };

    report_result(&report)
}

fn report_result(report: &MountReport) -> anyhow::Result<()> {
    for failure in &report.failures {
        warn!("{}: {}", failure.path, failure.error);
    }
    info!(
        "{} mounts, {} failures",
        report.mounted,
        report.failures.len()
    );
    if !report.is_success() {
        bail!("{} mounts failed", report.failures.len());
    }
    Ok(())
}

fn cmd_plan(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let names = module_list(&config)?;

    match build_tree(&config, &names)? {
        Some(tree) => print!("{}", tree.render()),
        None => println!("Nothing to mount"),
    }
    Ok(())
}

fn cmd_cert(apk: &Path, min_version: Option<u32>) -> anyhow::Result<()> {
    let mut file = File::open(apk).with_context(|| format!("opening {}", apk.display()))?;

    let cert = cert::read_certificate(&mut file, min_version);
    if cert.is_empty() {
        bail!("no usable v2 signing certificate in {}", apk.display());
    }
    println!("{}", hex::encode(cert));
    Ok(())
}
