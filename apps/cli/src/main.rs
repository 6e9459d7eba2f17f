mod events;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use skyvault_transfer::calculate_file_checksum;
use skyvault_upload::{
    ClientConfig, FileUploadReport, ProgressSink, ResolveOptions, UploadOrchestrator,
    UploadSource, UploadTarget,
};

/// Upload files to SkyVault, skipping content the server already stores.
#[derive(Parser)]
#[command(name = "skyvault", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (defaults to the per-user config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long, global = true)]
    api_base: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the SHA-256 digest of a local file
    Hash { file: PathBuf },
    /// Resolve a virtual folder path to its id
    Resolve {
        path: String,
        /// Folder id relative paths start from
        #[arg(long, default_value_t = 0)]
        base: u64,
        /// Create missing folders
        #[arg(long)]
        create: bool,
    },
    /// Upload one file
    Upload {
        file: PathBuf,
        /// Target folder path
        #[arg(long, default_value = "/")]
        to: String,
        /// Create missing target folders
        #[arg(long)]
        create: bool,
        /// Chunk size in MiB
        #[arg(long)]
        chunk_mb: Option<u64>,
    },
    /// Upload a local directory tree
    UploadDir {
        dir: PathBuf,
        #[arg(long, default_value = "/")]
        to: String,
        #[arg(long)]
        create: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,skyvault=debug")),
        )
        .init();

    let cli = Cli::parse();

    if let Command::Hash { file } = &cli.command {
        let digest = calculate_file_checksum(file)
            .with_context(|| format!("hashing {}", file.display()))?;
        println!("{digest}  {}", file.display());
        return Ok(());
    }

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(base) = cli.api_base {
        config.api_base = base;
    }

    match cli.command {
        Command::Hash { .. } => {}
        Command::Resolve { path, base, create } => {
            let orch = UploadOrchestrator::from_config(&config)?;
            let opts = ResolveOptions {
                base_id: base,
                create_missing: create,
            };
            let id = orch.resolver().resolve(&path, opts).await?;
            println!("{id}");
        }
        Command::Upload {
            file,
            to,
            create,
            chunk_mb,
        } => {
            if let Some(mb) = chunk_mb {
                config.chunk_size_mb = mb;
            }
            let (orch, drain) = with_progress(UploadOrchestrator::from_config(&config)?);
            let source = UploadSource::from_path(&file).await?;
            let report = orch.upload_file(source, &target(to, create)).await;
            drop(orch);
            drain.await?;
            print_report(&report?);
        }
        Command::UploadDir { dir, to, create } => {
            let (orch, drain) = with_progress(UploadOrchestrator::from_config(&config)?);
            let reports = orch.upload_directory(&dir, &target(to, create)).await;
            drop(orch);
            drain.await?;
            let reports = reports?;
            for report in &reports {
                print_report(report);
            }
            let instant = reports.iter().filter(|r| r.kind.is_instant()).count();
            info!(files = reports.len(), instant, "directory uploaded");
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ClientConfig> {
    match path {
        Some(path) => {
            let mut config = ClientConfig::load_from(path)
                .with_context(|| format!("loading {}", path.display()))?;
            config.apply_env(|k| std::env::var(k).ok());
            Ok(config)
        }
        None => Ok(ClientConfig::load()?),
    }
}

fn target(path: String, create: bool) -> UploadTarget {
    let target = UploadTarget::path(path);
    if create { target.creating() } else { target }
}

/// Attaches a progress channel and spawns the task that logs it.
fn with_progress(
    orch: UploadOrchestrator,
) -> (UploadOrchestrator, tokio::task::JoinHandle<()>) {
    let (sink, rx) = ProgressSink::channel(64);
    let drain = tokio::spawn(events::log_events(rx));
    (orch.with_events(sink), drain)
}

fn print_report(report: &FileUploadReport) {
    let id = report
        .record
        .as_ref()
        .map(|r| r.id.to_string())
        .unwrap_or_else(|| "?".into());
    println!(
        "{}\t{} bytes\tfolder {}\tid {}\t{:?}",
        report.name, report.size, report.parent_id, id, report.kind
    );
}
