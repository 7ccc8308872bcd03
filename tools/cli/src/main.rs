//! omnistore CLI - Command line interface over configured storage backends.
//!
//! Every command names a backend by its alias in the configuration file and
//! a path in that backend's namespace.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use omnistore_common::{Error, ProviderPath};
use omnistore_storage::{
    cancellable, create_default_registry, Config, ConflictMode, DownloadStream, HttpTransport,
    Metadata, MetadataRecord, Provider, ProviderOptions, ProviderRegistry, ReqwestTransport,
    Transfer,
};

#[derive(Parser)]
#[command(name = "omnistore")]
#[command(about = "omnistore - One path model over many storage backends")]
#[command(version)]
struct Cli {
    /// Backend configuration file.
    #[arg(short, long, default_value = "omnistore.json")]
    config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured backends.
    Backends,
    /// Validate a path against a backend.
    Validate {
        alias: String,
        path: String,
        /// Also check that the entry exists.
        #[arg(long)]
        existing: bool,
    },
    /// Show metadata of a file, or of a folder and its children.
    Metadata { alias: String, path: String },
    /// Download a file.
    Download {
        alias: String,
        path: String,
        /// Local destination file.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Upload a local file.
    Upload {
        alias: String,
        /// Local source file.
        local: PathBuf,
        path: String,
    },
    /// Delete a file or folder.
    Delete { alias: String, path: String },
    /// Create a folder.
    Mkdir { alias: String, path: String },
    /// Copy between backends (or within one).
    Copy {
        src_alias: String,
        src: String,
        dest_alias: String,
        dest: String,
        /// Keep an existing destination entry and write under a fresh name.
        #[arg(long)]
        keep: bool,
    },
    /// Move between backends (or within one).
    Move {
        src_alias: String,
        src: String,
        dest_alias: String,
        dest: String,
        /// Keep an existing destination entry and write under a fresh name.
        #[arg(long)]
        keep: bool,
    },
}

/// Resolved configuration shared by all commands.
struct App {
    config: Config,
    registry: ProviderRegistry,
    transport: Arc<dyn HttpTransport>,
    cancel: CancellationToken,
}

impl App {
    fn provider(&self, alias: &str) -> Result<Arc<dyn Provider>> {
        self.config
            .resolve(alias, &self.registry, self.transport.clone())
            .with_context(|| format!("Failed to set up backend '{}'", alias))
    }
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

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let ctx = load_app(&cli.config).await?;

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    match cli.command {
        Commands::Backends => cmd_backends(&ctx),
        Commands::Validate {
            alias,
            path,
            existing,
        } => cmd_validate(&ctx, &alias, &path, existing).await,
        Commands::Metadata { alias, path } => cmd_metadata(&ctx, &alias, &path).await,
        Commands::Download {
            alias,
            path,
            output,
        } => cmd_download(&ctx, &alias, &path, &output).await,
        Commands::Upload { alias, local, path } => cmd_upload(&ctx, &alias, &local, &path).await,
        Commands::Delete { alias, path } => cmd_delete(&ctx, &alias, &path).await,
        Commands::Mkdir { alias, path } => cmd_mkdir(&ctx, &alias, &path).await,
        Commands::Copy {
            src_alias,
            src,
            dest_alias,
            dest,
            keep,
        } => cmd_transfer(&ctx, &src_alias, &src, &dest_alias, &dest, keep, false).await,
        Commands::Move {
            src_alias,
            src,
            dest_alias,
            dest,
            keep,
        } => cmd_transfer(&ctx, &src_alias, &src, &dest_alias, &dest, keep, true).await,
    }
}

/// Load the configuration file, or a lone `memory` backend if it is absent.
async fn load_app(path: &Path) -> Result<App> {
    let config = match Config::load(path).await {
        Ok(config) => config,
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No configuration at {}, using an in-memory backend", path.display());
            Config::with_memory("memory")
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to load {}", path.display()));
        }
    };
    let transport = ReqwestTransport::new().context("Failed to create HTTP client")?;

    Ok(App {
        config,
        registry: create_default_registry(),
        transport: Arc::new(transport),
        cancel: CancellationToken::new(),
    })
}

fn print_records(entries: Vec<Metadata>) -> Result<()> {
    let records: Vec<MetadataRecord> = entries.into_iter().map(MetadataRecord::from).collect();
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

/// List configured backends.
fn cmd_backends(ctx: &App) -> Result<()> {
    if ctx.config.backends.is_empty() {
        println!("No backends configured.");
        return Ok(());
    }
    for (alias, backend) in &ctx.config.backends {
        let available = if ctx.registry.has_provider(&backend.backend) {
            ""
        } else {
            " (unavailable)"
        };
        println!("  {:<16} {}{}", alias, backend.backend, available);
    }
    Ok(())
}

/// Validate a path.
async fn cmd_validate(ctx: &App, alias: &str, raw: &str, existing: bool) -> Result<()> {
    let provider = ctx.provider(alias)?;
    let options = ProviderOptions::new();
    let path = if existing {
        cancellable(&ctx.cancel, provider.validate_existing_path(raw, &options)).await
    } else {
        provider.validate_path(raw, &options).await
    }
    .with_context(|| format!("Invalid path '{}'", raw))?;

    let kind = if path.is_dir() { "folder" } else { "file" };
    println!("{} ({})", path, kind);
    Ok(())
}

/// Show metadata.
async fn cmd_metadata(ctx: &App, alias: &str, raw: &str) -> Result<()> {
    let provider = ctx.provider(alias)?;
    let options = ProviderOptions::new();
    let path = provider.validate_path(raw, &options).await.context("Invalid path")?;

    let response = cancellable(&ctx.cancel, provider.metadata(&path, &options))
        .await
        .context("Failed to fetch metadata")?;
    print_records(response.into_entries())
}

/// Download a file to a local path.
async fn cmd_download(ctx: &App, alias: &str, raw: &str, output: &Path) -> Result<()> {
    info!("Downloading {} from {} to {}", raw, alias, output.display());

    let provider = ctx.provider(alias)?;
    let options = ProviderOptions::new();
    let path = provider.validate_path(raw, &options).await.context("Invalid path")?;

    let written = cancellable(&ctx.cancel, async {
        let mut stream = provider.download(&path, &options).await?;
        let mut file = tokio::fs::File::create(output).await?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    })
    .await
    .context("Download failed")?;

    println!("Downloaded {} ({} bytes)", output.display(), written);
    Ok(())
}

/// Upload a local file.
async fn cmd_upload(ctx: &App, alias: &str, local: &Path, raw: &str) -> Result<()> {
    info!("Uploading {} to {} as {}", local.display(), alias, raw);

    let provider = ctx.provider(alias)?;
    let options = ProviderOptions::new();
    let path = provider.validate_path(raw, &options).await.context("Invalid path")?;

    let file = tokio::fs::File::open(local)
        .await
        .context("Failed to open source file")?;
    let size = file.metadata().await.ok().map(|m| m.len());
    let chunks = ReaderStream::new(file).map_err(Error::from);
    let stream = DownloadStream::new(Box::pin(chunks))
        .with_size(size)
        .with_name(path.name().map(String::from));

    let metadata = cancellable(&ctx.cancel, provider.upload(stream, &path, &options))
        .await
        .context("Upload failed")?;
    print_records(vec![metadata])
}

/// Delete an entry.
async fn cmd_delete(ctx: &App, alias: &str, raw: &str) -> Result<()> {
    let provider = ctx.provider(alias)?;
    let options = ProviderOptions::new();
    let path = provider.validate_path(raw, &options).await.context("Invalid path")?;

    cancellable(&ctx.cancel, provider.delete(&path, &options))
        .await
        .context("Delete failed")?;
    println!("Deleted {}", path);
    Ok(())
}

/// Create a folder.
async fn cmd_mkdir(ctx: &App, alias: &str, raw: &str) -> Result<()> {
    let provider = ctx.provider(alias)?;
    let options = ProviderOptions::new();
    let path = provider.validate_path(raw, &options).await.context("Invalid path")?;

    let metadata = cancellable(&ctx.cancel, provider.create_folder(&path, &options))
        .await
        .context("Failed to create folder")?;
    print_records(vec![metadata])
}

/// Copy or move between two configured backends.
async fn cmd_transfer(
    ctx: &App,
    src_alias: &str,
    src: &str,
    dest_alias: &str,
    dest: &str,
    keep: bool,
    remove_source: bool,
) -> Result<()> {
    let source = ctx.provider(src_alias)?;
    // One alias means one provider instance, so intra operations stay available.
    let destination = if src_alias == dest_alias {
        source.clone()
    } else {
        ctx.provider(dest_alias)?
    };
    let options = ProviderOptions::new();

    let src_path: ProviderPath = cancellable(&ctx.cancel, source.validate_existing_path(src, &options))
        .await
        .with_context(|| format!("Source '{}' not found in {}", src, src_alias))?;
    let dest_path = destination
        .validate_path(dest, &options)
        .await
        .context("Invalid destination path")?;

    let mode = if keep {
        ConflictMode::Keep
    } else {
        ConflictMode::Replace
    };
    let transfer = Transfer::new(source.as_ref(), destination.as_ref())
        .conflict(mode)
        .cancel_on(ctx.cancel.clone());

    let outcome = if remove_source {
        transfer.move_to(&src_path, &dest_path).await.context("Move failed")?
    } else {
        transfer.copy(&src_path, &dest_path).await.context("Copy failed")?
    };

    info!(strategy = ?outcome.strategy, "Transfer complete");
    print_records(vec![outcome.metadata])
}
