use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use podback::config::Config;
use podback::crypto::KeyMaterial;
use podback::k8s::PodExec;
use podback::restore;
use podback::runner::Runner;
use podback::store::S3Store;

#[derive(Parser)]
#[command(name = "podback", version, about = "Streaming backups for stateful Kubernetes workloads")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dump matching pods and upload the archives to object storage
    Backup {
        /// Path to the backup-targets file
        #[arg(long, env = "PODBACK_CONFIG", default_value = "/etc/podback/config.yaml")]
        config: PathBuf,

        /// S3-compatible endpoint, e.g. https://minio.example:9000
        #[arg(long, env = "S3_ENDPOINT")]
        endpoint: Option<String>,

        /// Destination bucket
        #[arg(long, env = "S3_BUCKET", default_value = "podback")]
        bucket: String,
    },

    /// Read a stored object from stdin and write the original dump to
    /// stdout. Set AES_ENCRYPT_KEY to restore `.aes` objects.
    Restore,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Backup {
            config,
            endpoint,
            bucket,
        } => backup(config, endpoint, bucket).await,
        Command::Restore => restore_stdin(),
    }
}

async fn backup(config_path: PathBuf, endpoint: Option<String>, bucket: String) -> anyhow::Result<()> {
    let config = Config::load(&config_path).context("loading backup config")?;
    let key = key_from_env()?;
    if key.is_none() {
        tracing::warn!("AES_ENCRYPT_KEY not set, backups will not be encrypted");
    }

    let client = kube::Client::try_default()
        .await
        .context("building kubernetes client")?;
    let sink = S3Store::from_env(&bucket, endpoint.as_deref()).context("building object store")?;

    let runner = Runner::new(PodExec::new(client), Arc::new(sink), key);
    let summary = runner.run(&config).await;

    tracing::info!(
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        target_errors = summary.target_errors,
        "backup run complete"
    );

    if summary.any_failed() {
        std::process::exit(1);
    }
    Ok(())
}

fn restore_stdin() -> anyhow::Result<()> {
    let key = key_from_env()?;

    let stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();
    let bytes = restore::restore(stdin, &mut stdout, key.as_ref())?;

    tracing::info!(bytes, "restore complete");
    Ok(())
}

/// Encryption is enabled iff the key variable is present and non-empty,
/// mirroring how the objects' `.aes` suffix is assigned at backup time.
fn key_from_env() -> anyhow::Result<Option<KeyMaterial>> {
    match std::env::var("AES_ENCRYPT_KEY") {
        Ok(value) if !value.is_empty() => {
            let key = KeyMaterial::new(value.into_bytes()).context("AES_ENCRYPT_KEY")?;
            Ok(Some(key))
        }
        _ => Ok(None),
    }
}
