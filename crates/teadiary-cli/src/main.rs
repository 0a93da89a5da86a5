//! Tea Diary operator CLI.
//!
//! Reads the same environment as the bot (`APP_ENV`, `MEDIA_BACKEND`,
//! `MEDIA_DIR`, `S3_*`, `ADMINS`, `DATABASE_URL`/`POSTGRESQL_*`, `TZ`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use serde::Serialize;
use teadiary_cli::{guess_mime, SqlProbe};
use teadiary_core::{ConfigSnapshot, Environment};
use teadiary_diagnostics::{DiagnosticCommand, DiagnosticsGate, DiagnosticsService};
use teadiary_infra::init_telemetry;
use teadiary_storage::keys::DEFAULT_PREFIX;
use teadiary_storage::{MediaAsset, StorageRouter};
use tokio::io::AsyncWriteExt;

#[derive(Parser)]
#[command(name = "teadiary", about = "Tea Diary storage and diagnostics CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved configuration (credentials masked) and mounted diagnostics
    Check,
    /// Store a file through the storage router and print its asset descriptor
    Store {
        /// Path to the file to store
        file: PathBuf,
        /// MIME type; guessed from the extension when omitted
        #[arg(long)]
        mime: Option<String>,
        /// Key prefix, e.g. tastings/<user>/<tasting>
        #[arg(long, default_value = DEFAULT_PREFIX)]
        prefix: String,
    },
    /// Read back a stored asset from the backend recorded in its descriptor
    Fetch {
        /// Asset descriptor JSON as printed by `store`
        asset: PathBuf,
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run a diagnostic command as the given caller
    Diag {
        /// Telegram user id of the caller
        #[arg(long)]
        caller: i64,
        /// Command text, e.g. /health
        command: String,
    },
}

#[derive(Serialize)]
struct S3Report {
    endpoint: Option<String>,
    region: String,
    bucket: Option<String>,
    complete: bool,
    missing: Vec<&'static str>,
}

#[derive(Serialize)]
struct CheckReport {
    environment: String,
    media_backend: String,
    primary_backend: String,
    remote_reads: bool,
    media_dir: String,
    s3: S3Report,
    admins: usize,
    database: String,
    timezone: String,
    diagnostics_mounted: bool,
    diagnostic_commands: Vec<&'static str>,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

fn check_report(config: &ConfigSnapshot, router: &StorageRouter) -> CheckReport {
    let gate = DiagnosticsGate::new(config.environment, config.admins.clone());
    let diagnostic_commands = DiagnosticCommand::ALL
        .into_iter()
        .filter(|cmd| gate.is_mounted(*cmd))
        .map(|cmd| cmd.name())
        .collect();

    CheckReport {
        environment: config.environment.to_string(),
        media_backend: config.media_backend.to_string(),
        primary_backend: router.primary_backend().to_string(),
        remote_reads: router.has_remote(),
        media_dir: config.media_dir.display().to_string(),
        s3: S3Report {
            endpoint: config.s3.endpoint.clone(),
            region: config.s3.region_or_default().to_string(),
            bucket: config.s3.bucket.clone(),
            complete: config.s3.is_complete(),
            missing: config.s3.missing_fields(),
        },
        admins: config.admins.len(),
        database: config.database.redacted(),
        timezone: config.timezone.clone(),
        diagnostics_mounted: gate.surface_mounted(),
        diagnostic_commands,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let environment = Environment::parse(std::env::var("APP_ENV").ok().as_deref())
        .unwrap_or(Environment::Production);
    init_telemetry(environment).map_err(|e| anyhow::anyhow!(e))?;

    let config = Arc::new(ConfigSnapshot::from_env().context("Invalid configuration")?);
    let router = StorageRouter::from_config(&config)
        .await
        .context("Failed to initialize media storage")?;

    match cli.command {
        Commands::Check => {
            print_json(&check_report(&config, &router))?;
        }
        Commands::Store { file, mime, prefix } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mime = mime.unwrap_or_else(|| guess_mime(&file).to_string());

            let asset = router
                .store_under(&prefix, Bytes::from(data), &mime)
                .await
                .with_context(|| format!("Failed to store {}", file.display()))?;
            print_json(&asset)?;
        }
        Commands::Fetch { asset, out } => {
            let raw = tokio::fs::read(&asset)
                .await
                .with_context(|| format!("Failed to read {}", asset.display()))?;
            let asset: MediaAsset =
                serde_json::from_slice(&raw).context("Invalid asset descriptor")?;

            let bytes = router
                .retrieve(&asset)
                .await
                .with_context(|| format!("Failed to fetch {}", asset.key))?;

            match out {
                Some(path) => tokio::fs::write(&path, &bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&bytes).await?;
                    stdout.flush().await?;
                }
            }
        }
        Commands::Diag { caller, command } => {
            let probe = Arc::new(SqlProbe::new(&config.database));
            let service = DiagnosticsService::new(config.clone(), router, probe);

            match service.handle(&command, caller).await {
                Some(reply) => println!("{}", reply),
                None => bail!("Unknown command: {}", command),
            }
        }
    }

    Ok(())
}
