//! trialgraph binary.
//!
//! Reads `trialgraph.toml` (or the path given with `--config`), opens the
//! SQLite graph store, and either serves the JSON API over HTTP or ingests
//! one batch file and prints the report.
//!
//! ```text
//! trialgraph serve
//! trialgraph ingest --indication uveal_melanoma --input trials.json
//! ```

mod settings;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use trialgraph_core::reference::{FileReference, ReferenceData, ReferenceSource, StaticReference};
use trialgraph_ingest::{CancellationToken, Ingestor};
use trialgraph_store_sqlite::SqliteStore;

use crate::settings::{ServerConfig, expand_tilde};

#[derive(Parser)]
#[command(author, version, about = "Clinical-trial asset and ownership graph")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "trialgraph.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API.
  Serve,
  /// Ingest a JSON array of trial records and print the batch report.
  Ingest {
    /// Indication code the batch belongs to.
    #[arg(long)]
    indication: String,
    /// File holding a JSON array of trial records.
    #[arg(long)]
    input:      PathBuf,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = ServerConfig::load(&cli.config)?;
  let ingestor = Arc::new(build_ingestor(&cfg).await?);

  match cli.command {
    Command::Serve => serve(&cfg, ingestor).await,
    Command::Ingest { indication, input } => ingest(ingestor, &indication, &input).await,
  }
}

async fn build_ingestor(cfg: &ServerConfig) -> anyhow::Result<Ingestor<SqliteStore>> {
  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let reference: Arc<dyn ReferenceSource> = match &cfg.reference_path {
    Some(path) => {
      let path = expand_tilde(path);
      tracing::info!(path = %path.display(), "using reference tables from file");
      Arc::new(FileReference::new(path))
    }
    None => Arc::new(StaticReference::new(
      ReferenceData::builtin().context("built-in reference tables are invalid")?,
    )),
  };

  Ok(Ingestor::new(Arc::new(store), reference, cfg.ingest_config()))
}

async fn serve(cfg: &ServerConfig, ingestor: Arc<Ingestor<SqliteStore>>) -> anyhow::Result<()> {
  let app = trialgraph_api::api_router(ingestor).layer(TraceLayer::new_for_http());
  let address = cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

async fn ingest(
  ingestor: Arc<Ingestor<SqliteStore>>,
  indication: &str,
  input: &Path,
) -> anyhow::Result<()> {
  let text = tokio::fs::read_to_string(input)
    .await
    .with_context(|| format!("failed to read {input:?}"))?;
  let records: Vec<serde_json::Value> = serde_json::from_str(&text)
    .with_context(|| format!("{input:?} is not a JSON array of records"))?;

  // Ctrl-C stops the run between records; merged records stay merged.
  let cancel = CancellationToken::new();
  let on_signal = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      on_signal.cancel();
    }
  });

  let report = ingestor
    .ingest_json(indication, records, &cancel)
    .await
    .context("ingestion failed")?;
  println!("{}", serde_json::to_string_pretty(&report)?);

  Ok(())
}
