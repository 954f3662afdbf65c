//! Runtime configuration, deserialised from `trialgraph.toml` and
//! `TRIALGRAPH_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use trialgraph_core::infer::InferenceConfig;
use trialgraph_ingest::IngestConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:           String,
  #[serde(default = "default_port")]
  pub port:           u16,
  pub store_path:     PathBuf,
  /// Reference tables to load instead of the built-in copy. Re-read on
  /// every batch, so edits take effect without a restart.
  #[serde(default)]
  pub reference_path: Option<PathBuf>,
  #[serde(default)]
  pub inference:      InferenceConfig,
  #[serde(default = "default_report_samples")]
  pub report_samples: usize,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_report_samples() -> usize { IngestConfig::default().report_samples }

impl ServerConfig {
  /// Layer `path` (optional) under the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("TRIALGRAPH").separator("__"))
      .build()
      .context("failed to read config file")?;
    settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn ingest_config(&self) -> IngestConfig {
    IngestConfig { inference: self.inference, report_samples: self.report_samples }
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(toml: &str) -> ServerConfig {
    config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn defaults_fill_in_missing_fields() {
    let cfg = parse(r#"store_path = "graph.db""#);
    assert_eq!(cfg.address(), "127.0.0.1:8080");
    assert!(cfg.reference_path.is_none());
    assert_eq!(cfg.ingest_config(), IngestConfig::default());
  }

  #[test]
  fn inference_section_overrides_confidences() {
    let cfg = parse(
      r#"
        store_path     = "graph.db"
        report_samples = 5

        [inference]
        comparator_confidence = 0.3
      "#,
    );
    let ingest = cfg.ingest_config();
    assert_eq!(ingest.report_samples, 5);
    assert_eq!(ingest.inference.comparator_confidence, 0.3);
    assert_eq!(ingest.inference.registry_confidence, 1.0);
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/x.db")), PathBuf::from(home).join("x.db"));
    assert_eq!(expand_tilde(Path::new("/abs/x.db")), PathBuf::from("/abs/x.db"));
  }
}
