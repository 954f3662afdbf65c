//! Error types for `trialgraph-ingest`.

use thiserror::Error;
use trialgraph_core::ids::{AssetId, CompanyId};

/// Failures that abort an ingestion batch or a correction. Per-record
/// problems are not errors; they are collected in the batch report.
#[derive(Debug, Error)]
pub enum Error {
  /// The reference tables could not be obtained. Nothing was written.
  #[error("batch aborted, reference data unavailable: {0}")]
  ReferenceDataUnavailable(#[source] trialgraph_core::Error),

  #[error("rule tables could not be compiled: {0}")]
  Rules(#[from] trialgraph_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("asset not found: {0}")]
  AssetNotFound(AssetId),

  #[error("company not found: {0}")]
  CompanyNotFound(CompanyId),

  #[error("invalid correction: {0}")]
  InvalidCorrection(String),
}

impl Error {
  pub fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Error::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
