//! Error types for `trialgraph-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The alias / known-owner tables could not be read. Fatal for a batch:
  /// continuing without them would silently produce incorrect dedup.
  #[error("reference data unavailable: {0}")]
  ReferenceDataUnavailable(String),

  #[error("invalid reference data: {0}")]
  InvalidReferenceData(String),

  #[error("invalid rule pattern {pattern:?}: {source}")]
  InvalidPattern {
    pattern: String,
    #[source]
    source:  regex::Error,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
