//! Ingestion for the trialgraph entity-resolution pipeline.
//!
//! [`Ingestor`] drives a batch: it fetches reference data, validates and
//! plans each record with `trialgraph-core`, and hands the planned writes to
//! the [`MergeEngine`]. It also applies user corrections. Everything here is
//! generic over [`trialgraph_core::store::GraphStore`].

pub mod cancel;
pub mod correction;
pub mod error;
pub mod ingest;
pub mod locks;
pub mod merge;

pub use cancel::CancellationToken;
pub use correction::{AssetCorrection, OwnerCorrection};
pub use error::{Error, Result};
pub use ingest::{IngestConfig, IngestReport, Ingestor};
pub use locks::LockRegistry;
pub use merge::MergeEngine;

#[cfg(test)]
mod tests;
