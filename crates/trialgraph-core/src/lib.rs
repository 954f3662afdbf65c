//! Core types and pure logic for the trialgraph entity-resolution pipeline.
//!
//! This crate has no HTTP or database dependencies. Sponsor
//! classification, name normalization, ownership inference and the field-level
//! merge policy are all pure functions over already-fetched records and an
//! explicitly constructed [`reference::ReferenceData`]. The only seam to
//! persistent state is the [`store::GraphStore`] trait.

pub mod classify;
pub mod enrich;
pub mod error;
pub mod ids;
pub mod infer;
pub mod model;
pub mod normalize;
pub mod plan;
pub mod policy;
pub mod record;
pub mod reference;
pub mod report;
pub mod store;

pub use error::{Error, Result};
