//! JSON REST API for the trial graph.
//!
//! Exposes an axum [`Router`] backed by an [`Ingestor`] over any
//! [`trialgraph_core::store::GraphStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", trialgraph_api::api_router(ingestor.clone()))
//! ```

pub mod assets;
pub mod companies;
pub mod error;
pub mod ingest;
pub mod stats;
pub mod trials;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use trialgraph_core::store::GraphStore;
use trialgraph_ingest::Ingestor;

pub use error::ApiError;

/// Build a fully-materialised API router for `ingestor`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(ingestor: Arc<Ingestor<S>>) -> Router<()>
where
  S: GraphStore + 'static,
{
  Router::new()
    // Ingestion
    .route("/ingest", post(ingest::handler::<S>))
    // Assets
    .route("/assets/{id}", get(assets::get_one::<S>).patch(assets::correct::<S>))
    .route("/assets/{id}/relationships", get(assets::relationships::<S>))
    // Companies
    .route("/companies/{id}", get(companies::get_one::<S>))
    .route("/companies/{id}/relationships", get(companies::relationships::<S>))
    // Trials
    .route("/trials/{id}", get(trials::get_one::<S>))
    // Stats
    .route("/stats", get(stats::handler::<S>))
    .route("/health", get(stats::health))
    .with_state(ingestor)
}
