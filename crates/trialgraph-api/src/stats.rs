//! `GET /stats` and `GET /health`.

use std::sync::Arc;

use axum::{Json, extract::State};
use serde_json::{Value, json};
use trialgraph_core::store::{GraphCounts, GraphStore};
use trialgraph_ingest::Ingestor;

use crate::error::ApiError;

/// `GET /stats`: node and edge counts.
pub async fn handler<S: GraphStore + 'static>(
  State(ingestor): State<Arc<Ingestor<S>>>,
) -> Result<Json<GraphCounts>, ApiError> {
  let counts = ingestor
    .store()
    .counts()
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(counts))
}

/// `GET /health`
pub async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }
