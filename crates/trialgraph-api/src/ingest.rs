//! Handler for `POST /ingest`.
//!
//! Body: `{"indication":"uveal_melanoma","records":[{...}, ...]}`. Records
//! are decoded one by one, so a record of the wrong shape is reported as
//! malformed instead of failing the request.

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Deserialize;
use trialgraph_core::store::GraphStore;
use trialgraph_ingest::{CancellationToken, IngestReport, Ingestor};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct IngestBody {
  pub indication: String,
  #[serde(default)]
  pub records:    Vec<serde_json::Value>,
}

/// `POST /ingest`
pub async fn handler<S: GraphStore + 'static>(
  State(ingestor): State<Arc<Ingestor<S>>>,
  Json(body): Json<IngestBody>,
) -> Result<Json<IngestReport>, ApiError> {
  let indication = body.indication.trim();
  if indication.is_empty() {
    return Err(ApiError::BadRequest("indication must not be empty".into()));
  }
  let report = ingestor
    .ingest_json(indication, body.records, &CancellationToken::new())
    .await?;
  Ok(Json(report))
}
