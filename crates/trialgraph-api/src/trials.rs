//! Handler for `GET /trials/{id}`.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use serde::Serialize;
use trialgraph_core::{
  ids::TrialId,
  model::{AssetTrialLink, Trial},
  store::GraphStore,
};
use trialgraph_ingest::Ingestor;

use crate::error::ApiError;

/// A trial together with the assets given in it.
#[derive(Debug, Serialize)]
pub struct TrialView {
  #[serde(flatten)]
  pub trial:  Trial,
  pub assets: Vec<AssetTrialLink>,
}

/// `GET /trials/{id}`
pub async fn get_one<S: GraphStore + 'static>(
  State(ingestor): State<Arc<Ingestor<S>>>,
  Path(id): Path<TrialId>,
) -> Result<Json<TrialView>, ApiError> {
  let store = ingestor.store();
  let trial = store
    .get_trial(id.clone())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("trial {id} not found")))?;
  let assets = store
    .asset_links_for_trial(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(TrialView { trial, assets }))
}
