//! Handlers for `/assets` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/assets/{id}` | 404 if not found |
//! | `PATCH` | `/assets/{id}` | Body: an asset correction; touched fields become user-confirmed |
//! | `GET`   | `/assets/{id}/relationships` | Company→Asset edges, ordered by company |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use trialgraph_core::{
  ids::AssetId,
  model::{Asset, Relationship},
  store::GraphStore,
};
use trialgraph_ingest::{AssetCorrection, Ingestor};

use crate::error::ApiError;

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /assets/{id}`
pub async fn get_one<S: GraphStore + 'static>(
  State(ingestor): State<Arc<Ingestor<S>>>,
  Path(id): Path<AssetId>,
) -> Result<Json<Asset>, ApiError> {
  let asset = ingestor
    .store()
    .get_asset(id.clone())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("asset {id} not found")))?;
  Ok(Json(asset))
}

// ─── Relationships ────────────────────────────────────────────────────────────

/// `GET /assets/{id}/relationships`
pub async fn relationships<S: GraphStore + 'static>(
  State(ingestor): State<Arc<Ingestor<S>>>,
  Path(id): Path<AssetId>,
) -> Result<Json<Vec<Relationship>>, ApiError> {
  let store = ingestor.store();
  if store
    .get_asset(id.clone())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .is_none()
  {
    return Err(ApiError::NotFound(format!("asset {id} not found")));
  }
  let rels = store
    .relationships_for_asset(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(rels))
}

// ─── Correct ──────────────────────────────────────────────────────────────────

/// `PATCH /assets/{id}`, with a body like
/// `{"modality":"bispecific","owner":{"company_name":"Immunocore"},"editor":"curator@example.org"}`
pub async fn correct<S: GraphStore + 'static>(
  State(ingestor): State<Arc<Ingestor<S>>>,
  Path(id): Path<AssetId>,
  Json(body): Json<AssetCorrection>,
) -> Result<Json<Asset>, ApiError> {
  let asset = ingestor.apply_correction(id, body).await?;
  Ok(Json(asset))
}
