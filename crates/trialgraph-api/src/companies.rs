//! Handlers for `/companies` endpoints.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use trialgraph_core::{
  ids::CompanyId,
  model::{Company, Relationship},
  store::GraphStore,
};
use trialgraph_ingest::Ingestor;

use crate::error::ApiError;

/// `GET /companies/{id}`
pub async fn get_one<S: GraphStore + 'static>(
  State(ingestor): State<Arc<Ingestor<S>>>,
  Path(id): Path<CompanyId>,
) -> Result<Json<Company>, ApiError> {
  let company = ingestor
    .store()
    .get_company(id.clone())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("company {id} not found")))?;
  Ok(Json(company))
}

/// `GET /companies/{id}/relationships`
pub async fn relationships<S: GraphStore + 'static>(
  State(ingestor): State<Arc<Ingestor<S>>>,
  Path(id): Path<CompanyId>,
) -> Result<Json<Vec<Relationship>>, ApiError> {
  let store = ingestor.store();
  if store
    .get_company(id.clone())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .is_none()
  {
    return Err(ApiError::NotFound(format!("company {id} not found")));
  }
  let rels = store
    .relationships_for_company(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(rels))
}
