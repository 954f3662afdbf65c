//! The `GraphStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `trialgraph-store-sqlite`). The merge engine and the HTTP layer depend on
//! this abstraction, not on any concrete backend.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  ids::{AssetId, CompanyId, TrialId},
  model::{Asset, AssetTrialLink, Company, Relationship, RelationshipKey, SponsorLink, Trial},
};

/// Row counts per node and edge kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCounts {
  pub companies:     u64,
  pub assets:        u64,
  pub trials:        u64,
  pub relationships: u64,
  pub sponsor_links: u64,
  pub asset_links:   u64,
}

/// Abstraction over a graph store backend.
///
/// Every write is an idempotent upsert keyed by the element's identity:
/// writing the same value twice leaves the store unchanged. Merging is the
/// caller's job; the store replaces whatever it holds under the key.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait GraphStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Companies ─────────────────────────────────────────────────────────

  fn get_company(
    &self,
    id: CompanyId,
  ) -> impl Future<Output = Result<Option<Company>, Self::Error>> + Send + '_;

  fn upsert_company(
    &self,
    company: Company,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove a company. Only used when folding it into its canonical twin;
  /// its edges must already have been moved.
  fn delete_company(
    &self,
    id: CompanyId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Assets ────────────────────────────────────────────────────────────

  fn get_asset(
    &self,
    id: AssetId,
  ) -> impl Future<Output = Result<Option<Asset>, Self::Error>> + Send + '_;

  fn upsert_asset(
    &self,
    asset: Asset,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn delete_asset(
    &self,
    id: AssetId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Trials ────────────────────────────────────────────────────────────

  fn get_trial(
    &self,
    id: TrialId,
  ) -> impl Future<Output = Result<Option<Trial>, Self::Error>> + Send + '_;

  fn upsert_trial(
    &self,
    trial: Trial,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Ownership relationships ───────────────────────────────────────────

  fn get_relationship(
    &self,
    key: RelationshipKey,
  ) -> impl Future<Output = Result<Option<Relationship>, Self::Error>> + Send + '_;

  fn upsert_relationship(
    &self,
    relationship: Relationship,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn delete_relationship(
    &self,
    key: RelationshipKey,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// All relationships pointing at an asset, ordered by company then type.
  fn relationships_for_asset(
    &self,
    id: AssetId,
  ) -> impl Future<Output = Result<Vec<Relationship>, Self::Error>> + Send + '_;

  /// All relationships from a company, ordered by asset then type.
  fn relationships_for_company(
    &self,
    id: CompanyId,
  ) -> impl Future<Output = Result<Vec<Relationship>, Self::Error>> + Send + '_;

  // ── Company → Trial ───────────────────────────────────────────────────

  fn get_sponsor_link(
    &self,
    company_id: CompanyId,
    trial_id: TrialId,
  ) -> impl Future<Output = Result<Option<SponsorLink>, Self::Error>> + Send + '_;

  fn upsert_sponsor_link(
    &self,
    link: SponsorLink,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn delete_sponsor_link(
    &self,
    company_id: CompanyId,
    trial_id: TrialId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn sponsor_links_for_company(
    &self,
    id: CompanyId,
  ) -> impl Future<Output = Result<Vec<SponsorLink>, Self::Error>> + Send + '_;

  // ── Asset → Trial ─────────────────────────────────────────────────────

  fn get_asset_link(
    &self,
    asset_id: AssetId,
    trial_id: TrialId,
  ) -> impl Future<Output = Result<Option<AssetTrialLink>, Self::Error>> + Send + '_;

  fn upsert_asset_link(
    &self,
    link: AssetTrialLink,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn delete_asset_link(
    &self,
    asset_id: AssetId,
    trial_id: TrialId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn asset_links_for_asset(
    &self,
    id: AssetId,
  ) -> impl Future<Output = Result<Vec<AssetTrialLink>, Self::Error>> + Send + '_;

  /// Links of every asset given in a trial.
  fn asset_links_for_trial(
    &self,
    id: TrialId,
  ) -> impl Future<Output = Result<Vec<AssetTrialLink>, Self::Error>> + Send + '_;

  // ── Stats ─────────────────────────────────────────────────────────────

  fn counts(&self) -> impl Future<Output = Result<GraphCounts, Self::Error>> + Send + '_;
}
