//! [`SqliteStore`], the SQLite implementation of [`GraphStore`].

use std::path::Path;

use rusqlite::types::Value;
use trialgraph_core::{
  ids::{AssetId, CompanyId, TrialId},
  model::{Asset, AssetTrialLink, Company, Relationship, RelationshipKey, SponsorLink, Trial},
  store::{GraphCounts, GraphStore},
};

use crate::{
  Result,
  encode::{
    ASSET_COLUMNS, ASSET_LINK_COLUMNS, COMPANY_COLUMNS, RELATIONSHIP_COLUMNS,
    SPONSOR_LINK_COLUMNS, TRIAL_COLUMNS, RawAsset, RawAssetLink, RawCompany, RawRelationship,
    RawSponsorLink, RawTrial,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A graph store backed by a single SQLite file.
///
/// Clones share the inner reference-counted connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a query and map every row.
  async fn fetch<T, F>(&self, sql: String, params: Vec<String>, map: F) -> Result<Vec<T>>
  where
    T: Send + 'static,
    F: Fn(&rusqlite::Row<'_>) -> rusqlite::Result<T> + Send + 'static,
  {
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), |row| map(row))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  /// Run a write and return the number of affected rows.
  async fn execute(&self, sql: &'static str, params: Vec<Value>) -> Result<usize> {
    let n = self
      .conn
      .call(move |conn| Ok(conn.execute(sql, rusqlite::params_from_iter(params))?))
      .await?;
    Ok(n)
  }
}

// ─── GraphStore impl ─────────────────────────────────────────────────────────

impl GraphStore for SqliteStore {
  type Error = crate::Error;

  // ── Companies ─────────────────────────────────────────────────────────────

  async fn get_company(&self, id: CompanyId) -> Result<Option<Company>> {
    let sql = format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE company_id = ?1");
    let raws = self.fetch(sql, vec![id.to_string()], RawCompany::from_row).await?;
    raws.into_iter().next().map(RawCompany::into_company).transpose()
  }

  async fn upsert_company(&self, company: Company) -> Result<()> {
    let raw = RawCompany::encode(&company)?;
    self
      .execute(
        "INSERT INTO companies (
           company_id, canonical_name, aliases, org_type, org_type_provenance,
           country, tickers, evidence
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT (company_id) DO UPDATE SET
           canonical_name      = excluded.canonical_name,
           aliases             = excluded.aliases,
           org_type            = excluded.org_type,
           org_type_provenance = excluded.org_type_provenance,
           country             = excluded.country,
           tickers             = excluded.tickers,
           evidence            = excluded.evidence",
        vec![
          raw.company_id.into(),
          raw.canonical_name.into(),
          raw.aliases.into(),
          raw.org_type.into(),
          raw.org_type_provenance.into(),
          raw.country.into(),
          raw.tickers.into(),
          raw.evidence.into(),
        ],
      )
      .await?;
    Ok(())
  }

  async fn delete_company(&self, id: CompanyId) -> Result<bool> {
    let n = self
      .execute("DELETE FROM companies WHERE company_id = ?1", vec![id.to_string().into()])
      .await?;
    Ok(n > 0)
  }

  // ── Assets ────────────────────────────────────────────────────────────────

  async fn get_asset(&self, id: AssetId) -> Result<Option<Asset>> {
    let sql = format!("SELECT {ASSET_COLUMNS} FROM assets WHERE asset_id = ?1");
    let raws = self.fetch(sql, vec![id.to_string()], RawAsset::from_row).await?;
    raws.into_iter().next().map(RawAsset::into_asset).transpose()
  }

  async fn upsert_asset(&self, asset: Asset) -> Result<()> {
    let raw = RawAsset::encode(&asset)?;
    self
      .execute(
        "INSERT INTO assets (
           asset_id, canonical_name, synonyms, modality, targets,
           indications, stage, approved, evidence
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT (asset_id) DO UPDATE SET
           canonical_name = excluded.canonical_name,
           synonyms       = excluded.synonyms,
           modality       = excluded.modality,
           targets        = excluded.targets,
           indications    = excluded.indications,
           stage          = excluded.stage,
           approved       = excluded.approved,
           evidence       = excluded.evidence",
        vec![
          raw.asset_id.into(),
          raw.canonical_name.into(),
          raw.synonyms.into(),
          raw.modality.into(),
          raw.targets.into(),
          raw.indications.into(),
          raw.stage.into(),
          raw.approved.into(),
          raw.evidence.into(),
        ],
      )
      .await?;
    Ok(())
  }

  async fn delete_asset(&self, id: AssetId) -> Result<bool> {
    let n = self
      .execute("DELETE FROM assets WHERE asset_id = ?1", vec![id.to_string().into()])
      .await?;
    Ok(n > 0)
  }

  // ── Trials ────────────────────────────────────────────────────────────────

  async fn get_trial(&self, id: TrialId) -> Result<Option<Trial>> {
    let sql = format!("SELECT {TRIAL_COLUMNS} FROM trials WHERE trial_id = ?1");
    let raws = self.fetch(sql, vec![id.to_string()], RawTrial::from_row).await?;
    raws.into_iter().next().map(RawTrial::into_trial).transpose()
  }

  async fn upsert_trial(&self, trial: Trial) -> Result<()> {
    let raw = RawTrial::encode(&trial)?;
    self
      .execute(
        "INSERT INTO trials (
           trial_id, title, phase, status, enrollment, sponsors,
           interventions, conditions, source_urls, evidence
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT (trial_id) DO UPDATE SET
           title         = excluded.title,
           phase         = excluded.phase,
           status        = excluded.status,
           enrollment    = excluded.enrollment,
           sponsors      = excluded.sponsors,
           interventions = excluded.interventions,
           conditions    = excluded.conditions,
           source_urls   = excluded.source_urls,
           evidence      = excluded.evidence",
        vec![
          raw.trial_id.into(),
          raw.title.into(),
          raw.phase.into(),
          raw.status.into(),
          raw.enrollment.into(),
          raw.sponsors.into(),
          raw.interventions.into(),
          raw.conditions.into(),
          raw.source_urls.into(),
          raw.evidence.into(),
        ],
      )
      .await?;
    Ok(())
  }

  // ── Ownership relationships ───────────────────────────────────────────────

  async fn get_relationship(&self, key: RelationshipKey) -> Result<Option<Relationship>> {
    let sql = format!(
      "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
       WHERE company_id = ?1 AND asset_id = ?2 AND relation = ?3"
    );
    let params = vec![
      key.company_id.to_string(),
      key.asset_id.to_string(),
      key.relation.to_string(),
    ];
    let raws = self.fetch(sql, params, RawRelationship::from_row).await?;
    raws
      .into_iter()
      .next()
      .map(RawRelationship::into_relationship)
      .transpose()
  }

  async fn upsert_relationship(&self, relationship: Relationship) -> Result<()> {
    let raw = RawRelationship::encode(&relationship)?;
    self
      .execute(
        "INSERT INTO relationships (
           company_id, asset_id, relation, confidence, provenance, trial_ids, evidence
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (company_id, asset_id, relation) DO UPDATE SET
           confidence = excluded.confidence,
           provenance = excluded.provenance,
           trial_ids  = excluded.trial_ids,
           evidence   = excluded.evidence",
        vec![
          raw.company_id.into(),
          raw.asset_id.into(),
          raw.relation.into(),
          raw.confidence.into(),
          raw.provenance.into(),
          raw.trial_ids.into(),
          raw.evidence.into(),
        ],
      )
      .await?;
    Ok(())
  }

  async fn delete_relationship(&self, key: RelationshipKey) -> Result<bool> {
    let n = self
      .execute(
        "DELETE FROM relationships WHERE company_id = ?1 AND asset_id = ?2 AND relation = ?3",
        vec![
          key.company_id.to_string().into(),
          key.asset_id.to_string().into(),
          key.relation.to_string().into(),
        ],
      )
      .await?;
    Ok(n > 0)
  }

  async fn relationships_for_asset(&self, id: AssetId) -> Result<Vec<Relationship>> {
    let sql = format!(
      "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
       WHERE asset_id = ?1 ORDER BY company_id, relation"
    );
    let raws = self.fetch(sql, vec![id.to_string()], RawRelationship::from_row).await?;
    raws.into_iter().map(RawRelationship::into_relationship).collect()
  }

  async fn relationships_for_company(&self, id: CompanyId) -> Result<Vec<Relationship>> {
    let sql = format!(
      "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
       WHERE company_id = ?1 ORDER BY asset_id, relation"
    );
    let raws = self.fetch(sql, vec![id.to_string()], RawRelationship::from_row).await?;
    raws.into_iter().map(RawRelationship::into_relationship).collect()
  }

  // ── Company → Trial ───────────────────────────────────────────────────────

  async fn get_sponsor_link(
    &self,
    company_id: CompanyId,
    trial_id: TrialId,
  ) -> Result<Option<SponsorLink>> {
    let sql = format!(
      "SELECT {SPONSOR_LINK_COLUMNS} FROM sponsor_links WHERE company_id = ?1 AND trial_id = ?2"
    );
    let params = vec![company_id.to_string(), trial_id.to_string()];
    let raws = self.fetch(sql, params, RawSponsorLink::from_row).await?;
    raws.into_iter().next().map(RawSponsorLink::into_link).transpose()
  }

  async fn upsert_sponsor_link(&self, link: SponsorLink) -> Result<()> {
    let raw = RawSponsorLink::encode(&link)?;
    self
      .execute(
        "INSERT INTO sponsor_links (company_id, trial_id, role, evidence)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (company_id, trial_id) DO UPDATE SET
           role     = excluded.role,
           evidence = excluded.evidence",
        vec![
          raw.company_id.into(),
          raw.trial_id.into(),
          raw.role.into(),
          raw.evidence.into(),
        ],
      )
      .await?;
    Ok(())
  }

  async fn delete_sponsor_link(&self, company_id: CompanyId, trial_id: TrialId) -> Result<bool> {
    let n = self
      .execute(
        "DELETE FROM sponsor_links WHERE company_id = ?1 AND trial_id = ?2",
        vec![company_id.to_string().into(), trial_id.to_string().into()],
      )
      .await?;
    Ok(n > 0)
  }

  async fn sponsor_links_for_company(&self, id: CompanyId) -> Result<Vec<SponsorLink>> {
    let sql = format!(
      "SELECT {SPONSOR_LINK_COLUMNS} FROM sponsor_links WHERE company_id = ?1 ORDER BY trial_id"
    );
    let raws = self.fetch(sql, vec![id.to_string()], RawSponsorLink::from_row).await?;
    raws.into_iter().map(RawSponsorLink::into_link).collect()
  }

  // ── Asset → Trial ─────────────────────────────────────────────────────────

  async fn get_asset_link(
    &self,
    asset_id: AssetId,
    trial_id: TrialId,
  ) -> Result<Option<AssetTrialLink>> {
    let sql = format!(
      "SELECT {ASSET_LINK_COLUMNS} FROM asset_links WHERE asset_id = ?1 AND trial_id = ?2"
    );
    let params = vec![asset_id.to_string(), trial_id.to_string()];
    let raws = self.fetch(sql, params, RawAssetLink::from_row).await?;
    raws.into_iter().next().map(RawAssetLink::into_link).transpose()
  }

  async fn upsert_asset_link(&self, link: AssetTrialLink) -> Result<()> {
    let raw = RawAssetLink::encode(&link)?;
    self
      .execute(
        "INSERT INTO asset_links (asset_id, trial_id, raw_names, combination_with, evidence)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (asset_id, trial_id) DO UPDATE SET
           raw_names        = excluded.raw_names,
           combination_with = excluded.combination_with,
           evidence         = excluded.evidence",
        vec![
          raw.asset_id.into(),
          raw.trial_id.into(),
          raw.raw_names.into(),
          raw.combination_with.into(),
          raw.evidence.into(),
        ],
      )
      .await?;
    Ok(())
  }

  async fn delete_asset_link(&self, asset_id: AssetId, trial_id: TrialId) -> Result<bool> {
    let n = self
      .execute(
        "DELETE FROM asset_links WHERE asset_id = ?1 AND trial_id = ?2",
        vec![asset_id.to_string().into(), trial_id.to_string().into()],
      )
      .await?;
    Ok(n > 0)
  }

  async fn asset_links_for_asset(&self, id: AssetId) -> Result<Vec<AssetTrialLink>> {
    let sql =
      format!("SELECT {ASSET_LINK_COLUMNS} FROM asset_links WHERE asset_id = ?1 ORDER BY trial_id");
    let raws = self.fetch(sql, vec![id.to_string()], RawAssetLink::from_row).await?;
    raws.into_iter().map(RawAssetLink::into_link).collect()
  }

  async fn asset_links_for_trial(&self, id: TrialId) -> Result<Vec<AssetTrialLink>> {
    let sql =
      format!("SELECT {ASSET_LINK_COLUMNS} FROM asset_links WHERE trial_id = ?1 ORDER BY asset_id");
    let raws = self.fetch(sql, vec![id.to_string()], RawAssetLink::from_row).await?;
    raws.into_iter().map(RawAssetLink::into_link).collect()
  }

  // ── Stats ─────────────────────────────────────────────────────────────────

  async fn counts(&self) -> Result<GraphCounts> {
    let sql = "SELECT
         (SELECT COUNT(*) FROM companies),
         (SELECT COUNT(*) FROM assets),
         (SELECT COUNT(*) FROM trials),
         (SELECT COUNT(*) FROM relationships),
         (SELECT COUNT(*) FROM sponsor_links),
         (SELECT COUNT(*) FROM asset_links)"
      .to_owned();
    let rows = self
      .fetch(sql, Vec::new(), |row| {
        Ok(GraphCounts {
          companies:     row.get::<_, i64>(0)? as u64,
          assets:        row.get::<_, i64>(1)? as u64,
          trials:        row.get::<_, i64>(2)? as u64,
          relationships: row.get::<_, i64>(3)? as u64,
          sponsor_links: row.get::<_, i64>(4)? as u64,
          asset_links:   row.get::<_, i64>(5)? as u64,
        })
      })
      .await?;
    Ok(rows.into_iter().next().unwrap_or_default())
  }
}
