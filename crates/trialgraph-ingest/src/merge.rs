//! The graph merge engine.
//!
//! Writes a [`GraphBatch`] into a [`GraphStore`]. Every element is read,
//! merged with the field-level policy from `trialgraph_core::policy`, and
//! written back only when it changed, so merging the same batch twice is a
//! no-op. Before the regular upserts, fold candidates found during planning
//! are resolved: an asset or company stored under an id that now resolves
//! to a different canonical id is absorbed into the canonical node and its
//! edges are rekeyed. Stored inferred edges the current rules contradict
//! are then retracted, so a reference-table update that registers or
//! generalizes an asset does not leave its old heuristic owner behind.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::Arc,
};

use tracing::{debug, info, warn};
use trialgraph_core::{
  ids::{AssetId, CompanyId},
  model::{Asset, AssetTrialLink, Company, Relationship, SponsorLink, Trial, append_evidence},
  plan::GraphBatch,
  policy::OverrideConflict,
  report::{Counts, Issue, IssueKind, MergeReport},
  store::GraphStore,
};

use crate::{
  Error, Result,
  locks::{LockRegistry, asset_lock, company_lock},
};

pub struct MergeEngine<S> {
  store:       Arc<S>,
  locks:       Arc<LockRegistry>,
  max_samples: usize,
}

impl<S: GraphStore> MergeEngine<S> {
  pub fn new(store: Arc<S>, locks: Arc<LockRegistry>) -> Self {
    Self { store, locks, max_samples: 20 }
  }

  /// Bound the sampled reasons kept per issue kind.
  pub fn with_max_samples(mut self, max_samples: usize) -> Self {
    self.max_samples = max_samples;
    self
  }

  /// Merge one batch. Holds the lock of every company and asset the batch
  /// touches until the last write.
  pub async fn merge(&self, batch: GraphBatch) -> Result<MergeReport> {
    let mut report = MergeReport::with_max_samples(self.max_samples);
    let _guards = self.locks.lock_entities(lock_keys(&batch)).await;

    for (canonical, alternates) in &batch.asset_folds {
      for alt in alternates {
        self
          .fold_asset(canonical, alt, batch.assets.get(canonical), &mut report)
          .await?;
      }
    }
    for (canonical, alternates) in &batch.company_folds {
      for alt in alternates {
        self
          .fold_company(canonical, alt, batch.companies.get(canonical), &mut report)
          .await?;
      }
    }

    self.retract_stale(&batch, &mut report).await?;

    for trial in batch.trials.into_values() {
      self.merge_trial(trial, &mut report).await?;
    }
    for company in batch.companies.into_values() {
      self.merge_company(company, &mut report).await?;
    }
    for asset in batch.assets.into_values() {
      self.merge_asset(asset, &mut report).await?;
    }
    for rel in batch.relationships.into_values() {
      self.merge_relationship(rel, &mut report).await?;
    }
    for link in batch.sponsor_links.into_values() {
      self.merge_sponsor_link(link, &mut report.links).await?;
    }
    for link in batch.asset_links.into_values() {
      self.merge_asset_link(link, &mut report.links).await?;
    }

    debug!(
      created = report.created(),
      updated = report.updated(),
      conflicts = report.override_conflicts.len(),
      "batch merged"
    );
    Ok(report)
  }

  // ─── Nodes ─────────────────────────────────────────────────────────────────

  async fn merge_trial(&self, trial: Trial, report: &mut MergeReport) -> Result<()> {
    let stored = self
      .store
      .get_trial(trial.trial_id.clone())
      .await
      .map_err(Error::store)?;
    match stored {
      None => {
        self.store.upsert_trial(trial).await.map_err(Error::store)?;
        report.trials.created += 1;
      }
      Some(mut stored) => {
        if stored.merge_from(trial) {
          self.store.upsert_trial(stored).await.map_err(Error::store)?;
          report.trials.updated += 1;
        } else {
          report.trials.skipped += 1;
        }
      }
    }
    Ok(())
  }

  async fn merge_company(&self, company: Company, report: &mut MergeReport) -> Result<()> {
    let stored = self
      .store
      .get_company(company.company_id.clone())
      .await
      .map_err(Error::store)?;
    match stored {
      None => {
        self.store.upsert_company(company).await.map_err(Error::store)?;
        report.companies.created += 1;
      }
      Some(mut stored) => {
        let outcome = stored.merge_from(company);
        record_conflicts(outcome.conflicts, report);
        if outcome.changed {
          self.store.upsert_company(stored).await.map_err(Error::store)?;
          report.companies.updated += 1;
        } else {
          report.companies.skipped += 1;
        }
      }
    }
    Ok(())
  }

  async fn merge_asset(&self, asset: Asset, report: &mut MergeReport) -> Result<()> {
    let stored = self
      .store
      .get_asset(asset.asset_id.clone())
      .await
      .map_err(Error::store)?;
    match stored {
      None => {
        self.store.upsert_asset(asset).await.map_err(Error::store)?;
        report.assets.created += 1;
      }
      Some(mut stored) => {
        let outcome = stored.merge_from(asset);
        record_conflicts(outcome.conflicts, report);
        if outcome.changed {
          self.store.upsert_asset(stored).await.map_err(Error::store)?;
          report.assets.updated += 1;
        } else {
          report.assets.skipped += 1;
        }
      }
    }
    Ok(())
  }

  // ─── Edges ─────────────────────────────────────────────────────────────────

  async fn merge_relationship(&self, rel: Relationship, report: &mut MergeReport) -> Result<()> {
    if !rel.is_user_confirmed() {
      // A confirmed edge of another type for the same pair wins outright.
      let siblings = self
        .store
        .relationships_for_asset(rel.asset_id.clone())
        .await
        .map_err(Error::store)?;
      let confirmed = siblings.iter().find(|r| {
        r.company_id == rel.company_id && r.relation != rel.relation && r.is_user_confirmed()
      });
      if let Some(confirmed) = confirmed {
        record_conflicts(
          vec![OverrideConflict {
            entity_id: format!("{}->{}", rel.company_id, rel.asset_id),
            field:     "relation".into(),
            stored:    serde_json::json!(confirmed.relation),
            incoming:  serde_json::json!(rel.relation),
          }],
          report,
        );
        report.relationships.skipped += 1;
        return Ok(());
      }
    }

    let stored = self
      .store
      .get_relationship(rel.key())
      .await
      .map_err(Error::store)?;
    match stored {
      None => {
        self.store.upsert_relationship(rel).await.map_err(Error::store)?;
        report.relationships.created += 1;
      }
      Some(mut stored) => {
        let outcome = stored.merge_from(rel);
        record_conflicts(outcome.conflicts, report);
        if outcome.changed {
          self.store.upsert_relationship(stored).await.map_err(Error::store)?;
          report.relationships.updated += 1;
        } else {
          report.relationships.skipped += 1;
        }
      }
    }
    Ok(())
  }

  async fn merge_sponsor_link(&self, link: SponsorLink, counts: &mut Counts) -> Result<()> {
    let stored = self
      .store
      .get_sponsor_link(link.company_id.clone(), link.trial_id.clone())
      .await
      .map_err(Error::store)?;
    match stored {
      None => {
        self.store.upsert_sponsor_link(link).await.map_err(Error::store)?;
        counts.created += 1;
      }
      Some(mut stored) => {
        if stored.merge_from(link) {
          self.store.upsert_sponsor_link(stored).await.map_err(Error::store)?;
          counts.updated += 1;
        } else {
          counts.skipped += 1;
        }
      }
    }
    Ok(())
  }

  async fn merge_asset_link(&self, link: AssetTrialLink, counts: &mut Counts) -> Result<()> {
    let stored = self
      .store
      .get_asset_link(link.asset_id.clone(), link.trial_id.clone())
      .await
      .map_err(Error::store)?;
    match stored {
      None => {
        self.store.upsert_asset_link(link).await.map_err(Error::store)?;
        counts.created += 1;
      }
      Some(mut stored) => {
        if stored.merge_from(link) {
          self.store.upsert_asset_link(stored).await.map_err(Error::store)?;
          counts.updated += 1;
        } else {
          counts.skipped += 1;
        }
      }
    }
    Ok(())
  }

  /// Delete stored edges on the batch's assets that the batch's rules rule
  /// out. Runs after the folds so edges carried over from an alternate id
  /// are judged too.
  async fn retract_stale(&self, batch: &GraphBatch, report: &mut MergeReport) -> Result<()> {
    for asset_id in batch.judged_assets() {
      for rel in self
        .store
        .relationships_for_asset(asset_id.clone())
        .await
        .map_err(Error::store)?
      {
        if !batch.contradicts(&rel) {
          continue;
        }
        self.store.delete_relationship(rel.key()).await.map_err(Error::store)?;
        report.relationships_retracted += 1;
        info!(
          company = %rel.company_id,
          asset = %rel.asset_id,
          relation = %rel.relation,
          provenance = ?rel.provenance,
          "retracted stale relationship"
        );
      }
    }
    Ok(())
  }

  // ─── Folds ─────────────────────────────────────────────────────────────────

  /// Absorb the asset stored under `alt` into `canonical`, then move its
  /// relationships and trial links.
  async fn fold_asset(
    &self,
    canonical: &AssetId,
    alt: &AssetId,
    planned: Option<&Asset>,
    report: &mut MergeReport,
  ) -> Result<()> {
    let Some(old) = self.store.get_asset(alt.clone()).await.map_err(Error::store)? else {
      return Ok(());
    };
    let stored = self
      .store
      .get_asset(canonical.clone())
      .await
      .map_err(Error::store)?;
    let mut target = match (stored, planned) {
      (Some(stored), _) => stored,
      (None, Some(planned)) => {
        report.assets.created += 1;
        planned.clone()
      }
      (None, None) => return Ok(()),
    };

    let old_name = old.canonical_name.clone();
    target.absorb(old);
    let target_name = target.canonical_name.clone();
    self.store.upsert_asset(target).await.map_err(Error::store)?;

    for mut rel in self
      .store
      .relationships_for_asset(alt.clone())
      .await
      .map_err(Error::store)?
    {
      self.store.delete_relationship(rel.key()).await.map_err(Error::store)?;
      rel.asset_id = canonical.clone();
      self.put_relationship(rel).await?;
    }

    for mut link in self
      .store
      .asset_links_for_asset(alt.clone())
      .await
      .map_err(Error::store)?
    {
      self
        .store
        .delete_asset_link(alt.clone(), link.trial_id.clone())
        .await
        .map_err(Error::store)?;
      self.repoint_partners(&link, alt, canonical).await?;
      link.asset_id = canonical.clone();
      link.combination_with.remove(canonical);
      self.put_asset_link(link).await?;
    }

    self.store.delete_asset(alt.clone()).await.map_err(Error::store)?;
    report.assets_folded += 1;
    info!(from = %alt, into = %canonical, "folded asset {old_name:?} into {target_name:?}");
    report.issues.push(Issue::new(
      IssueKind::NormalizationCollision,
      canonical.to_string(),
      format!("asset {old_name:?} folded into {target_name:?}"),
    ));
    Ok(())
  }

  /// Other assets in the same trial that list `alt` as a combination
  /// partner now point at `canonical`.
  async fn repoint_partners(
    &self,
    link: &AssetTrialLink,
    alt: &AssetId,
    canonical: &AssetId,
  ) -> Result<()> {
    for mut partner in self
      .store
      .asset_links_for_trial(link.trial_id.clone())
      .await
      .map_err(Error::store)?
    {
      if !partner.combination_with.remove(alt) {
        continue;
      }
      if partner.asset_id != *canonical {
        partner.combination_with.insert(canonical.clone());
      }
      self.store.upsert_asset_link(partner).await.map_err(Error::store)?;
    }
    Ok(())
  }

  async fn fold_company(
    &self,
    canonical: &CompanyId,
    alt: &CompanyId,
    planned: Option<&Company>,
    report: &mut MergeReport,
  ) -> Result<()> {
    let Some(old) = self.store.get_company(alt.clone()).await.map_err(Error::store)? else {
      return Ok(());
    };
    let stored = self
      .store
      .get_company(canonical.clone())
      .await
      .map_err(Error::store)?;
    let mut target = match (stored, planned) {
      (Some(stored), _) => stored,
      (None, Some(planned)) => {
        report.companies.created += 1;
        planned.clone()
      }
      (None, None) => return Ok(()),
    };

    let old_name = old.canonical_name.clone();
    target.absorb(old);
    let target_name = target.canonical_name.clone();
    self.store.upsert_company(target).await.map_err(Error::store)?;

    for mut rel in self
      .store
      .relationships_for_company(alt.clone())
      .await
      .map_err(Error::store)?
    {
      self.store.delete_relationship(rel.key()).await.map_err(Error::store)?;
      rel.company_id = canonical.clone();
      self.put_relationship(rel).await?;
    }

    for mut link in self
      .store
      .sponsor_links_for_company(alt.clone())
      .await
      .map_err(Error::store)?
    {
      self
        .store
        .delete_sponsor_link(alt.clone(), link.trial_id.clone())
        .await
        .map_err(Error::store)?;
      link.company_id = canonical.clone();
      let existing = self
        .store
        .get_sponsor_link(canonical.clone(), link.trial_id.clone())
        .await
        .map_err(Error::store)?;
      let merged = match existing {
        Some(mut existing) => {
          existing.merge_from(link);
          existing
        }
        None => link,
      };
      self.store.upsert_sponsor_link(merged).await.map_err(Error::store)?;
    }

    self.store.delete_company(alt.clone()).await.map_err(Error::store)?;
    report.companies_folded += 1;
    info!(from = %alt, into = %canonical, "folded company {old_name:?} into {target_name:?}");
    report.issues.push(Issue::new(
      IssueKind::NormalizationCollision,
      canonical.to_string(),
      format!("company {old_name:?} folded into {target_name:?}"),
    ));
    Ok(())
  }

  /// Write a rekeyed edge, combining it with any edge already under the key.
  /// The confirmed edge wins, then the more confident one; supporting trials
  /// and evidence are pooled.
  async fn put_relationship(&self, rel: Relationship) -> Result<()> {
    let existing = self
      .store
      .get_relationship(rel.key())
      .await
      .map_err(Error::store)?;
    let merged = match existing {
      Some(existing) => {
        let keep_existing = existing.is_user_confirmed()
          || (!rel.is_user_confirmed() && existing.confidence >= rel.confidence);
        let (mut winner, loser) = if keep_existing { (existing, rel) } else { (rel, existing) };
        winner.trial_ids.extend(loser.trial_ids);
        append_evidence(&mut winner.evidence, loser.evidence);
        winner
      }
      None => rel,
    };
    self.store.upsert_relationship(merged).await.map_err(Error::store)
  }

  async fn put_asset_link(&self, link: AssetTrialLink) -> Result<()> {
    let existing = self
      .store
      .get_asset_link(link.asset_id.clone(), link.trial_id.clone())
      .await
      .map_err(Error::store)?;
    let merged = match existing {
      Some(mut existing) => {
        existing.merge_from(link);
        existing
      }
      None => link,
    };
    self.store.upsert_asset_link(merged).await.map_err(Error::store)
  }
}

fn record_conflicts(conflicts: Vec<OverrideConflict>, report: &mut MergeReport) {
  for conflict in conflicts {
    warn!(
      entity = %conflict.entity_id,
      field = %conflict.field,
      stored = %conflict.stored,
      incoming = %conflict.incoming,
      "inferred value discarded in favour of user-confirmed value"
    );
    report.issues.push(Issue::from(&conflict));
    report.override_conflicts.push(conflict);
  }
}

fn lock_keys(batch: &GraphBatch) -> BTreeSet<String> {
  let companies = batch
    .companies
    .keys()
    .chain(batch.relationships.keys().map(|k| &k.company_id))
    .chain(flatten(&batch.company_folds))
    .map(company_lock);
  let assets = batch
    .assets
    .keys()
    .chain(batch.relationships.keys().map(|k| &k.asset_id))
    .chain(flatten(&batch.asset_folds))
    .map(asset_lock);
  companies.chain(assets).collect()
}

/// Canonical ids and their alternates.
fn flatten<K>(folds: &BTreeMap<K, BTreeSet<K>>) -> impl Iterator<Item = &K> {
  folds.iter().flat_map(|(canonical, alts)| std::iter::once(canonical).chain(alts))
}
