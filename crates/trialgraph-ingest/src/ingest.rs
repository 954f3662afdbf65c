//! Batch ingestion and corrections.
//!
//! One [`Ingestor::ingest`] call is one run for one indication: the
//! reference tables are fetched once, every record is validated and planned
//! in memory, and each planned record is merged under the indication lock.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use trialgraph_core::{
  ids::{AssetId, CompanyId},
  infer::InferenceConfig,
  model::{
    Asset, Company, Evidence, Provenance, Relationship, RelationshipKey, append_evidence,
  },
  plan::Planner,
  policy::Tracked,
  record::{RawTrialRecord, RecordMalformed},
  reference::ReferenceSource,
  report::{Issue, IssueKind, MergeReport},
  store::GraphStore,
};
use uuid::Uuid;

use crate::{
  Error, Result,
  cancel::CancellationToken,
  correction::{AssetCorrection, OwnerRef, correction_evidence, superseded_by},
  locks::{LockRegistry, asset_lock, company_lock},
  merge::MergeEngine,
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
  pub inference:      InferenceConfig,
  /// Sampled reasons kept per issue kind in a batch report.
  pub report_samples: usize,
}

impl Default for IngestConfig {
  fn default() -> Self {
    Self { inference: InferenceConfig::default(), report_samples: 20 }
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// Summary of one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
  pub run_id:              Uuid,
  pub indication:          String,
  pub reference_version:   String,
  pub records_received:    usize,
  pub records_merged:      usize,
  pub records_malformed:   usize,
  /// Records left untouched because the run was cancelled.
  pub records_not_started: usize,
  pub cancelled:           bool,
  pub merge:               MergeReport,
}

// ─── Ingestor ────────────────────────────────────────────────────────────────

pub struct Ingestor<S> {
  store:     Arc<S>,
  reference: Arc<dyn ReferenceSource>,
  config:    IngestConfig,
  locks:     Arc<LockRegistry>,
}

impl<S: GraphStore> Ingestor<S> {
  pub fn new(store: Arc<S>, reference: Arc<dyn ReferenceSource>, config: IngestConfig) -> Self {
    Self { store, reference, config, locks: Arc::new(LockRegistry::new()) }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn config(&self) -> &IngestConfig { &self.config }

  fn planner(&self) -> Result<Planner> {
    let reference = self
      .reference
      .current()
      .map_err(Error::ReferenceDataUnavailable)?;
    Ok(Planner::new(reference, self.config.inference)?)
  }

  /// Ingest a batch of records for one indication.
  ///
  /// Malformed records are skipped and reported. Only unavailable reference
  /// data or a store failure aborts the run; records merged before a store
  /// failure stay merged, and re-running the batch completes it.
  pub async fn ingest(
    &self,
    indication: &str,
    records: Vec<RawTrialRecord>,
    cancel: &CancellationToken,
  ) -> Result<IngestReport> {
    self
      .run(indication, records.into_iter().map(Ok).collect(), cancel)
      .await
  }

  /// Like [`Ingestor::ingest`], for records that have not been decoded yet.
  /// A record of the wrong shape counts as malformed.
  pub async fn ingest_json(
    &self,
    indication: &str,
    records: Vec<serde_json::Value>,
    cancel: &CancellationToken,
  ) -> Result<IngestReport> {
    let decoded = records.into_iter().map(RawTrialRecord::from_value).collect();
    self.run(indication, decoded, cancel).await
  }

  async fn run(
    &self,
    indication: &str,
    records: Vec<Result<RawTrialRecord, RecordMalformed>>,
    cancel: &CancellationToken,
  ) -> Result<IngestReport> {
    let run_id = Uuid::new_v4();
    let planner = self.planner()?;
    let engine = MergeEngine::new(self.store.clone(), self.locks.clone())
      .with_max_samples(self.config.report_samples);

    let mut report = IngestReport {
      run_id,
      indication: indication.to_owned(),
      reference_version: planner.reference().version().to_owned(),
      records_received: records.len(),
      records_merged: 0,
      records_malformed: 0,
      records_not_started: 0,
      cancelled: false,
      merge: MergeReport::with_max_samples(self.config.report_samples),
    };

    let _indication = self.locks.lock_indication(indication).await;
    info!(
      %run_id,
      indication,
      reference = %report.reference_version,
      records = report.records_received,
      "ingestion started"
    );

    let total = records.len();
    for (i, record) in records.into_iter().enumerate() {
      if cancel.is_cancelled() {
        report.cancelled = true;
        report.records_not_started = total - i;
        warn!(%run_id, remaining = total - i, "ingestion cancelled");
        break;
      }

      let record = match record.and_then(RawTrialRecord::validate) {
        Ok(record) => record,
        Err(malformed) => {
          warn!(%run_id, "{malformed}");
          report.records_malformed += 1;
          report.merge.issues.push(Issue::new(
            IssueKind::RecordMalformed,
            malformed.trial_id.unwrap_or_else(|| "<no id>".into()),
            malformed.reason,
          ));
          continue;
        }
      };

      let plan = planner.plan_trial(&record, Utc::now());
      for issue in plan.issues {
        report.merge.issues.push(issue);
      }
      let merged = engine.merge(plan.batch).await?;
      report.merge.absorb(merged);
      report.records_merged += 1;
    }

    let merge = &report.merge;
    info!(
      %run_id,
      indication,
      merged = report.records_merged,
      malformed = report.records_malformed,
      created = merge.created(),
      updated = merge.updated(),
      assets_folded = merge.assets_folded,
      companies_folded = merge.companies_folded,
      retracted = merge.relationships_retracted,
      conflicts = merge.override_conflicts.len(),
      cancelled = report.cancelled,
      "ingestion finished"
    );
    Ok(report)
  }

  // ─── Corrections ───────────────────────────────────────────────────────────

  /// Apply a user correction to an asset. Every touched field, and the
  /// owner relationship if given, becomes user-confirmed.
  pub async fn apply_correction(
    &self,
    asset_id: AssetId,
    correction: AssetCorrection,
  ) -> Result<Asset> {
    correction.validate()?;
    let at = Utc::now();
    let evidence = correction_evidence(correction.editor.as_deref(), at);

    // Resolve the owner before locking so the company lock is known.
    let owner = match &correction.owner {
      None => None,
      Some(owner) => Some((self.resolve_owner(owner.owner_ref()?)?, owner.relation)),
    };

    let mut keys = vec![asset_lock(&asset_id)];
    if let Some((company, _)) = &owner {
      keys.push(company_lock(&company.company_id));
    }
    let _guards = self.locks.lock_entities(keys).await;

    let mut asset = self
      .store
      .get_asset(asset_id.clone())
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::AssetNotFound(asset_id.clone()))?;

    // Everything that can reject the correction is read before the first
    // write.
    let owner = match owner {
      None => None,
      Some((owner, relation)) => Some((self.owner_company(owner).await?, relation)),
    };

    if let Some(modality) = correction.modality {
      asset.modality = Tracked::confirmed(Some(modality));
    }
    if let Some(targets) = correction.targets {
      asset.targets = Tracked::confirmed(targets);
    }
    append_evidence(&mut asset.evidence, [evidence.clone()]);
    self.store.upsert_asset(asset.clone()).await.map_err(Error::store)?;

    if let Some((mut company, relation)) = owner {
      let key = RelationshipKey {
        company_id: company.company_id.clone(),
        asset_id:   asset_id.clone(),
        relation,
      };
      append_evidence(&mut company.evidence, [evidence.clone()]);
      self.store.upsert_company(company).await.map_err(Error::store)?;
      self.confirm_relationship(key, &evidence).await?;
    }

    info!(asset = %asset_id, editor = ?correction.editor, "correction applied");
    Ok(asset)
  }

  fn resolve_owner(&self, owner: OwnerRef<'_>) -> Result<PlannedOwner> {
    match owner {
      OwnerRef::Id(id) => Ok(PlannedOwner { company_id: id.clone(), new: None }),
      OwnerRef::Name(name) => {
        let planner = self.planner()?;
        let normalized = planner.normalizer().normalize_company(name);
        let org_type = planner.classifier().classify(name, None);
        let mut company = Company::new(
          normalized.company_id.clone(),
          normalized.canonical_name.clone(),
          org_type,
        );
        company.aliases.extend(normalized.known_aliases);
        if !name.eq_ignore_ascii_case(&company.canonical_name) {
          company.aliases.insert(name.to_owned());
        }
        Ok(PlannedOwner { company_id: normalized.company_id, new: Some(company) })
      }
    }
  }

  /// The stored owner with any new aliases, or the planned new company.
  async fn owner_company(&self, owner: PlannedOwner) -> Result<Company> {
    let stored = self
      .store
      .get_company(owner.company_id.clone())
      .await
      .map_err(Error::store)?;
    match (stored, owner.new) {
      (Some(mut stored), new) => {
        if let Some(new) = new {
          stored.aliases.extend(new.aliases);
        }
        Ok(stored)
      }
      (None, Some(new)) => {
        info!(company = %new.company_id, name = %new.canonical_name, "creating owner company");
        Ok(new)
      }
      (None, None) => Err(Error::CompanyNotFound(owner.company_id)),
    }
  }

  async fn confirm_relationship(
    &self,
    key: RelationshipKey,
    evidence: &Evidence,
  ) -> Result<()> {
    let existing = self
      .store
      .get_relationship(key.clone())
      .await
      .map_err(Error::store)?;
    let mut rel = existing.unwrap_or_else(|| Relationship {
      company_id: key.company_id.clone(),
      asset_id:   key.asset_id.clone(),
      relation:   key.relation,
      confidence: 1.0,
      provenance: Provenance::UserConfirmed,
      trial_ids:  Default::default(),
      evidence:   Vec::new(),
    });
    rel.confidence = 1.0;
    rel.provenance = Provenance::UserConfirmed;
    append_evidence(&mut rel.evidence, [evidence.clone()]);
    self.store.upsert_relationship(rel).await.map_err(Error::store)?;

    for other in self
      .store
      .relationships_for_asset(key.asset_id.clone())
      .await
      .map_err(Error::store)?
    {
      if superseded_by(&key, &other) {
        self.store.delete_relationship(other.key()).await.map_err(Error::store)?;
        info!(
          company = %other.company_id,
          asset = %other.asset_id,
          relation = %other.relation,
          "inferred edge removed by confirmed {}",
          key.relation
        );
      }
    }
    Ok(())
  }
}

/// The owner named by a correction: an existing id, or a new company to
/// create if nothing is stored under its id yet.
struct PlannedOwner {
  company_id: CompanyId,
  new:        Option<Company>,
}
