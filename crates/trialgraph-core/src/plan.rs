//! Turning a validated record into graph writes.
//!
//! Planning is the pure half of ingestion: classification, normalization,
//! enrichment and inference all run here, in memory, producing a
//! [`GraphBatch`] that the merge engine writes in one pass. Nothing in this
//! module reads the store.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::Arc,
};

use chrono::{DateTime, Utc};

use crate::{
  Result,
  classify::SponsorClassifier,
  enrich::Enricher,
  ids::{AssetId, CompanyId, TrialId},
  infer::{
    ContextSponsor, InferenceConfig, OwnershipClaim, OwnershipInference, OwnsRule, TrialContext,
  },
  model::{
    Asset, AssetTrialLink, Company, DevelopmentStage, Evidence, OrganizationType, Provenance,
    RelationType, Relationship, RelationshipKey, SourceType, SponsorLink, Trial,
  },
  normalize::{NormalizedAsset, NormalizedCompany, Normalizer},
  policy::Tracked,
  record::TrialRecord,
  reference::ReferenceData,
  report::{Issue, IssueKind},
};

// ─── Batch ───────────────────────────────────────────────────────────────────

/// Nodes and edges to merge, deduplicated by key. Entries with the same key
/// are combined with the same policy the merge engine applies against the
/// store.
#[derive(Debug, Clone, Default)]
pub struct GraphBatch {
  pub trials:        BTreeMap<TrialId, Trial>,
  pub companies:     BTreeMap<CompanyId, Company>,
  pub assets:        BTreeMap<AssetId, Asset>,
  pub relationships: BTreeMap<RelationshipKey, Relationship>,
  pub sponsor_links: BTreeMap<(CompanyId, TrialId), SponsorLink>,
  pub asset_links:   BTreeMap<(AssetId, TrialId), AssetTrialLink>,
  /// Canonical asset → ids an older run may have stored the same asset
  /// under, before the alias table knew the name.
  pub asset_folds:   BTreeMap<AssetId, BTreeSet<AssetId>>,
  pub company_folds: BTreeMap<CompanyId, BTreeSet<CompanyId>>,
  /// Every company/asset pair the rules were run on, with the relations
  /// they produced. An empty set means the rules produced no edge.
  pub evaluated:     BTreeMap<(CompanyId, AssetId), BTreeSet<RelationType>>,
  /// Restrictive `owns` rules for the batch's assets; open assets are
  /// absent.
  pub owns_rules:    BTreeMap<AssetId, OwnsRule>,
}

impl GraphBatch {
  pub fn is_empty(&self) -> bool {
    self.trials.is_empty()
      && self.companies.is_empty()
      && self.assets.is_empty()
      && self.relationships.is_empty()
  }

  pub fn add_trial(&mut self, trial: Trial) {
    match self.trials.get_mut(&trial.trial_id) {
      Some(existing) => {
        existing.merge_from(trial);
      }
      None => {
        self.trials.insert(trial.trial_id.clone(), trial);
      }
    }
  }

  pub fn add_company(&mut self, company: Company) {
    match self.companies.get_mut(&company.company_id) {
      Some(existing) => {
        existing.merge_from(company);
      }
      None => {
        self.companies.insert(company.company_id.clone(), company);
      }
    }
  }

  pub fn add_asset(&mut self, asset: Asset) {
    match self.assets.get_mut(&asset.asset_id) {
      Some(existing) => {
        existing.merge_from(asset);
      }
      None => {
        self.assets.insert(asset.asset_id.clone(), asset);
      }
    }
  }

  pub fn add_relationship(&mut self, rel: Relationship) {
    match self.relationships.get_mut(&rel.key()) {
      Some(existing) => {
        existing.merge_from(rel);
      }
      None => {
        self.relationships.insert(rel.key(), rel);
      }
    }
  }

  pub fn add_sponsor_link(&mut self, link: SponsorLink) {
    let key = (link.company_id.clone(), link.trial_id.clone());
    match self.sponsor_links.get_mut(&key) {
      Some(existing) => {
        existing.merge_from(link);
      }
      None => {
        self.sponsor_links.insert(key, link);
      }
    }
  }

  pub fn add_asset_link(&mut self, link: AssetTrialLink) {
    let key = (link.asset_id.clone(), link.trial_id.clone());
    match self.asset_links.get_mut(&key) {
      Some(existing) => {
        existing.merge_from(link);
      }
      None => {
        self.asset_links.insert(key, link);
      }
    }
  }

  /// Assets whose stored edges the current rules have an opinion on.
  pub fn judged_assets(&self) -> BTreeSet<&AssetId> {
    self
      .evaluated
      .keys()
      .map(|(_, asset_id)| asset_id)
      .chain(self.owns_rules.keys())
      .collect()
  }

  /// Whether the rules that planned this batch rule out a stored edge.
  ///
  /// A user-confirmed edge is never contradicted. Otherwise an inferred
  /// `owns` the asset's rule does not admit is stale, and so is any edge on
  /// an evaluated pair that the rules no longer produce.
  pub fn contradicts(&self, rel: &Relationship) -> bool {
    if rel.provenance == Provenance::UserConfirmed {
      return false;
    }
    let owns_barred = rel.relation == RelationType::Owns
      && self
        .owns_rules
        .get(&rel.asset_id)
        .is_some_and(|rule| !rule.admits(&rel.company_id));
    if owns_barred {
      return true;
    }
    self
      .evaluated
      .get(&(rel.company_id.clone(), rel.asset_id.clone()))
      .is_some_and(|produced| !produced.contains(&rel.relation))
  }

  /// Combine another batch into this one.
  pub fn absorb(&mut self, other: GraphBatch) {
    other.trials.into_values().for_each(|t| self.add_trial(t));
    other.companies.into_values().for_each(|c| self.add_company(c));
    other.assets.into_values().for_each(|a| self.add_asset(a));
    other.relationships.into_values().for_each(|r| self.add_relationship(r));
    other.sponsor_links.into_values().for_each(|l| self.add_sponsor_link(l));
    other.asset_links.into_values().for_each(|l| self.add_asset_link(l));
    for (id, alts) in other.asset_folds {
      self.asset_folds.entry(id).or_default().extend(alts);
    }
    for (id, alts) in other.company_folds {
      self.company_folds.entry(id).or_default().extend(alts);
    }
    for (pair, relations) in other.evaluated {
      self.evaluated.entry(pair).or_default().extend(relations);
    }
    self.owns_rules.extend(other.owns_rules);
  }
}

/// The planned writes for one record plus the non-fatal issues found while
/// planning it.
#[derive(Debug, Clone)]
pub struct TrialPlan {
  pub trial_id: TrialId,
  pub batch:    GraphBatch,
  pub claims:   Vec<OwnershipClaim>,
  pub issues:   Vec<Issue>,
}

// ─── Planner ─────────────────────────────────────────────────────────────────

/// Holds the compiled rule tables for one reference-data version.
#[derive(Debug, Clone)]
pub struct Planner {
  reference:  Arc<ReferenceData>,
  normalizer: Normalizer,
  classifier: SponsorClassifier,
  enricher:   Enricher,
  inference:  OwnershipInference,
}

impl Planner {
  pub fn new(reference: Arc<ReferenceData>, config: InferenceConfig) -> Result<Self> {
    Ok(Self {
      normalizer: Normalizer::new(reference.clone())?,
      classifier: SponsorClassifier::new(&reference)?,
      enricher: Enricher::new()?,
      inference: OwnershipInference::new(reference.clone(), config),
      reference,
    })
  }

  pub fn reference(&self) -> &Arc<ReferenceData> { &self.reference }

  pub fn normalizer(&self) -> &Normalizer { &self.normalizer }

  pub fn classifier(&self) -> &SponsorClassifier { &self.classifier }

  pub fn plan_trial(&self, record: &TrialRecord, at: DateTime<Utc>) -> TrialPlan {
    let mut batch = GraphBatch::default();
    let mut issues = Vec::new();
    let trial_ev = Evidence {
      source_type:  SourceType::TrialRecord,
      source_id:    Some(record.trial_id.to_string()),
      source_url:   record.primary_url().map(str::to_owned),
      confidence:   1.0,
      extracted_at: at,
    };
    let reference_ev = Evidence {
      source_type:  SourceType::ReferenceData,
      source_id:    Some(self.reference.version().to_owned()),
      source_url:   None,
      confidence:   1.0,
      extracted_at: at,
    };

    batch.add_trial(Trial {
      trial_id:      record.trial_id.clone(),
      title:         record.title.clone(),
      phase:         record.phase.clone(),
      status:        record.status.clone(),
      enrollment:    record.enrollment,
      sponsors:      record.sponsors.clone(),
      interventions: record.interventions.clone(),
      conditions:    record.conditions.clone(),
      source_urls:   record.source_urls.clone(),
      evidence:      vec![trial_ev.clone()],
    });

    // Sponsors.
    let mut sponsors = Vec::new();
    for sponsor in &record.sponsors {
      let classification = self.classifier.classify_explained(&sponsor.name, sponsor.class);
      if classification.is_ambiguous() {
        issues.push(Issue::new(
          IssueKind::ClassificationAmbiguous,
          sponsor.name.clone(),
          "no classification rule matched; typed as other",
        ));
      }
      let normalized = self.normalizer.normalize_company(&sponsor.name);
      let mut company = company_node(&normalized, classification.org_type, trial_ev.clone());
      if !sponsor.name.eq_ignore_ascii_case(&normalized.canonical_name) {
        company.aliases.insert(sponsor.name.clone());
      }
      self.plan_company_folds(&mut batch, &normalized, &sponsor.name);
      batch.add_company(company);
      batch.add_sponsor_link(SponsorLink {
        company_id: normalized.company_id.clone(),
        trial_id:   record.trial_id.clone(),
        role:       sponsor.role,
        evidence:   vec![trial_ev.clone()],
      });
      sponsors.push(ContextSponsor {
        company:  normalized,
        org_type: classification.org_type,
        role:     sponsor.role,
      });
    }

    // Interventions.
    let stage = record.phase.as_deref().and_then(DevelopmentStage::from_phase);
    let mut assets: Vec<NormalizedAsset> = Vec::new();
    for raw in &record.interventions {
      let Some(parsed) = self.normalizer.parse_intervention(raw) else {
        continue;
      };
      let arm: BTreeSet<AssetId> = parsed.components.iter().map(|c| c.asset_id.clone()).collect();
      for component in parsed.components {
        let mut partners = arm.clone();
        partners.remove(&component.asset_id);
        batch.add_asset_link(AssetTrialLink {
          asset_id:         component.asset_id.clone(),
          trial_id:         record.trial_id.clone(),
          raw_names:        BTreeSet::from([raw.clone()]),
          combination_with: partners,
          evidence:         vec![trial_ev.clone()],
        });
        batch.add_asset(self.asset_node(
          &component,
          record,
          stage,
          &trial_ev,
          &reference_ev,
        ));
        self.plan_asset_folds(&mut batch, &component);
        if !assets.iter().any(|a| a.asset_id == component.asset_id) {
          assets.push(component);
        }
      }
    }

    // Ownership.
    let ctx = TrialContext {
      trial_id: record.trial_id.clone(),
      sponsors,
      assets,
    };
    let claims = self.inference.infer_ownership(&ctx);
    for asset in &ctx.assets {
      let rule = self.inference.owns_rule(asset);
      if rule != OwnsRule::Open {
        batch.owns_rules.insert(asset.asset_id.clone(), rule);
      }
      for sponsor in &ctx.sponsors {
        batch
          .evaluated
          .entry((sponsor.company.company_id.clone(), asset.asset_id.clone()))
          .or_default();
      }
    }
    for claim in &claims {
      batch
        .evaluated
        .entry((claim.company_id.clone(), claim.asset_id.clone()))
        .or_default()
        .insert(claim.relation);
    }
    for claim in &claims {
      if claim.provenance == Provenance::KnownRegistry
        && !batch.companies.contains_key(&claim.company_id)
      {
        // The registered owner is a node even when it is not a sponsor.
        let owner = self.normalizer.normalize_company(&claim.company_name);
        let org_type = self.classifier.classify(&owner.canonical_name, None);
        self.plan_company_folds(&mut batch, &owner, &claim.company_name);
        batch.add_company(company_node(&owner, org_type, reference_ev.clone()));
      }

      let mut evidence = vec![trial_ev.clone().with_confidence(claim.confidence)];
      if claim.provenance == Provenance::KnownRegistry {
        evidence.push(reference_ev.clone());
      }
      batch.add_relationship(Relationship {
        company_id: claim.company_id.clone(),
        asset_id: claim.asset_id.clone(),
        relation: claim.relation,
        confidence: claim.confidence,
        provenance: claim.provenance,
        trial_ids: BTreeSet::from([claim.trial_id.clone()]),
        evidence,
      });
    }

    TrialPlan {
      trial_id: record.trial_id.clone(),
      batch,
      claims,
      issues,
    }
  }

  fn asset_node(
    &self,
    component: &NormalizedAsset,
    record: &TrialRecord,
    stage: Option<DevelopmentStage>,
    trial_ev: &Evidence,
    reference_ev: &Evidence,
  ) -> Asset {
    let mut asset = Asset::new(component.asset_id.clone(), component.canonical_name.clone());
    asset.synonyms = component.synonyms();
    asset.indications = Tracked::inferred(record.conditions.iter().cloned().collect());
    asset.stage = Tracked::inferred(stage);
    asset.evidence.push(trial_ev.clone());

    match self.reference.drug(&component.canonical_name) {
      Some(drug) => {
        asset.modality = Tracked::inferred(drug.modality);
        asset.targets = Tracked::inferred(drug.targets.iter().cloned().collect());
        asset.approved = Tracked::inferred(drug.approved);
        if drug.approved == Some(true) {
          asset.stage = Tracked::inferred(Some(DevelopmentStage::Approved));
        }
        asset.evidence.push(reference_ev.clone());
      }
      None => {
        let enrichment = self
          .enricher
          .enrich_asset(&component.canonical_name, &record.conditions);
        asset.modality = Tracked::inferred(enrichment.modality);
        asset.targets = Tracked::inferred(enrichment.targets);
      }
    }
    asset
  }

  /// Registered aliases and the observed string may have been stored as
  /// assets of their own by an earlier run.
  fn plan_asset_folds(&self, batch: &mut GraphBatch, component: &NormalizedAsset) {
    if !component.registered {
      return;
    }
    let alternates: BTreeSet<AssetId> = std::iter::once(&component.raw)
      .chain(&component.known_aliases)
      .map(|name| AssetId::from_canonical(name))
      .filter(|id| *id != component.asset_id)
      .collect();
    if !alternates.is_empty() {
      batch
        .asset_folds
        .entry(component.asset_id.clone())
        .or_default()
        .extend(alternates);
    }
  }

  fn plan_company_folds(&self, batch: &mut GraphBatch, company: &NormalizedCompany, raw: &str) {
    let alternates: BTreeSet<CompanyId> = std::iter::once(raw)
      .chain(company.known_aliases.iter().map(String::as_str))
      .map(CompanyId::from_canonical)
      .filter(|id| *id != company.company_id)
      .collect();
    if !alternates.is_empty() {
      batch
        .company_folds
        .entry(company.company_id.clone())
        .or_default()
        .extend(alternates);
    }
  }
}

fn company_node(
  normalized: &NormalizedCompany,
  org_type: OrganizationType,
  evidence: Evidence,
) -> Company {
  let mut company = Company::new(
    normalized.company_id.clone(),
    normalized.canonical_name.clone(),
    org_type,
  );
  company.aliases.extend(normalized.known_aliases.iter().cloned());
  company.evidence.push(evidence);
  company
}
