//! Graph node and edge types.
//!
//! Companies and assets are merged across ingestion runs, so each of their
//! mutable fields is wrapped in a [`Tracked`] carrying its provenance. Trials
//! are plain records keyed by the external identifier and updated in place.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
  ids::{AssetId, CompanyId, TrialId},
  policy::Tracked,
};

// ─── Enumerations ────────────────────────────────────────────────────────────

/// Organization type of a sponsor or owner.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OrganizationType {
  Industry,
  Academic,
  Nonprofit,
  Investigator,
  Government,
  Other,
}

/// Upstream sponsor-class hint, as published by the trial registry.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum SponsorClass {
  Industry,
  Nih,
  Fed,
  OtherGov,
  Indiv,
  Network,
  Ambig,
  Other,
  Unknown,
}

impl SponsorClass {
  /// Parse a raw hint; unrecognised or blank values are treated as absent.
  pub fn parse(raw: &str) -> Option<Self> { raw.trim().parse().ok() }
}

/// The role a sponsor plays in a trial.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SponsorRole {
  #[serde(alias = "lead")]
  LeadSponsor,
  #[default]
  Collaborator,
}

/// Therapeutic modality of an asset.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Modality {
  SmallMolecule,
  Antibody,
  Bispecific,
  Adc,
  CellTherapy,
  Vaccine,
  GeneTherapy,
  OncolyticVirus,
  CheckpointInhibitor,
  Peptide,
  Protein,
  Radiation,
  Chemotherapy,
  Other,
}

/// Furthest development stage an asset is known to have reached. Ordered, so
/// the furthest of two stages is their `max`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DevelopmentStage {
  Preclinical,
  Phase1,
  Phase2,
  Phase3,
  Approved,
}

impl DevelopmentStage {
  /// Map a registry phase string (`"PHASE2"`, `"Phase 1/Phase 2"`,
  /// `"EARLY_PHASE1"`, …) to a stage. Combined phases take the later phase;
  /// phase 4 trials are post-approval.
  pub fn from_phase(phase: &str) -> Option<Self> {
    let compact: String = phase
      .chars()
      .flat_map(char::to_lowercase)
      .filter(|c| c.is_alphanumeric())
      .collect();

    if compact.contains("phase4") {
      Some(Self::Approved)
    } else if compact.contains("phase3") {
      Some(Self::Phase3)
    } else if compact.contains("phase2") {
      Some(Self::Phase2)
    } else if compact.contains("phase1") || compact.contains("early") {
      Some(Self::Phase1)
    } else {
      None
    }
  }
}

/// Company→Asset relationship type.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RelationType {
  Owns,
  Licenses,
  UsesAsComparator,
}

/// Where an ownership relationship came from.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provenance {
  KnownRegistry,
  PrefixHeuristic,
  TrialSponsorshipInference,
  UserConfirmed,
}

// ─── Evidence ────────────────────────────────────────────────────────────────

/// The kind of source an [`Evidence`] entry cites.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceType {
  /// A trial record supplied by the fetcher.
  TrialRecord,
  /// The versioned alias / known-owner tables.
  ReferenceData,
  /// An explicit correction made by a user.
  UserCorrection,
}

/// A citation supporting a stored fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
  pub source_type:  SourceType,
  /// Trial id, reference-data version or editor name.
  pub source_id:    Option<String>,
  pub source_url:   Option<String>,
  pub confidence:   f64,
  pub extracted_at: DateTime<Utc>,
}

impl Evidence {
  /// Two entries cite the same source when type, id and url all agree;
  /// confidence and timestamp are ignored.
  pub fn same_source(&self, other: &Evidence) -> bool {
    self.source_type == other.source_type
      && self.source_id == other.source_id
      && self.source_url == other.source_url
  }

  pub fn with_confidence(mut self, confidence: f64) -> Self {
    self.confidence = confidence;
    self
  }
}

/// Append entries whose source is not yet cited. Returns `true` if anything
/// was added.
pub fn append_evidence(
  existing: &mut Vec<Evidence>,
  incoming: impl IntoIterator<Item = Evidence>,
) -> bool {
  let mut added = false;
  for ev in incoming {
    if !existing.iter().any(|e| e.same_source(&ev)) {
      existing.push(ev);
      added = true;
    }
  }
  added
}

// ─── Nodes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
  pub company_id:     CompanyId,
  pub canonical_name: String,
  pub aliases:        BTreeSet<String>,
  pub org_type:       Tracked<OrganizationType>,
  pub country:        Tracked<Option<String>>,
  /// Public-market identifiers (tickers, exchange codes).
  pub tickers:        Tracked<BTreeSet<String>>,
  pub evidence:       Vec<Evidence>,
}

impl Company {
  /// A freshly inferred company with no optional fields set.
  pub fn new(
    company_id: CompanyId,
    canonical_name: impl Into<String>,
    org_type: OrganizationType,
  ) -> Self {
    Self {
      company_id,
      canonical_name: canonical_name.into(),
      aliases: BTreeSet::new(),
      org_type: Tracked::inferred(org_type),
      country: Tracked::inferred(None),
      tickers: Tracked::inferred(BTreeSet::new()),
      evidence: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
  pub asset_id:       AssetId,
  pub canonical_name: String,
  /// Every raw string and code name known to denote this asset.
  pub synonyms:       BTreeSet<String>,
  pub modality:       Tracked<Option<Modality>>,
  pub targets:        Tracked<BTreeSet<String>>,
  pub indications:    Tracked<BTreeSet<String>>,
  pub stage:          Tracked<Option<DevelopmentStage>>,
  pub approved:       Tracked<Option<bool>>,
  pub evidence:       Vec<Evidence>,
}

impl Asset {
  pub fn new(asset_id: AssetId, canonical_name: impl Into<String>) -> Self {
    Self {
      asset_id,
      canonical_name: canonical_name.into(),
      synonyms: BTreeSet::new(),
      modality: Tracked::inferred(None),
      targets: Tracked::inferred(BTreeSet::new()),
      indications: Tracked::inferred(BTreeSet::new()),
      stage: Tracked::inferred(None),
      approved: Tracked::inferred(None),
      evidence: Vec::new(),
    }
  }
}

/// A sponsor as listed on a trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialSponsor {
  pub name:  String,
  pub role:  SponsorRole,
  pub class: Option<SponsorClass>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
  pub trial_id:      TrialId,
  pub title:         Option<String>,
  pub phase:         Option<String>,
  pub status:        Option<String>,
  pub enrollment:    Option<u32>,
  pub sponsors:      Vec<TrialSponsor>,
  pub interventions: Vec<String>,
  pub conditions:    Vec<String>,
  pub source_urls:   Vec<String>,
  pub evidence:      Vec<Evidence>,
}

// ─── Edges ───────────────────────────────────────────────────────────────────

/// Identity of a Company→Asset edge.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RelationshipKey {
  pub company_id: CompanyId,
  pub asset_id:   AssetId,
  pub relation:   RelationType,
}

/// A Company→Asset ownership-style edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
  pub company_id: CompanyId,
  pub asset_id:   AssetId,
  pub relation:   RelationType,
  pub confidence: f64,
  pub provenance: Provenance,
  /// Trials supporting this edge.
  pub trial_ids:  BTreeSet<TrialId>,
  pub evidence:   Vec<Evidence>,
}

impl Relationship {
  pub fn key(&self) -> RelationshipKey {
    RelationshipKey {
      company_id: self.company_id.clone(),
      asset_id:   self.asset_id.clone(),
      relation:   self.relation,
    }
  }

  pub fn is_user_confirmed(&self) -> bool {
    self.provenance == Provenance::UserConfirmed
  }
}

/// Company→Trial participation, keyed by `(company_id, trial_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SponsorLink {
  pub company_id: CompanyId,
  pub trial_id:   TrialId,
  pub role:       SponsorRole,
  pub evidence:   Vec<Evidence>,
}

/// Asset→Trial (HAS_TRIAL) association, keyed by `(asset_id, trial_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetTrialLink {
  pub asset_id:         AssetId,
  pub trial_id:         TrialId,
  /// Raw intervention strings that resolved to this asset in the trial.
  pub raw_names:        BTreeSet<String>,
  /// Other assets given together with this one in a combination arm.
  pub combination_with: BTreeSet<AssetId>,
  pub evidence:         Vec<Evidence>,
}
