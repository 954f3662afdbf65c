//! Per-batch merge reports.
//!
//! Non-fatal problems never abort a batch. They accumulate here as counts per
//! [`IssueKind`] plus a bounded sample of reasons.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::policy::OverrideConflict;

/// Created / updated / skipped tallies for one kind of graph element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
  pub created: u64,
  pub updated: u64,
  pub skipped: u64,
}

impl Counts {
  pub fn absorb(&mut self, other: Counts) {
    self.created += other.created;
    self.updated += other.updated;
    self.skipped += other.skipped;
  }

  pub fn total(&self) -> u64 { self.created + self.updated + self.skipped }
}

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
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
  /// No classification rule matched; the sponsor was typed `other`.
  ClassificationAmbiguous,
  /// Two entities resolved to the same canonical identity and were folded.
  NormalizationCollision,
  /// The record was skipped.
  RecordMalformed,
  /// An inferred value was discarded in favour of a user-confirmed one.
  OverrideConflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
  pub kind:    IssueKind,
  /// The entity or record the issue concerns.
  pub subject: String,
  pub reason:  String,
}

impl Issue {
  pub fn new(kind: IssueKind, subject: impl Into<String>, reason: impl Into<String>) -> Self {
    Self { kind, subject: subject.into(), reason: reason.into() }
  }
}

impl From<&OverrideConflict> for Issue {
  fn from(c: &OverrideConflict) -> Self {
    Issue::new(
      IssueKind::OverrideConflict,
      c.entity_id.clone(),
      format!("{}: kept {} over inferred {}", c.field, c.stored, c.incoming),
    )
  }
}

/// Counts per kind and up to `max_samples` example issues per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueLog {
  pub counts:      BTreeMap<IssueKind, u64>,
  pub samples:     Vec<Issue>,
  #[serde(skip)]
  max_samples:     usize,
}

impl Default for IssueLog {
  fn default() -> Self { Self::with_max_samples(20) }
}

impl IssueLog {
  pub fn with_max_samples(max_samples: usize) -> Self {
    Self { counts: BTreeMap::new(), samples: Vec::new(), max_samples }
  }

  pub fn push(&mut self, issue: Issue) {
    let count = self.counts.entry(issue.kind).or_default();
    *count += 1;
    let sampled = self.samples.iter().filter(|i| i.kind == issue.kind).count();
    if sampled < self.max_samples {
      self.samples.push(issue);
    }
  }

  pub fn count(&self, kind: IssueKind) -> u64 {
    self.counts.get(&kind).copied().unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool { self.counts.is_empty() }

  pub fn absorb(&mut self, other: IssueLog) {
    for (kind, n) in other.counts {
      let sampled = other.samples.iter().filter(|i| i.kind == kind).count() as u64;
      // Unsampled occurrences only contribute to the count.
      *self.counts.entry(kind).or_default() += n - sampled;
    }
    for issue in other.samples {
      self.push(issue);
    }
  }
}

/// Outcome of merging one or more [`GraphBatch`](crate::plan::GraphBatch)es.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
  pub companies:          Counts,
  pub assets:             Counts,
  pub trials:             Counts,
  pub relationships:      Counts,
  pub links:              Counts,
  pub assets_folded:      u64,
  pub companies_folded:   u64,
  /// Inferred edges deleted because the current rules contradict them.
  pub relationships_retracted: u64,
  pub override_conflicts: Vec<OverrideConflict>,
  pub issues:             IssueLog,
}

impl MergeReport {
  pub fn with_max_samples(max_samples: usize) -> Self {
    Self { issues: IssueLog::with_max_samples(max_samples), ..Self::default() }
  }

  /// Nodes and edges created by this merge.
  pub fn created(&self) -> u64 {
    [self.companies, self.assets, self.trials, self.relationships, self.links]
      .iter()
      .map(|c| c.created)
      .sum()
  }

  pub fn updated(&self) -> u64 {
    [self.companies, self.assets, self.trials, self.relationships, self.links]
      .iter()
      .map(|c| c.updated)
      .sum()
  }

  pub fn absorb(&mut self, other: MergeReport) {
    self.companies.absorb(other.companies);
    self.assets.absorb(other.assets);
    self.trials.absorb(other.trials);
    self.relationships.absorb(other.relationships);
    self.links.absorb(other.links);
    self.assets_folded += other.assets_folded;
    self.companies_folded += other.companies_folded;
    self.relationships_retracted += other.relationships_retracted;
    self.override_conflicts.extend(other.override_conflicts);
    self.issues.absorb(other.issues);
  }
}
