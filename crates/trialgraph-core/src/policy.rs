//! Field-level merge policy.
//!
//! Every mutable field of a company or asset is a [`Tracked`] value: the value
//! plus a [`FieldProvenance`]. The rules below are the only place stored and
//! incoming values are reconciled, which is what makes a user confirmation
//! sticky:
//!
//! - stored `user_confirmed`, incoming `inferred`: the incoming value is
//!   discarded and reported as an [`OverrideConflict`] if it differed;
//! - incoming `user_confirmed`: it replaces the stored value outright;
//! - both `inferred`: a per-field combiner decides the new value (replace,
//!   union, keep-known, advance).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{
  Asset, AssetTrialLink, Company, OrganizationType, Relationship, SponsorLink,
  Trial, append_evidence,
};

// ─── Tracked values ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldProvenance {
  /// Produced by ingestion; may be overwritten by later ingestion.
  #[default]
  Inferred,
  /// Set by an explicit user action; only another user action may change it.
  UserConfirmed,
}

/// A field value together with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracked<T> {
  pub value:      T,
  pub provenance: FieldProvenance,
}

/// What happened to a stored field during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOutcome {
  Unchanged,
  Replaced,
  /// An inferred value lost to a user-confirmed one.
  Discarded,
}

impl<T> Tracked<T> {
  pub fn inferred(value: T) -> Self {
    Self { value, provenance: FieldProvenance::Inferred }
  }

  pub fn confirmed(value: T) -> Self {
    Self { value, provenance: FieldProvenance::UserConfirmed }
  }

  pub fn is_confirmed(&self) -> bool {
    self.provenance == FieldProvenance::UserConfirmed
  }
}

impl<T: Clone + PartialEq> Tracked<T> {
  /// Merge `incoming` into `self`. `combine(stored, incoming)` computes the
  /// new value when both sides are inferred.
  pub fn merge_with(
    &mut self,
    incoming: Tracked<T>,
    combine: impl FnOnce(&T, T) -> T,
  ) -> FieldOutcome {
    if self.is_confirmed() && !incoming.is_confirmed() {
      return if combine(&self.value, incoming.value) == self.value {
        FieldOutcome::Unchanged
      } else {
        FieldOutcome::Discarded
      };
    }

    let provenance = incoming.provenance;
    let value = if incoming.is_confirmed() {
      incoming.value
    } else {
      combine(&self.value, incoming.value)
    };

    if value == self.value && provenance == self.provenance {
      FieldOutcome::Unchanged
    } else {
      self.value = value;
      self.provenance = provenance;
      FieldOutcome::Replaced
    }
  }

  /// Fold a field of an entity that is being merged away into this one. A
  /// confirmed value on either side survives; with both inferred, `self`
  /// takes priority through `combine(other, self)`.
  pub fn absorb(
    &mut self,
    other: Tracked<T>,
    combine: impl FnOnce(&T, T) -> T,
  ) -> FieldOutcome {
    match (self.is_confirmed(), other.is_confirmed()) {
      (true, _) => FieldOutcome::Unchanged,
      (false, true) => {
        *self = other;
        FieldOutcome::Replaced
      }
      (false, false) => {
        let value = combine(&other.value, self.value.clone());
        if value == self.value {
          FieldOutcome::Unchanged
        } else {
          self.value = value;
          FieldOutcome::Replaced
        }
      }
    }
  }
}

// ─── Combiners ───────────────────────────────────────────────────────────────

pub fn replace<T>(_: &T, incoming: T) -> T { incoming }

/// Keep the stored value when the incoming one is unknown.
pub fn keep_known<T: Clone>(stored: &Option<T>, incoming: Option<T>) -> Option<T> {
  incoming.or_else(|| stored.clone())
}

/// Replace unless the incoming set is empty.
pub fn replace_nonempty(
  stored: &BTreeSet<String>,
  incoming: BTreeSet<String>,
) -> BTreeSet<String> {
  if incoming.is_empty() { stored.clone() } else { incoming }
}

pub fn union(
  stored: &BTreeSet<String>,
  mut incoming: BTreeSet<String>,
) -> BTreeSet<String> {
  incoming.extend(stored.iter().cloned());
  incoming
}

/// Keep the further of two stages.
pub fn advance<T: Ord + Copy>(stored: &Option<T>, incoming: Option<T>) -> Option<T> {
  match (*stored, incoming) {
    (Some(a), Some(b)) => Some(a.max(b)),
    (a, b) => b.or(a),
  }
}

/// An `Other` classification never overrides a concrete one.
pub fn keep_specific(
  stored: &OrganizationType,
  incoming: OrganizationType,
) -> OrganizationType {
  if incoming == OrganizationType::Other { *stored } else { incoming }
}

// ─── Merge outcome ───────────────────────────────────────────────────────────

/// An inferred value that was discarded because the stored field is
/// user-confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideConflict {
  pub entity_id: String,
  pub field:     String,
  pub stored:    serde_json::Value,
  pub incoming:  serde_json::Value,
}

/// Accumulated result of merging one record into another.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
  pub changed:   bool,
  pub conflicts: Vec<OverrideConflict>,
}

impl MergeOutcome {
  fn field<T: Clone + PartialEq + Serialize>(
    &mut self,
    entity_id: &str,
    name: &str,
    stored: &mut Tracked<T>,
    incoming: Tracked<T>,
    combine: impl FnOnce(&T, T) -> T,
  ) {
    let rejected = serde_json::to_value(&incoming.value).unwrap_or_default();
    match stored.merge_with(incoming, combine) {
      FieldOutcome::Unchanged => {}
      FieldOutcome::Replaced => self.changed = true,
      FieldOutcome::Discarded => self.conflicts.push(OverrideConflict {
        entity_id: entity_id.to_owned(),
        field:     name.to_owned(),
        stored:    serde_json::to_value(&stored.value).unwrap_or_default(),
        incoming:  rejected,
      }),
    }
  }

  fn touch(&mut self, changed: bool) { self.changed |= changed; }
}

fn extend_set(stored: &mut BTreeSet<String>, incoming: BTreeSet<String>) -> bool {
  let before = stored.len();
  stored.extend(incoming);
  stored.len() != before
}

fn set_if_some<T: PartialEq>(stored: &mut Option<T>, incoming: Option<T>) -> bool {
  match incoming {
    Some(v) if stored.as_ref() != Some(&v) => {
      *stored = Some(v);
      true
    }
    _ => false,
  }
}

// ─── Entity merges ───────────────────────────────────────────────────────────

impl Company {
  /// Merge an incoming version of the same company into `self`. The stored
  /// canonical name is kept (first seen wins).
  pub fn merge_from(&mut self, incoming: Company) -> MergeOutcome {
    let id = self.company_id.to_string();
    let mut out = MergeOutcome::default();
    out.touch(extend_set(&mut self.aliases, incoming.aliases));
    out.field(&id, "org_type", &mut self.org_type, incoming.org_type, keep_specific);
    out.field(&id, "country", &mut self.country, incoming.country, keep_known);
    out.field(&id, "tickers", &mut self.tickers, incoming.tickers, replace_nonempty);
    out.touch(append_evidence(&mut self.evidence, incoming.evidence));
    out
  }

  /// Fold a company that resolved to the same canonical identity into
  /// `self`. Its names become aliases and confirmed fields survive.
  pub fn absorb(&mut self, other: Company) -> bool {
    let mut changed = extend_set(&mut self.aliases, other.aliases);
    changed |= self.aliases.insert(other.canonical_name);
    changed |= self.org_type.absorb(other.org_type, keep_specific) != FieldOutcome::Unchanged;
    changed |= self.country.absorb(other.country, keep_known) != FieldOutcome::Unchanged;
    changed |= self.tickers.absorb(other.tickers, union) != FieldOutcome::Unchanged;
    changed |= append_evidence(&mut self.evidence, other.evidence);
    changed
  }
}

impl Asset {
  /// Merge an incoming version of the same asset into `self`. Synonyms and
  /// indications accumulate, the stage only advances, and unknown modality
  /// or approval never erases a known one.
  pub fn merge_from(&mut self, incoming: Asset) -> MergeOutcome {
    let id = self.asset_id.to_string();
    let mut out = MergeOutcome::default();
    out.touch(extend_set(&mut self.synonyms, incoming.synonyms));
    out.field(&id, "modality", &mut self.modality, incoming.modality, keep_known);
    out.field(&id, "targets", &mut self.targets, incoming.targets, replace_nonempty);
    out.field(&id, "indications", &mut self.indications, incoming.indications, union);
    out.field(&id, "stage", &mut self.stage, incoming.stage, advance);
    out.field(&id, "approved", &mut self.approved, incoming.approved, keep_known);
    out.touch(append_evidence(&mut self.evidence, incoming.evidence));
    out
  }

  /// Fold an older, lower-specificity asset into this canonical one.
  pub fn absorb(&mut self, other: Asset) -> bool {
    let mut changed = extend_set(&mut self.synonyms, other.synonyms);
    changed |= self.synonyms.insert(other.canonical_name);
    changed |= self.modality.absorb(other.modality, keep_known) != FieldOutcome::Unchanged;
    changed |= self.targets.absorb(other.targets, replace_nonempty) != FieldOutcome::Unchanged;
    changed |= self.indications.absorb(other.indications, union) != FieldOutcome::Unchanged;
    changed |= self.stage.absorb(other.stage, advance) != FieldOutcome::Unchanged;
    changed |= self.approved.absorb(other.approved, keep_known) != FieldOutcome::Unchanged;
    changed |= append_evidence(&mut self.evidence, other.evidence);
    changed
  }
}

impl Trial {
  /// Re-ingestion updates the trial in place. The identifier never changes;
  /// scalar fields only change when the incoming record carries them.
  pub fn merge_from(&mut self, incoming: Trial) -> bool {
    let mut changed = false;
    changed |= set_if_some(&mut self.title, incoming.title);
    changed |= set_if_some(&mut self.phase, incoming.phase);
    changed |= set_if_some(&mut self.status, incoming.status);
    changed |= set_if_some(&mut self.enrollment, incoming.enrollment);

    if self.sponsors != incoming.sponsors {
      self.sponsors = incoming.sponsors;
      changed = true;
    }
    if self.interventions != incoming.interventions {
      self.interventions = incoming.interventions;
      changed = true;
    }
    if self.conditions != incoming.conditions {
      self.conditions = incoming.conditions;
      changed = true;
    }
    for url in incoming.source_urls {
      if !self.source_urls.contains(&url) {
        self.source_urls.push(url);
        changed = true;
      }
    }
    changed |= append_evidence(&mut self.evidence, incoming.evidence);
    changed
  }
}

impl Relationship {
  /// Merge an incoming edge with the same key. A user-confirmed edge keeps
  /// its confidence and provenance; supporting trials and evidence are still
  /// appended.
  pub fn merge_from(&mut self, incoming: Relationship) -> MergeOutcome {
    let mut out = MergeOutcome::default();
    let incoming_confirmed = incoming.is_user_confirmed();
    let before = self.trial_ids.len();
    self.trial_ids.extend(incoming.trial_ids);
    out.touch(self.trial_ids.len() != before);
    out.touch(append_evidence(&mut self.evidence, incoming.evidence));

    if self.is_user_confirmed() && !incoming_confirmed {
      if incoming.confidence != self.confidence || incoming.provenance != self.provenance {
        out.conflicts.push(OverrideConflict {
          entity_id: format!("{}->{}", self.company_id, self.asset_id),
          field:     self.relation.to_string(),
          stored:    serde_json::json!({
            "confidence": self.confidence,
            "provenance": self.provenance,
          }),
          incoming:  serde_json::json!({
            "confidence": incoming.confidence,
            "provenance": incoming.provenance,
          }),
        });
      }
      return out;
    }

    if self.confidence != incoming.confidence || self.provenance != incoming.provenance {
      self.confidence = incoming.confidence;
      self.provenance = incoming.provenance;
      out.changed = true;
    }
    out
  }
}

impl SponsorLink {
  pub fn merge_from(&mut self, incoming: SponsorLink) -> bool {
    let mut changed = false;
    // A company that leads the trial in any record stays the lead.
    if incoming.role < self.role {
      self.role = incoming.role;
      changed = true;
    }
    changed | append_evidence(&mut self.evidence, incoming.evidence)
  }
}

impl AssetTrialLink {
  pub fn merge_from(&mut self, incoming: AssetTrialLink) -> bool {
    let mut changed = extend_set(&mut self.raw_names, incoming.raw_names);
    let before = self.combination_with.len();
    self.combination_with.extend(incoming.combination_with);
    changed |= self.combination_with.len() != before;
    changed | append_evidence(&mut self.evidence, incoming.evidence)
  }
}
