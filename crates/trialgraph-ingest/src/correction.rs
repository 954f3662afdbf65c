//! User corrections to assets.
//!
//! A correction is a partial update. Every field it touches is stored as
//! user-confirmed, which later ingestion runs can no longer overwrite.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trialgraph_core::{
  ids::CompanyId,
  model::{
    Evidence, Modality, Provenance, RelationType, Relationship, RelationshipKey, SourceType,
  },
};

use crate::{Error, Result};

/// A partial update of one asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetCorrection {
  pub modality: Option<Modality>,
  pub targets:  Option<BTreeSet<String>>,
  pub owner:    Option<OwnerCorrection>,
  /// Who made the correction; cited as the evidence source.
  pub editor:   Option<String>,
}

/// The company that holds an asset. Exactly one of `company_id` and
/// `company_name` is given; a name that resolves to no stored company
/// creates one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerCorrection {
  #[serde(default)]
  pub company_id:   Option<CompanyId>,
  #[serde(default)]
  pub company_name: Option<String>,
  #[serde(default = "default_relation")]
  pub relation:     RelationType,
}

fn default_relation() -> RelationType { RelationType::Owns }

/// How an owner correction names its company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerRef<'a> {
  Id(&'a CompanyId),
  Name(&'a str),
}

impl OwnerCorrection {
  pub fn owner_ref(&self) -> Result<OwnerRef<'_>> {
    match (&self.company_id, self.company_name.as_deref().map(str::trim)) {
      (Some(id), None) => Ok(OwnerRef::Id(id)),
      (None, Some(name)) if !name.is_empty() => Ok(OwnerRef::Name(name)),
      (Some(_), Some(_)) => Err(Error::InvalidCorrection(
        "owner must be given by company_id or company_name, not both".into(),
      )),
      _ => Err(Error::InvalidCorrection("owner needs a company_id or company_name".into())),
    }
  }
}

impl AssetCorrection {
  pub fn is_empty(&self) -> bool {
    self.modality.is_none() && self.targets.is_none() && self.owner.is_none()
  }

  /// Reject corrections that would change nothing or name no owner.
  pub fn validate(&self) -> Result<()> {
    if self.is_empty() {
      return Err(Error::InvalidCorrection(
        "a correction sets at least one of modality, targets or owner".into(),
      ));
    }
    if let Some(owner) = &self.owner {
      owner.owner_ref()?;
      if owner.relation == RelationType::UsesAsComparator {
        return Err(Error::InvalidCorrection(
          "an owner correction cannot be a comparator relation".into(),
        ));
      }
    }
    Ok(())
  }
}

/// Edges removed when an owner relation is confirmed: inferred edges of any
/// other type between the same company and asset.
pub(crate) fn superseded_by(confirmed: &RelationshipKey, candidate: &Relationship) -> bool {
  candidate.company_id == confirmed.company_id
    && candidate.asset_id == confirmed.asset_id
    && candidate.relation != confirmed.relation
    && candidate.provenance != Provenance::UserConfirmed
}

/// Evidence attached to everything a correction touches.
pub(crate) fn correction_evidence(editor: Option<&str>, at: DateTime<Utc>) -> Evidence {
  Evidence {
    source_type:  SourceType::UserCorrection,
    source_id:    editor.map(str::to_owned),
    source_url:   None,
    confidence:   1.0,
    extracted_at: at,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_correction_is_rejected() {
    assert!(matches!(
      AssetCorrection::default().validate(),
      Err(Error::InvalidCorrection(_))
    ));
  }

  #[test]
  fn owner_by_name_defaults_to_owns() {
    let c: AssetCorrection = serde_json::from_value(serde_json::json!({
      "owner": { "company_name": "Foo Pharmaceuticals" },
      "editor": "curator@example.org",
    }))
    .unwrap();
    c.validate().unwrap();
    let owner = c.owner.unwrap();
    assert_eq!(owner.relation, RelationType::Owns);
    assert_eq!(owner.owner_ref().unwrap(), OwnerRef::Name("Foo Pharmaceuticals"));
  }

  #[test]
  fn owner_needs_exactly_one_reference() {
    let both = OwnerCorrection {
      company_id:   Some("company_1".into()),
      company_name: Some("Foo".into()),
      relation:     RelationType::Owns,
    };
    assert!(both.owner_ref().is_err());
    let neither = OwnerCorrection { company_id: None, company_name: Some("  ".into()), ..both };
    assert!(neither.owner_ref().is_err());
  }

  #[test]
  fn comparator_is_not_an_owner() {
    let c = AssetCorrection {
      owner: Some(OwnerCorrection {
        company_id:   Some("company_1".into()),
        company_name: None,
        relation:     RelationType::UsesAsComparator,
      }),
      ..Default::default()
    };
    assert!(c.validate().is_err());
  }
}
