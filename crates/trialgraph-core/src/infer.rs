//! Ownership inference.
//!
//! For every asset in a trial and every sponsor of it, at most one claim is
//! produced, decided by the first applicable rule:
//!
//! 1. The registry names an owner: the owner gets `owns` at registry
//!    confidence, whether or not it sponsors the trial. A sponsor that is
//!    not the owner never gets `owns`.
//! 2. The asset is standard-of-care or generic and the sponsor is an
//!    industry sponsor other than the owner: `uses_as_comparator`.
//! 3. The asset is unregistered and one of its names starts with a code
//!    prefix of the sponsor: `owns` at prefix confidence.
//! 4. Otherwise nothing; the trial association alone is recorded.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
  ids::{AssetId, CompanyId, TrialId},
  model::{OrganizationType, Provenance, RelationType, RelationshipKey, SponsorRole},
  normalize::{NormalizedAsset, NormalizedCompany},
  reference::ReferenceData,
};

/// Confidence assigned to each inference rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
  pub registry_confidence:   f64,
  pub prefix_confidence:     f64,
  pub comparator_confidence: f64,
}

impl Default for InferenceConfig {
  fn default() -> Self {
    Self {
      registry_confidence:   1.0,
      prefix_confidence:     0.7,
      comparator_confidence: 0.4,
    }
  }
}

/// A sponsor of the trial, already normalized and classified.
#[derive(Debug, Clone)]
pub struct ContextSponsor {
  pub company:  NormalizedCompany,
  pub org_type: OrganizationType,
  pub role:     SponsorRole,
}

/// Everything inference needs to know about one trial.
#[derive(Debug, Clone)]
pub struct TrialContext {
  pub trial_id: TrialId,
  pub sponsors: Vec<ContextSponsor>,
  pub assets:   Vec<NormalizedAsset>,
}

/// One candidate Company→Asset edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnershipClaim {
  pub company_id:   CompanyId,
  pub company_name: String,
  pub asset_id:     AssetId,
  pub relation:     RelationType,
  pub confidence:   f64,
  pub provenance:   Provenance,
  pub trial_id:     TrialId,
}

impl OwnershipClaim {
  pub fn key(&self) -> RelationshipKey {
    RelationshipKey {
      company_id: self.company_id.clone(),
      asset_id:   self.asset_id.clone(),
      relation:   self.relation,
    }
  }
}

/// Which companies may hold an inferred `owns` edge on an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnsRule {
  /// Unregistered; the prefix heuristic may still attribute it.
  Open,
  /// Only the registered owner.
  RegisteredOwner(CompanyId),
  /// Registered without an owner, or generic: nobody.
  Nobody,
}

impl OwnsRule {
  pub fn admits(&self, company: &CompanyId) -> bool {
    match self {
      OwnsRule::Open => true,
      OwnsRule::RegisteredOwner(owner) => owner == company,
      OwnsRule::Nobody => false,
    }
  }
}

#[derive(Debug, Clone)]
pub struct OwnershipInference {
  reference: Arc<ReferenceData>,
  config:    InferenceConfig,
}

impl OwnershipInference {
  pub fn new(reference: Arc<ReferenceData>, config: InferenceConfig) -> Self {
    Self { reference, config }
  }

  pub fn config(&self) -> &InferenceConfig { &self.config }

  pub fn infer_ownership(&self, ctx: &TrialContext) -> Vec<OwnershipClaim> {
    let mut seen = BTreeSet::new();
    let mut claims = Vec::new();

    for asset in &ctx.assets {
      let owner = self
        .reference
        .known_owner(&asset.canonical_name)
        .map(|name| NormalizedCompany::resolve(&self.reference, name));
      let never_attribute = self.reference.is_never_attribute(&asset.canonical_name);

      if let Some(owner) = &owner {
        claims.push(self.claim(
          ctx,
          owner,
          asset,
          RelationType::Owns,
          self.config.registry_confidence,
          Provenance::KnownRegistry,
        ));
      }

      for sponsor in &ctx.sponsors {
        let is_owner = owner
          .as_ref()
          .is_some_and(|o| o.company_id == sponsor.company.company_id);
        if is_owner {
          continue;
        }

        if never_attribute {
          if sponsor.org_type == OrganizationType::Industry {
            claims.push(self.claim(
              ctx,
              &sponsor.company,
              asset,
              RelationType::UsesAsComparator,
              self.config.comparator_confidence,
              Provenance::TrialSponsorshipInference,
            ));
          }
        } else if owner.is_none() && !asset.registered && self.prefix_matches(sponsor, asset) {
          claims.push(self.claim(
            ctx,
            &sponsor.company,
            asset,
            RelationType::Owns,
            self.config.prefix_confidence,
            Provenance::PrefixHeuristic,
          ));
        }
      }
    }

    claims.retain(|c| seen.insert(c.key()));
    claims
  }

  /// The `owns` rule the current tables impose on `asset`, whichever
  /// company sponsors it.
  pub fn owns_rule(&self, asset: &NormalizedAsset) -> OwnsRule {
    match self.reference.known_owner(&asset.canonical_name) {
      Some(owner) => {
        OwnsRule::RegisteredOwner(NormalizedCompany::resolve(&self.reference, owner).company_id)
      }
      None if asset.registered || self.reference.is_never_attribute(&asset.canonical_name) => {
        OwnsRule::Nobody
      }
      None => OwnsRule::Open,
    }
  }

  fn prefix_matches(&self, sponsor: &ContextSponsor, asset: &NormalizedAsset) -> bool {
    let prefixes = self.reference.code_prefixes(&sponsor.company.canonical_name);
    prefixes.iter().any(|prefix| {
      [&asset.raw, &asset.canonical_name]
        .into_iter()
        .any(|name| has_code_prefix(name, prefix))
    })
  }

  fn claim(
    &self,
    ctx: &TrialContext,
    company: &NormalizedCompany,
    asset: &NormalizedAsset,
    relation: RelationType,
    confidence: f64,
    provenance: Provenance,
  ) -> OwnershipClaim {
    OwnershipClaim {
      company_id: company.company_id.clone(),
      company_name: company.canonical_name.clone(),
      asset_id: asset.asset_id.clone(),
      relation,
      confidence,
      provenance,
      trial_id: ctx.trial_id.clone(),
    }
  }
}

/// `IDE397`, `IDE-397` and `ide 397` all carry the `IDE` prefix; `IDEAL-1`
/// does not. The prefix must be followed by a digit, optionally after one
/// `-` or space.
pub fn has_code_prefix(name: &str, prefix: &str) -> bool {
  let name = name.trim().to_lowercase();
  let Some(rest) = name.strip_prefix(&prefix.to_lowercase()) else {
    return false;
  };
  let rest = rest
    .strip_prefix('-')
    .or_else(|| rest.strip_prefix(' '))
    .unwrap_or(rest);
  rest.starts_with(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{classify::SponsorClassifier, normalize::Normalizer};

  struct Fixture {
    normalizer: Normalizer,
    classifier: SponsorClassifier,
    inference:  OwnershipInference,
  }

  fn fixture() -> Fixture {
    let reference = Arc::new(ReferenceData::builtin().unwrap());
    Fixture {
      normalizer: Normalizer::new(reference.clone()).unwrap(),
      classifier: SponsorClassifier::new(&reference).unwrap(),
      inference:  OwnershipInference::new(reference, InferenceConfig::default()),
    }
  }

  impl Fixture {
    fn context(&self, sponsors: &[&str], interventions: &[&str]) -> TrialContext {
      TrialContext {
        trial_id: "NCT00000001".into(),
        sponsors: sponsors
          .iter()
          .map(|name| ContextSponsor {
            company:  self.normalizer.normalize_company(name),
            org_type: self.classifier.classify(name, None),
            role:     SponsorRole::LeadSponsor,
          })
          .collect(),
        assets:   interventions
          .iter()
          .map(|raw| self.normalizer.normalize_asset(raw))
          .collect(),
      }
    }
  }

  #[test]
  fn registered_owner_sponsoring_its_own_asset() {
    let f = fixture();
    let claims = f
      .inference
      .infer_ownership(&f.context(&["IDEAYA Biosciences"], &["IDE196"]));
    assert_eq!(claims.len(), 1);
    let claim = &claims[0];
    assert_eq!(claim.relation, RelationType::Owns);
    assert_eq!(claim.provenance, Provenance::KnownRegistry);
    assert_eq!(claim.confidence, 1.0);
    assert_eq!(claim.company_name, "IDEAYA Biosciences");
  }

  #[test]
  fn comparator_never_owned_by_sponsor() {
    let f = fixture();
    let claims = f
      .inference
      .infer_ownership(&f.context(&["Acme Therapeutics, Inc."], &["pembrolizumab"]));
    let acme = CompanyId::from_canonical("Acme Therapeutics");

    assert!(
      !claims
        .iter()
        .any(|c| c.company_id == acme && c.relation == RelationType::Owns)
    );
    let comparator = claims
      .iter()
      .find(|c| c.company_id == acme)
      .unwrap();
    assert_eq!(comparator.relation, RelationType::UsesAsComparator);
    assert_eq!(comparator.confidence, 0.4);

    let merck = claims.iter().find(|c| c.company_name == "Merck").unwrap();
    assert_eq!(merck.relation, RelationType::Owns);
    assert_eq!(merck.provenance, Provenance::KnownRegistry);
  }

  #[test]
  fn academic_sponsor_gets_no_comparator_edge() {
    let f = fixture();
    let claims = f
      .inference
      .infer_ownership(&f.context(&["Mayo Clinic"], &["dacarbazine"]));
    assert!(claims.is_empty());
  }

  #[test]
  fn prefix_heuristic_for_unregistered_code() {
    let f = fixture();
    let claims = f
      .inference
      .infer_ownership(&f.context(&["IDEAYA Biosciences", "Pfizer"], &["IDE-397"]));
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].company_name, "IDEAYA Biosciences");
    assert_eq!(claims[0].provenance, Provenance::PrefixHeuristic);
    assert_eq!(claims[0].confidence, 0.7);
  }

  #[test]
  fn unknown_asset_without_prefix_gets_nothing() {
    let f = fixture();
    let claims = f
      .inference
      .infer_ownership(&f.context(&["Acme Therapeutics"], &["Foolimab"]));
    assert!(claims.is_empty());
  }

  #[test]
  fn owns_rule_follows_the_registry() {
    let f = fixture();
    let rule = |raw: &str| f.inference.owns_rule(&f.normalizer.normalize_asset(raw));
    let merck = f.normalizer.normalize_company("Merck").company_id;

    assert_eq!(rule("pembrolizumab"), OwnsRule::RegisteredOwner(merck.clone()));
    assert!(rule("Keytruda").admits(&merck));
    assert!(!rule("pembrolizumab").admits(&CompanyId::from_canonical("Acme Therapeutics")));
    assert_eq!(rule("dacarbazine"), OwnsRule::Nobody);
    assert_eq!(rule("IDE-397"), OwnsRule::Open);
  }

  #[test]
  fn code_prefix_requires_a_digit() {
    assert!(has_code_prefix("IDE397", "IDE"));
    assert!(has_code_prefix("ide-397", "IDE"));
    assert!(has_code_prefix("IDE 397", "ide"));
    assert!(!has_code_prefix("IDEAL-1", "IDE"));
    assert!(!has_code_prefix("Rovalpituzumab", "RO"));
  }
}
