//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::BTreeSet;

use chrono::Utc;
use trialgraph_core::{
  ids::{AssetId, CompanyId, TrialId},
  model::{
    Asset, AssetTrialLink, Company, DevelopmentStage, Evidence, Modality, OrganizationType,
    Provenance, RelationType, Relationship, SourceType, SponsorLink, SponsorRole, Trial,
    TrialSponsor,
  },
  policy::Tracked,
  store::GraphStore,
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn evidence(trial: &str) -> Evidence {
  Evidence {
    source_type:  SourceType::TrialRecord,
    source_id:    Some(trial.to_owned()),
    source_url:   Some(format!("https://clinicaltrials.gov/study/{trial}")),
    confidence:   1.0,
    extracted_at: Utc::now(),
  }
}

fn company(name: &str) -> Company {
  let mut c = Company::new(CompanyId::from_canonical(name), name, OrganizationType::Industry);
  c.aliases.insert(format!("{name}, Inc."));
  c.evidence.push(evidence("NCT00000001"));
  c
}

fn asset(name: &str) -> Asset {
  let mut a = Asset::new(AssetId::from_canonical(name), name);
  a.synonyms.insert(name.to_uppercase());
  a.modality = Tracked::confirmed(Some(Modality::SmallMolecule));
  a.stage = Tracked::inferred(Some(DevelopmentStage::Phase2));
  a
}

fn relationship(company: &Company, asset: &Asset, relation: RelationType) -> Relationship {
  Relationship {
    company_id: company.company_id.clone(),
    asset_id: asset.asset_id.clone(),
    relation,
    confidence: 0.7,
    provenance: Provenance::PrefixHeuristic,
    trial_ids: BTreeSet::from([TrialId::from("NCT00000001")]),
    evidence: vec![evidence("NCT00000001")],
  }
}

// ─── Nodes ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn company_roundtrip() {
  let s = store().await;
  let c = company("IDEAYA Biosciences");
  s.upsert_company(c.clone()).await.unwrap();

  let fetched = s.get_company(c.company_id.clone()).await.unwrap();
  assert_eq!(fetched, Some(c));
}

#[tokio::test]
async fn get_missing_returns_none() {
  let s = store().await;
  assert!(s.get_company("company_missing".into()).await.unwrap().is_none());
  assert!(s.get_asset("asset_missing".into()).await.unwrap().is_none());
  assert!(s.get_trial("NCT404".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn asset_roundtrip_keeps_field_provenance() {
  let s = store().await;
  let a = asset("darovasertib");
  s.upsert_asset(a.clone()).await.unwrap();

  let fetched = s.get_asset(a.asset_id.clone()).await.unwrap().unwrap();
  assert!(fetched.modality.is_confirmed());
  assert!(!fetched.stage.is_confirmed());
  assert_eq!(fetched, a);
}

#[tokio::test]
async fn upsert_replaces_and_does_not_duplicate() {
  let s = store().await;
  let mut a = asset("darovasertib");
  s.upsert_asset(a.clone()).await.unwrap();
  a.synonyms.insert("IDE196".into());
  s.upsert_asset(a.clone()).await.unwrap();
  s.upsert_asset(a.clone()).await.unwrap();

  let fetched = s.get_asset(a.asset_id.clone()).await.unwrap().unwrap();
  assert!(fetched.synonyms.contains("IDE196"));
  assert_eq!(s.counts().await.unwrap().assets, 1);
}

#[tokio::test]
async fn trial_roundtrip() {
  let s = store().await;
  let t = Trial {
    trial_id:      "NCT03947385".into(),
    title:         Some("Darovasertib in metastatic uveal melanoma".into()),
    phase:         Some("PHASE2".into()),
    status:        None,
    enrollment:    Some(120),
    sponsors:      vec![TrialSponsor {
      name:  "IDEAYA Biosciences".into(),
      role:  SponsorRole::LeadSponsor,
      class: None,
    }],
    interventions: vec!["IDE196 + crizotinib".into()],
    conditions:    vec!["Uveal Melanoma".into()],
    source_urls:   vec!["https://clinicaltrials.gov/study/NCT03947385".into()],
    evidence:      vec![evidence("NCT03947385")],
  };
  s.upsert_trial(t.clone()).await.unwrap();
  assert_eq!(s.get_trial(t.trial_id.clone()).await.unwrap(), Some(t));
}

#[tokio::test]
async fn delete_nodes() {
  let s = store().await;
  let c = company("Immunocore");
  let a = asset("tebentafusp");
  s.upsert_company(c.clone()).await.unwrap();
  s.upsert_asset(a.clone()).await.unwrap();

  assert!(s.delete_company(c.company_id.clone()).await.unwrap());
  assert!(!s.delete_company(c.company_id.clone()).await.unwrap());
  assert!(s.delete_asset(a.asset_id.clone()).await.unwrap());
  assert!(s.get_asset(a.asset_id).await.unwrap().is_none());
}

// ─── Edges ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn relationships_are_keyed_by_type() {
  let s = store().await;
  let c = company("Merck");
  let a = asset("pembrolizumab");
  let owns = relationship(&c, &a, RelationType::Owns);
  let comparator = relationship(&c, &a, RelationType::UsesAsComparator);
  s.upsert_relationship(owns.clone()).await.unwrap();
  s.upsert_relationship(comparator.clone()).await.unwrap();
  s.upsert_relationship(owns.clone()).await.unwrap();

  let for_asset = s.relationships_for_asset(a.asset_id.clone()).await.unwrap();
  assert_eq!(for_asset.len(), 2);
  assert_eq!(for_asset[0].relation, RelationType::Owns);

  let for_company = s.relationships_for_company(c.company_id.clone()).await.unwrap();
  assert_eq!(for_company.len(), 2);

  assert_eq!(s.get_relationship(owns.key()).await.unwrap(), Some(owns.clone()));
  assert!(s.delete_relationship(comparator.key()).await.unwrap());
  assert!(s.get_relationship(comparator.key()).await.unwrap().is_none());
  assert_eq!(s.counts().await.unwrap().relationships, 1);
}

#[tokio::test]
async fn relationship_upsert_overwrites_confidence() {
  let s = store().await;
  let c = company("IDEAYA Biosciences");
  let a = asset("darovasertib");
  let mut r = relationship(&c, &a, RelationType::Owns);
  s.upsert_relationship(r.clone()).await.unwrap();

  r.confidence = 1.0;
  r.provenance = Provenance::UserConfirmed;
  s.upsert_relationship(r.clone()).await.unwrap();

  let fetched = s.get_relationship(r.key()).await.unwrap().unwrap();
  assert_eq!(fetched.confidence, 1.0);
  assert!(fetched.is_user_confirmed());
}

#[tokio::test]
async fn sponsor_links() {
  let s = store().await;
  let c = company("IDEAYA Biosciences");
  for trial in ["NCT2", "NCT1"] {
    s.upsert_sponsor_link(SponsorLink {
      company_id: c.company_id.clone(),
      trial_id:   trial.into(),
      role:       SponsorRole::LeadSponsor,
      evidence:   vec![evidence(trial)],
    })
    .await
    .unwrap();
  }

  let links = s.sponsor_links_for_company(c.company_id.clone()).await.unwrap();
  let trials: Vec<_> = links.iter().map(|l| l.trial_id.as_str()).collect();
  assert_eq!(trials, ["NCT1", "NCT2"]);

  let one = s
    .get_sponsor_link(c.company_id.clone(), "NCT1".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(one.role, SponsorRole::LeadSponsor);

  assert!(s.delete_sponsor_link(c.company_id.clone(), "NCT1".into()).await.unwrap());
  assert_eq!(s.counts().await.unwrap().sponsor_links, 1);
}

#[tokio::test]
async fn asset_links_by_asset_and_trial() {
  let s = store().await;
  let daro = asset("darovasertib");
  let criz = asset("crizotinib");
  let trial = TrialId::from("NCT03947385");

  s.upsert_asset_link(AssetTrialLink {
    asset_id:         daro.asset_id.clone(),
    trial_id:         trial.clone(),
    raw_names:        BTreeSet::from(["IDE196".to_owned()]),
    combination_with: BTreeSet::from([criz.asset_id.clone()]),
    evidence:         vec![evidence("NCT03947385")],
  })
  .await
  .unwrap();
  s.upsert_asset_link(AssetTrialLink {
    asset_id:         criz.asset_id.clone(),
    trial_id:         trial.clone(),
    raw_names:        BTreeSet::from(["crizotinib".to_owned()]),
    combination_with: BTreeSet::from([daro.asset_id.clone()]),
    evidence:         vec![evidence("NCT03947385")],
  })
  .await
  .unwrap();

  assert_eq!(s.asset_links_for_trial(trial.clone()).await.unwrap().len(), 2);
  let daro_links = s.asset_links_for_asset(daro.asset_id.clone()).await.unwrap();
  assert_eq!(daro_links.len(), 1);
  assert!(daro_links[0].combination_with.contains(&criz.asset_id));

  assert!(s.delete_asset_link(criz.asset_id.clone(), trial.clone()).await.unwrap());
  assert!(s.get_asset_link(criz.asset_id, trial).await.unwrap().is_none());
}

#[tokio::test]
async fn counts_on_empty_store() {
  let s = store().await;
  let counts = s.counts().await.unwrap();
  assert_eq!(counts, Default::default());
}
