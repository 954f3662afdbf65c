//! End-to-end ingestion tests against an in-memory `SqliteStore`.

use std::sync::Arc;

use trialgraph_core::{
  ids::{AssetId, CompanyId, TrialId},
  model::{Modality, OrganizationType, Provenance, RelationType},
  record::{RawSponsor, RawTrialRecord},
  reference::{FileReference, ReferenceData, ReferenceSource, StaticReference},
  report::IssueKind,
  store::GraphStore,
};
use trialgraph_store_sqlite::SqliteStore;

use crate::{
  AssetCorrection, CancellationToken, Error, IngestConfig, Ingestor, OwnerCorrection,
};

const INDICATION: &str = "uveal_melanoma";

async fn store() -> Arc<SqliteStore> {
  Arc::new(
    SqliteStore::open_in_memory()
      .await
      .expect("in-memory store"),
  )
}

fn builtin() -> Arc<dyn ReferenceSource> {
  Arc::new(StaticReference::new(ReferenceData::builtin().unwrap()))
}

fn ingestor(store: Arc<SqliteStore>, reference: Arc<dyn ReferenceSource>) -> Ingestor<SqliteStore> {
  Ingestor::new(store, reference, IngestConfig::default())
}

fn record(id: &str, sponsor: &str, interventions: &[&str]) -> RawTrialRecord {
  RawTrialRecord {
    trial_id: id.into(),
    phase: Some("PHASE2".into()),
    sponsors: vec![RawSponsor {
      name:  sponsor.into(),
      role:  Some("lead_sponsor".into()),
      class: None,
    }],
    interventions: interventions.iter().map(|s| s.to_string()).collect(),
    conditions: vec!["Uveal Melanoma".into()],
    source_urls: vec![format!("https://clinicaltrials.gov/study/{id}")],
    ..Default::default()
  }
}

fn daro() -> AssetId { AssetId::from_canonical("darovasertib") }

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn ideaya_scenario() {
  let s = store().await;
  let ing = ingestor(s.clone(), builtin());
  let report = ing
    .ingest(
      INDICATION,
      vec![record("NCT03947385", "IDEAYA Biosciences", &["IDE196"])],
      &CancellationToken::new(),
    )
    .await
    .unwrap();
  assert_eq!(report.records_merged, 1);

  let counts = s.counts().await.unwrap();
  assert_eq!(counts.companies, 1);
  assert_eq!(counts.assets, 1);
  assert_eq!(counts.relationships, 1);

  let company_id = CompanyId::from_canonical("IDEAYA Biosciences");
  let company = s.get_company(company_id.clone()).await.unwrap().unwrap();
  assert_eq!(company.org_type.value, OrganizationType::Industry);

  let asset = s.get_asset(daro()).await.unwrap().unwrap();
  assert_eq!(asset.canonical_name, "darovasertib");
  assert!(asset.synonyms.contains("IDE196"));

  let rels = s.relationships_for_asset(daro()).await.unwrap();
  assert_eq!(rels.len(), 1);
  assert_eq!(rels[0].company_id, company_id);
  assert_eq!(rels[0].relation, RelationType::Owns);
  assert_eq!(rels[0].confidence, 1.0);
  assert_eq!(rels[0].provenance, Provenance::KnownRegistry);
}

#[tokio::test]
async fn second_identical_run_creates_nothing() {
  let s = store().await;
  let ing = ingestor(s.clone(), builtin());
  let records = vec![
    record("NCT03947385", "IDEAYA Biosciences", &["IDE196 + crizotinib"]),
    record("NCT02570308", "Immunocore Ltd", &["tebentafusp"]),
    record("NCT01000001", "Acme Therapeutics", &["pembrolizumab"]),
  ];
  let cancel = CancellationToken::new();

  let first = ing.ingest(INDICATION, records.clone(), &cancel).await.unwrap();
  assert!(first.merge.created() > 0);
  let counts = s.counts().await.unwrap();

  let second = ing.ingest(INDICATION, records, &cancel).await.unwrap();
  assert_eq!(second.merge.created(), 0);
  assert_eq!(second.merge.relationships.updated, 0);
  assert_eq!(s.counts().await.unwrap(), counts);
}

#[tokio::test]
async fn code_name_and_canonical_name_collapse() {
  let s = store().await;
  let ing = ingestor(s.clone(), builtin());
  ing
    .ingest(
      INDICATION,
      vec![
        record("NCT1", "IDEAYA Biosciences", &["IDE196"]),
        record("NCT2", "IDEAYA Biosciences", &["Darovasertib"]),
      ],
      &CancellationToken::new(),
    )
    .await
    .unwrap();

  let counts = s.counts().await.unwrap();
  assert_eq!(counts.assets, 1);
  assert_eq!(counts.asset_links, 2);
  let rels = s.relationships_for_asset(daro()).await.unwrap();
  assert_eq!(rels.len(), 1);
  assert_eq!(rels[0].trial_ids.len(), 2);
}

#[tokio::test]
async fn registry_owner_beats_trial_sponsor() {
  let s = store().await;
  let ing = ingestor(s.clone(), builtin());
  ing
    .ingest(
      INDICATION,
      vec![record("NCT1", "Acme Therapeutics", &["pembrolizumab"])],
      &CancellationToken::new(),
    )
    .await
    .unwrap();

  let acme = CompanyId::from_canonical("Acme Therapeutics");
  let merck = CompanyId::from_canonical("Merck");
  let pembro = AssetId::from_canonical("pembrolizumab");
  let rels = s.relationships_for_asset(pembro).await.unwrap();

  assert!(
    rels
      .iter()
      .any(|r| r.company_id == merck && r.relation == RelationType::Owns)
  );
  assert!(
    !rels
      .iter()
      .any(|r| r.company_id == acme && r.relation == RelationType::Owns)
  );
  let comparator = rels
    .iter()
    .find(|r| r.company_id == acme)
    .expect("comparator edge");
  assert_eq!(comparator.relation, RelationType::UsesAsComparator);
  assert_eq!(comparator.confidence, 0.4);
  assert!(s.get_company(merck).await.unwrap().is_some());
}

#[tokio::test]
async fn combination_partners_are_linked() {
  let s = store().await;
  let ing = ingestor(s.clone(), builtin());
  ing
    .ingest(
      INDICATION,
      vec![record("NCT03947385", "IDEAYA Biosciences", &["IDE196 + crizotinib"])],
      &CancellationToken::new(),
    )
    .await
    .unwrap();

  let links = s
    .asset_links_for_trial(TrialId::from("NCT03947385"))
    .await
    .unwrap();
  assert_eq!(links.len(), 2);
  let daro_link = links.iter().find(|l| l.asset_id == daro()).unwrap();
  assert!(
    daro_link
      .combination_with
      .contains(&AssetId::from_canonical("crizotinib"))
  );
}

// ─── Folds ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn alias_table_update_folds_older_asset() {
  let s = store().await;
  let old_tables = ReferenceData::from_toml(
    r#"
      version = "test.1"

      [[drug]]
      name  = "darovasertib"
      owner = "IDEAYA Biosciences"

      [sponsor_rules]
      industry = ["biosciences"]
    "#,
  )
  .unwrap();
  let cancel = CancellationToken::new();
  let records = vec![record("NCT03947385", "IDEAYA Biosciences", &["IDE196"])];

  ingestor(s.clone(), Arc::new(StaticReference::new(old_tables)))
    .ingest(INDICATION, records.clone(), &cancel)
    .await
    .unwrap();
  let code_name = AssetId::from_canonical("IDE196");
  assert!(s.get_asset(code_name.clone()).await.unwrap().is_some());

  let report = ingestor(s.clone(), builtin())
    .ingest(INDICATION, records, &cancel)
    .await
    .unwrap();
  assert_eq!(report.merge.assets_folded, 1);
  assert_eq!(report.merge.issues.count(IssueKind::NormalizationCollision), 1);

  assert!(s.get_asset(code_name).await.unwrap().is_none());
  let asset = s.get_asset(daro()).await.unwrap().unwrap();
  assert!(asset.synonyms.contains("IDE196"));
  assert_eq!(s.counts().await.unwrap().assets, 1);

  let links = s
    .asset_links_for_trial(TrialId::from("NCT03947385"))
    .await
    .unwrap();
  assert_eq!(links.len(), 1);
  assert_eq!(links[0].asset_id, daro());
}

#[tokio::test]
async fn alias_table_update_folds_older_company() {
  let s = store().await;
  let old_tables = ReferenceData::from_toml(
    r#"
      version = "test.1"

      [[company]]
      name          = "IDEAYA"
      code_prefixes = ["IDE"]

      [sponsor_rules]
      industry = ["ideaya"]
    "#,
  )
  .unwrap();
  let cancel = CancellationToken::new();
  let records = vec![record("NCT05000001", "IDEAYA", &["IDE-397"])];

  ingestor(s.clone(), Arc::new(StaticReference::new(old_tables)))
    .ingest(INDICATION, records.clone(), &cancel)
    .await
    .unwrap();
  let short_name = CompanyId::from_canonical("IDEAYA");
  assert!(s.get_company(short_name.clone()).await.unwrap().is_some());
  assert_eq!(s.relationships_for_company(short_name.clone()).await.unwrap().len(), 1);

  let report = ingestor(s.clone(), builtin())
    .ingest(INDICATION, records, &cancel)
    .await
    .unwrap();
  assert_eq!(report.merge.companies_folded, 1);
  assert_eq!(report.merge.issues.count(IssueKind::NormalizationCollision), 1);

  let canonical = CompanyId::from_canonical("IDEAYA Biosciences");
  assert!(s.get_company(short_name.clone()).await.unwrap().is_none());
  let company = s.get_company(canonical.clone()).await.unwrap().unwrap();
  assert!(company.aliases.contains("IDEAYA"));
  assert_eq!(s.counts().await.unwrap().companies, 1);

  let links = s.sponsor_links_for_company(canonical.clone()).await.unwrap();
  assert_eq!(links.len(), 1);
  assert_eq!(links[0].trial_id, TrialId::from("NCT05000001"));
  assert!(s.sponsor_links_for_company(short_name.clone()).await.unwrap().is_empty());

  let rels = s.relationships_for_company(canonical).await.unwrap();
  assert_eq!(rels.len(), 1);
  assert_eq!(rels[0].asset_id, AssetId::from_canonical("IDE-397"));
  assert_eq!(rels[0].relation, RelationType::Owns);
  assert_eq!(rels[0].provenance, Provenance::PrefixHeuristic);
  assert!(s.relationships_for_company(short_name).await.unwrap().is_empty());
}

// ─── Reference updates ───────────────────────────────────────────────────────

#[tokio::test]
async fn reference_update_retracts_stale_prefix_owner() {
  let s = store().await;
  let acme_only = ReferenceData::from_toml(
    r#"
      version = "test.1"

      [[company]]
      name          = "Acme Therapeutics"
      code_prefixes = ["ACM"]

      [sponsor_rules]
      industry = ["therapeutics"]
    "#,
  )
  .unwrap();
  let with_generic = ReferenceData::from_toml(
    r#"
      version = "test.2"

      [[drug]]
      name             = "ACM-101"
      generic          = true
      standard_of_care = true

      [[company]]
      name          = "Acme Therapeutics"
      code_prefixes = ["ACM"]

      [sponsor_rules]
      industry = ["therapeutics"]
    "#,
  )
  .unwrap();
  let cancel = CancellationToken::new();
  let records = vec![record("NCT01000101", "Acme Therapeutics", &["ACM-101"])];
  let acme = CompanyId::from_canonical("Acme Therapeutics");
  let asset = AssetId::from_canonical("ACM-101");

  ingestor(s.clone(), Arc::new(StaticReference::new(acme_only)))
    .ingest(INDICATION, records.clone(), &cancel)
    .await
    .unwrap();
  let rels = s.relationships_for_asset(asset.clone()).await.unwrap();
  assert_eq!(rels.len(), 1);
  assert_eq!(rels[0].relation, RelationType::Owns);
  assert_eq!(rels[0].provenance, Provenance::PrefixHeuristic);

  let report = ingestor(s.clone(), Arc::new(StaticReference::new(with_generic)))
    .ingest(INDICATION, records, &cancel)
    .await
    .unwrap();
  assert_eq!(report.merge.relationships_retracted, 1);

  let rels = s.relationships_for_asset(asset).await.unwrap();
  assert_eq!(rels.len(), 1);
  assert_eq!(rels[0].company_id, acme);
  assert_eq!(rels[0].relation, RelationType::UsesAsComparator);
}

#[tokio::test]
async fn confirmed_edges_are_never_retracted() {
  let s = store().await;
  let ing = ingestor(s.clone(), builtin());
  let cancel = CancellationToken::new();
  let records = vec![record("NCT1", "Acme Therapeutics", &["pembrolizumab"])];
  ing.ingest(INDICATION, records.clone(), &cancel).await.unwrap();

  let acme = CompanyId::from_canonical("Acme Therapeutics");
  let pembro = AssetId::from_canonical("pembrolizumab");
  ing
    .apply_correction(pembro.clone(), AssetCorrection {
      owner: Some(OwnerCorrection {
        company_id:   Some(acme.clone()),
        company_name: None,
        relation:     RelationType::Owns,
      }),
      ..Default::default()
    })
    .await
    .unwrap();

  let report = ing.ingest(INDICATION, records, &cancel).await.unwrap();
  assert_eq!(report.merge.relationships_retracted, 0);
  let rels = s.relationships_for_asset(pembro).await.unwrap();
  assert!(
    rels
      .iter()
      .any(|r| r.company_id == acme && r.relation == RelationType::Owns && r.is_user_confirmed())
  );
}

// ─── Failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_records_are_skipped() {
  let s = store().await;
  let ing = ingestor(s.clone(), builtin());
  let mut no_url = record("NCT2", "IDEAYA Biosciences", &["IDE196"]);
  no_url.source_urls.clear();

  let report = ing
    .ingest(
      INDICATION,
      vec![record("NCT1", "Immunocore", &["tebentafusp"]), no_url],
      &CancellationToken::new(),
    )
    .await
    .unwrap();
  assert_eq!(report.records_merged, 1);
  assert_eq!(report.records_malformed, 1);
  assert_eq!(report.merge.issues.count(IssueKind::RecordMalformed), 1);
  assert!(s.get_trial(TrialId::from("NCT2")).await.unwrap().is_none());
}

#[tokio::test]
async fn undecodable_json_is_malformed() {
  let s = store().await;
  let ing = ingestor(s.clone(), builtin());
  let report = ing
    .ingest_json(
      INDICATION,
      vec![
        serde_json::json!({ "nct_id": "NCT9", "enrollment": "many" }),
        serde_json::to_value(record("NCT1", "Immunocore", &["tebentafusp"])).unwrap(),
      ],
      &CancellationToken::new(),
    )
    .await
    .unwrap();
  assert_eq!(report.records_malformed, 1);
  assert_eq!(report.records_merged, 1);
  assert_eq!(report.merge.issues.samples[0].subject, "NCT9");
}

#[tokio::test]
async fn unavailable_reference_data_aborts_the_batch() {
  let s = store().await;
  let ing = ingestor(
    s.clone(),
    Arc::new(FileReference::new("/nonexistent/trialgraph/reference.toml")),
  );
  let result = ing
    .ingest(
      INDICATION,
      vec![record("NCT1", "Immunocore", &["tebentafusp"])],
      &CancellationToken::new(),
    )
    .await;
  assert!(matches!(result, Err(Error::ReferenceDataUnavailable(_))));
  assert_eq!(s.counts().await.unwrap(), Default::default());
}

#[tokio::test]
async fn cancelled_run_starts_no_records() {
  let s = store().await;
  let ing = ingestor(s.clone(), builtin());
  let cancel = CancellationToken::new();
  cancel.cancel();
  let report = ing
    .ingest(
      INDICATION,
      vec![
        record("NCT1", "Immunocore", &["tebentafusp"]),
        record("NCT2", "IDEAYA Biosciences", &["IDE196"]),
      ],
      &cancel,
    )
    .await
    .unwrap();
  assert!(report.cancelled);
  assert_eq!(report.records_merged, 0);
  assert_eq!(report.records_not_started, 2);
  assert_eq!(s.counts().await.unwrap().trials, 0);
}

// ─── Corrections ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn corrected_modality_survives_reingestion() {
  let s = store().await;
  let ing = ingestor(s.clone(), builtin());
  let cancel = CancellationToken::new();
  let records = vec![record("NCT02570308", "Immunocore", &["tebentafusp"])];
  ing.ingest(INDICATION, records.clone(), &cancel).await.unwrap();

  let tebentafusp = AssetId::from_canonical("tebentafusp");
  let corrected = ing
    .apply_correction(tebentafusp.clone(), AssetCorrection {
      modality: Some(Modality::Protein),
      editor: Some("curator".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert!(corrected.modality.is_confirmed());

  let report = ing.ingest(INDICATION, records, &cancel).await.unwrap();
  assert!(!report.merge.override_conflicts.is_empty());
  assert!(report.merge.issues.count(IssueKind::OverrideConflict) >= 1);

  let asset = s.get_asset(tebentafusp).await.unwrap().unwrap();
  assert_eq!(asset.modality.value, Some(Modality::Protein));
  assert!(asset.modality.is_confirmed());
}

#[tokio::test]
async fn confirmed_owner_replaces_inferred_comparator() {
  let s = store().await;
  let ing = ingestor(s.clone(), builtin());
  let cancel = CancellationToken::new();
  let records = vec![record("NCT1", "Acme Therapeutics", &["pembrolizumab"])];
  ing.ingest(INDICATION, records.clone(), &cancel).await.unwrap();

  let acme = CompanyId::from_canonical("Acme Therapeutics");
  let pembro = AssetId::from_canonical("pembrolizumab");
  ing
    .apply_correction(pembro.clone(), AssetCorrection {
      owner: Some(OwnerCorrection {
        company_id:   Some(acme.clone()),
        company_name: None,
        relation:     RelationType::Licenses,
      }),
      ..Default::default()
    })
    .await
    .unwrap();

  let acme_edges = |rels: Vec<trialgraph_core::model::Relationship>| {
    rels.into_iter().filter(|r| r.company_id == acme).collect::<Vec<_>>()
  };
  let edges = acme_edges(s.relationships_for_asset(pembro.clone()).await.unwrap());
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0].relation, RelationType::Licenses);
  assert!(edges[0].is_user_confirmed());
  assert_eq!(edges[0].confidence, 1.0);

  // The comparator is inferred again but never written back.
  let report = ing.ingest(INDICATION, records, &cancel).await.unwrap();
  assert_eq!(report.merge.relationships.created, 0);
  let edges = acme_edges(s.relationships_for_asset(pembro).await.unwrap());
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0].relation, RelationType::Licenses);
}

#[tokio::test]
async fn owner_by_new_name_is_created() {
  let s = store().await;
  let ing = ingestor(s.clone(), builtin());
  ing
    .ingest(
      INDICATION,
      vec![record("NCT1", "IDEAYA Biosciences", &["IDE196"])],
      &CancellationToken::new(),
    )
    .await
    .unwrap();

  ing
    .apply_correction(daro(), AssetCorrection {
      owner: Some(OwnerCorrection {
        company_id:   None,
        company_name: Some("Foo Pharmaceuticals".into()),
        relation:     RelationType::Licenses,
      }),
      editor: Some("curator".into()),
      ..Default::default()
    })
    .await
    .unwrap();

  let foo = CompanyId::from_canonical("Foo Pharmaceuticals");
  let company = s.get_company(foo.clone()).await.unwrap().unwrap();
  assert_eq!(company.org_type.value, OrganizationType::Industry);

  let rels = s.relationships_for_company(foo).await.unwrap();
  assert_eq!(rels.len(), 1);
  assert_eq!(rels[0].provenance, Provenance::UserConfirmed);
  // IDEAYA's registry edge is a different pair and stays.
  assert_eq!(s.relationships_for_asset(daro()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn rejected_correction_writes_nothing() {
  let s = store().await;
  let ing = ingestor(s.clone(), builtin());
  ing
    .ingest(
      INDICATION,
      vec![record("NCT03947385", "IDEAYA Biosciences", &["IDE196"])],
      &CancellationToken::new(),
    )
    .await
    .unwrap();
  let before = s.get_asset(daro()).await.unwrap().unwrap();

  let result = ing
    .apply_correction(daro(), AssetCorrection {
      modality: Some(Modality::Antibody),
      owner: Some(OwnerCorrection {
        company_id:   Some(CompanyId::from("company_missing")),
        company_name: None,
        relation:     RelationType::Owns,
      }),
      ..Default::default()
    })
    .await;
  assert!(matches!(result, Err(Error::CompanyNotFound(_))));

  let after = s.get_asset(daro()).await.unwrap().unwrap();
  assert_eq!(after.modality.value, Some(Modality::SmallMolecule));
  assert!(!after.modality.is_confirmed());
  assert_eq!(after.evidence.len(), before.evidence.len());
}

#[tokio::test]
async fn correcting_a_missing_asset_fails() {
  let s = store().await;
  let ing = ingestor(s, builtin());
  let result = ing
    .apply_correction(AssetId::from("asset_missing"), AssetCorrection {
      modality: Some(Modality::Antibody),
      ..Default::default()
    })
    .await;
  assert!(matches!(result, Err(Error::AssetNotFound(_))));
}
