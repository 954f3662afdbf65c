//! Versioned alias and ownership reference tables.
//!
//! The tables are an immutable value built once per batch and shared behind
//! an [`Arc`]. Every lookup is keyed by the same normalized keys used to
//! derive ids ([`asset_key`], [`company_key`]), so a lookup never depends on
//! the casing or punctuation of the raw string.

use std::{
  collections::{BTreeMap, BTreeSet, HashMap},
  path::{Path, PathBuf},
  sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  ids::{asset_key, company_key},
  model::Modality,
};

const BUILTIN: &str = include_str!("../data/reference.toml");

// ─── File format ─────────────────────────────────────────────────────────────

/// A registered drug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugEntry {
  pub name:             String,
  #[serde(default)]
  pub aliases:          Vec<String>,
  /// Canonical name of the registered owner. Absent for generics.
  #[serde(default)]
  pub owner:            Option<String>,
  #[serde(default)]
  pub modality:         Option<Modality>,
  #[serde(default)]
  pub targets:          Vec<String>,
  #[serde(default)]
  pub approved:         Option<bool>,
  #[serde(default)]
  pub brand_name:       Option<String>,
  #[serde(default)]
  pub generic:          bool,
  /// Routinely given as a comparator in other sponsors' trials.
  #[serde(default)]
  pub standard_of_care: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyEntry {
  pub name:          String,
  #[serde(default)]
  pub aliases:       Vec<String>,
  #[serde(default)]
  pub code_prefixes: Vec<String>,
}

/// Raw pattern lists for the sponsor classifier. `investigator` entries are
/// regular expressions; the rest are plain phrases matched on word
/// boundaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SponsorRules {
  #[serde(default)]
  pub investigator:   Vec<String>,
  #[serde(default)]
  pub government:     Vec<String>,
  #[serde(default)]
  pub nonprofit:      Vec<String>,
  #[serde(default)]
  pub academic:       Vec<String>,
  #[serde(default)]
  pub industry:       Vec<String>,
  #[serde(default)]
  pub known_industry: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReferenceFile {
  version:       String,
  #[serde(default, rename = "drug")]
  drugs:         Vec<DrugEntry>,
  #[serde(default, rename = "company")]
  companies:     Vec<CompanyEntry>,
  sponsor_rules: SponsorRules,
}

// ─── ReferenceData ───────────────────────────────────────────────────────────

/// Indexed reference tables.
#[derive(Debug, Clone)]
pub struct ReferenceData {
  version:         String,
  /// Canonical asset key → entry.
  drugs:           BTreeMap<String, DrugEntry>,
  /// Asset key of every name and alias → canonical asset key.
  asset_index:     HashMap<String, String>,
  companies:       BTreeMap<String, CompanyEntry>,
  /// Company key of every name and alias → canonical company key.
  company_index:   HashMap<String, String>,
  sponsor_rules:   SponsorRules,
}

impl ReferenceData {
  /// The tables shipped with the binary.
  pub fn builtin() -> Result<Self> { Self::from_toml(BUILTIN) }

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
      Error::ReferenceDataUnavailable(format!("{}: {e}", path.display()))
    })?;
    Self::from_toml(&text)
  }

  pub fn from_toml(text: &str) -> Result<Self> {
    let file: ReferenceFile = toml::from_str(text)
      .map_err(|e| Error::InvalidReferenceData(e.to_string()))?;
    Self::from_parts(file.version, file.drugs, file.companies, file.sponsor_rules)
  }

  /// Build and validate the indexes. Two entries claiming the same
  /// normalized name for different canonical entities is an error.
  pub fn from_parts(
    version: String,
    drug_entries: Vec<DrugEntry>,
    company_entries: Vec<CompanyEntry>,
    sponsor_rules: SponsorRules,
  ) -> Result<Self> {
    if version.trim().is_empty() {
      return Err(Error::InvalidReferenceData("empty version".into()));
    }

    let mut drugs = BTreeMap::new();
    let mut asset_index = HashMap::new();
    for entry in drug_entries {
      let key = asset_key(&entry.name);
      if key.is_empty() {
        return Err(Error::InvalidReferenceData(format!(
          "drug name {:?} has no alphanumeric characters",
          entry.name
        )));
      }
      if drugs.contains_key(&key) {
        return Err(Error::InvalidReferenceData(format!(
          "duplicate drug {:?}",
          entry.name
        )));
      }
      let names = std::iter::once(&entry.name)
        .chain(&entry.aliases)
        .chain(&entry.brand_name);
      for name in names {
        index_name(&mut asset_index, asset_key(name), &key, name, "drug")?;
      }
      drugs.insert(key, entry);
    }

    let mut companies = BTreeMap::new();
    let mut company_index = HashMap::new();
    for entry in company_entries {
      let key = company_key(&entry.name);
      if companies.contains_key(&key) {
        return Err(Error::InvalidReferenceData(format!(
          "duplicate company {:?}",
          entry.name
        )));
      }
      for name in std::iter::once(&entry.name).chain(&entry.aliases) {
        index_name(&mut company_index, company_key(name), &key, name, "company")?;
      }
      companies.insert(key, entry);
    }

    Ok(Self {
      version,
      drugs,
      asset_index,
      companies,
      company_index,
      sponsor_rules,
    })
  }

  pub fn version(&self) -> &str { &self.version }

  /// Canonical drug name for a raw name or alias, if registered.
  pub fn canonical_asset(&self, raw: &str) -> Option<&str> {
    self.drug(raw).map(|d| d.name.as_str())
  }

  /// The registry entry for a raw name or alias.
  pub fn drug(&self, raw: &str) -> Option<&DrugEntry> {
    let key = self.asset_index.get(&asset_key(raw))?;
    self.drugs.get(key)
  }

  /// Registered aliases and brand name of a drug, canonical name excluded.
  pub fn aliases_of(&self, raw: &str) -> Vec<&str> {
    self
      .drug(raw)
      .map(|d| {
        d.aliases
          .iter()
          .chain(&d.brand_name)
          .map(String::as_str)
          .collect()
      })
      .unwrap_or_default()
  }

  pub fn known_owner(&self, raw: &str) -> Option<&str> {
    self.drug(raw).and_then(|d| d.owner.as_deref())
  }

  /// Generic and standard-of-care drugs are never attributed to a trial
  /// sponsor.
  pub fn is_never_attribute(&self, raw: &str) -> bool {
    self
      .drug(raw)
      .is_some_and(|d| d.generic || d.standard_of_care)
  }

  /// Canonical company name for a raw name or alias, if registered.
  pub fn canonical_company(&self, raw: &str) -> Option<&str> {
    self.company_entry(raw).map(|c| c.name.as_str())
  }

  pub fn company_aliases_of(&self, raw: &str) -> &[String] {
    self
      .company_entry(raw)
      .map(|c| c.aliases.as_slice())
      .unwrap_or_default()
  }

  pub fn code_prefixes(&self, raw: &str) -> &[String] {
    self
      .company_entry(raw)
      .map(|c| c.code_prefixes.as_slice())
      .unwrap_or_default()
  }

  pub fn sponsor_rules(&self) -> &SponsorRules { &self.sponsor_rules }

  /// All registered drugs, ordered by canonical key.
  pub fn drugs(&self) -> impl Iterator<Item = &DrugEntry> { self.drugs.values() }

  fn company_entry(&self, raw: &str) -> Option<&CompanyEntry> {
    let key = self.company_index.get(&company_key(raw))?;
    self.companies.get(key)
  }

  /// Company names in the tables whose canonical form is `canonical`,
  /// including the canonical name itself.
  pub fn company_names(&self, canonical: &str) -> BTreeSet<&str> {
    match self.company_entry(canonical) {
      Some(entry) => std::iter::once(entry.name.as_str())
        .chain(entry.aliases.iter().map(String::as_str))
        .collect(),
      None => BTreeSet::new(),
    }
  }
}

fn index_name(
  index: &mut HashMap<String, String>,
  key: String,
  canonical: &str,
  name: &str,
  kind: &str,
) -> Result<()> {
  if key.is_empty() {
    return Ok(());
  }
  match index.get(&key) {
    Some(existing) if existing != canonical => Err(Error::InvalidReferenceData(
      format!("{kind} alias {name:?} claimed by both {existing:?} and {canonical:?}"),
    )),
    _ => {
      index.insert(key, canonical.to_owned());
      Ok(())
    }
  }
}

// ─── Sources ─────────────────────────────────────────────────────────────────

/// Supplies the reference tables for a batch. Called once at the start of
/// every batch; a failure aborts the batch.
pub trait ReferenceSource: Send + Sync {
  fn current(&self) -> Result<Arc<ReferenceData>>;
}

/// A fixed in-memory set of tables.
#[derive(Debug, Clone)]
pub struct StaticReference(Arc<ReferenceData>);

impl StaticReference {
  pub fn new(data: ReferenceData) -> Self { Self(Arc::new(data)) }
}

impl ReferenceSource for StaticReference {
  fn current(&self) -> Result<Arc<ReferenceData>> { Ok(self.0.clone()) }
}

/// Tables read from a TOML file at every batch, so out-of-band edits are
/// picked up by the next run.
#[derive(Debug, Clone)]
pub struct FileReference {
  path: PathBuf,
}

impl FileReference {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  pub fn path(&self) -> &Path { &self.path }
}

impl ReferenceSource for FileReference {
  fn current(&self) -> Result<Arc<ReferenceData>> {
    ReferenceData::load(&self.path)
      .map(Arc::new)
      .map_err(|e| match e {
        Error::ReferenceDataUnavailable(_) => e,
        other => Error::ReferenceDataUnavailable(other.to_string()),
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn builtin() -> ReferenceData { ReferenceData::builtin().unwrap() }

  #[test]
  fn builtin_tables_parse() {
    let data = builtin();
    assert!(!data.version().is_empty());
    assert!(data.drugs().count() > 10);
  }

  #[test]
  fn aliases_resolve_regardless_of_punctuation() {
    let data = builtin();
    assert_eq!(data.canonical_asset("IDE196"), Some("darovasertib"));
    assert_eq!(data.canonical_asset("ide-196"), Some("darovasertib"));
    assert_eq!(data.canonical_asset("KEYTRUDA"), Some("pembrolizumab"));
    assert_eq!(data.canonical_asset("MK 3475"), Some("pembrolizumab"));
    assert_eq!(data.canonical_asset("IDE397"), None);
  }

  #[test]
  fn owners_and_never_attribute() {
    let data = builtin();
    assert_eq!(data.known_owner("IDE196"), Some("IDEAYA Biosciences"));
    assert_eq!(data.known_owner("dacarbazine"), None);
    assert!(data.is_never_attribute("dacarbazine"));
    assert!(data.is_never_attribute("Keytruda"));
    assert!(!data.is_never_attribute("darovasertib"));
    assert!(!data.is_never_attribute("unknown-drug"));
  }

  #[test]
  fn company_aliases_resolve() {
    let data = builtin();
    assert_eq!(data.canonical_company("Merck Sharp & Dohme LLC"), Some("Merck"));
    assert_eq!(data.canonical_company("IDEAYA Biosciences, Inc."), Some("IDEAYA Biosciences"));
    assert_eq!(data.canonical_company("Genentech, Inc."), Some("Roche"));
    assert_eq!(data.code_prefixes("IDEAYA Biosciences"), ["IDE".to_owned()]);
    assert!(data.code_prefixes("Unknown Pharma").is_empty());
  }

  #[test]
  fn conflicting_alias_is_rejected() {
    let text = r#"
      version = "t1"
      [[drug]]
      name = "alpha"
      aliases = ["X-1"]
      [[drug]]
      name = "beta"
      aliases = ["x1"]
      [sponsor_rules]
    "#;
    let err = ReferenceData::from_toml(text).unwrap_err();
    assert!(matches!(err, Error::InvalidReferenceData(_)));
  }

  #[test]
  fn missing_sponsor_rules_is_rejected() {
    let err = ReferenceData::from_toml(r#"version = "t1""#).unwrap_err();
    assert!(matches!(err, Error::InvalidReferenceData(_)));
  }

  #[test]
  fn missing_file_is_unavailable() {
    let source = FileReference::new("/nonexistent/trialgraph/reference.toml");
    let err = source.current().unwrap_err();
    assert!(matches!(err, Error::ReferenceDataUnavailable(_)));
  }
}
