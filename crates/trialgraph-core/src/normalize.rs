//! Company and asset name normalization.
//!
//! Both normalizations are pure functions of the raw string and the reference
//! tables. A raw intervention string may describe several assets (a
//! combination arm) or none at all (placebo, observation), so
//! [`Normalizer::parse_intervention`] cleans and splits it before each
//! component is resolved.

use std::{collections::BTreeSet, sync::Arc};

use regex::Regex;
use serde::Serialize;

use crate::{
  Error, Result,
  ids::{AssetId, CompanyId, asset_key, company_key},
  reference::ReferenceData,
};

/// Interventions that never denote an asset.
const SKIP: &str = r"(?i)^(?:placebos?\b.*|sham\b.*|standard\s+of\s+care|best\s+supportive\s+care|observation|no\s+intervention|wait-?list.*)$";

/// Dosage, schedule and concentration text.
const DOSAGE: &[&str] = &[
  r"(?i)\b\d+(?:\.\d+)?\s*(?:mg|g|ml|mcg|ug|µg|iu|units?)\b(?:\s*/\s*(?:kg|m2|day|week)\b)?",
  r"(?i)\b\d+(?:\.\d+)?\s*%",
  r"(?i)\bq\d+[dwmh]\b",
  r"(?i)\bevery\s+\d+\s+(?:days?|weeks?|months?)\b",
];

const PARENTHETICAL: &str = r"\([^)]*\)";

/// Separators between the components of a combination arm. Longer phrases
/// start earlier in the haystack, so they win over the bare `with`.
const COMBINATION: &str = r"(?i)\s*\+\s*|\s+plus\s+|\s+in\s+combination\s+with\s+|\s+combined\s+with\s+|\s+and\s+|\s+with\s+|\s*/\s*";

// ─── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedCompany {
  pub company_id:     CompanyId,
  pub canonical_name: String,
  pub key:            String,
  /// Registered aliases of the canonical company.
  pub known_aliases:  Vec<String>,
}

impl NormalizedCompany {
  /// Resolve a raw company name through the alias table, falling back to
  /// the cleaned raw string.
  pub fn resolve(reference: &ReferenceData, raw: &str) -> Self {
    let canonical_name = reference
      .canonical_company(raw)
      .map(str::to_owned)
      .unwrap_or_else(|| collapse(raw));
    Self {
      company_id: CompanyId::from_canonical(&canonical_name),
      key: company_key(&canonical_name),
      known_aliases: reference.company_aliases_of(raw).to_vec(),
      canonical_name,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedAsset {
  pub asset_id:       AssetId,
  pub canonical_name: String,
  /// The cleaned component string this asset was resolved from.
  pub raw:            String,
  pub registered:     bool,
  /// Registered aliases and brand name.
  pub known_aliases:  Vec<String>,
}

impl NormalizedAsset {
  /// Every name known for this asset other than the canonical one: the
  /// observed string first, then registered aliases. Case-insensitive
  /// duplicates are dropped.
  pub fn synonyms(&self) -> BTreeSet<String> {
    let mut seen = BTreeSet::from([self.canonical_name.to_lowercase()]);
    std::iter::once(&self.raw)
      .chain(&self.known_aliases)
      .filter(|name| seen.insert(name.to_lowercase()))
      .cloned()
      .collect()
  }
}

/// One raw intervention string, cleaned and split into assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedIntervention {
  pub raw:        String,
  /// Distinct assets in the arm, in order of appearance.
  pub components: Vec<NormalizedAsset>,
}

// ─── Normalizer ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Normalizer {
  reference:     Arc<ReferenceData>,
  skip:          Regex,
  dosage:        Vec<Regex>,
  parenthetical: Regex,
  combination:   Regex,
}

impl Normalizer {
  pub fn new(reference: Arc<ReferenceData>) -> Result<Self> {
    Ok(Self {
      reference,
      skip: compile(SKIP)?,
      dosage: DOSAGE.iter().map(|p| compile(p)).collect::<Result<_>>()?,
      parenthetical: compile(PARENTHETICAL)?,
      combination: compile(COMBINATION)?,
    })
  }

  pub fn reference(&self) -> &Arc<ReferenceData> { &self.reference }

  pub fn normalize_company(&self, raw: &str) -> NormalizedCompany {
    NormalizedCompany::resolve(&self.reference, raw)
  }

  /// Resolve one cleaned asset name. Registered names map to their canonical
  /// drug; anything else is its own canonical name.
  pub fn normalize_asset(&self, raw: &str) -> NormalizedAsset {
    let raw = collapse(raw);
    match self.reference.canonical_asset(&raw) {
      Some(canonical) => NormalizedAsset {
        asset_id:       AssetId::from_canonical(canonical),
        canonical_name: canonical.to_owned(),
        known_aliases:  self
          .reference
          .aliases_of(canonical)
          .into_iter()
          .map(str::to_owned)
          .collect(),
        registered:     true,
        raw,
      },
      None => NormalizedAsset {
        asset_id:       AssetId::from_canonical(&raw),
        canonical_name: raw.clone(),
        known_aliases:  Vec::new(),
        registered:     false,
        raw,
      },
    }
  }

  /// Clean a raw intervention string and split it into assets. Returns
  /// `None` when nothing in it denotes an asset.
  pub fn parse_intervention(&self, raw: &str) -> Option<ParsedIntervention> {
    let trimmed = collapse(raw);
    if trimmed.is_empty() || self.skip.is_match(&trimmed) {
      return None;
    }

    let mut cleaned = self.parenthetical.replace_all(&trimmed, " ").into_owned();
    for pattern in &self.dosage {
      cleaned = pattern.replace_all(&cleaned, " ").into_owned();
    }

    let mut seen = BTreeSet::new();
    let components: Vec<NormalizedAsset> = self
      .combination
      .split(&cleaned)
      .map(|part| {
        part.trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '-' | ':'))
      })
      .filter(|part| part.chars().any(char::is_alphabetic))
      .filter(|part| !self.skip.is_match(&collapse(part)))
      .map(|part| self.normalize_asset(part))
      .filter(|asset| !asset_key(&asset.canonical_name).is_empty())
      .filter(|asset| seen.insert(asset.asset_id.clone()))
      .collect();

    (!components.is_empty()).then(|| ParsedIntervention {
      raw: trimmed,
      components,
    })
  }
}

fn collapse(raw: &str) -> String { raw.split_whitespace().collect::<Vec<_>>().join(" ") }

fn compile(pattern: &str) -> Result<Regex> {
  Regex::new(pattern).map_err(|source| Error::InvalidPattern {
    pattern: pattern.to_owned(),
    source,
  })
}
