//! Deterministic identifiers and the normalized keys they are derived from.
//!
//! Company and asset ids are a SHA-256 digest of a normalized key of the
//! canonical name, so every run and every process agrees on them. Trial ids
//! are supplied by the upstream registry and only trimmed.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Trailing tokens removed from company keys. Matched after punctuation has
/// been folded away, so `S.A.` arrives here as `sa` and `A/S` as `as`.
const LEGAL_SUFFIXES: &[&str] = &[
  "inc",
  "incorporated",
  "ltd",
  "limited",
  "llc",
  "llp",
  "lp",
  "plc",
  "corp",
  "corporation",
  "co",
  "company",
  "gmbh",
  "ag",
  "sa",
  "sas",
  "srl",
  "spa",
  "nv",
  "bv",
  "ab",
  "as",
  "oy",
  "kk",
  "pty",
];

// ─── Keys ────────────────────────────────────────────────────────────────────

/// Normalized company key: lower-cased, punctuation folded, whitespace
/// collapsed and trailing legal-entity suffixes stripped.
///
/// `"Merck & Co., Inc."` and `"MERCK and co"` both become `"merck"`. A key is
/// never stripped down to nothing, so `"AB"` stays `"ab"`.
pub fn company_key(raw: &str) -> String {
  let mut folded = String::with_capacity(raw.len());
  for ch in raw.chars().flat_map(char::to_lowercase) {
    match ch {
      '.' | '\'' | '\u{2019}' | '/' => {}
      '&' => folded.push_str(" and "),
      c if c.is_alphanumeric() => folded.push(c),
      _ => folded.push(' '),
    }
  }

  let mut tokens: Vec<&str> = folded.split_whitespace().collect();
  while tokens.len() > 1 {
    match tokens.last() {
      Some(t) if *t == "and" || LEGAL_SUFFIXES.contains(t) => {
        tokens.pop();
      }
      _ => break,
    }
  }
  tokens.join(" ")
}

/// Normalized asset key: lower-cased alphanumerics only.
///
/// Code names are written inconsistently (`IDE196`, `IDE-196`, `ide 196`), so
/// every separator is dropped rather than collapsed.
pub fn asset_key(raw: &str) -> String {
  raw
    .chars()
    .flat_map(char::to_lowercase)
    .filter(|c| c.is_alphanumeric())
    .collect()
}

fn digest(prefix: &str, key: &str) -> String {
  let hash = Sha256::digest(key.as_bytes());
  format!("{prefix}_{}", hex::encode(&hash[..8]))
}

// ─── Id types ────────────────────────────────────────────────────────────────

macro_rules! string_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(String);

    impl $name {
      pub fn as_str(&self) -> &str { &self.0 }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
      }
    }

    impl From<String> for $name {
      fn from(s: String) -> Self { Self(s) }
    }

    impl From<&str> for $name {
      fn from(s: &str) -> Self { Self(s.to_owned()) }
    }
  };
}

string_id!(
  /// Stable company id, a pure function of the canonical name's key.
  CompanyId
);

string_id!(
  /// Stable asset id, a pure function of the canonical name's key.
  AssetId
);

string_id!(
  /// External trial identifier (e.g. an NCT number). Immutable.
  TrialId
);

impl CompanyId {
  pub fn from_canonical(name: &str) -> Self {
    Self(digest("company", &company_key(name)))
  }
}

impl AssetId {
  pub fn from_canonical(name: &str) -> Self {
    Self(digest("asset", &asset_key(name)))
  }
}

impl TrialId {
  /// Trim surrounding whitespace; returns `None` for a blank identifier.
  pub fn parse(raw: &str) -> Option<Self> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| Self(trimmed.to_owned()))
  }
}
