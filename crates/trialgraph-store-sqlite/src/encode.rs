//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Enumerations are stored as their snake_case string forms. Sets, lists,
//! evidence and tracked fields are stored as compact JSON.

use std::str::FromStr;

use serde::{Serialize, de::DeserializeOwned};
use trialgraph_core::{
  model::{
    Asset, AssetTrialLink, Company, OrganizationType, Provenance, RelationType, Relationship,
    SponsorLink, SponsorRole, Trial,
  },
  policy::{FieldProvenance, Tracked},
};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

pub fn decode_json<T: DeserializeOwned>(s: &str) -> Result<T> { Ok(serde_json::from_str(s)?) }

/// Parse a strum-encoded enum column.
pub fn decode_enum<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| Error::Decode { column, value: s.to_owned() })
}

pub fn encode_field_provenance(p: FieldProvenance) -> &'static str {
  match p {
    FieldProvenance::Inferred => "inferred",
    FieldProvenance::UserConfirmed => "user_confirmed",
  }
}

pub fn decode_field_provenance(s: &str) -> Result<FieldProvenance> {
  match s {
    "inferred" => Ok(FieldProvenance::Inferred),
    "user_confirmed" => Ok(FieldProvenance::UserConfirmed),
    other => Err(Error::Decode {
      column: "org_type_provenance",
      value:  other.to_owned(),
    }),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const COMPANY_COLUMNS: &str =
  "company_id, canonical_name, aliases, org_type, org_type_provenance, country, tickers, evidence";

/// Raw strings of a `companies` row.
pub struct RawCompany {
  pub company_id:          String,
  pub canonical_name:      String,
  pub aliases:             String,
  pub org_type:            String,
  pub org_type_provenance: String,
  pub country:             String,
  pub tickers:             String,
  pub evidence:            String,
}

impl RawCompany {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      company_id:          row.get(0)?,
      canonical_name:      row.get(1)?,
      aliases:             row.get(2)?,
      org_type:            row.get(3)?,
      org_type_provenance: row.get(4)?,
      country:             row.get(5)?,
      tickers:             row.get(6)?,
      evidence:            row.get(7)?,
    })
  }

  pub fn encode(c: &Company) -> Result<Self> {
    Ok(Self {
      company_id:          c.company_id.to_string(),
      canonical_name:      c.canonical_name.clone(),
      aliases:             encode_json(&c.aliases)?,
      org_type:            c.org_type.value.to_string(),
      org_type_provenance: encode_field_provenance(c.org_type.provenance).to_owned(),
      country:             encode_json(&c.country)?,
      tickers:             encode_json(&c.tickers)?,
      evidence:            encode_json(&c.evidence)?,
    })
  }

  pub fn into_company(self) -> Result<Company> {
    let org_type: OrganizationType = decode_enum("org_type", &self.org_type)?;
    Ok(Company {
      company_id:     self.company_id.into(),
      canonical_name: self.canonical_name,
      aliases:        decode_json(&self.aliases)?,
      org_type:       Tracked {
        value:      org_type,
        provenance: decode_field_provenance(&self.org_type_provenance)?,
      },
      country:        decode_json(&self.country)?,
      tickers:        decode_json(&self.tickers)?,
      evidence:       decode_json(&self.evidence)?,
    })
  }
}

pub const ASSET_COLUMNS: &str = "asset_id, canonical_name, synonyms, modality, targets, \
                                 indications, stage, approved, evidence";

/// Raw strings of an `assets` row.
pub struct RawAsset {
  pub asset_id:       String,
  pub canonical_name: String,
  pub synonyms:       String,
  pub modality:       String,
  pub targets:        String,
  pub indications:    String,
  pub stage:          String,
  pub approved:       String,
  pub evidence:       String,
}

impl RawAsset {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      asset_id:       row.get(0)?,
      canonical_name: row.get(1)?,
      synonyms:       row.get(2)?,
      modality:       row.get(3)?,
      targets:        row.get(4)?,
      indications:    row.get(5)?,
      stage:          row.get(6)?,
      approved:       row.get(7)?,
      evidence:       row.get(8)?,
    })
  }

  pub fn encode(a: &Asset) -> Result<Self> {
    Ok(Self {
      asset_id:       a.asset_id.to_string(),
      canonical_name: a.canonical_name.clone(),
      synonyms:       encode_json(&a.synonyms)?,
      modality:       encode_json(&a.modality)?,
      targets:        encode_json(&a.targets)?,
      indications:    encode_json(&a.indications)?,
      stage:          encode_json(&a.stage)?,
      approved:       encode_json(&a.approved)?,
      evidence:       encode_json(&a.evidence)?,
    })
  }

  pub fn into_asset(self) -> Result<Asset> {
    Ok(Asset {
      asset_id:       self.asset_id.into(),
      canonical_name: self.canonical_name,
      synonyms:       decode_json(&self.synonyms)?,
      modality:       decode_json(&self.modality)?,
      targets:        decode_json(&self.targets)?,
      indications:    decode_json(&self.indications)?,
      stage:          decode_json(&self.stage)?,
      approved:       decode_json(&self.approved)?,
      evidence:       decode_json(&self.evidence)?,
    })
  }
}

pub const TRIAL_COLUMNS: &str = "trial_id, title, phase, status, enrollment, sponsors, \
                                 interventions, conditions, source_urls, evidence";

/// Raw values of a `trials` row.
pub struct RawTrial {
  pub trial_id:      String,
  pub title:         Option<String>,
  pub phase:         Option<String>,
  pub status:        Option<String>,
  pub enrollment:    Option<u32>,
  pub sponsors:      String,
  pub interventions: String,
  pub conditions:    String,
  pub source_urls:   String,
  pub evidence:      String,
}

impl RawTrial {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      trial_id:      row.get(0)?,
      title:         row.get(1)?,
      phase:         row.get(2)?,
      status:        row.get(3)?,
      enrollment:    row.get(4)?,
      sponsors:      row.get(5)?,
      interventions: row.get(6)?,
      conditions:    row.get(7)?,
      source_urls:   row.get(8)?,
      evidence:      row.get(9)?,
    })
  }

  pub fn encode(t: &Trial) -> Result<Self> {
    Ok(Self {
      trial_id:      t.trial_id.to_string(),
      title:         t.title.clone(),
      phase:         t.phase.clone(),
      status:        t.status.clone(),
      enrollment:    t.enrollment,
      sponsors:      encode_json(&t.sponsors)?,
      interventions: encode_json(&t.interventions)?,
      conditions:    encode_json(&t.conditions)?,
      source_urls:   encode_json(&t.source_urls)?,
      evidence:      encode_json(&t.evidence)?,
    })
  }

  pub fn into_trial(self) -> Result<Trial> {
    Ok(Trial {
      trial_id:      self.trial_id.into(),
      title:         self.title,
      phase:         self.phase,
      status:        self.status,
      enrollment:    self.enrollment,
      sponsors:      decode_json(&self.sponsors)?,
      interventions: decode_json(&self.interventions)?,
      conditions:    decode_json(&self.conditions)?,
      source_urls:   decode_json(&self.source_urls)?,
      evidence:      decode_json(&self.evidence)?,
    })
  }
}

pub const RELATIONSHIP_COLUMNS: &str =
  "company_id, asset_id, relation, confidence, provenance, trial_ids, evidence";

/// Raw values of a `relationships` row.
pub struct RawRelationship {
  pub company_id: String,
  pub asset_id:   String,
  pub relation:   String,
  pub confidence: f64,
  pub provenance: String,
  pub trial_ids:  String,
  pub evidence:   String,
}

impl RawRelationship {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      company_id: row.get(0)?,
      asset_id:   row.get(1)?,
      relation:   row.get(2)?,
      confidence: row.get(3)?,
      provenance: row.get(4)?,
      trial_ids:  row.get(5)?,
      evidence:   row.get(6)?,
    })
  }

  pub fn encode(r: &Relationship) -> Result<Self> {
    Ok(Self {
      company_id: r.company_id.to_string(),
      asset_id:   r.asset_id.to_string(),
      relation:   r.relation.to_string(),
      confidence: r.confidence,
      provenance: r.provenance.to_string(),
      trial_ids:  encode_json(&r.trial_ids)?,
      evidence:   encode_json(&r.evidence)?,
    })
  }

  pub fn into_relationship(self) -> Result<Relationship> {
    let relation: RelationType = decode_enum("relation", &self.relation)?;
    let provenance: Provenance = decode_enum("provenance", &self.provenance)?;
    Ok(Relationship {
      company_id: self.company_id.into(),
      asset_id: self.asset_id.into(),
      relation,
      confidence: self.confidence,
      provenance,
      trial_ids: decode_json(&self.trial_ids)?,
      evidence: decode_json(&self.evidence)?,
    })
  }
}

pub const SPONSOR_LINK_COLUMNS: &str = "company_id, trial_id, role, evidence";

pub struct RawSponsorLink {
  pub company_id: String,
  pub trial_id:   String,
  pub role:       String,
  pub evidence:   String,
}

impl RawSponsorLink {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      company_id: row.get(0)?,
      trial_id:   row.get(1)?,
      role:       row.get(2)?,
      evidence:   row.get(3)?,
    })
  }

  pub fn encode(l: &SponsorLink) -> Result<Self> {
    Ok(Self {
      company_id: l.company_id.to_string(),
      trial_id:   l.trial_id.to_string(),
      role:       l.role.to_string(),
      evidence:   encode_json(&l.evidence)?,
    })
  }

  pub fn into_link(self) -> Result<SponsorLink> {
    let role: SponsorRole = decode_enum("role", &self.role)?;
    Ok(SponsorLink {
      company_id: self.company_id.into(),
      trial_id: self.trial_id.into(),
      role,
      evidence: decode_json(&self.evidence)?,
    })
  }
}

pub const ASSET_LINK_COLUMNS: &str = "asset_id, trial_id, raw_names, combination_with, evidence";

pub struct RawAssetLink {
  pub asset_id:         String,
  pub trial_id:         String,
  pub raw_names:        String,
  pub combination_with: String,
  pub evidence:         String,
}

impl RawAssetLink {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      asset_id:         row.get(0)?,
      trial_id:         row.get(1)?,
      raw_names:        row.get(2)?,
      combination_with: row.get(3)?,
      evidence:         row.get(4)?,
    })
  }

  pub fn encode(l: &AssetTrialLink) -> Result<Self> {
    Ok(Self {
      asset_id:         l.asset_id.to_string(),
      trial_id:         l.trial_id.to_string(),
      raw_names:        encode_json(&l.raw_names)?,
      combination_with: encode_json(&l.combination_with)?,
      evidence:         encode_json(&l.evidence)?,
    })
  }

  pub fn into_link(self) -> Result<AssetTrialLink> {
    Ok(AssetTrialLink {
      asset_id:         self.asset_id.into(),
      trial_id:         self.trial_id.into(),
      raw_names:        decode_json(&self.raw_names)?,
      combination_with: decode_json(&self.combination_with)?,
      evidence:         decode_json(&self.evidence)?,
    })
  }
}
