//! Raw trial records as supplied by the fetcher, and their validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  ids::TrialId,
  model::{SponsorClass, SponsorRole, TrialSponsor},
};

/// A sponsor entry exactly as it arrived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSponsor {
  pub name:  String,
  /// `lead_sponsor` / `lead` or `collaborator`; anything else counts as a
  /// collaborator.
  pub role:  Option<String>,
  /// Registry sponsor class (`INDUSTRY`, `NIH`, …).
  #[serde(alias = "class_hint")]
  pub class: Option<String>,
}

/// A trial record as produced by the fetcher. Every field is optional at
/// this stage; [`RawTrialRecord::validate`] decides whether it is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTrialRecord {
  #[serde(alias = "nct_id")]
  pub trial_id:      String,
  pub title:         Option<String>,
  pub phase:         Option<String>,
  pub status:        Option<String>,
  pub enrollment:    Option<u32>,
  pub sponsors:      Vec<RawSponsor>,
  pub interventions: Vec<String>,
  pub conditions:    Vec<String>,
  #[serde(alias = "source_url")]
  pub source_urls:   Vec<String>,
}

/// A record that cannot be ingested. The batch skips it and carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("malformed record {}: {reason}", .trial_id.as_deref().unwrap_or("<no id>"))]
pub struct RecordMalformed {
  pub trial_id: Option<String>,
  pub reason:   String,
}

/// A validated record: it has an id, at least one named sponsor and at least
/// one source to cite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRecord {
  pub trial_id:      TrialId,
  pub title:         Option<String>,
  pub phase:         Option<String>,
  pub status:        Option<String>,
  pub enrollment:    Option<u32>,
  pub sponsors:      Vec<TrialSponsor>,
  pub interventions: Vec<String>,
  pub conditions:    Vec<String>,
  pub source_urls:   Vec<String>,
}

impl TrialRecord {
  /// The URL cited by evidence derived from this record.
  pub fn primary_url(&self) -> Option<&str> {
    self.source_urls.first().map(String::as_str)
  }
}

impl RawTrialRecord {
  /// Decode a JSON record. A shape error is reported as malformed, carrying
  /// whatever id could be read.
  pub fn from_value(value: serde_json::Value) -> Result<Self, RecordMalformed> {
    let trial_id = ["trial_id", "nct_id"]
      .iter()
      .find_map(|k| value.get(*k).and_then(|v| v.as_str()))
      .map(str::to_owned);
    serde_json::from_value(value).map_err(|e| RecordMalformed {
      trial_id,
      reason: e.to_string(),
    })
  }

  pub fn validate(self) -> Result<TrialRecord, RecordMalformed> {
    let Some(trial_id) = TrialId::parse(&self.trial_id) else {
      return Err(RecordMalformed {
        trial_id: None,
        reason:   "missing trial id".into(),
      });
    };
    let malformed = |reason: &str| RecordMalformed {
      trial_id: Some(trial_id.to_string()),
      reason:   reason.to_owned(),
    };

    let source_urls = non_blank(self.source_urls);
    if source_urls.is_empty() {
      return Err(malformed("no source url"));
    }

    let mut sponsors: Vec<TrialSponsor> = Vec::new();
    for raw in self.sponsors {
      let name = raw.name.split_whitespace().collect::<Vec<_>>().join(" ");
      if name.is_empty() {
        continue;
      }
      let role = parse_role(raw.role.as_deref());
      let class = raw.class.as_deref().and_then(SponsorClass::parse);
      match sponsors.iter_mut().find(|s| s.name.eq_ignore_ascii_case(&name)) {
        Some(existing) => {
          existing.role = existing.role.min(role);
          existing.class = existing.class.or(class);
        }
        None => sponsors.push(TrialSponsor { name, role, class }),
      }
    }
    if sponsors.is_empty() {
      return Err(malformed("no named sponsor"));
    }

    Ok(TrialRecord {
      trial_id,
      title: trim_opt(self.title),
      phase: trim_opt(self.phase),
      status: trim_opt(self.status),
      enrollment: self.enrollment,
      sponsors,
      interventions: non_blank(self.interventions),
      conditions: non_blank(self.conditions),
      source_urls,
    })
  }
}

fn parse_role(raw: Option<&str>) -> SponsorRole {
  match raw.map(|r| r.trim().to_ascii_lowercase()) {
    Some(r) if r.starts_with("lead") => SponsorRole::LeadSponsor,
    _ => SponsorRole::Collaborator,
  }
}

fn trim_opt(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}

fn non_blank(values: Vec<String>) -> Vec<String> {
  let mut out: Vec<String> = Vec::with_capacity(values.len());
  for v in values {
    let v = v.trim().to_owned();
    if !v.is_empty() && !out.contains(&v) {
      out.push(v);
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn raw() -> serde_json::Value {
    json!({
      "nct_id": " NCT03947385 ",
      "title": "Darovasertib and Crizotinib in Metastatic Uveal Melanoma",
      "phase": "PHASE2",
      "sponsors": [
        { "name": "IDEAYA Biosciences", "role": "lead_sponsor", "class": "INDUSTRY" },
        { "name": "Pfizer", "role": "collaborator" },
        { "name": "  " }
      ],
      "interventions": ["IDE196", "Crizotinib", ""],
      "conditions": ["Uveal Melanoma"],
      "source_urls": ["https://clinicaltrials.gov/study/NCT03947385"]
    })
  }

  #[test]
  fn valid_record() {
    let record = RawTrialRecord::from_value(raw()).unwrap().validate().unwrap();
    assert_eq!(record.trial_id.as_str(), "NCT03947385");
    assert_eq!(record.sponsors.len(), 2);
    assert_eq!(record.sponsors[0].role, SponsorRole::LeadSponsor);
    assert_eq!(record.sponsors[0].class, Some(SponsorClass::Industry));
    assert_eq!(record.sponsors[1].role, SponsorRole::Collaborator);
    assert_eq!(record.interventions, ["IDE196", "Crizotinib"]);
  }

  #[test]
  fn missing_source_is_malformed() {
    let mut value = raw();
    value["source_urls"] = json!([" "]);
    let err = RawTrialRecord::from_value(value).unwrap().validate().unwrap_err();
    assert_eq!(err.trial_id.as_deref(), Some("NCT03947385"));
    assert_eq!(err.reason, "no source url");
  }

  #[test]
  fn missing_sponsor_is_malformed() {
    let mut value = raw();
    value["sponsors"] = json!([{ "name": "" }]);
    let err = RawTrialRecord::from_value(value).unwrap().validate().unwrap_err();
    assert_eq!(err.reason, "no named sponsor");
  }

  #[test]
  fn missing_id_is_malformed() {
    let err = RawTrialRecord::default().validate().unwrap_err();
    assert_eq!(err.trial_id, None);
  }

  #[test]
  fn wrong_shape_keeps_the_id() {
    let err = RawTrialRecord::from_value(json!({ "nct_id": "NCT1", "enrollment": "many" }))
      .unwrap_err();
    assert_eq!(err.trial_id.as_deref(), Some("NCT1"));
  }

  #[test]
  fn duplicate_sponsor_keeps_lead_role() {
    let mut value = raw();
    value["sponsors"] = json!([
      { "name": "Pfizer", "role": "collaborator" },
      { "name": "PFIZER", "role": "lead" }
    ]);
    let record = RawTrialRecord::from_value(value).unwrap().validate().unwrap();
    assert_eq!(record.sponsors.len(), 1);
    assert_eq!(record.sponsors[0].role, SponsorRole::LeadSponsor);
  }
}
