//! Name-pattern enrichment for assets the registry does not know.
//!
//! Modality comes from the first matching rule in an ordered table (specific
//! conjugate and bispecific formats before the generic `-mab` suffix).
//! Targets are every rule that matches the asset name or the trial
//! conditions.

use std::collections::BTreeSet;

use regex::Regex;
use serde::Serialize;

use crate::{Error, Result, model::Modality};

const MODALITY_RULES: &[(Modality, &[&str])] = &[
  (Modality::Adc, &[
    r"antibody.drug.conjugate",
    r"\badc\b",
    r"vedotin",
    r"deruxtecan",
    r"govitecan",
    r"emtansine",
    r"mertansine",
  ]),
  (Modality::Bispecific, &[r"bispecific", r"bi-specific", r"duobody", r"\bbite\b"]),
  (Modality::CellTherapy, &[
    r"\bcar-?t\b",
    r"\btil\b",
    r"adoptive cell",
    r"autologous",
    r"lymphocyte",
    r"leucel\b",
  ]),
  (Modality::GeneTherapy, &[r"gene therap", r"\baav", r"adeno.associated", r"lentivir"]),
  (Modality::OncolyticVirus, &[r"oncolytic", r"talimogene", r"\bt-vec\b", r"imlygic"]),
  (Modality::Vaccine, &[r"vaccin", r"\bmrna-\d+", r"\bbnt\d+", r"immunization"]),
  (Modality::Antibody, &[r"mab\b", r"anti-[\w-]+\s+antibod", r"monoclonal antibod"]),
  (Modality::SmallMolecule, &[r"nib\b", r"sertib\b", r"lisib\b", r"ciclib\b", r"small molecule"]),
  (Modality::CheckpointInhibitor, &[
    r"\bpd-?l?1\b",
    r"\bctla-?4\b",
    r"\blag-?3\b",
    r"\btim-?3\b",
    r"checkpoint inhibitor",
  ]),
  (Modality::Chemotherapy, &[
    r"chemotherap",
    r"platin\b",
    r"taxel\b",
    r"dacarbazine",
    r"temozolomide",
    r"fluorouracil",
  ]),
  (Modality::Radiation, &[
    r"radiation",
    r"radiotherap",
    r"\bsbrt\b",
    r"stereotactic",
    r"brachytherap",
  ]),
];

const TARGET_RULES: &[(&str, &[&str])] = &[
  ("PD-1", &[r"\bpd-?1\b", r"programmed death.?1\b", r"\bpdcd1\b"]),
  ("PD-L1", &[r"\bpd-?l1\b", r"programmed death.ligand.?1", r"\bcd274\b"]),
  ("CTLA-4", &[r"\bctla-?4\b", r"\bcd152\b"]),
  ("LAG-3", &[r"\blag-?3\b", r"\bcd223\b"]),
  ("BRAF", &[r"\bbraf\b", r"\bb-raf\b"]),
  ("MEK", &[r"\bmek[12]?\b", r"\bmap2k"]),
  ("c-MET", &[r"\bc-?met\b", r"\bhgfr\b"]),
  ("VEGF", &[r"\bvegf\b", r"vascular endothelial growth factor"]),
  ("EGFR", &[r"\begfr\b", r"\berbb1\b", r"\bher1\b"]),
  ("HER2", &[r"\bher2\b", r"\berbb2\b", r"\bneu\b"]),
  ("CD40", &[r"\bcd40\b"]),
  ("OX40", &[r"\box40\b", r"\bcd134\b"]),
  ("TIGIT", &[r"\btigit\b"]),
  ("TIM-3", &[r"\btim-?3\b", r"\bhavcr2\b"]),
  ("gp100", &[r"\bgp100\b", r"\bpmel\b"]),
  ("GNAQ", &[r"\bgnaq\b"]),
  ("GNA11", &[r"\bgna11\b"]),
];

/// Inferred modality and targets for one asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Enrichment {
  pub modality: Option<Modality>,
  pub targets:  BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct Enricher {
  modality: Vec<(Modality, Regex)>,
  targets:  Vec<(&'static str, Regex)>,
}

impl Enricher {
  pub fn new() -> Result<Self> {
    let modality = MODALITY_RULES
      .iter()
      .map(|(m, patterns)| alternation(patterns).map(|re| (*m, re)))
      .collect::<Result<_>>()?;
    let targets = TARGET_RULES
      .iter()
      .map(|(t, patterns)| alternation(patterns).map(|re| (*t, re)))
      .collect::<Result<_>>()?;
    Ok(Self { modality, targets })
  }

  pub fn enrich_asset(&self, name: &str, conditions: &[String]) -> Enrichment {
    let name = name.to_lowercase();
    let modality = self
      .modality
      .iter()
      .find(|(_, re)| re.is_match(&name))
      .map(|(m, _)| *m);

    let text = std::iter::once(name.as_str())
      .chain(conditions.iter().map(String::as_str))
      .collect::<Vec<_>>()
      .join(" ")
      .to_lowercase();
    let targets = self
      .targets
      .iter()
      .filter(|(_, re)| re.is_match(&text))
      .map(|(t, _)| (*t).to_owned())
      .collect();

    Enrichment { modality, targets }
  }
}

fn alternation(patterns: &[&str]) -> Result<Regex> {
  let pattern = format!("(?i){}", patterns.join("|"));
  Regex::new(&pattern).map_err(|source| Error::InvalidPattern { pattern, source })
}
