//! Sponsor classification.
//!
//! A raw sponsor string (plus the registry's optional class hint) maps to
//! exactly one [`OrganizationType`]. The rules are an ordered table built once
//! from the reference data; the first match wins:
//!
//! 1. a direct class hint (`INDUSTRY`, `NIH`, `FED`, `OTHER_GOV`)
//! 2. investigator credentials
//! 3. government phrases
//! 4. nonprofit phrases
//! 5. academic phrases
//! 6. industry markers, then known pharmaceutical names
//! 7. `other`
//!
//! Matching runs over a folded form of the name: lower-cased, `.` and
//! apostrophes dropped, every other non-alphanumeric except `,` turned into a
//! space.

use regex::Regex;
use serde::Serialize;

use crate::{
  Error, Result,
  model::{OrganizationType, SponsorClass},
  reference::ReferenceData,
};

/// One entry in the ordered rule table.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
  pub name:    &'static str,
  pub outcome: OrganizationType,
  pattern:     Regex,
}

impl ClassificationRule {
  pub fn matches(&self, folded: &str) -> bool { self.pattern.is_match(folded) }
}

/// Which rule decided a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "rule")]
pub enum Matched {
  Hint,
  Rule(&'static str),
  /// Nothing matched; the result is `other` and the name is ambiguous.
  Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
  pub org_type: OrganizationType,
  pub matched:  Matched,
}

impl Classification {
  pub fn is_ambiguous(&self) -> bool { self.matched == Matched::Default }
}

#[derive(Debug, Clone)]
pub struct SponsorClassifier {
  rules: Vec<ClassificationRule>,
}

impl SponsorClassifier {
  pub fn new(reference: &ReferenceData) -> Result<Self> {
    let lists = reference.sponsor_rules();
    let mut rules = Vec::new();

    if !lists.investigator.is_empty() {
      let alternation = lists
        .investigator
        .iter()
        .map(|p| format!("(?:{p})"))
        .collect::<Vec<_>>()
        .join("|");
      rules.push(ClassificationRule {
        name:    "investigator",
        outcome: OrganizationType::Investigator,
        pattern: compile(&alternation)?,
      });
    }

    let phrase_rules = [
      ("government", OrganizationType::Government, &lists.government),
      ("nonprofit", OrganizationType::Nonprofit, &lists.nonprofit),
      ("academic", OrganizationType::Academic, &lists.academic),
      ("industry", OrganizationType::Industry, &lists.industry),
      ("known_industry", OrganizationType::Industry, &lists.known_industry),
    ];
    for (name, outcome, phrases) in phrase_rules {
      if let Some(pattern) = phrase_pattern(phrases) {
        rules.push(ClassificationRule {
          name,
          outcome,
          pattern: compile(&pattern)?,
        });
      }
    }

    Ok(Self { rules })
  }

  pub fn rules(&self) -> &[ClassificationRule] { &self.rules }

  pub fn classify(&self, raw: &str, hint: Option<SponsorClass>) -> OrganizationType {
    self.classify_explained(raw, hint).org_type
  }

  pub fn classify_explained(
    &self,
    raw: &str,
    hint: Option<SponsorClass>,
  ) -> Classification {
    if let Some(org_type) = hint.and_then(hint_type) {
      return Classification { org_type, matched: Matched::Hint };
    }

    let folded = fold_name(raw);
    self
      .rules
      .iter()
      .find(|rule| rule.matches(&folded))
      .map(|rule| Classification {
        org_type: rule.outcome,
        matched:  Matched::Rule(rule.name),
      })
      .unwrap_or(Classification {
        org_type: OrganizationType::Other,
        matched:  Matched::Default,
      })
  }
}

/// Hints that decide the type on their own. `INDIV`, `NETWORK`, `OTHER` and
/// the rest are too coarse and fall through to the name rules.
fn hint_type(hint: SponsorClass) -> Option<OrganizationType> {
  match hint {
    SponsorClass::Industry => Some(OrganizationType::Industry),
    SponsorClass::Nih | SponsorClass::Fed | SponsorClass::OtherGov => {
      Some(OrganizationType::Government)
    }
    _ => None,
  }
}

/// Case and punctuation fold used for matching.
pub fn fold_name(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  for ch in raw.chars().flat_map(char::to_lowercase) {
    match ch {
      '.' | '\'' | '\u{2019}' => {}
      ',' => out.push(','),
      c if c.is_alphanumeric() => out.push(c),
      _ => out.push(' '),
    }
  }
  let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
  collapsed.replace(" ,", ",")
}

fn phrase_pattern(phrases: &[String]) -> Option<String> {
  let alternatives: Vec<String> = phrases
    .iter()
    .map(|p| fold_name(p))
    .filter(|p| !p.is_empty())
    .map(|p| regex::escape(&p))
    .collect();
  (!alternatives.is_empty())
    .then(|| format!(r"\b(?:{})\b", alternatives.join("|")))
}

fn compile(pattern: &str) -> Result<Regex> {
  Regex::new(pattern).map_err(|source| Error::InvalidPattern {
    pattern: pattern.to_owned(),
    source,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use OrganizationType::*;

  fn classifier() -> SponsorClassifier {
    SponsorClassifier::new(&ReferenceData::builtin().unwrap()).unwrap()
  }

  #[test]
  fn investigator_beats_academic() {
    let c = classifier();
    let result = c.classify_explained("Jane Doe, MD, Mayo Clinic", None);
    assert_eq!(result.org_type, Investigator);
    assert_eq!(result.matched, Matched::Rule("investigator"));
    assert_eq!(c.classify("John Smith, M.D., Ph.D.", None), Investigator);
    assert_eq!(c.classify("Prof. Dr. Anna Weber", None), Investigator);
  }

  #[test]
  fn priority_order() {
    let c = classifier();
    // government over academic ("institute")
    assert_eq!(c.classify("National Cancer Institute (NCI)", None), Government);
    // nonprofit over industry marker ("oncology")
    assert_eq!(c.classify("Children's Oncology Group", None), Nonprofit);
    // academic over industry marker ("inc")
    assert_eq!(c.classify("Dana-Farber Cancer Institute, Inc.", None), Academic);
    assert_eq!(c.classify("University Cancer Therapeutics", None), Academic);
    assert_eq!(c.classify("Mayo Clinic", None), Academic);
    assert_eq!(c.classify("Melanoma Research Foundation", None), Nonprofit);
  }

  #[test]
  fn industry_markers_and_known_names() {
    let c = classifier();
    assert_eq!(c.classify("IDEAYA Biosciences", None), Industry);
    assert_eq!(c.classify("Acme Therapeutics, Inc.", None), Industry);
    assert_eq!(c.classify("Merck Sharp & Dohme LLC", None), Industry);
    assert_eq!(c.classify("Pfizer", None), Industry);
  }

  #[test]
  fn hint_short_circuits() {
    let c = classifier();
    assert_eq!(c.classify("Jane Doe, MD", Some(SponsorClass::Industry)), Industry);
    assert_eq!(c.classify("Some Agency", Some(SponsorClass::Fed)), Government);
    let r = c.classify_explained("Some Agency", Some(SponsorClass::Nih));
    assert_eq!(r.matched, Matched::Hint);
    // a coarse hint falls through to the name rules
    assert_eq!(c.classify("Mayo Clinic", Some(SponsorClass::Other)), Academic);
  }

  #[test]
  fn matching_is_whole_word() {
    let c = classifier();
    // "incyte" must not match the "inc" marker
    let r = c.classify_explained("Incyte", None);
    assert_eq!(r.org_type, Other);
    assert!(r.is_ambiguous());
    assert_eq!(c.classify("Trustworthy Partners", None), Other);
  }

  #[test]
  fn fold_name_keeps_commas() {
    assert_eq!(fold_name("Jane  Doe , M.D."), "jane doe, md");
    assert_eq!(fold_name("Dana-Farber"), "dana farber");
  }
}
