use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

static DOI_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://(?:dx\.)?doi\.org/|doi:\s*)").expect("valid DOI prefix regex")
});

/// A bare DOI such as `10.1016/j.jse.2020.01.001`, with resolver prefixes removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Doi(String);

impl Doi {
    /// Parses an optional DOI. Empty or whitespace-only input means "no DOI".
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        let bare = DOI_PREFIX.replace(trimmed, "");
        let bare = bare.trim();
        if bare.is_empty() {
            return None;
        }
        Some(Self(bare.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn url(&self) -> String {
        format!("https://doi.org/{}", self.0)
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Doi {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| HarvestError::InvalidDoi(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyType {
    SystematicReviewOrMetaAnalysis,
    PrimaryStudy,
}

impl StudyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyType::SystematicReviewOrMetaAnalysis => "systematic_review_or_meta_analysis",
            StudyType::PrimaryStudy => "primary_study",
        }
    }
}

impl fmt::Display for StudyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a best-effort call to an external service.
///
/// Adapters never fail their caller: transport errors, bad statuses and
/// malformed payloads all become `Unavailable` with the reason attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    Unavailable(String),
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Unavailable(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

impl<T: Default> Lookup<T> {
    pub fn unwrap_or_default(self) -> T {
        self.found().unwrap_or_default()
    }
}

/// One candidate literature item as returned by a search adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub source: String,
    pub source_id: String,
    pub title: String,
    /// Publication year, empty when the source does not report one.
    pub year: String,
    pub doi: Option<Doi>,
    /// `https://doi.org/<doi>` when a DOI is known, otherwise the source's own link.
    pub link: String,
}

impl NormalizedRecord {
    pub fn new(
        source: &str,
        source_id: &str,
        title: &str,
        year: &str,
        doi: Option<Doi>,
        fallback_link: &str,
    ) -> Self {
        let link = match &doi {
            Some(doi) => doi.url(),
            None => fallback_link.to_string(),
        };
        Self {
            source: source.to_string(),
            source_id: source_id.to_string(),
            title: title.trim().to_string(),
            year: year.trim().to_string(),
            doi,
            link,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub funders: Vec<String>,
    pub license_url: Option<String>,
}

impl Enrichment {
    pub fn funding(&self) -> String {
        self.funders.join("; ")
    }
}

/// Durable external key of a study: `doi:<doi>` when known, else `url:<link>`.
pub fn study_id(doi: Option<&Doi>, link: &str) -> String {
    match doi {
        Some(doi) => format!("doi:{}", doi.as_str()),
        None => format!("url:{link}"),
    }
}

/// Composite key used to collapse duplicate candidates within one card build.
///
/// Scoped by card so two cards sharing a paper keep their own rows. The study
/// type is not part of the key: a paper found by a review source is not
/// repeated when the primary-study search returns it again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupeKey {
    card_id: String,
    doi: String,
    link: String,
    title: String,
}

impl DedupeKey {
    pub fn new(card_id: &str, record: &NormalizedRecord) -> Self {
        // DOIs are case-insensitive, and so is a locator derived from one.
        let (doi, link) = match &record.doi {
            Some(doi) => (doi.as_str().to_lowercase(), doi.url().to_lowercase()),
            None => (String::new(), record.link.trim().to_string()),
        };
        Self {
            card_id: card_id.to_string(),
            doi,
            link,
            title: normalize_title(&record.title),
        }
    }
}

fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('.')
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRow {
    pub card_id: String,
    pub entity_type: String,
    pub entity_name: String,
    pub outcome: String,
    pub comparator: String,
    pub bottom_line: String,
    pub certainty: String,
    pub registry_njr: String,
    pub registry_aoanjrr: String,
    pub registry_ajrr: String,
    pub last_updated: String,
    pub tags: String,
}

pub const CARD_COLUMNS: [&str; 12] = [
    "card_id",
    "entity_type",
    "entity_name",
    "outcome",
    "comparator",
    "bottom_line",
    "certainty",
    "registry_njr",
    "registry_aoanjrr",
    "registry_ajrr",
    "last_updated",
    "tags",
];

/// One literature item backing a card. Quantitative and risk-of-bias columns
/// are left blank for manual review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyRow {
    pub card_id: String,
    pub study_id: String,
    pub study_type: String,
    pub title: String,
    pub year: String,
    pub doi_or_link: String,
    pub design: String,
    pub n: String,
    pub follow_up_years: String,
    pub effect_measure: String,
    pub effect_value: String,
    pub ci_lower: String,
    pub ci_upper: String,
    pub funding: String,
    pub risk_of_bias_tool: String,
    pub risk_of_bias_overall: String,
    pub source_api: String,
    pub notes: String,
    pub oa_pdf: String,
}

pub const STUDY_COLUMNS: [&str; 19] = [
    "card_id",
    "study_id",
    "study_type",
    "title",
    "year",
    "doi_or_link",
    "design",
    "n",
    "follow_up_years",
    "effect_measure",
    "effect_value",
    "ci_lower",
    "ci_upper",
    "funding",
    "risk_of_bias_tool",
    "risk_of_bias_overall",
    "source_api",
    "notes",
    "oa_pdf",
];
