use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HarvestError;

pub const DEFAULT_CONFIG_PATH: &str = "cards.csv";
pub const DEFAULT_REVIEW_SINCE: &str = "2018-01-01";
pub const DEFAULT_REVIEW_LIMIT: usize = 25;
pub const DEFAULT_PRIMARY_LIMIT: usize = 50;
pub const DEFAULT_REVIEW_NOTE: &str = "SR/MA candidate (screen manually for PRISMA, AMSTAR-2).";
pub const DEFAULT_PRIMARY_NOTE: &str = "Candidate RCT/cohort; classify later (RoB 2 / ROBINS-I).";
pub const SCHEMA_VERSION: u32 = 1;

/// One configuration row: the parsed card, or why the row could not be read.
pub type ConfigRow = Result<CardConfig, HarvestError>;

/// JSON form of the card configuration. The CSV form is one `CardConfig` per row.
///
/// Cards stay raw JSON here so a malformed entry only rejects itself.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub cards: Vec<Value>,
}

/// Everything needed to build one evidence card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CardConfig {
    #[serde(default)]
    pub card_id: String,
    #[serde(default)]
    pub entity_type: String,
    #[serde(default)]
    pub entity_name: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub comparator: String,
    #[serde(default)]
    pub bottom_line: String,
    #[serde(default)]
    pub certainty: String,
    #[serde(default)]
    pub registry_njr: String,
    #[serde(default)]
    pub registry_aoanjrr: String,
    #[serde(default)]
    pub registry_ajrr: String,
    #[serde(default)]
    pub tags: String,
    /// Boolean PubMed-syntax query.
    #[serde(default)]
    pub pubmed_query: String,
    /// Free-text query for review search engines.
    #[serde(default)]
    pub review_query: String,
    #[serde(default)]
    pub review_since: Option<String>,
    #[serde(default)]
    pub review_limit: Option<usize>,
    #[serde(default)]
    pub primary_limit: Option<usize>,
    #[serde(default)]
    pub review_note: Option<String>,
    #[serde(default)]
    pub primary_note: Option<String>,
}

impl CardConfig {
    /// Checks the fields a card cannot be built without.
    pub fn validate(&self) -> Result<(), HarvestError> {
        let card_id = non_empty(&self.card_id).map(str::to_string);
        if card_id.is_none() {
            return Err(HarvestError::InvalidCard {
                card_id,
                reason: "card_id is empty".to_string(),
            });
        }
        if non_empty(&self.entity_name).is_none() {
            return Err(HarvestError::InvalidCard {
                card_id,
                reason: "entity_name is empty".to_string(),
            });
        }
        if non_empty(&self.pubmed_query).is_none() && non_empty(&self.review_query).is_none() {
            return Err(HarvestError::InvalidCard {
                card_id,
                reason: "no search query configured".to_string(),
            });
        }
        Ok(())
    }

    pub fn entity_type(&self) -> &str {
        non_empty(&self.entity_type).unwrap_or("feature")
    }

    /// Query for boolean search syntax, falling back to the free-text query.
    pub fn boolean_query(&self) -> Option<&str> {
        non_empty(&self.pubmed_query).or_else(|| non_empty(&self.review_query))
    }

    /// Query for free-text search engines, falling back to the boolean query.
    pub fn free_text_query(&self) -> Option<&str> {
        non_empty(&self.review_query).or_else(|| non_empty(&self.pubmed_query))
    }

    pub fn review_since(&self) -> &str {
        self.review_since
            .as_deref()
            .and_then(non_empty)
            .unwrap_or(DEFAULT_REVIEW_SINCE)
    }

    pub fn review_limit(&self) -> usize {
        self.review_limit.unwrap_or(DEFAULT_REVIEW_LIMIT)
    }

    pub fn primary_limit(&self) -> usize {
        self.primary_limit.unwrap_or(DEFAULT_PRIMARY_LIMIT)
    }

    pub fn review_note(&self) -> &str {
        self.review_note
            .as_deref()
            .and_then(non_empty)
            .unwrap_or(DEFAULT_REVIEW_NOTE)
    }

    pub fn primary_note(&self) -> &str {
        self.primary_note
            .as_deref()
            .and_then(non_empty)
            .unwrap_or(DEFAULT_PRIMARY_NOTE)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads card rows from a `.csv` or `.json` file.
    ///
    /// Only file-level problems fail here. A row that cannot be parsed comes
    /// back as an `Err` in its own position and is skipped by the builder.
    pub fn resolve(path: Option<&str>) -> Result<Vec<ConfigRow>, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_PATH),
        };
        if !config_path.exists() {
            return Err(HarvestError::MissingConfig(config_path));
        }

        let is_json = config_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|err| HarvestError::ConfigParse(err.to_string()))?;
            Self::resolve_config(config)
        } else {
            Self::read_csv(&config_path)
        }
    }

    pub fn resolve_config(config: Config) -> Result<Vec<ConfigRow>, HarvestError> {
        let schema_version = config.schema_version.unwrap_or(SCHEMA_VERSION);
        if schema_version != SCHEMA_VERSION {
            return Err(HarvestError::ConfigParse(format!(
                "unsupported schema_version {schema_version}, expected {SCHEMA_VERSION}"
            )));
        }
        Ok(config
            .cards
            .into_iter()
            .map(|value| {
                let card_id = value
                    .get("card_id")
                    .and_then(Value::as_str)
                    .and_then(non_empty)
                    .map(str::to_string);
                serde_json::from_value::<CardConfig>(value).map_err(|err| {
                    HarvestError::InvalidCard {
                        card_id,
                        reason: err.to_string(),
                    }
                })
            })
            .collect())
    }

    pub fn read_csv(path: &Path) -> Result<Vec<ConfigRow>, HarvestError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)
            .map_err(|_| HarvestError::ConfigRead(path.to_path_buf()))?;
        let headers = reader
            .headers()
            .map_err(|err| HarvestError::ConfigParse(err.to_string()))?
            .clone();
        let id_column = headers.iter().position(|name| name == "card_id");

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| HarvestError::ConfigParse(err.to_string()))?;
            let row = record.deserialize::<CardConfig>(Some(&headers)).map_err(|err| {
                HarvestError::InvalidCard {
                    card_id: id_column
                        .and_then(|idx| record.get(idx))
                        .and_then(non_empty)
                        .map(str::to_string),
                    reason: err.to_string(),
                }
            });
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Process-wide values, read once and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Settings {
    pub contact_email: Option<String>,
    pub airtable: Option<AirtableSettings>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let contact_email = lookup("HARVEST_CONTACT_EMAIL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let airtable = AirtableSettings::from_lookup(&lookup).ok();
        Self {
            contact_email,
            airtable,
        }
    }

    /// Unpaywall and the Crossref polite pool both want a contact address.
    pub fn require_contact(&self) -> Result<&str, HarvestError> {
        self.contact_email
            .as_deref()
            .ok_or_else(|| HarvestError::MissingSetting("HARVEST_CONTACT_EMAIL".to_string()))
    }

    pub fn require_airtable(&self) -> Result<&AirtableSettings, HarvestError> {
        self.airtable.as_ref().ok_or_else(|| {
            HarvestError::MissingSetting(
                "AIRTABLE_BASE_ID, AIRTABLE_TOKEN, AIRTABLE_TABLE_CARDS, AIRTABLE_TABLE_STUDIES"
                    .to_string(),
            )
        })
    }
}

#[derive(Clone)]
pub struct AirtableSettings {
    pub base_id: String,
    pub token: String,
    pub cards_table: String,
    pub studies_table: String,
    pub link_field: String,
}

impl AirtableSettings {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HarvestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| HarvestError::MissingSetting(key.to_string()))
        };
        Ok(Self {
            base_id: required("AIRTABLE_BASE_ID")?,
            token: required("AIRTABLE_TOKEN")?,
            cards_table: required("AIRTABLE_TABLE_CARDS")?,
            studies_table: required("AIRTABLE_TABLE_STUDIES")?,
            link_field: required("AIRTABLE_LINK_FIELD").unwrap_or_else(|_| "card".to_string()),
        })
    }
}

impl fmt::Debug for AirtableSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AirtableSettings")
            .field("base_id", &self.base_id)
            .field("token", &"<redacted>")
            .field("cards_table", &self.cards_table)
            .field("studies_table", &self.studies_table)
            .field("link_field", &self.link_field)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Pause between two card builds, to stay polite with the literature APIs.
    pub build_delay: Duration,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            build_delay: Duration::from_secs(1),
        }
    }
}

/// Bounded retry for rate-limited store requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Records per request; Airtable accepts at most 10.
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub retry: RetryPolicy,
    pub allow_truncate: bool,
}

impl SyncSettings {
    /// No pauses at all; used by tests and dry runs against fakes.
    pub fn without_delays() -> Self {
        Self {
            batch_delay: Duration::ZERO,
            retry: RetryPolicy::immediate(2),
            ..Self::default()
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay: Duration::from_millis(350),
            retry: RetryPolicy::default(),
            allow_truncate: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn card() -> CardConfig {
        CardConfig {
            card_id: "card_x".to_string(),
            entity_name: "Stemless humeral component (aTSA)".to_string(),
            pubmed_query: "stemless[Title/Abstract]".to_string(),
            ..CardConfig::default()
        }
    }

    #[test]
    fn validate_requires_identifier_name_and_query() {
        assert!(card().validate().is_ok());

        let missing_name = CardConfig {
            entity_name: " ".to_string(),
            ..card()
        };
        assert_matches!(
            missing_name.validate(),
            Err(HarvestError::InvalidCard { card_id: Some(_), .. })
        );

        let missing_query = CardConfig {
            pubmed_query: String::new(),
            ..card()
        };
        assert_matches!(missing_query.validate(), Err(HarvestError::InvalidCard { .. }));

        let missing_id = CardConfig {
            card_id: String::new(),
            ..card()
        };
        assert_matches!(
            missing_id.validate(),
            Err(HarvestError::InvalidCard { card_id: None, .. })
        );
    }

    #[test]
    fn queries_fall_back_to_each_other() {
        let config = card();
        assert_eq!(config.boolean_query(), Some("stemless[Title/Abstract]"));
        assert_eq!(config.free_text_query(), Some("stemless[Title/Abstract]"));
        assert_eq!(config.review_since(), DEFAULT_REVIEW_SINCE);
        assert_eq!(config.entity_type(), "feature");
        assert_eq!(config.review_note(), DEFAULT_REVIEW_NOTE);
    }

    #[test]
    fn airtable_settings_from_lookup() {
        let settings = Settings::from_lookup(|key| match key {
            "HARVEST_CONTACT_EMAIL" => Some("me@example.org".to_string()),
            "AIRTABLE_BASE_ID" => Some("appX".to_string()),
            "AIRTABLE_TOKEN" => Some("secret".to_string()),
            "AIRTABLE_TABLE_CARDS" => Some("Cards".to_string()),
            "AIRTABLE_TABLE_STUDIES" => Some("Studies".to_string()),
            _ => None,
        });
        assert_eq!(settings.require_contact().unwrap(), "me@example.org");
        let airtable = settings.require_airtable().unwrap();
        assert_eq!(airtable.link_field, "card");
        assert!(!format!("{airtable:?}").contains("secret"));
    }

    #[test]
    fn missing_settings_are_reported() {
        let settings = Settings::from_lookup(|_| None);
        assert_matches!(
            settings.require_contact(),
            Err(HarvestError::MissingSetting(_))
        );
        assert_matches!(
            settings.require_airtable(),
            Err(HarvestError::MissingSetting(_))
        );
    }
}
