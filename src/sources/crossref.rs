use serde::Deserialize;

use crate::domain::{Doi, Enrichment, Lookup};
use crate::error::HarvestError;
use crate::sources::CitationEnrichment;
use crate::sources::http::{JsonClient, Service, build_query_url, encode_doi_path};

pub const CROSSREF_BASE: &str = "https://api.crossref.org";

const SOURCE_NAME: &str = "Crossref";

#[derive(Debug, Clone)]
pub struct CrossrefClient {
    http: JsonClient,
    base_url: String,
    contact: Option<String>,
}

impl CrossrefClient {
    pub fn new(contact: Option<&str>) -> Result<Self, HarvestError> {
        Self::with_base_url(contact, CROSSREF_BASE.to_string())
    }

    pub fn with_base_url(contact: Option<&str>, base_url: String) -> Result<Self, HarvestError> {
        Ok(Self {
            http: JsonClient::new(Service::Crossref, contact)?,
            base_url,
            contact: contact.map(str::to_string),
        })
    }

    fn fetch_work(&self, doi: &Doi) -> Result<Enrichment, HarvestError> {
        let base = format!("{}/works/{}", self.base_url, encode_doi_path(doi.as_str()));
        let url = match self.contact.as_deref() {
            Some(contact) => build_query_url(&base, &[("mailto", contact)]),
            None => base,
        };
        let payload = self.http.get_json(&url)?;
        let response: CrossrefResponse = serde_json::from_value(payload)
            .map_err(|err| HarvestError::CrossrefHttp(err.to_string()))?;
        Ok(response.message.into_enrichment())
    }
}

impl CitationEnrichment for CrossrefClient {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn lookup(&self, doi: &Doi) -> Lookup<Enrichment> {
        match self.fetch_work(doi) {
            Ok(enrichment) => Lookup::Found(enrichment),
            Err(err) => {
                tracing::warn!(source = SOURCE_NAME, %doi, error = %err, "enrichment failed");
                Lookup::Unavailable(err.to_string())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CrossrefResponse {
    message: CrossrefMessage,
}

#[derive(Debug, Default, Deserialize)]
struct CrossrefMessage {
    #[serde(default)]
    funder: Vec<CrossrefFunder>,
    #[serde(default)]
    license: Vec<CrossrefLicense>,
}

#[derive(Debug, Deserialize)]
struct CrossrefFunder {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrossrefLicense {
    #[serde(rename = "URL")]
    url: Option<String>,
}

impl CrossrefMessage {
    fn into_enrichment(self) -> Enrichment {
        let funders = self
            .funder
            .into_iter()
            .filter_map(|funder| funder.name)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        let license_url = self.license.into_iter().find_map(|license| license.url);
        Enrichment {
            funders,
            license_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn message_to_enrichment() {
        let payload = json!({
            "status": "ok",
            "message": {
                "DOI": "10.1/a",
                "funder": [
                    {"name": "National Institutes of Health"},
                    {"DOI": "10.13039/x"},
                    {"name": "Wellcome Trust"}
                ],
                "license": [
                    {"URL": "https://creativecommons.org/licenses/by/4.0/"}
                ]
            }
        });
        let response: CrossrefResponse = serde_json::from_value(payload).unwrap();
        let enrichment = response.message.into_enrichment();
        assert_eq!(
            enrichment.funding(),
            "National Institutes of Health; Wellcome Trust"
        );
        assert_eq!(
            enrichment.license_url.as_deref(),
            Some("https://creativecommons.org/licenses/by/4.0/")
        );
    }

    #[test]
    fn message_without_funders() {
        let response: CrossrefResponse =
            serde_json::from_value(json!({"message": {"title": ["x"]}})).unwrap();
        let enrichment = response.message.into_enrichment();
        assert_eq!(enrichment, Enrichment::default());
    }
}
