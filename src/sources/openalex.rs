use serde_json::Value;

use crate::domain::{Doi, Lookup, NormalizedRecord};
use crate::error::HarvestError;
use crate::sources::http::{JsonClient, Service, build_query_url};
use crate::sources::{LiteratureSearch, QueryStyle};

pub const OPENALEX_BASE: &str = "https://api.openalex.org";

const SOURCE_NAME: &str = "OpenAlex";

/// Review-type works from OpenAlex.
#[derive(Debug, Clone)]
pub struct OpenAlexClient {
    http: JsonClient,
    base_url: String,
    contact: Option<String>,
}

impl OpenAlexClient {
    pub fn new(contact: Option<&str>) -> Result<Self, HarvestError> {
        Self::with_base_url(contact, OPENALEX_BASE.to_string())
    }

    pub fn with_base_url(contact: Option<&str>, base_url: String) -> Result<Self, HarvestError> {
        Ok(Self {
            http: JsonClient::new(Service::OpenAlex, contact)?,
            base_url,
            contact: contact.map(str::to_string),
        })
    }

    fn search_reviews(
        &self,
        query: &str,
        since: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NormalizedRecord>, HarvestError> {
        let filter = match since {
            Some(since) => format!("type:review,from_publication_date:{since}"),
            None => "type:review".to_string(),
        };
        let per_page = limit.clamp(1, 200).to_string();
        let mut params = vec![
            ("search", query),
            ("filter", filter.as_str()),
            ("per_page", per_page.as_str()),
        ];
        if let Some(contact) = self.contact.as_deref() {
            params.push(("mailto", contact));
        }
        let url = build_query_url(&format!("{}/works", self.base_url), &params);
        let payload = self.http.get_json(&url)?;
        Ok(parse_works(&payload))
    }
}

impl LiteratureSearch for OpenAlexClient {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn query_style(&self) -> QueryStyle {
        QueryStyle::FreeText
    }

    fn search(
        &self,
        query: &str,
        since: Option<&str>,
        limit: usize,
    ) -> Lookup<Vec<NormalizedRecord>> {
        match self.search_reviews(query, since, limit) {
            Ok(records) => Lookup::Found(records),
            Err(err) => {
                tracing::warn!(source = SOURCE_NAME, query, error = %err, "search failed");
                Lookup::Unavailable(err.to_string())
            }
        }
    }
}

pub fn parse_works(payload: &Value) -> Vec<NormalizedRecord> {
    payload["results"]
        .as_array()
        .map(|works| works.iter().map(work_to_record).collect())
        .unwrap_or_default()
}

fn work_to_record(work: &Value) -> NormalizedRecord {
    let id = work["id"].as_str().unwrap_or_default();
    let title = work["title"]
        .as_str()
        .or_else(|| work["display_name"].as_str())
        .unwrap_or_default();
    let year = match &work["publication_year"] {
        Value::Number(year) => year.to_string(),
        Value::String(year) => year.clone(),
        _ => String::new(),
    };
    let doi = work["doi"].as_str().and_then(Doi::parse);
    NormalizedRecord::new(SOURCE_NAME, id, title, &year, doi, id)
}
