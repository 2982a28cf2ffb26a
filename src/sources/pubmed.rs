use std::collections::HashSet;

use serde_json::Value;

use crate::domain::{Doi, Lookup, NormalizedRecord};
use crate::error::HarvestError;
use crate::sources::http::{JsonClient, Service, build_query_url};
use crate::sources::{LiteratureSearch, QueryStyle};

pub const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

const SOURCE_NAME: &str = "PubMed";

#[derive(Debug, Clone)]
pub struct PubmedClient {
    http: JsonClient,
    base_url: String,
}

impl PubmedClient {
    pub fn new(contact: Option<&str>) -> Result<Self, HarvestError> {
        Self::with_base_url(contact, EUTILS_BASE.to_string())
    }

    pub fn with_base_url(contact: Option<&str>, base_url: String) -> Result<Self, HarvestError> {
        Ok(Self {
            http: JsonClient::new(Service::Pubmed, contact)?,
            base_url,
        })
    }

    pub fn esearch(
        &self,
        term: &str,
        since: Option<&str>,
        retmax: usize,
    ) -> Result<Vec<String>, HarvestError> {
        let retmax = retmax.to_string();
        let mindate = since.map(|date| date.replace('-', "/"));
        let mut params = vec![
            ("db", "pubmed"),
            ("term", term),
            ("retmode", "json"),
            ("retmax", retmax.as_str()),
        ];
        if let Some(mindate) = mindate.as_deref() {
            params.push(("datetype", "pdat"));
            params.push(("mindate", mindate));
            params.push(("maxdate", "3000"));
        }
        let url = build_query_url(&format!("{}/esearch.fcgi", self.base_url), &params);
        let payload = self.http.get_json(&url)?;
        Ok(parse_id_list(&payload))
    }

    pub fn esummary(&self, pmids: &[String]) -> Result<Vec<NormalizedRecord>, HarvestError> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }
        let id_list = pmids.join(",");
        let url = build_query_url(
            &format!("{}/esummary.fcgi", self.base_url),
            &[("db", "pubmed"), ("id", id_list.as_str()), ("retmode", "json")],
        );
        let payload = self.http.get_json(&url)?;
        Ok(parse_summaries(&payload, pmids))
    }

    fn search_summaries(
        &self,
        query: &str,
        since: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NormalizedRecord>, HarvestError> {
        let pmids = self.esearch(query, since, limit)?;
        self.esummary(&pmids)
    }
}

impl LiteratureSearch for PubmedClient {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn query_style(&self) -> QueryStyle {
        QueryStyle::Boolean
    }

    fn search(
        &self,
        query: &str,
        since: Option<&str>,
        limit: usize,
    ) -> Lookup<Vec<NormalizedRecord>> {
        match self.search_summaries(query, since, limit) {
            Ok(records) => Lookup::Found(records),
            Err(err) => {
                tracing::warn!(source = SOURCE_NAME, query, error = %err, "search failed");
                Lookup::Unavailable(err.to_string())
            }
        }
    }
}

/// PubMed restricted to systematic reviews and meta-analyses.
///
/// Runs the systematic-review subset query and the publication-type query,
/// then summarizes the union of both identifier lists.
#[derive(Debug, Clone)]
pub struct PubmedReviews {
    client: PubmedClient,
}

impl PubmedReviews {
    pub fn new(client: PubmedClient) -> Self {
        Self { client }
    }

    fn search_reviews(
        &self,
        query: &str,
        since: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NormalizedRecord>, HarvestError> {
        let subset = self
            .client
            .esearch(&systematic_subset_query(query), since, limit)?;
        let by_type = self
            .client
            .esearch(&publication_type_query(query), since, limit)?;
        let pmids = union_preserving_order([subset, by_type]);
        self.client.esummary(&pmids)
    }
}

impl LiteratureSearch for PubmedReviews {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn query_style(&self) -> QueryStyle {
        QueryStyle::Boolean
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
                tracing::warn!(source = SOURCE_NAME, query, error = %err, "review search failed");
                Lookup::Unavailable(err.to_string())
            }
        }
    }
}

pub fn systematic_subset_query(query: &str) -> String {
    format!("({query}) AND systematic[sb]")
}

pub fn publication_type_query(query: &str) -> String {
    format!("({query}) AND (meta-analysis[pt] OR systematic review[pt])")
}

pub fn union_preserving_order<I>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for list in lists {
        for id in list {
            if seen.insert(id.clone()) {
                out.push(id);
            }
        }
    }
    out
}

fn parse_id_list(payload: &Value) -> Vec<String> {
    payload["esearchresult"]["idlist"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Records come back in the order of `pmids`; identifiers missing from the
/// payload are dropped.
pub fn parse_summaries(payload: &Value, pmids: &[String]) -> Vec<NormalizedRecord> {
    let result = &payload["result"];
    let mut out = Vec::new();
    for pmid in pmids {
        let record = &result[pmid.as_str()];
        if !record.is_object() {
            continue;
        }
        let title = record["title"].as_str().unwrap_or_default();
        let year: String = record["pubdate"]
            .as_str()
            .unwrap_or_default()
            .chars()
            .take(4)
            .collect();
        let doi = first_doi(record);
        out.push(NormalizedRecord::new(
            SOURCE_NAME,
            pmid,
            title,
            &year,
            doi,
            &format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/"),
        ));
    }
    out
}

fn first_doi(record: &Value) -> Option<Doi> {
    record["articleids"]
        .as_array()?
        .iter()
        .find(|id| id["idtype"].as_str() == Some("doi"))
        .and_then(|id| id["value"].as_str())
        .and_then(Doi::parse)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn union_keeps_first_seen_order() {
        let merged = union_preserving_order([
            vec!["3".to_string(), "1".to_string()],
            vec!["1".to_string(), "2".to_string(), "3".to_string()],
        ]);
        assert_eq!(merged, vec!["3", "1", "2"]);
    }

    #[test]
    fn summaries_extract_doi_and_year() {
        let payload = json!({
            "result": {
                "uids": ["111", "222"],
                "111": {
                    "title": "Stemless versus stemmed humeral components.",
                    "pubdate": "2021 Mar",
                    "articleids": [
                        {"idtype": "pubmed", "value": "111"},
                        {"idtype": "doi", "value": "10.1016/j.jse.2020.08.001"}
                    ]
                },
                "222": {
                    "title": "No DOI here",
                    "pubdate": "",
                    "articleids": [{"idtype": "pubmed", "value": "222"}]
                }
            }
        });
        let pmids = vec!["111".to_string(), "999".to_string(), "222".to_string()];
        let records = parse_summaries(&payload, &pmids);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].year, "2021");
        assert_eq!(
            records[0].doi.as_ref().map(|d| d.as_str()),
            Some("10.1016/j.jse.2020.08.001")
        );
        assert_eq!(records[0].link, "https://doi.org/10.1016/j.jse.2020.08.001");
        assert_eq!(records[1].doi, None);
        assert_eq!(records[1].year, "");
        assert_eq!(records[1].link, "https://pubmed.ncbi.nlm.nih.gov/222/");
    }

    #[test]
    fn review_queries_wrap_original() {
        assert_eq!(systematic_subset_query("a OR b"), "(a OR b) AND systematic[sb]");
        assert!(publication_type_query("x").contains("meta-analysis[pt]"));
    }
}
