use serde_json::Value;

use crate::domain::{Doi, Lookup};
use crate::error::HarvestError;
use crate::sources::OpenAccessResolver;
use crate::sources::http::{JsonClient, Service, build_query_url, encode_doi_path};

pub const UNPAYWALL_BASE: &str = "https://api.unpaywall.org/v2";

const SOURCE_NAME: &str = "Unpaywall";

/// Unpaywall requires an `email` parameter on every request.
#[derive(Debug, Clone)]
pub struct UnpaywallClient {
    http: JsonClient,
    base_url: String,
    email: String,
}

impl UnpaywallClient {
    pub fn new(email: &str) -> Result<Self, HarvestError> {
        Self::with_base_url(email, UNPAYWALL_BASE.to_string())
    }

    pub fn with_base_url(email: &str, base_url: String) -> Result<Self, HarvestError> {
        Ok(Self {
            http: JsonClient::new(Service::Unpaywall, Some(email))?,
            base_url,
            email: email.to_string(),
        })
    }

    fn best_location(&self, doi: &Doi) -> Result<Option<String>, HarvestError> {
        let url = build_query_url(
            &format!("{}/{}", self.base_url, encode_doi_path(doi.as_str())),
            &[("email", self.email.as_str())],
        );
        let payload = self.http.get_json(&url)?;
        Ok(best_oa_url(&payload))
    }
}

impl OpenAccessResolver for UnpaywallClient {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn resolve(&self, doi: &Doi) -> Lookup<String> {
        match self.best_location(doi) {
            Ok(Some(url)) => Lookup::Found(url),
            Ok(None) => Lookup::Unavailable("no open-access location".to_string()),
            Err(err) => {
                tracing::warn!(source = SOURCE_NAME, %doi, error = %err, "open-access lookup failed");
                Lookup::Unavailable(err.to_string())
            }
        }
    }
}

pub fn best_oa_url(payload: &Value) -> Option<String> {
    let best = &payload["best_oa_location"];
    [best["url_for_pdf"].as_str(), best["url"].as_str()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|url| !url.is_empty())
        .map(str::to_string)
}
