use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::HarvestError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Pubmed,
    OpenAlex,
    Crossref,
    Unpaywall,
}

impl Service {
    pub fn transport_error(self, message: String) -> HarvestError {
        match self {
            Service::Pubmed => HarvestError::PubmedHttp(message),
            Service::OpenAlex => HarvestError::OpenAlexHttp(message),
            Service::Crossref => HarvestError::CrossrefHttp(message),
            Service::Unpaywall => HarvestError::UnpaywallHttp(message),
        }
    }

    pub fn status_error(self, status: u16, message: String) -> HarvestError {
        match self {
            Service::Pubmed => HarvestError::PubmedStatus { status, message },
            Service::OpenAlex => HarvestError::OpenAlexStatus { status, message },
            Service::Crossref => HarvestError::CrossrefStatus { status, message },
            Service::Unpaywall => HarvestError::UnpaywallStatus { status, message },
        }
    }
}

/// Blocking JSON GET client with a fixed timeout and a polite user agent.
#[derive(Debug, Clone)]
pub struct JsonClient {
    client: Client,
    service: Service,
}

impl JsonClient {
    pub fn new(service: Service, contact: Option<&str>) -> Result<Self, HarvestError> {
        Self::with_timeout(service, contact, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        service: Service,
        contact: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, HarvestError> {
        let agent = match contact {
            Some(contact) => format!(
                "evidence-harvester/{} (mailto:{contact})",
                env!("CARGO_PKG_VERSION")
            ),
            None => format!("evidence-harvester/{}", env!("CARGO_PKG_VERSION")),
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&agent).map_err(|err| service.transport_error(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| service.transport_error(err.to_string()))?;
        Ok(Self { client, service })
    }

    pub fn get_json(&self, url: &str) -> Result<Value, HarvestError> {
        tracing::debug!(service = ?self.service, url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| self.service.transport_error(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "request failed".to_string());
            return Err(self.service.status_error(status, message));
        }
        response
            .json()
            .map_err(|err| self.service.transport_error(err.to_string()))
    }
}

pub fn encode_url_component(value: &str) -> String {
    let mut out = String::new();
    for byte in value.as_bytes() {
        let ch = *byte as char;
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' || ch == '~' {
            out.push(ch);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// DOIs keep their `/` separators in path position; everything else is escaped.
pub fn encode_doi_path(doi: &str) -> String {
    doi.split('/')
        .map(encode_url_component)
        .collect::<Vec<_>>()
        .join("/")
}

pub fn build_query_url(base: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return base.to_string();
    }
    let mut out = String::from(base);
    out.push('?');
    for (idx, (key, value)) in params.iter().enumerate() {
        if idx > 0 {
            out.push('&');
        }
        out.push_str(&encode_url_component(key));
        out.push('=');
        out.push_str(&encode_url_component(value));
    }
    out
}
