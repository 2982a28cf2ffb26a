use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::AirtableSettings;
use crate::error::HarvestError;
use crate::sources::http::{build_query_url, encode_url_component};
use crate::sync::{Fields, RecordStore, RecordUpdate, StoreError, StoredRecord};

pub const AIRTABLE_API: &str = "https://api.airtable.com/v0";

/// Airtable accepts at most this many records per write request.
pub const MAX_RECORDS_PER_REQUEST: usize = 10;

const PAGE_SIZE: &str = "100";

#[derive(Debug, Clone)]
pub struct AirtableClient {
    client: Client,
    base_url: String,
    base_id: String,
}

impl AirtableClient {
    pub fn new(settings: &AirtableSettings) -> Result<Self, HarvestError> {
        Self::with_base_url(settings, AIRTABLE_API.to_string())
    }

    pub fn with_base_url(settings: &AirtableSettings, base_url: String) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("evidence-harvester/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| HarvestError::StoreHttp(err.to_string()))?,
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", settings.token))
            .map_err(|err| HarvestError::StoreHttp(err.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| HarvestError::StoreHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url,
            base_id: settings.base_id.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            self.base_id,
            encode_url_component(table)
        )
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request
            .send()
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        if status == 429 {
            return Err(StoreError::RateLimited);
        }
        if !response.status().is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "Airtable request failed".to_string());
            return Err(StoreError::Status { status, message });
        }
        Ok(response)
    }
}

impl RecordStore for AirtableClient {
    fn upsert(&self, table: &str, records: &[Fields], merge_field: &str) -> Result<(), StoreError> {
        let body = json!({
            "performUpsert": { "fieldsToMergeOn": [merge_field] },
            "records": records
                .iter()
                .map(|fields| json!({ "fields": fields }))
                .collect::<Vec<_>>(),
        });
        self.send(self.client.patch(self.table_url(table)).json(&body))?;
        Ok(())
    }

    fn list(&self, table: &str, fields: &[&str]) -> Result<Vec<StoredRecord>, StoreError> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let mut params: Vec<(&str, &str)> = fields.iter().map(|f| ("fields[]", *f)).collect();
            params.push(("pageSize", PAGE_SIZE));
            if let Some(offset) = offset.as_deref() {
                params.push(("offset", offset));
            }
            let url = build_query_url(&self.table_url(table), &params);
            let page: ListPage = self
                .send(self.client.get(url))?
                .json()
                .map_err(|err| StoreError::Transport(err.to_string()))?;
            records.extend(page.records.into_iter().map(|record| StoredRecord {
                id: record.id,
                fields: record.fields,
            }));
            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => break,
            }
        }
        Ok(records)
    }

    fn update(&self, table: &str, updates: &[RecordUpdate]) -> Result<(), StoreError> {
        let body = UpdateBody {
            records: updates
                .iter()
                .map(|update| UpdateRecord {
                    id: &update.id,
                    fields: &update.fields,
                })
                .collect(),
        };
        self.send(self.client.patch(self.table_url(table)).json(&body))?;
        Ok(())
    }

    fn delete(&self, table: &str, ids: &[String]) -> Result<(), StoreError> {
        let params: Vec<(&str, &str)> = ids.iter().map(|id| ("records[]", id.as_str())).collect();
        let url = build_query_url(&self.table_url(table), &params);
        self.send(self.client.delete(url))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    records: Vec<ListRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListRecord {
    id: String,
    #[serde(default)]
    fields: Fields,
}

#[derive(Debug, Serialize)]
struct UpdateBody<'a> {
    records: Vec<UpdateRecord<'a>>,
}

#[derive(Debug, Serialize)]
struct UpdateRecord<'a> {
    id: &'a str,
    fields: &'a Fields,
}
