#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use evidence_harvester::domain::{Doi, Enrichment, Lookup, NormalizedRecord};
use evidence_harvester::sources::{
    CitationEnrichment, LiteratureSearch, OpenAccessResolver, QueryStyle,
};
use evidence_harvester::sync::{Fields, RecordStore, RecordUpdate, StoreError, StoredRecord};

pub fn record(source: &str, source_id: &str, title: &str, doi: &str, fallback: &str) -> NormalizedRecord {
    NormalizedRecord::new(source, source_id, title, "2021", Doi::parse(doi), fallback)
}

#[derive(Clone)]
pub struct FakeSearch {
    pub name: &'static str,
    pub style: QueryStyle,
    pub result: Lookup<Vec<NormalizedRecord>>,
    pub queries: Arc<Mutex<Vec<String>>>,
}

impl FakeSearch {
    pub fn returning(name: &'static str, style: QueryStyle, records: Vec<NormalizedRecord>) -> Self {
        Self {
            name,
            style,
            result: Lookup::Found(records),
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn unavailable(name: &'static str, style: QueryStyle) -> Self {
        Self {
            name,
            style,
            result: Lookup::Unavailable("connection refused".to_string()),
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl LiteratureSearch for FakeSearch {
    fn name(&self) -> &'static str {
        self.name
    }

    fn query_style(&self) -> QueryStyle {
        self.style
    }

    fn search(&self, query: &str, _since: Option<&str>, _limit: usize) -> Lookup<Vec<NormalizedRecord>> {
        self.queries.lock().unwrap().push(query.to_string());
        self.result.clone()
    }
}

#[derive(Default)]
pub struct FakeEnrichment {
    pub known: HashMap<String, Enrichment>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeEnrichment {
    pub fn with_funder(doi: &str, funder: &str) -> Self {
        let mut known = HashMap::new();
        known.insert(
            doi.to_string(),
            Enrichment {
                funders: vec![funder.to_string()],
                license_url: None,
            },
        );
        Self {
            known,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CitationEnrichment for FakeEnrichment {
    fn name(&self) -> &'static str {
        "Crossref"
    }

    fn lookup(&self, doi: &Doi) -> Lookup<Enrichment> {
        self.calls.lock().unwrap().push(doi.as_str().to_string());
        match self.known.get(doi.as_str()) {
            Some(enrichment) => Lookup::Found(enrichment.clone()),
            None => Lookup::Unavailable("not found".to_string()),
        }
    }
}

#[derive(Default)]
pub struct FakeOpenAccess {
    pub known: HashMap<String, String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeOpenAccess {
    pub fn with_pdf(doi: &str, url: &str) -> Self {
        let mut known = HashMap::new();
        known.insert(doi.to_string(), url.to_string());
        Self {
            known,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl OpenAccessResolver for FakeOpenAccess {
    fn name(&self) -> &'static str {
        "Unpaywall"
    }

    fn resolve(&self, doi: &Doi) -> Lookup<String> {
        self.calls.lock().unwrap().push(doi.as_str().to_string());
        match self.known.get(doi.as_str()) {
            Some(url) => Lookup::Found(url.clone()),
            None => Lookup::Unavailable("no open-access location".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Upsert { table: String, records: usize },
    List { table: String },
    Update { table: String, records: usize },
    Delete { table: String, records: usize },
}

/// Record store kept in memory, with scripted rate limits and failures.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<StoredRecord>>>,
    next_id: Mutex<usize>,
    calls: Mutex<Vec<StoreCall>>,
    rate_limits_left: Mutex<u32>,
    fail_upserts_with: Mutex<Option<u16>>,
}

impl MemoryStore {
    pub fn rate_limit_next(&self, times: u32) {
        *self.rate_limits_left.lock().unwrap() = times;
    }

    pub fn fail_upserts_with(&self, status: u16) {
        *self.fail_upserts_with.lock().unwrap() = Some(status);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| !matches!(call, StoreCall::List { .. }))
            .count()
    }

    pub fn records(&self, table: &str) -> Vec<StoredRecord> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn insert(&self, table: &str, fields: Fields) -> String {
        let id = self.next_record_id();
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(StoredRecord {
                id: id.clone(),
                fields,
            });
        id
    }

    fn next_record_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("rec{:04}", *next)
    }

    fn take_rate_limit(&self) -> bool {
        let mut left = self.rate_limits_left.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            return true;
        }
        false
    }
}

impl RecordStore for MemoryStore {
    fn upsert(&self, table: &str, records: &[Fields], merge_field: &str) -> Result<(), StoreError> {
        self.calls.lock().unwrap().push(StoreCall::Upsert {
            table: table.to_string(),
            records: records.len(),
        });
        if self.take_rate_limit() {
            return Err(StoreError::RateLimited);
        }
        if let Some(status) = *self.fail_upserts_with.lock().unwrap() {
            return Err(StoreError::Status {
                status,
                message: "INVALID_REQUEST_UNKNOWN".to_string(),
            });
        }
        for fields in records {
            let key = fields.get(merge_field).cloned();
            let existing = {
                let tables = self.tables.lock().unwrap();
                tables.get(table).and_then(|rows| {
                    rows.iter()
                        .position(|row| row.fields.get(merge_field).cloned() == key)
                })
            };
            match existing {
                Some(pos) => {
                    let mut tables = self.tables.lock().unwrap();
                    let row = &mut tables.get_mut(table).unwrap()[pos];
                    for (name, value) in fields {
                        row.fields.insert(name.clone(), value.clone());
                    }
                }
                None => {
                    self.insert(table, fields.clone());
                }
            }
        }
        Ok(())
    }

    fn list(&self, table: &str, fields: &[&str]) -> Result<Vec<StoredRecord>, StoreError> {
        self.calls.lock().unwrap().push(StoreCall::List {
            table: table.to_string(),
        });
        if self.take_rate_limit() {
            return Err(StoreError::RateLimited);
        }
        Ok(self
            .records(table)
            .into_iter()
            .map(|record| StoredRecord {
                id: record.id,
                fields: if fields.is_empty() {
                    record.fields
                } else {
                    record
                        .fields
                        .into_iter()
                        .filter(|(name, _)| fields.contains(&name.as_str()))
                        .collect()
                },
            })
            .collect())
    }

    fn update(&self, table: &str, updates: &[RecordUpdate]) -> Result<(), StoreError> {
        self.calls.lock().unwrap().push(StoreCall::Update {
            table: table.to_string(),
            records: updates.len(),
        });
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        for update in updates {
            let Some(row) = rows.iter_mut().find(|row| row.id == update.id) else {
                return Err(StoreError::Status {
                    status: 404,
                    message: format!("unknown record {}", update.id),
                });
            };
            for (name, value) in &update.fields {
                row.fields.insert(name.clone(), value.clone());
            }
        }
        Ok(())
    }

    fn delete(&self, table: &str, ids: &[String]) -> Result<(), StoreError> {
        self.calls.lock().unwrap().push(StoreCall::Delete {
            table: table.to_string(),
            records: ids.len(),
        });
        let mut tables = self.tables.lock().unwrap();
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|row| !ids.contains(&row.id));
        }
        Ok(())
    }
}
