pub mod airtable;

use std::collections::HashMap;
use std::thread;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::SyncSettings;
use crate::error::HarvestError;

/// Field name to value, as sent to and read from the store.
pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Store-generated surrogate identifier.
    pub id: String,
    pub fields: Fields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub id: String,
    pub fields: Fields,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    RateLimited,
    Status { status: u16, message: String },
    Transport(String),
}

/// Batched key-value record store. Each call is one request; batches never
/// exceed the size the engine was configured with.
pub trait RecordStore: Send + Sync {
    /// Creates records with no match on `merge_field`, updates the others.
    fn upsert(&self, table: &str, records: &[Fields], merge_field: &str) -> Result<(), StoreError>;
    /// Every record of the table, restricted to `fields`.
    fn list(&self, table: &str, fields: &[&str]) -> Result<Vec<StoredRecord>, StoreError>;
    fn update(&self, table: &str, updates: &[RecordUpdate]) -> Result<(), StoreError>;
    fn delete(&self, table: &str, ids: &[String]) -> Result<(), StoreError>;
}

impl<T: RecordStore + ?Sized> RecordStore for &T {
    fn upsert(&self, table: &str, records: &[Fields], merge_field: &str) -> Result<(), StoreError> {
        (**self).upsert(table, records, merge_field)
    }

    fn list(&self, table: &str, fields: &[&str]) -> Result<Vec<StoredRecord>, StoreError> {
        (**self).list(table, fields)
    }

    fn update(&self, table: &str, updates: &[RecordUpdate]) -> Result<(), StoreError> {
        (**self).update(table, updates)
    }

    fn delete(&self, table: &str, ids: &[String]) -> Result<(), StoreError> {
        (**self).delete(table, ids)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    pub table: String,
    pub records: usize,
    pub batches: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub table: String,
    pub linked: usize,
    pub already_linked: usize,
    pub orphaned: usize,
}

pub struct SyncEngine<S> {
    store: S,
    settings: SyncSettings,
}

impl<S: RecordStore> SyncEngine<S> {
    pub fn new(store: S, settings: SyncSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Upserts `rows` in fixed-size batches merged on `merge_field`.
    ///
    /// A rate-limited batch is retried per the retry policy; any other failure
    /// aborts the sync, leaving earlier batches committed.
    pub fn upsert_all(
        &self,
        table: &str,
        rows: &[Fields],
        merge_field: &str,
    ) -> Result<UpsertReport, HarvestError> {
        let mut report = UpsertReport {
            table: table.to_string(),
            ..UpsertReport::default()
        };
        for chunk in rows.chunks(self.batch_size()) {
            self.paced(table, || self.store.upsert(table, chunk, merge_field))?;
            report.batches += 1;
            report.records += chunk.len();
        }
        tracing::info!(table, records = report.records, batches = report.batches, "upserted");
        Ok(report)
    }

    /// Points every unlinked child at its parent's surrogate identifier.
    ///
    /// The parent business key is read from a field with the same name as
    /// `child_fk_field`. Children already holding a link are never rewritten.
    pub fn resolve_links(
        &self,
        child_table: &str,
        parent_table: &str,
        child_fk_field: &str,
        link_field: &str,
    ) -> Result<LinkReport, HarvestError> {
        let parents = self.with_retry(parent_table, || {
            self.store.list(parent_table, &[child_fk_field])
        })?;
        let parent_ids: HashMap<String, String> = parents
            .into_iter()
            .filter_map(|record| {
                let key = text_field(&record.fields, child_fk_field)?;
                Some((key, record.id))
            })
            .collect();

        let children = self.with_retry(child_table, || {
            self.store.list(child_table, &[child_fk_field, link_field])
        })?;
        let mut report = LinkReport {
            table: child_table.to_string(),
            ..LinkReport::default()
        };
        let mut updates = Vec::new();
        for child in children {
            if has_link(&child.fields, link_field) {
                report.already_linked += 1;
                continue;
            }
            let parent = text_field(&child.fields, child_fk_field)
                .and_then(|key| parent_ids.get(&key));
            let Some(parent_id) = parent else {
                report.orphaned += 1;
                continue;
            };
            let mut fields = Fields::new();
            fields.insert(
                link_field.to_string(),
                Value::Array(vec![Value::String(parent_id.clone())]),
            );
            updates.push(RecordUpdate {
                id: child.id,
                fields,
            });
        }

        for chunk in updates.chunks(self.batch_size()) {
            self.paced(child_table, || self.store.update(child_table, chunk))?;
            report.linked += chunk.len();
        }
        tracing::info!(
            table = child_table,
            linked = report.linked,
            already_linked = report.already_linked,
            orphaned = report.orphaned,
            "links resolved"
        );
        Ok(report)
    }

    /// Deletes every record of `table`. Refused unless the settings opt in.
    pub fn truncate(&self, table: &str) -> Result<usize, HarvestError> {
        if !self.settings.allow_truncate {
            return Err(HarvestError::TruncateNotAllowed(table.to_string()));
        }
        let records = self.with_retry(table, || self.store.list(table, &[]))?;
        let ids: Vec<String> = records.into_iter().map(|record| record.id).collect();
        for chunk in ids.chunks(self.batch_size()) {
            self.paced(table, || self.store.delete(table, chunk))?;
        }
        tracing::warn!(table, deleted = ids.len(), "table truncated");
        Ok(ids.len())
    }

    fn batch_size(&self) -> usize {
        self.settings.batch_size.max(1)
    }

    /// One batch request followed by the pacing delay, whatever the outcome.
    fn paced<T, F>(&self, table: &str, request: F) -> Result<T, HarvestError>
    where
        F: FnMut() -> Result<T, StoreError>,
    {
        let result = self.with_retry(table, request);
        if !self.settings.batch_delay.is_zero() {
            thread::sleep(self.settings.batch_delay);
        }
        result
    }

    fn with_retry<T, F>(&self, table: &str, mut request: F) -> Result<T, HarvestError>
    where
        F: FnMut() -> Result<T, StoreError>,
    {
        let policy = self.settings.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            match request() {
                Ok(value) => return Ok(value),
                Err(StoreError::RateLimited) if attempt < max_attempts => {
                    tracing::warn!(table, attempt, delay = ?policy.delay, "rate limited, backing off");
                    thread::sleep(policy.delay);
                    attempt += 1;
                }
                Err(StoreError::RateLimited) => {
                    return Err(HarvestError::RateLimited {
                        table: table.to_string(),
                        attempts: attempt,
                    });
                }
                Err(StoreError::Status { status, message }) => {
                    return Err(HarvestError::StoreStatus { status, message });
                }
                Err(StoreError::Transport(message)) => {
                    return Err(HarvestError::StoreHttp(message));
                }
            }
        }
    }
}

/// Serializes rows into store records.
pub fn to_records<T: Serialize>(rows: &[T]) -> Result<Vec<Fields>, HarvestError> {
    rows.iter()
        .map(|row| match serde_json::to_value(row) {
            Ok(Value::Object(fields)) => Ok(fields),
            Ok(other) => Err(HarvestError::Serialization(format!(
                "expected an object, got {other}"
            ))),
            Err(err) => Err(HarvestError::Serialization(err.to_string())),
        })
        .collect()
}

/// Collapses records sharing a business key, last write wins, and drops
/// records whose key is empty. Each surviving key keeps the position of its
/// first occurrence.
pub fn dedupe_by_key(records: Vec<Fields>, key_field: &str) -> Vec<Fields> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Fields> = Vec::new();
    for record in records {
        let Some(key) = text_field(&record, key_field) else {
            continue;
        };
        match positions.get(&key) {
            Some(&pos) => out[pos] = record,
            None => {
                positions.insert(key, out.len());
                out.push(record);
            }
        }
    }
    out
}

fn text_field(fields: &Fields, name: &str) -> Option<String> {
    let value = match fields.get(name)? {
        Value::String(value) => value.trim().to_string(),
        Value::Number(value) => value.to_string(),
        _ => return None,
    };
    if value.is_empty() { None } else { Some(value) }
}

fn has_link(fields: &Fields, link_field: &str) -> bool {
    match fields.get(link_field) {
        None | Some(Value::Null) => false,
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::String(value)) => !value.trim().is_empty(),
        Some(_) => true,
    }
}
