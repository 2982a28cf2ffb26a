use std::fs;
use std::io::{self, Write};

use camino::Utf8Path;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::app::{HarvestResult, LinkResult, PushResult, TruncateResult};
use crate::domain::{CARD_COLUMNS, CardRow, STUDY_COLUMNS, StudyRow};
use crate::error::HarvestError;

pub const CARDS_FILE: &str = "evidence_cards.csv";
pub const STUDIES_FILE: &str = "evidence_studies.csv";

pub fn write_cards(path: &Utf8Path, rows: &[CardRow]) -> Result<(), HarvestError> {
    write_rows(path, &CARD_COLUMNS, rows)
}

pub fn write_studies(path: &Utf8Path, rows: &[StudyRow]) -> Result<(), HarvestError> {
    write_rows(path, &STUDY_COLUMNS, rows)
}

pub fn read_cards(path: &Utf8Path) -> Result<Vec<CardRow>, HarvestError> {
    read_rows(path)
}

pub fn read_studies(path: &Utf8Path) -> Result<Vec<StudyRow>, HarvestError> {
    read_rows(path)
}

/// The header is written by hand so an empty table still carries its columns.
fn write_rows<T: Serialize>(
    path: &Utf8Path,
    columns: &[&str],
    rows: &[T],
) -> Result<(), HarvestError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|err| HarvestError::Csv(format!("{path}: {err}")))?;
    writer
        .write_record(columns)
        .map_err(|err| HarvestError::Csv(err.to_string()))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|err| HarvestError::Csv(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    Ok(())
}

fn read_rows<T: DeserializeOwned>(path: &Utf8Path) -> Result<Vec<T>, HarvestError> {
    let mut reader =
        csv::Reader::from_path(path).map_err(|err| HarvestError::Csv(format!("{path}: {err}")))?;
    reader
        .deserialize::<T>()
        .map(|row| row.map_err(|err| HarvestError::Csv(format!("{path}: {err}"))))
        .collect()
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_harvest(result: &HarvestResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_push(result: &PushResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_link(result: &LinkResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_truncate(result: &TruncateResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
