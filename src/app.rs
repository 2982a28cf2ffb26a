use camino::Utf8Path;
use chrono::NaiveDate;
use serde::Serialize;

use crate::builder::{CardBuilder, HarvestOutput, SkippedRow};
use crate::config::{AirtableSettings, ConfigRow};
use crate::domain::{CardRow, StudyRow};
use crate::error::HarvestError;
use crate::output::{self, CARDS_FILE, STUDIES_FILE};
use crate::sources::{CitationEnrichment, LiteratureSearch, OpenAccessResolver};
use crate::sync::{LinkReport, RecordStore, SyncEngine, UpsertReport, dedupe_by_key, to_records};

pub const CARD_KEY: &str = "card_id";
pub const STUDY_KEY: &str = "study_id";

#[derive(Debug, Clone, Serialize)]
pub struct HarvestResult {
    pub cards: usize,
    pub studies: usize,
    pub skipped: Vec<SkippedRow>,
    pub cards_path: String,
    pub studies_path: String,
    pub sync: Option<PushResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushResult {
    pub cards: UpsertReport,
    pub studies: UpsertReport,
    pub links: Option<LinkReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkResult {
    pub links: LinkReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct TruncateResult {
    pub tables: Vec<TruncatedTable>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TruncatedTable {
    pub table: String,
    pub deleted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSelection {
    Cards,
    Studies,
    All,
}

/// Destination table names and the study field holding the card link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub cards: String,
    pub studies: String,
    pub link_field: String,
}

impl From<&AirtableSettings> for Tables {
    fn from(settings: &AirtableSettings) -> Self {
        Self {
            cards: settings.cards_table.clone(),
            studies: settings.studies_table.clone(),
            link_field: settings.link_field.clone(),
        }
    }
}

/// Builds every configured card and writes both CSV tables into `out_dir`.
pub fn harvest<P, E, R>(
    builder: &CardBuilder<P, E, R>,
    rows: &[ConfigRow],
    today: NaiveDate,
    out_dir: &Utf8Path,
) -> Result<(HarvestOutput, HarvestResult), HarvestError>
where
    P: LiteratureSearch,
    E: CitationEnrichment,
    R: OpenAccessResolver,
{
    let output = builder.build_all(rows, today);
    let cards_path = out_dir.join(CARDS_FILE);
    let studies_path = out_dir.join(STUDIES_FILE);
    output::write_cards(&cards_path, &output.cards)?;
    output::write_studies(&studies_path, &output.studies)?;
    tracing::info!(
        cards = output.cards.len(),
        studies = output.studies.len(),
        skipped = output.skipped.len(),
        "harvest written"
    );

    let result = HarvestResult {
        cards: output.cards.len(),
        studies: output.studies.len(),
        skipped: output.skipped.clone(),
        cards_path: cards_path.to_string(),
        studies_path: studies_path.to_string(),
        sync: None,
    };
    Ok((output, result))
}

pub struct App<S> {
    engine: SyncEngine<S>,
    tables: Tables,
}

impl<S: RecordStore> App<S> {
    pub fn new(engine: SyncEngine<S>, tables: Tables) -> Self {
        Self { engine, tables }
    }

    /// Upserts cards on `card_id`, studies on `study_id`, then optionally
    /// links studies to their cards.
    pub fn push(
        &self,
        cards: &[CardRow],
        studies: &[StudyRow],
        link: bool,
    ) -> Result<PushResult, HarvestError> {
        let cards = dedupe_by_key(to_records(cards)?, CARD_KEY);
        let studies = dedupe_by_key(to_records(studies)?, STUDY_KEY);

        let cards = self.engine.upsert_all(&self.tables.cards, &cards, CARD_KEY)?;
        let studies = self
            .engine
            .upsert_all(&self.tables.studies, &studies, STUDY_KEY)?;
        let links = if link {
            Some(self.link()?.links)
        } else {
            None
        };
        Ok(PushResult {
            cards,
            studies,
            links,
        })
    }

    pub fn link(&self) -> Result<LinkResult, HarvestError> {
        let links = self.engine.resolve_links(
            &self.tables.studies,
            &self.tables.cards,
            CARD_KEY,
            &self.tables.link_field,
        )?;
        Ok(LinkResult { links })
    }

    /// Studies are emptied before cards so no study is left pointing at a
    /// deleted card.
    pub fn truncate(&self, selection: TableSelection) -> Result<TruncateResult, HarvestError> {
        let targets: Vec<&str> = match selection {
            TableSelection::Cards => vec![self.tables.cards.as_str()],
            TableSelection::Studies => vec![self.tables.studies.as_str()],
            TableSelection::All => vec![self.tables.studies.as_str(), self.tables.cards.as_str()],
        };
        let mut tables = Vec::new();
        for table in targets {
            let deleted = self.engine.truncate(table)?;
            tables.push(TruncatedTable {
                table: table.to_string(),
                deleted,
            });
        }
        Ok(TruncateResult { tables })
    }
}
