use std::collections::HashMap;
use std::thread;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::{BuildSettings, CardConfig, ConfigRow};
use crate::domain::{CardRow, NormalizedRecord, StudyRow, StudyType};
use crate::error::HarvestError;
use crate::reconcile::{Reconciler, collect_candidates};
use crate::sources::{CitationEnrichment, LiteratureSearch, OpenAccessResolver, QueryStyle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardBuild {
    pub card: CardRow,
    pub studies: Vec<StudyRow>,
}

#[derive(Debug, Clone, Default)]
pub struct HarvestOutput {
    pub cards: Vec<CardRow>,
    pub studies: Vec<StudyRow>,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRow {
    /// Position of the row in the config source, starting at 1.
    pub row: usize,
    pub card_id: Option<String>,
    pub reason: String,
}

/// Builds one evidence card per configuration row.
///
/// Review sources run first and their candidates are tagged as systematic
/// reviews; the general search runs second and supplies primary studies.
pub struct CardBuilder<P, E, R> {
    reviews: Vec<Box<dyn LiteratureSearch>>,
    primary: P,
    enrichment: E,
    open_access: R,
    settings: BuildSettings,
}

impl<P, E, R> CardBuilder<P, E, R>
where
    P: LiteratureSearch,
    E: CitationEnrichment,
    R: OpenAccessResolver,
{
    pub fn new(
        reviews: Vec<Box<dyn LiteratureSearch>>,
        primary: P,
        enrichment: E,
        open_access: R,
        settings: BuildSettings,
    ) -> Self {
        Self {
            reviews,
            primary,
            enrichment,
            open_access,
            settings,
        }
    }

    pub fn build_card(
        &self,
        config: &CardConfig,
        today: NaiveDate,
    ) -> Result<CardBuild, HarvestError> {
        config.validate()?;
        let card_id = config.card_id.trim();
        tracing::info!(card_id, "building card");

        let review_candidates = collect_candidates(self.reviews.iter().filter_map(|source| {
            let query = query_for(source.as_ref(), config)?;
            Some(source.search(query, Some(config.review_since()), config.review_limit()))
        }));
        let primary_candidates: Vec<NormalizedRecord> = match query_for(&self.primary, config) {
            Some(query) => self
                .primary
                .search(query, None, config.primary_limit())
                .unwrap_or_default(),
            None => Vec::new(),
        };

        let mut reconciler = Reconciler::new(&self.enrichment, &self.open_access);
        let mut studies = reconciler.reconcile(
            &review_candidates,
            StudyType::SystematicReviewOrMetaAnalysis,
            card_id,
            config.review_note(),
        );
        studies.extend(reconciler.reconcile(
            &primary_candidates,
            StudyType::PrimaryStudy,
            card_id,
            config.primary_note(),
        ));
        tracing::info!(
            card_id,
            reviews = review_candidates.len(),
            primary = primary_candidates.len(),
            studies = studies.len(),
            "card built"
        );

        Ok(CardBuild {
            card: card_row(config, today),
            studies,
        })
    }

    /// Builds every row in order, pausing between builds. Unreadable and
    /// invalid rows are skipped and reported; a card identifier built twice
    /// keeps the last build.
    pub fn build_all(&self, rows: &[ConfigRow], today: NaiveDate) -> HarvestOutput {
        let mut builds: Vec<CardBuild> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut skipped = Vec::new();
        let mut built_any = false;

        for (idx, row) in rows.iter().enumerate() {
            let config = match row {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!(row = idx + 1, error = %err, "skipping unreadable card config row");
                    skipped.push(skipped_row(idx, None, err));
                    continue;
                }
            };
            if let Err(err) = config.validate() {
                tracing::warn!(row = idx + 1, error = %err, "skipping card config row");
                skipped.push(skipped_row(idx, Some(config), &err));
                continue;
            }
            if built_any && !self.settings.build_delay.is_zero() {
                thread::sleep(self.settings.build_delay);
            }
            built_any = true;

            match self.build_card(config, today) {
                Ok(build) => match positions.get(&build.card.card_id) {
                    Some(&pos) => {
                        tracing::warn!(card_id = %build.card.card_id, "card built twice, keeping the later build");
                        builds[pos] = build;
                    }
                    None => {
                        positions.insert(build.card.card_id.clone(), builds.len());
                        builds.push(build);
                    }
                },
                Err(err) => {
                    tracing::warn!(row = idx + 1, error = %err, "skipping card config row");
                    skipped.push(skipped_row(idx, Some(config), &err));
                }
            }
        }

        let mut output = HarvestOutput {
            skipped,
            ..HarvestOutput::default()
        };
        for build in builds {
            output.cards.push(build.card);
            output.studies.extend(build.studies);
        }
        output
    }
}

fn query_for<'c, S: LiteratureSearch + ?Sized>(source: &S, config: &'c CardConfig) -> Option<&'c str> {
    match source.query_style() {
        QueryStyle::Boolean => config.boolean_query(),
        QueryStyle::FreeText => config.free_text_query(),
    }
}

fn card_row(config: &CardConfig, today: NaiveDate) -> CardRow {
    CardRow {
        card_id: config.card_id.trim().to_string(),
        entity_type: config.entity_type().to_string(),
        entity_name: config.entity_name.trim().to_string(),
        outcome: config.outcome.clone(),
        comparator: config.comparator.clone(),
        bottom_line: config.bottom_line.clone(),
        certainty: config.certainty.clone(),
        registry_njr: config.registry_njr.clone(),
        registry_aoanjrr: config.registry_aoanjrr.clone(),
        registry_ajrr: config.registry_ajrr.clone(),
        last_updated: today.format("%Y-%m-%d").to_string(),
        tags: config.tags.clone(),
    }
}

fn skipped_row(idx: usize, config: Option<&CardConfig>, err: &HarvestError) -> SkippedRow {
    let card_id = match (config, err) {
        (Some(config), _) => Some(config.card_id.trim().to_string()),
        (None, HarvestError::InvalidCard { card_id, .. }) => card_id.clone(),
        (None, _) => None,
    };
    SkippedRow {
        row: idx + 1,
        card_id: card_id.filter(|id| !id.is_empty()),
        reason: err.to_string(),
    }
}
