use std::collections::HashSet;

use crate::domain::{DedupeKey, Enrichment, Lookup, NormalizedRecord, StudyRow, StudyType, study_id};
use crate::sources::{CitationEnrichment, OpenAccessResolver};

/// Reconciliation state for a single card build.
///
/// The dedupe set lives as long as the reconciler, so feeding review
/// candidates first and primary-study candidates second makes the review
/// classification win for papers found by both.
pub struct Reconciler<'a, E: ?Sized, R: ?Sized> {
    enrichment: &'a E,
    open_access: &'a R,
    seen: HashSet<DedupeKey>,
}

impl<'a, E, R> Reconciler<'a, E, R>
where
    E: CitationEnrichment + ?Sized,
    R: OpenAccessResolver + ?Sized,
{
    pub fn new(enrichment: &'a E, open_access: &'a R) -> Self {
        Self {
            enrichment,
            open_access,
            seen: HashSet::new(),
        }
    }

    pub fn reconcile(
        &mut self,
        candidates: &[NormalizedRecord],
        study_type: StudyType,
        card_id: &str,
        note: &str,
    ) -> Vec<StudyRow> {
        let mut rows = Vec::new();
        for candidate in candidates {
            if candidate.doi.is_none() && candidate.link.trim().is_empty() {
                tracing::debug!(
                    card_id,
                    source = %candidate.source,
                    source_id = %candidate.source_id,
                    "candidate without DOI or link skipped"
                );
                continue;
            }
            if !self.seen.insert(DedupeKey::new(card_id, candidate)) {
                tracing::debug!(
                    card_id,
                    source = %candidate.source,
                    source_id = %candidate.source_id,
                    "duplicate candidate skipped"
                );
                continue;
            }
            rows.push(self.study_row(candidate, study_type, card_id, note));
        }
        rows
    }

    fn study_row(
        &self,
        candidate: &NormalizedRecord,
        study_type: StudyType,
        card_id: &str,
        note: &str,
    ) -> StudyRow {
        let (enrichment, oa_pdf) = match &candidate.doi {
            Some(doi) => (
                self.enrichment.lookup(doi).unwrap_or_default(),
                self.open_access.resolve(doi).unwrap_or_default(),
            ),
            None => (Enrichment::default(), String::new()),
        };
        StudyRow {
            card_id: card_id.to_string(),
            study_id: study_id(candidate.doi.as_ref(), &candidate.link),
            study_type: study_type.to_string(),
            title: candidate.title.clone(),
            year: candidate.year.clone(),
            doi_or_link: candidate.link.clone(),
            design: study_type.to_string(),
            funding: enrichment.funding(),
            source_api: format!(
                "{}/{}/{}",
                candidate.source,
                self.enrichment.name(),
                self.open_access.name()
            ),
            notes: note.to_string(),
            oa_pdf,
            ..StudyRow::default()
        }
    }
}

/// Flattens adapter results, treating an unavailable source as "no candidates".
pub fn collect_candidates<I>(lookups: I) -> Vec<NormalizedRecord>
where
    I: IntoIterator<Item = Lookup<Vec<NormalizedRecord>>>,
{
    lookups
        .into_iter()
        .flat_map(Lookup::unwrap_or_default)
        .collect()
}
