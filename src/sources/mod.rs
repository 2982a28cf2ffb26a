pub mod crossref;
pub mod http;
pub mod openalex;
pub mod pubmed;
pub mod unpaywall;

use crate::domain::{Doi, Enrichment, Lookup, NormalizedRecord};

/// How a search service expects its query to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStyle {
    /// Field-tagged boolean syntax, e.g. `stemless[Title/Abstract] AND revision`.
    Boolean,
    FreeText,
}

pub trait LiteratureSearch: Send + Sync {
    fn name(&self) -> &'static str;
    fn query_style(&self) -> QueryStyle;
    fn search(&self, query: &str, since: Option<&str>, limit: usize)
    -> Lookup<Vec<NormalizedRecord>>;
}

pub trait CitationEnrichment: Send + Sync {
    fn name(&self) -> &'static str;
    fn lookup(&self, doi: &Doi) -> Lookup<Enrichment>;
}

pub trait OpenAccessResolver: Send + Sync {
    fn name(&self) -> &'static str;
    /// Best open-access PDF URL, or landing page when no PDF is known.
    fn resolve(&self, doi: &Doi) -> Lookup<String>;
}

impl<T: LiteratureSearch + ?Sized> LiteratureSearch for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn query_style(&self) -> QueryStyle {
        (**self).query_style()
    }

    fn search(
        &self,
        query: &str,
        since: Option<&str>,
        limit: usize,
    ) -> Lookup<Vec<NormalizedRecord>> {
        (**self).search(query, since, limit)
    }
}

impl<T: LiteratureSearch + ?Sized> LiteratureSearch for &T {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn query_style(&self) -> QueryStyle {
        (**self).query_style()
    }

    fn search(
        &self,
        query: &str,
        since: Option<&str>,
        limit: usize,
    ) -> Lookup<Vec<NormalizedRecord>> {
        (**self).search(query, since, limit)
    }
}

impl<T: CitationEnrichment + ?Sized> CitationEnrichment for &T {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn lookup(&self, doi: &Doi) -> Lookup<Enrichment> {
        (**self).lookup(doi)
    }
}

impl<T: OpenAccessResolver + ?Sized> OpenAccessResolver for &T {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resolve(&self, doi: &Doi) -> Lookup<String> {
        (**self).resolve(doi)
    }
}
