use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("invalid card configuration{}: {reason}", card_label(.card_id))]
    InvalidCard {
        card_id: Option<String>,
        reason: String,
    },

    #[error("missing card config file {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse card config: {0}")]
    ConfigParse(String),

    #[error("missing required setting {0}")]
    #[diagnostic(help("set it in the environment or in a .env file next to the card config"))]
    MissingSetting(String),

    #[error("PubMed request failed: {0}")]
    PubmedHttp(String),

    #[error("PubMed returned status {status}: {message}")]
    PubmedStatus { status: u16, message: String },

    #[error("OpenAlex request failed: {0}")]
    OpenAlexHttp(String),

    #[error("OpenAlex returned status {status}: {message}")]
    OpenAlexStatus { status: u16, message: String },

    #[error("Crossref request failed: {0}")]
    CrossrefHttp(String),

    #[error("Crossref returned status {status}: {message}")]
    CrossrefStatus { status: u16, message: String },

    #[error("Unpaywall request failed: {0}")]
    UnpaywallHttp(String),

    #[error("Unpaywall returned status {status}: {message}")]
    UnpaywallStatus { status: u16, message: String },

    #[error("Airtable request failed: {0}")]
    StoreHttp(String),

    #[error("Airtable returned status {status}: {message}")]
    StoreStatus { status: u16, message: String },

    #[error("Airtable kept rate limiting requests to {table} after {attempts} attempts")]
    RateLimited { table: String, attempts: u32 },

    #[error("refusing to truncate {0} without explicit opt-in")]
    #[diagnostic(help("pass --yes to delete every record in the table"))]
    TruncateNotAllowed(String),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to encode record: {0}")]
    Serialization(String),
}

fn card_label(card_id: &Option<String>) -> String {
    match card_id {
        Some(id) => format!(" for {id}"),
        None => String::new(),
    }
}
