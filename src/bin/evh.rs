use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use evidence_harvester::app::{self, App, TableSelection, Tables};
use evidence_harvester::builder::CardBuilder;
use evidence_harvester::config::{BuildSettings, ConfigLoader, Settings, SyncSettings};
use evidence_harvester::error::HarvestError;
use evidence_harvester::output::{self, CARDS_FILE, JsonOutput, STUDIES_FILE};
use evidence_harvester::sources::LiteratureSearch;
use evidence_harvester::sources::crossref::CrossrefClient;
use evidence_harvester::sources::openalex::OpenAlexClient;
use evidence_harvester::sources::pubmed::{PubmedClient, PubmedReviews};
use evidence_harvester::sources::unpaywall::UnpaywallClient;
use evidence_harvester::sync::SyncEngine;
use evidence_harvester::sync::airtable::{AirtableClient, MAX_RECORDS_PER_REQUEST};

#[derive(Parser)]
#[command(name = "evh")]
#[command(about = "Harvest candidate literature evidence for device design features and sync it to Airtable")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Build evidence cards and studies from the card config")]
    Harvest(HarvestArgs),
    #[command(about = "Upsert existing card and study CSV files into Airtable")]
    Push(PushArgs),
    #[command(about = "Link Airtable studies to their cards")]
    Link,
    #[command(about = "Delete every record of an Airtable table")]
    Truncate(TruncateArgs),
}

#[derive(Args)]
struct HarvestArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long, default_value = ".")]
    out_dir: Utf8PathBuf,

    #[arg(long)]
    sync: bool,

    #[arg(long)]
    no_link: bool,
}

#[derive(Args)]
struct PushArgs {
    #[arg(long, default_value = CARDS_FILE)]
    cards: Utf8PathBuf,

    #[arg(long, default_value = STUDIES_FILE)]
    studies: Utf8PathBuf,

    #[arg(long)]
    no_link: bool,
}

#[derive(Args)]
struct TruncateArgs {
    #[arg(long, value_enum)]
    table: TableArg,

    #[arg(long)]
    yes: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum TableArg {
    Cards,
    Studies,
    All,
}

impl From<TableArg> for TableSelection {
    fn from(value: TableArg) -> Self {
        match value {
            TableArg::Cards => TableSelection::Cards,
            TableArg::Studies => TableSelection::Studies,
            TableArg::All => TableSelection::All,
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::MissingConfig(_)
        | HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_)
        | HarvestError::MissingSetting(_)
        | HarvestError::TruncateNotAllowed(_) => 2,
        HarvestError::StoreHttp(_)
        | HarvestError::StoreStatus { .. }
        | HarvestError::RateLimited { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(err).into_diagnostic();
        }
    }

    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::Harvest(args) => run_harvest(args, &settings),
        Commands::Push(args) => run_push(args, &settings),
        Commands::Link => {
            let app = sync_app(&settings, false)?;
            let result = app.link()?;
            JsonOutput::print_link(&result).into_diagnostic()
        }
        Commands::Truncate(args) => {
            let app = sync_app(&settings, args.yes)?;
            let result = app.truncate(args.table.into())?;
            JsonOutput::print_truncate(&result).into_diagnostic()
        }
    }
}

fn run_harvest(args: HarvestArgs, settings: &Settings) -> miette::Result<()> {
    let contact = settings.require_contact()?;
    // Fail on missing Airtable settings before any literature request is made.
    let sync = if args.sync {
        Some(sync_app(settings, false)?)
    } else {
        None
    };
    let rows = ConfigLoader::resolve(args.config.as_deref())?;

    let pubmed = PubmedClient::new(Some(contact))?;
    let reviews: Vec<Box<dyn LiteratureSearch>> = vec![
        Box::new(OpenAlexClient::new(Some(contact))?),
        Box::new(PubmedReviews::new(pubmed.clone())),
    ];
    let builder = CardBuilder::new(
        reviews,
        pubmed,
        CrossrefClient::new(Some(contact))?,
        UnpaywallClient::new(contact)?,
        BuildSettings::default(),
    );

    let today = chrono::Local::now().date_naive();
    let (harvested, mut result) = app::harvest(&builder, &rows, today, &args.out_dir)?;
    if let Some(sync) = sync {
        let pushed = sync.push(&harvested.cards, &harvested.studies, !args.no_link)?;
        result.sync = Some(pushed);
    }
    JsonOutput::print_harvest(&result).into_diagnostic()
}

fn run_push(args: PushArgs, settings: &Settings) -> miette::Result<()> {
    let app = sync_app(settings, false)?;
    let cards = output::read_cards(&args.cards)?;
    let studies = output::read_studies(&args.studies)?;
    let result = app.push(&cards, &studies, !args.no_link)?;
    JsonOutput::print_push(&result).into_diagnostic()
}

fn sync_app(settings: &Settings, allow_truncate: bool) -> miette::Result<App<AirtableClient>> {
    let airtable = settings.require_airtable()?;
    let client = AirtableClient::new(airtable)?;
    let sync_settings = SyncSettings {
        batch_size: MAX_RECORDS_PER_REQUEST,
        allow_truncate,
        ..SyncSettings::default()
    };
    Ok(App::new(
        SyncEngine::new(client, sync_settings),
        Tables::from(airtable),
    ))
}
