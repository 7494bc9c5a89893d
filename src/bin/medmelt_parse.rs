//! medmelt-parse: load every corpus file into the store
//!
//! Each citation replaces the rows an earlier version of it left behind, and every
//! DeleteCitation entry removes the listed citations.
//!
//! Usage:
//!   medmelt-parse --config medmelt.toml
//!   medmelt-parse --xml-folder ./updates --store jsonl --path ./rows

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use medmelt::config::StoreKind;
use medmelt::store::{name_mangler, JsonlSink, SqliteStore};
use medmelt::{
    ingest_corpus, CorpusSource, DataSink, IngestCoordinator, RecordDecomposer, Schema,
    Settings, TableLayout,
};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "medmelt-parse")]
#[command(about = "Decompose XML files into rows and load them into a store", long_about = None)]
struct Args {
    /// TOML settings file (defaults apply when omitted)
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Folder holding the *.xml / *.xml.gz corpus
    #[arg(long)]
    xml_folder: Option<PathBuf>,

    /// Store kind: sqlite or jsonl
    #[arg(long)]
    store: Option<String>,

    /// Database file (sqlite) or output directory (jsonl)
    #[arg(long)]
    path: Option<PathBuf>,

    /// Frozen schema written by medmelt-analyse
    #[arg(long)]
    schema_file: Option<PathBuf>,
}

fn load_schema(path: &Path) -> Result<Schema> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema {}", path.display()))?;
    Ok(Schema::from_json(&json)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(folder) = args.xml_folder {
        settings.corpus.xml_folder = folder;
    }
    if let Some(kind) = args.store {
        settings.store.kind = match kind.to_ascii_lowercase().as_str() {
            "sqlite" => StoreKind::Sqlite,
            "jsonl" => StoreKind::Jsonl,
            other => bail!("unknown store kind '{}'", other),
        };
    }
    if let Some(path) = args.path {
        settings.store.path = path;
    }
    if let Some(schema_file) = args.schema_file {
        settings.store.schema_file = schema_file;
    }

    let config = settings.melt.clone();
    let names = name_mangler(settings.store.abbreviate, &config.separator);

    let (layout, sink): (TableLayout, Box<dyn DataSink>) = match settings.store.kind {
        StoreKind::Sqlite => {
            let mut store = SqliteStore::open(&settings.store.path, names)?;
            let mut layout = TableLayout::from_catalog(&store, &config)?;
            if layout.is_empty() {
                info!("no tables in the database yet, creating them from the schema file");
                let schema = load_schema(&settings.store.schema_file)?;
                schema.materialize(&mut store)?;
                layout = schema.layout();
            }
            (layout, Box::new(store) as Box<dyn DataSink>)
        }
        StoreKind::Jsonl => {
            let schema = load_schema(&settings.store.schema_file)?;
            let sink = JsonlSink::new(&settings.store.path)?.with_names(names);
            (schema.layout(), Box::new(sink) as Box<dyn DataSink>)
        }
    };
    if !layout.contains_table(&config.root_table) {
        bail!("schema has no {} table; run medmelt-analyse first", config.root_table);
    }
    info!(tables = layout.len(), "layout loaded");

    let source = CorpusSource::open(&settings.corpus.xml_folder)?;
    info!(files = source.len(), "parsing corpus");

    let decomposer = RecordDecomposer::new(layout, config);
    let mut coordinator = IngestCoordinator::new(decomposer, sink, settings.store.batch_size);
    let stats = ingest_corpus(&source, &mut coordinator)?;

    info!(
        documents = stats.documents,
        rows = stats.rows,
        deleted = stats.deleted,
        failed = stats.failed,
        dropped_fields = stats.dropped_fields,
        "done"
    );
    Ok(())
}
