//! medmelt-analyse: infer the relational schema of an XML corpus
//!
//! Samples corpus files, infers tables, fields and column types, writes the
//! frozen schema as JSON and creates the tables in the configured store.
//!
//! Usage:
//!   # Analyse with settings from a TOML file
//!   medmelt-analyse --config medmelt.toml
//!
//!   # Analyse a folder, print the structure and the DDL, create nothing
//!   medmelt-analyse --xml-folder ./medline --print --ddl --no-create

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use medmelt::config::StoreKind;
use medmelt::store::sqlite::create_table_sql;
use medmelt::store::{name_mangler, SqliteStore};
use medmelt::{analyse_corpus, CorpusSource, Settings};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "medmelt-analyse")]
#[command(about = "Infer a relational schema from a folder of XML files", long_about = None)]
struct Args {
    /// TOML settings file (defaults apply when omitted)
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Folder holding the *.xml / *.xml.gz corpus
    #[arg(long)]
    xml_folder: Option<PathBuf>,

    /// Maximum number of files sampled for analysis
    #[arg(long)]
    max_files: Option<usize>,

    /// Seed for the file sample
    #[arg(long)]
    seed: Option<u64>,

    /// Where to write the frozen schema
    #[arg(long)]
    schema_file: Option<PathBuf>,

    /// Print every table with its fields and types
    #[arg(long)]
    print: bool,

    /// Print CREATE TABLE statements for the configured dialect
    #[arg(long)]
    ddl: bool,

    /// Do not create the tables in the store
    #[arg(long)]
    no_create: bool,
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
    if let Some(max) = args.max_files {
        settings.corpus.max_files_to_analyse = max;
    }
    if args.seed.is_some() {
        settings.corpus.seed = args.seed;
    }
    if let Some(schema_file) = args.schema_file {
        settings.store.schema_file = schema_file;
    }

    let source = CorpusSource::open(&settings.corpus.xml_folder)?
        .sample(settings.corpus.max_files_to_analyse, settings.corpus.seed);
    info!(files = source.len(), "analysing corpus");

    let schema = analyse_corpus(&source, settings.melt.clone())?;
    std::fs::write(&settings.store.schema_file, schema.to_json()?).with_context(|| {
        format!("Failed to write {}", settings.store.schema_file.display())
    })?;
    info!(
        tables = schema.tables.len(),
        path = %settings.store.schema_file.display(),
        "schema written"
    );

    if args.print {
        println!("{}", schema.describe());
    }

    let names = name_mangler(settings.store.abbreviate, &settings.melt.separator);
    if args.ddl {
        for table in &schema.tables {
            println!("{};\n", create_table_sql(table, settings.store.dialect, names.as_ref()));
        }
    }

    if args.no_create {
        return Ok(());
    }
    match settings.store.kind {
        StoreKind::Sqlite => {
            let mut store = SqliteStore::open(&settings.store.path, names)?;
            schema.materialize(&mut store)?;
            info!(path = %settings.store.path.display(), "tables created");
        }
        StoreKind::Jsonl => {
            info!("JSON Lines store has no catalog; the schema file is the only table definition");
        }
    }

    Ok(())
}
