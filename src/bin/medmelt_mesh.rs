//! medmelt-mesh: load the MeSH vocabulary into the store
//!
//! Reads the single `desc*` and `supp*` file of the MeSH folder and writes the
//! mesh_term, mesh_relationship and mesh_ancestor tables.
//!
//! Usage:
//!   medmelt-mesh --config medmelt.toml
//!   medmelt-mesh --mesh-folder ./mesh --path mesh.db

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Result};
use clap::Parser;
use medmelt::config::StoreKind;
use medmelt::mesh::MeshVocabulary;
use medmelt::store::{SqliteStore, Verbatim};
use medmelt::Settings;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "medmelt-mesh")]
#[command(about = "Load MeSH descriptors, supplementary concepts and their ancestry", long_about = None)]
struct Args {
    /// TOML settings file (defaults apply when omitted)
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Folder holding exactly one desc* and one supp* file
    #[arg(long)]
    mesh_folder: Option<PathBuf>,

    /// SQLite database file
    #[arg(long)]
    path: Option<PathBuf>,
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
    if let Some(folder) = args.mesh_folder {
        settings.mesh.folder = folder;
    }
    if let Some(path) = args.path {
        settings.store.path = path;
    }
    if settings.store.kind != StoreKind::Sqlite {
        bail!("the MeSH tables need a store with a catalog; set [store] kind = \"sqlite\"");
    }

    let vocabulary = MeshVocabulary::load(&settings.mesh.folder)?;
    info!(
        terms = vocabulary.terms.len(),
        relationships = vocabulary.relationships.len(),
        tree_numbers = vocabulary.tree_numbers.len(),
        "vocabulary read"
    );

    // Vocabulary table names are short already
    let mut store = SqliteStore::open(&settings.store.path, Box::new(Verbatim))?;
    vocabulary.write_to(&mut store, settings.store.batch_size)?;
    Ok(())
}
