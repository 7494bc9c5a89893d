//! Corpus files on disk: listing, sampling, decompressing and parsing

use crate::document::Node;
use crate::pipeline::PrefetchPipeline;
use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;

/// Open a file for reading, decompressing it when the name ends in `.gz`
pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let gzipped = path.extension().is_some_and(|ext| ext == "gz");
    if gzipped {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(BufReader::new(file)))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Decompress and parse one corpus file
pub fn load_document(path: &Path) -> Result<Node> {
    let reader = open_reader(path)?;
    Node::parse_reader(reader).with_context(|| format!("Failed to parse {}", path.display()))
}

fn is_corpus_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".xml") || n.ends_with(".xml.gz"))
}

/// The XML files of a corpus folder, sorted by file name
#[derive(Debug, Clone)]
pub struct CorpusSource {
    files: Vec<PathBuf>,
}

impl CorpusSource {
    pub fn open<P: AsRef<Path>>(folder: P) -> Result<Self> {
        let folder = folder.as_ref();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(folder)
            .with_context(|| format!("Failed to read folder {}", folder.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_corpus_file(&path) {
                files.push(path);
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(CorpusSource { files })
    }

    pub fn from_files(mut files: Vec<PathBuf>) -> Self {
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        CorpusSource { files }
    }

    /// Keep a random subset of at most `n` files, still sorted by name
    pub fn sample(self, n: usize, seed: Option<u64>) -> Self {
        if self.files.len() <= n {
            return self;
        }
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let picked = self.files.choose_multiple(&mut rng, n).cloned().collect();
        Self::from_files(picked)
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Parsed files in order; the next file is decoded while the caller works
    /// on the current one
    pub fn documents(&self) -> impl Iterator<Item = (PathBuf, Result<Node>)> {
        let mut files = self.files.clone().into_iter();
        PrefetchPipeline::new(move || {
            files.next().map(|path| {
                info!("Processing {}", path.display());
                let document = load_document(&path);
                (path, document)
            })
        })
        .into_iter()
    }
}
