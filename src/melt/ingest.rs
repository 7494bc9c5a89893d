//! Delete-then-insert ingestion of documents into a data sink

use crate::document::Node;
use crate::error::Result;
use crate::melt::identifier::{find_document_key, key_of};
use crate::melt::{DocumentKey, RecordDecomposer, Row, SchemaDrift};
use crate::store::{DataSink, KeyFilter};
use std::collections::BTreeMap;
use std::ops::AddAssign;
use tracing::{debug, info, warn};

/// Outcome of ingesting one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub key: DocumentKey,
    pub rows: usize,
    pub drift: Vec<SchemaDrift>,
}

/// Running totals over everything a coordinator has processed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub documents: usize,
    pub rows: usize,
    pub deleted: usize,
    pub failed: usize,
    pub dropped_fields: usize,
}

impl AddAssign for IngestStats {
    fn add_assign(&mut self, other: IngestStats) {
        self.documents += other.documents;
        self.rows += other.rows;
        self.deleted += other.deleted;
        self.failed += other.failed;
        self.dropped_fields += other.dropped_fields;
    }
}

/// Replaces a document's rows in the sink, keyed by its natural id and version.
///
/// Every known table gets a delete for the document's key before the new rows go
/// in, so re-ingesting an updated (or the same) document never leaves rows of an
/// earlier version behind.
pub struct IngestCoordinator<S: DataSink> {
    decomposer: RecordDecomposer,
    sink: S,
    batch_size: usize,
    stats: IngestStats,
}

impl<S: DataSink> IngestCoordinator<S> {
    pub fn new(decomposer: RecordDecomposer, sink: S, batch_size: usize) -> Self {
        IngestCoordinator {
            decomposer,
            sink,
            batch_size: batch_size.max(1),
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()
    }

    /// Replace the stored rows of one document.
    ///
    /// The deletes and inserts run as one unit of work in the sink, so a failed
    /// insert leaves the previously stored rows in place.
    pub fn ingest(&mut self, document: &Node) -> Result<IngestReport> {
        // Decompose first so a document that cannot be split leaves stored rows alone
        let decomposition = self.decomposer.decompose(document)?;

        let row_count = decomposition.rows.len();
        let mut by_table: BTreeMap<String, Vec<Row>> = BTreeMap::new();
        for row in decomposition.rows {
            by_table.entry(row.table.clone()).or_default().push(row);
        }
        self.in_unit(|coordinator| {
            coordinator.delete_key(&decomposition.key)?;
            for (table, rows) in &by_table {
                for batch in rows.chunks(coordinator.batch_size) {
                    coordinator.sink.insert_batch(table, batch)?;
                }
            }
            Ok(())
        })?;

        self.stats.documents += 1;
        self.stats.rows += row_count;
        self.stats.dropped_fields += decomposition.drift.len();
        debug!(id = %decomposition.key.id, rows = row_count, "document ingested");

        Ok(IngestReport {
            key: decomposition.key,
            rows: row_count,
            drift: decomposition.drift,
        })
    }

    /// Remove every row of the document, inserting nothing
    pub fn delete(&mut self, document: &Node) -> Result<DocumentKey> {
        let key = find_document_key(document, self.decomposer.config())?;
        self.in_unit(|coordinator| coordinator.delete_key(&key))?;
        self.stats.deleted += 1;
        Ok(key)
    }

    /// Remove every document listed by a deletion element; returns how many.
    ///
    /// Each listed id is deleted on its own. An id that is malformed or fails to
    /// delete is logged and counted as failed, and the rest of the list still runs.
    pub fn delete_citations(&mut self, deletion: &Node) -> usize {
        let config = self.decomposer.config().clone();
        let mut deleted = 0;
        for id_node in deletion
            .children
            .iter()
            .filter(|child| child.name == config.id_element)
        {
            let outcome = key_of(id_node, &config)
                .and_then(|key| self.in_unit(|coordinator| coordinator.delete_key(&key)));
            match outcome {
                Ok(()) => deleted += 1,
                Err(e) => {
                    warn!(error = %e, "skipping deleted citation");
                    self.stats.failed += 1;
                }
            }
        }
        self.stats.deleted += deleted;
        deleted
    }

    /// Ingest every document and apply every deletion found in a parsed file.
    ///
    /// Failures are scoped to the document they occur in: they are logged and
    /// counted, and the rest of the file is still processed.
    pub fn ingest_file(&mut self, file: &Node) -> IngestStats {
        let before = self.stats.clone();
        let root_table = self.decomposer.config().root_table.clone();
        let deletion_element = self.decomposer.config().deletion_element.clone();

        let documents = file.descendants_named(&root_table);
        let total = documents.len();
        for (i, document) in documents.into_iter().enumerate() {
            if let Err(e) = self.ingest(document) {
                warn!(error = %e, "skipping document");
                self.stats.failed += 1;
            }
            if i % 10_000 == 0 && i != 0 {
                info!("{} of {} documents", i, total);
            }
        }
        info!("{} of {} documents", total, total);

        let deletions = file.descendants_named(&deletion_element);
        if !deletions.is_empty() {
            info!("deleting obsolete records");
            for deletion in deletions {
                self.delete_citations(deletion);
            }
        }

        IngestStats {
            documents: self.stats.documents - before.documents,
            rows: self.stats.rows - before.rows,
            deleted: self.stats.deleted - before.deleted,
            failed: self.stats.failed - before.failed,
            dropped_fields: self.stats.dropped_fields - before.dropped_fields,
        }
    }

    /// Run `work` as one unit of work in the sink, rolling back when it fails
    fn in_unit<F>(&mut self, work: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.sink.begin()?;
        match work(self) {
            Ok(()) => self.sink.commit(),
            Err(e) => {
                if let Err(rollback) = self.sink.rollback() {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    fn delete_key(&mut self, key: &DocumentKey) -> Result<()> {
        let config = self.decomposer.config();
        let version_field = config.version_column();
        let filter = KeyFilter {
            id_field: config.id_column(),
            id_value: &key.id,
            version_field: &version_field,
            version_value: &key.version,
        };
        for table in self.decomposer.layout().tables() {
            self.sink.delete_where(table, &filter)?;
        }
        Ok(())
    }
}
