//! The authoritative record set and the handle used to share it.
//!
//! The store is the only writer: it builds a new [`Corpus`] value and
//! publishes it through [`CorpusHandle::publish`]. Indexes and the fusion layer
//! take [`CorpusHandle::snapshot`]s, which stay valid while newer versions are
//! published.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::knowledge::types::KnowledgeRecord;

/// Immutable view of every record, keyed by id.
///
/// Records are held behind `Arc` so cloning a corpus to apply a mutation
/// copies pointers, not bodies.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    records: BTreeMap<String, Arc<KnowledgeRecord>>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of records. Later entries replace earlier ones with
    /// the same id.
    pub fn from_records(records: impl IntoIterator<Item = KnowledgeRecord>) -> Self {
        let mut corpus = Self::new();
        for record in records {
            corpus.insert(record);
        }
        corpus
    }

    pub fn get(&self, id: &str) -> Option<&Arc<KnowledgeRecord>> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in id order.
    pub fn records(&self) -> impl Iterator<Item = &Arc<KnowledgeRecord>> {
        self.records.values()
    }

    /// Records sharing a `file`/`category` partition.
    pub fn partition<'a>(
        &'a self,
        file: &'a str,
        category: &'a str,
    ) -> impl Iterator<Item = &'a Arc<KnowledgeRecord>> + 'a {
        self.records
            .values()
            .filter(move |r| r.file == file && r.category == category)
    }

    /// Record counts per `file`.
    pub fn count_by_file(&self) -> HashMap<String, u64> {
        let mut counts = HashMap::new();
        for record in self.records.values() {
            *counts.entry(record.file.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub(crate) fn insert(&mut self, record: KnowledgeRecord) {
        self.records.insert(record.id.clone(), Arc::new(record));
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Arc<KnowledgeRecord>> {
        self.records.remove(id)
    }
}

/// Shared, swappable pointer to the current [`Corpus`].
#[derive(Debug, Clone, Default)]
pub struct CorpusHandle {
    current: Arc<RwLock<Arc<Corpus>>>,
}

impl CorpusHandle {
    pub fn new(corpus: Corpus) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(corpus))),
        }
    }

    /// The corpus as of now. Cheap; holds no lock after returning.
    pub fn snapshot(&self) -> Arc<Corpus> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the current corpus. Existing snapshots are unaffected.
    pub fn publish(&self, corpus: Corpus) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(corpus);
    }
}
