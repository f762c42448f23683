use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::{AdvisoryError, AdvisoryRecord, AdvisorySource, BatchResult, PackageQuery};

const MOCK_SOURCE: &str = "MOCK";

/// In-memory advisory source that records how it was called.
#[derive(Debug, Default)]
pub struct MockAdvisorySource {
    hits: HashMap<(String, String), Vec<String>>,
    records: HashMap<String, AdvisoryRecord>,
    batch_calls: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl MockAdvisorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `record` as affecting every `(name, version)` in `affected`.
    pub fn with_advisory(mut self, record: AdvisoryRecord, affected: &[(&str, &str)]) -> Self {
        for (name, version) in affected {
            self.hits
                .entry(((*name).to_owned(), (*version).to_owned()))
                .or_default()
                .push(record.id.clone());
        }
        self.records.insert(record.id.clone(), record);
        self
    }

    /// Replaces the stored record for an id, keeping its package hits.
    pub fn update_record(&mut self, record: AdvisoryRecord) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Ids passed to `fetch`, in call order.
    pub fn fetched_ids(&self) -> Vec<String> {
        self.fetched
            .lock()
            .map(|fetched| fetched.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AdvisorySource for MockAdvisorySource {
    fn source_name(&self) -> &str {
        MOCK_SOURCE
    }

    async fn query_batch(
        &self,
        queries: &[PackageQuery],
    ) -> Result<Vec<BatchResult>, AdvisoryError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);

        Ok(queries
            .iter()
            .map(|query| BatchResult {
                vulnerability_ids: self
                    .hits
                    .get(&(query.name.clone(), query.version.clone()))
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn fetch(&self, id: &str) -> Result<AdvisoryRecord, AdvisoryError> {
        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.push(id.to_owned());
        }

        self.records
            .get(id)
            .cloned()
            .ok_or_else(|| AdvisoryError::NotFound(id.to_owned()))
    }
}
