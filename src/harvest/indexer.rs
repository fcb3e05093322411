//! Batched, idempotent writes to the search index.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::model::{DocumentKind, IndexItem, ItemOutcome};
use crate::traits::{IndexError, SearchIndex};

/// Outcome of one item in a submitted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub index: String,
    pub kind: DocumentKind,
    pub id: String,
    pub outcome: ItemOutcome,
}

/// Per-item outcomes of one bulk write.
///
/// Failed items are not rolled back or retried; the batch as a whole counts
/// as delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub items: Vec<ItemReport>,
}

impl IndexReport {
    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.outcome == ItemOutcome::Indexed)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, ItemOutcome::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

pub struct BulkIndexer {
    index: Arc<dyn SearchIndex>,
}

impl BulkIndexer {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    /// Creates `name` if it does not exist yet.
    pub async fn ensure_index(&self, name: &str) -> Result<(), IndexError> {
        if self.index.index_exists(name).await? {
            debug!(index = name, "Index exists");
            return Ok(());
        }
        warn!(index = name, "Creating index");
        self.index.create_index(name).await
    }

    /// Ensures every target index exists, then submits `items` as one bulk
    /// upsert.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when an index cannot be created or the bulk
    /// request itself fails. Item-level failures are reported in the
    /// [`IndexReport`] instead.
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn index(&self, items: Vec<IndexItem>) -> Result<IndexReport, IndexError> {
        if items.is_empty() {
            return Ok(IndexReport::default());
        }

        let targets: BTreeSet<&str> = items.iter().map(|item| item.index.as_str()).collect();
        for target in targets {
            self.ensure_index(target).await?;
        }

        let outcomes = self.index.bulk_upsert(&items).await?;
        if outcomes.len() != items.len() {
            warn!(
                expected = items.len(),
                received = outcomes.len(),
                "Bulk response item count mismatch"
            );
        }

        let mut outcomes = outcomes.into_iter();
        let report = IndexReport {
            items: items
                .into_iter()
                .map(|item| ItemReport {
                    outcome: outcomes.next().unwrap_or_else(|| ItemOutcome::Failed {
                        reason: "no outcome reported".to_string(),
                    }),
                    index: item.index,
                    kind: item.kind,
                    id: item.id,
                })
                .collect(),
        };

        for failure in report.failures() {
            if let ItemOutcome::Failed { reason } = &failure.outcome {
                warn!(
                    index = %failure.index,
                    kind = failure.kind.as_str(),
                    id = %failure.id,
                    reason = %reason,
                    "Index write failed"
                );
            }
        }
        info!(
            succeeded = report.succeeded(),
            failed = report.items.len() - report.succeeded(),
            "Bulk write completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IndexDocument, Subject};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records calls and fails items whose id starts with `bad`.
    #[derive(Default)]
    struct RecordingIndex {
        existing: Mutex<BTreeSet<String>>,
        calls: Mutex<Vec<String>>,
        fail_create: bool,
        fail_transport: bool,
    }

    #[async_trait]
    impl SearchIndex for RecordingIndex {
        async fn index_exists(&self, name: &str) -> Result<bool, IndexError> {
            self.calls.lock().unwrap().push(format!("exists:{name}"));
            Ok(self.existing.lock().unwrap().contains(name))
        }

        async fn create_index(&self, name: &str) -> Result<(), IndexError> {
            self.calls.lock().unwrap().push(format!("create:{name}"));
            if self.fail_create {
                return Err(IndexError::CreateIndex {
                    index: name.to_string(),
                    reason: "disk full".to_string(),
                });
            }
            self.existing.lock().unwrap().insert(name.to_string());
            Ok(())
        }

        async fn bulk_upsert(&self, items: &[IndexItem]) -> Result<Vec<ItemOutcome>, IndexError> {
            self.calls.lock().unwrap().push(format!("bulk:{}", items.len()));
            if self.fail_transport {
                return Err(IndexError::Transport("connection reset".to_string()));
            }
            Ok(items
                .iter()
                .map(|item| {
                    if item.id.starts_with("bad") {
                        ItemOutcome::Failed {
                            reason: "mapper_parsing_exception".to_string(),
                        }
                    } else {
                        ItemOutcome::Indexed
                    }
                })
                .collect())
        }
    }

    fn item(index: &str, id: &str) -> IndexItem {
        IndexItem {
            index: index.to_string(),
            kind: DocumentKind::Subject,
            id: id.to_string(),
            document: IndexDocument::Subject(Subject {
                uri: id.to_string(),
                pref_label: Some("label".to_string()),
                definition: Some("definition".to_string()),
            }),
        }
    }

    #[tokio::test]
    async fn test_creates_missing_indices_before_writing() {
        let backend = Arc::new(RecordingIndex::default());
        backend.existing.lock().unwrap().insert("dcat".to_string());
        let indexer = BulkIndexer::new(backend.clone());

        let report = indexer
            .index(vec![item("dcat", "a"), item("harvest", "b")])
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 2);
        assert_eq!(
            *backend.calls.lock().unwrap(),
            vec!["exists:dcat", "exists:harvest", "create:harvest", "bulk:2"]
        );
    }

    #[tokio::test]
    async fn test_item_failures_are_reported_not_fatal() {
        let backend = Arc::new(RecordingIndex::default());
        let indexer = BulkIndexer::new(backend);

        let report = indexer
            .index(vec![item("dcat", "a"), item("dcat", "bad-1"), item("dcat", "c")])
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 2);
        assert!(report.has_failures());
        let failed: Vec<_> = report.failures().map(|f| f.id.as_str()).collect();
        assert_eq!(failed, vec!["bad-1"]);
    }

    #[tokio::test]
    async fn test_create_failure_aborts_before_write() {
        let backend = Arc::new(RecordingIndex {
            fail_create: true,
            ..RecordingIndex::default()
        });
        let indexer = BulkIndexer::new(backend.clone());

        let err = indexer.index(vec![item("dcat", "a")]).await.unwrap_err();

        assert!(matches!(err, IndexError::CreateIndex { .. }));
        assert!(!backend.calls.lock().unwrap().iter().any(|c| c.starts_with("bulk")));
    }

    #[tokio::test]
    async fn test_transport_failure_is_fatal() {
        let backend = Arc::new(RecordingIndex {
            fail_transport: true,
            ..RecordingIndex::default()
        });
        let indexer = BulkIndexer::new(backend);

        let err = indexer.index(vec![item("dcat", "a")]).await.unwrap_err();
        assert!(matches!(err, IndexError::Transport(_)));
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let backend = Arc::new(RecordingIndex::default());
        let indexer = BulkIndexer::new(backend.clone());

        let report = indexer.index(vec![]).await.unwrap();
        assert!(report.items.is_empty());
        assert!(backend.calls.lock().unwrap().is_empty());
    }
}
