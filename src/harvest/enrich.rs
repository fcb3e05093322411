//! Cross-catalog enrichment of harvested entities.
//!
//! Publisher and dataset-reference lookups go to external services that may
//! fail at any time. Each lookup is captured as a [`Lookup`] value and failures
//! are isolated per item: enrichment itself never fails.

use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::{DatasetReference, Publisher, References};
use crate::traits::{LookupError, PublisherDirectory, ReferenceResolver};

/// Result of one external lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    Absent,
    Failed(String),
}

impl<T> Lookup<T> {
    pub fn as_found(&self) -> Option<&T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Absent | Lookup::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Lookup::Failed(_))
    }
}

impl<T> From<Result<Option<T>, LookupError>> for Lookup<T> {
    fn from(result: Result<Option<T>, LookupError>) -> Self {
        match result {
            Ok(Some(value)) => Lookup::Found(value),
            Ok(None) | Err(LookupError::NotFound(_)) => Lookup::Absent,
            Err(e) => Lookup::Failed(e.to_string()),
        }
    }
}

/// Identifiers to resolve for one entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrichmentRequest<'a> {
    pub publisher_org_id: Option<&'a str>,
    pub reference_uris: Option<&'a [String]>,
}

/// Lookup outcomes for one entity, consumed by the document assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub publisher: Lookup<Publisher>,

    /// One entry per distinct candidate URI; `None` when none were listed
    pub references: Option<Vec<(String, Lookup<DatasetReference>)>>,
}

impl Default for Enrichment {
    fn default() -> Self {
        Self {
            publisher: Lookup::Absent,
            references: None,
        }
    }
}

impl Enrichment {
    pub fn publisher(&self) -> Option<Publisher> {
        self.publisher.as_found().cloned()
    }

    /// Successful reference lookups, or the never-specified sentinel when
    /// none were listed or none resolved.
    pub fn resolved_references(&self) -> References {
        let resolved = self
            .references
            .iter()
            .flatten()
            .filter_map(|(_, lookup)| lookup.as_found().cloned());
        References::from_resolved(resolved)
    }

    pub fn failed_lookups(&self) -> usize {
        let reference_failures = self
            .references
            .iter()
            .flatten()
            .filter(|(_, lookup)| lookup.is_failed())
            .count();
        reference_failures + usize::from(self.publisher.is_failed())
    }
}

/// Resolves publishers and dataset references through external directories.
pub struct EntityEnricher {
    publishers: Arc<dyn PublisherDirectory>,
    references: Arc<dyn ReferenceResolver>,
    lookup_concurrency: usize,
}

impl EntityEnricher {
    pub fn new(
        publishers: Arc<dyn PublisherDirectory>,
        references: Arc<dyn ReferenceResolver>,
    ) -> Self {
        Self {
            publishers,
            references,
            lookup_concurrency: 8,
        }
    }

    /// Sets how many reference lookups may be in flight at once.
    pub fn with_lookup_concurrency(mut self, limit: usize) -> Self {
        self.lookup_concurrency = limit.max(1);
        self
    }

    pub async fn enrich(&self, request: EnrichmentRequest<'_>) -> Enrichment {
        let publisher = match request.publisher_org_id.filter(|id| !id.is_empty()) {
            Some(org_id) => self.lookup_publisher(org_id).await,
            None => Lookup::Absent,
        };

        let references = match request.reference_uris {
            Some(uris) => Some(self.lookup_references(uris).await),
            None => None,
        };

        Enrichment {
            publisher,
            references,
        }
    }

    async fn lookup_publisher(&self, org_id: &str) -> Lookup<Publisher> {
        match self.publishers.lookup_publisher(org_id).await {
            Ok(publisher) => Lookup::Found(publisher),
            Err(LookupError::NotFound(_)) => {
                debug!(org_id, "Publisher not found");
                Lookup::Absent
            }
            Err(e) => {
                warn!(org_id, error = %e, "Publisher lookup failed");
                Lookup::Failed(e.to_string())
            }
        }
    }

    async fn lookup_references(&self, uris: &[String]) -> Vec<(String, Lookup<DatasetReference>)> {
        let candidates: BTreeSet<&str> = uris
            .iter()
            .map(String::as_str)
            .filter(|uri| !uri.is_empty())
            .collect();

        let mut outcomes: Vec<(String, Lookup<DatasetReference>)> = stream::iter(candidates)
            .map(|uri| async move {
                let lookup = Lookup::from(self.references.lookup_reference(uri).await);
                if let Lookup::Failed(reason) = &lookup {
                    warn!(uri, error = %reason, "Dataset reference lookup failed");
                }
                (uri.to_string(), lookup)
            })
            .buffer_unordered(self.lookup_concurrency)
            .collect()
            .await;

        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        outcomes
    }
}
