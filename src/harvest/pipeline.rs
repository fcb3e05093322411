//! Harvest cycle coordinator.
//!
//! [`HarvestPipeline`] runs one harvest cycle for one source, in order:
//! fetch → parse → enrich → change detection → harvest metadata →
//! validation correlation → assembly → bulk index.
//!
//! Only the lookups inside enrichment run concurrently. Every other stage
//! completes before the next starts, and nothing here holds state between
//! cycles, so cycles for different sources can run in parallel on a shared
//! pipeline.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::HarvesterConfig;
use crate::harvest::assemble::{CatalogAssembly, DocumentAssembler};
use crate::harvest::change::has_changed;
use crate::harvest::enrich::{EnrichmentRequest, EntityEnricher};
use crate::harvest::indexer::{BulkIndexer, IndexReport};
use crate::harvest::tracker::advance;
use crate::harvest::validation::ValidationCorrelator;
use crate::model::{
    ApiRegistration, ApiSpec, CatalogGraph, ContentDocument, DatasetEntity, HarvestSource,
};
use crate::traits::{
    DocumentRepository, FetchError, GraphParser, IndexError, ParseError, PublisherDirectory,
    ReferenceResolver, RepositoryError, SearchIndex, SpecFetcher,
};

// ============================================================================
// Pipeline Types
// ============================================================================

/// Input for one catalog harvest cycle.
#[derive(Debug, Clone)]
pub struct CatalogHarvestJob {
    pub source: HarvestSource,

    /// Raw catalog text; fetched from `source.url` when `None`
    pub raw: Option<String>,

    /// Free-text validator output for this catalog
    pub validation_messages: Vec<String>,
}

/// Input for one API registration cycle.
#[derive(Debug, Clone)]
pub struct ApiHarvestJob {
    pub harvest_source_uri: String,
    pub registration: ApiRegistration,
}

/// A content document with its harvest metadata settled.
#[derive(Debug, Clone)]
pub struct TrackedDocument {
    pub document: ContentDocument,
    pub changed: bool,
}

/// Summary of a completed catalog cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub source_id: String,
    pub timestamp: DateTime<Utc>,
    pub datasets: usize,
    pub changed: usize,
    pub subjects_indexed: usize,
    pub subjects_dropped: usize,
    pub failed_lookups: usize,
    pub index: IndexReport,
}

/// Summary of a completed API registration cycle.
#[derive(Debug, Clone)]
pub struct ApiCycleReport {
    pub tracked: TrackedDocument,
    pub index: IndexReport,
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Errors that abort a harvest cycle.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Parse failed: {0}")]
    Parse(#[from] ParseError),

    /// Neither an inline specification nor a specification URL was given
    #[error("No API specification available for '{harvest_source_uri}'")]
    MissingSpec { harvest_source_uri: String },

    #[error("Repository read failed: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Indexing failed: {0}")]
    Index(#[from] IndexError),

    #[error("Executor unavailable: {0}")]
    Executor(String),
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// External capabilities a pipeline is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog_parser: Arc<dyn GraphParser<CatalogGraph>>,
    pub api_parser: Arc<dyn GraphParser<ApiSpec>>,
    pub fetcher: Arc<dyn SpecFetcher>,
    pub publishers: Arc<dyn PublisherDirectory>,
    pub references: Arc<dyn ReferenceResolver>,
    pub repository: Arc<dyn DocumentRepository>,
    pub index: Arc<dyn SearchIndex>,
}

pub struct HarvestPipeline {
    catalog_parser: Arc<dyn GraphParser<CatalogGraph>>,
    api_parser: Arc<dyn GraphParser<ApiSpec>>,
    fetcher: Arc<dyn SpecFetcher>,
    repository: Arc<dyn DocumentRepository>,
    enricher: EntityEnricher,
    correlator: ValidationCorrelator,
    assembler: DocumentAssembler,
    indexer: BulkIndexer,
}

impl HarvestPipeline {
    pub fn new(config: &HarvesterConfig, collaborators: Collaborators) -> Self {
        Self {
            catalog_parser: collaborators.catalog_parser,
            api_parser: collaborators.api_parser,
            fetcher: collaborators.fetcher,
            repository: collaborators.repository,
            enricher: EntityEnricher::new(collaborators.publishers, collaborators.references)
                .with_lookup_concurrency(config.enrichment.lookup_concurrency),
            correlator: ValidationCorrelator::new(config.validation.uri_matching),
            assembler: DocumentAssembler::new(config.index.clone()),
            indexer: BulkIndexer::new(collaborators.index),
        }
    }

    /// Runs one catalog harvest cycle stamped with `now`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when fetching, parsing, the repository read,
    /// index creation or the bulk request fails. Lookup failures and
    /// per-item index failures do not abort the cycle.
    #[instrument(skip_all, fields(source_id = %job.source.id))]
    pub async fn harvest_catalog(
        &self,
        job: &CatalogHarvestJob,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, PipelineError> {
        let source = &job.source;

        let raw = match &job.raw {
            Some(raw) => raw.clone(),
            None => self.fetcher.fetch_spec(&source.url).await?,
        };
        let graph = self.catalog_parser.parse(&raw).await?;
        info!(
            format = self.catalog_parser.format_id(),
            datasets = graph.datasets.len(),
            subjects = graph.subjects.len(),
            "Parsed catalog"
        );

        let entities = distinct_datasets(&graph.datasets);
        if entities.len() < graph.datasets.len() {
            warn!(
                duplicates = graph.datasets.len() - entities.len(),
                "Catalog lists the same dataset URI more than once"
            );
        }

        let mut failed_lookups = 0;

        let enrichment = self
            .enricher
            .enrich(EnrichmentRequest {
                publisher_org_id: graph.catalog.publisher_org_id.as_deref(),
                reference_uris: None,
            })
            .await;
        failed_lookups += enrichment.failed_lookups();
        let catalog = self
            .track(&graph.catalog.uri, now, |id| {
                self.assembler.compose_catalog(id, &graph.catalog, &enrichment)
            })
            .await?;

        let mut datasets = Vec::with_capacity(entities.len());
        for dataset in entities.iter().copied() {
            let enrichment = self
                .enricher
                .enrich(EnrichmentRequest {
                    publisher_org_id: dataset.publisher_org_id.as_deref(),
                    reference_uris: dataset.references.as_deref(),
                })
                .await;
            failed_lookups += enrichment.failed_lookups();
            let tracked = self
                .track(&dataset.uri, now, |id| {
                    self.assembler.compose_dataset(id, dataset, &enrichment)
                })
                .await?;
            datasets.push(tracked);
        }

        let changed = std::iter::once(&catalog)
            .chain(&datasets)
            .filter(|t| t.changed)
            .count();

        let validation = self.correlator.correlate(
            &job.validation_messages,
            &graph.catalog.uri,
            entities.iter().map(|d| d.uri.as_str()),
        );

        let assembly = self.assembler.assemble(CatalogAssembly {
            source,
            timestamp: now,
            catalog: catalog.document,
            datasets: datasets.into_iter().map(|t| t.document).collect(),
            subjects: &graph.subjects,
            validation: &validation,
        });
        info!(
            items = assembly.items.len(),
            subjects_dropped = assembly.subjects_dropped,
            changed,
            "Assembled index batch"
        );

        let index = self.indexer.index(assembly.items).await?;

        Ok(CycleReport {
            source_id: source.id.clone(),
            timestamp: now,
            datasets: entities.len(),
            changed,
            subjects_indexed: assembly.subjects_indexed,
            subjects_dropped: assembly.subjects_dropped,
            failed_lookups,
            index,
        })
    }

    /// Builds the content document for an API registration without indexing
    /// it.
    #[instrument(skip_all, fields(harvest_source_uri = %job.harvest_source_uri))]
    pub async fn build_api_document(
        &self,
        job: &ApiHarvestJob,
        now: DateTime<Utc>,
    ) -> Result<TrackedDocument, PipelineError> {
        let registration = &job.registration;
        let raw_spec = self.api_spec_text(job).await?;
        let spec = self.api_parser.parse(&raw_spec).await?;

        let enrichment = self
            .enricher
            .enrich(EnrichmentRequest {
                publisher_org_id: Some(registration.catalog_id.as_str()),
                reference_uris: registration.dataset_references.as_deref(),
            })
            .await;

        let tracked = self
            .track(&job.harvest_source_uri, now, |id| {
                self.assembler.compose_api(
                    id,
                    &job.harvest_source_uri,
                    registration,
                    &spec,
                    &raw_spec,
                    &enrichment,
                )
            })
            .await?;

        info!(
            id = %tracked.document.id,
            changed = tracked.changed,
            "API document created"
        );
        Ok(tracked)
    }

    /// Runs one API registration cycle: build the document, then index it.
    pub async fn harvest_api(
        &self,
        job: &ApiHarvestJob,
        now: DateTime<Utc>,
    ) -> Result<ApiCycleReport, PipelineError> {
        let tracked = self.build_api_document(job, now).await?;
        let item = self.assembler.assemble_api(tracked.document.clone());
        let index = self.indexer.index(vec![item]).await?;
        Ok(ApiCycleReport { tracked, index })
    }

    async fn api_spec_text(&self, job: &ApiHarvestJob) -> Result<String, PipelineError> {
        let registration = &job.registration;
        if let Some(inline) = registration.api_spec.as_deref().filter(|s| !s.is_empty()) {
            return Ok(inline.to_string());
        }
        match registration.api_spec_url.as_deref().filter(|s| !s.is_empty()) {
            Some(url) => {
                debug!(url, "Fetching API specification");
                Ok(self.fetcher.fetch_spec(url).await?)
            }
            None => Err(PipelineError::MissingSpec {
                harvest_source_uri: job.harvest_source_uri.clone(),
            }),
        }
    }

    /// Resolves identity from the stored version, composes the candidate and
    /// settles its harvest metadata.
    async fn track<F>(
        &self,
        harvest_source_uri: &str,
        now: DateTime<Utc>,
        compose: F,
    ) -> Result<TrackedDocument, PipelineError>
    where
        F: FnOnce(String) -> ContentDocument,
    {
        let previous = self
            .repository
            .find_by_harvest_source_uri(harvest_source_uri)
            .await?;

        let id = previous
            .as_ref()
            .map(|doc| doc.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut document = compose(id);
        let changed = has_changed(previous.as_ref(), &document);
        document.harvest = Some(advance(
            previous.as_ref().and_then(|doc| doc.harvest.as_ref()),
            now,
            changed,
        ));

        Ok(TrackedDocument { document, changed })
    }
}

/// Datasets in graph order, keeping the first entity for each URI.
fn distinct_datasets(datasets: &[DatasetEntity]) -> Vec<&DatasetEntity> {
    let mut seen = HashSet::new();
    datasets
        .iter()
        .filter(|dataset| seen.insert(dataset.uri.as_str()))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
