//! Harvest module - the ingestion and indexing pipeline.
//!
//! Stages, leaves first:
//! - [`change`]: whole-document change detection against the stored version
//! - [`tracker`]: harvest timestamp bookkeeping
//! - [`enrich`]: publisher and dataset-reference lookups
//! - [`validation`]: correlation of validator messages with entities
//! - [`assemble`]: content/lineage document composition
//! - [`indexer`]: batched idempotent index writes
//! - [`pipeline`]: one harvest cycle end to end via [`HarvestPipeline`]

pub mod assemble;
pub mod change;
pub mod enrich;
pub mod indexer;
pub mod pipeline;
pub mod tracker;
pub mod validation;

// Re-export commonly used types
pub use assemble::{cycle_id, Assembly, CatalogAssembly, DocumentAssembler};
pub use change::{canonical_content, has_changed};
pub use enrich::{Enrichment, EnrichmentRequest, EntityEnricher, Lookup};
pub use indexer::{BulkIndexer, IndexReport, ItemReport};
pub use pipeline::{
    ApiCycleReport, ApiHarvestJob, CatalogHarvestJob, Collaborators, CycleReport,
    HarvestPipeline, PipelineError, TrackedDocument,
};
pub use tracker::advance;
pub use validation::{Correlation, Diagnostic, UriMatching, ValidationCorrelator};
