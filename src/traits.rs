//! Capabilities the pipeline consumes from the outside world.
//!
//! Every trait here marks a suspension point of a harvest cycle. Implementations
//! are expected to enforce their own timeouts; the pipeline never cancels them.

use crate::model::{ContentDocument, DatasetReference, IndexItem, ItemOutcome, Publisher};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to parse content: {0}")]
    InvalidContent(String),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// Failure of a publisher or reference lookup. Never aborts a cycle.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Lookup timed out: {0}")]
    Timeout(String),
    #[error("Lookup transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Document repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to create index '{index}': {reason}")]
    CreateIndex { index: String, reason: String },
    #[error("Index transport error: {0}")]
    Transport(String),
}

/// Turns raw source text into a typed graph (`G`).
#[async_trait]
pub trait GraphParser<G>: Send + Sync {
    /// Returns the format this parser handles (e.g., "dcat", "openapi").
    fn format_id(&self) -> &str;

    async fn parse(&self, raw: &str) -> Result<G, ParseError>;
}

/// Retrieves raw source text by URL.
#[async_trait]
pub trait SpecFetcher: Send + Sync {
    async fn fetch_spec(&self, url: &str) -> Result<String, FetchError>;
}

#[async_trait]
pub trait PublisherDirectory: Send + Sync {
    async fn lookup_publisher(&self, org_id: &str) -> Result<Publisher, LookupError>;
}

#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// Returns `Ok(None)` when the catalog has no entity under `uri`.
    async fn lookup_reference(&self, uri: &str) -> Result<Option<DatasetReference>, LookupError>;
}

/// Read access to previously stored content documents.
///
/// Used to reuse a document's id and to detect changes against the stored
/// version.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn find_by_harvest_source_uri(
        &self,
        harvest_source_uri: &str,
    ) -> Result<Option<ContentDocument>, RepositoryError>;
}

/// Write access to the search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn index_exists(&self, name: &str) -> Result<bool, IndexError>;

    async fn create_index(&self, name: &str) -> Result<(), IndexError>;

    /// Upserts every item, returning one outcome per item in input order.
    ///
    /// Returns `Err` only when the request as a whole could not be delivered.
    async fn bulk_upsert(&self, items: &[IndexItem]) -> Result<Vec<ItemOutcome>, IndexError>;
}
