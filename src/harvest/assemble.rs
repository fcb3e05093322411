//! Composition of content documents and index batches.
//!
//! Composition turns a parsed entity plus its [`Enrichment`] into a
//! [`ContentDocument`]; assembly turns a whole cycle's documents, subjects
//! and validation results into the ordered list of [`IndexItem`]s written in
//! one bulk request. Neither step can fail: missing enrichment or validation
//! simply leaves optional fields unset.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::IndexConfig;
use crate::harvest::enrich::Enrichment;
use crate::harvest::validation::Correlation;
use crate::html;
use crate::model::{
    ApiContent, ApiRegistration, ApiSpec, CatalogContent, CatalogEntity, CatalogLineage, Contact,
    ContentBody, ContentDocument, DatasetContent, DatasetEntity, DatasetLineage, DocumentKind,
    HarvestSource, IndexDocument, IndexItem, LineageDocument, Subject,
};

/// Identifier shared by all lineage documents of one cycle.
///
/// Derived from the source and the cycle timestamp, so a re-submitted cycle
/// overwrites its own lineage while a new cycle appends.
pub fn cycle_id(source_id: &str, timestamp: DateTime<Utc>) -> String {
    format!("{}@{}", source_id, timestamp.timestamp_millis())
}

/// Everything produced by one catalog cycle that goes into the index.
#[derive(Debug)]
pub struct CatalogAssembly<'a> {
    pub source: &'a HarvestSource,
    pub timestamp: DateTime<Utc>,
    pub catalog: ContentDocument,
    pub datasets: Vec<ContentDocument>,
    pub subjects: &'a [Subject],
    pub validation: &'a Correlation,
}

/// Ordered index writes for one cycle.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub items: Vec<IndexItem>,
    pub subjects_indexed: usize,
    pub subjects_dropped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentAssembler {
    indices: IndexConfig,
}

impl DocumentAssembler {
    pub fn new(indices: IndexConfig) -> Self {
        Self { indices }
    }

    pub fn compose_catalog(
        &self,
        id: String,
        catalog: &CatalogEntity,
        enrichment: &Enrichment,
    ) -> ContentDocument {
        ContentDocument {
            id,
            harvest_source_uri: catalog.uri.clone(),
            content: ContentBody::Catalog(CatalogContent {
                uri: catalog.uri.clone(),
                title: catalog.title.as_deref().map(html::strip_tags),
                description: catalog.description.as_deref().map(html::strip_tags),
            }),
            publisher: enrichment.publisher(),
            dataset_references: enrichment.resolved_references(),
            raw_source: None,
            harvest: None,
        }
    }

    pub fn compose_dataset(
        &self,
        id: String,
        dataset: &DatasetEntity,
        enrichment: &Enrichment,
    ) -> ContentDocument {
        ContentDocument {
            id,
            harvest_source_uri: dataset.uri.clone(),
            content: ContentBody::Dataset(DatasetContent {
                uri: dataset.uri.clone(),
                title: dataset.title.as_deref().map(html::strip_tags),
                description: dataset.description.as_deref().map(html::strip_tags),
                keywords: dataset.keywords.clone(),
                themes: dataset.themes.clone(),
                distributions: dataset.distributions.clone(),
            }),
            publisher: enrichment.publisher(),
            dataset_references: enrichment.resolved_references(),
            raw_source: None,
            harvest: None,
        }
    }

    /// Builds an API specification document from its registration and the
    /// parsed specification. `raw_spec` is kept verbatim on the document.
    pub fn compose_api(
        &self,
        id: String,
        harvest_source_uri: &str,
        registration: &ApiRegistration,
        spec: &ApiSpec,
        raw_spec: &str,
        enrichment: &Enrichment,
    ) -> ContentDocument {
        let info = spec.info.as_ref();
        let title = info.and_then(|i| i.title.as_deref());
        let description = info.and_then(|i| i.description.as_deref());

        let contact_points = info
            .and_then(|i| i.contact.as_ref())
            .map(|contact| {
                vec![Contact {
                    organization_name: contact.name.as_deref().map(html::strip_tags),
                    email: contact.email.as_deref().map(html::strip_tags),
                    uri: contact.url.as_deref().map(html::strip_tags),
                }]
            })
            .unwrap_or_default();

        // Request bodies are not counted as formats.
        let formats = spec
            .operations
            .iter()
            .flat_map(|op| op.response_media_types.iter().cloned())
            .collect();

        let api_doc_url = non_empty(&registration.api_doc_url)
            .or_else(|| non_empty(&spec.external_docs_url))
            .map(str::to_string);

        ContentDocument {
            id,
            harvest_source_uri: harvest_source_uri.to_string(),
            content: ContentBody::ApiSpecification(ApiContent {
                title: title.map(html::strip_tags),
                title_formatted: title.map(html::clean),
                description: description.map(html::strip_tags),
                description_formatted: description.map(html::clean),
                contact_points,
                formats,
                api_spec_url: registration.api_spec_url.clone(),
                api_doc_url,
                national_component: registration.national_component,
                cost: registration.cost.clone(),
                usage_limitation: registration.usage_limitation.clone(),
                performance: registration.performance.clone(),
                availability: registration.availability.clone(),
            }),
            publisher: enrichment.publisher(),
            dataset_references: enrichment.resolved_references(),
            raw_source: Some(raw_spec.to_string()),
            harvest: None,
        }
    }

    /// Assembles the bulk batch for a catalog cycle.
    ///
    /// Order: complete subjects, catalog lineage, catalog, then each dataset
    /// followed by its lineage. Subjects without both a label and a
    /// definition are dropped.
    pub fn assemble(&self, input: CatalogAssembly<'_>) -> Assembly {
        let CatalogAssembly {
            source,
            timestamp,
            catalog,
            datasets,
            subjects,
            validation,
        } = input;
        let cycle = cycle_id(&source.id, timestamp);
        let mut items = Vec::with_capacity(subjects.len() + 2 + datasets.len() * 2);

        let mut subjects_dropped = 0;
        for subject in subjects {
            if !subject.is_complete() {
                debug!(uri = %subject.uri, "Dropping subject without label or definition");
                subjects_dropped += 1;
                continue;
            }
            items.push(IndexItem {
                index: self.indices.content.clone(),
                kind: DocumentKind::Subject,
                id: subject.uri.clone(),
                document: IndexDocument::Subject(subject.clone()),
            });
        }
        let subjects_indexed = subjects.len() - subjects_dropped;

        let prior = source.last_harvest.as_ref();
        items.push(IndexItem {
            index: self.indices.lineage.clone(),
            kind: DocumentKind::CatalogLineage,
            id: format!("{cycle}/catalog"),
            document: IndexDocument::Lineage(LineageDocument::Catalog(CatalogLineage {
                source_url: source.url.clone(),
                source_id: source.id.clone(),
                timestamp,
                prior_status: prior.map(|p| p.status),
                prior_message: prior.and_then(|p| p.message.clone()),
                validation: Some(validation.catalog.clone()),
            })),
        });
        items.push(self.content_item(&self.indices.content, catalog));

        for dataset in datasets {
            let lineage = IndexItem {
                index: self.indices.lineage.clone(),
                kind: DocumentKind::DatasetLineage,
                id: format!("{cycle}/dataset/{}", dataset.id),
                document: IndexDocument::Lineage(LineageDocument::Dataset(DatasetLineage {
                    dataset_id: dataset.id.clone(),
                    dataset_uri: dataset.harvest_source_uri.clone(),
                    source_id: source.id.clone(),
                    timestamp,
                    validation: validation.for_dataset(&dataset.harvest_source_uri).cloned(),
                })),
            };
            items.push(self.content_item(&self.indices.content, dataset));
            items.push(lineage);
        }

        Assembly {
            items,
            subjects_indexed,
            subjects_dropped,
        }
    }

    /// Wraps an API specification document as a single index write.
    pub fn assemble_api(&self, document: ContentDocument) -> IndexItem {
        self.content_item(&self.indices.api, document)
    }

    fn content_item(&self, index: &str, document: ContentDocument) -> IndexItem {
        IndexItem {
            index: index.to_string(),
            kind: document.kind(),
            id: document.id.clone(),
            document: IndexDocument::Content(document),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
