//! Domain records flowing through a harvest cycle.
//!
//! Three families of types live here:
//! - **Parsed input**: [`CatalogGraph`], [`ApiRegistration`], [`ApiSpec`] as
//!   handed over by the external parser and registration service
//! - **Content documents**: [`ContentDocument`], the searchable record of a
//!   harvested entity, carrying its [`HarvestMetadata`]
//! - **Lineage documents**: [`LineageDocument`], append-only audit records of
//!   a single harvest attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;

// ============================================================================
// Harvest Bookkeeping
// ============================================================================

/// Timestamps attached to every content document.
///
/// `first_harvested` never changes once set. `last_changed` only moves when
/// the content of the document actually differs from the stored version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestMetadata {
    pub first_harvested: DateTime<Utc>,
    pub last_harvested: DateTime<Utc>,
    pub last_changed: DateTime<Utc>,
}

impl HarvestMetadata {
    /// Metadata for a source seen for the first time.
    pub fn first(now: DateTime<Utc>) -> Self {
        Self {
            first_harvested: now,
            last_harvested: now,
            last_changed: now,
        }
    }
}

/// Outcome recorded by the harvest scheduler for a source's previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HarvestStatus {
    Ok,
    Warning,
    Error,
}

/// Status and message of the last harvest of a source, if one is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorHarvest {
    pub status: HarvestStatus,
    pub message: Option<String>,
}

/// An identified origin from which catalog data is retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestSource {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub last_harvest: Option<PriorHarvest>,
}

// ============================================================================
// Cross References
// ============================================================================

/// Organization resolved from the publisher directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publisher {
    pub org_id: String,
    pub name: String,
    pub uri: Option<String>,
}

/// A dataset resolved from the dataset catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetReference {
    pub uri: String,
    pub title: Option<String>,
}

/// Collection of resolved dataset references on a content document.
///
/// `NeverSpecified` is the sentinel for "no usable references": it is used
/// both when the source listed none and when every listed reference failed
/// to resolve. A `Resolved` set is never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum References {
    #[default]
    NeverSpecified,
    Resolved(BTreeSet<DatasetReference>),
}

impl References {
    /// Collects resolved references, collapsing an empty result to the
    /// [`References::NeverSpecified`] sentinel.
    pub fn from_resolved<I>(references: I) -> Self
    where
        I: IntoIterator<Item = DatasetReference>,
    {
        let set: BTreeSet<DatasetReference> = references.into_iter().collect();
        if set.is_empty() {
            Self::NeverSpecified
        } else {
            Self::Resolved(set)
        }
    }

    pub fn is_never_specified(&self) -> bool {
        matches!(self, Self::NeverSpecified)
    }

    pub fn len(&self) -> usize {
        match self {
            Self::NeverSpecified => 0,
            Self::Resolved(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatasetReference> {
        match self {
            Self::NeverSpecified => None,
            Self::Resolved(set) => Some(set.iter()),
        }
        .into_iter()
        .flatten()
    }
}

// The sentinel travels as `null`, a resolved set as an array.
impl Serialize for References {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::NeverSpecified => serializer.serialize_none(),
            Self::Resolved(set) => serializer.serialize_some(set),
        }
    }
}

impl<'de> Deserialize<'de> for References {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let set = Option::<BTreeSet<DatasetReference>>::deserialize(deserializer)?;
        Ok(Self::from_resolved(set.unwrap_or_default()))
    }
}

// ============================================================================
// Parsed Input
// ============================================================================

/// Typed catalog graph produced by the external parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogGraph {
    pub catalog: CatalogEntity,
    pub datasets: Vec<DatasetEntity>,
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntity {
    pub uri: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub publisher_org_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetEntity {
    pub uri: String,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub themes: BTreeSet<String>,
    #[serde(default)]
    pub distributions: Vec<Distribution>,
    pub publisher_org_id: Option<String>,

    /// Candidate dataset reference URIs; `None` when the source listed none
    pub references: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub access_url: Option<String>,
    pub format: Option<String>,
    pub title: Option<String>,
}

/// Concept referenced by datasets; indexed on its own URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub uri: String,
    pub pref_label: Option<String>,
    pub definition: Option<String>,
}

impl Subject {
    /// A subject is worth indexing only with both a label and a definition.
    pub fn is_complete(&self) -> bool {
        let present = |field: &Option<String>| field.as_deref().is_some_and(|s| !s.is_empty());
        present(&self.pref_label) && present(&self.definition)
    }
}

/// API registration as published by the registration service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRegistration {
    /// Organization number of the owning catalog, used for publisher lookup
    pub catalog_id: String,
    pub api_spec_url: Option<String>,

    /// Inline specification text; takes precedence over `api_spec_url`
    pub api_spec: Option<String>,
    pub api_doc_url: Option<String>,
    pub dataset_references: Option<Vec<String>>,
    #[serde(default)]
    pub national_component: bool,
    pub cost: Option<String>,
    pub usage_limitation: Option<String>,
    pub performance: Option<String>,
    pub availability: Option<String>,
}

/// The parts of a parsed API specification this pipeline reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpec {
    pub info: Option<ApiInfo>,
    pub external_docs_url: Option<String>,
    #[serde(default)]
    pub operations: Vec<ApiOperation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiInfo {
    pub title: Option<String>,
    pub description: Option<String>,
    pub contact: Option<ApiContact>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiContact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiOperation {
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub response_media_types: Vec<String>,
}

// ============================================================================
// Content Documents
// ============================================================================

/// Searchable record of a harvested entity.
///
/// `id` is minted once, on the first harvest of `harvest_source_uri`, and
/// reused for as long as the source exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDocument {
    pub id: String,
    pub harvest_source_uri: String,
    pub content: ContentBody,
    pub publisher: Option<Publisher>,
    #[serde(default)]
    pub dataset_references: References,

    /// Verbatim copy of the raw source text, when the source kind keeps one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_source: Option<String>,
    pub harvest: Option<HarvestMetadata>,
}

impl ContentDocument {
    pub fn kind(&self) -> DocumentKind {
        match self.content {
            ContentBody::Catalog(_) => DocumentKind::Catalog,
            ContentBody::Dataset(_) => DocumentKind::Dataset,
            ContentBody::ApiSpecification(_) => DocumentKind::ApiSpecification,
        }
    }
}

/// Descriptive fields, by entity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBody {
    Catalog(CatalogContent),
    Dataset(DatasetContent),
    ApiSpecification(ApiContent),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogContent {
    pub uri: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetContent {
    pub uri: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub themes: BTreeSet<String>,
    pub distributions: Vec<Distribution>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiContent {
    pub title: Option<String>,
    pub title_formatted: Option<String>,
    pub description: Option<String>,
    pub description_formatted: Option<String>,
    pub contact_points: Vec<Contact>,
    pub formats: BTreeSet<String>,
    pub api_spec_url: Option<String>,
    pub api_doc_url: Option<String>,
    pub national_component: bool,
    pub cost: Option<String>,
    pub usage_limitation: Option<String>,
    pub performance: Option<String>,
    pub availability: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub organization_name: Option<String>,
    pub email: Option<String>,
    pub uri: Option<String>,
}

// ============================================================================
// Validation and Lineage
// ============================================================================

/// Validation diagnostics correlated to one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRecord {
    pub entity_uri: String,
    pub entity_class: String,
    pub warning_count: usize,
    pub error_count: usize,
    pub messages: Vec<String>,
}

/// Append-only audit record of one harvest attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LineageDocument {
    Catalog(CatalogLineage),
    Dataset(DatasetLineage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogLineage {
    pub source_url: String,
    pub source_id: String,
    pub timestamp: DateTime<Utc>,
    pub prior_status: Option<HarvestStatus>,
    pub prior_message: Option<String>,
    pub validation: Option<ValidationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetLineage {
    pub dataset_id: String,
    pub dataset_uri: String,
    pub source_id: String,
    pub timestamp: DateTime<Utc>,
    pub validation: Option<ValidationRecord>,
}

// ============================================================================
// Index Writes
// ============================================================================

/// Document type of an index write, used for routing and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Catalog,
    Dataset,
    ApiSpecification,
    Subject,
    CatalogLineage,
    DatasetLineage,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Catalog => "catalog",
            DocumentKind::Dataset => "dataset",
            DocumentKind::ApiSpecification => "api_specification",
            DocumentKind::Subject => "subject",
            DocumentKind::CatalogLineage => "catalog_lineage",
            DocumentKind::DatasetLineage => "dataset_lineage",
        }
    }
}

/// Body of a single index write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IndexDocument {
    Content(ContentDocument),
    Subject(Subject),
    Lineage(LineageDocument),
}

/// One upsert in a bulk request, keyed by `(index, id)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexItem {
    pub index: String,
    pub kind: DocumentKind,
    pub id: String,
    pub document: IndexDocument,
}

/// Per-item result reported by the index transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Indexed,
    Failed { reason: String },
}
