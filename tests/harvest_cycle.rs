//! End-to-end harvest cycles against the in-memory index.

use async_trait::async_trait;
use catalog_harvester::telemetry::init_tracing;
use catalog_harvester::{
    ApiSpec, CatalogEntity, CatalogGraph, CatalogHarvestJob, Collaborators, ContentDocument,
    DatasetEntity, DatasetReference, FetchError, GraphParser, HarvestPipeline, HarvestSource,
    HarvesterConfig, InMemoryIndex, IndexDocument, LineageDocument, LookupError, ParseError,
    Publisher, PublisherDirectory, ReferenceResolver, SpecFetcher, Subject,
};
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

/// Returns whatever graph is currently loaded, ignoring the raw text.
struct SwappableParser(Mutex<CatalogGraph>);

#[async_trait]
impl GraphParser<CatalogGraph> for SwappableParser {
    fn format_id(&self) -> &str {
        "test"
    }

    async fn parse(&self, _raw: &str) -> Result<CatalogGraph, ParseError> {
        Ok(self.0.lock().unwrap().clone())
    }
}

struct NoApi;

#[async_trait]
impl GraphParser<ApiSpec> for NoApi {
    fn format_id(&self) -> &str {
        "none"
    }

    async fn parse(&self, _raw: &str) -> Result<ApiSpec, ParseError> {
        Err(ParseError::UnsupportedFormat("openapi".to_string()))
    }
}

#[async_trait]
impl SpecFetcher for NoApi {
    async fn fetch_spec(&self, url: &str) -> Result<String, FetchError> {
        Err(FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

/// Publishers always resolve; references fail when the URI contains "down".
struct Directory;

#[async_trait]
impl PublisherDirectory for Directory {
    async fn lookup_publisher(&self, org_id: &str) -> Result<Publisher, LookupError> {
        Ok(Publisher {
            org_id: org_id.to_string(),
            name: "Mapping Authority".to_string(),
            uri: Some(format!("http://orgs/{org_id}")),
        })
    }
}

#[async_trait]
impl ReferenceResolver for Directory {
    async fn lookup_reference(&self, uri: &str) -> Result<Option<DatasetReference>, LookupError> {
        if uri.contains("down") {
            return Err(LookupError::Timeout(uri.to_string()));
        }
        Ok(Some(DatasetReference {
            uri: uri.to_string(),
            title: Some(format!("Title of {uri}")),
        }))
    }
}

fn t(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, hour, 0, 0).unwrap()
}

fn graph(title: &str, references: Option<Vec<&str>>) -> CatalogGraph {
    CatalogGraph {
        catalog: CatalogEntity {
            uri: "http://x/catalog".to_string(),
            title: Some("National catalog".to_string()),
            description: None,
            publisher_org_id: Some("971040238".to_string()),
        },
        datasets: vec![
            DatasetEntity {
                uri: "http://x/1".to_string(),
                title: Some(title.to_string()),
                keywords: vec!["maps".to_string()],
                publisher_org_id: Some("971040238".to_string()),
                references: references.map(|r| r.into_iter().map(str::to_string).collect()),
                ..DatasetEntity::default()
            },
            DatasetEntity {
                uri: "http://x/2".to_string(),
                title: Some("Addresses".to_string()),
                ..DatasetEntity::default()
            },
        ],
        subjects: vec![
            Subject {
                uri: "http://concepts/a".to_string(),
                pref_label: Some("A".to_string()),
                definition: Some("x".to_string()),
            },
            Subject {
                uri: "http://concepts/b".to_string(),
                pref_label: Some(String::new()),
                definition: Some("y".to_string()),
            },
            Subject {
                uri: "http://concepts/c".to_string(),
                pref_label: Some("B".to_string()),
                definition: Some(String::new()),
            },
        ],
    }
}

struct Harness {
    store: Arc<InMemoryIndex>,
    parser: Arc<SwappableParser>,
    pipeline: HarvestPipeline,
}

fn harness(initial: CatalogGraph) -> Harness {
    let _ = init_tracing("catalog_harvester=debug");
    let store = Arc::new(InMemoryIndex::new());
    let parser = Arc::new(SwappableParser(Mutex::new(initial)));
    let pipeline = HarvestPipeline::new(
        &HarvesterConfig::default(),
        Collaborators {
            catalog_parser: parser.clone(),
            api_parser: Arc::new(NoApi),
            fetcher: Arc::new(NoApi),
            publishers: Arc::new(Directory),
            references: Arc::new(Directory),
            repository: store.clone(),
            index: store.clone(),
        },
    );
    Harness {
        store,
        parser,
        pipeline,
    }
}

fn job(messages: &[&str]) -> CatalogHarvestJob {
    CatalogHarvestJob {
        source: HarvestSource {
            id: "portal".to_string(),
            url: "http://portal/catalog.ttl".to_string(),
            last_harvest: None,
        },
        raw: Some("<rdf/>".to_string()),
        validation_messages: messages.iter().map(|m| m.to_string()).collect(),
    }
}

async fn dataset(store: &InMemoryIndex, uri: &str) -> ContentDocument {
    use catalog_harvester::DocumentRepository;
    store
        .find_by_harvest_source_uri(uri)
        .await
        .unwrap()
        .expect("dataset should be stored")
}

fn without_harvest(mut doc: ContentDocument) -> ContentDocument {
    doc.harvest = None;
    doc
}

#[tokio::test]
async fn unchanged_source_harvested_twice_keeps_last_changed() {
    let h = harness(graph("Maps", None));

    h.pipeline.harvest_catalog(&job(&[]), t(1)).await.unwrap();
    let first = dataset(&h.store, "http://x/1").await;

    let report = h.pipeline.harvest_catalog(&job(&[]), t(2)).await.unwrap();
    let second = dataset(&h.store, "http://x/1").await;

    assert_eq!(report.changed, 0);
    assert_eq!(without_harvest(second.clone()), without_harvest(first.clone()));
    let (before, after) = (first.harvest.unwrap(), second.harvest.unwrap());
    assert_eq!(after.first_harvested, t(1));
    assert_eq!(after.last_changed, before.last_changed);
    assert_eq!(after.last_harvested, t(2));
}

#[tokio::test]
async fn content_change_advances_last_changed_and_keeps_id() {
    let h = harness(graph("Maps", None));
    h.pipeline.harvest_catalog(&job(&[]), t(1)).await.unwrap();
    let first = dataset(&h.store, "http://x/1").await;

    *h.parser.0.lock().unwrap() = graph("Maps and charts", None);
    let report = h.pipeline.harvest_catalog(&job(&[]), t(3)).await.unwrap();
    let second = dataset(&h.store, "http://x/1").await;

    assert_eq!(report.changed, 1);
    assert_eq!(second.id, first.id);
    let harvest = second.harvest.unwrap();
    assert_eq!(harvest.first_harvested, t(1));
    assert_eq!(harvest.last_changed, t(3));
    assert_eq!(harvest.last_harvested, t(3));
}

#[tokio::test]
async fn rerunning_a_cycle_overwrites_and_new_cycles_append_lineage() {
    let h = harness(graph("Maps", None));

    h.pipeline.harvest_catalog(&job(&[]), t(1)).await.unwrap();
    let content_after_one = h.store.documents("dcat");
    let lineage_after_one = h.store.count("harvest");

    h.pipeline.harvest_catalog(&job(&[]), t(1)).await.unwrap();
    assert_eq!(h.store.documents("dcat"), content_after_one);
    assert_eq!(h.store.count("harvest"), lineage_after_one);

    h.pipeline.harvest_catalog(&job(&[]), t(2)).await.unwrap();
    assert_eq!(h.store.count("dcat"), content_after_one.len());
    assert_eq!(h.store.count("harvest"), lineage_after_one * 2);
}

#[tokio::test]
async fn only_complete_subjects_are_indexed() {
    let h = harness(graph("Maps", None));

    let report = h.pipeline.harvest_catalog(&job(&[]), t(1)).await.unwrap();

    assert_eq!(report.subjects_indexed, 1);
    assert_eq!(report.subjects_dropped, 2);
    assert!(h.store.get("dcat", "http://concepts/a").is_some());
    assert!(h.store.get("dcat", "http://concepts/b").is_none());
    assert!(h.store.get("dcat", "http://concepts/c").is_none());
}

#[tokio::test]
async fn failing_reference_lookups_are_isolated() {
    let h = harness(graph(
        "Maps",
        Some(vec!["http://refs/1", "http://refs/down", "http://refs/3"]),
    ));

    let report = h.pipeline.harvest_catalog(&job(&[]), t(1)).await.unwrap();
    let doc = dataset(&h.store, "http://x/1").await;

    assert_eq!(report.failed_lookups, 1);
    let uris: Vec<_> = doc.dataset_references.iter().map(|r| r.uri.as_str()).collect();
    assert_eq!(uris, vec!["http://refs/1", "http://refs/3"]);
    assert_eq!(doc.publisher.unwrap().name, "Mapping Authority");
}

#[tokio::test]
async fn all_references_failing_store_the_sentinel() {
    let h = harness(graph(
        "Maps",
        Some(vec!["http://refs/down/1", "http://refs/down/2", "http://refs/down/3"]),
    ));

    h.pipeline.harvest_catalog(&job(&[]), t(1)).await.unwrap();
    let doc = dataset(&h.store, "http://x/1").await;

    assert!(doc.dataset_references.is_never_specified());
    let json = serde_json::to_value(&doc).unwrap();
    assert!(json["datasetReferences"].is_null());
}

#[tokio::test]
async fn validation_messages_land_on_the_right_lineage() {
    let h = harness(graph("Maps", None));
    let messages = [
        "classname='Dataset' uri=http://x/1 validation_error: missing license",
        "classname='Catalog' uri=http://x/catalog validation_warning: missing homepage",
    ];

    let report = h.pipeline.harvest_catalog(&job(&messages), t(1)).await.unwrap();
    assert!(!report.index.has_failures());

    let mut catalog_warnings = None;
    let mut dataset_errors = Vec::new();
    for (_, doc) in h.store.documents("harvest") {
        match doc {
            IndexDocument::Lineage(LineageDocument::Catalog(lineage)) => {
                catalog_warnings = lineage.validation.map(|v| v.warning_count);
            }
            IndexDocument::Lineage(LineageDocument::Dataset(lineage)) => {
                dataset_errors.push((
                    lineage.dataset_uri,
                    lineage.validation.map(|v| v.error_count),
                ));
            }
            other => panic!("unexpected lineage document: {other:?}"),
        }
    }
    dataset_errors.sort();

    assert_eq!(catalog_warnings, Some(1));
    assert_eq!(
        dataset_errors,
        vec![
            ("http://x/1".to_string(), Some(1)),
            ("http://x/2".to_string(), None),
        ]
    );
}
