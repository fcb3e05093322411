use crate::config::ExecutorConfig;
use crate::harvest::pipeline::{CatalogHarvestJob, CycleReport, HarvestPipeline, PipelineError};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument};

/// Result of one source's cycle in a multi-source run.
#[derive(Debug)]
pub struct SourceOutcome {
    pub source_id: String,
    pub result: Result<CycleReport, PipelineError>,
}

/// Runs catalog harvest cycles for many sources, at most `concurrency_limit`
/// at a time. Cycles share nothing but the pipeline's collaborators.
pub struct HarvesterExecutor {
    semaphore: Arc<Semaphore>,
}

impl HarvesterExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.max_concurrent_cycles)
    }

    #[instrument(skip(self, pipeline, job), fields(source_id = %job.source.id))]
    pub async fn execute(
        &self,
        pipeline: &HarvestPipeline,
        job: &CatalogHarvestJob,
    ) -> Result<CycleReport, PipelineError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| PipelineError::Executor(format!("Semaphore error: {}", e)))?;

        info!(url = %job.source.url, "Starting harvest");

        let result = pipeline.harvest_catalog(job, Utc::now()).await;

        match &result {
            Ok(report) => info!(
                changed = report.changed,
                indexed = report.index.succeeded(),
                "Finished harvest"
            ),
            // Aborted cycles are picked up again by the next scheduled run.
            Err(e) => error!(url = %job.source.url, error = %e, "Harvest aborted"),
        }
        result
    }

    /// Runs every job and returns one outcome per job, in input order.
    pub async fn execute_all(
        &self,
        pipeline: &HarvestPipeline,
        jobs: &[CatalogHarvestJob],
    ) -> Vec<SourceOutcome> {
        join_all(jobs.iter().map(|job| async move {
            SourceOutcome {
                source_id: job.source.id.clone(),
                result: self.execute(pipeline, job).await,
            }
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarvesterConfig;
    use crate::harvest::pipeline::Collaborators;
    use crate::memory::InMemoryIndex;
    use crate::model::{
        ApiSpec, CatalogEntity, CatalogGraph, DatasetEntity, DatasetReference, HarvestSource,
        Publisher,
    };
    use crate::traits::{
        FetchError, GraphParser, LookupError, ParseError, PublisherDirectory, ReferenceResolver,
        SpecFetcher,
    };
    use async_trait::async_trait;

    /// Parses "catalog:<uri>" into a one-dataset catalog; anything else fails.
    struct LineParser;

    #[async_trait]
    impl GraphParser<CatalogGraph> for LineParser {
        fn format_id(&self) -> &str {
            "line"
        }

        async fn parse(&self, raw: &str) -> Result<CatalogGraph, ParseError> {
            let uri = raw
                .strip_prefix("catalog:")
                .ok_or_else(|| ParseError::InvalidContent(raw.to_string()))?;
            Ok(CatalogGraph {
                catalog: CatalogEntity {
                    uri: uri.to_string(),
                    ..CatalogEntity::default()
                },
                datasets: vec![DatasetEntity {
                    uri: format!("{uri}/dataset"),
                    ..DatasetEntity::default()
                }],
                subjects: vec![],
            })
        }
    }

    #[async_trait]
    impl GraphParser<ApiSpec> for LineParser {
        fn format_id(&self) -> &str {
            "line"
        }

        async fn parse(&self, _raw: &str) -> Result<ApiSpec, ParseError> {
            Err(ParseError::UnsupportedFormat("api".to_string()))
        }
    }

    struct Offline;

    #[async_trait]
    impl SpecFetcher for Offline {
        async fn fetch_spec(&self, url: &str) -> Result<String, FetchError> {
            Err(FetchError::Transport {
                url: url.to_string(),
                reason: "offline".to_string(),
            })
        }
    }

    #[async_trait]
    impl PublisherDirectory for Offline {
        async fn lookup_publisher(&self, org_id: &str) -> Result<Publisher, LookupError> {
            Err(LookupError::Transport(org_id.to_string()))
        }
    }

    #[async_trait]
    impl ReferenceResolver for Offline {
        async fn lookup_reference(
            &self,
            uri: &str,
        ) -> Result<Option<DatasetReference>, LookupError> {
            Err(LookupError::Transport(uri.to_string()))
        }
    }

    fn job(id: &str, raw: Option<&str>) -> CatalogHarvestJob {
        CatalogHarvestJob {
            source: HarvestSource {
                id: id.to_string(),
                url: format!("http://portal/{id}"),
                last_harvest: None,
            },
            raw: raw.map(str::to_string),
            validation_messages: vec![],
        }
    }

    #[tokio::test]
    async fn test_failed_source_does_not_affect_others() {
        let store = Arc::new(InMemoryIndex::new());
        let config = HarvesterConfig::from_toml_str("[executor]\nmax_concurrent_cycles = 2\n")
            .unwrap();
        let pipeline = HarvestPipeline::new(
            &config,
            Collaborators {
                catalog_parser: Arc::new(LineParser),
                api_parser: Arc::new(LineParser),
                fetcher: Arc::new(Offline),
                publishers: Arc::new(Offline),
                references: Arc::new(Offline),
                repository: store.clone(),
                index: store.clone(),
            },
        );
        let executor = HarvesterExecutor::from_config(&config.executor);

        let outcomes = executor
            .execute_all(
                &pipeline,
                &[
                    job("a", Some("catalog:http://a")),
                    job("b", Some("garbage")),
                    job("c", None),
                    job("d", Some("catalog:http://d")),
                ],
            )
            .await;

        let ids: Vec<_> = outcomes.iter().map(|o| o.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(outcomes[1].result, Err(PipelineError::Parse(_))));
        assert!(matches!(outcomes[2].result, Err(PipelineError::Fetch(_))));
        assert!(outcomes[3].result.is_ok());
        // two catalogs and their datasets
        assert_eq!(store.count("dcat"), 4);
    }
}
