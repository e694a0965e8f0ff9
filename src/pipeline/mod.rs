//! Staged analysis run: embed, cluster, name, summarize.
//!
//! A run moves through [`Stage`]s strictly in order. The ticket's
//! cancellation token is checked between stages and raced against every
//! network wait, so a superseded run stops promptly.

mod collaborators;
mod stage;
mod supervisor;

pub use collaborators::{
    Claim, ClaimRequest, ClaimWriter, ClusterName, ClusterNamer, CollaboratorError,
    FALLBACK_NAME, FALLBACK_NAME_CONFIDENCE, KeywordNamer, MISSING_NAME, NamingRequest,
    SummaryClaimWriter, claim_requests, fallback_claim, fallback_names, naming_requests,
};
pub use stage::{PipelineObserver, Stage};
pub use supervisor::{AnalysisSupervisor, AnalysisTicket};

use crate::config::{CollaboratorsConfig, Settings};
use crate::error::{PipelineError, PipelineResult};
use crate::types::{Corpus, TextItem};
use crate::vector::{
    Cluster, ClusterId, ClusterResult, DEFAULT_DISSENT_THRESHOLD, EmbeddingError,
    EmbeddingFetcher, EmbeddingService, FetchStats, MultiLevelClusterer, NoopObserver,
    find_dissenting,
};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Coarse-cluster members that sit far from their centroid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DissentingMembers {
    pub cluster_id: ClusterId,
    /// Valid-subset indices.
    pub members: Vec<usize>,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    #[serde(skip)]
    pub corpus: Corpus,
    pub item_count: usize,
    /// Corpus position of each valid-subset index.
    pub valid_indices: Vec<usize>,
    pub fine: ClusterResult,
    pub coarse: ClusterResult,
    pub dissenting: Vec<DissentingMembers>,
    pub names: Vec<ClusterName>,
    pub claims: Vec<Claim>,
    pub stats: FetchStats,
}

impl AnalysisReport {
    /// Comment text for valid-subset index `valid_index`.
    pub fn text_of(&self, valid_index: usize) -> Option<&str> {
        self.valid_indices
            .get(valid_index)
            .and_then(|&original| self.corpus.items().get(original))
            .map(|item| item.text.as_str())
    }

    /// Texts of every member of `cluster`.
    pub fn member_texts<'a>(&'a self, cluster: &'a Cluster) -> impl Iterator<Item = &'a str> + 'a {
        cluster
            .members
            .iter()
            .filter_map(move |&index| self.text_of(index))
    }

    pub fn name_of(&self, cluster_id: ClusterId) -> Option<&str> {
        self.names
            .iter()
            .find(|name| name.cluster_id == cluster_id)
            .map(|name| name.name.as_str())
    }

    pub fn dissenting_for(&self, cluster_id: ClusterId) -> &[usize] {
        self.dissenting
            .iter()
            .find(|entry| entry.cluster_id == cluster_id)
            .map_or(&[], |entry| entry.members.as_slice())
    }
}

/// The analysis pipeline and its collaborators.
#[derive(Clone)]
pub struct Pipeline {
    fetcher: EmbeddingFetcher,
    clusterer: MultiLevelClusterer,
    dissent_threshold: f32,
    samples: CollaboratorsConfig,
    namer: Arc<dyn ClusterNamer>,
    claim_writer: Arc<dyn ClaimWriter>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("fetcher", &self.fetcher)
            .field("clusterer", &self.clusterer)
            .field("dissent_threshold", &self.dissent_threshold)
            .field("samples", &self.samples)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Pipeline with the offline collaborators and default thresholds.
    pub fn new(fetcher: EmbeddingFetcher, clusterer: MultiLevelClusterer) -> Self {
        Self {
            fetcher,
            clusterer,
            dissent_threshold: DEFAULT_DISSENT_THRESHOLD,
            samples: CollaboratorsConfig::default(),
            namer: Arc::new(KeywordNamer::default()),
            claim_writer: Arc::new(SummaryClaimWriter),
        }
    }

    /// Pipeline configured from `settings`, embedding through `service`.
    pub fn from_settings(settings: &Settings, service: Arc<dyn EmbeddingService>) -> Self {
        let fetcher = EmbeddingFetcher::new(service, settings.embedding.fetch_config());
        let clusterer =
            MultiLevelClusterer::new(settings.clustering.engine(), settings.clustering.levels());

        Self::new(fetcher, clusterer)
            .with_dissent_threshold(settings.clustering.dissent_threshold)
            .with_samples(settings.collaborators)
    }

    #[must_use]
    pub fn with_namer(mut self, namer: Arc<dyn ClusterNamer>) -> Self {
        self.namer = namer;
        self
    }

    #[must_use]
    pub fn with_claim_writer(mut self, claim_writer: Arc<dyn ClaimWriter>) -> Self {
        self.claim_writer = claim_writer;
        self
    }

    #[must_use]
    pub fn with_dissent_threshold(mut self, threshold: f32) -> Self {
        self.dissent_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_samples(mut self, samples: CollaboratorsConfig) -> Self {
        self.samples = samples;
        self
    }

    /// Runs the whole analysis; see [`run_observed`](Self::run_observed).
    pub async fn run(
        &self,
        items: Vec<TextItem>,
        ticket: &AnalysisTicket,
    ) -> PipelineResult<AnalysisReport> {
        self.run_observed(items, ticket, &NoopObserver).await
    }

    /// Runs the whole analysis, reporting progress to `observer`.
    ///
    /// # Errors
    /// - [`PipelineError::InvalidInput`] / [`PipelineError::Config`] before any
    ///   network call
    /// - [`PipelineError::NoValidEmbeddings`] when every item lost its embedding
    /// - [`PipelineError::Clustering`] for malformed vectors
    /// - [`PipelineError::Cancelled`] when the ticket is cancelled
    ///
    /// Degraded batches and failing collaborators are not errors.
    pub async fn run_observed<O: PipelineObserver + ?Sized>(
        &self,
        items: Vec<TextItem>,
        ticket: &AnalysisTicket,
        observer: &O,
    ) -> PipelineResult<AnalysisReport> {
        let cancel = ticket.token();

        self.enter(Stage::Validating, cancel, observer)?;
        if items.is_empty() {
            return Err(PipelineError::InvalidInput {
                reason: "no comments to analyze".to_string(),
            });
        }
        self.fetcher.config().validate()?;

        self.enter(Stage::Embedding, cancel, observer)?;
        let item_count = items.len();
        let texts: Vec<String> = items.iter().map(|item| item.text.clone()).collect();
        let fetched = self.fetcher.fetch_observed(&texts, cancel, observer).await?;
        observer.on_finished(&fetched.stats);

        let stats = fetched.stats;
        let returned = fetched.embeddings.len();
        let corpus = Corpus::new(items, fetched.embeddings).ok_or(EmbeddingError::Incomplete {
            expected: item_count,
            actual: returned,
        })?;
        let subset = corpus.valid_subset();
        if subset.is_empty() {
            return Err(PipelineError::NoValidEmbeddings {
                requested: stats.requested,
                skipped: stats.skipped,
                failed: stats.failed,
            });
        }

        self.enter(Stage::Clustering, cancel, observer)?;
        let clusters = self.clusterer.cluster(subset.embeddings())?;
        let dissenting: Vec<DissentingMembers> = clusters
            .coarse
            .clusters
            .iter()
            .map(|cluster| DissentingMembers {
                cluster_id: cluster.id,
                members: find_dissenting(cluster, subset.embeddings(), self.dissent_threshold),
            })
            .collect();
        info!(
            valid = subset.len(),
            fine = clusters.fine.len(),
            coarse = clusters.coarse.len(),
            "clustering finished"
        );

        self.enter(Stage::Naming, cancel, observer)?;
        let naming = naming_requests(&clusters.coarse, &corpus, &subset, &self.samples);
        let names = self.name_clusters(&naming, cancel).await?;

        self.enter(Stage::Claims, cancel, observer)?;
        let claim_input = claim_requests(&clusters.coarse, &names, &corpus, &subset, &self.samples);
        let claims = self.write_claims(&claim_input, cancel).await?;

        observer.on_stage(Stage::Done);
        Ok(AnalysisReport {
            item_count,
            valid_indices: subset.original_indices().to_vec(),
            corpus,
            fine: clusters.fine,
            coarse: clusters.coarse,
            dissenting,
            names,
            claims,
            stats,
        })
    }

    fn enter<O: PipelineObserver + ?Sized>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        observer: &O,
    ) -> PipelineResult<()> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { stage });
        }
        observer.on_stage(stage);
        Ok(())
    }

    async fn name_clusters(
        &self,
        requests: &[NamingRequest],
        cancel: &CancellationToken,
    ) -> PipelineResult<Vec<ClusterName>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled { stage: Stage::Naming }),
            result = self.namer.name_clusters(requests) => result,
        };

        match result {
            Ok(names) => Ok(names),
            Err(error) => {
                warn!(%error, "cluster naming failed, using fallback names");
                Ok(fallback_names(requests))
            }
        }
    }

    async fn write_claims(
        &self,
        requests: &[ClaimRequest],
        cancel: &CancellationToken,
    ) -> PipelineResult<Vec<Claim>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let total: usize = requests.iter().map(|request| request.member_count).sum();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled { stage: Stage::Claims }),
            result = self.claim_writer.write_claims(requests, total) => result,
        };

        match result {
            Ok(claims) => Ok(claims),
            Err(error) => {
                warn!(%error, "claim writing failed, using fallback claim");
                Ok(vec![fallback_claim(requests, total)])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{
        BatchObserver, ClusterEngine, ClusterLevels, FetchConfig, ScriptedEmbeddingService,
        ScriptedReply, ServiceError,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    const THEMES: [&str; 3] = ["summer beach sun", "rain and tears", "mom and childhood home"];

    fn items(n: usize) -> Vec<TextItem> {
        (0..n)
            .map(|i| TextItem::new(format!("c{i}"), format!("{} memory {i}", THEMES[i % 3])))
            .collect()
    }

    fn pipeline(service: ScriptedEmbeddingService) -> Pipeline {
        let fetcher = EmbeddingFetcher::new(Arc::new(service), FetchConfig::default());
        let clusterer =
            MultiLevelClusterer::new(ClusterEngine::new().with_seed(3), ClusterLevels::default());
        Pipeline::new(fetcher, clusterer)
    }

    #[derive(Default)]
    struct StageLog {
        stages: Mutex<Vec<Stage>>,
        batches: Mutex<usize>,
        finished: Mutex<Option<FetchStats>>,
    }

    impl BatchObserver for StageLog {
        fn on_batch(&self, _report: &crate::vector::BatchReport) {
            *self.batches.lock().unwrap() += 1;
        }
    }

    impl PipelineObserver for StageLog {
        fn on_stage(&self, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_finished(&self, stats: &FetchStats) {
            *self.finished.lock().unwrap() = Some(stats.clone());
        }
    }

    struct FailingNamer;

    #[async_trait]
    impl ClusterNamer for FailingNamer {
        async fn name_clusters(
            &self,
            _requests: &[NamingRequest],
        ) -> Result<Vec<ClusterName>, CollaboratorError> {
            Err(CollaboratorError::Failed("offline".to_string()))
        }
    }

    struct FailingClaims;

    #[async_trait]
    impl ClaimWriter for FailingClaims {
        async fn write_claims(
            &self,
            _requests: &[ClaimRequest],
            _total: usize,
        ) -> Result<Vec<Claim>, CollaboratorError> {
            Err(CollaboratorError::InvalidResponse("not json".to_string()))
        }
    }

    #[tokio::test]
    async fn test_full_run_reports_both_granularities() {
        let log = StageLog::default();
        let report = pipeline(ScriptedEmbeddingService::new())
            .run_observed(items(45), &AnalysisTicket::detached(), &log)
            .await
            .unwrap();

        assert_eq!(report.item_count, 45);
        assert_eq!(report.valid_indices.len(), 45);
        assert_eq!(report.fine.item_count(), 45);
        assert_eq!(report.coarse.item_count(), 45);
        assert!(report.coarse.len() <= 3);
        assert_eq!(report.names.len(), report.coarse.len());
        assert_eq!(report.dissenting.len(), report.coarse.len());
        assert!(!report.claims.is_empty());

        assert_eq!(
            *log.stages.lock().unwrap(),
            vec![
                Stage::Validating,
                Stage::Embedding,
                Stage::Clustering,
                Stage::Naming,
                Stage::Claims,
                Stage::Done
            ]
        );
        assert_eq!(*log.batches.lock().unwrap(), 1);
        assert_eq!(log.finished.lock().unwrap().as_ref().unwrap().embedded, 45);
    }

    #[tokio::test]
    async fn test_themes_land_in_separate_coarse_clusters() {
        let report = pipeline(ScriptedEmbeddingService::new())
            .run(items(45), &AnalysisTicket::detached())
            .await
            .unwrap();

        for cluster in &report.coarse.clusters {
            let texts: Vec<&str> = report.member_texts(cluster).collect();
            let theme = THEMES
                .into_iter()
                .find(|theme| texts[0].starts_with(theme))
                .unwrap();
            assert!(texts.iter().all(|text| text.starts_with(theme)));
        }
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected_without_requests() {
        let service = Arc::new(ScriptedEmbeddingService::new());
        let fetcher = EmbeddingFetcher::new(service.clone(), FetchConfig::default());
        let pipeline = Pipeline::new(fetcher, MultiLevelClusterer::default());

        let error = pipeline
            .run(Vec::new(), &AnalysisTicket::detached())
            .await
            .unwrap_err();
        assert!(matches!(error, PipelineError::InvalidInput { .. }));
        assert_eq!(error.stage(), Stage::Validating);
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_total_embedding_failure_is_processing_failed() {
        let service = ScriptedEmbeddingService::with_script(vec![ScriptedReply::Fail(
            ServiceError::Transport("connection refused".to_string()),
        )]);
        let error = pipeline(service)
            .run(items(10), &AnalysisTicket::detached())
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            PipelineError::NoValidEmbeddings {
                requested: 10,
                failed: 10,
                ..
            }
        ));
        assert_eq!(error.stage(), Stage::Embedding);
        assert_eq!(error.status_code(), "PROCESSING_FAILED");
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_index_mapping() {
        let mut input = items(6);
        input[1].text = "   ".to_string();
        input[4].text = String::new();

        let report = pipeline(ScriptedEmbeddingService::new())
            .run(input, &AnalysisTicket::detached())
            .await
            .unwrap();

        assert_eq!(report.item_count, 6);
        assert_eq!(report.valid_indices, vec![0, 2, 3, 5]);
        assert_eq!(report.coarse.item_count(), 4);
        assert_eq!(report.text_of(1), Some(report.corpus.items()[2].text.as_str()));
        assert_eq!(report.stats.skipped, 2);
    }

    #[tokio::test]
    async fn test_ragged_embedding_batch_degrades_instead_of_failing_clustering() {
        let service = ScriptedEmbeddingService::with_script(vec![
            ScriptedReply::Succeed,
            ScriptedReply::Ragged,
        ]);
        let config = FetchConfig {
            batch_size: 10,
            inter_batch_delay: std::time::Duration::ZERO,
            ..FetchConfig::default()
        };
        let report = Pipeline::new(
            EmbeddingFetcher::new(Arc::new(service), config),
            MultiLevelClusterer::new(ClusterEngine::new().with_seed(5), ClusterLevels::default()),
        )
        .run(items(20), &AnalysisTicket::detached())
        .await
        .unwrap();

        assert_eq!(report.item_count, 20);
        assert_eq!(report.valid_indices, (0..10).collect::<Vec<_>>());
        assert_eq!(report.stats.failed, 10);
        assert_eq!(report.coarse.item_count(), 10);
    }

    #[tokio::test]
    async fn test_collaborator_failures_fall_back() {
        let report = pipeline(ScriptedEmbeddingService::new())
            .with_namer(Arc::new(FailingNamer))
            .with_claim_writer(Arc::new(FailingClaims))
            .run(items(30), &AnalysisTicket::detached())
            .await
            .unwrap();

        assert!(report.names.iter().all(|name| name.name == FALLBACK_NAME));
        assert_eq!(report.claims.len(), 1);
        assert_eq!(
            report.claims[0].text,
            "30 comments reveal varied experiences with this music."
        );
        assert_eq!(report.claims[0].cluster_ids.len(), report.coarse.len());
        assert_eq!(report.name_of(ClusterId::new(0)), Some(FALLBACK_NAME));
    }

    #[tokio::test]
    async fn test_cancelled_ticket_stops_before_embedding() {
        let supervisor = AnalysisSupervisor::new();
        let stale = supervisor.begin();
        let _fresh = supervisor.begin();

        let service = Arc::new(ScriptedEmbeddingService::new());
        let fetcher = EmbeddingFetcher::new(service.clone(), FetchConfig::default());
        let error = Pipeline::new(fetcher, MultiLevelClusterer::default())
            .run(items(5), &stale)
            .await
            .unwrap_err();

        assert!(error.is_cancelled());
        assert!(service.calls().is_empty());
        assert!(!supervisor.is_current(&stale));
    }

    #[tokio::test]
    async fn test_invalid_fetch_config_is_a_config_error() {
        let service = Arc::new(ScriptedEmbeddingService::new());
        let config = FetchConfig {
            max_attempts: 0,
            ..FetchConfig::default()
        };
        let error = Pipeline::new(
            EmbeddingFetcher::new(service.clone(), config),
            MultiLevelClusterer::default(),
        )
        .run(items(3), &AnalysisTicket::detached())
        .await
        .unwrap_err();

        assert!(matches!(error, PipelineError::Config { .. }));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_report_serializes_without_corpus() {
        let report = pipeline(ScriptedEmbeddingService::new())
            .run(items(9), &AnalysisTicket::detached())
            .await
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert!(json.get("corpus").is_none());
        assert_eq!(json["item_count"], 9);
        assert!(json["coarse"]["clusters"].is_array());
    }
}
