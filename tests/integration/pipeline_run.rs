//! End-to-end pipeline runs against an in-process embedding service.

use crate::common::{ThemeEmbeddingService, themed_items};
use chorus::pipeline::{AnalysisSupervisor, AnalysisTicket, Pipeline, Stage};
use chorus::vector::{ClusterEngine, EmbeddingFetcher, FetchConfig, MultiLevelClusterer};
use chorus::{PipelineError, Settings, TextItem};
use std::sync::Arc;
use std::time::Duration;

fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.embedding.inter_batch_delay_ms = 0;
    settings.embedding.backoff_ms = 0;
    settings.clustering.seed = Some(11);
    settings
}

#[tokio::test]
async fn coarse_clusters_follow_themes() {
    let settings = fast_settings();
    let pipeline = Pipeline::from_settings(&settings, Arc::new(ThemeEmbeddingService::new()));

    let report = pipeline
        .run(themed_items(20), &AnalysisTicket::detached())
        .await
        .unwrap();

    // 60 comments: fine = 12, coarse = 4
    assert_eq!(report.item_count, 60);
    assert!(report.fine.len() <= 12);
    assert!(report.coarse.len() <= 4);
    assert!(report.coarse.len() >= 3);

    // each coarse cluster holds a single theme
    for cluster in &report.coarse.clusters {
        let texts: Vec<&str> = report.member_texts(cluster).collect();
        let first_theme = &texts[0][..10];
        assert!(texts.iter().all(|text| text.starts_with(first_theme)));
        assert!(cluster.confidence.get() > 0.9);
    }

    let total: usize = report.coarse.clusters.iter().map(|c| c.len()).sum();
    assert_eq!(total, 60);
    assert!(report.claims.last().unwrap().text.contains("60"));
}

#[tokio::test]
async fn failed_batch_degrades_without_aborting() {
    let mut settings = fast_settings();
    settings.embedding.batch_size = 10;
    let service = Arc::new(ThemeEmbeddingService::failing_on(&[1]));
    let pipeline = Pipeline::from_settings(&settings, service.clone());

    let report = pipeline
        .run(themed_items(10), &AnalysisTicket::detached())
        .await
        .unwrap();

    assert_eq!(service.calls(), 3);
    assert_eq!(report.item_count, 30);
    assert_eq!(report.stats.failed, 10);
    assert_eq!(report.valid_indices.len(), 20);
    assert!(!report.valid_indices.contains(&10));
    assert!(!report.valid_indices.contains(&19));
    assert_eq!(report.coarse.item_count(), 20);
}

#[tokio::test]
async fn unreachable_service_reports_processing_failed() {
    let mut settings = fast_settings();
    settings.embedding.batch_size = 5;
    let service = Arc::new(ThemeEmbeddingService::failing_on(&[0, 1]));
    let pipeline = Pipeline::from_settings(&settings, service);

    let error = pipeline
        .run(themed_items(3), &AnalysisTicket::detached())
        .await
        .unwrap_err();

    assert!(matches!(error, PipelineError::NoValidEmbeddings { .. }));
    assert_eq!(error.stage(), Stage::Embedding);
}

#[tokio::test]
async fn blank_comments_are_never_sent() {
    let settings = fast_settings();
    let service = Arc::new(ThemeEmbeddingService::new());
    let pipeline = Pipeline::from_settings(&settings, service.clone());

    let items = vec![
        TextItem::new("a", "\n\t"),
        TextItem::new("b", ""),
        TextItem::new("c", "\0"),
    ];
    let error = pipeline
        .run(items, &AnalysisTicket::detached())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        PipelineError::NoValidEmbeddings { skipped: 3, .. }
    ));
    assert_eq!(service.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn newer_analysis_cancels_the_running_one() {
    let supervisor = AnalysisSupervisor::new();
    let fetcher = EmbeddingFetcher::new(
        Arc::new(ThemeEmbeddingService::new()),
        FetchConfig {
            batch_size: 5,
            inter_batch_delay: Duration::from_secs(1),
            ..FetchConfig::default()
        },
    );
    let pipeline = Pipeline::new(
        fetcher,
        MultiLevelClusterer::new(ClusterEngine::new().with_seed(1), Default::default()),
    );

    let first = supervisor.begin();
    let running = {
        let pipeline = pipeline.clone();
        let ticket = first.clone();
        tokio::spawn(async move { pipeline.run(themed_items(10), &ticket).await })
    };

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let second = supervisor.begin();

    let error = running.await.unwrap().unwrap_err();
    assert!(matches!(
        error,
        PipelineError::Cancelled {
            stage: Stage::Embedding
        }
    ));
    assert!(!supervisor.is_current(&first));

    let report = pipeline.run(themed_items(2), &second).await.unwrap();
    assert!(supervisor.is_current(&second));
    assert_eq!(report.item_count, 6);
}
