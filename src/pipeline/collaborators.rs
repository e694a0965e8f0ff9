//! Naming and claim-writing collaborators.
//!
//! Labels and prose are produced outside the clustering core. The pipeline
//! hands each collaborator a capped sample of member text per coarse cluster
//! and falls back to fixed output when the collaborator fails.

use crate::config::CollaboratorsConfig;
use crate::text::{WordCounter, truncate_chars};
use crate::types::{Corpus, ValidSubset};
use crate::vector::{ClusterId, ClusterResult, Score};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name used for every cluster when naming fails.
pub const FALLBACK_NAME: &str = "unnamed feeling";

/// Confidence attached to [`FALLBACK_NAME`].
pub const FALLBACK_NAME_CONFIDENCE: f32 = 0.5;

/// Name used in claim requests for a cluster the namer skipped.
pub const MISSING_NAME: &str = "unnamed";

#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("Collaborator request failed: {0}")]
    Failed(String),

    #[error("Collaborator returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Input for naming one coarse cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamingRequest {
    pub cluster_id: ClusterId,
    pub member_count: usize,
    pub confidence: Score,
    /// First member texts, each truncated.
    pub samples: Vec<String>,
}

/// A short label for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterName {
    pub cluster_id: ClusterId,
    pub name: String,
    pub confidence: f32,
}

/// Input for summarizing one coarse cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimRequest {
    pub cluster_id: ClusterId,
    pub name: String,
    pub member_count: usize,
    pub confidence: Score,
    pub samples: Vec<String>,
}

/// A prose claim citing the clusters and comment count behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub text: String,
    pub cluster_ids: Vec<ClusterId>,
    pub comment_count: usize,
}

#[async_trait]
pub trait ClusterNamer: Send + Sync {
    async fn name_clusters(
        &self,
        requests: &[NamingRequest],
    ) -> Result<Vec<ClusterName>, CollaboratorError>;
}

#[async_trait]
pub trait ClaimWriter: Send + Sync {
    /// `total_comments` is the member count summed over all requests.
    async fn write_claims(
        &self,
        requests: &[ClaimRequest],
        total_comments: usize,
    ) -> Result<Vec<Claim>, CollaboratorError>;
}

fn sample_texts(
    members: &[usize],
    corpus: &Corpus,
    subset: &ValidSubset,
    count: usize,
    max_chars: usize,
) -> Vec<String> {
    members
        .iter()
        .filter_map(|&index| corpus.text_at(subset, index))
        .filter(|text| !text.is_empty())
        .take(count)
        .map(|text| truncate_chars(text, max_chars).to_string())
        .collect()
}

/// One naming request per cluster in `clusters`.
pub fn naming_requests(
    clusters: &ClusterResult,
    corpus: &Corpus,
    subset: &ValidSubset,
    limits: &CollaboratorsConfig,
) -> Vec<NamingRequest> {
    clusters
        .clusters
        .iter()
        .map(|cluster| NamingRequest {
            cluster_id: cluster.id,
            member_count: cluster.len(),
            confidence: cluster.confidence,
            samples: sample_texts(
                &cluster.members,
                corpus,
                subset,
                limits.naming_sample,
                limits.naming_chars,
            ),
        })
        .collect()
}

/// One claim request per cluster, labelled with the names returned so far.
pub fn claim_requests(
    clusters: &ClusterResult,
    names: &[ClusterName],
    corpus: &Corpus,
    subset: &ValidSubset,
    limits: &CollaboratorsConfig,
) -> Vec<ClaimRequest> {
    clusters
        .clusters
        .iter()
        .map(|cluster| ClaimRequest {
            cluster_id: cluster.id,
            name: names
                .iter()
                .find(|name| name.cluster_id == cluster.id)
                .map_or_else(|| MISSING_NAME.to_string(), |name| name.name.clone()),
            member_count: cluster.len(),
            confidence: cluster.confidence,
            samples: sample_texts(
                &cluster.members,
                corpus,
                subset,
                limits.claims_sample,
                limits.claims_chars,
            ),
        })
        .collect()
}

/// Names used when the namer fails.
pub fn fallback_names(requests: &[NamingRequest]) -> Vec<ClusterName> {
    requests
        .iter()
        .map(|request| ClusterName {
            cluster_id: request.cluster_id,
            name: FALLBACK_NAME.to_string(),
            confidence: FALLBACK_NAME_CONFIDENCE,
        })
        .collect()
}

/// The single claim used when the claim writer fails.
pub fn fallback_claim(requests: &[ClaimRequest], total_comments: usize) -> Claim {
    Claim {
        text: format!("{total_comments} comments reveal varied experiences with this music."),
        cluster_ids: requests.iter().map(|request| request.cluster_id).collect(),
        comment_count: total_comments,
    }
}

/// Offline namer: labels a cluster with its most frequent content words.
#[derive(Debug, Clone, Copy)]
pub struct KeywordNamer {
    words: usize,
}

impl Default for KeywordNamer {
    fn default() -> Self {
        Self { words: 3 }
    }
}

impl KeywordNamer {
    pub fn new(words: usize) -> Self {
        Self {
            words: words.max(1),
        }
    }
}

#[async_trait]
impl ClusterNamer for KeywordNamer {
    async fn name_clusters(
        &self,
        requests: &[NamingRequest],
    ) -> Result<Vec<ClusterName>, CollaboratorError> {
        let counter = WordCounter::default()
            .with_min_count(1)
            .with_limit(self.words);

        Ok(requests
            .iter()
            .map(|request| {
                let words = counter.count(&request.samples);
                let name = if words.is_empty() {
                    FALLBACK_NAME.to_string()
                } else {
                    words
                        .iter()
                        .map(|word| word.text.as_str())
                        .collect::<Vec<_>>()
                        .join(" ")
                };
                ClusterName {
                    cluster_id: request.cluster_id,
                    name,
                    confidence: request.confidence.get(),
                }
            })
            .collect())
    }
}

/// Offline claim writer: one counted sentence per cluster and a closing line.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryClaimWriter;

#[async_trait]
impl ClaimWriter for SummaryClaimWriter {
    async fn write_claims(
        &self,
        requests: &[ClaimRequest],
        total_comments: usize,
    ) -> Result<Vec<Claim>, CollaboratorError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let mut claims: Vec<Claim> = requests
            .iter()
            .enumerate()
            .map(|(rank, request)| {
                let lead = if rank == 0 {
                    "Many listeners seem to share"
                } else {
                    "A smaller group describes"
                };
                Claim {
                    text: format!(
                        "{lead} \"{}\" ({} comments, {}% coherent).",
                        request.name,
                        request.member_count,
                        request.confidence.percent()
                    ),
                    cluster_ids: vec![request.cluster_id],
                    comment_count: request.member_count,
                }
            })
            .collect();

        claims.push(Claim {
            text: format!(
                "This is one way of speaking about {total_comments} experiences."
            ),
            cluster_ids: requests.iter().map(|request| request.cluster_id).collect(),
            comment_count: total_comments,
        });
        Ok(claims)
    }
}
