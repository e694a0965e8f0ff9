//! Embedding retrieval for raw comment text.
//!
//! [`EmbeddingFetcher`] turns an ordered list of texts into an equal-length
//! list of vectors by calling an [`EmbeddingService`] in fixed-size batches.
//! Partial failure is data, not an error: a text that normalizes to nothing,
//! or whose batch fails, gets an empty vector at its position. Only
//! cancellation and invalid configuration abort a fetch.
//!
//! # Batch policy
//! - Texts are normalized (see [`normalize_for_embedding`]) and empties skipped
//! - Batches of [`FetchConfig::batch_size`] go out strictly one at a time
//! - A rate-limited batch waits [`FetchConfig::backoff`] and retries, up to
//!   [`FetchConfig::max_attempts`] attempts in total
//! - Any other failure, or running out of attempts, degrades the whole batch
//! - After a successful batch, [`FetchConfig::inter_batch_delay`] passes
//!   before the next request

use crate::text::{MAX_EMBEDDING_CHARS, normalize_for_embedding};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of texts per embedding request.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default attempts per batch, the first request included.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Default wait after a rate-limit response.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

/// Default pause between successful batches.
pub const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_millis(200);

/// Failure of a single embedding request.
///
/// These never escape the fetcher; they decide between retry and degrade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Embedding service is rate limiting requests")]
    RateLimited,

    #[error("Embedding service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Embedding request failed: {0}")]
    Transport(String),

    #[error("Malformed embedding response: {0}")]
    Malformed(String),
}

/// Errors that abort a whole fetch.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Invalid embedding configuration: {0}\nSuggestion: Check the [embedding] section of settings.toml")]
    InvalidConfig(String),

    #[error(
        "Failed to create embedding client: {0}\nSuggestion: Verify the endpoint URL and TLS setup"
    )]
    Client(String),

    #[error("Embedding fetch returned {actual} vectors for {expected} texts")]
    Incomplete { expected: usize, actual: usize },

    #[error("Embedding fetch was cancelled")]
    Cancelled,
}

/// A remote (or local) model that embeds one batch of texts.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embeds `texts`, returning one vector per text in the same order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;

    /// Name of the model behind the service.
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible `/v1/embeddings` client.
///
/// Sends `{"model": ..., "input": [...]}` and reads `data[].embedding`,
/// ordered by `data[].index`.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingService {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl HttpEmbeddingService {
    /// Creates a client for `endpoint`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ServiceError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Malformed(e.to_string()))?;

        let mut data = payload.data;
        let indexed = data.iter().filter(|datum| datum.index.is_some()).count();
        if indexed == data.len() {
            data.sort_by_key(|datum| datum.index);
            let permutation = data
                .iter()
                .enumerate()
                .all(|(position, datum)| datum.index == Some(position));
            if !permutation {
                return Err(ServiceError::Malformed(
                    "response indices are not a permutation of the inputs".to_string(),
                ));
            }
        } else if indexed > 0 {
            return Err(ServiceError::Malformed(
                "response mixes indexed and unindexed embeddings".to_string(),
            ));
        }
        Ok(data.into_iter().map(|datum| datum.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Batching and retry parameters for [`EmbeddingFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    pub batch_size: usize,
    pub max_chars: usize,
    pub max_attempts: usize,
    pub backoff: Duration,
    pub inter_batch_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_chars: MAX_EMBEDDING_CHARS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            inter_batch_delay: DEFAULT_INTER_BATCH_DELAY,
        }
    }
}

impl FetchConfig {
    /// Rejects values that would make a fetch meaningless.
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.batch_size == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_chars == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "max_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// How a batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Embedded,
    Failed,
}

/// Progress record for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Zero-based batch number.
    pub index: usize,
    /// Total number of batches in this fetch.
    pub total: usize,
    /// Texts in this batch.
    pub size: usize,
    /// Requests issued for this batch.
    pub attempts: usize,
    pub outcome: BatchOutcome,
}

/// Counters for one fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    /// Texts passed in.
    pub requested: usize,
    /// Texts that normalized to nothing and were never sent.
    pub skipped: usize,
    /// Positions that received a non-empty vector.
    pub embedded: usize,
    /// Texts lost to failed batches.
    pub failed: usize,
    pub batches: usize,
    pub failed_batches: usize,
    /// Rate-limit responses received across all batches.
    pub rate_limited: usize,
}

/// Result of a fetch: one vector per input text, empty where unavailable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchReport {
    pub embeddings: Vec<Vec<f32>>,
    pub stats: FetchStats,
}

/// Receives a [`BatchReport`] after every batch.
pub trait BatchObserver: Send + Sync {
    fn on_batch(&self, _report: &BatchReport) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Checks that every vector in a batch has the same non-zero dimension,
/// matching `pinned` when earlier batches fixed it.
///
/// The first consistent batch pins the dimension for the rest of the fetch.
fn accepts_dimension(batch: usize, vectors: &[Vec<f32>], pinned: &mut Option<usize>) -> bool {
    let Some(first) = vectors.first().map(Vec::len) else {
        return true;
    };
    if first == 0 || vectors.iter().any(|vector| vector.len() != first) {
        warn!(batch, "embedding response has ragged or empty vectors, batch degraded");
        return false;
    }

    match *pinned {
        Some(expected) if expected != first => {
            warn!(
                batch,
                expected,
                actual = first,
                "embedding dimension changed between batches, batch degraded"
            );
            false
        }
        Some(_) => true,
        None => {
            *pinned = Some(first);
            true
        }
    }
}

struct BatchAttempt {
    vectors: Option<Vec<Vec<f32>>>,
    attempts: usize,
    rate_limited: usize,
}

/// Batched, rate-limit aware embedding retrieval.
#[derive(Clone)]
pub struct EmbeddingFetcher {
    service: Arc<dyn EmbeddingService>,
    config: FetchConfig,
}

impl std::fmt::Debug for EmbeddingFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingFetcher")
            .field("model", &self.service.model_name())
            .field("config", &self.config)
            .finish()
    }
}

impl EmbeddingFetcher {
    #[must_use]
    pub fn new(service: Arc<dyn EmbeddingService>, config: FetchConfig) -> Self {
        Self { service, config }
    }

    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        self.service.model_name()
    }

    /// Embeds `texts`; see [`fetch_observed`](Self::fetch_observed).
    pub async fn fetch(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<FetchReport, EmbeddingError> {
        self.fetch_observed(texts, cancel, &NoopObserver).await
    }

    /// Embeds `texts`, reporting every finished batch to `observer`.
    ///
    /// The returned embeddings have exactly `texts.len()` entries, in input
    /// order; skipped or failed positions hold empty vectors.
    ///
    /// # Errors
    /// Returns an error only for invalid configuration or cancellation.
    pub async fn fetch_observed<O: BatchObserver + ?Sized>(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
        observer: &O,
    ) -> Result<FetchReport, EmbeddingError> {
        self.config.validate()?;

        let mut stats = FetchStats {
            requested: texts.len(),
            ..FetchStats::default()
        };
        let mut embeddings = vec![Vec::new(); texts.len()];

        // (original position, cleaned text)
        let pending: Vec<(usize, String)> = texts
            .iter()
            .enumerate()
            .filter_map(|(position, text)| {
                let cleaned = normalize_for_embedding(text, self.config.max_chars);
                (!cleaned.is_empty()).then_some((position, cleaned))
            })
            .collect();
        stats.skipped = texts.len() - pending.len();

        // Pinned by the first accepted batch
        let mut dimension: Option<usize> = None;

        let total = pending.len().div_ceil(self.config.batch_size);
        for (index, batch) in pending.chunks(self.config.batch_size).enumerate() {
            if cancel.is_cancelled() {
                return Err(EmbeddingError::Cancelled);
            }

            let inputs: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            let attempt = self.embed_with_retry(index, &inputs, cancel).await?;

            stats.batches += 1;
            stats.rate_limited += attempt.rate_limited;

            let accepted = attempt
                .vectors
                .filter(|vectors| accepts_dimension(index, vectors, &mut dimension));

            let outcome = match accepted {
                Some(vectors) => {
                    stats.embedded += vectors.len();
                    for ((position, _), vector) in batch.iter().zip(vectors) {
                        embeddings[*position] = vector;
                    }
                    BatchOutcome::Embedded
                }
                None => {
                    stats.failed_batches += 1;
                    stats.failed += batch.len();
                    BatchOutcome::Failed
                }
            };

            observer.on_batch(&BatchReport {
                index,
                total,
                size: batch.len(),
                attempts: attempt.attempts,
                outcome,
            });

            if outcome == BatchOutcome::Embedded && index + 1 < total {
                self.pause(self.config.inter_batch_delay, cancel).await?;
            }
        }

        info!(
            requested = stats.requested,
            embedded = stats.embedded,
            skipped = stats.skipped,
            failed = stats.failed,
            "embedding fetch finished"
        );
        Ok(FetchReport { embeddings, stats })
    }

    async fn embed_with_retry(
        &self,
        batch_index: usize,
        inputs: &[String],
        cancel: &CancellationToken,
    ) -> Result<BatchAttempt, EmbeddingError> {
        let max_attempts = self.config.max_attempts;
        let mut rate_limited = 0;

        for attempt in 1..=max_attempts {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EmbeddingError::Cancelled),
                result = self.service.embed_batch(inputs) => result,
            };

            match result {
                Ok(vectors) if vectors.len() == inputs.len() => {
                    debug!(batch = batch_index, size = inputs.len(), attempt, "batch embedded");
                    return Ok(BatchAttempt {
                        vectors: Some(vectors),
                        attempts: attempt,
                        rate_limited,
                    });
                }
                Ok(vectors) => {
                    warn!(
                        batch = batch_index,
                        expected = inputs.len(),
                        actual = vectors.len(),
                        "embedding response length mismatch, batch degraded"
                    );
                    return Ok(BatchAttempt {
                        vectors: None,
                        attempts: attempt,
                        rate_limited,
                    });
                }
                Err(ServiceError::RateLimited) => {
                    rate_limited += 1;
                    if attempt < max_attempts {
                        debug!(
                            batch = batch_index,
                            attempt,
                            backoff_ms = self.config.backoff.as_millis() as u64,
                            "rate limited, backing off"
                        );
                        self.pause(self.config.backoff, cancel).await?;
                    }
                }
                Err(error) => {
                    warn!(batch = batch_index, %error, "embedding batch failed, batch degraded");
                    return Ok(BatchAttempt {
                        vectors: None,
                        attempts: attempt,
                        rate_limited,
                    });
                }
            }
        }

        warn!(
            batch = batch_index,
            attempts = max_attempts,
            "rate limit retries exhausted, batch degraded"
        );
        Ok(BatchAttempt {
            vectors: None,
            attempts: max_attempts,
            rate_limited,
        })
    }

    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), EmbeddingError> {
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EmbeddingError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Scripted embedding service for tests.
///
/// Replies are consumed one per request; once the script runs out every
/// request succeeds. Vectors are deterministic and keyword driven, so texts
/// sharing a theme land close together.
#[cfg(test)]
pub struct ScriptedEmbeddingService {
    script: std::sync::Mutex<std::collections::VecDeque<ScriptedReply>>,
    calls: std::sync::Mutex<Vec<(tokio::time::Instant, Vec<String>)>>,
}

/// One scripted reply.
#[cfg(test)]
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Succeed,
    Fail(ServiceError),
    /// Succeeds but drops the last vector.
    Truncated,
    /// Succeeds but the last vector is one component short.
    Ragged,
    /// Succeeds with every vector cut or padded to this dimension.
    Resized(usize),
}

#[cfg(test)]
impl ScriptedEmbeddingService {
    pub fn new() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn with_script(script: Vec<ScriptedReply>) -> Self {
        Self {
            script: std::sync::Mutex::new(script.into()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far, with the (virtual) time it arrived.
    pub fn calls(&self) -> Vec<(tokio::time::Instant, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn embed_text(text: &str) -> Vec<f32> {
        const THEMES: [&[&str]; 4] = [
            &["summer", "beach", "sun"],
            &["rain", "sad", "cry", "tears"],
            &["mom", "dad", "childhood", "home"],
            &["dance", "party", "club"],
        ];
        let lower = text.to_lowercase();
        let mut embedding = vec![0.05f32; 6];
        for (axis, words) in THEMES.iter().enumerate() {
            if words.iter().any(|word| lower.contains(word)) {
                embedding[axis] = 1.0;
            }
        }
        // Small per-text wobble so vectors are not identical
        embedding[4] += (lower.len() % 7) as f32 * 0.01;

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        embedding.iter().map(|x| x / magnitude).collect()
    }
}

#[cfg(test)]
#[async_trait]
impl EmbeddingService for ScriptedEmbeddingService {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push((tokio::time::Instant::now(), texts.to_vec()));
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptedReply::Succeed);

        match reply {
            ScriptedReply::Succeed => Ok(texts.iter().map(|t| Self::embed_text(t)).collect()),
            ScriptedReply::Fail(error) => Err(error),
            ScriptedReply::Truncated => {
                let mut vectors: Vec<Vec<f32>> =
                    texts.iter().map(|t| Self::embed_text(t)).collect();
                vectors.pop();
                Ok(vectors)
            }
            ScriptedReply::Ragged => {
                let mut vectors: Vec<Vec<f32>> =
                    texts.iter().map(|t| Self::embed_text(t)).collect();
                if let Some(last) = vectors.last_mut() {
                    last.pop();
                }
                Ok(vectors)
            }
            ScriptedReply::Resized(dimension) => Ok(texts
                .iter()
                .map(|t| {
                    let mut vector = Self::embed_text(t);
                    vector.resize(dimension, 0.1);
                    vector
                })
                .collect()),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
