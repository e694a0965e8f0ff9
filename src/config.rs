//! Configuration for the analysis pipeline.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.chorus/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CHORUS_` and use double
//! underscores to separate nested levels:
//! - `CHORUS_EMBEDDING__BATCH_SIZE=25` sets `embedding.batch_size`
//! - `CHORUS_CLUSTERING__SEED=7` sets `clustering.seed`
//! - `CHORUS_LOGGING__LEVEL=debug` sets `logging.level`

use crate::vector::{
    ClusterEngine, ClusterLevels, EmbeddingError, FetchConfig, HttpEmbeddingService, LevelBounds,
};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = ".chorus";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "CHORUS_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Global debug mode
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    /// Sample sizes handed to naming and claim collaborators
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible embeddings endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Characters kept per text after normalization
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Attempts per batch when rate limited, first request included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClusteringConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Distance to centroid above which a member counts as dissenting
    #[serde(default = "default_dissent_threshold")]
    pub dissent_threshold: f32,

    #[serde(default = "default_fine_divisor")]
    pub fine_divisor: usize,
    #[serde(default = "default_fine_min")]
    pub fine_min: usize,
    #[serde(default = "default_fine_max")]
    pub fine_max: usize,

    #[serde(default = "default_coarse_divisor")]
    pub coarse_divisor: usize,
    #[serde(default = "default_coarse_min")]
    pub coarse_min: usize,
    #[serde(default = "default_coarse_max")]
    pub coarse_max: usize,

    /// Pins the seeding pick; unset means a fresh random seed per run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct CollaboratorsConfig {
    #[serde(default = "default_naming_sample")]
    pub naming_sample: usize,
    #[serde(default = "default_naming_chars")]
    pub naming_chars: usize,
    #[serde(default = "default_claims_sample")]
    pub claims_sample: usize,
    #[serde(default = "default_claims_chars")]
    pub claims_chars: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    crate::vector::DEFAULT_BATCH_SIZE
}
fn default_max_chars() -> usize {
    crate::text::MAX_EMBEDDING_CHARS
}
fn default_max_attempts() -> usize {
    crate::vector::DEFAULT_MAX_ATTEMPTS
}
fn default_backoff_ms() -> u64 {
    2000
}
fn default_inter_batch_delay_ms() -> u64 {
    200
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_iterations() -> usize {
    crate::vector::DEFAULT_MAX_ITERATIONS
}
fn default_dissent_threshold() -> f32 {
    crate::vector::DEFAULT_DISSENT_THRESHOLD
}
fn default_fine_divisor() -> usize {
    5
}
fn default_fine_min() -> usize {
    3
}
fn default_fine_max() -> usize {
    15
}
fn default_coarse_divisor() -> usize {
    15
}
fn default_coarse_min() -> usize {
    2
}
fn default_coarse_max() -> usize {
    7
}
fn default_naming_sample() -> usize {
    10
}
fn default_naming_chars() -> usize {
    150
}
fn default_claims_sample() -> usize {
    5
}
fn default_claims_chars() -> usize {
    100
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            debug: false,
            embedding: EmbeddingConfig::default(),
            clustering: ClusteringConfig::default(),
            collaborators: CollaboratorsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_embedding_model(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            max_chars: default_max_chars(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            dissent_threshold: default_dissent_threshold(),
            fine_divisor: default_fine_divisor(),
            fine_min: default_fine_min(),
            fine_max: default_fine_max(),
            coarse_divisor: default_coarse_divisor(),
            coarse_min: default_coarse_min(),
            coarse_max: default_coarse_max(),
            seed: None,
        }
    }
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            naming_sample: default_naming_sample(),
            naming_chars: default_naming_chars(),
            claims_sample: default_claims_sample(),
            claims_chars: default_claims_chars(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl EmbeddingConfig {
    /// Batching parameters for the fetcher.
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            batch_size: self.batch_size,
            max_chars: self.max_chars,
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.backoff_ms),
            inter_batch_delay: Duration::from_millis(self.inter_batch_delay_ms),
        }
    }

    /// API key read from the configured environment variable, if set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// HTTP client for the configured endpoint.
    pub fn http_service(&self) -> Result<HttpEmbeddingService, EmbeddingError> {
        HttpEmbeddingService::new(
            self.endpoint.clone(),
            self.model.clone(),
            self.api_key(),
            Duration::from_secs(self.request_timeout_secs),
        )
    }
}

impl ClusteringConfig {
    pub fn levels(&self) -> ClusterLevels {
        ClusterLevels {
            fine: LevelBounds::new(self.fine_divisor, self.fine_min, self.fine_max),
            coarse: LevelBounds::new(self.coarse_divisor, self.coarse_min, self.coarse_max),
        }
    }

    pub fn engine(&self) -> ClusterEngine {
        let engine = ClusterEngine::new().with_max_iterations(self.max_iterations);
        match self.seed {
            Some(seed) => engine.with_seed(seed),
            None => engine,
        }
    }
}

fn env_provider() -> Env {
    // Double underscore separates nested levels, single underscore stays
    Env::prefixed(ENV_PREFIX).map(|key| key.as_str().to_lowercase().replace("__", ".").into())
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(env_provider())
            .extract()
            .map_err(Box::new)
    }

    /// Find `.chorus/settings.toml` from the current directory upwards
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(CONFIG_FILE))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Render the effective settings as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Create `.chorus/settings.toml` in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        Self::init_config_file_in(Path::new("."), force)
    }

    /// Create a default settings file with helpful comments under `root`
    pub fn init_config_file_in(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&config_path, SETTINGS_TEMPLATE)?;
        Ok(config_path)
    }
}

const SETTINGS_TEMPLATE: &str = r#"# Chorus Configuration File

# Version of the configuration schema
version = 1

# Global debug mode
debug = false

[embedding]
# OpenAI-compatible embeddings endpoint
endpoint = "https://api.openai.com/v1/embeddings"
model = "text-embedding-3-small"

# Environment variable that holds the API key
api_key_env = "OPENAI_API_KEY"

# Texts per request
batch_size = 50

# Texts are truncated to this many characters
max_chars = 8000

# Attempts per batch when the service rate limits, first request included
max_attempts = 3

# Wait after a rate-limit response, in milliseconds
backoff_ms = 2000

# Pause between successful batches, in milliseconds
inter_batch_delay_ms = 200

request_timeout_secs = 30

[clustering]
max_iterations = 20

# Members farther than this from their centroid are reported as dissenting
dissent_threshold = 0.3

# Fine clusters: clamp(n / fine_divisor, fine_min, fine_max)
fine_divisor = 5
fine_min = 3
fine_max = 15

# Coarse clusters: clamp(n / coarse_divisor, coarse_min, coarse_max)
coarse_divisor = 15
coarse_min = 2
coarse_max = 7

# Uncomment for reproducible clustering
# seed = 42

[collaborators]
# Sample handed to the cluster namer
naming_sample = 10
naming_chars = 150

# Sample handed to the claim writer
claims_sample = 5
claims_chars = 100

[logging]
# Used when RUST_LOG is not set
level = "warn"
"#;
