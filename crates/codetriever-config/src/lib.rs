//! Centralized configuration management for codetriever
//!
//! This crate provides a unified configuration system for the indexing
//! pipeline and query orchestrator. Configuration follows a simple
//! hierarchy:
//! 1. Safe defaults (defined as constants)
//! 2. Environment variable overrides
//! 3. Runtime validation

pub mod error;
pub mod profile;
pub mod source;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use profile::Profile;

// =============================================================================
// SAFE DEFAULTS - Work for any environment (dev, staging, prod, test)
// =============================================================================

// Embedding model configuration
const DEFAULT_EMBEDDING_MODEL_ID: &str = "jinaai/jina-embeddings-v2-base-code";
const DEFAULT_EMBEDDING_MODEL_DIMENSIONS: usize = 768; // JinaBERT v2 standard
const DEFAULT_EMBEDDING_MODEL_MAX_CONTEXT_TOKENS: usize = 512;
const DEFAULT_EMBEDDING_MODEL_POOL_SIZE: usize = 2;
const DEFAULT_EMBEDDING_USE_GPU: bool = true;

// Rate limiter presets (C4) - tokens/requests per minute
const DEFAULT_RATE_LIMIT_TPM: u64 = 1_000_000;
const DEFAULT_RATE_LIMIT_RPM: u64 = 500;

// Memory monitor / admission queue (C2/C3)
const DEFAULT_SAFE_THRESHOLD_PERCENT: f64 = 0.70;
const DEFAULT_MEMORY_RESERVE_MB: u64 = 384;
const DEFAULT_MIN_CONCURRENCY: usize = 1;
const DEFAULT_CHECK_INTERVAL_MS: u64 = 50;
const DEFAULT_HEAP_LIMIT_MB: u64 = 2048;

// Chunking (C1)
const DEFAULT_MAX_LINES_CODE: usize = 120;
const DEFAULT_MAX_LINES_DOCS: usize = 80;
const DEFAULT_MIN_LINES_FRACTION: f64 = 0.25;
const DEFAULT_OVERLAP_LINES: usize = 20;
const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024; // 10 MB

// Indexing pipeline (C8)
const DEFAULT_MAX_ERRORS: usize = 100;
const DEFAULT_EMBED_BATCH_TARGET_TOKENS: usize = 100_000;
const DEFAULT_EMBED_MAX_CONCURRENCY: usize = 5;
const DEFAULT_EMBED_MAX_RETRIES: u32 = 5;
const DEFAULT_EMBED_RETRY_DELAY_MS: u64 = 500;
const DEFAULT_STORAGE_BATCH_SIZE: usize = 100;
const DEFAULT_OVERLAY_TTL_SECS: u64 = 900;

// Query classifier / decomposer / gatherer (C9-C11)
const DEFAULT_AUTO_MAX_SUBQUERIES: usize = 3;
const DEFAULT_THINKING_MAX_SUBQUERIES: usize = 5;
const DEFAULT_AUTO_EVIDENCE_TOP_K: usize = 3;
const DEFAULT_THINKING_EVIDENCE_TOP_K: usize = 5;

// Completeness / orchestrator (C12, C16)
const DEFAULT_COMPLETENESS_SCORE_THRESHOLD: f64 = 0.6;
const DEFAULT_COMPLETENESS_TOP_THRESHOLD: f64 = 0.7;
const DEFAULT_THINKING_MAX_ITERATIONS: usize = 3;
const DEFAULT_INSTANT_UPGRADE_CONFIDENCE: f64 = 0.3;

// Compressor (C14)
const DEFAULT_MAX_RESPONSE_TOKENS: usize = 4000;
const DEFAULT_MAX_SNIPPET_LINES: usize = 40;
const DEFAULT_MAX_SOURCES: usize = 8;

// Query cache (C15)
const DEFAULT_CACHE_MAX_SIZE: usize = 100;
const DEFAULT_CACHE_TTL_INSTANT_SECS: u64 = 120;
const DEFAULT_CACHE_TTL_AUTO_SECS: u64 = 300;
const DEFAULT_CACHE_TTL_THINKING_SECS: u64 = 900;
const DEFAULT_CACHE_MIN_CONFIDENCE: f64 = 0.3;

// API server configuration
const DEFAULT_API_HOST: &str = "127.0.0.1";
const DEFAULT_API_PORT: u16 = 8787;
const DEFAULT_API_TIMEOUT_SECONDS: u64 = 60;

// Telemetry configuration
const DEFAULT_TELEMETRY_ENABLED: bool = false;
const DEFAULT_TRACING_LEVEL: &str = "info";
const DEFAULT_TELEMETRY_SERVICE_NAME: &str = "codetriever";
const DEFAULT_TELEMETRY_ENVIRONMENT: &str = "development";

/// Core configuration for the knowledge engine
///
/// All settings have safe defaults and can be overridden via environment
/// variables. No profile/environment selection is required for the engine to
/// run, but `Profile` still tags which deployment template produced a config.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    /// Which deployment profile produced this config
    #[serde(default)]
    pub profile: Profile,

    /// Embedding generation configuration
    pub embedding: EmbeddingConfig,

    /// Chunking / ChunkerRegistry configuration (C1)
    pub chunking: ChunkingConfig,

    /// Memory monitor + admission queue configuration (C2/C3)
    pub memory: MemoryConfig,

    /// Rate limiter configuration (C4)
    pub rate_limit: RateLimitConfig,

    /// Vector storage configuration (C5)
    pub vector_storage: VectorStorageConfig,

    /// Indexing pipeline configuration (C8)
    pub indexing: IndexingConfig,

    /// Overlay manager configuration (C8 incremental path)
    pub overlay: OverlayConfig,

    /// Query classifier / decomposer / gatherer configuration (C9-C11)
    pub retrieval: RetrievalConfig,

    /// Completeness checker + orchestrator configuration (C12, C16)
    pub orchestrator: OrchestratorConfig,

    /// Compressor configuration (C14)
    pub compressor: CompressorConfig,

    /// Query cache configuration (C15)
    pub cache: CacheConfig,

    /// API server configuration
    pub api: ApiConfig,

    /// Telemetry and observability configuration
    pub telemetry: TelemetryConfig,
}

/// Embedding configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding provider (local candle model or remote API)
    pub provider: EmbeddingProvider,
    /// Model identifier, e.g. `jinaai/jina-embeddings-v2-base-code`
    pub model_id: String,
    /// Maximum tokens the model can process in a single input
    pub max_tokens: usize,
    /// Embedding dimensions produced by this model
    pub dimensions: usize,
    /// Number of embedding model instances in the pool
    pub pool_size: usize,
    /// Whether to use GPU acceleration if available (Metal/CUDA)
    pub use_gpu: bool,
    /// Cache directory for downloaded models
    pub cache_dir: Option<String>,
}

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EmbeddingProvider {
    /// Local model provider using the Candle framework
    #[serde(rename = "local")]
    Local,
    /// Remote API provider for cloud-based inference
    #[serde(rename = "remote")]
    Remote,
}

impl Default for EmbeddingProvider {
    fn default() -> Self {
        Self::Local
    }
}

impl EmbeddingConfig {
    fn from_env() -> Self {
        let provider = std::env::var("CODETRIEVER_EMBEDDING_PROVIDER")
            .ok()
            .and_then(|s| match s.as_str() {
                "local" => Some(EmbeddingProvider::Local),
                "remote" => Some(EmbeddingProvider::Remote),
                _ => None,
            })
            .unwrap_or_default();

        let model_id = std::env::var("CODETRIEVER_EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL_ID.to_string());

        let max_tokens = env_parsed(
            "CODETRIEVER_EMBEDDING_MAX_TOKENS",
            DEFAULT_EMBEDDING_MODEL_MAX_CONTEXT_TOKENS,
        );

        let dimensions = env_parsed(
            "CODETRIEVER_EMBEDDING_DIMENSION",
            DEFAULT_EMBEDDING_MODEL_DIMENSIONS,
        );

        let pool_size = env_parsed(
            "CODETRIEVER_EMBEDDING_POOL_SIZE",
            DEFAULT_EMBEDDING_MODEL_POOL_SIZE,
        );

        let use_gpu = env_parsed("CODETRIEVER_EMBEDDING_USE_GPU", DEFAULT_EMBEDDING_USE_GPU);

        let cache_dir = std::env::var("CODETRIEVER_EMBEDDING_CACHE_DIR").ok().or_else(|| {
            Some(
                dirs::cache_dir()
                    .unwrap_or_else(|| std::path::PathBuf::from(".cache"))
                    .join("codetriever")
                    .to_string_lossy()
                    .to_string(),
            )
        });

        Self {
            provider,
            model_id,
            max_tokens,
            dimensions,
            pool_size,
            use_gpu,
            cache_dir,
        }
    }
}

impl validation::Validate for EmbeddingConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_non_empty(&self.model_id, "embedding.model_id")?;
        validation::validate_range(self.max_tokens as u64, 1, 100_000, "embedding.max_tokens")?;
        validation::validate_range(self.dimensions as u64, 1, 10_000, "embedding.dimensions")?;
        validation::validate_range(self.pool_size as u64, 1, 64, "embedding.pool_size")?;
        Ok(())
    }
}

/// Chunking configuration (ChunkerRegistry, C1)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChunkingConfig {
    /// Maximum lines per chunk for code fallback chunking
    pub max_lines_code: usize,
    /// Maximum lines per chunk for docs fallback chunking
    pub max_lines_docs: usize,
    /// Minimum lines per chunk, as a fraction of the relevant max
    pub min_lines_fraction: f64,
    /// Line overlap between consecutive fallback chunks
    pub overlap_lines: usize,
    /// Files larger than this are rejected before reading
    pub max_file_bytes: u64,
}

impl ChunkingConfig {
    fn from_env() -> Self {
        Self {
            max_lines_code: env_parsed("CODETRIEVER_CHUNK_MAX_LINES_CODE", DEFAULT_MAX_LINES_CODE),
            max_lines_docs: env_parsed("CODETRIEVER_CHUNK_MAX_LINES_DOCS", DEFAULT_MAX_LINES_DOCS),
            min_lines_fraction: env_parsed(
                "CODETRIEVER_CHUNK_MIN_LINES_FRACTION",
                DEFAULT_MIN_LINES_FRACTION,
            ),
            overlap_lines: env_parsed("CODETRIEVER_CHUNK_OVERLAP_LINES", DEFAULT_OVERLAP_LINES),
            max_file_bytes: env_parsed("CODETRIEVER_CHUNK_MAX_FILE_BYTES", DEFAULT_MAX_FILE_BYTES),
        }
    }

    /// Minimum chunk length in lines for the code fallback chunker
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn min_lines_code(&self) -> usize {
        ((self.max_lines_code as f64) * self.min_lines_fraction).round() as usize
    }

    /// Minimum chunk length in lines for the docs fallback chunker
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn min_lines_docs(&self) -> usize {
        ((self.max_lines_docs as f64) * self.min_lines_fraction).round() as usize
    }
}

impl validation::Validate for ChunkingConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(self.max_lines_code as u64, 1, 10_000, "chunking.max_lines_code")?;
        validation::validate_range(self.max_lines_docs as u64, 1, 10_000, "chunking.max_lines_docs")?;
        validation::validate_range(self.overlap_lines as u64, 0, 1000, "chunking.overlap_lines")?;
        validation::validate_range(self.max_file_bytes, 1, u64::MAX, "chunking.max_file_bytes")?;
        Ok(())
    }
}

/// Memory monitor + admission queue configuration (C2/C3)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MemoryConfig {
    /// Fraction of `heap_limit_mb` that is safe to use (admission formula)
    pub safe_threshold: f64,
    /// Reserve held back from the safe threshold, in MB
    pub reserve_mb: u64,
    /// Heap limit assumed for self-reported accounting, in MB
    pub heap_limit_mb: u64,
    /// Always admit at least this many tasks even under pressure
    pub min_concurrency: usize,
    /// Poll interval while waiting for headroom
    pub check_interval_ms: u64,
}

impl MemoryConfig {
    fn from_env() -> Self {
        Self {
            safe_threshold: env_parsed(
                "CODETRIEVER_MEMORY_SAFE_THRESHOLD",
                DEFAULT_SAFE_THRESHOLD_PERCENT,
            ),
            reserve_mb: env_parsed("CODETRIEVER_MEMORY_RESERVE_MB", DEFAULT_MEMORY_RESERVE_MB),
            heap_limit_mb: env_parsed("CODETRIEVER_MEMORY_HEAP_LIMIT_MB", DEFAULT_HEAP_LIMIT_MB),
            min_concurrency: env_parsed(
                "CODETRIEVER_MEMORY_MIN_CONCURRENCY",
                DEFAULT_MIN_CONCURRENCY,
            ),
            check_interval_ms: env_parsed(
                "CODETRIEVER_MEMORY_CHECK_INTERVAL_MS",
                DEFAULT_CHECK_INTERVAL_MS,
            ),
        }
    }
}

impl validation::Validate for MemoryConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.safe_threshold <= 0.0 || self.safe_threshold > 1.0 {
            return Err(ConfigError::Generic {
                message: format!(
                    "memory.safe_threshold must be in (0, 1], got {}",
                    self.safe_threshold
                ),
            });
        }
        validation::validate_range(self.heap_limit_mb, 1, u64::MAX, "memory.heap_limit_mb")?;
        validation::validate_range(
            self.min_concurrency as u64,
            1,
            1000,
            "memory.min_concurrency",
        )?;
        Ok(())
    }
}

/// Rate limiter configuration (C4)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RateLimitConfig {
    /// Tokens per minute
    pub tpm: u64,
    /// Requests per minute
    pub rpm: u64,
}

impl RateLimitConfig {
    fn from_env() -> Self {
        Self {
            tpm: env_parsed("CODETRIEVER_RATE_LIMIT_TPM", DEFAULT_RATE_LIMIT_TPM),
            rpm: env_parsed("CODETRIEVER_RATE_LIMIT_RPM", DEFAULT_RATE_LIMIT_RPM),
        }
    }

    /// Preset for a named provider tier, matching the teacher's documented
    /// tiers (`tier1`, `tier2`, `free`).
    #[must_use]
    pub fn preset(name: &str) -> Self {
        match name {
            "tier2" => Self {
                tpm: 2_000_000,
                rpm: 2_000,
            },
            "free" => Self {
                tpm: 40_000,
                rpm: 20,
            },
            _ => Self {
                tpm: DEFAULT_RATE_LIMIT_TPM,
                rpm: DEFAULT_RATE_LIMIT_RPM,
            },
        }
    }
}

impl validation::Validate for RateLimitConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(self.tpm, 1, u64::MAX, "rate_limit.tpm")?;
        validation::validate_range(self.rpm, 1, u64::MAX, "rate_limit.rpm")?;
        Ok(())
    }
}

/// Vector storage configuration (C5)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VectorStorageConfig {
    /// Storage backend selector
    pub backend: VectorBackend,
    /// Qdrant server URL (only used when `backend == Qdrant`)
    pub url: String,
    /// Collection name
    pub collection_name: String,
    /// Vector dimensions (must match `embedding.dimensions`)
    pub vector_dimension: usize,
    /// Connection timeout in seconds
    pub timeout_seconds: u64,
    /// Root directory for local flat-store persistence and workspace indexes
    pub workspace_root: String,
}

/// Vector storage backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VectorBackend {
    /// In-process flat store, data lives under `workspace_root`
    #[serde(rename = "local")]
    Local,
    /// External Qdrant service
    #[serde(rename = "qdrant")]
    Qdrant,
}

impl Default for VectorBackend {
    fn default() -> Self {
        Self::Local
    }
}

impl VectorStorageConfig {
    fn from_env() -> Self {
        let backend = std::env::var("CODETRIEVER_VECTOR_STORAGE_BACKEND")
            .ok()
            .and_then(|s| match s.as_str() {
                "qdrant" => Some(VectorBackend::Qdrant),
                "local" => Some(VectorBackend::Local),
                _ => None,
            })
            .unwrap_or_default();

        Self {
            backend,
            url: std::env::var("CODETRIEVER_VECTOR_STORAGE_URL")
                .unwrap_or_else(|_| "http://localhost:6334".to_string()),
            collection_name: std::env::var("CODETRIEVER_VECTOR_STORAGE_COLLECTION_NAME")
                .unwrap_or_else(|_| "codetriever".to_string()),
            vector_dimension: env_parsed(
                "CODETRIEVER_VECTOR_STORAGE_DIMENSION",
                DEFAULT_EMBEDDING_MODEL_DIMENSIONS,
            ),
            timeout_seconds: env_parsed("CODETRIEVER_VECTOR_STORAGE_TIMEOUT_SECONDS", 30u64),
            workspace_root: std::env::var("CODETRIEVER_WORKSPACE_ROOT")
                .unwrap_or_else(|_| ".".to_string()),
        }
    }
}

impl validation::Validate for VectorStorageConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.backend == VectorBackend::Qdrant {
            validation::validate_url(&self.url, "vector_storage.url")?;
        }
        validation::validate_non_empty(&self.collection_name, "vector_storage.collection_name")?;
        validation::validate_range(
            self.vector_dimension as u64,
            1,
            10_000,
            "vector_storage.vector_dimension",
        )?;
        Ok(())
    }
}

/// Indexing pipeline configuration (C8)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IndexingConfig {
    /// Abort the pipeline once this many per-file errors have accumulated
    pub max_errors: usize,
    /// Target tokens per embedding batch (~4 chars/token estimator)
    pub embed_batch_target_tokens: usize,
    /// Bounded parallel embedding workers
    pub embed_max_concurrency: usize,
    /// Maximum retry attempts for a failing embedding batch
    pub embed_max_retries: u32,
    /// Base retry delay; doubled per attempt
    pub embed_retry_delay_ms: u64,
    /// Batch size for storage upserts
    pub storage_batch_size: usize,
}

impl IndexingConfig {
    fn from_env() -> Self {
        Self {
            max_errors: env_parsed("CODETRIEVER_INDEXING_MAX_ERRORS", DEFAULT_MAX_ERRORS),
            embed_batch_target_tokens: env_parsed(
                "CODETRIEVER_INDEXING_EMBED_BATCH_TARGET_TOKENS",
                DEFAULT_EMBED_BATCH_TARGET_TOKENS,
            ),
            embed_max_concurrency: env_parsed(
                "CODETRIEVER_INDEXING_EMBED_MAX_CONCURRENCY",
                DEFAULT_EMBED_MAX_CONCURRENCY,
            ),
            embed_max_retries: env_parsed(
                "CODETRIEVER_INDEXING_EMBED_MAX_RETRIES",
                DEFAULT_EMBED_MAX_RETRIES,
            ),
            embed_retry_delay_ms: env_parsed(
                "CODETRIEVER_INDEXING_EMBED_RETRY_DELAY_MS",
                DEFAULT_EMBED_RETRY_DELAY_MS,
            ),
            storage_batch_size: env_parsed(
                "CODETRIEVER_INDEXING_STORAGE_BATCH_SIZE",
                DEFAULT_STORAGE_BATCH_SIZE,
            ),
        }
    }
}

impl validation::Validate for IndexingConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(self.max_errors as u64, 1, 1_000_000, "indexing.max_errors")?;
        validation::validate_range(
            self.embed_max_concurrency as u64,
            1,
            1000,
            "indexing.embed_max_concurrency",
        )?;
        validation::validate_range(
            self.storage_batch_size as u64,
            1,
            10_000,
            "indexing.storage_batch_size",
        )?;
        Ok(())
    }
}

/// Overlay manager configuration: incremental local changes layered over a
/// committed base index (spec §4.5).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OverlayConfig {
    /// Rebuild the overlay once it is older than this, in seconds, even if
    /// nothing else has invalidated it
    pub ttl_secs: u64,
}

impl OverlayConfig {
    fn from_env() -> Self {
        Self {
            ttl_secs: env_parsed("CODETRIEVER_OVERLAY_TTL_SECS", DEFAULT_OVERLAY_TTL_SECS),
        }
    }
}

impl validation::Validate for OverlayConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(self.ttl_secs, 1, 86_400, "overlay.ttl_secs")?;
        Ok(())
    }
}

/// Query classifier / decomposer / gatherer configuration (C9-C11)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetrievalConfig {
    /// Maximum sub-queries for auto mode
    pub auto_max_subqueries: usize,
    /// Maximum sub-queries for thinking mode
    pub thinking_max_subqueries: usize,
    /// Evidence-guarantee top-k for auto mode
    pub auto_evidence_top_k: usize,
    /// Evidence-guarantee top-k for thinking mode
    pub thinking_evidence_top_k: usize,
    /// Reranker tuning weights (policy, not invariants - see rerank module)
    pub rerank: RerankWeights,
}

/// Reranker tuning constants (spec.md §9: "policy, not invariants")
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RerankWeights {
    /// Per-identifier-hit multiplier step, capped by `identifier_hit_cap`
    pub identifier_hit_step: f64,
    /// Cap on the cumulative identifier-hit bonus
    pub identifier_hit_cap: f64,
    /// Code/config boost in thinking mode
    pub code_boost_thinking: f64,
    /// Code/config boost in auto mode
    pub code_boost_auto: f64,
    /// Doc penalty (no identifier hits) in thinking mode
    pub doc_penalty_thinking: f64,
    /// Doc penalty (no identifier hits) in auto mode
    pub doc_penalty_auto: f64,
    /// ADR boost on architecture queries
    pub adr_boost: f64,
    /// Penalty for plan/improvement/todo/task docs
    pub planning_doc_penalty: f64,
    /// Boost for CLI/command/package.json chunks on command-like queries
    pub command_boost: f64,
    /// Penalty for bare docs on command-like queries
    pub bare_docs_penalty: f64,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            identifier_hit_step: 0.25,
            identifier_hit_cap: 0.5,
            code_boost_thinking: 1.2,
            code_boost_auto: 1.1,
            doc_penalty_thinking: 0.72,
            doc_penalty_auto: 0.85,
            adr_boost: 1.14,
            planning_doc_penalty: 0.80,
            command_boost: 1.16,
            bare_docs_penalty: 0.84,
        }
    }
}

impl RetrievalConfig {
    fn from_env() -> Self {
        Self {
            auto_max_subqueries: env_parsed(
                "CODETRIEVER_RETRIEVAL_AUTO_MAX_SUBQUERIES",
                DEFAULT_AUTO_MAX_SUBQUERIES,
            ),
            thinking_max_subqueries: env_parsed(
                "CODETRIEVER_RETRIEVAL_THINKING_MAX_SUBQUERIES",
                DEFAULT_THINKING_MAX_SUBQUERIES,
            ),
            auto_evidence_top_k: env_parsed(
                "CODETRIEVER_RETRIEVAL_AUTO_EVIDENCE_TOP_K",
                DEFAULT_AUTO_EVIDENCE_TOP_K,
            ),
            thinking_evidence_top_k: env_parsed(
                "CODETRIEVER_RETRIEVAL_THINKING_EVIDENCE_TOP_K",
                DEFAULT_THINKING_EVIDENCE_TOP_K,
            ),
            rerank: RerankWeights::default(),
        }
    }
}

impl validation::Validate for RetrievalConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(
            self.auto_max_subqueries as u64,
            1,
            50,
            "retrieval.auto_max_subqueries",
        )?;
        validation::validate_range(
            self.thinking_max_subqueries as u64,
            1,
            50,
            "retrieval.thinking_max_subqueries",
        )?;
        Ok(())
    }
}

/// Completeness checker + orchestrator configuration (C12, C16)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OrchestratorConfig {
    /// Instant-mode completeness heuristic threshold on the composite score
    pub completeness_score_threshold: f64,
    /// Instant-mode completeness heuristic threshold on `top`
    pub completeness_top_threshold: f64,
    /// Maximum completeness iterations in thinking mode
    pub thinking_max_iterations: usize,
    /// Confidence below which instant transparently upgrades to auto
    pub instant_upgrade_confidence: f64,
}

impl OrchestratorConfig {
    fn from_env() -> Self {
        Self {
            completeness_score_threshold: env_parsed(
                "CODETRIEVER_ORCHESTRATOR_COMPLETENESS_SCORE_THRESHOLD",
                DEFAULT_COMPLETENESS_SCORE_THRESHOLD,
            ),
            completeness_top_threshold: env_parsed(
                "CODETRIEVER_ORCHESTRATOR_COMPLETENESS_TOP_THRESHOLD",
                DEFAULT_COMPLETENESS_TOP_THRESHOLD,
            ),
            thinking_max_iterations: env_parsed(
                "CODETRIEVER_ORCHESTRATOR_THINKING_MAX_ITERATIONS",
                DEFAULT_THINKING_MAX_ITERATIONS,
            ),
            instant_upgrade_confidence: env_parsed(
                "CODETRIEVER_ORCHESTRATOR_INSTANT_UPGRADE_CONFIDENCE",
                DEFAULT_INSTANT_UPGRADE_CONFIDENCE,
            ),
        }
    }
}

impl validation::Validate for OrchestratorConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(
            self.thinking_max_iterations as u64,
            1,
            100,
            "orchestrator.thinking_max_iterations",
        )?;
        Ok(())
    }
}

/// Compressor configuration (C14)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompressorConfig {
    /// Token budget for the final response
    pub max_response_tokens: usize,
    /// Max lines kept per snippet under the truncate strategy
    pub max_snippet_lines: usize,
    /// Max sources kept under the reduce-sources strategy
    pub max_sources: usize,
}

impl CompressorConfig {
    fn from_env() -> Self {
        Self {
            max_response_tokens: env_parsed(
                "CODETRIEVER_COMPRESSOR_MAX_RESPONSE_TOKENS",
                DEFAULT_MAX_RESPONSE_TOKENS,
            ),
            max_snippet_lines: env_parsed(
                "CODETRIEVER_COMPRESSOR_MAX_SNIPPET_LINES",
                DEFAULT_MAX_SNIPPET_LINES,
            ),
            max_sources: env_parsed("CODETRIEVER_COMPRESSOR_MAX_SOURCES", DEFAULT_MAX_SOURCES),
        }
    }
}

impl validation::Validate for CompressorConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(
            self.max_response_tokens as u64,
            100,
            1_000_000,
            "compressor.max_response_tokens",
        )?;
        Ok(())
    }
}

/// Query cache configuration (C15)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries per scope partition
    pub max_size: usize,
    /// TTL for instant-mode entries, in seconds
    pub ttl_instant_secs: u64,
    /// TTL for auto-mode entries, in seconds
    pub ttl_auto_secs: u64,
    /// TTL for thinking-mode entries, in seconds
    pub ttl_thinking_secs: u64,
    /// Entries below this confidence are never stored
    pub min_confidence: f64,
}

impl CacheConfig {
    fn from_env() -> Self {
        Self {
            max_size: env_parsed("CODETRIEVER_CACHE_MAX_SIZE", DEFAULT_CACHE_MAX_SIZE),
            ttl_instant_secs: env_parsed(
                "CODETRIEVER_CACHE_TTL_INSTANT_SECS",
                DEFAULT_CACHE_TTL_INSTANT_SECS,
            ),
            ttl_auto_secs: env_parsed(
                "CODETRIEVER_CACHE_TTL_AUTO_SECS",
                DEFAULT_CACHE_TTL_AUTO_SECS,
            ),
            ttl_thinking_secs: env_parsed(
                "CODETRIEVER_CACHE_TTL_THINKING_SECS",
                DEFAULT_CACHE_TTL_THINKING_SECS,
            ),
            min_confidence: env_parsed(
                "CODETRIEVER_CACHE_MIN_CONFIDENCE",
                DEFAULT_CACHE_MIN_CONFIDENCE,
            ),
        }
    }
}

impl validation::Validate for CacheConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(self.max_size as u64, 1, 1_000_000, "cache.max_size")?;
        Ok(())
    }
}

/// API server configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl ApiConfig {
    fn from_env() -> Self {
        Self {
            host: std::env::var("CODETRIEVER_API_HOST")
                .unwrap_or_else(|_| DEFAULT_API_HOST.to_string()),
            port: env_parsed("CODETRIEVER_API_PORT", DEFAULT_API_PORT),
            timeout_seconds: env_parsed(
                "CODETRIEVER_API_TIMEOUT_SECONDS",
                DEFAULT_API_TIMEOUT_SECONDS,
            ),
        }
    }
}

impl validation::Validate for ApiConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_non_empty(&self.host, "api.host")?;
        if self.port != 0 {
            validation::validate_port(self.port, "api.port")?;
        }
        validation::validate_range(self.timeout_seconds, 1, 3600, "api.timeout_seconds")?;
        Ok(())
    }
}

/// Telemetry and observability configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetryConfig {
    /// Enable telemetry collection
    pub enabled: bool,
    /// Tracing level (trace, debug, info, warn, error)
    pub tracing_level: String,
    /// Service name for telemetry
    pub service_name: String,
    /// Environment label for telemetry
    pub environment: String,
}

impl TelemetryConfig {
    fn from_env() -> Self {
        Self {
            enabled: env_parsed("CODETRIEVER_TELEMETRY_ENABLED", DEFAULT_TELEMETRY_ENABLED),
            tracing_level: std::env::var("CODETRIEVER_TELEMETRY_TRACING_LEVEL")
                .unwrap_or_else(|_| DEFAULT_TRACING_LEVEL.to_string()),
            service_name: std::env::var("CODETRIEVER_TELEMETRY_SERVICE_NAME")
                .unwrap_or_else(|_| DEFAULT_TELEMETRY_SERVICE_NAME.to_string()),
            environment: std::env::var("CODETRIEVER_TELEMETRY_ENVIRONMENT")
                .unwrap_or_else(|_| DEFAULT_TELEMETRY_ENVIRONMENT.to_string()),
        }
    }
}

impl validation::Validate for TelemetryConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_non_empty(&self.service_name, "telemetry.service_name")?;
        match self.tracing_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(ConfigError::Generic {
                message: format!("Invalid tracing level: {}", self.tracing_level),
            }),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with safe defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            profile: std::env::var("CODETRIEVER_PROFILE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            embedding: EmbeddingConfig::from_env(),
            chunking: ChunkingConfig::from_env(),
            memory: MemoryConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            vector_storage: VectorStorageConfig::from_env(),
            indexing: IndexingConfig::from_env(),
            overlay: OverlayConfig::from_env(),
            retrieval: RetrievalConfig::from_env(),
            orchestrator: OrchestratorConfig::from_env(),
            compressor: CompressorConfig::from_env(),
            cache: CacheConfig::from_env(),
            api: ApiConfig::from_env(),
            telemetry: TelemetryConfig::from_env(),
        }
    }

    /// A stable hash of every setting that affects chunking, embedding, or
    /// reranking output, used as `engine_config_hash` in the Manifest and as
    /// a QueryCache key component.
    #[must_use]
    pub fn engine_config_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.embedding.model_id.as_bytes());
        hasher.update(self.embedding.dimensions.to_le_bytes());
        hasher.update(self.embedding.max_tokens.to_le_bytes());
        hasher.update(self.chunking.max_lines_code.to_le_bytes());
        hasher.update(self.chunking.max_lines_docs.to_le_bytes());
        hasher.update(self.chunking.overlap_lines.to_le_bytes());
        hasher.update(self.retrieval.rerank.identifier_hit_step.to_le_bytes());
        hasher.update(self.retrieval.rerank.adr_boost.to_le_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect::<String>()
    }
}

impl validation::Validate for EngineConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.embedding.validate()?;
        self.chunking.validate()?;
        self.memory.validate()?;
        self.rate_limit.validate()?;
        self.vector_storage.validate()?;
        self.indexing.validate()?;
        self.overlay.validate()?;
        self.retrieval.validate()?;
        self.orchestrator.validate()?;
        self.compressor.validate()?;
        self.cache.validate()?;
        self.api.validate()?;
        self.telemetry.validate()?;

        if self.embedding.dimensions != self.vector_storage.vector_dimension {
            return Err(ConfigError::Generic {
                message: format!(
                    "Embedding dimension ({}) must match vector storage dimension ({})",
                    self.embedding.dimensions, self.vector_storage.vector_dimension
                ),
            });
        }

        Ok(())
    }
}

/// Parse an environment variable into `T`, falling back to `default` when the
/// variable is unset or unparsable.
fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Validate;

    #[test]
    fn from_env_creates_valid_config() {
        let config = EngineConfig::from_env();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_rerank_weights_match_the_documented_constants() {
        let weights = RerankWeights::default();
        assert!((weights.code_boost_thinking - 1.2).abs() < f64::EPSILON);
        assert!((weights.code_boost_auto - 1.1).abs() < f64::EPSILON);
        assert!((weights.adr_boost - 1.14).abs() < f64::EPSILON);
        assert!((weights.command_boost - 1.16).abs() < f64::EPSILON);
    }

    #[test]
    fn cross_field_validation_catches_dimension_mismatch() {
        let mut config = EngineConfig::from_env();
        config.embedding.dimensions = 512;
        config.vector_storage.vector_dimension = 256;
        assert!(config.validate().is_err());
    }

    #[test]
    fn engine_config_hash_is_stable_for_identical_configs() {
        let a = EngineConfig::from_env();
        let b = EngineConfig::from_env();
        assert_eq!(a.engine_config_hash(), b.engine_config_hash());
    }

    #[test]
    fn engine_config_hash_changes_with_chunking_settings() {
        let a = EngineConfig::from_env();
        let mut b = EngineConfig::from_env();
        b.chunking.max_lines_code += 1;
        assert_ne!(a.engine_config_hash(), b.engine_config_hash());
    }

    #[test]
    fn chunking_min_lines_uses_configured_fraction() {
        let config = ChunkingConfig::from_env();
        assert_eq!(config.min_lines_code(), 30); // 120 * 0.25
        assert_eq!(config.min_lines_docs(), 20); // 80 * 0.25
    }

    #[test]
    fn rate_limit_presets_are_distinct() {
        let tier1 = RateLimitConfig::preset("tier1");
        let free = RateLimitConfig::preset("free");
        assert!(tier1.tpm > free.tpm);
        assert!(tier1.rpm > free.rpm);
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let config = EngineConfig::from_env();
        let toml_string = toml::to_string(&config).expect("serialize");
        let parsed: EngineConfig = toml::from_str(&toml_string).expect("deserialize");
        assert_eq!(config.embedding.model_id, parsed.embedding.model_id);
        assert!(parsed.validate().is_ok());
    }
}
