//! Default tunables in one place.
//!
//! Everything here can be overridden through `ServerConfig` /
//! `SMRITI_*` environment variables; these are the fallbacks.

/// Approximate characters per token. Chunk windows are computed in
/// characters so the chunker stays deterministic without a tokenizer.
pub const CHARS_PER_TOKEN: usize = 4;

/// Default chunk window in tokens.
pub const DEFAULT_CHUNK_MAX_TOKENS: usize = 200;

/// Default overlap between consecutive chunks in tokens.
pub const DEFAULT_CHUNK_OVERLAP_TOKENS: usize = 50;

/// Default embedding dimension (MiniLM-class models).
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Default per-agent request budget per rate-limit window.
pub const DEFAULT_RATE_BUDGET: u32 = 60;

/// Default rate-limit window length in seconds.
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 60;

/// Default timeout for any external model call.
pub const DEFAULT_MODEL_TIMEOUT_MS: u64 = 10_000;

/// Default number of search results.
pub const DEFAULT_TOP_K: usize = 10;

/// Hard cap on requested search results.
pub const MAX_TOP_K: usize = 100;

/// Default lookback for lesson mining when no watermark exists yet.
pub const DEFAULT_MINING_LOOKBACK_DAYS: i64 = 7;

/// Cap on the aggregated corpus handed to the lesson distiller.
pub const MINING_MAX_CORPUS_CHARS: usize = 48_000;

/// Audit retention defaults.
pub const DEFAULT_AUDIT_RETENTION_DAYS: i64 = 90;
pub const DEFAULT_AUDIT_MAX_ENTRIES: usize = 10_000;

/// HTTP body size cap (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1_048_576;

/// Concurrent in-flight request cap.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 256;

/// Shutdown timeouts.
pub const GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
pub const DATABASE_FLUSH_TIMEOUT_SECS: u64 = 10;
