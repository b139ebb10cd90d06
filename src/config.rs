//! Configuration management
//!
//! All configurable parameters in one place with environment variable
//! overrides. Sensible defaults, configurable in production; the
//! effective configuration is logged at startup.
//!
//! The enrichment models are configured *per task type* so an operator
//! can point summarization, embedding, entity extraction, and lesson
//! distillation at different providers independently.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::chunking::ChunkSettings;
use crate::constants::*;

/// Which enrichment task a model configuration serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTask {
    Summarize,
    Embed,
    Extract,
    Distill,
}

impl ModelTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTask::Summarize => "summarize",
            ModelTask::Embed => "embed",
            ModelTask::Extract => "extract",
            ModelTask::Distill => "distill",
        }
    }

    fn env_infix(&self) -> &'static str {
        match self {
            ModelTask::Summarize => "SUMMARIZE",
            ModelTask::Embed => "EMBED",
            ModelTask::Extract => "EXTRACT",
            ModelTask::Distill => "DISTILL",
        }
    }
}

/// Endpoint + credential for one task type.
#[derive(Debug, Clone)]
pub struct ModelTaskConfig {
    pub provider: String,
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl ModelTaskConfig {
    /// Load `SMRITI_<TASK>_{PROVIDER,MODEL,ENDPOINT,API_KEY,TIMEOUT_MS}`.
    /// Returns None when no endpoint is configured; the pipeline then
    /// treats that task as unavailable and degrades.
    fn from_env(task: ModelTask) -> Option<Self> {
        let infix = task.env_infix();
        let endpoint = env::var(format!("SMRITI_{infix}_ENDPOINT")).ok()?;
        if endpoint.trim().is_empty() {
            return None;
        }
        let timeout_ms = env::var(format!("SMRITI_{infix}_TIMEOUT_MS"))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MODEL_TIMEOUT_MS);
        Some(Self {
            provider: env::var(format!("SMRITI_{infix}_PROVIDER"))
                .unwrap_or_else(|_| "generic".to_string()),
            model: env::var(format!("SMRITI_{infix}_MODEL")).unwrap_or_else(|_| "default".to_string()),
            endpoint,
            api_key: env::var(format!("SMRITI_{infix}_API_KEY")).ok(),
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// A named PII redaction rule. Patterns are fixed regexes, so
/// scrubbing is deterministic for a given rule set.
#[derive(Debug, Clone)]
pub struct PiiRule {
    pub name: String,
    pub pattern: String,
}

fn default_pii_rules() -> Vec<PiiRule> {
    let rules = [
        ("email", r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}"),
        ("phone", r"\+?\d[\d\s\-().]{7,}\d"),
        ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
        ("card", r"\b(?:\d[ \-]?){13,16}\b"),
        ("ip", r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
    ];
    rules
        .into_iter()
        .map(|(name, pattern)| PiiRule {
            name: name.to_string(),
            pattern: pattern.to_string(),
        })
        .collect()
}

/// Rate limiter parameters.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub budget: u32,
}

/// Lesson mining parameters.
#[derive(Debug, Clone)]
pub struct MiningConfig {
    pub enabled: bool,
    /// When true, mined drafts are excluded from default lesson
    /// listings until a human approves them.
    pub approval_required: bool,
    pub lookback_days: i64,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub storage_path: PathBuf,

    pub chunking: ChunkSettings,

    /// Global sharing policy: when false, no shared derivatives are
    /// ever produced regardless of agent access level.
    pub scrub_enabled: bool,
    /// Automatically create the shared derivative on ingest for
    /// shared-level agents (when scrubbing is enabled).
    pub auto_share: bool,
    pub pii_rules: Vec<PiiRule>,

    pub rate_limit: RateLimitConfig,
    pub mining: MiningConfig,

    /// Administrator-defined entity taxonomy, passed into every
    /// extraction call. Open-world: never a compile-time enum.
    pub entity_catalog: Vec<String>,

    /// Minutes east of UTC for daily-log bucketing.
    pub timezone_offset_minutes: i32,

    pub embedding_dim: usize,
    pub models: HashMap<ModelTask, ModelTaskConfig>,

    pub audit_retention_days: i64,
    pub audit_max_entries: usize,

    pub max_body_bytes: usize,
    pub concurrency_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3917,
            storage_path: PathBuf::from("./smriti_data"),
            chunking: ChunkSettings::default(),
            scrub_enabled: true,
            auto_share: true,
            pii_rules: default_pii_rules(),
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(DEFAULT_RATE_WINDOW_SECS),
                budget: DEFAULT_RATE_BUDGET,
            },
            mining: MiningConfig {
                enabled: true,
                approval_required: true,
                lookback_days: DEFAULT_MINING_LOOKBACK_DAYS,
            },
            entity_catalog: vec![
                "Contact".to_string(),
                "Organization".to_string(),
                "Location".to_string(),
                "Project".to_string(),
                "Other".to_string(),
            ],
            timezone_offset_minutes: 0,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            models: HashMap::new(),
            audit_retention_days: DEFAULT_AUDIT_RETENTION_DAYS,
            audit_max_entries: DEFAULT_AUDIT_MAX_ENTRIES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => {
            let v = v.to_lowercase();
            v == "true" || v == "1" || v == "yes"
        }
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

impl ServerConfig {
    /// Load from environment variables with defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = env::var("SMRITI_HOST") {
            config.host = host;
        }
        config.port = env_parse("SMRITI_PORT", config.port);
        if let Ok(path) = env::var("SMRITI_STORAGE_PATH") {
            config.storage_path = PathBuf::from(path);
        }

        config.chunking.max_tokens = env_parse("SMRITI_CHUNK_MAX_TOKENS", config.chunking.max_tokens);
        config.chunking.overlap_tokens =
            env_parse("SMRITI_CHUNK_OVERLAP_TOKENS", config.chunking.overlap_tokens);

        config.scrub_enabled = env_bool("SMRITI_SCRUB_ENABLED", config.scrub_enabled);
        config.auto_share = env_bool("SMRITI_AUTO_SHARE", config.auto_share);

        // Extra PII rules as name=pattern pairs, semicolon separated.
        if let Ok(raw) = env::var("SMRITI_PII_RULES") {
            for item in raw.split(';').filter(|s| !s.trim().is_empty()) {
                match item.split_once('=') {
                    Some((name, pattern)) if regex::Regex::new(pattern).is_ok() => {
                        config.pii_rules.push(PiiRule {
                            name: name.trim().to_string(),
                            pattern: pattern.to_string(),
                        });
                    }
                    _ => warn!("ignoring malformed PII rule: {item}"),
                }
            }
        }

        config.rate_limit.budget = env_parse("SMRITI_RATE_BUDGET", config.rate_limit.budget);
        config.rate_limit.window = Duration::from_secs(env_parse(
            "SMRITI_RATE_WINDOW_SECS",
            config.rate_limit.window.as_secs(),
        ));

        config.mining.enabled = env_bool("SMRITI_MINING_ENABLED", config.mining.enabled);
        config.mining.approval_required =
            env_bool("SMRITI_MINING_APPROVAL_REQUIRED", config.mining.approval_required);
        config.mining.lookback_days =
            env_parse("SMRITI_MINING_LOOKBACK_DAYS", config.mining.lookback_days);

        if let Some(catalog) = env_list("SMRITI_ENTITY_TYPES") {
            if !catalog.is_empty() {
                config.entity_catalog = catalog;
            }
        }

        config.timezone_offset_minutes =
            env_parse("SMRITI_TZ_OFFSET_MINUTES", config.timezone_offset_minutes);
        config.embedding_dim = env_parse("SMRITI_EMBEDDING_DIM", config.embedding_dim);

        for task in [
            ModelTask::Summarize,
            ModelTask::Embed,
            ModelTask::Extract,
            ModelTask::Distill,
        ] {
            if let Some(mc) = ModelTaskConfig::from_env(task) {
                config.models.insert(task, mc);
            }
        }

        config.audit_retention_days =
            env_parse("SMRITI_AUDIT_RETENTION_DAYS", config.audit_retention_days);
        config.audit_max_entries = env_parse("SMRITI_AUDIT_MAX_ENTRIES", config.audit_max_entries);
        config.max_body_bytes = env_parse("SMRITI_MAX_BODY_BYTES", config.max_body_bytes);
        config.concurrency_limit = env_parse("SMRITI_CONCURRENCY_LIMIT", config.concurrency_limit);

        config
    }

    /// Log the effective configuration at startup (secrets excluded).
    pub fn log_summary(&self) {
        info!(
            host = %self.host,
            port = self.port,
            storage = %self.storage_path.display(),
            "server configuration loaded"
        );
        info!(
            chunk_max_tokens = self.chunking.max_tokens,
            chunk_overlap_tokens = self.chunking.overlap_tokens,
            embedding_dim = self.embedding_dim,
            "chunking/embedding configuration"
        );
        info!(
            scrub_enabled = self.scrub_enabled,
            auto_share = self.auto_share,
            pii_rules = self.pii_rules.len(),
            "sharing policy"
        );
        info!(
            budget = self.rate_limit.budget,
            window_secs = self.rate_limit.window.as_secs(),
            "per-agent rate limit"
        );
        info!(
            mining_enabled = self.mining.enabled,
            approval_required = self.mining.approval_required,
            lookback_days = self.mining.lookback_days,
            "lesson mining"
        );
        for (task, mc) in &self.models {
            info!(
                task = task.as_str(),
                provider = %mc.provider,
                model = %mc.model,
                endpoint = %mc.endpoint,
                timeout_ms = mc.timeout.as_millis() as u64,
                "model task configured"
            );
        }
        let unconfigured: Vec<&str> = [
            ModelTask::Summarize,
            ModelTask::Embed,
            ModelTask::Extract,
            ModelTask::Distill,
        ]
        .iter()
        .filter(|t| !self.models.contains_key(t))
        .map(|t| t.as_str())
        .collect();
        if !unconfigured.is_empty() {
            warn!(
                tasks = ?unconfigured,
                "model tasks without endpoints; those stages will degrade to empty results"
            );
        }
    }
}
