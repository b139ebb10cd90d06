//! Storage backend for the memory system
//!
//! Embedded RocksDB, bincode-encoded rows, key-prefix layout:
//!
//! - `int:{memory_id}`                                     interaction row
//! - `ts:{agent}:{nanos:020}:{memory_id}`                  time index
//! - `ent:{agent}:{type}:{name}:{nanos:020}:{memory_id}`   entity index
//! - `lsn:{lesson_id}`                                     lesson row
//! - `meta:{key}`                                          service metadata
//!
//! The shared partition lives in its own database (see
//! [`SharedStore`]); private and shared rows never share a keyspace.
//! Index rows are written in the same batch as the interaction row, so
//! an interaction is either fully indexed or absent.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rocksdb::{IteratorMode, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::types::{Interaction, Lesson, LessonStatus, MemoryId, SharedRecord};

/// Helper trait to safely iterate over RocksDB results with error
/// logging. Unlike `.flatten()`, which silently ignores errors, this
/// logs them.
trait LogErrors<T> {
    fn log_errors(self) -> impl Iterator<Item = T>;
}

impl<I, T, E> LogErrors<T> for I
where
    I: Iterator<Item = Result<T, E>>,
    E: std::fmt::Display,
{
    fn log_errors(self) -> impl Iterator<Item = T> {
        self.filter_map(|r| match r {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("RocksDB iterator error (continuing): {}", e);
                None
            }
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .context("bincode encode failed")
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .context("bincode decode failed")?;
    Ok(value)
}

/// Index key components may contain arbitrary caller text; `:` is the
/// key separator, so it gets folded before keying. Lookups apply the
/// same fold, so equality stays consistent.
fn index_token(raw: &str) -> String {
    raw.trim().to_lowercase().replace(':', "_")
}

fn ts_nanos(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(0)
}

fn open_db(path: &Path) -> Result<Arc<DB>> {
    let mut opts = rocksdb::Options::default();
    opts.create_if_missing(true);
    let db = DB::open(&opts, path)
        .map_err(|e| anyhow!("failed to open database at {}: {e}", path.display()))?;
    Ok(Arc::new(db))
}

// ---------------------------------------------------------------------------
// Private store
// ---------------------------------------------------------------------------

pub struct MemoryStore {
    db: Arc<DB>,
}

impl MemoryStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self { db: open_db(path)? })
    }

    fn interaction_key(id: &MemoryId) -> String {
        format!("int:{id}")
    }

    fn time_index_key(agent_id: &str, ts: &DateTime<Utc>, id: &MemoryId) -> String {
        format!("ts:{agent_id}:{:020}:{id}", ts_nanos(ts))
    }

    fn entity_index_key(
        agent_id: &str,
        entity_type: &str,
        name: &str,
        ts: &DateTime<Utc>,
        id: &MemoryId,
    ) -> String {
        format!(
            "ent:{agent_id}:{}:{}:{:020}:{id}",
            index_token(entity_type),
            index_token(name),
            ts_nanos(ts)
        )
    }

    /// Commit an interaction and its index rows in one batch. This is
    /// the durability point of the ingest pipeline: failure here is
    /// the one post-parse error surfaced to the caller.
    pub fn put_interaction(&self, interaction: &Interaction) -> Result<()> {
        let mut batch = WriteBatch::default();
        batch.put(
            Self::interaction_key(&interaction.id).as_bytes(),
            encode(interaction)?,
        );
        batch.put(
            Self::time_index_key(&interaction.agent_id, &interaction.timestamp, &interaction.id)
                .as_bytes(),
            interaction.id.to_string().as_bytes(),
        );
        for entity in &interaction.entities {
            batch.put(
                Self::entity_index_key(
                    &interaction.agent_id,
                    &entity.entity_type,
                    &entity.name,
                    &interaction.timestamp,
                    &interaction.id,
                )
                .as_bytes(),
                interaction.id.to_string().as_bytes(),
            );
        }
        self.db
            .write(batch)
            .map_err(|e| anyhow!("failed to write interaction {}: {e}", interaction.id))
    }

    /// Rewrite the interaction row only. Raw fields are immutable;
    /// this exists for derived-field updates within the same ingest
    /// (e.g. marking the shared flag), so index rows stay untouched.
    pub fn update_interaction(&self, interaction: &Interaction) -> Result<()> {
        self.db
            .put(
                Self::interaction_key(&interaction.id).as_bytes(),
                encode(interaction)?,
            )
            .map_err(|e| anyhow!("failed to update interaction {}: {e}", interaction.id))
    }

    pub fn get_interaction(&self, id: &MemoryId) -> Result<Option<Interaction>> {
        match self
            .db
            .get(Self::interaction_key(id).as_bytes())
            .map_err(|e| anyhow!("failed to read interaction {id}: {e}"))?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn fetch_by_index_prefix(&self, prefix: &str) -> Result<Vec<Interaction>> {
        let mut out = Vec::new();
        for (key, value) in self.db.prefix_iterator(prefix.as_bytes()).log_errors() {
            let Ok(key_str) = std::str::from_utf8(&key) else {
                continue;
            };
            if !key_str.starts_with(prefix) {
                break;
            }
            let id_str = String::from_utf8_lossy(&value);
            if let Ok(uuid) = uuid::Uuid::parse_str(&id_str) {
                if let Some(interaction) = self.get_interaction(&MemoryId(uuid))? {
                    out.push(interaction);
                }
            }
        }
        Ok(out)
    }

    /// All interactions of one agent referencing (entity_type, name),
    /// timestamp ascending. Key order gives the ordering for free.
    pub fn timeline(
        &self,
        agent_id: &str,
        entity_type: &str,
        name: &str,
    ) -> Result<Vec<Interaction>> {
        let prefix = format!(
            "ent:{agent_id}:{}:{}:",
            index_token(entity_type),
            index_token(name)
        );
        self.fetch_by_index_prefix(&prefix)
    }

    /// All interactions of one agent in [from, to), timestamp
    /// ascending.
    pub fn range_by_time(
        &self,
        agent_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Interaction>> {
        let prefix = format!("ts:{agent_id}:");
        let start_key = format!("ts:{agent_id}:{:020}", ts_nanos(&from));
        let end_nanos = ts_nanos(&to);

        let mut out = Vec::new();
        let iter = self.db.iterator(IteratorMode::From(
            start_key.as_bytes(),
            rocksdb::Direction::Forward,
        ));
        for (key, value) in iter.log_errors() {
            let Ok(key_str) = std::str::from_utf8(&key) else {
                continue;
            };
            if !key_str.starts_with(&prefix) {
                break;
            }
            let nanos: i64 = key_str
                .split(':')
                .nth(2)
                .and_then(|s| s.parse().ok())
                .unwrap_or(i64::MAX);
            if nanos >= end_nanos {
                break;
            }
            let id_str = String::from_utf8_lossy(&value);
            if let Ok(uuid) = uuid::Uuid::parse_str(&id_str) {
                if let Some(interaction) = self.get_interaction(&MemoryId(uuid))? {
                    out.push(interaction);
                }
            }
        }
        Ok(out)
    }

    /// Every interaction (all agents) with timestamp >= since. Used by
    /// the lesson miner and the startup index rebuild.
    pub fn interactions_since(&self, since: DateTime<Utc>) -> Result<Vec<Interaction>> {
        let mut out: Vec<Interaction> = self
            .scan_interactions()?
            .into_iter()
            .filter(|i| i.timestamp >= since)
            .collect();
        out.sort_by_key(|i| i.timestamp);
        Ok(out)
    }

    /// Full scan of interaction rows.
    pub fn scan_interactions(&self) -> Result<Vec<Interaction>> {
        let mut out = Vec::new();
        for (key, value) in self.db.prefix_iterator(b"int:").log_errors() {
            let Ok(key_str) = std::str::from_utf8(&key) else {
                continue;
            };
            if !key_str.starts_with("int:") {
                break;
            }
            match decode::<Interaction>(&value) {
                Ok(interaction) => out.push(interaction),
                Err(e) => tracing::warn!("skipping undecodable interaction row: {e:#}"),
            }
        }
        Ok(out)
    }

    // -- lessons ----------------------------------------------------------

    pub fn put_lesson(&self, lesson: &Lesson) -> Result<()> {
        self.db
            .put(format!("lsn:{}", lesson.id).as_bytes(), encode(lesson)?)
            .map_err(|e| anyhow!("failed to write lesson {}: {e}", lesson.id))
    }

    pub fn get_lesson(&self, id: &MemoryId) -> Result<Option<Lesson>> {
        match self
            .db
            .get(format!("lsn:{id}").as_bytes())
            .map_err(|e| anyhow!("failed to read lesson {id}: {e}"))?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn list_lessons(&self, status: Option<LessonStatus>) -> Result<Vec<Lesson>> {
        let mut out = Vec::new();
        for (key, value) in self.db.prefix_iterator(b"lsn:").log_errors() {
            let Ok(key_str) = std::str::from_utf8(&key) else {
                continue;
            };
            if !key_str.starts_with("lsn:") {
                break;
            }
            match decode::<Lesson>(&value) {
                Ok(lesson) => {
                    if status.is_none() || status == Some(lesson.status) {
                        out.push(lesson);
                    }
                }
                Err(e) => tracing::warn!("skipping undecodable lesson row: {e:#}"),
            }
        }
        out.sort_by_key(|l| l.created_at);
        Ok(out)
    }

    pub fn delete_lesson(&self, id: &MemoryId) -> Result<()> {
        self.db
            .delete(format!("lsn:{id}").as_bytes())
            .map_err(|e| anyhow!("failed to delete lesson {id}: {e}"))
    }

    // -- service metadata -------------------------------------------------

    pub fn meta_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.db
            .get(format!("meta:{key}").as_bytes())
            .map_err(|e| anyhow!("failed to read meta key '{key}': {e}"))
    }

    pub fn meta_put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db
            .put(format!("meta:{key}").as_bytes(), value)
            .map_err(|e| anyhow!("failed to write meta key '{key}': {e}"))
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| anyhow!("failed to flush memory store: {e}"))
    }
}

// ---------------------------------------------------------------------------
// Shared partition
// ---------------------------------------------------------------------------

/// Scrubbed derivatives live in their own database so the partition
/// boundary is physical, not just a key prefix.
pub struct SharedStore {
    db: Arc<DB>,
}

impl SharedStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self { db: open_db(path)? })
    }

    pub fn put(&self, record: &SharedRecord) -> Result<()> {
        self.db
            .put(format!("shr:{}", record.id).as_bytes(), encode(record)?)
            .map_err(|e| anyhow!("failed to write shared record {}: {e}", record.id))
    }

    pub fn get(&self, id: &MemoryId) -> Result<Option<SharedRecord>> {
        match self
            .db
            .get(format!("shr:{id}").as_bytes())
            .map_err(|e| anyhow!("failed to read shared record {id}: {e}"))?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn scan(&self) -> Result<Vec<SharedRecord>> {
        let mut out = Vec::new();
        for (key, value) in self.db.prefix_iterator(b"shr:").log_errors() {
            let Ok(key_str) = std::str::from_utf8(&key) else {
                continue;
            };
            if !key_str.starts_with("shr:") {
                break;
            }
            match decode::<SharedRecord>(&value) {
                Ok(record) => out.push(record),
                Err(e) => tracing::warn!("skipping undecodable shared row: {e:#}"),
            }
        }
        Ok(out)
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| anyhow!("failed to flush shared store: {e}"))
    }
}
