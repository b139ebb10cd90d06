//! Append-only audit log.
//!
//! Every agent-initiated mutation lands here with its outcome. Entries
//! are never updated; the only deletion path is retention rotation
//! (age- and count-based), which runs opportunistically on append.
//!
//! Keys are `{agent_id}:{timestamp_nanos:020}:{suffix}` so a prefix
//! scan yields one agent's entries in time order.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rocksdb::{WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::metrics;

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Ok,
    Degraded,
    Failed,
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub agent_id: String,
    /// Action name: "ingest", "lesson_create", "mine_lessons", ...
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: AuditOutcome,
    #[serde(default)]
    pub detail: String,
}

pub struct AuditLog {
    db: Arc<DB>,
    retention_days: i64,
    max_entries: usize,
    /// Appends since the last rotation pass.
    since_rotation: AtomicU64,
}

/// Rotate at most once per this many appends per process.
const ROTATION_INTERVAL: u64 = 512;

impl AuditLog {
    pub fn open(path: &Path, retention_days: i64, max_entries: usize) -> Result<Self> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)
            .map_err(|e| anyhow!("failed to open audit database at {}: {e}", path.display()))?;
        Ok(Self {
            db: Arc::new(db),
            retention_days,
            max_entries,
            since_rotation: AtomicU64::new(0),
        })
    }

    /// Append one entry. Storage failure here is reported to the
    /// caller but is not an ingest-fatal condition.
    pub fn append(&self, entry: &AuditEntry) -> Result<()> {
        let nanos = entry.timestamp.timestamp_nanos_opt().unwrap_or(0);
        let key = format!(
            "{}:{nanos:020}:{}",
            entry.agent_id,
            uuid::Uuid::new_v4().simple()
        );
        let value = bincode::serde::encode_to_vec(entry, bincode::config::standard())
            .context("failed to encode audit entry")?;
        self.db
            .put(key.as_bytes(), value)
            .map_err(|e| anyhow!("failed to append audit entry: {e}"))?;

        metrics::AUDIT_ENTRIES_TOTAL
            .with_label_values(&[&entry.action])
            .inc();

        if self.since_rotation.fetch_add(1, Ordering::Relaxed) % ROTATION_INTERVAL
            == ROTATION_INTERVAL - 1
        {
            if let Err(e) = self.rotate(&entry.agent_id) {
                tracing::warn!(agent_id = %entry.agent_id, "audit rotation failed: {e:#}");
            }
        }
        Ok(())
    }

    /// Most recent entries for one agent, newest first.
    pub fn recent(&self, agent_id: &str, limit: usize) -> Result<Vec<AuditEntry>> {
        let mut entries = self.scan_agent(agent_id)?;
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }

    fn scan_agent(&self, agent_id: &str) -> Result<Vec<AuditEntry>> {
        let prefix = format!("{agent_id}:");
        let mut entries = Vec::new();
        let iter = self.db.prefix_iterator(prefix.as_bytes());
        for item in iter {
            let (key, value) = match item {
                Ok(kv) => kv,
                Err(e) => {
                    tracing::warn!("audit iterator error (continuing): {e}");
                    continue;
                }
            };
            let Ok(key_str) = std::str::from_utf8(&key) else {
                continue;
            };
            if !key_str.starts_with(&prefix) {
                break;
            }
            if let Ok((entry, _)) = bincode::serde::decode_from_slice::<AuditEntry, _>(
                &value,
                bincode::config::standard(),
            ) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Drop entries older than the retention window and beyond the
    /// per-agent cap, oldest first.
    pub fn rotate(&self, agent_id: &str) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(self.retention_days);
        let cutoff_nanos = cutoff.timestamp_nanos_opt().unwrap_or(0);
        let prefix = format!("{agent_id}:");

        let mut keyed: Vec<(Vec<u8>, i64)> = Vec::new();
        for item in self.db.prefix_iterator(prefix.as_bytes()) {
            let (key, value) = match item {
                Ok(kv) => kv,
                Err(_) => continue,
            };
            let Ok(key_str) = std::str::from_utf8(&key) else {
                continue;
            };
            if !key_str.starts_with(&prefix) {
                break;
            }
            if let Ok((entry, _)) = bincode::serde::decode_from_slice::<AuditEntry, _>(
                &value,
                bincode::config::standard(),
            ) {
                let nanos = entry.timestamp.timestamp_nanos_opt().unwrap_or(0);
                keyed.push((key.to_vec(), nanos));
            }
        }

        // Newest first; everything past max_entries or older than the
        // cutoff goes.
        keyed.sort_by(|a, b| b.1.cmp(&a.1));
        let mut batch = WriteBatch::default();
        let mut removed = 0usize;
        for (idx, (key, nanos)) in keyed.iter().enumerate() {
            if *nanos < cutoff_nanos || idx >= self.max_entries {
                batch.delete(key);
                removed += 1;
            }
        }
        if removed > 0 {
            self.db
                .write(batch)
                .map_err(|e| anyhow!("failed to write audit rotation batch: {e}"))?;
        }
        Ok(removed)
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| anyhow!("failed to flush audit database: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log(dir: &TempDir, retention_days: i64, max_entries: usize) -> AuditLog {
        AuditLog::open(dir.path(), retention_days, max_entries).unwrap()
    }

    fn entry(agent: &str, action: &str, ts: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            agent_id: agent.to_string(),
            action: action.to_string(),
            timestamp: ts,
            outcome: AuditOutcome::Ok,
            detail: String::new(),
        }
    }

    #[test]
    fn append_and_recent_orders_newest_first() {
        let dir = TempDir::new().unwrap();
        let log = log(&dir, 90, 100);
        let base = Utc::now();
        for i in 0..5 {
            log.append(&entry("a1", &format!("action_{i}"), base + chrono::Duration::seconds(i)))
                .unwrap();
        }
        let recent = log.recent("a1", 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].action, "action_4");
        assert_eq!(recent[2].action, "action_2");
    }

    #[test]
    fn agents_are_isolated() {
        let dir = TempDir::new().unwrap();
        let log = log(&dir, 90, 100);
        log.append(&entry("a1", "ingest", Utc::now())).unwrap();
        log.append(&entry("a2", "ingest", Utc::now())).unwrap();
        assert_eq!(log.recent("a1", 10).unwrap().len(), 1);
        assert_eq!(log.recent("a2", 10).unwrap().len(), 1);
    }

    #[test]
    fn rotation_enforces_age_and_cap() {
        let dir = TempDir::new().unwrap();
        let log = log(&dir, 30, 2);
        let old = Utc::now() - chrono::Duration::days(60);
        log.append(&entry("a1", "ancient", old)).unwrap();
        for i in 0..3 {
            log.append(&entry("a1", &format!("recent_{i}"), Utc::now())).unwrap();
        }
        let removed = log.rotate("a1").unwrap();
        assert!(removed >= 2); // the ancient one plus at least one over-cap
        let left = log.recent("a1", 10).unwrap();
        assert!(left.len() <= 2);
        assert!(left.iter().all(|e| e.action != "ancient"));
    }
}
