//! Lesson mining: a batch job that distills recent interactions into
//! draft lessons.
//!
//! Safe to run concurrently with ingestion (it only reads committed
//! rows), but never against itself: a `try_lock` run guard rejects
//! overlapping triggers, and a persisted watermark keeps repeated runs
//! from re-mining the same window. A run that finds no candidates is a
//! success with zero lessons.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::audit::{AuditEntry, AuditLog, AuditOutcome};
use crate::config::MiningConfig;
use crate::constants::MINING_MAX_CORPUS_CHARS;
use crate::enrichment::DistillLessons;
use crate::errors::AppError;
use crate::memory::{Lesson, LessonOrigin, LessonStatus, MemoryId, MemoryStore};
use crate::metrics;
use crate::validation;

const WATERMARK_KEY: &str = "miner:last_run";

/// Cap on lessons accepted from a single run; anything beyond is
/// almost certainly model noise.
const MAX_LESSONS_PER_RUN: usize = 20;

#[derive(Debug, Clone, serde::Serialize)]
pub struct MiningOutcome {
    pub lessons_created: usize,
    pub status: &'static str,
}

pub struct LessonMiner {
    store: Arc<MemoryStore>,
    distiller: Arc<dyn DistillLessons>,
    audit: Arc<AuditLog>,
    config: MiningConfig,
    run_lock: Mutex<()>,
}

impl LessonMiner {
    pub fn new(
        store: Arc<MemoryStore>,
        distiller: Arc<dyn DistillLessons>,
        audit: Arc<AuditLog>,
        config: MiningConfig,
    ) -> Self {
        Self {
            store,
            distiller,
            audit,
            config,
            run_lock: Mutex::new(()),
        }
    }

    /// Run one mining pass. `triggered_by` is the admin agent for the
    /// audit trail.
    pub async fn mine(&self, triggered_by: &str) -> Result<MiningOutcome, AppError> {
        if !self.config.enabled {
            return Ok(MiningOutcome {
                lessons_created: 0,
                status: "disabled",
            });
        }

        // Mutual exclusion between manual and scheduled triggers.
        let Ok(_guard) = self.run_lock.try_lock() else {
            return Err(AppError::MinerBusy);
        };

        let since = self.watermark()?.unwrap_or_else(|| {
            Utc::now() - Duration::days(self.config.lookback_days.max(0))
        });

        let candidates = self
            .store
            .interactions_since(since)
            .map_err(|e| AppError::StorageError(e.to_string()))?;

        if candidates.is_empty() {
            metrics::MINING_RUNS_TOTAL.with_label_values(&["empty"]).inc();
            info!(since = %since, "lesson mining: no candidate interactions");
            return Ok(MiningOutcome {
                lessons_created: 0,
                status: "no_candidates",
            });
        }

        let newest = candidates
            .iter()
            .map(|i| i.timestamp)
            .max()
            .unwrap_or(since);
        let corpus = build_corpus(&candidates);

        let mined = match self.distiller.distill(&corpus).await {
            Ok(lessons) => lessons,
            Err(e) => {
                metrics::MINING_RUNS_TOTAL.with_label_values(&["failed"]).inc();
                self.try_audit(triggered_by, AuditOutcome::Failed, 0);
                warn!("lesson distillation failed, watermark unchanged: {e:#}");
                // Watermark stays put so a retry re-mines this window.
                return Err(AppError::ServiceUnavailable(format!(
                    "lesson distiller unavailable: {e}"
                )));
            }
        };

        let now = Utc::now();
        let mut created = 0usize;
        for mined_lesson in mined.into_iter().take(MAX_LESSONS_PER_RUN) {
            let name = mined_lesson.name.trim();
            let body = mined_lesson.body.trim();
            if name.is_empty() || body.is_empty() || body.len() > validation::MAX_LESSON_BODY_LENGTH
            {
                continue;
            }
            let lesson = Lesson {
                id: MemoryId::new(),
                name: name.to_string(),
                lesson_type: mined_lesson.r#type.trim().to_string(),
                body: body.to_string(),
                // Miner output is always a draft; approval is a human act.
                status: LessonStatus::Draft,
                origin: LessonOrigin::Miner,
                created_at: now,
                updated_at: now,
            };
            self.store
                .put_lesson(&lesson)
                .map_err(|e| AppError::StorageError(e.to_string()))?;
            created += 1;
        }

        // Advance past everything consumed in this run.
        self.set_watermark(newest + Duration::nanoseconds(1))?;

        metrics::MINING_RUNS_TOTAL.with_label_values(&["ok"]).inc();
        metrics::LESSONS_MINED_TOTAL.inc_by(created as u64);
        self.try_audit(triggered_by, AuditOutcome::Ok, created);
        info!(
            candidates = candidates.len(),
            lessons_created = created,
            watermark = %newest,
            "lesson mining run complete"
        );

        Ok(MiningOutcome {
            lessons_created: created,
            status: "ok",
        })
    }

    fn watermark(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        let Some(bytes) = self
            .store
            .meta_get(WATERMARK_KEY)
            .map_err(|e| AppError::StorageError(e.to_string()))?
        else {
            return Ok(None);
        };
        let raw = String::from_utf8_lossy(&bytes);
        Ok(raw.parse::<DateTime<Utc>>().ok())
    }

    fn set_watermark(&self, ts: DateTime<Utc>) -> Result<(), AppError> {
        self.store
            .meta_put(WATERMARK_KEY, ts.to_rfc3339().as_bytes())
            .map_err(|e| AppError::StorageError(e.to_string()))
    }

    fn try_audit(&self, agent_id: &str, outcome: AuditOutcome, created: usize) {
        let entry = AuditEntry {
            agent_id: agent_id.to_string(),
            action: "mine_lessons".to_string(),
            timestamp: Utc::now(),
            outcome,
            detail: format!("lessons_created={created}"),
        };
        if let Err(e) = self.audit.append(&entry) {
            warn!("audit append degraded: {e:#}");
        }
    }
}

/// Most recent interactions first until the corpus cap, then restored
/// to chronological order for the prompt.
fn build_corpus(candidates: &[crate::memory::Interaction]) -> String {
    let mut picked: Vec<&crate::memory::Interaction> = Vec::new();
    let mut budget = MINING_MAX_CORPUS_CHARS;
    for interaction in candidates.iter().rev() {
        let cost = interaction.text.len() + 64;
        if cost > budget {
            break;
        }
        budget -= cost;
        picked.push(interaction);
    }
    picked.reverse();

    picked
        .iter()
        .map(|i| {
            format!(
                "[{} | {}] {}",
                i.timestamp.format("%Y-%m-%d %H:%M"),
                i.channel,
                i.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}
