//! Per-agent rate limiting over a fixed window.
//!
//! The counter for each agent lives in a DashMap entry; the entry API
//! holds the shard lock across the read-modify-write, so two
//! concurrent requests from the same agent can never both observe a
//! stale under-budget count.
//!
//! Rejection happens in the orchestrator *before* any external call,
//! so a rejected request has no side effects.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::metrics;

#[derive(Debug, Clone, Copy)]
struct WindowSlot {
    window_start: Instant,
    count: u32,
}

pub struct RateLimiter {
    budget: u32,
    window: Duration,
    slots: DashMap<String, WindowSlot>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            budget: config.budget,
            window: config.window,
            slots: DashMap::new(),
        }
    }

    /// Check and consume one unit of the agent's budget.
    pub fn allow(&self, agent_id: &str) -> bool {
        let now = Instant::now();
        let mut slot = self.slots.entry(agent_id.to_string()).or_insert(WindowSlot {
            window_start: now,
            count: 0,
        });

        if now.duration_since(slot.window_start) >= self.window {
            slot.window_start = now;
            slot.count = 0;
        }

        if slot.count >= self.budget {
            metrics::RATE_LIMITED_TOTAL.inc();
            return false;
        }
        slot.count += 1;
        true
    }

    /// Seconds until the agent's current window resets.
    pub fn retry_after_secs(&self, agent_id: &str) -> u64 {
        match self.slots.get(agent_id) {
            Some(slot) => {
                let elapsed = slot.window_start.elapsed();
                self.window.saturating_sub(elapsed).as_secs().max(1)
            }
            None => 1,
        }
    }

    /// Drop windows that expired long ago so the map does not grow
    /// with one entry per agent ever seen.
    pub fn sweep(&self) {
        let window = self.window;
        self.slots
            .retain(|_, slot| slot.window_start.elapsed() < window * 2);
    }
}
