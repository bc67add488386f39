use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use {concierge_config::RateLimitConfig, dashmap::DashMap};

/// Senders with empty windows are dropped every this many checks.
const SWEEP_EVERY_CHECKS: u64 = 256;

/// Sliding-window admission control keyed by sender.
///
/// For every sender, the number of admitted events inside any trailing
/// `window` never exceeds `max_events`. Rejected events are not recorded.
pub struct RateLimiter {
    max_events: usize,
    window: Duration,
    windows: DashMap<String, VecDeque<Instant>>,
    checks_seen: AtomicU64,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_events: usize, window: Duration) -> Self {
        Self {
            max_events,
            window,
            windows: DashMap::new(),
            checks_seen: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_messages, config.window())
    }

    pub fn admit(&self, sender: &str) -> bool {
        self.admit_at(sender, Instant::now())
    }

    pub fn admit_at(&self, sender: &str, now: Instant) -> bool {
        let admitted = if self.max_events == 0 {
            false
        } else {
            // The entry guard locks this sender's shard, which serializes
            // concurrent checks for the same sender.
            let mut window = self.windows.entry(sender.to_string()).or_default();
            prune(&mut window, now, self.window);
            if window.len() >= self.max_events {
                false
            } else {
                window.push_back(now);
                true
            }
        };

        self.sweep_if_needed(now);
        admitted
    }

    /// Number of senders with a tracked window.
    pub fn tracked_senders(&self) -> usize {
        self.windows.len()
    }

    fn sweep_if_needed(&self, now: Instant) {
        let seen = self.checks_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if !seen.is_multiple_of(SWEEP_EVERY_CHECKS) {
            return;
        }
        self.sweep(now);
    }

    fn sweep(&self, now: Instant) {
        let window = self.window;
        self.windows.retain(|_, events| {
            prune(events, now, window);
            !events.is_empty()
        });
    }
}

/// Drop timestamps that fell out of `(now - window, now]`.
fn prune(events: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = events.front() {
        if now.saturating_duration_since(oldest) >= window {
            events.pop_front();
        } else {
            break;
        }
    }
}
