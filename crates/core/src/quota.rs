//! Sliding-window action limiter keyed by sender.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_ACTIONS: u32 = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub max_actions: u32,
    pub window: Duration,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self { max_actions: DEFAULT_MAX_ACTIONS, window: DEFAULT_WINDOW }
    }
}

impl QuotaPolicy {
    /// Human phrasing of the window, used in denial messages.
    pub fn describe_window(&self) -> String {
        describe_duration(self.window)
    }
}

/// Each worker owns one guard; nothing here is shared across agents.
#[derive(Debug, Default)]
pub struct QuotaGuard {
    policy: QuotaPolicy,
    windows: HashMap<String, VecDeque<Instant>>,
}

impl QuotaGuard {
    pub fn new(policy: QuotaPolicy) -> Self {
        Self { policy, windows: HashMap::new() }
    }

    pub fn policy(&self) -> QuotaPolicy {
        self.policy
    }

    pub fn check_and_consume(&mut self, sender_id: &str) -> bool {
        self.check_and_consume_at(sender_id, Instant::now())
    }

    /// Evicts expired slots, then consumes one slot if the sender is under
    /// the limit.
    pub fn check_and_consume_at(&mut self, sender_id: &str, now: Instant) -> bool {
        let limit = self.policy.max_actions as usize;
        let slots = self.evict(sender_id, now);
        if slots.len() >= limit {
            return false;
        }
        slots.push_back(now);
        true
    }

    pub fn remaining(&mut self, sender_id: &str) -> u32 {
        self.remaining_at(sender_id, Instant::now())
    }

    pub fn remaining_at(&mut self, sender_id: &str, now: Instant) -> u32 {
        let used = self.evict(sender_id, now).len() as u32;
        self.policy.max_actions.saturating_sub(used)
    }

    /// Time until the oldest counted slot expires, or `None` when the sender
    /// is under the limit.
    pub fn retry_after(&mut self, sender_id: &str) -> Option<Duration> {
        self.retry_after_at(sender_id, Instant::now())
    }

    pub fn retry_after_at(&mut self, sender_id: &str, now: Instant) -> Option<Duration> {
        let window = self.policy.window;
        let limit = self.policy.max_actions as usize;
        let slots = self.evict(sender_id, now);
        if slots.len() < limit {
            return None;
        }
        slots.front().map(|oldest| (*oldest + window).saturating_duration_since(now))
    }

    fn evict(&mut self, sender_id: &str, now: Instant) -> &mut VecDeque<Instant> {
        let window = self.policy.window;
        let slots = self.windows.entry(sender_id.to_string()).or_default();
        while slots.front().is_some_and(|stamp| now.saturating_duration_since(*stamp) >= window) {
            slots.pop_front();
        }
        slots
    }
}

pub fn describe_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0..=59 => plural(secs.max(1), "second"),
        60..=3599 => plural(secs.div_ceil(60), "minute"),
        _ if secs % 3600 == 0 => plural(secs / 3600, "hour"),
        _ => plural(secs.div_ceil(60), "minute"),
    }
}

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}
