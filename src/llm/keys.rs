//! API key pool with per-key rate limits, error cooldowns, and rotation.
//!
//! Time is passed in explicitly so the pool can be driven deterministically.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Consecutive errors that trip an error cooldown.
pub const ERROR_THRESHOLD: u32 = 3;
pub const ERROR_COOLDOWN: Duration = Duration::from_secs(5 * 60);
pub const QUOTA_COOLDOWN: Duration = Duration::from_secs(10 * 60);
const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CooldownReason {
    Errors,
    Quota,
}

#[derive(Debug, Clone, Copy)]
struct Cooldown {
    until: Instant,
    reason: CooldownReason,
}

#[derive(Debug)]
struct KeyState {
    key: String,
    requests: u32,
    window_start: Instant,
    errors: u32,
    cooldown: Option<Cooldown>,
}

impl KeyState {
    fn new(key: String, now: Instant) -> Self {
        Self {
            key,
            requests: 0,
            window_start: now,
            errors: 0,
            cooldown: None,
        }
    }

    fn refresh(&mut self, now: Instant) {
        if matches!(self.cooldown, Some(c) if now >= c.until) {
            self.cooldown = None;
        }
        if now.duration_since(self.window_start) >= RATE_WINDOW {
            self.requests = 0;
            self.window_start = now;
        }
    }

    fn available(&mut self, now: Instant, rate_limit: u32) -> bool {
        self.refresh(now);
        self.cooldown.is_none() && self.requests < rate_limit
    }
}

/// Why [`KeyPool::acquire`] found no usable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhausted {
    /// At least one key is held back by its per-minute limit or a quota rejection.
    RateLimited,
    /// Every key is cooling down after repeated request failures.
    Failing,
}

/// Snapshot of one key for `!keys`. The key itself is never exposed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct KeyStatus {
    /// 1-based position in the pool.
    pub number: usize,
    pub is_current: bool,
    pub requests_this_minute: u32,
    pub rate_limit: u32,
    pub errors: u32,
    pub available: bool,
    pub cooldown_secs: Option<u64>,
}

#[derive(Debug)]
pub struct KeyPool {
    keys: Vec<KeyState>,
    current: usize,
    rate_limit: u32,
}

impl KeyPool {
    pub fn new(keys: Vec<String>, rate_limit: u32, now: Instant) -> Self {
        Self {
            keys: keys.into_iter().map(|k| KeyState::new(k, now)).collect(),
            current: 0,
            rate_limit: rate_limit.max(1),
        }
    }

    /// Pick a key for the next request and count it against that key's limit.
    ///
    /// Uses the current key if it is available, otherwise the next available one
    /// in rotation order.
    pub fn acquire(&mut self, now: Instant) -> Result<(usize, String), Exhausted> {
        let n = self.keys.len();
        for offset in 0..n {
            let idx = (self.current + offset) % n;
            if self.keys[idx].available(now, self.rate_limit) {
                if idx != self.current {
                    tracing::info!(key = idx + 1, "rotated API key");
                    self.current = idx;
                }
                let state = &mut self.keys[idx];
                state.requests += 1;
                return Ok((idx, state.key.clone()));
            }
        }
        let only_failing = self
            .keys
            .iter()
            .all(|k| matches!(k.cooldown, Some(c) if c.reason == CooldownReason::Errors));
        Err(if only_failing {
            Exhausted::Failing
        } else {
            Exhausted::RateLimited
        })
    }

    /// Move past the current key so the next `acquire` tries another one first.
    pub fn rotate(&mut self) {
        if self.keys.len() > 1 {
            self.current = (self.current + 1) % self.keys.len();
        }
    }

    pub fn record_success(&mut self, idx: usize) {
        if let Some(state) = self.keys.get_mut(idx) {
            state.errors = 0;
        }
    }

    /// Count one failed request; the third in a row cools the key down.
    ///
    /// A lone key is never cooled down for errors since there is nothing to
    /// rotate to.
    pub fn record_error(&mut self, idx: usize, now: Instant) {
        let pooled = self.keys.len() > 1;
        let Some(state) = self.keys.get_mut(idx) else {
            return;
        };
        state.errors += 1;
        if pooled && state.errors >= ERROR_THRESHOLD {
            tracing::warn!(key = idx + 1, errors = state.errors, "API key in cooldown after errors");
            state.cooldown = Some(Cooldown {
                until: now + ERROR_COOLDOWN,
                reason: CooldownReason::Errors,
            });
            state.errors = 0;
        }
    }

    /// The endpoint reported quota exhaustion for this key.
    pub fn record_quota(&mut self, idx: usize, now: Instant) {
        if let Some(state) = self.keys.get_mut(idx) {
            tracing::warn!(key = idx + 1, "API key in cooldown after quota rejection");
            state.cooldown = Some(Cooldown {
                until: now + QUOTA_COOLDOWN,
                reason: CooldownReason::Quota,
            });
        }
        if idx == self.current {
            self.rotate();
        }
    }

    pub fn status(&mut self, now: Instant) -> Vec<KeyStatus> {
        let rate_limit = self.rate_limit;
        let current = self.current;
        self.keys
            .iter_mut()
            .enumerate()
            .map(|(i, state)| {
                let available = state.available(now, rate_limit);
                KeyStatus {
                    number: i + 1,
                    is_current: i == current,
                    requests_this_minute: state.requests,
                    rate_limit,
                    errors: state.errors,
                    available,
                    cooldown_secs: state
                        .cooldown
                        .map(|c| c.until.saturating_duration_since(now).as_secs()),
                }
            })
            .collect()
    }
}
