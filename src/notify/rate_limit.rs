//! Per-source sliding-window rate limiting.
//!
//! Each source IP keeps the timestamps of its admitted requests inside the
//! current window, at most `threshold` of them. Entries live in a sharded
//! `DashMap`; stale sources are evicted by a periodic task and the table is
//! capped at `max_tracked_sources`.

use crate::config::RateLimitConfig;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::IpAddr;
use tracing::{debug, warn};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request was recorded and may proceed.
    Allowed,
    /// The source is over its limit.
    Limited {
        /// Seconds until the oldest recorded request leaves the window.
        retry_after_secs: u64,
    },
}

/// Sliding-window limiter keyed by source IP.
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<IpAddr, VecDeque<DateTime<Utc>>>,
    threshold: usize,
    window: chrono::Duration,
    max_tracked_sources: usize,
}

impl RateLimiter {
    /// Create a limiter from config.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            threshold: config.threshold.max(1) as usize,
            window: config.window(),
            max_tracked_sources: config.max_tracked_sources.max(1),
        }
    }

    /// Window length.
    pub fn window(&self) -> chrono::Duration {
        self.window
    }

    /// Record a request from `source` at `now`, unless the source is over
    /// its limit. Limited requests are not recorded.
    pub fn check(&self, source: IpAddr, now: DateTime<Utc>) -> RateDecision {
        if !self.entries.contains_key(&source) && self.entries.len() >= self.max_tracked_sources {
            self.evict_stale(now);
            if self.entries.len() >= self.max_tracked_sources {
                warn!(
                    source = %source,
                    tracked = self.entries.len(),
                    "Rate limiter table full; rejecting new source"
                );
                return RateDecision::Limited {
                    retry_after_secs: self.window_secs(),
                };
            }
        }

        let cutoff = self.cutoff(now);
        let mut hits = self.entries.entry(source).or_default();
        while hits.front().is_some_and(|t| *t <= cutoff) {
            hits.pop_front();
        }

        if hits.len() >= self.threshold {
            let oldest = hits.front().copied().unwrap_or(now);
            let expires = oldest.checked_add_signed(self.window).unwrap_or(now);
            let remaining = (expires - now).num_milliseconds().max(0) as u64;
            return RateDecision::Limited {
                retry_after_secs: remaining.div_ceil(1000).max(1),
            };
        }

        hits.push_back(now);
        RateDecision::Allowed
    }

    /// Drop sources with no request inside the window. Returns how many
    /// were removed.
    pub fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let cutoff = self.cutoff(now);
        let before = self.entries.len();
        self.entries
            .retain(|_, hits| hits.back().is_some_and(|t| *t > cutoff));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Evicted stale rate limit entries");
        }
        removed
    }

    /// Number of sources currently tracked.
    pub fn tracked_sources(&self) -> usize {
        self.entries.len()
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn window_secs(&self) -> u64 {
        self.window.num_seconds().max(1) as u64
    }
}
