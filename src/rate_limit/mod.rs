//! Sliding-window admission control.
//!
//! Each limiter keeps, per identity, the instants of admitted requests that
//! still fall inside the trailing window. Rejected attempts are never
//! recorded, so the retained count can not exceed `max_requests`.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};


/// The protected operation a limiter guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    CheckIn,
    CheckOut,
}

impl Quota {
    pub fn label(&self) -> &'static str {
        match self {
            Quota::CheckIn => "check-in",
            Quota::CheckOut => "check-out",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Quota::CheckIn => "Too many check-in attempts. Please try again later.",
            Quota::CheckOut => "Too many check-out attempts. Please try again later.",
        }
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: usize,
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterStats {
    pub total_tracked_users: usize,
    pub max_requests: usize,
    pub window_ms: u64,
}

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: HashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: HashMap::new(),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn is_allowed(&mut self, identity: &str) -> RateLimitDecision {
        self.is_allowed_at(identity, Instant::now())
    }

    pub fn is_allowed_at(&mut self, identity: &str, now: Instant) -> RateLimitDecision {
        let window = self.window;
        let timestamps = self.requests.entry(identity.to_string()).or_default();

        // A timestamp equal to the window start is already outside it.
        if let Some(window_start) = now.checked_sub(window) {
            while timestamps.front().is_some_and(|ts| *ts <= window_start) {
                timestamps.pop_front();
            }
        }

        if timestamps.len() >= self.max_requests {
            let retry_after_secs = timestamps
                .front()
                .map(|oldest| {
                    let wait = oldest
                        .checked_add(window)
                        .map_or(window, |frees_at| frees_at.saturating_duration_since(now));
                    u64::try_from(wait.as_millis().div_ceil(1000)).unwrap_or(u64::MAX)
                })
                .unwrap_or(0);

            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                retry_after_secs: Some(retry_after_secs),
            };
        }

        timestamps.push_back(now);
        RateLimitDecision {
            allowed: true,
            remaining: self.max_requests - timestamps.len(),
            retry_after_secs: None,
        }
    }

    pub fn reset(&mut self, identity: &str) {
        self.requests.remove(identity);
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            total_tracked_users: self.requests.len(),
            max_requests: self.max_requests,
            window_ms: self.window.as_millis() as u64,
        }
    }
}
