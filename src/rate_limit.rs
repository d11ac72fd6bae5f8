use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

/// Sliding window in-memory rate limiter (pod local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled { return true; }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window { entry.pop_front(); } else { break; }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Per-action limits derived from env. Creation endpoints are limited per
/// authenticated user; view tracking per client address.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub resource_limit: usize,
    pub resource_window: Duration,
    pub comment_limit: usize,
    pub comment_window: Duration,
    pub view_limit: usize,
    pub view_window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize { std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default) }
        fn dur_env(name: &str, default: u64) -> Duration { Duration::from_secs(std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)) }
        Self {
            resource_limit: usize_env("RL_RESOURCE_LIMIT", 10),
            resource_window: dur_env("RL_RESOURCE_WINDOW", 3600),
            comment_limit: usize_env("RL_COMMENT_LIMIT", 30),
            comment_window: dur_env("RL_COMMENT_WINDOW", 600),
            view_limit: usize_env("RL_VIEW_LIMIT", 120),
            view_window: dur_env("RL_VIEW_WINDOW", 60),
        }
    }
}

/// High level guard used by handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }
    pub fn allow_resource(&self, who: &str) -> bool { self.limiter.check(&format!("resource:{who}"), self.cfg.resource_limit, self.cfg.resource_window) }
    pub fn allow_comment(&self, who: &str) -> bool { self.limiter.check(&format!("comment:{who}"), self.cfg.comment_limit, self.cfg.comment_window) }
    pub fn allow_view(&self, who: &str) -> bool { self.limiter.check(&format!("view:{who}"), self.cfg.view_limit, self.cfg.view_window) }
}
