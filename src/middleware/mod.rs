//! In-memory sliding-window rate limiter for the login endpoint.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct RateLimiter {
    hits: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    max_hits: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_hits: usize, window_secs: u64) -> Self {
        Self {
            hits: Arc::new(Mutex::new(HashMap::new())),
            max_hits,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Returns `false` when `key` has exhausted its allowance for the
    /// current window.
    pub async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        let window = hits.entry(key.to_string()).or_default();

        while let Some(&oldest) = window.front() {
            if now.duration_since(oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() < self.max_hits {
            window.push_back(now);
            true
        } else {
            false
        }
    }

    /// Evicts keys whose entire window has expired. Run periodically so
    /// one-off client IPs do not accumulate for the process lifetime.
    pub async fn prune(&self) {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        hits.retain(|_, window| {
            while let Some(&oldest) = window.front() {
                if now.duration_since(oldest) >= self.window {
                    window.pop_front();
                } else {
                    break;
                }
            }
            !window.is_empty()
        });
        tracing::debug!(active_keys = hits.len(), "rate limiter pruned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_after_limit() {
        let limiter = RateLimiter::new(2, 60);
        assert!(limiter.allow("1.2.3.4").await);
        assert!(limiter.allow("1.2.3.4").await);
        assert!(!limiter.allow("1.2.3.4").await);
        // Other keys are unaffected.
        assert!(limiter.allow("5.6.7.8").await);
    }

    #[tokio::test]
    async fn prune_evicts_idle_keys() {
        let limiter = RateLimiter::new(5, 1);
        for i in 0..50 {
            assert!(limiter.allow(&format!("10.0.0.{i}")).await);
        }
        assert_eq!(limiter.hits.lock().await.len(), 50);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        limiter.prune().await;
        assert_eq!(limiter.hits.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn prune_keeps_keys_still_in_window() {
        let limiter = RateLimiter::new(5, 60);
        limiter.allow("fresh").await;
        limiter.prune().await;
        assert_eq!(limiter.hits.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn window_expiry_frees_the_key() {
        let limiter = RateLimiter::new(1, 1);
        assert!(limiter.allow("ip").await);
        assert!(!limiter.allow("ip").await);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.allow("ip").await);
    }
}
