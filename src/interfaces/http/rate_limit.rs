use crate::error::{PaymentError, Result};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Sliding-window rate limiter keyed by invoice id.
///
/// Bounds how often a payment session can be requested for one invoice
/// (default 5 requests per 60 s). Constructed once and injected through the
/// router state; there is no global registry. Cleanup runs every
/// `cleanup_interval` requests to keep the map from accumulating invoices
/// that stopped receiving traffic.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    cleanup_interval: u64,
    state: RwLock<HashMap<String, Vec<Instant>>>,
    request_count: AtomicU64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            cleanup_interval: 100,
            state: RwLock::new(HashMap::new()),
            request_count: AtomicU64::new(0),
        }
    }

    /// Records the request if within budget, or fails with `RateLimited`.
    pub fn check(&self, invoice_id: &str) -> Result<()> {
        let count = self.request_count.fetch_add(1, Ordering::Relaxed);
        if count % self.cleanup_interval == self.cleanup_interval - 1 {
            self.cleanup();
        }

        let now = Instant::now();
        let mut state = self
            .state
            .write()
            .map_err(|_| PaymentError::Store("rate limiter lock poisoned".to_string()))?;
        let timestamps = state.entry(invoice_id.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);
        if timestamps.len() >= self.max_requests as usize {
            return Err(PaymentError::RateLimited(invoice_id.to_string()));
        }
        timestamps.push(now);
        Ok(())
    }

    fn cleanup(&self) {
        let now = Instant::now();
        if let Ok(mut state) = self.state.write() {
            state.retain(|_, timestamps| {
                timestamps.retain(|t| now.duration_since(*t) < self.window);
                !timestamps.is_empty()
            });
        }
    }
}
