//! Per-run call budget.
//!
//! Three limits apply to non-exempt tools, checked in order:
//! a per-request cap, a sliding one-minute window, and a minimum spacing
//! between consecutive calls (longer for heavy operations). The first two
//! refuse the call; spacing only delays it.
//!
//! The request counter belongs to one budget. The minute window and the
//! spacing clock are shared by every budget [`fork`](CallBudget::fork)ed
//! from the same root.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use toolgate_config::RateLimitConfig;
use toolgate_core::ToolError;

const WINDOW: Duration = Duration::from_secs(60);

/// Call budget for one request.
///
/// The window mutex is never held across an await.
pub struct CallBudget {
    max_per_request: u32,
    max_per_minute: u32,
    min_delay: Duration,
    heavy_delay: Duration,
    calls_this_request: AtomicU32,
    history: Arc<Mutex<VecDeque<Instant>>>,
}

impl CallBudget {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_per_request: config.max_calls_per_request,
            max_per_minute: config.max_calls_per_minute,
            min_delay: Duration::from_millis(config.min_call_delay_ms),
            heavy_delay: Duration::from_millis(config.heavy_call_delay_ms),
            calls_this_request: AtomicU32::new(0),
            history: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// A budget for a new request: fresh counter, same minute window.
    pub fn fork(&self) -> Self {
        Self {
            max_per_request: self.max_per_request,
            max_per_minute: self.max_per_minute,
            min_delay: self.min_delay,
            heavy_delay: self.heavy_delay,
            calls_this_request: AtomicU32::new(0),
            history: Arc::clone(&self.history),
        }
    }

    /// Start a new request on this budget. The minute window is kept.
    pub fn reset(&self) {
        self.calls_this_request.store(0, Ordering::SeqCst);
    }

    /// Calls counted against the current request.
    pub fn calls_this_request(&self) -> u32 {
        self.calls_this_request.load(Ordering::SeqCst)
    }

    /// Wait for a slot, or refuse with a rate-limit error.
    pub async fn acquire(&self, heavy: bool) -> Result<(), ToolError> {
        let reserved = self
            .calls_this_request
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_per_request).then_some(n + 1)
            });
        if reserved.is_err() {
            return Err(ToolError::RateLimited(format!(
                "Rate limit: Maximum {} API calls per request reached. \
                 Please be more specific or break your request into smaller parts.",
                self.max_per_request
            )));
        }

        let wait = {
            let now = Instant::now();
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());

            while history
                .front()
                .is_some_and(|t| now.duration_since(*t) > WINDOW)
            {
                history.pop_front();
            }

            if history.len() >= self.max_per_minute as usize
                && let Some(oldest) = history.front()
            {
                let remaining = WINDOW.saturating_sub(now.duration_since(*oldest));
                let secs = remaining.as_millis().div_ceil(1000);
                self.calls_this_request.fetch_sub(1, Ordering::SeqCst);
                return Err(ToolError::RateLimited(format!(
                    "Rate limit: Too many API calls. Please wait {secs} seconds before trying again."
                )));
            }

            let spacing = if heavy { self.heavy_delay } else { self.min_delay };
            let wait = history
                .back()
                .map(|last| spacing.saturating_sub(now.duration_since(*last)))
                .unwrap_or_default();

            // Reserve the slot before sleeping so concurrent callers see it
            history.push_back(now + wait);
            wait
        };

        if !wait.is_zero() {
            tracing::trace!(wait_ms = wait.as_millis() as u64, heavy, "Spacing tool call");
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }
}
