use rand::Rng;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};

/// Upper bound for all LLM calls of one request (the Lambda limit is 15 minutes).
pub const MAX_TOTAL_WAIT: Duration = Duration::from_secs(12 * 60);
/// Upper bound for one LLM call.
pub const MAX_SINGLE_CALL: Duration = Duration::from_secs(6 * 60);

const TOKEN_RANGES: [usize; 4] = [500, 3000, 5000, 8000];
const TIME_ESTIMATES: [f64; 5] = [25.0, 45.0, 90.0, 150.0, 180.0];
const MIN_WAIT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Granted,
    /// Too close to the overall deadline; the call proceeds unthrottled.
    Bypassed,
}

/// Token bucket shared by every request in the process.
pub struct Throttler {
    capacity: usize,
    bucket: Mutex<usize>,
    refilled: Notify,
    bypass_after: Duration,
}

impl Throttler {
    pub fn new(tokens_per_minute: usize) -> Self {
        Self {
            capacity: tokens_per_minute,
            bucket: Mutex::new(tokens_per_minute),
            refilled: Notify::new(),
            bypass_after: MAX_TOTAL_WAIT - MAX_SINGLE_CALL,
        }
    }

    pub fn with_deadlines(mut self, max_total: Duration, max_single: Duration) -> Self {
        self.bypass_after = max_total.saturating_sub(max_single);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn available(&self) -> usize {
        *self.bucket.lock().await
    }

    /// Wait until `needed` tokens can be taken from the bucket.
    ///
    /// `started` is when the surrounding request began; once more than
    /// `max_total - max_single` has elapsed the throttler steps aside.
    pub async fn acquire(&self, needed: usize, input_tokens: usize, started: Instant) -> Admission {
        // 單一請求不可能超過桶容量
        let needed = needed.min(self.capacity);

        loop {
            if started.elapsed() > self.bypass_after {
                tracing::warn!(
                    "Throttler: {} tokens needed, overall timeout too close, bypassing throttler",
                    needed
                );
                return Admission::Bypassed;
            }

            // 先註冊等待，檢查桶之後才發生的 release 也會喚醒
            let refilled = self.refilled.notified();
            tokio::pin!(refilled);
            refilled.as_mut().enable();

            let wait = {
                let mut bucket = self.bucket.lock().await;
                if *bucket >= needed {
                    *bucket -= needed;
                    tracing::debug!(
                        "Throttler: {} tokens needed, {} tokens remaining, no wait needed",
                        needed,
                        *bucket
                    );
                    return Admission::Granted;
                }
                let short = needed - *bucket;
                randomized_estimate(short, input_tokens.min(short))
            };

            tracing::info!(
                "Throttler: {} tokens needed, waiting up to {:.1} seconds",
                needed,
                wait.as_secs_f64()
            );
            let _ = tokio::time::timeout(wait, refilled).await;
        }
    }

    /// Return tokens after a call finishes; the bucket never exceeds capacity.
    pub async fn release(&self, tokens: usize) {
        let mut bucket = self.bucket.lock().await;
        *bucket = (*bucket + tokens).min(self.capacity);
        tracing::debug!("Throttler: refilled bucket to {} tokens", *bucket);
        self.refilled.notify_waiters();
    }
}

/// Seconds expected to process `tokens`, weighting input heavier than output.
pub fn weighted_estimate(tokens: usize, input_tokens: usize) -> f64 {
    let output_tokens = tokens.saturating_sub(input_tokens);
    let weighted = (input_tokens as f64 * 1.3 + output_tokens as f64 * 0.7) as usize;

    for (i, upper) in TOKEN_RANGES.iter().enumerate() {
        if weighted <= *upper {
            return (weighted as f64 / *upper as f64) * TIME_ESTIMATES[i];
        }
    }
    TIME_ESTIMATES[TIME_ESTIMATES.len() - 1]
}

fn randomized_estimate(tokens: usize, input_tokens: usize) -> Duration {
    let factor = rand::rng().random_range(0.95..1.05);
    Duration::from_secs_f64(weighted_estimate(tokens, input_tokens) * factor).max(MIN_WAIT)
}
