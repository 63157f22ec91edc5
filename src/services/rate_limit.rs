use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    fn take(&mut self) -> Option<Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - self.tokens) / self.refill_per_sec))
        }
    }
}

/// Token-bucket limiter, one per search provider. `new(1, 1s)` gives the
/// classic 1 req/sec shape, `new(100, 60s)` 100 req/min with burst up to
/// the full window. Callers queue at `acquire`, they never fail.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<Bucket>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, per: Duration) -> Self {
        let capacity = max_requests.max(1) as f64;
        RateLimiter {
            inner: Arc::new(Mutex::new(Bucket {
                tokens: capacity,
                capacity,
                refill_per_sec: capacity / per.as_secs_f64().max(f64::EPSILON),
                last_refill: Instant::now(),
            })),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.inner.lock().await;
                bucket.take()
            };
            match wait {
                None => return,
                // Re-check after sleeping: another task may have taken the
                // token that refilled in the meantime.
                Some(duration) => sleep(duration).await,
            }
        }
    }
}
