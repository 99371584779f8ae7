//! Rate limiting utilities

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ClientId;

/// Token-bucket rate limiter with continuous refill, one bucket per client
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    clients: HashMap<ClientId, ClientBucket>,
}

#[derive(Debug)]
struct ClientBucket {
    tokens: f64,
    last_seen: Instant,
}

impl RateLimiter {
    /// Allow `max_requests` per `interval`, with bursts up to `max_requests`.
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        let secs = interval.as_secs_f64().max(f64::EPSILON);
        Self {
            capacity: max_requests as f64,
            refill_per_sec: max_requests as f64 / secs,
            clients: HashMap::new(),
        }
    }

    /// Returns `true` if the request is allowed
    pub fn check(&mut self, client_id: &ClientId) -> bool {
        self.check_at(client_id, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock reading
    pub fn check_at(&mut self, client_id: &ClientId, now: Instant) -> bool {
        let capacity = self.capacity;
        let bucket = self
            .clients
            .entry(client_id.clone())
            .or_insert(ClientBucket {
                tokens: capacity,
                last_seen: now,
            });

        let elapsed = now.saturating_duration_since(bucket.last_seen).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(capacity);
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Remove a client's rate limit state
    pub fn remove_client(&mut self, client_id: &ClientId) {
        self.clients.remove(client_id);
    }

    /// Drop buckets not touched within `stale_after`
    pub fn cleanup(&mut self, stale_after: Duration) {
        let now = Instant::now();
        self.clients
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) < stale_after);
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_burst_then_denies() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
        let client = ClientId::new();
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.check_at(&client, now));
        }
        assert!(!limiter.check_at(&client, now));
    }

    #[test]
    fn refills_over_time() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(1));
        let client = ClientId::new();
        let start = Instant::now();

        assert!(limiter.check_at(&client, start));
        assert!(limiter.check_at(&client, start));
        assert!(!limiter.check_at(&client, start));

        // Half a second refills one token at 2/sec
        assert!(limiter.check_at(&client, start + Duration::from_millis(500)));
        assert!(!limiter.check_at(&client, start + Duration::from_millis(500)));
    }

    #[test]
    fn clients_have_separate_buckets() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(1));
        let a = ClientId::new();
        let b = ClientId::new();
        let now = Instant::now();

        assert!(limiter.check_at(&a, now));
        assert!(!limiter.check_at(&a, now));
        assert!(limiter.check_at(&b, now));

        limiter.remove_client(&a);
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
