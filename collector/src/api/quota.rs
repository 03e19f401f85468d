use std::time::Duration;

use chrono::{DateTime, Utc};

/// Calls are held back once a pool's known remaining drops below this.
pub const QUOTA_FLOOR: u32 = 10;

/// How many consecutive sleep-until-reset cycles a single request may burn
/// before the gateway gives up and surfaces the exhaustion to the caller.
pub const MAX_RESET_CYCLES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaPool {
    Core,
    Search,
    Graphql,
}

/// Known state of one quota pool. Seeded optimistically and corrected from
/// the rate-limit status endpoint; debited locally per issued call so the
/// ledger stays pessimistic between corrections.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolState {
    pub limit: u32,
    pub remaining: u32,
    pub reset: Option<DateTime<Utc>>,
}

impl PoolState {
    pub fn optimistic(limit: u32) -> Self {
        Self {
            limit,
            remaining: limit,
            reset: None,
        }
    }

    /// Overwrite with authoritative numbers from the status endpoint.
    pub fn observe(&mut self, limit: u32, remaining: u32, reset_epoch: i64) {
        self.limit = limit;
        self.remaining = remaining;
        self.reset = DateTime::from_timestamp(reset_epoch, 0);
    }

    /// Account for one issued call.
    pub fn debit(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    /// After a reset instant has passed, the pool is full again.
    pub fn assume_reset(&mut self) {
        self.remaining = self.limit;
        self.reset = None;
    }

    /// How long to sleep before the next call: set when remaining is below
    /// the floor and an unexpired reset instant is known. Sleeps land one
    /// second past reset to absorb clock skew.
    pub fn wait_before_call(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.remaining >= QUOTA_FLOOR {
            return None;
        }
        let reset = self.reset?;
        let until = (reset - now).num_milliseconds();
        if until <= 0 {
            return None;
        }
        Some(Duration::from_millis(until as u64 + 1_000))
    }
}

/// All three pools the API meters independently.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaLedger {
    pub core: PoolState,
    pub search: PoolState,
    pub graphql: PoolState,
}

impl Default for QuotaLedger {
    fn default() -> Self {
        Self {
            core: PoolState::optimistic(5_000),
            search: PoolState::optimistic(30),
            graphql: PoolState::optimistic(5_000),
        }
    }
}

impl QuotaLedger {
    pub fn pool(&self, pool: QuotaPool) -> &PoolState {
        match pool {
            QuotaPool::Core => &self.core,
            QuotaPool::Search => &self.search,
            QuotaPool::Graphql => &self.graphql,
        }
    }

    pub fn pool_mut(&mut self, pool: QuotaPool) -> &mut PoolState {
        match pool {
            QuotaPool::Core => &mut self.core,
            QuotaPool::Search => &mut self.search,
            QuotaPool::Graphql => &mut self.graphql,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn no_wait_above_floor() {
        let pool = PoolState::optimistic(5_000);
        assert_eq!(pool.wait_before_call(Utc::now()), None);
    }

    #[test]
    fn no_wait_without_known_reset() {
        let mut pool = PoolState::optimistic(5_000);
        pool.remaining = 0;
        assert_eq!(pool.wait_before_call(Utc::now()), None);
    }

    #[test]
    fn waits_until_just_past_reset() {
        let now = Utc::now();
        let mut pool = PoolState::optimistic(5_000);
        pool.remaining = QUOTA_FLOOR - 1;
        pool.reset = Some(now + ChronoDuration::seconds(30));

        let wait = pool.wait_before_call(now).unwrap();
        assert!(wait >= Duration::from_secs(30));
        assert!(wait <= Duration::from_secs(32));
    }

    #[test]
    fn expired_reset_means_no_wait() {
        let now = Utc::now();
        let mut pool = PoolState::optimistic(5_000);
        pool.remaining = 0;
        pool.reset = Some(now - ChronoDuration::seconds(5));
        assert_eq!(pool.wait_before_call(now), None);
    }

    #[test]
    fn debit_saturates_and_observe_corrects() {
        let mut pool = PoolState::optimistic(30);
        for _ in 0..40 {
            pool.debit();
        }
        assert_eq!(pool.remaining, 0);

        pool.observe(30, 12, 1_735_689_600);
        assert_eq!(pool.remaining, 12);
        assert!(pool.reset.is_some());

        pool.assume_reset();
        assert_eq!(pool.remaining, 30);
        assert_eq!(pool.reset, None);
    }
}
