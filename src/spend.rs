//! Per-user daily spend limiter
//!
//! Caps the number of transfer attempts per user per day, independent
//! of amount. The counter increments when a transfer is accepted, not
//! when it completes, so failed provider calls still consume a slot.

use crate::error::AgentOpsError;
use crate::models::DailySpendCounter;
use crate::Result;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Daily cap on transfer attempts per user.
pub const MAX_DAILY_TRANSACTIONS: u32 = 50;

#[async_trait::async_trait]
pub trait SpendTracker: Send + Sync {
    /// Atomically check the counter and increment it. Returns the new
    /// count, or `RateLimited` when the user is already at the cap.
    /// The check and increment must be one operation: two simultaneous
    /// requests at count cap-1 may not both pass.
    async fn try_reserve(&self, user_id: Uuid, date: NaiveDate) -> Result<u32>;

    /// Snapshot of the counter; a user with no activity reads as zero.
    async fn counter_for(&self, user_id: Uuid, date: NaiveDate) -> Result<DailySpendCounter>;
}

/// In-memory tracker; one mutex covers the check-and-increment.
pub struct InMemorySpendTracker {
    counters: Arc<Mutex<HashMap<(Uuid, NaiveDate), u32>>>,
    cap: u32,
}

impl InMemorySpendTracker {
    pub fn new() -> Self {
        Self::with_cap(MAX_DAILY_TRANSACTIONS)
    }

    pub fn with_cap(cap: u32) -> Self {
        Self {
            counters: Arc::new(Mutex::new(HashMap::new())),
            cap,
        }
    }
}

impl Default for InMemorySpendTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SpendTracker for InMemorySpendTracker {
    async fn try_reserve(&self, user_id: Uuid, date: NaiveDate) -> Result<u32> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| AgentOpsError::Storage("spend lock poisoned".into()))?;

        let count = counters.entry((user_id, date)).or_insert(0);
        if *count >= self.cap {
            return Err(AgentOpsError::RateLimited);
        }
        *count += 1;
        Ok(*count)
    }

    async fn counter_for(&self, user_id: Uuid, date: NaiveDate) -> Result<DailySpendCounter> {
        let counters = self
            .counters
            .lock()
            .map_err(|_| AgentOpsError::Storage("spend lock poisoned".into()))?;
        Ok(DailySpendCounter {
            user_id,
            date,
            transaction_count: counters.get(&(user_id, date)).copied().unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        chrono::Utc::now().date_naive()
    }

    #[tokio::test]
    async fn test_reserve_increments() {
        let tracker = InMemorySpendTracker::new();
        let user = Uuid::new_v4();

        assert_eq!(tracker.try_reserve(user, today()).await.unwrap(), 1);
        assert_eq!(tracker.try_reserve(user, today()).await.unwrap(), 2);
        assert_eq!(tracker.counter_for(user, today()).await.unwrap().transaction_count, 2);
    }

    #[tokio::test]
    async fn test_cap_rejects_regardless_of_amount() {
        let tracker = InMemorySpendTracker::with_cap(2);
        let user = Uuid::new_v4();

        tracker.try_reserve(user, today()).await.unwrap();
        tracker.try_reserve(user, today()).await.unwrap();

        let err = tracker.try_reserve(user, today()).await.unwrap_err();
        assert!(matches!(err, AgentOpsError::RateLimited));
        // The rejected attempt did not bump the counter.
        assert_eq!(tracker.counter_for(user, today()).await.unwrap().transaction_count, 2);
    }

    #[tokio::test]
    async fn test_counters_are_per_day() {
        let tracker = InMemorySpendTracker::with_cap(1);
        let user = Uuid::new_v4();
        let yesterday = today().pred_opt().unwrap();

        tracker.try_reserve(user, yesterday).await.unwrap();
        // A new day starts a fresh counter.
        assert_eq!(tracker.try_reserve(user, today()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_respect_cap() {
        let tracker = Arc::new(InMemorySpendTracker::with_cap(5));
        let user = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(
                async move { tracker.try_reserve(user, today()).await },
            ));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
        assert_eq!(tracker.counter_for(user, today()).await.unwrap().transaction_count, 5);
    }
}
