//! Read-through balance cache
//!
//! One instance per process, injected where needed. The clock is a
//! trait so expiry is testable without sleeping.

use crate::provider::PaymentProvider;
use crate::Result;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

pub const DEFAULT_BALANCE_TTL: Duration = Duration::from_secs(30);

/// Monotonic time source, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct CachedBalance {
    value: Decimal,
    fetched_at: Instant,
}

/// Caches provider balance lookups per (address, token) for a short TTL.
pub struct BalanceCache {
    provider: Arc<dyn PaymentProvider>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: RwLock<HashMap<(String, Option<String>), CachedBalance>>,
}

impl BalanceCache {
    pub fn new(provider: Arc<dyn PaymentProvider>) -> Self {
        Self::with_clock(provider, Arc::new(SystemClock), DEFAULT_BALANCE_TTL)
    }

    pub fn with_clock(
        provider: Arc<dyn PaymentProvider>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            provider,
            clock,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached balance if fresh, otherwise fetch and store.
    pub async fn balance(&self, address: &str, token_contract: Option<&str>) -> Result<Decimal> {
        let key = (address.to_string(), token_contract.map(|s| s.to_string()));
        let now = self.clock.now();

        {
            let entries = self.entries.read().await;
            if let Some(cached) = entries.get(&key) {
                if now.duration_since(cached.fetched_at) < self.ttl {
                    debug!(address = %address, "Balance cache hit");
                    return Ok(cached.value);
                }
            }
        }

        let value = self.provider.balance(address, token_contract).await?;
        debug!(address = %address, balance = %value, "Balance cache refresh");

        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CachedBalance {
                value,
                fetched_at: now,
            },
        );

        Ok(value)
    }
}
