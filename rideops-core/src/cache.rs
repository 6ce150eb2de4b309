use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::clock::Clock;
use crate::model::{Alert, MetricsSnapshot};

/// Closed key space of the dashboard cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    DashboardMetrics,
    DashboardAlerts,
}

impl CacheKey {
    pub const ALL: [CacheKey; 2] = [CacheKey::DashboardMetrics, CacheKey::DashboardAlerts];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::DashboardMetrics => "dashboard_metrics",
            CacheKey::DashboardAlerts => "dashboard_alerts",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, timestamp: DateTime<Utc>) -> Self {
        Self { data, timestamp }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.timestamp < ttl
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Metrics(MetricsSnapshot),
    Alerts(Vec<Alert>),
}

impl CachedValue {
    pub fn into_metrics(self) -> Option<MetricsSnapshot> {
        match self {
            CachedValue::Metrics(snapshot) => Some(snapshot),
            CachedValue::Alerts(_) => None,
        }
    }

    pub fn into_alerts(self) -> Option<Vec<Alert>> {
        match self {
            CachedValue::Alerts(alerts) => Some(alerts),
            CachedValue::Metrics(_) => None,
        }
    }
}

/// Key/value store behind the dashboard. Stale entries read as absent.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: CacheKey) -> Option<CachedValue>;
    async fn set(&self, key: CacheKey, value: CachedValue);
    async fn clear(&self);
}

/// In-process store. Expired entries are left in place until overwritten.
#[derive(Debug)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<CacheKey, CacheEntry<CachedValue>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryCacheStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Raw entry regardless of freshness.
    pub fn entry(&self, key: CacheKey) -> Option<CacheEntry<CachedValue>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: CacheKey) -> Option<CachedValue> {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&key)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| entry.data.clone())
    }

    async fn set(&self, key: CacheKey, value: CachedValue) {
        let entry = CacheEntry::new(value, self.clock.now());
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry);
    }

    async fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// One async guard per cache key so concurrent misses wait for a single
/// computation.
#[derive(Debug, Default)]
pub struct SingleFlight {
    metrics: AsyncMutex<()>,
    alerts: AsyncMutex<()>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: CacheKey) -> AsyncMutexGuard<'_, ()> {
        match key {
            CacheKey::DashboardMetrics => self.metrics.lock().await,
            CacheKey::DashboardAlerts => self.alerts.lock().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn entry_expires_at_ttl() {
        let clock = clock();
        let store = MemoryCacheStore::new(Duration::minutes(5), clock.clone());
        store
            .set(CacheKey::DashboardAlerts, CachedValue::Alerts(Vec::new()))
            .await;

        clock.advance(Duration::seconds(299));
        assert!(store.get(CacheKey::DashboardAlerts).await.is_some());

        clock.advance(Duration::seconds(1));
        assert!(store.get(CacheKey::DashboardAlerts).await.is_none());
        assert!(store.entry(CacheKey::DashboardAlerts).is_some());
    }

    #[tokio::test]
    async fn clear_drops_every_key() {
        let store = MemoryCacheStore::new(Duration::minutes(5), clock());
        for key in CacheKey::ALL {
            store.set(key, CachedValue::Alerts(Vec::new())).await;
        }
        store.clear().await;
        for key in CacheKey::ALL {
            assert!(store.get(key).await.is_none());
        }
    }

    #[test]
    fn wrong_shape_is_not_metrics() {
        assert!(CachedValue::Alerts(Vec::new()).into_metrics().is_none());
        assert_eq!(CachedValue::Alerts(Vec::new()).into_alerts(), Some(Vec::new()));
    }

    #[test]
    fn keys_use_dashboard_names() {
        assert_eq!(CacheKey::DashboardMetrics.as_str(), "dashboard_metrics");
        assert_eq!(CacheKey::DashboardAlerts.to_string(), "dashboard_alerts");
    }
}
