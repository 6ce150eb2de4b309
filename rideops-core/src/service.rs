use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};

use crate::aggregator::MetricsAggregator;
use crate::alerts::AlertEngine;
use crate::cache::{CacheKey, CacheStore, CachedValue, MemoryCacheStore, SingleFlight};
use crate::clock::Clock;
use crate::config::RideOpsConfig;
use crate::error::{ConfigError, Result as ConfigResult};
use crate::health::HealthEvaluator;
use crate::model::{Alert, MetricsSnapshot, SystemStatus};
use crate::source::{DataSource, SourceError};

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Source(#[from] SourceError),
}

pub type DashboardResult<T> = std::result::Result<T, DashboardError>;

/// Cache-checked entry point used by the admin dashboard.
pub struct DashboardService {
    aggregator: MetricsAggregator,
    alerts: AlertEngine,
    health: HealthEvaluator,
    clock: Arc<dyn Clock>,
    cache: Arc<dyn CacheStore>,
    flights: SingleFlight,
}

impl DashboardService {
    /// Validates `config` before wiring the components, so thresholds that
    /// would misbehave at query time are rejected up front.
    pub fn new(
        source: Arc<dyn DataSource>,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        config: &RideOpsConfig,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let offset = config
            .windows
            .offset()
            .ok_or_else(|| ConfigError::Invalid {
                field: "windows.utc_offset_minutes",
                reason: format!("{} is not a valid offset", config.windows.utc_offset_minutes),
            })?;
        let health = HealthEvaluator::new(Arc::clone(&source), config.health.clone());
        let aggregator = MetricsAggregator::new(
            Arc::clone(&source),
            health.clone(),
            Arc::clone(&clock),
            offset,
            config.metrics.clone(),
        );
        let alerts = AlertEngine::new(source, Arc::clone(&clock), offset, config.alerts.clone());
        Ok(Self {
            aggregator,
            alerts,
            health,
            clock,
            cache,
            flights: SingleFlight::new(),
        })
    }

    /// Uses a [`MemoryCacheStore`] with the configured TTL.
    pub fn in_memory(
        source: Arc<dyn DataSource>,
        clock: Arc<dyn Clock>,
        config: &RideOpsConfig,
    ) -> ConfigResult<Self> {
        let cache = Arc::new(MemoryCacheStore::new(config.cache.ttl(), Arc::clone(&clock)));
        Self::new(source, cache, clock, config)
    }

    pub async fn get_metrics(&self) -> DashboardResult<MetricsSnapshot> {
        self.cached(
            CacheKey::DashboardMetrics,
            CachedValue::into_metrics,
            CachedValue::Metrics,
            || self.aggregator.compute_snapshot(),
        )
        .await
    }

    pub async fn get_alerts(&self) -> DashboardResult<Vec<Alert>> {
        self.cached(
            CacheKey::DashboardAlerts,
            CachedValue::into_alerts,
            CachedValue::Alerts,
            || self.alerts.evaluate_alerts(),
        )
        .await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        debug!(target: "rideops.cache", "cache cleared");
    }

    /// Uncached health evaluation.
    pub async fn health(&self) -> DashboardResult<SystemStatus> {
        let status = self
            .health
            .evaluate(self.clock.now())
            .await
            .map_err(|err| {
                error!(target: "rideops.health", error = %err, "health evaluation failed");
                err
            })?;
        Ok(status)
    }

    async fn cached<T, Fut>(
        &self,
        key: CacheKey,
        extract: fn(CachedValue) -> Option<T>,
        wrap: fn(T) -> CachedValue,
        compute: impl FnOnce() -> Fut,
    ) -> DashboardResult<T>
    where
        T: Clone,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        if let Some(hit) = self.cache.get(key).await.and_then(extract) {
            debug!(target: "rideops.cache", key = %key, "cache hit");
            return Ok(hit);
        }

        let _flight = self.flights.acquire(key).await;
        if let Some(hit) = self.cache.get(key).await.and_then(extract) {
            debug!(target: "rideops.cache", key = %key, "cache filled while waiting");
            return Ok(hit);
        }

        debug!(target: "rideops.cache", key = %key, "cache miss");
        let value = compute().await.map_err(|err| {
            error!(target: "rideops.cache", key = %key, error = %err, "recompute failed");
            err
        })?;
        self.cache.set(key, wrap(value.clone())).await;
        Ok(value)
    }
}
