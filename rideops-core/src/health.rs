use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::config::HealthSection;
use crate::model::{DriverStatus, RideStatus, SystemStatus};
use crate::source::{DataSource, RideFilter, SourceResult};

/// Observations the classification is derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthSignals {
    pub connectivity_ok: bool,
    pub long_running_rides: u64,
    pub active_rides: u64,
    pub online_drivers: u64,
}

/// critical > warning > healthy.
pub fn classify(signals: &HealthSignals, demand_supply_warning_ratio: f64) -> SystemStatus {
    if !signals.connectivity_ok || signals.long_running_rides > 0 {
        return SystemStatus::Critical;
    }
    if signals.active_rides as f64 > demand_supply_warning_ratio * signals.online_drivers as f64 {
        return SystemStatus::Warning;
    }
    SystemStatus::Healthy
}

#[derive(Clone)]
pub struct HealthEvaluator {
    source: Arc<dyn DataSource>,
    config: HealthSection,
}

impl HealthEvaluator {
    pub fn new(source: Arc<dyn DataSource>, config: HealthSection) -> Self {
        Self { source, config }
    }

    /// A failed probe yields `Critical` rather than an error; any other query
    /// failure is returned to the caller.
    pub async fn evaluate(&self, now: DateTime<Utc>) -> SourceResult<SystemStatus> {
        if let Err(err) = self.source.probe_connectivity().await {
            warn!(target: "rideops.health", error = %err, "connectivity probe failed");
            return Ok(SystemStatus::Critical);
        }

        let critical_after = Duration::minutes(i64::from(self.config.stuck_ride_critical_minutes));
        let cutoff = now - critical_after;
        let active_filter = RideFilter::any().with_statuses(RideStatus::ACTIVE);
        let (long_running_rides, active_rides, online_drivers) = tokio::try_join!(
            self.source.count_stuck_rides(RideStatus::InProgress, cutoff),
            self.source.count_rides(&active_filter),
            self.source.count_drivers(DriverStatus::Online),
        )?;

        let signals = HealthSignals {
            connectivity_ok: true,
            long_running_rides,
            active_rides,
            online_drivers,
        };
        let status = classify(&signals, self.config.demand_supply_warning_ratio);
        if status != SystemStatus::Healthy {
            warn!(
                target: "rideops.health",
                status = %status,
                long_running_rides,
                active_rides,
                online_drivers,
                "system health degraded"
            );
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(connectivity_ok: bool, long_running: u64, active: u64, online: u64) -> HealthSignals {
        HealthSignals {
            connectivity_ok,
            long_running_rides: long_running,
            active_rides: active,
            online_drivers: online,
        }
    }

    #[test]
    fn failed_probe_beats_warning_ratio() {
        assert_eq!(classify(&signals(false, 0, 50, 1), 2.0), SystemStatus::Critical);
    }

    #[test]
    fn long_running_ride_is_critical() {
        assert_eq!(classify(&signals(true, 1, 0, 10), 2.0), SystemStatus::Critical);
    }

    #[test]
    fn demand_over_twice_supply_warns() {
        assert_eq!(classify(&signals(true, 0, 21, 10), 2.0), SystemStatus::Warning);
        assert_eq!(classify(&signals(true, 0, 20, 10), 2.0), SystemStatus::Healthy);
    }

    #[test]
    fn no_drivers_with_active_rides_warns() {
        assert_eq!(classify(&signals(true, 0, 1, 0), 2.0), SystemStatus::Warning);
        assert_eq!(classify(&signals(true, 0, 0, 0), 2.0), SystemStatus::Healthy);
    }
}
