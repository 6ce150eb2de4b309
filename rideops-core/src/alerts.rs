use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use tracing::{debug, warn};

use crate::aggregator::ride_stats;
use crate::clock::Clock;
use crate::config::AlertsSection;
use crate::model::{Alert, AlertSeverity, AlertType, DriverStatus, RideStats, RideStatus};
use crate::source::{DataSource, SourceResult};
use crate::window::TimeWindows;

/// Everything the rule set looks at, fetched in one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertInputs {
    pub online_drivers: u64,
    pub today: RideStats,
    pub revenue_today: f64,
    pub revenue_yesterday: f64,
    pub stuck_rides: u64,
}

/// Percentage change from `yesterday` to `today`, `None` when yesterday had
/// no revenue to compare against.
pub fn revenue_change_percent(today: f64, yesterday: f64) -> Option<f64> {
    if yesterday > 0.0 {
        Some((today - yesterday) / yesterday * 100.0)
    } else {
        None
    }
}

/// Applies every rule independently. Output order follows rule order.
pub fn apply_rules(inputs: &AlertInputs, limits: &AlertsSection, now: DateTime<Utc>) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if inputs.online_drivers < limits.min_online_drivers {
        alerts.push(Alert::new(
            "low_driver_availability",
            AlertType::Performance,
            AlertSeverity::High,
            "Low driver availability",
            format!(
                "Only {} drivers online (minimum {})",
                inputs.online_drivers, limits.min_online_drivers
            ),
            now,
        ));
    }

    let cancellation_rate = inputs.today.cancellation_rate();
    if cancellation_rate > limits.cancellation_rate_percent {
        alerts.push(Alert::new(
            "high_cancellation_rate",
            AlertType::Performance,
            AlertSeverity::Medium,
            "High cancellation rate",
            format!(
                "Cancellation rate today is {:.1}% ({} of {} rides)",
                cancellation_rate, inputs.today.cancelled, inputs.today.total
            ),
            now,
        ));
    }

    if let Some(change) = revenue_change_percent(inputs.revenue_today, inputs.revenue_yesterday) {
        if change < -limits.revenue_drop_percent {
            alerts.push(Alert::new(
                "revenue_drop",
                AlertType::Financial,
                AlertSeverity::High,
                "Revenue drop",
                format!(
                    "Revenue today is {:.1}% below yesterday ({:.2} vs {:.2})",
                    change.abs(),
                    inputs.revenue_today,
                    inputs.revenue_yesterday
                ),
                now,
            ));
        }
    }

    if inputs.stuck_rides > 0 {
        alerts.push(Alert::new(
            "stuck_rides",
            AlertType::Technical,
            AlertSeverity::Medium,
            "Rides stuck in progress",
            format!(
                "{} rides in progress without an update for over {} minutes",
                inputs.stuck_rides, limits.stuck_ride_minutes
            ),
            now,
        ));
    }

    alerts
}

#[derive(Clone)]
pub struct AlertEngine {
    source: Arc<dyn DataSource>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    limits: AlertsSection,
}

impl AlertEngine {
    pub fn new(
        source: Arc<dyn DataSource>,
        clock: Arc<dyn Clock>,
        offset: FixedOffset,
        limits: AlertsSection,
    ) -> Self {
        Self {
            source,
            clock,
            offset,
            limits,
        }
    }

    pub async fn gather_inputs(&self, now: DateTime<Utc>) -> SourceResult<AlertInputs> {
        let windows = TimeWindows::at(now, self.offset);
        let stuck_after = Duration::minutes(i64::from(self.limits.stuck_ride_minutes));
        let stuck_before = now - stuck_after;

        let (online_drivers, today, revenue_today, revenue_yesterday, stuck_rides) = tokio::try_join!(
            self.source.count_drivers(DriverStatus::Online),
            ride_stats(self.source.as_ref(), windows.today),
            self.source.aggregate_ride_revenue(windows.today),
            self.source.aggregate_ride_revenue(windows.yesterday()),
            self.source
                .count_stuck_rides(RideStatus::InProgress, stuck_before),
        )?;

        Ok(AlertInputs {
            online_drivers,
            today,
            revenue_today: revenue_today.sum,
            revenue_yesterday: revenue_yesterday.sum,
            stuck_rides,
        })
    }

    pub async fn evaluate_alerts(&self) -> SourceResult<Vec<Alert>> {
        let now = self.clock.now();
        let inputs = self.gather_inputs(now).await?;
        let alerts = apply_rules(&inputs, &self.limits, now);
        for alert in &alerts {
            warn!(
                target: "rideops.alerts",
                id = %alert.id,
                severity = %alert.severity,
                "{}",
                alert.message
            );
        }
        debug!(target: "rideops.alerts", count = alerts.len(), "alerts evaluated");
        Ok(alerts)
    }
}
