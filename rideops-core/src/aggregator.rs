use std::sync::Arc;
use std::time::Instant;

use chrono::FixedOffset;
use tracing::debug;

use crate::clock::Clock;
use crate::config::MetricsSection;
use crate::health::HealthEvaluator;
use crate::model::{
    mean, round_currency, round_rating, DriverCounts, DriverStats, DriverStatus, MetricsSnapshot,
    RevenueStats, RideStats, RideStatus, UserStats,
};
use crate::source::{DataSource, RideFilter, SourceResult, UserFilter};
use crate::window::{TimeRange, TimeWindows};

/// Builds [`MetricsSnapshot`]s by fanning out independent queries against a
/// [`DataSource`] and joining them. Any failed query fails the whole snapshot.
#[derive(Clone)]
pub struct MetricsAggregator {
    source: Arc<dyn DataSource>,
    health: HealthEvaluator,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    config: MetricsSection,
}

impl MetricsAggregator {
    pub fn new(
        source: Arc<dyn DataSource>,
        health: HealthEvaluator,
        clock: Arc<dyn Clock>,
        offset: FixedOffset,
        config: MetricsSection,
    ) -> Self {
        Self {
            source,
            health,
            clock,
            offset,
            config,
        }
    }

    pub async fn compute_snapshot(&self) -> SourceResult<MetricsSnapshot> {
        let started = Instant::now();
        let now = self.clock.now();
        let windows = TimeWindows::at(now, self.offset);

        let (active_rides, today, week, revenue, drivers, users, system_status) = tokio::try_join!(
            self.active_rides(),
            self.ride_stats(windows.today),
            self.ride_stats(windows.week),
            self.revenue_stats(&windows),
            self.driver_stats(),
            self.user_stats(&windows),
            self.health.evaluate(now),
        )?;

        let snapshot = MetricsSnapshot::assemble(
            active_rides,
            today,
            week,
            revenue,
            drivers,
            users,
            system_status,
            now,
        );
        debug!(
            target: "rideops.metrics",
            active_rides = snapshot.active_rides,
            completed_today = snapshot.completed_rides_today,
            online_drivers = snapshot.online_drivers,
            status = %snapshot.system_status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "metrics snapshot computed"
        );
        Ok(snapshot)
    }

    pub async fn active_rides(&self) -> SourceResult<u64> {
        let filter = RideFilter::any().with_statuses(RideStatus::ACTIVE);
        self.source.count_rides(&filter).await
    }

    pub async fn ride_stats(&self, window: TimeRange) -> SourceResult<RideStats> {
        ride_stats(self.source.as_ref(), window).await
    }

    /// Revenue is attributed by last update time. The average fare is taken
    /// from a bounded sample of completed rides, not the full population.
    pub async fn revenue_stats(&self, windows: &TimeWindows) -> SourceResult<RevenueStats> {
        let (today, week, fares) = tokio::try_join!(
            self.source.aggregate_ride_revenue(windows.today),
            self.source.aggregate_ride_revenue(windows.week),
            self.source
                .sample_completed_fares(self.config.fare_sample_limit),
        )?;
        Ok(RevenueStats {
            revenue_today: round_currency(today.sum),
            revenue_this_week: round_currency(week.sum),
            average_fare: round_currency(mean(&fares)),
        })
    }

    pub async fn driver_stats(&self) -> SourceResult<DriverStats> {
        let (online, busy, ratings) = tokio::try_join!(
            self.source.count_drivers(DriverStatus::Online),
            self.source.count_drivers(DriverStatus::Busy),
            self.source.list_driver_ratings(),
        )?;
        let counts = DriverCounts { online, busy };
        Ok(DriverStats {
            online,
            busy,
            available: counts.available(),
            average_rating: round_rating(mean(&ratings)),
        })
    }

    /// `average_rating` is the mean of each user's own average, so a user
    /// with many ratings weighs the same as a user with one.
    pub async fn user_stats(&self, windows: &TimeWindows) -> SourceResult<UserStats> {
        let (active_today, new_this_week, total, per_user_averages) = tokio::try_join!(
            self.source.count_users(UserFilter::LastLogin(windows.today)),
            self.source.count_users(UserFilter::CreatedAt(windows.week)),
            self.source.count_users(UserFilter::All),
            self.source.list_user_rating_averages(),
        )?;
        Ok(UserStats {
            active_today,
            new_this_week,
            total,
            average_rating: round_rating(mean(&per_user_averages)),
        })
    }
}

/// Completed, cancelled and total rides created within `window`.
pub async fn ride_stats(source: &dyn DataSource, window: TimeRange) -> SourceResult<RideStats> {
    let completed = RideFilter::any()
        .with_status(RideStatus::Completed)
        .created_within(window);
    let cancelled = RideFilter::any()
        .with_status(RideStatus::Cancelled)
        .created_within(window);
    let total = RideFilter::any().created_within(window);

    let (completed, cancelled, total) = tokio::try_join!(
        source.count_rides(&completed),
        source.count_rides(&cancelled),
        source.count_rides(&total),
    )?;
    Ok(RideStats {
        completed,
        cancelled,
        total,
    })
}
