//! Read-only query contracts over rides, drivers, users and ratings.

pub mod error;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{DriverStatus, RideStatus};
use crate::window::TimeRange;

pub use error::{SourceError, SourceResult};
pub use sqlite::{
    DriverRecord, RatingRecord, RideRecord, SqliteDataSource, SqliteDataSourceBuilder, UserRecord,
};

/// Ride selection. An empty status list matches every status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RideFilter {
    pub statuses: Vec<RideStatus>,
    pub created_at: Option<TimeRange>,
}

impl RideFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: RideStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = RideStatus>) -> Self {
        self.statuses.extend(statuses);
        self
    }

    pub fn created_within(mut self, range: TimeRange) -> Self {
        self.created_at = Some(range);
        self
    }

    pub fn matches(&self, status: RideStatus, created_at: DateTime<Utc>) -> bool {
        let status_ok = self.statuses.is_empty() || self.statuses.contains(&status);
        let range_ok = self
            .created_at
            .map(|range| range.contains(created_at))
            .unwrap_or(true);
        status_ok && range_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UserFilter {
    LastLogin(TimeRange),
    CreatedAt(TimeRange),
    All,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct RevenueAggregate {
    pub sum: f64,
    pub count: u64,
}

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn count_rides(&self, filter: &RideFilter) -> SourceResult<u64>;

    /// Completed rides whose last update falls in `updated_at`.
    async fn aggregate_ride_revenue(&self, updated_at: TimeRange)
        -> SourceResult<RevenueAggregate>;

    async fn sample_completed_fares(&self, limit: usize) -> SourceResult<Vec<f64>>;

    async fn count_drivers(&self, status: DriverStatus) -> SourceResult<u64>;

    /// Per-driver average ratings, skipping drivers without one.
    async fn list_driver_ratings(&self) -> SourceResult<Vec<f64>>;

    async fn count_users(&self, filter: UserFilter) -> SourceResult<u64>;

    /// One average per rated user.
    async fn list_user_rating_averages(&self) -> SourceResult<Vec<f64>>;

    async fn probe_connectivity(&self) -> SourceResult<()>;

    async fn count_stuck_rides(
        &self,
        status: RideStatus,
        updated_before: DateTime<Utc>,
    ) -> SourceResult<u64>;
}
