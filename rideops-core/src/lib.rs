pub mod aggregator;
pub mod alerts;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod model;
pub mod service;
pub mod source;
pub mod sqlite;
pub mod window;

pub use aggregator::MetricsAggregator;
pub use alerts::{apply_rules, AlertEngine, AlertInputs};
pub use cache::{CacheEntry, CacheKey, CacheStore, CachedValue, MemoryCacheStore, SingleFlight};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_rideops_config, RideOpsConfig};
pub use error::{ConfigError, Result};
pub use health::{classify, HealthEvaluator, HealthSignals};
pub use model::{
    Alert, AlertSeverity, AlertType, DriverStats, DriverStatus, MetricsSnapshot, RevenueStats,
    RideStats, RideStatus, SystemStatus, UserStats,
};
pub use service::{DashboardError, DashboardResult, DashboardService};
pub use source::{
    DataSource, DriverRecord, RatingRecord, RevenueAggregate, RideFilter, RideRecord,
    SourceError, SourceResult, SqliteDataSource, SqliteDataSourceBuilder, UserFilter, UserRecord,
};
pub use window::{TimeRange, TimeWindows};
