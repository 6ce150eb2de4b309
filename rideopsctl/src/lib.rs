use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use rideops_core::{
    load_rideops_config, Alert, Clock, DashboardError, DashboardService, DriverRecord,
    DriverStatus, MetricsSnapshot, RatingRecord, RideOpsConfig, RideRecord, RideStatus,
    SourceError, SqliteDataSource, SystemClock, SystemStatus, UserRecord,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] rideops_core::ConfigError),
    #[error("dashboard error: {0}")]
    Dashboard(#[from] DashboardError),
    #[error("data source error: {0}")]
    Source(#[from] SourceError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("command timed out after {0}s")]
    Timeout(u64),
    #[error("system status is {0}")]
    Unhealthy(SystemStatus),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Ride operations metrics and alerts", long_about = None)]
pub struct Cli {
    /// Path to rideops.toml
    #[arg(long, default_value = "configs/rideops.toml")]
    pub config: PathBuf,
    /// Overrides database.path
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum Commands {
    /// Prints the dashboard metrics snapshot
    Metrics,
    /// Evaluates the alert rules
    Alerts,
    /// Classifies system health; exits non-zero when critical
    Health,
    /// Creates the database schema
    Init,
    /// Inserts a small demo dataset
    Seed,
}

pub async fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;
    debug!(
        config = %context.config_path.display(),
        database = %context.database_path.display(),
        command = ?cli.command,
        "rideopsctl starting"
    );

    match cli.command {
        Commands::Metrics => {
            let snapshot = context.with_timeout(context.metrics()).await?;
            render(&snapshot, cli.format)?;
        }
        Commands::Alerts => {
            let alerts = context.with_timeout(context.alerts()).await?;
            render(&alerts, cli.format)?;
        }
        Commands::Health => {
            let report = context.with_timeout(context.health()).await?;
            render(&report, cli.format)?;
            if report.status == SystemStatus::Critical {
                return Err(AppError::Unhealthy(report.status));
            }
        }
        Commands::Init => {
            let report = context.init()?;
            render(&report, cli.format)?;
        }
        Commands::Seed => {
            let report = context.seed(SystemClock.now())?;
            render(&report, cli.format)?;
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: RideOpsConfig,
    config_path: PathBuf,
    database_path: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone();
        let config = load_rideops_config(&config_path)?;

        // configs/rideops.toml lives one level below the project root.
        let project_root = config_path
            .parent()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let database_path = cli
            .db
            .clone()
            .unwrap_or_else(|| config.resolve_database_path(&project_root));

        Ok(Self {
            config,
            config_path,
            database_path,
        })
    }

    async fn with_timeout<T, F>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let limit: StdDuration = self.config.database.query_timeout();
        tokio::time::timeout(limit, future)
            .await
            .map_err(|_| AppError::Timeout(limit.as_secs()))?
    }

    fn read_source(&self) -> Result<SqliteDataSource> {
        let source = SqliteDataSource::builder()
            .path(&self.database_path)
            .read_only(true)
            .build()?;
        Ok(source)
    }

    fn write_source(&self) -> Result<SqliteDataSource> {
        if let Some(parent) = self.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let source = SqliteDataSource::builder()
            .path(&self.database_path)
            .create_if_missing(true)
            .build()?;
        Ok(source)
    }

    fn service(&self) -> Result<DashboardService> {
        let source = self.read_source()?;
        let service =
            DashboardService::in_memory(Arc::new(source), Arc::new(SystemClock), &self.config)?;
        Ok(service)
    }

    async fn metrics(&self) -> Result<MetricsSnapshot> {
        Ok(self.service()?.get_metrics().await?)
    }

    async fn alerts(&self) -> Result<AlertList> {
        let rows = self.service()?.get_alerts().await?;
        Ok(AlertList { rows })
    }

    async fn health(&self) -> Result<HealthReport> {
        let status = self.service()?.health().await?;
        Ok(HealthReport {
            status,
            database: self.database_path.display().to_string(),
        })
    }

    fn init(&self) -> Result<InitReport> {
        let source = self.write_source()?;
        source.initialize()?;
        info!(database = %self.database_path.display(), "schema initialized");
        Ok(InitReport {
            database: self.database_path.display().to_string(),
        })
    }

    fn seed(&self, now: DateTime<Utc>) -> Result<SeedReport> {
        let source = self.write_source()?;
        source.initialize()?;
        let dataset = demo_dataset(now);
        for driver in &dataset.drivers {
            source.insert_driver(driver)?;
        }
        for user in &dataset.users {
            source.insert_user(user)?;
        }
        for rating in &dataset.ratings {
            source.insert_rating(rating)?;
        }
        for ride in &dataset.rides {
            source.insert_ride(ride)?;
        }
        let report = SeedReport {
            database: self.database_path.display().to_string(),
            rides: dataset.rides.len(),
            drivers: dataset.drivers.len(),
            users: dataset.users.len(),
            ratings: dataset.ratings.len(),
        };
        info!(rides = report.rides, drivers = report.drivers, "demo data seeded");
        Ok(report)
    }
}

struct DemoDataset {
    rides: Vec<RideRecord>,
    drivers: Vec<DriverRecord>,
    users: Vec<UserRecord>,
    ratings: Vec<RatingRecord>,
}

/// Timestamps are relative to `now` so the data lands in today's window.
fn demo_dataset(now: DateTime<Utc>) -> DemoDataset {
    let at = |minutes_ago: i64| now - Duration::minutes(minutes_ago);
    let ride = |id: &str, status: RideStatus, fare: Option<f64>, created: i64, updated: i64| {
        RideRecord {
            ride_id: id.to_string(),
            status,
            fare_price: fare,
            created_at: at(created),
            updated_at: at(updated),
        }
    };

    let rides = vec![
        ride("ride-001", RideStatus::Completed, Some(18.40), 50, 20),
        ride("ride-002", RideStatus::Completed, Some(9.75), 40, 15),
        ride("ride-003", RideStatus::Completed, Some(23.10), 30, 5),
        ride("ride-004", RideStatus::Cancelled, None, 25, 24),
        ride("ride-005", RideStatus::InProgress, Some(14.00), 12, 2),
        ride("ride-006", RideStatus::Accepted, None, 4, 3),
        ride("ride-007", RideStatus::Requested, None, 1, 1),
    ];

    let driver = |id: &str, status: DriverStatus, rating: f64| DriverRecord {
        driver_id: id.to_string(),
        status,
        rating: Some(rating),
    };
    let drivers = vec![
        driver("driver-01", DriverStatus::Online, 4.9),
        driver("driver-02", DriverStatus::Online, 4.6),
        driver("driver-03", DriverStatus::Online, 4.7),
        driver("driver-04", DriverStatus::Online, 4.2),
        driver("driver-05", DriverStatus::Online, 4.8),
        driver("driver-06", DriverStatus::Online, 4.5),
        driver("driver-07", DriverStatus::Busy, 4.4),
        driver("driver-08", DriverStatus::Busy, 4.9),
        driver("driver-09", DriverStatus::Offline, 3.9),
    ];

    let users = vec![
        UserRecord {
            user_id: "user-01".to_string(),
            created_at: at(60 * 24 * 40),
            last_login: Some(at(35)),
        },
        UserRecord {
            user_id: "user-02".to_string(),
            created_at: at(60),
            last_login: Some(at(10)),
        },
        UserRecord {
            user_id: "user-03".to_string(),
            created_at: at(60 * 24 * 90),
            last_login: None,
        },
    ];

    let rating = |id: &str, user: &str, score: f64| RatingRecord {
        rating_id: id.to_string(),
        user_id: user.to_string(),
        score,
    };
    let ratings = vec![
        rating("rating-01", "user-01", 5.0),
        rating("rating-02", "user-01", 4.0),
        rating("rating-03", "user-02", 4.5),
        rating("rating-04", "user-03", 3.0),
    ];

    DemoDataset {
        rides,
        drivers,
        users,
        ratings,
    }
}

impl DisplayFallback for MetricsSnapshot {
    fn display(&self) -> String {
        let lines = [
            format!("Status: {}", self.system_status),
            "Rides:".to_string(),
            format!("  - active: {}", self.active_rides),
            format!("  - completed today: {}", self.completed_rides_today),
            format!("  - cancelled today: {}", self.cancelled_rides_today),
            format!("  - this week: {}", self.total_rides_this_week),
            "Revenue:".to_string(),
            format!("  - today: {:.2}", self.revenue_today),
            format!("  - this week: {:.2}", self.revenue_this_week),
            format!("  - average fare: {:.2}", self.average_fare),
            format!("  - transactions: {}", self.total_transactions),
            "Drivers:".to_string(),
            format!(
                "  - online {} / busy {} / available {}",
                self.online_drivers, self.busy_drivers, self.available_drivers
            ),
            format!("  - average rating: {:.1}", self.average_driver_rating),
            "Users:".to_string(),
            format!("  - active today: {}", self.active_users_today),
            format!("  - new this week: {}", self.new_users_this_week),
            format!("  - total: {}", self.total_users),
            format!("  - average rating: {:.1}", self.average_user_rating),
            format!("Updated: {}", self.last_updated.to_rfc3339()),
        ];
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct AlertList {
    pub rows: Vec<Alert>,
}

impl DisplayFallback for AlertList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No active alerts".to_string();
        }
        self.rows
            .iter()
            .map(|alert| {
                format!(
                    "[{severity}] {id} ({kind}) {message}",
                    severity = alert.severity,
                    id = alert.id,
                    kind = alert.alert_type,
                    message = alert.message
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: SystemStatus,
    pub database: String,
}

impl DisplayFallback for HealthReport {
    fn display(&self) -> String {
        format!("[{}] {}", self.status, self.database)
    }
}

#[derive(Debug, Serialize)]
pub struct InitReport {
    pub database: String,
}

impl DisplayFallback for InitReport {
    fn display(&self) -> String {
        format!("Schema ready at {}", self.database)
    }
}

#[derive(Debug, Serialize)]
pub struct SeedReport {
    pub database: String,
    pub rides: usize,
    pub drivers: usize,
    pub users: usize,
    pub ratings: usize,
}

impl DisplayFallback for SeedReport {
    fn display(&self) -> String {
        format!(
            "Seeded {}: rides={} drivers={} users={} ratings={}",
            self.database, self.rides, self.drivers, self.users, self.ratings
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn prepare_test_context() -> (TempDir, AppContext) {
        let temp = TempDir::new().unwrap();
        let configs_dir = temp.path().join("configs");
        fs::create_dir_all(&configs_dir).unwrap();
        let config_path = configs_dir.join("rideops.toml");
        fs::copy("../configs/rideops.toml", &config_path).unwrap();

        let cli = Cli {
            config: config_path,
            db: None,
            format: OutputFormat::Json,
            command: Commands::Metrics,
        };
        let context = AppContext::new(&cli).unwrap();
        (temp, context)
    }

    /// Keeps the seeded rides inside today's window even just after midnight.
    fn seed_time() -> DateTime<Utc> {
        let now = Utc::now();
        let windows = rideops_core::TimeWindows::utc(now);
        now.max(windows.today.start + Duration::hours(1))
    }

    #[test]
    fn database_path_resolves_under_project_root() {
        let (temp, context) = prepare_test_context();
        assert_eq!(
            context.database_path,
            temp.path().join("data").join("rideops.sqlite")
        );
    }

    #[test]
    fn db_flag_overrides_config() {
        let temp = TempDir::new().unwrap();
        let cli = Cli {
            config: PathBuf::from("../configs/rideops.toml"),
            db: Some(temp.path().join("other.sqlite")),
            format: OutputFormat::Text,
            command: Commands::Health,
        };
        let context = AppContext::new(&cli).unwrap();
        assert_eq!(context.database_path, temp.path().join("other.sqlite"));
    }

    #[tokio::test]
    async fn seeded_database_reports_metrics() {
        let (_temp, context) = prepare_test_context();
        let seeded = context.seed(seed_time()).unwrap();
        assert_eq!(seeded.rides, 7);

        let snapshot = context.metrics().await.unwrap();
        assert_eq!(snapshot.completed_rides_today, 3);
        assert_eq!(snapshot.cancelled_rides_today, 1);
        assert_eq!(snapshot.active_rides, 2);
        assert_eq!(snapshot.online_drivers, 6);
        assert_eq!(snapshot.available_drivers, 4);
        assert_eq!(snapshot.total_users, 3);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("completedRidesToday").is_some());
    }

    #[tokio::test]
    async fn seeded_database_is_healthy_without_alerts() {
        let (_temp, context) = prepare_test_context();
        context.seed(seed_time()).unwrap();

        let report = context.health().await.unwrap();
        assert_eq!(report.status, SystemStatus::Healthy);

        let alerts = context.alerts().await.unwrap();
        assert!(alerts.rows.is_empty(), "unexpected alerts: {}", alerts.display());
    }

    #[tokio::test]
    async fn missing_database_is_critical() {
        let (_temp, context) = prepare_test_context();
        let report = context.health().await.unwrap();
        assert_eq!(report.status, SystemStatus::Critical);
        assert!(context.metrics().await.is_err());
    }

    #[test]
    fn reseeding_does_not_duplicate_rows() {
        let (_temp, context) = prepare_test_context();
        let first = context.seed(seed_time()).unwrap();
        context.seed(seed_time()).unwrap();

        let conn = rusqlite::Connection::open(&context.database_path).unwrap();
        let count = |table: &str| -> usize {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .unwrap() as usize
        };
        assert_eq!(count("ratings"), first.ratings);
        assert_eq!(count("rides"), first.rides);
        assert_eq!(count("users"), first.users);
        assert_eq!(count("drivers"), first.drivers);
    }

    #[test]
    fn init_creates_schema_file() {
        let (_temp, context) = prepare_test_context();
        context.init().unwrap();
        assert!(context.database_path.exists());
    }

    #[test]
    fn alert_list_renders_as_plain_array() {
        let list = AlertList { rows: Vec::new() };
        assert_eq!(serde_json::to_string(&list).unwrap(), "[]");
        assert_eq!(list.display(), "No active alerts");
    }
}
