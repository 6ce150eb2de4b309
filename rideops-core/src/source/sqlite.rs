use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};

use crate::model::{DriverStatus, RideStatus};
use crate::sqlite::configure_connection;
use crate::window::TimeRange;

use super::{
    DataSource, RevenueAggregate, RideFilter, SourceError, SourceResult, UserFilter,
};

const SCHEMA: &str = include_str!("../../../sql/rideops.sql");

#[derive(Debug, Clone)]
pub struct SqliteDataSourceBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteDataSourceBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteDataSourceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> SourceResult<SqliteDataSource> {
        let path = self.path.ok_or(SourceError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };

        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        Ok(SqliteDataSource {
            path,
            flags,
            read_only: self.read_only,
        })
    }
}

/// SQLite-backed [`DataSource`]. Every query opens its own connection on the
/// blocking pool, so concurrent queries run in parallel.
#[derive(Debug, Clone)]
pub struct SqliteDataSource {
    path: PathBuf,
    flags: OpenFlags,
    read_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RideRecord {
    pub ride_id: String,
    pub status: RideStatus,
    pub fare_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverRecord {
    pub driver_id: String,
    pub status: DriverStatus,
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatingRecord {
    pub rating_id: String,
    pub user_id: String,
    pub score: f64,
}

impl SqliteDataSource {
    pub fn builder() -> SqliteDataSourceBuilder {
        SqliteDataSourceBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> SourceResult<Self> {
        SqliteDataSourceBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> SourceResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            SourceError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn, self.read_only).map_err(|source| {
            SourceError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> SourceResult<()> {
        let conn = self.open()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn insert_ride(&self, ride: &RideRecord) -> SourceResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO rides (ride_id, status, fare_price, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(ride_id) DO UPDATE SET
                status = excluded.status,
                fare_price = excluded.fare_price,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
            params![
                &ride.ride_id,
                ride.status.as_str(),
                ride.fare_price,
                sql_timestamp(ride.created_at),
                sql_timestamp(ride.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn insert_driver(&self, driver: &DriverRecord) -> SourceResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO drivers (driver_id, status, rating) VALUES (?1, ?2, ?3)
             ON CONFLICT(driver_id) DO UPDATE SET
                status = excluded.status,
                rating = excluded.rating",
            params![&driver.driver_id, driver.status.as_str(), driver.rating],
        )?;
        Ok(())
    }

    pub fn insert_user(&self, user: &UserRecord) -> SourceResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO users (user_id, created_at, last_login) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                created_at = excluded.created_at,
                last_login = excluded.last_login",
            params![
                &user.user_id,
                sql_timestamp(user.created_at),
                user.last_login.map(sql_timestamp),
            ],
        )?;
        Ok(())
    }

    pub fn insert_rating(&self, rating: &RatingRecord) -> SourceResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO ratings (rating_id, user_id, score) VALUES (?1, ?2, ?3)
             ON CONFLICT(rating_id) DO UPDATE SET
                user_id = excluded.user_id,
                score = excluded.score",
            params![&rating.rating_id, &rating.user_id, rating.score],
        )?;
        Ok(())
    }

    async fn run<T, F>(&self, query: F) -> SourceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> SourceResult<T> + Send + 'static,
    {
        let source = self.clone();
        tokio::task::spawn_blocking(move || {
            let conn = source.open()?;
            query(&conn)
        })
        .await?
    }
}

fn ride_count_query(filter: &RideFilter) -> (String, Vec<Value>) {
    let mut sql = String::from("SELECT COUNT(*) FROM rides WHERE 1 = 1");
    let mut values = Vec::new();
    if !filter.statuses.is_empty() {
        let placeholders = vec!["?"; filter.statuses.len()].join(", ");
        sql.push_str(&format!(" AND status IN ({placeholders})"));
        values.extend(
            filter
                .statuses
                .iter()
                .map(|status| Value::Text(status.as_str().to_string())),
        );
    }
    if let Some(range) = filter.created_at {
        sql.push_str(" AND created_at >= ? AND created_at < ?");
        values.push(Value::Text(sql_timestamp(range.start)));
        values.push(Value::Text(sql_timestamp(range.end)));
    }
    (sql, values)
}

/// Canonical text form for stored and bound timestamps. Shared by writes and
/// range predicates so they compare lexicographically.
fn sql_timestamp(instant: DateTime<Utc>) -> String {
    instant.naive_utc().format("%F %T%.6f").to_string()
}

fn to_count(value: i64) -> u64 {
    value.max(0) as u64
}

#[async_trait]
impl DataSource for SqliteDataSource {
    async fn count_rides(&self, filter: &RideFilter) -> SourceResult<u64> {
        let (sql, values) = ride_count_query(filter);
        self.run(move |conn| {
            let count: i64 =
                conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
            Ok(to_count(count))
        })
        .await
    }

    async fn aggregate_ride_revenue(
        &self,
        updated_at: TimeRange,
    ) -> SourceResult<RevenueAggregate> {
        self.run(move |conn| {
            let (sum, count): (f64, i64) = conn.query_row(
                "SELECT COALESCE(SUM(fare_price), 0.0), COUNT(*) FROM rides
                 WHERE status = 'completed' AND updated_at >= ?1 AND updated_at < ?2",
                params![
                    sql_timestamp(updated_at.start),
                    sql_timestamp(updated_at.end)
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(RevenueAggregate {
                sum,
                count: to_count(count),
            })
        })
        .await
    }

    async fn sample_completed_fares(&self, limit: usize) -> SourceResult<Vec<f64>> {
        // A negative LIMIT means "no limit" to SQLite, so saturate instead of wrapping.
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT fare_price FROM rides
                 WHERE status = 'completed' AND fare_price IS NOT NULL
                 ORDER BY updated_at DESC
                 LIMIT ?1",
            )?;
            let fares = stmt
                .query_map([limit], |row| row.get::<_, f64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(fares)
        })
        .await
    }

    async fn count_drivers(&self, status: DriverStatus) -> SourceResult<u64> {
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM drivers WHERE status = ?1",
                [status.as_str()],
                |row| row.get(0),
            )?;
            Ok(to_count(count))
        })
        .await
    }

    async fn list_driver_ratings(&self) -> SourceResult<Vec<f64>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT rating FROM drivers WHERE rating IS NOT NULL")?;
            let ratings = stmt
                .query_map([], |row| row.get::<_, f64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ratings)
        })
        .await
    }

    async fn count_users(&self, filter: UserFilter) -> SourceResult<u64> {
        self.run(move |conn| {
            let count: i64 = match filter {
                UserFilter::LastLogin(range) => conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE last_login >= ?1 AND last_login < ?2",
                    params![sql_timestamp(range.start), sql_timestamp(range.end)],
                    |row| row.get(0),
                )?,
                UserFilter::CreatedAt(range) => conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE created_at >= ?1 AND created_at < ?2",
                    params![sql_timestamp(range.start), sql_timestamp(range.end)],
                    |row| row.get(0),
                )?,
                UserFilter::All => {
                    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?
                }
            };
            Ok(to_count(count))
        })
        .await
    }

    async fn list_user_rating_averages(&self) -> SourceResult<Vec<f64>> {
        self.run(|conn| {
            let mut stmt =
                conn.prepare("SELECT AVG(score) FROM ratings GROUP BY user_id ORDER BY user_id")?;
            let averages = stmt
                .query_map([], |row| row.get::<_, f64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(averages)
        })
        .await
    }

    async fn probe_connectivity(&self) -> SourceResult<()> {
        self.run(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    async fn count_stuck_rides(
        &self,
        status: RideStatus,
        updated_before: DateTime<Utc>,
    ) -> SourceResult<u64> {
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM rides WHERE status = ?1 AND updated_at < ?2",
                params![status.as_str(), sql_timestamp(updated_before)],
                |row| row.get(0),
            )?;
            Ok(to_count(count))
        })
        .await
    }
}
