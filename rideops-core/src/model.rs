use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Requested,
    Accepted,
    DriverConfirmed,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    /// Statuses of a ride that has a driver attached and has not finished.
    pub const ACTIVE: [RideStatus; 4] = [
        RideStatus::Accepted,
        RideStatus::DriverConfirmed,
        RideStatus::Arrived,
        RideStatus::InProgress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Requested => "requested",
            RideStatus::Accepted => "accepted",
            RideStatus::DriverConfirmed => "driver_confirmed",
            RideStatus::Arrived => "arrived",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_active(&self) -> bool {
        RideStatus::ACTIVE.contains(self)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RideStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(RideStatus::Requested),
            "accepted" => Ok(RideStatus::Accepted),
            "driver_confirmed" => Ok(RideStatus::DriverConfirmed),
            "arrived" => Ok(RideStatus::Arrived),
            "in_progress" => Ok(RideStatus::InProgress),
            "completed" => Ok(RideStatus::Completed),
            "cancelled" => Ok(RideStatus::Cancelled),
            other => Err(format!("unknown ride status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Offline,
    Online,
    Busy,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Offline => "offline",
            DriverStatus::Online => "online",
            DriverStatus::Busy => "busy",
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(DriverStatus::Offline),
            "online" => Ok(DriverStatus::Online),
            "busy" => Ok(DriverStatus::Busy),
            other => Err(format!("unknown driver status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    Healthy,
    Warning,
    Critical,
}

impl SystemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Healthy => "healthy",
            SystemStatus::Warning => "warning",
            SystemStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RideStats {
    pub completed: u64,
    pub cancelled: u64,
    pub total: u64,
}

impl RideStats {
    /// Cancellation share in percent; zero when no rides exist.
    pub fn cancellation_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.cancelled as f64 / self.total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct RevenueStats {
    pub revenue_today: f64,
    pub revenue_this_week: f64,
    pub average_fare: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DriverCounts {
    pub online: u64,
    pub busy: u64,
}

impl DriverCounts {
    pub fn available(&self) -> u64 {
        self.online.saturating_sub(self.busy)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct DriverStats {
    pub online: u64,
    pub busy: u64,
    pub available: u64,
    pub average_rating: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct UserStats {
    pub active_today: u64,
    pub new_this_week: u64,
    pub total: u64,
    pub average_rating: f64,
}

/// Operational view of the platform at `last_updated`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub active_rides: u64,
    pub completed_rides_today: u64,
    pub cancelled_rides_today: u64,
    pub total_rides_this_week: u64,
    pub revenue_today: f64,
    pub revenue_this_week: f64,
    pub average_fare: f64,
    pub total_transactions: u64,
    pub online_drivers: u64,
    pub busy_drivers: u64,
    pub available_drivers: u64,
    pub average_driver_rating: f64,
    pub active_users_today: u64,
    pub new_users_this_week: u64,
    pub total_users: u64,
    pub average_user_rating: f64,
    pub system_status: SystemStatus,
    pub last_updated: DateTime<Utc>,
}

impl MetricsSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        active_rides: u64,
        today: RideStats,
        week: RideStats,
        revenue: RevenueStats,
        drivers: DriverStats,
        users: UserStats,
        system_status: SystemStatus,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            active_rides,
            completed_rides_today: today.completed,
            cancelled_rides_today: today.cancelled,
            total_rides_this_week: week.total,
            revenue_today: revenue.revenue_today,
            revenue_this_week: revenue.revenue_this_week,
            average_fare: revenue.average_fare,
            total_transactions: today.completed,
            online_drivers: drivers.online,
            busy_drivers: drivers.busy,
            available_drivers: drivers.available,
            average_driver_rating: drivers.average_rating,
            active_users_today: users.active_today,
            new_users_this_week: users.new_this_week,
            total_users: users.total,
            average_user_rating: users.average_rating,
            system_status,
            last_updated,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Performance,
    Financial,
    Technical,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AlertType::Performance => "performance",
            AlertType::Financial => "financial",
            AlertType::Technical => "technical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Rule slug; stable across evaluations.
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Never set by this crate. Acknowledgement belongs to whoever stores alerts by id.
    pub acknowledged: bool,
}

impl Alert {
    pub fn new(
        id: impl Into<String>,
        alert_type: AlertType,
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            alert_type,
            severity,
            title: title.into(),
            message: message.into(),
            timestamp,
            acknowledged: false,
        }
    }
}

/// Half-up rounding to `decimals` places on an already aggregated value.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

pub fn round_currency(value: f64) -> f64 {
    round_to(value, 2)
}

pub fn round_rating(value: f64) -> f64 {
    round_to(value, 1)
}

/// Arithmetic mean, zero for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ride_status_round_trips_through_str() {
        for status in [
            RideStatus::Requested,
            RideStatus::DriverConfirmed,
            RideStatus::InProgress,
            RideStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<RideStatus>().unwrap(), status);
        }
        assert!("teleported".parse::<RideStatus>().is_err());
    }

    #[test]
    fn active_statuses_exclude_terminal_ones() {
        assert!(RideStatus::Arrived.is_active());
        assert!(!RideStatus::Completed.is_active());
        assert!(!RideStatus::Requested.is_active());
    }

    #[test]
    fn available_drivers_never_negative() {
        let counts = DriverCounts { online: 3, busy: 7 };
        assert_eq!(counts.available(), 0);
        let counts = DriverCounts { online: 10, busy: 4 };
        assert_eq!(counts.available(), 6);
    }

    #[test]
    fn cancellation_rate_guards_empty_day() {
        assert_eq!(RideStats::default().cancellation_rate(), 0.0);
        let stats = RideStats {
            completed: 6,
            cancelled: 4,
            total: 10,
        };
        assert_eq!(stats.cancellation_rate(), 40.0);
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_currency(12.346), 12.35);
        assert_eq!(round_currency(0.125), 0.13);
        assert_eq!(round_currency(10.0 / 3.0), 3.33);
        assert_eq!(round_rating(4.25), 4.3);
        assert_eq!(round_rating(4.649), 4.6);
    }

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[4.0, 5.0]), 4.5);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snapshot = MetricsSnapshot::assemble(
            1,
            RideStats::default(),
            RideStats::default(),
            RevenueStats::default(),
            DriverStats::default(),
            UserStats::default(),
            SystemStatus::Healthy,
            Utc::now(),
        );
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["activeRides"], 1);
        assert_eq!(json["systemStatus"], "healthy");
        assert!(json.get("lastUpdated").is_some());
    }

    #[test]
    fn alert_serializes_type_field() {
        let alert = Alert::new(
            "stuck_rides",
            AlertType::Technical,
            AlertSeverity::Medium,
            "Stuck rides",
            "2 rides",
            Utc::now(),
        );
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "technical");
        assert_eq!(json["severity"], "medium");
        assert_eq!(json["acknowledged"], false);
    }
}
