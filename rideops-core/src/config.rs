use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct RideOpsConfig {
    pub database: DatabaseSection,
    pub cache: CacheSection,
    pub windows: WindowsSection,
    pub metrics: MetricsSection,
    pub health: HealthSection,
    pub alerts: AlertsSection,
}

impl RideOpsConfig {
    /// Relative database paths are resolved against `base_dir`.
    pub fn resolve_database_path<P: AsRef<Path>>(&self, base_dir: P) -> PathBuf {
        let path = Path::new(&self.database.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.as_ref().join(path)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl_seconds == 0 || self.cache.ttl_seconds > MAX_TTL_SECONDS {
            return Err(ConfigError::Invalid {
                field: "cache.ttl_seconds",
                reason: format!("must be within 1..={MAX_TTL_SECONDS}"),
            });
        }
        if self.windows.offset().is_none() {
            return Err(ConfigError::Invalid {
                field: "windows.utc_offset_minutes",
                reason: format!(
                    "{} is outside the valid -1439..=1439 range",
                    self.windows.utc_offset_minutes
                ),
            });
        }
        if self.metrics.fare_sample_limit == 0
            || i64::try_from(self.metrics.fare_sample_limit).is_err()
        {
            return Err(ConfigError::Invalid {
                field: "metrics.fare_sample_limit",
                reason: format!("must be within 1..={}", i64::MAX),
            });
        }
        if !self.health.demand_supply_warning_ratio.is_finite()
            || self.health.demand_supply_warning_ratio <= 0.0
        {
            return Err(ConfigError::Invalid {
                field: "health.demand_supply_warning_ratio",
                reason: "must be positive".to_string(),
            });
        }
        check_minutes(
            "health.stuck_ride_critical_minutes",
            self.health.stuck_ride_critical_minutes,
        )?;
        check_minutes("alerts.stuck_ride_minutes", self.alerts.stuck_ride_minutes)?;
        check_percent(
            "alerts.cancellation_rate_percent",
            self.alerts.cancellation_rate_percent,
        )?;
        check_percent("alerts.revenue_drop_percent", self.alerts.revenue_drop_percent)?;
        Ok(())
    }
}

/// Upper bound for cache TTLs and stuck-ride thresholds: one year.
const MAX_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;
const MAX_THRESHOLD_MINUTES: u32 = 365 * 24 * 60;

fn check_minutes(field: &'static str, minutes: u32) -> Result<()> {
    if minutes == 0 || minutes > MAX_THRESHOLD_MINUTES {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{minutes} is outside 1..={MAX_THRESHOLD_MINUTES}"),
        });
    }
    Ok(())
}

fn check_percent(field: &'static str, percent: f64) -> Result<()> {
    if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{percent} is outside 0..=100"),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: String,
    pub query_timeout_seconds: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: "data/rideops.sqlite".to_string(),
            query_timeout_seconds: 30,
        }
    }
}

impl DatabaseSection {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSection {
    pub ttl_seconds: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self { ttl_seconds: 300 }
    }
}

impl CacheSection {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_seconds.min(MAX_TTL_SECONDS) as i64)
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowsSection {
    pub utc_offset_minutes: i32,
}

impl WindowsSection {
    pub fn offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsSection {
    pub fare_sample_limit: usize,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            fare_sample_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthSection {
    pub stuck_ride_critical_minutes: u32,
    pub demand_supply_warning_ratio: f64,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            stuck_ride_critical_minutes: 120,
            demand_supply_warning_ratio: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertsSection {
    pub min_online_drivers: u64,
    pub cancellation_rate_percent: f64,
    pub revenue_drop_percent: f64,
    pub stuck_ride_minutes: u32,
}

impl Default for AlertsSection {
    fn default() -> Self {
        Self {
            min_online_drivers: 5,
            cancellation_rate_percent: 30.0,
            revenue_drop_percent: 50.0,
            stuck_ride_minutes: 60,
        }
    }
}

pub fn load_rideops_config<P: AsRef<Path>>(path: P) -> Result<RideOpsConfig> {
    let config: RideOpsConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/rideops.toml");
        let config = load_rideops_config(path).expect("fixture config should parse");
        assert_eq!(config.cache.ttl_seconds, 300);
        assert_eq!(config.metrics.fare_sample_limit, 1000);
        assert_eq!(config.alerts.min_online_drivers, 5);
        assert_eq!(config.database.path, "data/rideops.sqlite");
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: RideOpsConfig = toml::from_str("[cache]\nttl_seconds = 60\n").unwrap();
        assert_eq!(config.cache.ttl_seconds, 60);
        assert_eq!(config.health, HealthSection::default());
        assert_eq!(config.alerts.stuck_ride_minutes, 60);
        assert_eq!(config.windows.utc_offset_minutes, 0);
    }

    #[test]
    fn rejects_zero_ttl() {
        let config: RideOpsConfig = toml::from_str("[cache]\nttl_seconds = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "cache.ttl_seconds",
                ..
            }
        ));
    }

    #[test]
    fn rejects_oversized_ttl() {
        let config: RideOpsConfig =
            toml::from_str("[cache]\nttl_seconds = 18446744073709551615\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_and_huge_stuck_minutes() {
        for body in [
            "[alerts]\nstuck_ride_minutes = 0\n",
            "[alerts]\nstuck_ride_minutes = 4294967295\n",
            "[health]\nstuck_ride_critical_minutes = 0\n",
        ] {
            let config: RideOpsConfig = toml::from_str(body).unwrap();
            assert!(config.validate().is_err(), "accepted {body:?}");
        }
    }

    #[test]
    fn negative_or_overflowing_minutes_do_not_parse() {
        let negative = toml::from_str::<RideOpsConfig>("[alerts]\nstuck_ride_minutes = -60\n");
        assert!(negative.is_err());
        let huge = toml::from_str::<RideOpsConfig>(
            "[health]\nstuck_ride_critical_minutes = 9223372036854775807\n",
        );
        assert!(huge.is_err());
    }

    #[test]
    fn rejects_percentages_outside_zero_to_hundred() {
        for body in [
            "[alerts]\ncancellation_rate_percent = -1.0\n",
            "[alerts]\nrevenue_drop_percent = -50.0\n",
            "[alerts]\nrevenue_drop_percent = 150.0\n",
            "[alerts]\ncancellation_rate_percent = nan\n",
        ] {
            let config: RideOpsConfig = toml::from_str(body).unwrap();
            assert!(config.validate().is_err(), "accepted {body:?}");
        }
    }

    #[test]
    fn rejects_fare_sample_beyond_sql_limit() {
        let config = RideOpsConfig {
            metrics: MetricsSection {
                fare_sample_limit: usize::MAX,
            },
            ..RideOpsConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "metrics.fare_sample_limit",
                ..
            }
        ));
    }

    #[test]
    fn defaults_validate() {
        RideOpsConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let config: RideOpsConfig =
            toml::from_str("[windows]\nutc_offset_minutes = 1440\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn relative_database_path_is_resolved() {
        let config = RideOpsConfig::default();
        let resolved = config.resolve_database_path("/srv/rideops");
        assert_eq!(resolved, PathBuf::from("/srv/rideops/data/rideops.sqlite"));
    }
}
