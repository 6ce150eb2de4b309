use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Offset, TimeZone, Utc};
use serde::Serialize;

/// Half-open `[start, end)` interval in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Day and week boundaries derived from a single instant.
///
/// Midnight is taken in the configured fixed offset; the week starts on
/// Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindows {
    pub today: TimeRange,
    pub week: TimeRange,
}

impl TimeWindows {
    pub fn at(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local = now.with_timezone(&offset);
        let local_midnight = local.date_naive().and_time(NaiveTime::MIN);
        let today_start = Utc.from_utc_datetime(
            &(local_midnight - Duration::seconds(offset.local_minus_utc() as i64)),
        );
        let today_end = today_start + Duration::days(1);

        let weekday_index = local.weekday().num_days_from_sunday() as i64;
        let week_start = today_start - Duration::days(weekday_index);
        let week_end = week_start + Duration::days(7);

        Self {
            today: TimeRange::new(today_start, today_end),
            week: TimeRange::new(week_start, week_end),
        }
    }

    pub fn utc(now: DateTime<Utc>) -> Self {
        Self::at(now, Utc.fix())
    }

    pub fn yesterday(&self) -> TimeRange {
        TimeRange::new(self.today.start - Duration::days(1), self.today.start)
    }
}
