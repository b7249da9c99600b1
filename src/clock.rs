use std::{fmt, str::FromStr, sync::Mutex};

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// A calendar day, independent of time-of-day. All streak comparisons are
/// made on these, never on raw instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(DateKey)
    }

    /// The previous calendar day.
    pub fn pred(&self) -> DateKey {
        // Only fails at NaiveDate::MIN.
        DateKey(self.0.pred_opt().unwrap_or(self.0))
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_KEY_FORMAT))
    }
}

impl FromStr for DateKey {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, DATE_KEY_FORMAT).map(DateKey)
    }
}

impl TryFrom<String> for DateKey {
    type Error = chrono::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DateKey> for String {
    fn from(key: DateKey) -> Self {
        key.to_string()
    }
}

/// Source of "now" and of the locality rule used to cut instants into days.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Truncates an instant to the calendar day it falls on in this clock's zone.
    fn date_key_of(&self, instant: &DateTime<Utc>) -> DateKey;

    fn today(&self) -> DateKey {
        self.date_key_of(&self.now())
    }

    fn yesterday(&self) -> DateKey {
        self.today().pred()
    }
}

/// Wall clock in the machine's local zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn date_key_of(&self, instant: &DateTime<Utc>) -> DateKey {
        DateKey(instant.with_timezone(&Local).date_naive())
    }
}

/// A clock pinned to an instant in a fixed-offset zone. Tests move it by hand.
#[derive(Debug)]
pub struct FixedClock {
    offset: FixedOffset,
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        FixedClock {
            offset,
            now: Mutex::new(now),
        }
    }

    /// Parses an RFC 3339 instant; the instant's own offset becomes the clock's zone.
    pub fn at(rfc3339: &str) -> Result<Self, chrono::ParseError> {
        let parsed = DateTime::parse_from_rfc3339(rfc3339)?;
        Ok(Self::new(parsed.with_timezone(&Utc), *parsed.offset()))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        *now = *now + by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        // A poisoned clock still holds a valid instant.
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }

    fn date_key_of(&self, instant: &DateTime<Utc>) -> DateKey {
        DateKey(instant.with_timezone(&self.offset).date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_key_formats_and_parses() {
        let key: DateKey = "2024-03-09".parse().unwrap();
        assert_eq!(key, DateKey::from_ymd(2024, 3, 9).unwrap());
        assert_eq!(key.to_string(), "2024-03-09");
        assert!("2024-13-01".parse::<DateKey>().is_err());
    }

    #[test]
    fn same_day_instants_share_a_key() {
        let clock = FixedClock::at("2024-06-01T12:00:00+02:00").unwrap();
        let morning = DateTime::parse_from_rfc3339("2024-06-01T00:05:00+02:00")
            .unwrap()
            .with_timezone(&Utc);
        let night = DateTime::parse_from_rfc3339("2024-06-01T23:55:00+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(clock.date_key_of(&morning), clock.date_key_of(&night));
        assert_eq!(clock.date_key_of(&morning), clock.today());
    }

    #[test]
    fn key_follows_local_zone_not_utc() {
        // 23:30 in UTC-5 is already the next day in UTC.
        let clock = FixedClock::at("2024-06-01T23:30:00-05:00").unwrap();
        assert_eq!(clock.today().to_string(), "2024-06-01");
        assert_eq!(clock.now().date_naive().to_string(), "2024-06-02");
    }

    #[test]
    fn yesterday_is_calendar_subtraction() {
        let clock = FixedClock::at("2024-03-01T00:30:00+00:00").unwrap();
        assert_eq!(clock.yesterday().to_string(), "2024-02-29");

        clock.set(
            DateTime::parse_from_rfc3339("2025-01-01T08:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        assert_eq!(clock.yesterday().to_string(), "2024-12-31");
    }

    #[test]
    fn system_clock_cuts_days_in_local_zone() {
        let clock = SystemClock;
        let now = clock.now();
        let local = now.with_timezone(&Local).date_naive();
        assert_eq!(clock.date_key_of(&now).to_string(), local.format("%Y-%m-%d").to_string());
    }

    #[test]
    fn advance_moves_today() {
        let clock = FixedClock::at("2024-06-01T10:00:00Z").unwrap();
        clock.advance(Duration::days(1));
        assert_eq!(clock.today().to_string(), "2024-06-02");
        assert_eq!(clock.yesterday().to_string(), "2024-06-01");
    }

    #[test]
    fn date_key_serializes_as_string() {
        let key = DateKey::from_ymd(2024, 1, 5).unwrap();
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"2024-01-05\"");
        let back: DateKey = serde_json::from_str("\"2024-01-05\"").unwrap();
        assert_eq!(back, key);
    }
}
