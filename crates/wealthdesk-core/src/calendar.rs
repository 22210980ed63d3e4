//! Trading calendar used to decide quote staleness and cache lifetimes.
//!
//! Sessions are defined in exchange local time and converted to UTC per date,
//! so daylight saving shifts the UTC session boundaries twice a year. The most
//! recent completed session close is the freshness boundary: anything observed
//! before it, or served while the market is closed, is stale.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{UtcDateTime, ValidationError};

/// Upper bound on the calendar search; longer closures are treated as configuration errors.
const MAX_SCAN_DAYS: u64 = 31;

/// Exchange time zone of the default US equities session.
pub const NEW_YORK: Tz = chrono_tz::America::New_York;

/// Session state at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSession {
    pub is_open: bool,
    pub last_close: UtcDateTime,
    pub next_open: UtcDateTime,
}

/// Regular-hours exchange calendar in the exchange's local time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketCalendar {
    timezone: Tz,
    open: NaiveTime,
    close: NaiveTime,
    /// Exchange-local dates without a session.
    holidays: BTreeSet<NaiveDate>,
}

impl Default for MarketCalendar {
    /// NYSE regular session, 09:30-16:00 America/New_York.
    fn default() -> Self {
        let open = NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN);
        let close = NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN);
        Self::new(NEW_YORK, open, close)
    }
}

impl MarketCalendar {
    pub fn new(timezone: Tz, open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            timezone,
            open,
            close,
            holidays: BTreeSet::new(),
        }
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    /// Parses `YYYY-MM-DD` holiday strings.
    pub fn with_holiday_strings<I, S>(self, holidays: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let dates = holidays
            .into_iter()
            .map(|raw| {
                let raw = raw.as_ref();
                NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
                    ValidationError::InvalidDate {
                        value: raw.to_owned(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.with_holidays(dates))
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    fn local(&self, at: UtcDateTime) -> DateTime<Tz> {
        DateTime::<Utc>::from_timestamp(at.unix_seconds(), 0)
            .unwrap_or_default()
            .with_timezone(&self.timezone)
    }

    /// UTC instant of local wall-clock `time` on `date`.
    fn instant(&self, date: NaiveDate, time: NaiveTime) -> Option<UtcDateTime> {
        let local = self
            .timezone
            .from_local_datetime(&date.and_time(time))
            .earliest()?;
        UtcDateTime::from_unix_seconds(local.timestamp()).ok()
    }

    pub fn is_open(&self, at: UtcDateTime) -> bool {
        let local = self.local(at);
        let time = local.time();
        self.is_trading_day(local.date_naive()) && time >= self.open && time < self.close
    }

    /// Close of the most recent session that finished at or before `at`.
    pub fn last_close(&self, at: UtcDateTime) -> UtcDateTime {
        let start = self.local(at).date_naive();
        (0..MAX_SCAN_DAYS)
            .filter_map(|offset| start.checked_sub_days(Days::new(offset)))
            .filter(|date| self.is_trading_day(*date))
            .filter_map(|date| self.instant(date, self.close))
            .find(|close| *close <= at)
            .unwrap_or(at)
    }

    /// First session open strictly after `at`.
    pub fn next_open(&self, at: UtcDateTime) -> UtcDateTime {
        let start = self.local(at).date_naive();
        (0..MAX_SCAN_DAYS)
            .filter_map(|offset| start.checked_add_days(Days::new(offset)))
            .filter(|date| self.is_trading_day(*date))
            .filter_map(|date| self.instant(date, self.open))
            .find(|open| *open > at)
            .unwrap_or(at)
    }

    pub fn session(&self, at: UtcDateTime) -> MarketSession {
        MarketSession {
            is_open: self.is_open(at),
            last_close: self.last_close(at),
            next_open: self.next_open(at),
        }
    }

    /// Time left until the next open, zero while the market is open.
    pub fn until_next_open(&self, at: UtcDateTime) -> std::time::Duration {
        if self.is_open(at) {
            return std::time::Duration::ZERO;
        }
        let seconds = self.next_open(at).unix_seconds() - at.unix_seconds();
        std::time::Duration::from_secs(seconds.max(0) as u64)
    }
}
