use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::ValidationError;

/// Minutes in a regular NYSE session (09:30 to 16:00).
const SESSION_MINUTES: i64 = 390;

/// Spacing of bars in a price history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Interval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    #[default]
    OneDay,
}

impl Interval {
    pub const ALL: [Self; 5] = [
        Self::OneMinute,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::OneHour,
        Self::OneDay,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::OneHour => "1h",
            Self::OneDay => "1d",
        }
    }

    /// Bar width in minutes; a daily bar counts as one full calendar day.
    pub const fn minutes(self) -> i64 {
        match self {
            Self::OneMinute => 1,
            Self::FiveMinutes => 5,
            Self::FifteenMinutes => 15,
            Self::OneHour => 60,
            Self::OneDay => 24 * 60,
        }
    }

    pub fn step(self) -> Duration {
        Duration::minutes(self.minutes())
    }

    pub const fn is_intraday(self) -> bool {
        !matches!(self, Self::OneDay)
    }

    /// Bars one regular session produces.
    pub const fn bars_per_session(self) -> i64 {
        if self.is_intraday() {
            SESSION_MINUTES / self.minutes()
        } else {
            1
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let token = value.trim().to_ascii_lowercase();
        if token == "60m" {
            return Ok(Self::OneHour);
        }
        Self::ALL
            .into_iter()
            .find(|interval| interval.as_str() == token)
            .ok_or(ValidationError::InvalidInterval { value: token })
    }
}

impl TryFrom<String> for Interval {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for &'static str {
    fn from(value: Interval) -> Self {
        value.as_str()
    }
}
