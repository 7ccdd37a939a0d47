// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Schedule Cadences
//!
//! An agent's `schedule` is one of a fixed set of named buckets. The scheduler
//! evaluates buckets at minute resolution against wall-clock time expressed in
//! the engine's configured UTC offset.
//!
//! | Token | Meaning |
//! |-------|---------|
//! | `never` | not scheduled |
//! | `every_1m` … `every_30m` | every N minutes |
//! | `every_1h` … `every_12h` | every N hours, at minute 0 |
//! | `every_1d`, `every_2d`, `every_7d` | every N days, at local midnight |
//! | `hourly_at_N` | once an hour at minute N (0–59) |
//! | `midnight`, `1am` … `11am`, `noon`, `1pm` … `11pm` | once a day at that hour |
//!
//! Multi-day cadences are aligned to the Unix epoch, so `every_7d` fires on
//! Thursdays.

use chrono::{DateTime, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const EVERY_MINUTES: [u32; 12] = [1, 2, 5, 10, 30, 60, 120, 300, 720, 1440, 2880, 10080];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Schedule {
    Never,
    /// Every N minutes; N is one of the supported cadences.
    Every { minutes: u32 },
    /// Once an hour at the given minute.
    HourlyAt { minute: u8 },
    /// Once a day at the given hour (minute 0).
    DailyAt { hour: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown schedule '{0}'")]
pub struct ScheduleParseError(pub String);

impl Schedule {
    pub fn is_never(&self) -> bool {
        matches!(self, Schedule::Never)
    }

    /// Whether this cadence fires in the minute containing `at`.
    pub fn is_due(&self, at: DateTime<FixedOffset>) -> bool {
        match *self {
            Schedule::Never => false,
            Schedule::Every { minutes } => {
                let local_minute = at.naive_local().and_utc().timestamp().div_euclid(60);
                local_minute.rem_euclid(i64::from(minutes)) == 0
            }
            Schedule::HourlyAt { minute } => at.minute() == u32::from(minute),
            Schedule::DailyAt { hour } => at.hour() == u32::from(hour) && at.minute() == 0,
        }
    }

    /// All tokens accepted by [`FromStr`], in display order.
    pub fn tokens() -> Vec<String> {
        let mut tokens = vec!["never".to_string()];
        tokens.extend(EVERY_MINUTES.iter().map(|m| Schedule::Every { minutes: *m }.to_string()));
        tokens.extend((0..60).map(|m| Schedule::HourlyAt { minute: m }.to_string()));
        tokens.extend((0..24).map(|h| Schedule::DailyAt { hour: h }.to_string()));
        tokens
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::Never
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Schedule::Never => write!(f, "never"),
            Schedule::Every { minutes } if minutes % 1440 == 0 => write!(f, "every_{}d", minutes / 1440),
            Schedule::Every { minutes } if minutes % 60 == 0 => write!(f, "every_{}h", minutes / 60),
            Schedule::Every { minutes } => write!(f, "every_{}m", minutes),
            Schedule::HourlyAt { minute } => write!(f, "hourly_at_{}", minute),
            Schedule::DailyAt { hour: 0 } => write!(f, "midnight"),
            Schedule::DailyAt { hour: 12 } => write!(f, "noon"),
            Schedule::DailyAt { hour } if hour < 12 => write!(f, "{}am", hour),
            Schedule::DailyAt { hour } => write!(f, "{}pm", hour - 12),
        }
    }
}

impl FromStr for Schedule {
    type Err = ScheduleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        let err = || ScheduleParseError(s.to_string());

        match token.as_str() {
            "" | "never" => return Ok(Schedule::Never),
            "midnight" => return Ok(Schedule::DailyAt { hour: 0 }),
            "noon" => return Ok(Schedule::DailyAt { hour: 12 }),
            _ => {}
        }

        if let Some(rest) = token.strip_prefix("every_") {
            let (count, scale) = if let Some(count) = rest.strip_suffix('m') {
                (count, 1)
            } else if let Some(count) = rest.strip_suffix('h') {
                (count, 60)
            } else if let Some(count) = rest.strip_suffix('d') {
                (count, 1440)
            } else {
                return Err(err());
            };
            let count: u32 = count.parse().map_err(|_| err())?;
            let minutes = count.checked_mul(scale).ok_or_else(err)?;
            if !EVERY_MINUTES.contains(&minutes) {
                return Err(err());
            }
            return Ok(Schedule::Every { minutes });
        }

        if let Some(minute) = token.strip_prefix("hourly_at_") {
            let minute: u8 = minute.parse().map_err(|_| err())?;
            if minute > 59 {
                return Err(err());
            }
            return Ok(Schedule::HourlyAt { minute });
        }

        let (hour, offset) = if let Some(h) = token.strip_suffix("am") {
            (h, 0)
        } else if let Some(h) = token.strip_suffix("pm") {
            (h, 12)
        } else {
            return Err(err());
        };
        let hour: u8 = hour.parse().map_err(|_| err())?;
        if !(1..=11).contains(&hour) {
            return Err(err());
        }
        Ok(Schedule::DailyAt { hour: hour + offset })
    }
}

impl TryFrom<String> for Schedule {
    type Error = ScheduleParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Schedule> for String {
    fn from(schedule: Schedule) -> Self {
        schedule.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 4, h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_every_token_round_trips() {
        for token in Schedule::tokens() {
            let parsed: Schedule = token.parse().unwrap();
            assert_eq!(parsed.to_string(), token);
        }
    }

    #[test]
    fn test_rejects_unknown_cadence() {
        assert!("every_3m".parse::<Schedule>().is_err());
        assert!("13pm".parse::<Schedule>().is_err());
        assert!("hourly_at_60".parse::<Schedule>().is_err());
        assert!("sometimes".parse::<Schedule>().is_err());
    }

    #[test]
    fn test_rejects_malformed_counts_without_panicking() {
        assert!("every_1é".parse::<Schedule>().is_err());
        assert!("every_é".parse::<Schedule>().is_err());
        assert!("every_".parse::<Schedule>().is_err());
        assert!("every_4294967295d".parse::<Schedule>().is_err());
        assert!("every_4294967295h".parse::<Schedule>().is_err());
        assert!("every_-1m".parse::<Schedule>().is_err());
    }

    #[test]
    fn test_tokens_cover_hourly_minutes() {
        let tokens = Schedule::tokens();
        assert!(tokens.contains(&"hourly_at_0".to_string()));
        assert!(tokens.contains(&"hourly_at_59".to_string()));
    }

    #[test]
    fn test_daily_buckets() {
        let two_pm: Schedule = "2pm".parse().unwrap();
        assert!(two_pm.is_due(utc(14, 0)));
        assert!(!two_pm.is_due(utc(14, 1)));
        assert!(!two_pm.is_due(utc(2, 0)));

        let midnight: Schedule = "midnight".parse().unwrap();
        assert!(midnight.is_due(utc(0, 0)));
    }

    #[test]
    fn test_every_buckets() {
        let five: Schedule = "every_5m".parse().unwrap();
        assert!(five.is_due(utc(10, 15)));
        assert!(!five.is_due(utc(10, 16)));

        let hourly: Schedule = "every_1h".parse().unwrap();
        assert!(hourly.is_due(utc(7, 0)));
        assert!(!hourly.is_due(utc(7, 30)));

        let daily: Schedule = "every_1d".parse().unwrap();
        assert!(daily.is_due(utc(0, 0)));
        assert!(!daily.is_due(utc(1, 0)));
    }

    #[test]
    fn test_hourly_at_minute() {
        let at_15: Schedule = "hourly_at_15".parse().unwrap();
        assert!(at_15.is_due(utc(3, 15)));
        assert!(at_15.is_due(utc(22, 15)));
        assert!(!at_15.is_due(utc(3, 16)));
    }

    #[test]
    fn test_offset_applies_to_daily_hour() {
        let six_am: Schedule = "6am".parse().unwrap();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let at = plus_two.with_ymd_and_hms(2026, 3, 4, 6, 0, 0).unwrap();
        assert!(six_am.is_due(at));
        assert!(!six_am.is_due(at.with_timezone(&FixedOffset::east_opt(0).unwrap())));
    }

    #[test]
    fn test_never_is_never_due() {
        assert!(!Schedule::Never.is_due(utc(0, 0)));
        assert_eq!(serde_json::to_string(&Schedule::Never).unwrap(), "\"never\"");
    }
}
