//! Class schedule descriptors
//!
//! A schedule is either a one-time session on a calendar date or a weekly
//! recurring slot on a set of weekdays. Both carry a same-day time range.
//!
//! Descriptor text form (the canonical serialization):
//! - one-time: `2024-01-15 18:00-19:00`
//! - recurring: `Mon,Wed 18:00-19:00`
//!
//! Parsing also accepts 12-hour times (`6:00 PM - 7:00 PM`), full day names,
//! spaces after commas, and the presets `daily`, `weekdays`, `weekends`.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::{DaysOfWeek, WallClock, format_date, parse_date};

/// Errors from parsing or validating a schedule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Invalid time '{0}': expected HH:MM or H:MM AM/PM")]
    InvalidTime(String),

    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Unknown day '{0}'")]
    UnknownDay(String),

    #[error("Schedule has no days")]
    NoDays,

    #[error("End time {end} must be after start time {start}")]
    EmptyRange { start: WallClock, end: WallClock },

    #[error("Malformed schedule '{0}'")]
    Malformed(String),
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Same-day time range with `start < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    start: WallClock,
    end: WallClock,
}

impl TimeRange {
    /// Zero-length and inverted ranges are rejected.
    pub fn new(start: WallClock, end: WallClock) -> ScheduleResult<Self> {
        if end <= start {
            return Err(ScheduleError::EmptyRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> WallClock {
        self.start
    }

    pub fn end(&self) -> WallClock {
        self.end
    }

    /// `max(start) < min(end)`
    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start.max(other.start) < self.end.min(other.end)
    }

    pub fn parse(s: &str) -> ScheduleResult<Self> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| ScheduleError::Malformed(s.trim().to_string()))?;
        Self::new(WallClock::parse(start)?, WallClock::parse(end)?)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A class schedule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Schedule {
    OneTime { date: NaiveDate, time: TimeRange },
    Recurring { days: DaysOfWeek, time: TimeRange },
}

impl Schedule {
    pub fn one_time(date: NaiveDate, start: WallClock, end: WallClock) -> ScheduleResult<Self> {
        Ok(Self::OneTime {
            date,
            time: TimeRange::new(start, end)?,
        })
    }

    pub fn recurring(days: DaysOfWeek, start: WallClock, end: WallClock) -> ScheduleResult<Self> {
        if days.is_empty() {
            return Err(ScheduleError::NoDays);
        }
        Ok(Self::Recurring {
            days,
            time: TimeRange::new(start, end)?,
        })
    }

    pub fn time(&self) -> &TimeRange {
        match self {
            Self::OneTime { time, .. } | Self::Recurring { time, .. } => time,
        }
    }

    /// Whether the schedule has a session on the given date
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        match self {
            Self::OneTime { date: d, .. } => *d == date,
            Self::Recurring { days, .. } => days.contains(date.weekday()),
        }
    }

    /// Whether the two schedules share at least one concrete day
    pub fn shares_day(&self, other: &Schedule) -> bool {
        match (self, other) {
            (Self::OneTime { date: a, .. }, Self::OneTime { date: b, .. }) => a == b,
            (Self::OneTime { date, .. }, Self::Recurring { days, .. })
            | (Self::Recurring { days, .. }, Self::OneTime { date, .. }) => {
                days.contains(date.weekday())
            }
            (Self::Recurring { days: a, .. }, Self::Recurring { days: b, .. }) => a.intersects(b),
        }
    }

    /// Two schedules overlap iff they share a day and their time ranges intersect.
    pub fn overlaps(&self, other: &Schedule) -> bool {
        self.time().intersects(other.time()) && self.shares_day(other)
    }

    /// Human-facing form with 12-hour times, e.g. `Mon, Wed 6:00 PM - 7:00 PM`
    pub fn display_12h(&self) -> String {
        let time = self.time();
        let when = match self {
            Self::OneTime { date, .. } => date.format("%a %b %-d, %Y").to_string(),
            Self::Recurring { days, .. } => {
                let names: Vec<String> = days.iter().map(|d| d.to_string()).collect();
                names.join(", ")
            }
        };
        format!(
            "{} {} - {}",
            when,
            time.start().format_12h(),
            time.end().format_12h()
        )
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneTime { date, time } => write!(f, "{} {}", format_date(*date), time),
            Self::Recurring { days, time } => write!(f, "{} {}", days, time),
        }
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let malformed = || ScheduleError::Malformed(s.to_string());

        // One-time: the first whitespace-separated token is a YYYY-MM-DD date
        if let Some((date, time)) = s.split_once(char::is_whitespace)
            && looks_like_date(date)
        {
            return Ok(Self::OneTime {
                date: parse_date(date)?,
                time: TimeRange::parse(time)?,
            });
        }

        // Recurring: the day list runs up to the first digit
        let split = s.find(|c: char| c.is_ascii_digit()).ok_or_else(malformed)?;
        let (days, time) = s.split_at(split);
        if days.trim().is_empty() {
            return Err(malformed());
        }
        Ok(Self::Recurring {
            days: parse_days(days)?,
            time: TimeRange::parse(time)?,
        })
    }
}

impl TryFrom<String> for Schedule {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Schedule> for String {
    fn from(value: Schedule) -> Self {
        value.to_string()
    }
}

/// `NNNN-NN-NN`, whether or not it names a real date
fn looks_like_date(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// Parse a single day name (`mon`, `monday`, `tues`, ...)
pub fn parse_weekday(s: &str) -> ScheduleResult<Weekday> {
    match s.trim().to_ascii_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tues" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "weds" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thur" | "thurs" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        other => Err(ScheduleError::UnknownDay(other.to_string())),
    }
}

/// Parse a day list or preset: `Mon,Wed`, `mon/wed/fri`, `Tue & Thu`,
/// `daily`, `weekdays`, `weekends`.
pub fn parse_days(s: &str) -> ScheduleResult<DaysOfWeek> {
    let trimmed = s.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "all" | "every" | "daily" | "everyday" => return Ok(DaysOfWeek::ALL_DAYS),
        "weekdays" => return Ok(DaysOfWeek::WEEKDAYS),
        "weekends" => return Ok(DaysOfWeek::WEEKENDS),
        _ => {}
    }

    let mut days = DaysOfWeek::NONE;
    for token in trimmed
        .split(|c: char| c == ',' || c == '/' || c == '&' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        days = days | DaysOfWeek::from_weekdays([parse_weekday(token)?]);
    }

    if days.is_empty() {
        return Err(ScheduleError::NoDays);
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u8, m: u8) -> WallClock {
        WallClock::new(h, m).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn mon_wed() -> DaysOfWeek {
        DaysOfWeek::from_weekdays([Weekday::Mon, Weekday::Wed])
    }

    #[test]
    fn rejects_empty_and_inverted_ranges() {
        assert!(matches!(
            TimeRange::new(t(18, 0), t(18, 0)),
            Err(ScheduleError::EmptyRange { .. })
        ));
        assert!(TimeRange::new(t(19, 0), t(18, 0)).is_err());
        assert!(Schedule::recurring(DaysOfWeek::NONE, t(6, 0), t(7, 0)).is_err());
    }

    #[test]
    fn adjacent_ranges_do_not_intersect() {
        let a = TimeRange::new(t(18, 0), t(19, 0)).unwrap();
        let b = TimeRange::new(t(19, 0), t(20, 0)).unwrap();
        assert!(!a.intersects(&b));
        assert!(!b.intersects(&a));
    }

    #[test]
    fn recurring_overlap_requires_shared_day() {
        let a = Schedule::recurring(mon_wed(), t(18, 0), t(19, 0)).unwrap();
        let wed = DaysOfWeek::from_weekdays([Weekday::Wed]);
        let tue = DaysOfWeek::from_weekdays([Weekday::Tue]);

        let b = Schedule::recurring(wed, t(18, 30), t(19, 30)).unwrap();
        let c = Schedule::recurring(tue, t(18, 30), t(19, 30)).unwrap();

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn one_time_against_recurring_uses_weekday() {
        let weekly = Schedule::recurring(mon_wed(), t(18, 0), t(19, 0)).unwrap();
        // 2024-01-17 is a Wednesday, 2024-01-18 a Thursday
        let wed = Schedule::one_time(date(2024, 1, 17), t(18, 45), t(19, 15)).unwrap();
        let thu = Schedule::one_time(date(2024, 1, 18), t(18, 45), t(19, 15)).unwrap();

        assert!(weekly.overlaps(&wed));
        assert!(wed.overlaps(&weekly));
        assert!(!weekly.overlaps(&thu));
    }

    #[test]
    fn one_time_against_one_time_uses_calendar_date() {
        let a = Schedule::one_time(date(2024, 3, 1), t(9, 0), t(10, 0)).unwrap();
        let b = Schedule::one_time(date(2024, 3, 1), t(9, 30), t(10, 30)).unwrap();
        let c = Schedule::one_time(date(2024, 3, 8), t(9, 30), t(10, 30)).unwrap();
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn overlap_is_symmetric() {
        let schedules = vec![
            Schedule::recurring(mon_wed(), t(18, 0), t(19, 0)).unwrap(),
            Schedule::recurring(DaysOfWeek::WEEKDAYS, t(6, 0), t(7, 0)).unwrap(),
            Schedule::recurring(DaysOfWeek::WEEKENDS, t(18, 30), t(20, 0)).unwrap(),
            Schedule::recurring(DaysOfWeek::ALL_DAYS, t(6, 30), t(18, 15)).unwrap(),
            Schedule::one_time(date(2024, 1, 17), t(18, 59), t(21, 0)).unwrap(),
            Schedule::one_time(date(2024, 1, 20), t(6, 0), t(19, 0)).unwrap(),
            Schedule::one_time(date(2024, 1, 17), t(5, 0), t(6, 0)).unwrap(),
        ];

        for a in &schedules {
            for b in &schedules {
                assert_eq!(a.overlaps(b), b.overlaps(a), "{} vs {}", a, b);
            }
            assert!(a.overlaps(a), "{} should overlap itself", a);
        }
    }

    #[test]
    fn parses_canonical_descriptors() {
        let weekly: Schedule = "Mon,Wed 18:00-19:00".parse().unwrap();
        assert_eq!(weekly, Schedule::recurring(mon_wed(), t(18, 0), t(19, 0)).unwrap());

        let once: Schedule = "2024-01-15 06:00-07:30".parse().unwrap();
        assert_eq!(once, Schedule::one_time(date(2024, 1, 15), t(6, 0), t(7, 30)).unwrap());
    }

    #[test]
    fn parses_display_style_descriptors() {
        let weekly: Schedule = "Monday, Wednesday 6:00 PM - 7:00 PM".parse().unwrap();
        assert_eq!(weekly, Schedule::recurring(mon_wed(), t(18, 0), t(19, 0)).unwrap());

        let weekdays: Schedule = "weekdays 6am-7am".parse().unwrap();
        assert_eq!(weekdays, Schedule::recurring(DaysOfWeek::WEEKDAYS, t(6, 0), t(7, 0)).unwrap());
    }

    #[test]
    fn rejects_malformed_descriptors() {
        assert!("".parse::<Schedule>().is_err());
        assert!("Mon,Wed".parse::<Schedule>().is_err());
        assert!("18:00-19:00".parse::<Schedule>().is_err());
        assert!("Funday 18:00-19:00".parse::<Schedule>().is_err());
        assert!("Mon 19:00-18:00".parse::<Schedule>().is_err());
        assert!("2024-13-01 18:00-19:00".parse::<Schedule>().is_err());
        assert!("see front desk".parse::<Schedule>().is_err());
    }

    #[test]
    fn digit_leading_text_is_not_a_date() {
        assert!(matches!(
            "1st floor studio, ask front desk".parse::<Schedule>(),
            Err(ScheduleError::Malformed(_))
        ));
        assert!(matches!(
            "6pm Mondays".parse::<Schedule>(),
            Err(ScheduleError::Malformed(_))
        ));
        assert!(matches!(
            "2024-13-01 18:00-19:00".parse::<Schedule>(),
            Err(ScheduleError::InvalidDate(_))
        ));
    }

    #[test]
    fn display_is_parseable() {
        let s = Schedule::recurring(DaysOfWeek::WEEKENDS, t(9, 5), t(10, 0)).unwrap();
        assert_eq!(s.to_string(), "Sat,Sun 09:05-10:00");
        assert_eq!(s.to_string().parse::<Schedule>().unwrap(), s);
    }

    #[test]
    fn display_12h() {
        let s = Schedule::recurring(mon_wed(), t(18, 0), t(19, 0)).unwrap();
        assert_eq!(s.display_12h(), "Mon, Wed 6:00 PM - 7:00 PM");
    }

    #[test]
    fn occurs_on() {
        let s = Schedule::recurring(mon_wed(), t(18, 0), t(19, 0)).unwrap();
        assert!(s.occurs_on(date(2024, 1, 15))); // Monday
        assert!(!s.occurs_on(date(2024, 1, 16))); // Tuesday
    }

    #[test]
    fn schedule_serializes_as_descriptor() {
        let s = Schedule::recurring(mon_wed(), t(18, 0), t(19, 0)).unwrap();
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "\"Mon,Wed 18:00-19:00\"");
        let parsed: Schedule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, s);
    }
}
