//! # Dates and Intervals
//!
//! `Date` is an absolute UTC timestamp with one-second precision.
//! `Interval` is a signed calendar duration of years, months, days, hours,
//! minutes and seconds.
//!
//! Text forms:
//! - Date: `YYYY-MM-DD.HH:MM:SS`, accepting `YYYY`, `YYYY-MM`, `MM-DD`,
//!   `/` separators, a bare `HH:MM[:SS]` (today), `.` (now) and a trailing
//!   interval offset such as `2000-01-01 - 2y 2m`.
//! - Interval: `[+-] [Ny] [Nm] [Nw] [Nd] [Ns] [H:MM[:SS]]`.
//!
//! Time fields overflow upward into days and months overflow into years.
//! Days never fold into months since month length varies.

use super::HyperdbError;
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

/// `(year, month, day, hour, minute, second)`, the serialized Date shape.
pub type DateTuple = (i32, u32, u32, u32, u32, u32);

/// `(sign, year, month, day, hour, minute, second)`, the serialized
/// Interval shape.
pub type IntervalTuple = (i8, u32, u32, u32, u32, u32, u32);

const SECS_PER_MINUTE: i64 = 60;
const SECS_PER_HOUR: i64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: i64 = 24 * SECS_PER_HOUR;
/// Month length used when an interval must be compared or folded.
const APPROX_MONTH_SECS: i64 = 30 * SECS_PER_DAY;

// =============================================================================
// DATE
// =============================================================================

/// An absolute UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date(NaiveDateTime);

/// Finest field given in a date spec; decides a period's length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Granularity {
    Year,
    Month,
    Day,
    Minute,
    Second,
}

impl Date {
    /// The current time, truncated to whole seconds.
    #[must_use]
    pub fn now() -> Self {
        let now = Utc::now().naive_utc();
        Self(now.with_nanosecond(0).unwrap_or(now))
    }

    /// Build a date from its serialized tuple.
    pub fn from_tuple(t: DateTuple) -> Result<Self, HyperdbError> {
        let (y, m, d, hh, mm, ss) = t;
        let date = NaiveDate::from_ymd_opt(y, m, d)
            .ok_or_else(|| HyperdbError::Value(format!("invalid date {}-{}-{}", y, m, d)))?;
        let time = NaiveTime::from_hms_opt(hh, mm, ss)
            .ok_or_else(|| HyperdbError::Value(format!("invalid time {}:{}:{}", hh, mm, ss)))?;
        Ok(Self(NaiveDateTime::new(date, time)))
    }

    /// The serialized tuple form.
    #[must_use]
    pub fn to_tuple(&self) -> DateTuple {
        (
            self.0.year(),
            self.0.month(),
            self.0.day(),
            self.0.hour(),
            self.0.minute(),
            self.0.second(),
        )
    }

    /// Parse a date spec given in UTC.
    pub fn parse(spec: &str) -> Result<Self, HyperdbError> {
        Self::parse_with_offset(spec, 0)
    }

    /// Parse a date spec given in local time at `offset` hours from UTC.
    ///
    /// `.` (now) is never shifted by the offset.
    pub fn parse_with_offset(spec: &str, offset: i32) -> Result<Self, HyperdbError> {
        parse_spec(spec, offset).map(|(date, _)| date)
    }

    /// Parse a date spec as the inclusive period it names.
    ///
    /// `2003` covers the whole year, `2003-05` the month, `2003-02-12` the
    /// day and `2003-01-01.23:00` the minute.
    pub fn parse_period(spec: &str) -> Result<(Self, Self), HyperdbError> {
        let (start, granularity) = parse_spec(spec, 0)?;
        let step = match granularity {
            Granularity::Year => Interval::from_parts(1, 1, 0, 0, 0, 0, 0),
            Granularity::Month => Interval::from_parts(1, 0, 1, 0, 0, 0, 0),
            Granularity::Day => Interval::from_parts(1, 0, 0, 1, 0, 0, 0),
            Granularity::Minute => Interval::from_parts(1, 0, 0, 0, 0, 1, 0),
            Granularity::Second => return Ok((start, start)),
        };
        let end = start.plus(&step)?.minus(&Interval::from_seconds(1))?;
        Ok((start, end))
    }

    /// This date rendered in local time at `offset` hours from UTC.
    pub fn local(&self, offset: i32) -> Result<Self, HyperdbError> {
        shift_hours(self.0, offset).map(Self)
    }

    /// Calendar-aware `self + interval`.
    ///
    /// Years and months step the calendar first (a day past the end of the
    /// new month overflows into the next), then the time part is added.
    pub fn plus(&self, interval: &Interval) -> Result<Self, HyperdbError> {
        let stepped = add_months(self.0, interval.signed_months())?;
        let delta = TimeDelta::try_seconds(interval.signed_seconds())
            .ok_or_else(|| HyperdbError::Value(format!("interval {} out of range", interval)))?;
        stepped
            .checked_add_signed(delta)
            .map(Self)
            .ok_or_else(|| HyperdbError::Value(format!("{} + {} out of range", self, interval)))
    }

    /// Calendar-aware `self - interval`.
    pub fn minus(&self, interval: &Interval) -> Result<Self, HyperdbError> {
        self.plus(&-*interval)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d.%H:%M:%S"))
    }
}

impl FromStr for Date {
    type Err = HyperdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// `Date - Date` is the exact difference in days and time.
impl Sub for Date {
    type Output = Interval;

    fn sub(self, rhs: Date) -> Interval {
        Interval::from_seconds(self.0.signed_duration_since(rhs.0).num_seconds())
    }
}

fn date_err(spec: &str) -> HyperdbError {
    HyperdbError::Value(format!(
        "'{}' is not a date spec (expected [[yyyy-]mm-dd][.HH:MM[:SS]][offset])",
        spec
    ))
}

fn shift_hours(dt: NaiveDateTime, hours: i32) -> Result<NaiveDateTime, HyperdbError> {
    TimeDelta::try_hours(i64::from(hours))
        .and_then(|delta| dt.checked_add_signed(delta))
        .ok_or_else(|| HyperdbError::Value(format!("offset of {} hours out of range", hours)))
}

fn add_months(dt: NaiveDateTime, months: i64) -> Result<NaiveDateTime, HyperdbError> {
    if months == 0 {
        return Ok(dt);
    }
    let total = i64::from(dt.year()) * 12 + i64::from(dt.month0()) + months;
    let year = i32::try_from(total.div_euclid(12))
        .map_err(|_| HyperdbError::Value(format!("{} months out of range", months)))?;
    let month = total.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.checked_add_days(Days::new(u64::from(dt.day()) - 1)))
        .map(|date| NaiveDateTime::new(date, dt.time()))
        .ok_or_else(|| HyperdbError::Value(format!("{} months out of range", months)))
}

/// Position of the interval offset in a date spec: the first sign that
/// starts the spec or follows whitespace.
fn offset_split(spec: &str) -> usize {
    let mut prev_space = true;
    for (i, c) in spec.char_indices() {
        if (c == '+' || c == '-') && prev_space {
            return i;
        }
        prev_space = c.is_whitespace();
    }
    spec.len()
}

fn numeric_fields<'a>(text: &'a str, sep: char, spec: &str) -> Result<Vec<&'a str>, HyperdbError> {
    let fields: Vec<&str> = text.split(sep).collect();
    if fields
        .iter()
        .any(|f| f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(date_err(spec));
    }
    Ok(fields)
}

fn field<T: FromStr>(text: &str, spec: &str) -> Result<T, HyperdbError> {
    text.parse().map_err(|_| date_err(spec))
}

fn parse_spec(spec: &str, offset: i32) -> Result<(Date, Granularity), HyperdbError> {
    let spec = spec.trim();
    let split = offset_split(spec);
    let (base, rest) = (spec[..split].trim(), spec[split..].trim());

    let (date, granularity) = if base.is_empty() || base == "." {
        (Date::now(), Granularity::Second)
    } else {
        let (date_part, time_part) = match base.split_once('.') {
            Some((d, t)) => (d, t),
            None if base.contains(':') => ("", base),
            None => (base, ""),
        };

        let today = Date::now().0.date();
        let (day, mut granularity) = if date_part.is_empty() {
            (today, Granularity::Day)
        } else {
            let normalized = date_part.replace('/', "-");
            let fields = numeric_fields(&normalized, '-', spec)?;
            let (y, m, d, g) = match fields.as_slice() {
                [y] if y.len() == 4 => (field(y, spec)?, 1, 1, Granularity::Year),
                [y, m] if y.len() == 4 => (field(y, spec)?, field(m, spec)?, 1, Granularity::Month),
                [m, d] => (today.year(), field(m, spec)?, field(d, spec)?, Granularity::Day),
                [y, m, d] => (field(y, spec)?, field(m, spec)?, field(d, spec)?, Granularity::Day),
                _ => return Err(date_err(spec)),
            };
            let day = NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| date_err(spec))?;
            (day, g)
        };

        let time = if time_part.is_empty() {
            NaiveTime::MIN
        } else {
            let fields = numeric_fields(time_part, ':', spec)?;
            let (hh, mm, ss, g) = match fields.as_slice() {
                [h, m] => (field(h, spec)?, field(m, spec)?, 0, Granularity::Minute),
                [h, m, s] => (field(h, spec)?, field(m, spec)?, field(s, spec)?, Granularity::Second),
                _ => return Err(date_err(spec)),
            };
            granularity = g;
            NaiveTime::from_hms_opt(hh, mm, ss).ok_or_else(|| date_err(spec))?
        };

        let utc = shift_hours(NaiveDateTime::new(day, time), offset.saturating_neg())?;
        (Date(utc), granularity)
    };

    if rest.is_empty() {
        Ok((date, granularity))
    } else {
        let interval = Interval::parse(rest)?;
        Ok((date.plus(&interval)?, granularity))
    }
}

// =============================================================================
// INTERVAL
// =============================================================================

/// A signed calendar duration, always held normalized: seconds, minutes and
/// hours below their overflow bound, months below 12, zero carrying `+`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    sign: i8,
    year: u32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
}

impl Interval {
    /// The zero interval.
    pub const ZERO: Interval = Interval {
        sign: 1,
        year: 0,
        month: 0,
        day: 0,
        hour: 0,
        minute: 0,
        second: 0,
    };

    /// Build and normalize an interval from sign and fields.
    #[must_use]
    pub fn from_parts(
        sign: i8,
        year: u32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Self {
        let sign = if sign < 0 { -1 } else { 1 };
        let months = i64::from(year) * 12 + i64::from(month);
        let secs = i64::from(day) * SECS_PER_DAY
            + i64::from(hour) * SECS_PER_HOUR
            + i64::from(minute) * SECS_PER_MINUTE
            + i64::from(second);
        Self::normalized(i64::from(sign) * months, i64::from(sign) * secs)
    }

    /// An exact interval of `secs` seconds, folded up to days.
    #[must_use]
    pub fn from_seconds(secs: i64) -> Self {
        Self::normalized(0, secs)
    }

    /// Build from the serialized tuple.
    #[must_use]
    pub fn from_tuple(t: IntervalTuple) -> Self {
        let (sign, y, m, d, hh, mm, ss) = t;
        Self::from_parts(sign, y, m, d, hh, mm, ss)
    }

    /// The serialized tuple form.
    #[must_use]
    pub fn to_tuple(&self) -> IntervalTuple {
        (
            self.sign,
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
        )
    }

    /// Parse an interval spec such as `- 2w 3d`, `1y 2:30` or `0:04:33`.
    pub fn parse(spec: &str) -> Result<Self, HyperdbError> {
        let err = || {
            HyperdbError::Value(format!(
                "'{}' is not an interval spec (expected [+-] [#y] [#m] [#w] [#d] [[H]H:MM[:SS]])",
                spec
            ))
        };
        let compact: String = spec.chars().filter(|c| !c.is_whitespace()).collect();
        let (sign, body) = match compact.as_bytes().first() {
            Some(b'-') => (-1_i64, &compact[1..]),
            Some(b'+') => (1, &compact[1..]),
            _ => (1, compact.as_str()),
        };

        let mut months: i64 = 0;
        let mut secs: i64 = 0;
        let mut tokens = 0;
        let mut rest = body;
        while !rest.is_empty() {
            let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
            if digits == 0 {
                return Err(err());
            }
            let n: i64 = rest[..digits].parse().map_err(|_| err())?;
            rest = &rest[digits..];
            match rest.as_bytes().first() {
                Some(b'y') => months = months.saturating_add(n.saturating_mul(12)),
                Some(b'm') => months = months.saturating_add(n),
                Some(b'w') => secs = secs.saturating_add(n.saturating_mul(7 * SECS_PER_DAY)),
                Some(b'd') => secs = secs.saturating_add(n.saturating_mul(SECS_PER_DAY)),
                Some(b's') => secs = secs.saturating_add(n),
                Some(b':') => {
                    let end = rest[1..]
                        .find(|c: char| !c.is_ascii_digit() && c != ':')
                        .map_or(rest.len(), |i| i + 1);
                    let parts: Vec<&str> = rest[1..end].split(':').collect();
                    let (mm, ss) = match parts.as_slice() {
                        [m] => (*m, "0"),
                        [m, s] => (*m, *s),
                        _ => return Err(err()),
                    };
                    let mm: i64 = mm.parse().map_err(|_| err())?;
                    let ss: i64 = ss.parse().map_err(|_| err())?;
                    secs = secs
                        .saturating_add(n.saturating_mul(SECS_PER_HOUR))
                        .saturating_add(mm.saturating_mul(SECS_PER_MINUTE))
                        .saturating_add(ss);
                    tokens += 1;
                    rest = &rest[end..];
                    continue;
                }
                _ => return Err(err()),
            }
            tokens += 1;
            rest = &rest[1..];
        }
        if tokens == 0 {
            return Err(err());
        }
        Ok(Self::normalized(sign * months, sign * secs))
    }

    /// +1 or -1.
    #[must_use]
    pub fn sign(&self) -> i8 {
        self.sign
    }

    /// Signed total of the year and month fields, in months.
    #[must_use]
    pub fn signed_months(&self) -> i64 {
        i64::from(self.sign) * (i64::from(self.year) * 12 + i64::from(self.month))
    }

    /// Signed total of the day and time fields, in seconds.
    #[must_use]
    pub fn signed_seconds(&self) -> i64 {
        i64::from(self.sign)
            * (i64::from(self.day) * SECS_PER_DAY
                + i64::from(self.hour) * SECS_PER_HOUR
                + i64::from(self.minute) * SECS_PER_MINUTE
                + i64::from(self.second))
    }

    /// Length in seconds, counting a month as 30 days.
    #[must_use]
    pub fn approx_seconds(&self) -> i64 {
        self.signed_months() * APPROX_MONTH_SECS + self.signed_seconds()
    }

    /// Integer division of both the calendar and the time part.
    #[must_use]
    pub fn divide(&self, by: u32) -> Self {
        if by == 0 {
            return *self;
        }
        let by = i64::from(by);
        let months = self.signed_months();
        let rem_secs = (months % by) * APPROX_MONTH_SECS;
        Self::normalized(months / by, (self.signed_seconds() + rem_secs) / by)
    }

    /// A human phrase such as "in 3 days", "2 weeks ago" or "just now".
    #[must_use]
    pub fn pretty(&self) -> String {
        let quarters = self.minute / 15;
        let phrase = if self.year > 0 {
            plural(self.year, "year")
        } else if self.month > 0 || self.day > 28 {
            let months = (u64::from(self.month) * 30 + u64::from(self.day)) / 30;
            plural(u32::try_from(months).unwrap_or(u32::MAX).max(1), "month")
        } else if self.day > 7 {
            plural(self.day / 7, "week")
        } else if self.day > 1 {
            plural(self.day, "day")
        } else if self.day == 1 || self.hour > 12 {
            return if self.sign > 0 { "tomorrow" } else { "yesterday" }.to_string();
        } else if self.hour > 0 {
            match (self.hour, quarters) {
                (1, 0) => "an hour".to_string(),
                (h, 0) => format!("{} hours", h),
                (h, 2) => format!("{} 1/2 hours", h),
                (h, q) => format!("{} {}/4 hours", h, q),
            }
        } else if self.minute == 0 {
            return if self.sign > 0 { "in a moment" } else { "just now" }.to_string();
        } else if self.minute < 15 {
            plural(self.minute, "minute")
        } else if quarters == 2 {
            "1/2 an hour".to_string()
        } else {
            format!("{}/4 hour", quarters)
        };
        if self.sign > 0 {
            format!("in {}", phrase)
        } else {
            format!("{} ago", phrase)
        }
    }

    /// Normalize signed month and second totals into fields.
    ///
    /// Totals of opposite sign can't share one sign, so the months are
    /// folded into the time part at 30 days each.
    fn normalized(months: i64, secs: i64) -> Self {
        let (months, secs) = if months.signum() * secs.signum() < 0 {
            (0, secs.saturating_add(months.saturating_mul(APPROX_MONTH_SECS)))
        } else {
            (months, secs)
        };
        let sign: i8 = if months < 0 || secs < 0 { -1 } else { 1 };
        let months = months.unsigned_abs();
        let secs = secs.unsigned_abs();
        let clamp = |v: u64| u32::try_from(v).unwrap_or(u32::MAX);
        Self {
            sign,
            year: clamp(months / 12),
            month: (months % 12) as u32,
            day: clamp(secs / SECS_PER_DAY as u64),
            hour: ((secs % SECS_PER_DAY as u64) / SECS_PER_HOUR as u64) as u32,
            minute: ((secs % SECS_PER_HOUR as u64) / SECS_PER_MINUTE as u64) as u32,
            second: (secs % SECS_PER_MINUTE as u64) as u32,
        }
    }
}

fn plural(n: u32, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.year > 0 {
            parts.push(format!("{}y", self.year));
        }
        if self.month > 0 {
            parts.push(format!("{}m", self.month));
        }
        if self.day > 0 {
            parts.push(format!("{}d", self.day));
        }
        if self.second > 0 {
            parts.push(format!("{}:{:02}:{:02}", self.hour, self.minute, self.second));
        } else if self.hour > 0 || self.minute > 0 {
            parts.push(format!("{}:{:02}", self.hour, self.minute));
        }
        if parts.is_empty() {
            return write!(f, "00:00");
        }
        let sign = if self.sign < 0 { "-" } else { "+" };
        write!(f, "{} {}", sign, parts.join(" "))
    }
}

impl FromStr for Interval {
    type Err = HyperdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Neg for Interval {
    type Output = Interval;

    fn neg(self) -> Interval {
        Self::normalized(self.signed_months().saturating_neg(), self.signed_seconds().saturating_neg())
    }
}

impl Add for Interval {
    type Output = Interval;

    fn add(self, rhs: Interval) -> Interval {
        Self::normalized(
            self.signed_months() + rhs.signed_months(),
            self.signed_seconds() + rhs.signed_seconds(),
        )
    }
}

impl Sub for Interval {
    type Output = Interval;

    fn sub(self, rhs: Interval) -> Interval {
        self + (-rhs)
    }
}

impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.approx_seconds()
            .cmp(&other.approx_seconds())
            .then_with(|| self.signed_months().cmp(&other.signed_months()))
    }
}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// =============================================================================
// TESTS
// =============================================================================
