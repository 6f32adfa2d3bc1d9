//! Cron expression evaluation
//!
//! Five whitespace-separated fields: minute, hour, day-of-month, month and
//! day-of-week (0 = Sunday). Each field accepts `*`, literals, inclusive
//! ranges `a-b`, comma lists and steps `base/step`.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use tracing::warn;

use super::types::{Result, SchedulerError};

/// How far ahead the forward search looks
const SEARCH_HORIZON_DAYS: i64 = 366;

/// Upper bound used when a step term has no explicit range end
const STEP_DEFAULT_END: u32 = 59;

/// Check whether `value` matches a single cron field.
///
/// Malformed terms never match.
pub fn matches(field: &str, value: u32) -> bool {
    if field == "*" {
        return true;
    }
    field.split(',').any(|term| term_matches(term, value))
}

fn term_matches(term: &str, value: u32) -> bool {
    if let Some((base, step)) = term.split_once('/') {
        let Ok(step) = step.parse::<u32>() else {
            return false;
        };
        if step == 0 {
            return false;
        }
        let (start, end) = if base == "*" {
            (0, STEP_DEFAULT_END)
        } else if let Some(range) = parse_range(base) {
            range
        } else if let Ok(start) = base.parse::<u32>() {
            (start, STEP_DEFAULT_END)
        } else {
            return false;
        };
        return value >= start && value <= end && (value - start) % step == 0;
    }

    if let Some((start, end)) = parse_range(term) {
        return value >= start && value <= end;
    }

    term.parse::<u32>().is_ok_and(|n| n == value)
}

fn parse_range(term: &str) -> Option<(u32, u32)> {
    let (start, end) = term.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

/// A validated five-field cron expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: String,
    hour: String,
    day_of_month: String,
    month: String,
    day_of_week: String,
}

impl CronSchedule {
    /// Parse and validate an expression
    pub fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(SchedulerError::InvalidCron(format!(
                "'{}': expected 5 fields, found {}",
                expression,
                fields.len()
            )));
        }

        let bounds = [(0, 59), (0, 23), (1, 31), (1, 12), (0, 6)];
        for (field, (min, max)) in fields.iter().zip(bounds) {
            validate_field(field, min, max).map_err(|reason| {
                SchedulerError::InvalidCron(format!("'{}': {}", expression, reason))
            })?;
        }

        Ok(Self {
            minute: fields[0].to_string(),
            hour: fields[1].to_string(),
            day_of_month: fields[2].to_string(),
            month: fields[3].to_string(),
            day_of_week: fields[4].to_string(),
        })
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = matches(&self.day_of_month, date.day());
        let dow = matches(&self.day_of_week, date.weekday().num_days_from_sunday());
        match (self.day_of_month == "*", self.day_of_week == "*") {
            (true, _) => dow,
            (false, true) => dom,
            (false, false) => dom || dow,
        }
    }

    /// Earliest matching minute strictly after `from`, evaluated in the
    /// time zone of `from`. `None` when nothing matches within a year.
    pub fn next_after<Tz: TimeZone>(&self, from: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = from.timezone();
        let start = from.naive_local().with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let limit = start + Duration::days(SEARCH_HORIZON_DAYS);
        let mut t = start;

        while t <= limit {
            if !matches(&self.month, t.month()) {
                t = first_of_next_month(t)?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !matches(&self.hour, t.hour()) {
                t = t.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !matches(&self.minute, t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            // Local times skipped by a DST jump have no mapping
            match tz.from_local_datetime(&t).earliest() {
                Some(found) => return Some(found),
                None => t += Duration::minutes(1),
            }
        }

        None
    }
}

fn first_of_next_month(t: NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn validate_field(field: &str, min: u32, max: u32) -> std::result::Result<(), String> {
    if field == "*" {
        return Ok(());
    }
    for term in field.split(',') {
        let base = match term.split_once('/') {
            Some((base, step)) => {
                match step.parse::<u32>() {
                    Ok(s) if s > 0 => {}
                    _ => return Err(format!("invalid step in '{}'", term)),
                }
                if base == "*" {
                    continue;
                }
                base
            }
            None => term,
        };

        let (start, end) = match base.split_once('-') {
            Some((a, b)) => (parse_bounded(a, min, max)?, parse_bounded(b, min, max)?),
            None => {
                let n = parse_bounded(base, min, max)?;
                (n, n)
            }
        };
        if start > end {
            return Err(format!("range '{}' is reversed", base));
        }
    }
    Ok(())
}

fn parse_bounded(s: &str, min: u32, max: u32) -> std::result::Result<u32, String> {
    let n: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a number", s))?;
    if n < min || n > max {
        return Err(format!("{} is outside {}-{}", n, min, max));
    }
    Ok(n)
}

/// Next run for a cron expression, falling back to one hour after `from`
/// when the expression is malformed or never matches.
pub fn find_next<Tz: TimeZone>(expression: &str, from: &DateTime<Tz>) -> DateTime<Utc> {
    let fallback = from.with_timezone(&Utc) + Duration::hours(1);
    match CronSchedule::parse(expression) {
        Ok(schedule) => match schedule.next_after(from) {
            Some(next) => next.with_timezone(&Utc),
            None => {
                warn!(
                    "Cron expression '{}' has no match within {} days, retrying in one hour",
                    expression, SEARCH_HORIZON_DAYS
                );
                fallback
            }
        },
        Err(e) => {
            warn!("{}, retrying in one hour", e);
            fallback
        }
    }
}
