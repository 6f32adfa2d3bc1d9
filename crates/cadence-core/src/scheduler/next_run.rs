//! Next-run calculation
//!
//! Pure function of the task's schedule, history and the current time.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use tracing::warn;

use super::cron::find_next;
use super::types::{LegacyFrequency, Schedule, Task};

/// Compute when `task` should run next, or `None` if it is not scheduled.
///
/// Calendar-based schedules are evaluated in the time zone of `now`.
pub fn compute_next_run<Tz: TimeZone>(task: &Task, now: &DateTime<Tz>) -> Option<DateTime<Utc>> {
    if !task.enabled {
        return None;
    }

    let now_utc = now.with_timezone(&Utc);
    match &task.schedule {
        Schedule::Manual => None,
        Schedule::Interval { minutes } => {
            let interval = Duration::minutes(i64::from(*minutes));
            Some(task.last_run_at.unwrap_or(now_utc) + interval)
        }
        Schedule::Cron { expression } => {
            if expression.trim().is_empty() {
                warn!("Task {} has an empty cron expression", task.id);
                return None;
            }
            Some(find_next(expression, now))
        }
        Schedule::Legacy {
            frequency,
            interval,
        } => legacy_next_run(task, *frequency, *interval, now),
    }
}

fn legacy_next_run<Tz: TimeZone>(
    task: &Task,
    frequency: LegacyFrequency,
    interval: i64,
    now: &DateTime<Tz>,
) -> Option<DateTime<Utc>> {
    let now_utc = now.with_timezone(&Utc);
    let tz = now.timezone();
    let today = now.date_naive();
    let ran_within = |window: Duration| {
        task.last_run_at
            .is_some_and(|last| now_utc.signed_duration_since(last) < window)
    };

    match frequency {
        LegacyFrequency::Once => {
            if task.has_run() {
                return None;
            }
            match task.next_run_at {
                Some(next) if next > now_utc => Some(next),
                _ => Some(now_utc),
            }
        }
        LegacyFrequency::Daily => {
            let hour = (interval / 100) as u32;
            let minute = (interval % 100) as u32;
            let today_at = local_at(&tz, today, hour, minute)?;
            if today_at > now_utc && !ran_within(Duration::hours(24)) {
                Some(today_at)
            } else {
                local_at(&tz, today.succ_opt()?, hour, minute)
            }
        }
        LegacyFrequency::Weekly => {
            let target = interval.rem_euclid(7) as u32;
            let current = today.weekday().num_days_from_sunday();
            let ahead = (target + 7 - current) % 7;
            let candidate = local_at(&tz, today + Duration::days(i64::from(ahead)), 0, 0)?;
            if candidate > now_utc {
                Some(candidate)
            } else {
                Some(candidate + Duration::weeks(1))
            }
        }
        LegacyFrequency::Monthly => {
            let day = interval.clamp(1, 31) as u32;
            let this_month = local_at(&tz, clamped_day(today.year(), today.month(), day)?, 0, 0)?;
            if this_month > now_utc && !ran_within(Duration::days(30)) {
                return Some(this_month);
            }
            let (year, month) = if today.month() == 12 {
                (today.year() + 1, 1)
            } else {
                (today.year(), today.month() + 1)
            };
            local_at(&tz, clamped_day(year, month, day)?, 0, 0)
        }
        LegacyFrequency::Custom => {
            let step = Duration::try_seconds(interval.max(1))?;
            task.last_run_at
                .unwrap_or(now_utc)
                .checked_add_signed(step)
        }
    }
}

fn local_at<Tz: TimeZone>(tz: &Tz, date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(hour, minute, 0)?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `day` of the given month, pulled back to the month's last day
fn clamped_day(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    (1..=day)
        .rev()
        .find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::types::{SchedulerError, TaskAction, MAX_CUSTOM_INTERVAL_SECS};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn task(schedule: Schedule) -> Task {
        Task::new("t")
            .with_action(TaskAction::command("true"))
            .with_schedule(schedule)
    }

    #[test]
    fn test_disabled_and_manual_have_no_next_run() {
        let now = utc(2024, 6, 1, 10, 0);
        assert!(compute_next_run(&task(Schedule::Manual), &now).is_none());
        let disabled = task(Schedule::interval(5)).with_enabled(false);
        assert!(compute_next_run(&disabled, &now).is_none());
    }

    #[test]
    fn test_interval_anchors_on_last_run() {
        let now = utc(2024, 6, 1, 10, 0);
        let mut t = task(Schedule::interval(5));
        assert_eq!(compute_next_run(&t, &now), Some(utc(2024, 6, 1, 10, 5)));

        t.last_run_at = Some(utc(2024, 6, 1, 9, 58));
        assert_eq!(compute_next_run(&t, &now), Some(utc(2024, 6, 1, 10, 3)));
    }

    #[test]
    fn test_cron_delegates_to_evaluator() {
        let now = utc(2024, 6, 1, 10, 0);
        let t = task(Schedule::cron("0 9 * * 1-5"));
        assert_eq!(compute_next_run(&t, &now), Some(utc(2024, 6, 3, 9, 0)));

        let empty = task(Schedule::cron("  "));
        assert!(compute_next_run(&empty, &now).is_none());
    }

    #[test]
    fn test_legacy_custom_out_of_range_interval() {
        let now = utc(2024, 6, 1, 10, 0);
        let huge = task(Schedule::Legacy {
            frequency: LegacyFrequency::Custom,
            interval: i64::MAX,
        });
        assert!(compute_next_run(&huge, &now).is_none());
        assert!(matches!(
            huge.validate(),
            Err(SchedulerError::InvalidConfig(_))
        ));

        let longest = task(Schedule::Legacy {
            frequency: LegacyFrequency::Custom,
            interval: MAX_CUSTOM_INTERVAL_SECS,
        });
        assert!(longest.validate().is_ok());
        assert_eq!(
            compute_next_run(&longest, &now),
            Some(now + Duration::seconds(MAX_CUSTOM_INTERVAL_SECS))
        );
    }

    #[test]
    fn test_legacy_once() {
        let now = utc(2024, 6, 1, 10, 0);
        let mut t = task(Schedule::Legacy {
            frequency: LegacyFrequency::Once,
            interval: 0,
        });
        assert_eq!(compute_next_run(&t, &now), Some(now));

        t.next_run_at = Some(utc(2024, 6, 2, 0, 0));
        assert_eq!(compute_next_run(&t, &now), Some(utc(2024, 6, 2, 0, 0)));

        t.last_run_at = Some(now);
        assert!(compute_next_run(&t, &now).is_none());
    }

    #[test]
    fn test_legacy_daily() {
        let mut t = task(Schedule::Legacy {
            frequency: LegacyFrequency::Daily,
            interval: 1430,
        });
        let morning = utc(2024, 6, 1, 10, 0);
        assert_eq!(compute_next_run(&t, &morning), Some(utc(2024, 6, 1, 14, 30)));

        let evening = utc(2024, 6, 1, 18, 0);
        assert_eq!(compute_next_run(&t, &evening), Some(utc(2024, 6, 2, 14, 30)));

        t.last_run_at = Some(utc(2024, 5, 31, 14, 30));
        assert_eq!(compute_next_run(&t, &morning), Some(utc(2024, 6, 2, 14, 30)));
    }

    #[test]
    fn test_legacy_weekly() {
        // 2024-06-01 is a Saturday; 1 = Monday
        let t = task(Schedule::Legacy {
            frequency: LegacyFrequency::Weekly,
            interval: 1,
        });
        let now = utc(2024, 6, 1, 10, 0);
        assert_eq!(compute_next_run(&t, &now), Some(utc(2024, 6, 3, 0, 0)));

        let saturday = task(Schedule::Legacy {
            frequency: LegacyFrequency::Weekly,
            interval: 6,
        });
        assert_eq!(compute_next_run(&saturday, &now), Some(utc(2024, 6, 8, 0, 0)));
    }

    #[test]
    fn test_legacy_monthly_clamps_day() {
        let t = task(Schedule::Legacy {
            frequency: LegacyFrequency::Monthly,
            interval: 31,
        });
        let now = utc(2024, 6, 1, 10, 0);
        assert_eq!(compute_next_run(&t, &now), Some(utc(2024, 6, 30, 0, 0)));

        let late = utc(2024, 6, 30, 10, 0);
        assert_eq!(compute_next_run(&t, &late), Some(utc(2024, 7, 31, 0, 0)));
    }

    #[test]
    fn test_legacy_custom_seconds() {
        let mut t = task(Schedule::Legacy {
            frequency: LegacyFrequency::Custom,
            interval: 90,
        });
        let now = utc(2024, 6, 1, 10, 0);
        assert_eq!(
            compute_next_run(&t, &now),
            Some(now + Duration::seconds(90))
        );
        t.last_run_at = Some(utc(2024, 6, 1, 9, 0));
        assert_eq!(
            compute_next_run(&t, &now),
            Some(utc(2024, 6, 1, 9, 1) + Duration::seconds(30))
        );
    }

    #[test]
    fn test_history_is_not_modified() {
        let mut t = task(Schedule::interval(1));
        t.last_run_at = Some(utc(2024, 6, 1, 9, 0));
        t.exit_code = 3;
        let before = t.clone();
        let _ = compute_next_run(&t, &utc(2024, 6, 1, 10, 0));
        assert_eq!(t, before);
    }
}
