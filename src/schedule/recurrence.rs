//! Next-run computation
//!
//! All times are UTC. The result is always strictly after `now`, and missed
//! occurrences are skipped rather than back-filled.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

use crate::models::{Frequency, Recurrence};

/// The first occurrence of `rule` strictly after `now`
///
/// `last_run` anchors the interval: Daily counts days from it, Weekly counts
/// weeks from its ISO week, Monthly counts months from its month and Custom
/// counts units from the instant itself. Without a last run the first
/// matching slot after `now` is used. An invalid rule, or an occurrence past
/// the representable calendar, yields `None`.
pub fn next_run(
    rule: &Recurrence,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    custom_unit: Duration,
) -> Option<DateTime<Utc>> {
    rule.validate().ok()?;
    let interval = i64::from(rule.interval);
    match rule.frequency {
        Frequency::Daily => next_daily(rule.time_of_day, interval, last_run, now),
        Frequency::Weekly => next_weekly(rule, interval, last_run, now),
        Frequency::Monthly => next_monthly(rule, interval, last_run, now),
        Frequency::Custom => {
            let period = custom_unit.checked_mul(i32::try_from(interval).ok()?)?;
            next_custom(period, last_run, now)
        }
    }
}

fn at(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    date.and_time(time).and_utc()
}

fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::try_days(days)?)
}

fn next_daily(
    time: NaiveTime,
    interval: i64,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let (mut date, step) = match last_run {
        Some(last) => (add_days(last.date_naive(), interval)?, interval),
        None => (now.date_naive(), 1),
    };
    if at(date, time) <= now {
        let behind = (now.date_naive() - date).num_days().max(0);
        date = add_days(date, behind / step * step)?;
        while at(date, time) <= now {
            date = add_days(date, step)?;
        }
    }
    Some(at(date, time))
}

fn week_start(date: NaiveDate) -> Option<NaiveDate> {
    add_days(date, -i64::from(date.weekday().num_days_from_monday()))
}

fn next_weekly(
    rule: &Recurrence,
    interval: i64,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let anchor_week = match last_run {
        Some(last) => Some(week_start(last.date_naive())?),
        None => None,
    };
    let today = now.date_naive();

    // one full cycle of eligible weeks plus the rest of this week
    for offset in 0..=(7 * (interval + 1)) {
        let date = add_days(today, offset)?;
        if !rule.days_of_week.contains(&date.weekday()) {
            continue;
        }
        let candidate = at(date, rule.time_of_day);
        if candidate <= now {
            continue;
        }
        let in_cycle = match anchor_week {
            Some(anchor) => (week_start(date)? - anchor).num_weeks().rem_euclid(interval) == 0,
            None => true,
        };
        if in_cycle {
            return Some(candidate);
        }
    }
    None
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(28, |last| last.day())
}

/// `day` of the month `index` months after year 0, clamped to its length
fn monthly_slot(index: i64, day: u32, time: NaiveTime) -> Option<DateTime<Utc>> {
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = u32::try_from(index.rem_euclid(12)).ok()? + 1;
    let day = day.min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).map(|date| at(date, time))
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn next_monthly(
    rule: &Recurrence,
    interval: i64,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let day = rule.day_of_month?;
    let (mut index, step) = match last_run {
        Some(last) => (month_index(last.date_naive()) + interval, interval),
        None => (month_index(now.date_naive()), 1),
    };
    let now_index = month_index(now.date_naive());
    if index < now_index {
        index += (now_index - index) / step * step;
    }
    loop {
        let candidate = monthly_slot(index, day, rule.time_of_day)?;
        if candidate > now {
            return Some(candidate);
        }
        index += step;
    }
}

fn next_custom(
    period: Duration,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if period <= Duration::zero() {
        return None;
    }
    let Some(last) = last_run else {
        return now.checked_add_signed(period);
    };
    let mut next = last.checked_add_signed(period)?;
    if next <= now {
        let period_secs = period.num_seconds().max(1);
        let behind = (now - next).num_seconds() / period_secs;
        next = next.checked_add_signed(Duration::try_seconds(behind.checked_mul(period_secs)?)?)?;
        while next <= now {
            next = next.checked_add_signed(period)?;
        }
    }
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn hour() -> Duration {
        Duration::hours(1)
    }

    #[test]
    fn test_daily_at_two_am_from_mid_morning() {
        let rule = Recurrence::daily(time(2, 0));
        let next = next_run(&rule, None, utc(2025, 1, 1, 10, 0), hour());
        assert_eq!(next, Some(utc(2025, 1, 2, 2, 0)));
    }

    #[test]
    fn test_daily_later_today() {
        let rule = Recurrence::daily(time(18, 30));
        let next = next_run(&rule, None, utc(2025, 1, 1, 10, 0), hour());
        assert_eq!(next, Some(utc(2025, 1, 1, 18, 30)));
    }

    #[test]
    fn test_daily_interval_counts_from_last_run() {
        let rule = Recurrence::daily(time(2, 0)).with_interval(3);
        let last = utc(2025, 1, 1, 2, 0);
        assert_eq!(
            next_run(&rule, Some(last), utc(2025, 1, 1, 2, 5), hour()),
            Some(utc(2025, 1, 4, 2, 0))
        );
        // a long outage skips ahead on the same cadence
        assert_eq!(
            next_run(&rule, Some(last), utc(2025, 1, 20, 12, 0), hour()),
            Some(utc(2025, 1, 22, 2, 0))
        );
    }

    #[test]
    fn test_weekly_tuesday_picks_thursday() {
        let rule = Recurrence::weekly(time(9, 0), vec![Weekday::Mon, Weekday::Thu]);
        // 2025-01-07 is a Tuesday
        let next = next_run(&rule, None, utc(2025, 1, 7, 10, 0), hour());
        assert_eq!(next, Some(utc(2025, 1, 9, 9, 0)));
    }

    #[test]
    fn test_weekly_wraps_to_next_week() {
        let rule = Recurrence::weekly(time(9, 0), vec![Weekday::Mon]);
        let next = next_run(&rule, None, utc(2025, 1, 6, 9, 0), hour());
        assert_eq!(next, Some(utc(2025, 1, 13, 9, 0)));
    }

    #[test]
    fn test_weekly_every_other_week() {
        let rule = Recurrence::weekly(time(9, 0), vec![Weekday::Mon, Weekday::Thu]).with_interval(2);
        let last = utc(2025, 1, 6, 9, 0);
        // Thursday of the same week is still in the active week
        assert_eq!(
            next_run(&rule, Some(last), utc(2025, 1, 6, 9, 1), hour()),
            Some(utc(2025, 1, 9, 9, 0))
        );
        // after Thursday the next slot is Monday two weeks on
        assert_eq!(
            next_run(&rule, Some(utc(2025, 1, 9, 9, 0)), utc(2025, 1, 9, 9, 1), hour()),
            Some(utc(2025, 1, 20, 9, 0))
        );
    }

    #[test]
    fn test_monthly_clamps_to_month_end() {
        let rule = Recurrence::monthly(time(3, 0), 31);
        assert_eq!(
            next_run(&rule, None, utc(2025, 2, 10, 0, 0), hour()),
            Some(utc(2025, 2, 28, 3, 0))
        );
        assert_eq!(
            next_run(&rule, Some(utc(2024, 1, 31, 3, 0)), utc(2024, 1, 31, 3, 1), hour()),
            Some(utc(2024, 2, 29, 3, 0))
        );
    }

    #[test]
    fn test_monthly_interval_and_year_rollover() {
        let rule = Recurrence::monthly(time(0, 30), 15).with_interval(3);
        assert_eq!(
            next_run(&rule, Some(utc(2025, 11, 15, 0, 30)), utc(2025, 11, 16, 0, 0), hour()),
            Some(utc(2026, 2, 15, 0, 30))
        );
    }

    #[test]
    fn test_custom_repeats_every_interval_units() {
        let mut rule = Recurrence::daily(time(0, 0)).with_interval(6);
        rule.frequency = Frequency::Custom;
        let now = utc(2025, 1, 1, 10, 0);
        assert_eq!(next_run(&rule, None, now, hour()), Some(utc(2025, 1, 1, 16, 0)));
        assert_eq!(
            next_run(&rule, Some(utc(2024, 12, 31, 23, 0)), now, hour()),
            Some(utc(2025, 1, 1, 11, 0))
        );
    }

    #[test]
    fn test_result_is_always_after_now() {
        let rules = [
            Recurrence::daily(time(0, 0)).with_interval(5),
            Recurrence::weekly(time(23, 59), vec![Weekday::Sun]).with_interval(3),
            Recurrence::monthly(time(12, 0), 29).with_interval(2),
        ];
        let last = utc(2023, 6, 1, 0, 0);
        let mut now = utc(2024, 2, 1, 0, 0);
        for _ in 0..60 {
            for rule in &rules {
                let next = next_run(rule, Some(last), now, hour()).unwrap();
                assert!(next > now, "{:?} at {} gave {}", rule.frequency, now, next);
            }
            now += Duration::hours(37);
        }
    }

    #[test]
    fn test_out_of_range_interval_has_no_next_run() {
        let last = utc(2025, 1, 1, 2, 0);
        let now = utc(2025, 1, 1, 2, 5);
        let daily = Recurrence::daily(time(2, 0)).with_interval(100_000_000);
        assert_eq!(next_run(&daily, Some(last), now, hour()), None);
        assert_eq!(next_run(&daily, None, now, hour()), None);

        let mut custom = Recurrence::daily(time(0, 0)).with_interval(100_000_000);
        custom.frequency = Frequency::Custom;
        assert_eq!(next_run(&custom, Some(last), now, Duration::days(3650)), None);
    }

    #[test]
    fn test_end_of_calendar_yields_none() {
        let end = NaiveDate::MAX.and_time(time(0, 0)).and_utc();
        let daily = Recurrence::daily(time(2, 0)).with_interval(3);
        assert_eq!(next_run(&daily, Some(end), end, hour()), None);

        let monthly = Recurrence::monthly(time(0, 0), 1).with_interval(2);
        assert_eq!(next_run(&monthly, Some(end), end, hour()), None);

        let mut custom = Recurrence::daily(time(0, 0)).with_interval(48);
        custom.frequency = Frequency::Custom;
        assert_eq!(next_run(&custom, Some(end), end, hour()), None);
    }
}
