//! When to check for updates.
//!
//! A [`Schedule`] combines up to three triggers: a check right after
//! [`manage`](crate::manage) starts, a fixed polling interval, and a
//! calendar-aligned recurrence ("every day at 03:30"). The background worker
//! recomputes the next wakeup from the wall clock on every iteration, so the
//! calendar triggers do not drift.

use std::time::Duration;

use chrono::{
    DateTime, Datelike, Days, FixedOffset, Local, LocalResult, NaiveDate, NaiveTime, TimeDelta,
    TimeZone, Timelike, Utc,
};

/// Calendar pattern for recurring checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Repeating {
    /// No calendar trigger.
    #[default]
    None,
    /// At the next hour boundary, then every hour.
    Hourly,
    /// Tomorrow at the offset's clock time, then every day.
    Daily,
    /// Next month on the offset's day, then every month.
    Monthly,
}

/// Clock-time offset parametrising a [`Repeating`] trigger.
///
/// Which fields matter depends on the pattern: `Hourly` reads the minute,
/// second and nanosecond of `time`; `Daily` reads the whole of `time`;
/// `Monthly` additionally reads `day`. Triggers are evaluated in `tz` when
/// set, in the local timezone otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerOffset {
    /// 1-based day of the month, for monthly triggers. A day past the end of
    /// a month rolls over into the following month, a zero behaves as 1.
    pub day: u32,
    /// Clock time within the hour/day.
    pub time: NaiveTime,
    /// Timezone the trigger is evaluated in; local when `None`.
    pub tz: Option<FixedOffset>,
}

impl TriggerOffset {
    /// An offset firing at `time` (in the local timezone).
    pub fn at(time: NaiveTime) -> Self {
        Self { time, ..Self::default() }
    }

    /// An offset firing on `day` of the month at `time`.
    pub fn on_day(day: u32, time: NaiveTime) -> Self {
        Self { day, time, ..Self::default() }
    }

    /// Evaluate the trigger in `tz` instead of the local timezone.
    pub fn with_timezone(mut self, tz: FixedOffset) -> Self {
        self.tz = Some(tz);
        self
    }
}

/// Calendar-aligned trigger: a pattern plus its clock-time offset.
#[derive(Debug, Clone, Default)]
pub struct ScheduleAt {
    pub repeating: Repeating,
    pub offset: TriggerOffset,
}

/// When the updater checks for new builds.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    /// Run a check as soon as the updater is managed.
    pub fetch_on_start: bool,
    /// Check at this fixed interval; `None` disables interval polling.
    pub interval: Option<Duration>,
    /// Check on a calendar-aligned recurrence.
    pub at: ScheduleAt,
}

impl Schedule {
    /// Whether any recurring trigger is configured (the background worker
    /// only enters its loop when this is true).
    pub(crate) fn has_recurring_trigger(&self) -> bool {
        self.interval.is_some() || self.at.repeating != Repeating::None
    }
}

/// Time remaining until the next firing of `repeating` with `offset`.
///
/// Always strictly positive: the next instant is computed from the *next*
/// hour/day/month boundary, never from the current one.
pub fn delay_until_next(repeating: Repeating, offset: &TriggerOffset) -> Duration {
    match offset.tz {
        Some(tz) => delay_in_zone(Utc::now().with_timezone(&tz), repeating, offset),
        None => delay_in_zone(Local::now(), repeating, offset),
    }
}

fn delay_in_zone<Tz: TimeZone>(
    now: DateTime<Tz>,
    repeating: Repeating,
    offset: &TriggerOffset,
) -> Duration {
    let clock = now.naive_local();
    let target = match repeating {
        Repeating::None => return Duration::ZERO,
        Repeating::Hourly => {
            let into_hour = TimeDelta::minutes(i64::from(clock.minute()))
                + TimeDelta::seconds(i64::from(clock.second()))
                + TimeDelta::nanoseconds(i64::from(clock.nanosecond()));
            clock - into_hour + TimeDelta::hours(1) + within_hour(offset.time)
        }
        Repeating::Daily => {
            let tomorrow = clock.date().checked_add_days(Days::new(1)).unwrap_or(clock.date());
            tomorrow.and_time(offset.time)
        }
        Repeating::Monthly => {
            let (year, month) = if clock.month() == 12 {
                (clock.year() + 1, 1)
            } else {
                (clock.year(), clock.month() + 1)
            };
            let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(clock.date());
            // Day overflow (e.g. 31 in a 30-day month) rolls over into the
            // following month, matching normalising date arithmetic.
            let day = first
                .checked_add_days(Days::new(u64::from(offset.day.saturating_sub(1))))
                .unwrap_or(first);
            day.and_time(offset.time)
        }
    };

    let next = resolve_in_zone(&now.timezone(), target, &now);
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

fn within_hour(time: NaiveTime) -> TimeDelta {
    TimeDelta::minutes(i64::from(time.minute()))
        + TimeDelta::seconds(i64::from(time.second()))
        + TimeDelta::nanoseconds(i64::from(time.nanosecond()))
}

/// Map a naive local instant into `tz`, stepping forward out of DST gaps and
/// taking the earlier side of DST overlaps.
fn resolve_in_zone<Tz: TimeZone>(
    tz: &Tz,
    target: chrono::NaiveDateTime,
    now: &DateTime<Tz>,
) -> DateTime<Tz> {
    for shift in 0..3 {
        match tz.from_local_datetime(&(target + TimeDelta::hours(shift))) {
            LocalResult::Single(instant) => return instant,
            LocalResult::Ambiguous(earliest, _) => return earliest,
            LocalResult::None => continue,
        }
    }
    now.clone() + TimeDelta::hours(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offset_time() -> NaiveTime {
        NaiveTime::from_hms_nano_opt(3, 42, 7, 9_990_000).unwrap()
    }

    #[test]
    fn hourly_fires_within_the_next_two_hours() {
        let delay = delay_until_next(Repeating::Hourly, &TriggerOffset::at(offset_time()));
        assert!(delay > Duration::ZERO);
        assert!(delay < Duration::from_secs(2 * 3600));
    }

    #[test]
    fn daily_fires_within_the_next_two_days() {
        let delay = delay_until_next(Repeating::Daily, &TriggerOffset::at(offset_time()));
        assert!(delay > Duration::ZERO);
        assert!(delay < Duration::from_secs(48 * 3600));
    }

    #[test]
    fn monthly_fires_within_the_next_two_months() {
        let delay =
            delay_until_next(Repeating::Monthly, &TriggerOffset::on_day(15, offset_time()));
        assert!(delay > Duration::ZERO);
        assert!(delay < Duration::from_secs(2 * 31 * 24 * 3600));
    }

    #[test]
    fn monthly_day_overflow_rolls_over() {
        // Day 31 exists in no more than seven months a year; the trigger
        // must still always land strictly in the future.
        let delay =
            delay_until_next(Repeating::Monthly, &TriggerOffset::on_day(31, offset_time()));
        assert!(delay > Duration::ZERO);
        assert!(delay < Duration::from_secs(3 * 31 * 24 * 3600));
    }

    #[test]
    fn explicit_timezone_is_honoured() {
        let utc = TriggerOffset::at(offset_time()).with_timezone(FixedOffset::east_opt(0).unwrap());
        let delay = delay_until_next(Repeating::Hourly, &utc);
        assert!(delay > Duration::ZERO);
        assert!(delay < Duration::from_secs(2 * 3600));

        let tokyo = TriggerOffset::at(offset_time())
            .with_timezone(FixedOffset::east_opt(9 * 3600).unwrap());
        let delay = delay_until_next(Repeating::Daily, &tokyo);
        assert!(delay > Duration::ZERO);
        assert!(delay < Duration::from_secs(48 * 3600));
    }

    #[test]
    fn none_has_no_delay() {
        assert_eq!(
            delay_until_next(Repeating::None, &TriggerOffset::default()),
            Duration::ZERO
        );
    }
}
