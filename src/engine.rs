//! Fire-decision engine.
//!
//! [`evaluate`] is the single source of truth for "should this reminder
//! nudge now". It is pure: the same reminder, instant and last-fired value
//! always give the same answer. [`upcoming_fires`] runs the same rules
//! forward in time to produce the instants handed to the background timer
//! host.

use crate::reminder::{Reminder, ScheduleError};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Timelike, Utc};

/// Upper bound on projected instants per reminder in one handoff.
pub const MAX_PROJECTED_PER_REMINDER: usize = 64;

/// Why a reminder did or did not fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireDecision {
    Fire,
    Disabled,
    /// Today is not one of the reminder's active days.
    InactiveDay,
    /// The time of day is outside the active window.
    OutsideWindow,
    /// In window, but the interval since the last firing has not elapsed.
    NotDue { remaining: Duration },
    /// The schedule is malformed and is never evaluated.
    Misconfigured(ScheduleError),
}

impl FireDecision {
    pub fn fires(&self) -> bool {
        matches!(self, Self::Fire)
    }
}

/// Decide whether `reminder` should fire at `now`.
///
/// Weekday and minute of day are read in `now`'s own offset. A missing
/// `last_fired` means the reminder has never fired and is eligible as soon
/// as its window opens.
pub fn evaluate<Tz: TimeZone>(
    reminder: &Reminder,
    now: &DateTime<Tz>,
    last_fired: Option<DateTime<Utc>>,
) -> FireDecision {
    if !reminder.enabled {
        return FireDecision::Disabled;
    }
    if let Err(e) = reminder.validate() {
        return FireDecision::Misconfigured(e);
    }
    if !reminder
        .active_days
        .contains(now.weekday().num_days_from_sunday())
    {
        return FireDecision::InactiveDay;
    }
    if !reminder.active_window.contains(minute_of_day(now)) {
        return FireDecision::OutsideWindow;
    }
    let interval = match reminder.interval() {
        Ok(interval) => interval,
        Err(e) => return FireDecision::Misconfigured(e),
    };
    let Some(last) = last_fired else {
        return FireDecision::Fire;
    };
    let elapsed = now.with_timezone(&Utc) - last;
    if elapsed >= interval {
        FireDecision::Fire
    } else {
        FireDecision::NotDue {
            remaining: interval - elapsed,
        }
    }
}

/// `true` iff [`evaluate`] returns [`FireDecision::Fire`].
pub fn should_fire<Tz: TimeZone>(
    reminder: &Reminder,
    now: &DateTime<Tz>,
    last_fired: Option<DateTime<Utc>>,
) -> bool {
    evaluate(reminder, now, last_fired).fires()
}

/// Project the instants in `(now, now + horizon]` at which `reminder` will
/// next become eligible, assuming each projected firing happens on time.
///
/// Candidates that land outside the active days or window move forward to
/// the next window opening. Disabled and malformed reminders project nothing.
///
/// Wall times are computed in `now`'s fixed offset. A daylight-saving change
/// inside the horizon shifts later projections by the size of the change;
/// the next handoff after the change projects them again in the new offset.
pub fn upcoming_fires(
    reminder: &Reminder,
    now: DateTime<FixedOffset>,
    last_fired: Option<DateTime<Utc>>,
    horizon: Duration,
) -> Vec<DateTime<FixedOffset>> {
    if !reminder.enabled || reminder.validate().is_err() {
        return Vec::new();
    }
    let Ok(interval) = reminder.interval() else {
        return Vec::new();
    };

    let offset = *now.offset();
    let end = now + horizon;
    let mut candidate = match last_fired {
        Some(last) => last.with_timezone(&offset) + interval,
        None => now,
    };
    if candidate <= now {
        candidate = next_minute(now);
    }

    let mut fires = Vec::new();
    while fires.len() < MAX_PROJECTED_PER_REMINDER {
        let Some(aligned) = align_to_window(reminder, candidate) else {
            break;
        };
        if aligned > end {
            break;
        }
        fires.push(aligned);
        candidate = aligned + interval;
    }
    fires
}

/// First instant at or after `candidate` that is inside an active day and
/// window. Looks at most one week ahead.
fn align_to_window(
    reminder: &Reminder,
    candidate: DateTime<FixedOffset>,
) -> Option<DateTime<FixedOffset>> {
    let window = reminder.active_window;
    let mut cursor = candidate;
    for _ in 0..=7 {
        let active_day = reminder
            .active_days
            .contains(cursor.weekday().num_days_from_sunday());
        let minute = minute_of_day(&cursor);
        if active_day {
            if window.contains(minute) {
                return Some(cursor);
            }
            if minute < window.start {
                return at_minute_of_day(cursor, window.start);
            }
        }
        let next_day = cursor.date_naive().succ_opt()?;
        let midnight = next_day.and_time(NaiveTime::MIN);
        cursor = cursor.offset().from_local_datetime(&midnight).single()?;
        cursor = at_minute_of_day(cursor, window.start)?;
    }
    None
}

fn at_minute_of_day(day: DateTime<FixedOffset>, minute: u16) -> Option<DateTime<FixedOffset>> {
    let time = NaiveTime::from_hms_opt(u32::from(minute / 60), u32::from(minute % 60), 0)?;
    day.offset()
        .from_local_datetime(&day.date_naive().and_time(time))
        .single()
}

fn next_minute(at: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let floored = at
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at);
    floored + Duration::minutes(1)
}

fn minute_of_day<Tz: TimeZone>(at: &DateTime<Tz>) -> u16 {
    // hour <= 23 and minute <= 59, so this always fits.
    (at.hour() * 60 + at.minute()) as u16
}
