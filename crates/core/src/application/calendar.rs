//! Calendar arithmetic for billing cycles
//!
//! All instants are epoch milliseconds in UTC. Nothing here reads the wall
//! clock: callers pass "now" in.

use crate::application::constants::CYCLE_START_GRACE_HOURS;
use crate::domain::error::{DomainError, Result};
use chrono::{DateTime, Datelike, NaiveDate, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

fn to_utc(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or(DomainError::TimestampOutOfRange(millis))
}

fn first_of_month(year: i32, month: u32) -> Option<i64> {
    NaiveDate::from_ymd_opt(year, month, 1)?
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp_millis())
}

fn following_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Start of the billing cycle that `now` is heading into
///
/// Normally day 1 of the next month at 00:00 UTC. When `now` is already on
/// day 1 and earlier than `CYCLE_START_GRACE_HOURS` UTC, the current month's
/// day 1 is returned instead so zones west of the first one to cross
/// midnight still get charged this month.
pub fn next_cycle_anchor(now_millis: i64) -> Result<i64> {
    let now = to_utc(now_millis)?;
    let (year, month) = if now.day() == 1 && now.hour() < CYCLE_START_GRACE_HOURS {
        (now.year(), now.month())
    } else {
        following_month(now.year(), now.month())
    };
    first_of_month(year, month).ok_or(DomainError::TimestampOutOfRange(now_millis))
}

/// Day 1 of the month after `now`, 00:00 UTC. Always strictly after `now`.
pub fn next_month_start(now_millis: i64) -> Result<i64> {
    let now = to_utc(now_millis)?;
    let (year, month) = following_month(now.year(), now.month());
    first_of_month(year, month).ok_or(DomainError::TimestampOutOfRange(now_millis))
}

/// Milliseconds to wait before a zone with `offset_millis` reaches the
/// anchor in local time. Never negative: a zone already past its local
/// midnight fires immediately.
pub fn execution_delay(offset_millis: i64, now_millis: i64, anchor_millis: i64) -> i64 {
    anchor_millis
        .saturating_sub(now_millis)
        .saturating_sub(offset_millis)
        .max(0)
}

/// UTC offset of `tz` in effect at the given instant (DST-aware)
pub fn utc_offset_millis(tz: &Tz, at_millis: i64) -> Result<i64> {
    let at = to_utc(at_millis)?;
    let offset = tz.offset_from_utc_datetime(&at.naive_utc());
    Ok(i64::from(offset.fix().local_minus_utc()) * 1000)
}

/// Resolve an IANA timezone identifier
pub fn resolve_timezone(id: &str) -> Option<Tz> {
    id.parse::<Tz>().ok()
}
