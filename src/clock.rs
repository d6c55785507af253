//! Timezone-aware clock helpers
//!
//! Day-boundary and wall-clock arithmetic in the provider's reference
//! timezone, used by the refresh scheduler and the comparator engine, plus
//! the randomized delays that keep many instances from hitting the API in
//! lockstep.

use crate::error::{HeliosError, Result};
use chrono::{DateTime, Days, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use rand::Rng;

/// Current instant in the given reference timezone
pub fn reference_now(tz: Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(&tz)
}

/// Midnight at the start of `dt`'s calendar day
pub fn start_of_day(dt: &DateTime<Tz>) -> DateTime<Tz> {
    let naive = dt.date_naive().and_hms_opt(0, 0, 0);
    resolve_local(dt, naive)
}

/// Midnight at the start of the calendar day after `dt`'s
pub fn start_of_tomorrow(dt: &DateTime<Tz>) -> DateTime<Tz> {
    let naive = dt
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|d| d.and_hms_opt(0, 0, 0));
    resolve_local(dt, naive)
}

/// The provider's daily publish cutoff on `now`'s calendar day
pub fn publish_cutoff(now: &DateTime<Tz>, cutoff_hour: u32) -> DateTime<Tz> {
    let naive = now.date_naive().and_hms_opt(cutoff_hour, 0, 0);
    resolve_local(now, naive)
}

/// Shift a local instant by whole calendar days, keeping the wall-clock time
pub fn shift_days(dt: &DateTime<Tz>, days: i64) -> DateTime<Tz> {
    let shifted = if days >= 0 {
        dt.date_naive().checked_add_days(Days::new(days as u64))
    } else {
        dt.date_naive()
            .checked_sub_days(Days::new(days.unsigned_abs()))
    };
    let naive = shifted.map(|d| d.and_time(dt.time()));
    resolve_local(dt, naive)
}

/// Parse a wall-clock "HH:MM" string into an instant on `now`'s calendar day
pub fn parse_clock_time(value: &str, now: &DateTime<Tz>) -> Result<DateTime<Tz>> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| HeliosError::validation("time", &format!("Invalid HH:MM time: {}", value)))?;
    let naive = now.date_naive().and_time(time);
    Ok(resolve_local(now, Some(naive)))
}

/// Epoch seconds truncated to the start of the instant's hour
pub fn hour_floor<T: TimeZone>(dt: &DateTime<T>) -> i64 {
    let ts = dt.timestamp();
    ts - ts.rem_euclid(3600)
}

/// Uniformly distributed delay in `[min_secs, max_secs)` seconds
pub fn random_delay_secs(min_secs: u64, max_secs: u64) -> u64 {
    if max_secs <= min_secs {
        return min_secs;
    }
    rand::thread_rng().gen_range(min_secs..max_secs)
}

/// Uniformly distributed duration in `[min_secs, max_secs)` seconds
pub fn random_delay(min_secs: u64, max_secs: u64) -> std::time::Duration {
    std::time::Duration::from_secs(random_delay_secs(min_secs, max_secs))
}

// Resolve a naive local datetime in dt's timezone. DST gaps and folds pick
// the earliest valid mapping; a `None` naive (calendar overflow) falls back
// to plain 24-hour arithmetic so callers never observe a panic.
fn resolve_local(reference: &DateTime<Tz>, naive: Option<chrono::NaiveDateTime>) -> DateTime<Tz> {
    let tz = reference.timezone();
    if let Some(naive) = naive {
        match tz.from_local_datetime(&naive).earliest() {
            Some(resolved) => return resolved,
            None => {
                // Nonexistent local time (spring-forward gap); nudge an hour
                if let Some(resolved) = tz
                    .from_local_datetime(&(naive + Duration::hours(1)))
                    .earliest()
                {
                    return resolved;
                }
            }
        }
    }
    *reference
}
