//! Resolution of local calendar time to instants.
//!
//! Gig schedules are local calendar values (date, start time, duration) in
//! the engine's fixed reference timezone. Everything timer-driven — the
//! performed trigger, the 48-hour clearing deadline — needs instants. This
//! module is the one place where that resolution happens.
//!
//! Daylight-saving edges are handled explicitly:
//!
//! - a local time that occurs twice (clocks falling back) resolves to the
//!   earlier instant;
//! - a local time that never occurs (clocks springing forward) is shifted
//!   past the gap.

use crate::types::GigSchedule;
use chrono::offset::LocalResult;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Resolve a local wall-clock value in `tz` to an instant.
fn resolve_local(naive: NaiveDateTime, tz: Tz) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            // Swallowed by a DST gap; shift forward past the transition.
            let shifted = naive + chrono::Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .unwrap_or_else(|| tz.from_utc_datetime(&naive))
        },
    }
}

/// The instant a performance starts.
#[must_use]
pub fn performance_start(schedule: &GigSchedule, tz: Tz) -> DateTime<Utc> {
    resolve_local(schedule.local_start(), tz).with_timezone(&Utc)
}

/// The instant a performance ends (start plus duration).
#[must_use]
pub fn performance_end(schedule: &GigSchedule, tz: Tz) -> DateTime<Utc> {
    resolve_local(schedule.local_end(), tz).with_timezone(&Utc)
}

/// Whether the performance window has fully elapsed at `now`.
#[must_use]
pub fn has_elapsed(schedule: &GigSchedule, tz: Tz, now: DateTime<Utc>) -> bool {
    now >= performance_end(schedule, tz)
}
