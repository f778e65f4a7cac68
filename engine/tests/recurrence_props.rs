//! Property tests for the recurrence generator.

#![allow(clippy::unwrap_used)]

use callboard_engine::recurrence::{EndCondition, RepeatRule, generate};
use chrono::{Datelike, NaiveDate};
use proptest::prelude::*;

prop_compose! {
    /// Any date whose day-of-month always exists, so period arithmetic is
    /// exercised without the clamp.
    fn plain_date()(year in 2000i32..2100, month in 1u32..=12, day in 1u32..=28) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }
}

fn period_days(rule: RepeatRule) -> i64 {
    match rule {
        RepeatRule::Daily => 1,
        RepeatRule::Weekly => 7,
        RepeatRule::None | RepeatRule::Monthly => unreachable!("fixed-period rules only"),
    }
}

proptest! {
    #[test]
    fn count_bound_yields_exactly_k_evenly_spaced_dates(
        anchor in plain_date(),
        rule in prop_oneof![Just(RepeatRule::Daily), Just(RepeatRule::Weekly)],
        k in 1u32..=40,
    ) {
        let dates = generate(anchor, rule, &EndCondition::after(k)).unwrap();

        prop_assert_eq!(dates.len(), k as usize);
        prop_assert_eq!(dates[0], anchor);
        for pair in dates.windows(2) {
            prop_assert_eq!((pair[1] - pair[0]).num_days(), period_days(rule));
        }
    }

    #[test]
    fn monthly_count_bound_is_exact_and_ascending(
        anchor in plain_date(),
        k in 1u32..=24,
    ) {
        let dates = generate(anchor, RepeatRule::Monthly, &EndCondition::after(k)).unwrap();

        prop_assert_eq!(dates.len(), k as usize);
        for pair in dates.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
        // The clamp never moves a candidate past the anchor's day.
        for date in &dates {
            prop_assert!(date.day() <= anchor.day());
        }
    }

    #[test]
    fn end_date_before_second_candidate_yields_only_the_anchor(
        anchor in plain_date(),
        rule in prop_oneof![Just(RepeatRule::Daily), Just(RepeatRule::Weekly)],
        slack in 0i64..=1,
    ) {
        // An end date on or just after the anchor but before candidate 1.
        let end_date = anchor + chrono::Duration::days(slack.min(period_days(rule) - 1));
        let dates = generate(
            anchor,
            rule,
            &EndCondition::after_or_until(10_000, end_date),
        )
        .unwrap();

        prop_assert_eq!(dates, vec![anchor]);
    }

    #[test]
    fn none_rule_ignores_bounds(anchor in plain_date(), k in 0u32..=5) {
        // Even a zero count is fine: a non-repeating draft has no bounds
        // to validate.
        let dates = generate(anchor, RepeatRule::None, &EndCondition::after(k)).unwrap();
        prop_assert_eq!(dates, vec![anchor]);
    }

    #[test]
    fn all_dates_fall_within_the_end_bound(
        anchor in plain_date(),
        rule in prop_oneof![Just(RepeatRule::Daily), Just(RepeatRule::Weekly), Just(RepeatRule::Monthly)],
        horizon in 1i64..=400,
    ) {
        let end_date = anchor + chrono::Duration::days(horizon);
        let dates = generate(anchor, rule, &EndCondition::until(end_date)).unwrap();

        prop_assert!(!dates.is_empty());
        for date in &dates {
            prop_assert!(*date >= anchor);
            prop_assert!(*date <= end_date);
        }
    }
}
