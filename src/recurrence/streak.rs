use std::collections::HashMap;

use chrono::NaiveDate;

use super::{calendar::matches_frequency, RecurrenceRule};
use crate::db::models::CompletionStatus;

pub const DEFAULT_LOOKBACK_DAYS: u32 = 365;

/// Streak value to store when a completion is recorded on `as_of`.
///
/// Counts the new completion as 1, then walks backwards day by day over at
/// most `lookback_days` earlier days. Days the rule does not schedule are
/// ignored. A scheduled day with a completion extends the streak, as does a
/// skip when the routine is skippable. The walk stops at the first scheduled
/// day with no record, or with a skip on a routine that is not skippable.
pub fn streak_on_completion(
    rule: &RecurrenceRule,
    is_skippable: bool,
    as_of: NaiveDate,
    history: &HashMap<NaiveDate, CompletionStatus>,
    lookback_days: u32,
) -> i64 {
    let mut streak = 1;
    let mut day = as_of;

    for _ in 0..lookback_days {
        day = match day.pred_opt() {
            Some(prev) => prev,
            None => break,
        };

        if !matches_frequency(rule, day) {
            continue;
        }

        match history.get(&day) {
            Some(CompletionStatus::Completed) => streak += 1,
            // Skippable routines count a skipped day as kept: complete,
            // skip, complete is a streak of three.
            Some(CompletionStatus::Skipped) if is_skippable => streak += 1,
            Some(CompletionStatus::Skipped) | None => break,
        }
    }

    streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn history(entries: &[(NaiveDate, CompletionStatus)]) -> HashMap<NaiveDate, CompletionStatus> {
        entries.iter().copied().collect()
    }

    #[test]
    fn first_completion_starts_at_one() {
        let streak = streak_on_completion(
            &RecurrenceRule::daily(),
            false,
            d(2024, 5, 10),
            &HashMap::new(),
            DEFAULT_LOOKBACK_DAYS,
        );
        assert_eq!(streak, 1);
    }

    #[test]
    fn consecutive_daily_completions_accumulate() {
        let h = history(&[
            (d(2024, 5, 9), CompletionStatus::Completed),
            (d(2024, 5, 8), CompletionStatus::Completed),
            (d(2024, 5, 6), CompletionStatus::Completed),
        ]);
        let streak = streak_on_completion(&RecurrenceRule::daily(), false, d(2024, 5, 10), &h, 365);
        // The gap on the 7th ends the walk.
        assert_eq!(streak, 3);
    }

    #[test]
    fn unscheduled_days_do_not_break_the_streak() {
        // Monday and Thursday routine; 2024-01-04 is a Thursday.
        let rule = RecurrenceRule::weekly([Weekday::Mon, Weekday::Thu]);
        let h = history(&[
            (d(2024, 1, 1), CompletionStatus::Completed),
            (d(2023, 12, 28), CompletionStatus::Completed),
        ]);
        assert_eq!(streak_on_completion(&rule, false, d(2024, 1, 4), &h, 365), 3);
    }

    #[test]
    fn skippable_skip_bridges_the_streak() {
        let h = history(&[
            (d(2024, 5, 9), CompletionStatus::Skipped),
            (d(2024, 5, 8), CompletionStatus::Completed),
        ]);
        assert_eq!(streak_on_completion(&RecurrenceRule::daily(), true, d(2024, 5, 10), &h, 365), 3);
    }

    #[test]
    fn skips_alone_count_on_a_skippable_routine() {
        let h = history(&[
            (d(2024, 3, 1), CompletionStatus::Skipped),
            (d(2024, 3, 2), CompletionStatus::Skipped),
            (d(2024, 3, 3), CompletionStatus::Skipped),
        ]);
        let daily = RecurrenceRule::daily();
        assert_eq!(streak_on_completion(&daily, true, d(2024, 3, 4), &h, 365), 4);
        assert_eq!(streak_on_completion(&daily, false, d(2024, 3, 4), &h, 365), 1);
    }

    #[test]
    fn skip_on_non_skippable_routine_ends_the_walk() {
        let h = history(&[
            (d(2024, 5, 9), CompletionStatus::Skipped),
            (d(2024, 5, 8), CompletionStatus::Completed),
        ]);
        assert_eq!(streak_on_completion(&RecurrenceRule::daily(), false, d(2024, 5, 10), &h, 365), 1);
    }

    #[test]
    fn walk_is_bounded_by_lookback() {
        let h: HashMap<_, _> = (1..=30)
            .map(|offset| (d(2024, 5, 31) - chrono::Duration::days(offset), CompletionStatus::Completed))
            .collect();
        assert_eq!(streak_on_completion(&RecurrenceRule::daily(), false, d(2024, 5, 31), &h, 10), 11);
    }
}
