//! Calendar arithmetic: month lengths, clamped month stepping and frequency
//! matching.
//!
//! A target day that does not exist in a month (the 31st in April, the 29th
//! of February outside leap years) clamps to that month's last day. Stepping
//! always re-targets the rule's day, so a monthly series anchored on the 31st
//! runs Jan 31, Feb 28/29, Mar 31, Apr 30.

use chrono::{Datelike, Days, NaiveDate};

use super::{RecurrenceKind, RecurrenceRule, QUARTER_START_MONTHS};

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// The date for `day` in the given month, clamped to the month's last day.
pub fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let last = days_in_month(year, month);
    if last == 0 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, last))
}

/// Step `months` calendar months forward from `date` and land on `target_day`
/// (clamped).
pub fn add_months(date: NaiveDate, months: u32, target_day: u32) -> Option<NaiveDate> {
    let index = date.year() as i64 * 12 + date.month0() as i64 + months as i64;
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = index.rem_euclid(12) as u32 + 1;
    clamped_date(year, month, target_day)
}

fn target_day(rule: &RecurrenceRule, date: NaiveDate) -> u32 {
    rule.day_of_month.unwrap_or_else(|| date.day())
}

/// The next candidate date after `date` for `rule`.
///
/// Daily and weekly rules step one day at a time (weekly filtering is done
/// by [`matches_frequency`]); month-based rules jump to the next qualifying
/// month. Returns `None` for non-recurring rules or past the end of the
/// representable calendar.
pub fn advance(date: NaiveDate, rule: &RecurrenceRule) -> Option<NaiveDate> {
    match rule.kind {
        RecurrenceKind::None => None,
        RecurrenceKind::Daily | RecurrenceKind::Weekly => date.checked_add_days(Days::new(1)),
        RecurrenceKind::Monthly => add_months(date, 1, target_day(rule, date)),
        RecurrenceKind::Quarterly => add_months(date, 3, target_day(rule, date)),
        RecurrenceKind::Yearly => add_months(date, 12, target_day(rule, date)),
    }
}

/// Whether `date` is an occurrence day for `rule`, ignoring start and end
/// bounds.
pub fn matches_frequency(rule: &RecurrenceRule, date: NaiveDate) -> bool {
    let on_target_day = || match rule.day_of_month {
        Some(day) => clamped_date(date.year(), date.month(), day) == Some(date),
        None => false,
    };

    match rule.kind {
        RecurrenceKind::None => false,
        RecurrenceKind::Daily => true,
        RecurrenceKind::Weekly => rule.weekdays.contains(&date.weekday()),
        RecurrenceKind::Monthly => on_target_day(),
        RecurrenceKind::Quarterly => {
            QUARTER_START_MONTHS.contains(&date.month()) && on_target_day()
        }
        RecurrenceKind::Yearly => rule.month == Some(date.month()) && on_target_day(),
    }
}

/// First date on or after `date` that matches `rule`.
///
/// For month-based rules this scans at most thirteen months; for daily and
/// weekly rules at most seven days.
pub fn first_on_or_after(rule: &RecurrenceRule, date: NaiveDate) -> Option<NaiveDate> {
    match rule.kind {
        RecurrenceKind::None => None,
        RecurrenceKind::Daily => Some(date),
        RecurrenceKind::Weekly => {
            let mut day = date;
            for _ in 0..7 {
                if matches_frequency(rule, day) {
                    return Some(day);
                }
                day = day.checked_add_days(Days::new(1))?;
            }
            None
        }
        RecurrenceKind::Monthly | RecurrenceKind::Quarterly | RecurrenceKind::Yearly => {
            let day = rule.day_of_month?;
            let first_of_month = date.with_day(1)?;
            for offset in 0..13 {
                let candidate = add_months(first_of_month, offset, day)?;
                if candidate >= date && matches_frequency(rule, candidate) {
                    return Some(candidate);
                }
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn month_lengths() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(1900, 2), 28);
        assert_eq!(days_in_month(2000, 2), 29);
        assert_eq!(days_in_month(2024, 4), 30);
        assert_eq!(days_in_month(2024, 12), 31);
    }

    #[test]
    fn monthly_advance_clamps_and_returns_to_target_day() {
        let rule = RecurrenceRule::monthly(31);
        let feb = advance(d(2023, 1, 31), &rule).unwrap();
        assert_eq!(feb, d(2023, 2, 28));
        let mar = advance(feb, &rule).unwrap();
        assert_eq!(mar, d(2023, 3, 31));
        let apr = advance(mar, &rule).unwrap();
        assert_eq!(apr, d(2023, 4, 30));
    }

    #[test]
    fn monthly_advance_uses_leap_day() {
        let rule = RecurrenceRule::monthly(31);
        assert_eq!(advance(d(2024, 1, 31), &rule).unwrap(), d(2024, 2, 29));
    }

    #[test]
    fn yearly_leap_day_clamps_in_common_years() {
        let rule = RecurrenceRule::yearly(2, 29);
        assert_eq!(advance(d(2024, 2, 29), &rule).unwrap(), d(2025, 2, 28));
        assert!(matches_frequency(&rule, d(2025, 2, 28)));
        assert!(!matches_frequency(&rule, d(2024, 2, 28)));
    }

    #[test]
    fn advance_crosses_year_boundary() {
        let rule = RecurrenceRule::quarterly(15);
        assert_eq!(advance(d(2024, 10, 15), &rule).unwrap(), d(2025, 1, 15));
    }

    #[test]
    fn weekly_matching_uses_weekday_set() {
        let rule = RecurrenceRule::weekly([Weekday::Mon, Weekday::Thu]);
        // 2024-01-01 is a Monday.
        assert!(matches_frequency(&rule, d(2024, 1, 1)));
        assert!(!matches_frequency(&rule, d(2024, 1, 2)));
        assert!(matches_frequency(&rule, d(2024, 1, 4)));
    }

    #[test]
    fn monthly_matching_is_clamp_aware() {
        let rule = RecurrenceRule::monthly(31);
        assert!(matches_frequency(&rule, d(2024, 4, 30)));
        assert!(!matches_frequency(&rule, d(2024, 5, 30)));
        assert!(matches_frequency(&rule, d(2024, 5, 31)));
    }

    #[test]
    fn quarterly_matches_only_quarter_start_months() {
        let rule = RecurrenceRule::quarterly(1);
        assert!(matches_frequency(&rule, d(2024, 7, 1)));
        assert!(!matches_frequency(&rule, d(2024, 8, 1)));
    }

    #[test]
    fn first_on_or_after_finds_next_qualifying_date() {
        let rule = RecurrenceRule::quarterly(10);
        assert_eq!(first_on_or_after(&rule, d(2024, 1, 11)).unwrap(), d(2024, 4, 10));
        assert_eq!(first_on_or_after(&rule, d(2024, 4, 10)).unwrap(), d(2024, 4, 10));

        let rule = RecurrenceRule::yearly(3, 1);
        assert_eq!(first_on_or_after(&rule, d(2024, 3, 2)).unwrap(), d(2025, 3, 1));

        let rule = RecurrenceRule::weekly([Weekday::Fri]);
        assert_eq!(first_on_or_after(&rule, d(2024, 1, 1)).unwrap(), d(2024, 1, 5));
    }

    #[test]
    fn non_recurring_rule_never_matches() {
        let rule = RecurrenceRule::none();
        assert!(!matches_frequency(&rule, d(2024, 1, 1)));
        assert!(advance(d(2024, 1, 1), &rule).is_none());
    }
}
