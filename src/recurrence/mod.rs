//! Recurrence rules shared by calendar events and routines.
//!
//! A [`RecurrenceRule`] is a plain value: it carries exactly the fields its
//! [`RecurrenceKind`] needs. The calendar arithmetic lives in [`calendar`],
//! occurrence generation in [`expand`] and the routine streak walk in
//! [`streak`]. Nothing in this module touches storage or the clock.

pub mod calendar;
pub mod expand;
pub mod streak;

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// First months of the four calendar quarters.
pub const QUARTER_START_MONTHS: [u32; 4] = [1, 4, 7, 10];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceKind {
    None,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl RecurrenceKind {
    /// Lowercase name used by the events API and stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceKind::None => "none",
            RecurrenceKind::Daily => "daily",
            RecurrenceKind::Weekly => "weekly",
            RecurrenceKind::Monthly => "monthly",
            RecurrenceKind::Quarterly => "quarterly",
            RecurrenceKind::Yearly => "yearly",
        }
    }

    /// Capitalized name used by the routines API (`"Daily"`, `"Weekly"`, ...).
    pub fn label(&self) -> &'static str {
        match self {
            RecurrenceKind::None => "None",
            RecurrenceKind::Daily => "Daily",
            RecurrenceKind::Weekly => "Weekly",
            RecurrenceKind::Monthly => "Monthly",
            RecurrenceKind::Quarterly => "Quarterly",
            RecurrenceKind::Yearly => "Yearly",
        }
    }

    /// Month-based kinds step through calendar months rather than days.
    pub fn is_month_based(&self) -> bool {
        matches!(
            self,
            RecurrenceKind::Monthly | RecurrenceKind::Quarterly | RecurrenceKind::Yearly
        )
    }
}

impl fmt::Display for RecurrenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurrenceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(RecurrenceKind::None),
            "daily" => Ok(RecurrenceKind::Daily),
            "weekly" => Ok(RecurrenceKind::Weekly),
            "monthly" => Ok(RecurrenceKind::Monthly),
            "quarterly" => Ok(RecurrenceKind::Quarterly),
            "yearly" => Ok(RecurrenceKind::Yearly),
            other => Err(AppError::Validation(format!(
                "invalid recurrence type: {}",
                other
            ))),
        }
    }
}

/// Month and day pair for yearly rules (`yearlyDate` in the routines API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

/// How a single definition repeats.
///
/// `day_of_month` is the target day for Monthly, Quarterly and Yearly rules;
/// `month` is only set for Yearly. `until` is the inclusive last date on
/// which an occurrence may fall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub kind: RecurrenceKind,
    pub weekdays: Vec<Weekday>,
    pub day_of_month: Option<u32>,
    pub month: Option<u32>,
    pub until: Option<NaiveDate>,
}

impl RecurrenceRule {
    fn of_kind(kind: RecurrenceKind) -> Self {
        RecurrenceRule {
            kind,
            weekdays: Vec::new(),
            day_of_month: None,
            month: None,
            until: None,
        }
    }

    pub fn none() -> Self {
        Self::of_kind(RecurrenceKind::None)
    }

    pub fn daily() -> Self {
        Self::of_kind(RecurrenceKind::Daily)
    }

    pub fn weekly(days: impl IntoIterator<Item = Weekday>) -> Self {
        let mut rule = Self::of_kind(RecurrenceKind::Weekly);
        rule.weekdays = normalize_weekdays(days);
        rule
    }

    pub fn monthly(day_of_month: u32) -> Self {
        let mut rule = Self::of_kind(RecurrenceKind::Monthly);
        rule.day_of_month = Some(day_of_month);
        rule
    }

    pub fn quarterly(day_of_month: u32) -> Self {
        let mut rule = Self::of_kind(RecurrenceKind::Quarterly);
        rule.day_of_month = Some(day_of_month);
        rule
    }

    pub fn yearly(month: u32, day: u32) -> Self {
        let mut rule = Self::of_kind(RecurrenceKind::Yearly);
        rule.month = Some(month);
        rule.day_of_month = Some(day);
        rule
    }

    pub fn until(mut self, until: Option<NaiveDate>) -> Self {
        self.until = until;
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.kind != RecurrenceKind::None
    }

    pub fn month_day(&self) -> Option<MonthDay> {
        match (self.kind, self.month, self.day_of_month) {
            (RecurrenceKind::Yearly, Some(month), Some(day)) => Some(MonthDay { month, day }),
            _ => None,
        }
    }

    /// Fill the month-based target fields from an anchor date.
    ///
    /// Calendar events repeat on the day (and month) they start on, so their
    /// rules are always re-anchored whenever the start date changes.
    pub fn anchored_to(mut self, anchor: NaiveDate) -> Self {
        match self.kind {
            RecurrenceKind::Monthly | RecurrenceKind::Quarterly => {
                self.day_of_month = Some(anchor.day());
                self.month = None;
            }
            RecurrenceKind::Yearly => {
                self.day_of_month = Some(anchor.day());
                self.month = Some(anchor.month());
            }
            _ => {}
        }
        self
    }

    /// Drop fields the kind does not use.
    pub fn normalized(mut self) -> Self {
        match self.kind {
            RecurrenceKind::None | RecurrenceKind::Daily => {
                self.weekdays.clear();
                self.day_of_month = None;
                self.month = None;
            }
            RecurrenceKind::Weekly => {
                self.weekdays = normalize_weekdays(self.weekdays);
                self.day_of_month = None;
                self.month = None;
            }
            RecurrenceKind::Monthly | RecurrenceKind::Quarterly => {
                self.weekdays.clear();
                self.month = None;
            }
            RecurrenceKind::Yearly => {
                self.weekdays.clear();
            }
        }
        if self.kind == RecurrenceKind::None {
            self.until = None;
        }
        self
    }

    /// Check that exactly the fields required by the kind are present and in range.
    pub fn validate(&self) -> AppResult<()> {
        match self.kind {
            RecurrenceKind::None | RecurrenceKind::Daily => Ok(()),
            RecurrenceKind::Weekly => {
                if self.weekdays.is_empty() {
                    return Err(AppError::Validation(
                        "at least one weekday is required for weekly recurrence".to_string(),
                    ));
                }
                Ok(())
            }
            RecurrenceKind::Monthly | RecurrenceKind::Quarterly => {
                let field = if self.kind == RecurrenceKind::Monthly {
                    "dayOfMonth"
                } else {
                    "quarterlyDay"
                };
                match self.day_of_month {
                    None => Err(AppError::Validation(format!(
                        "{} is required for {} recurrence",
                        field,
                        self.kind.as_str()
                    ))),
                    Some(day) if !(1..=31).contains(&day) => Err(AppError::Validation(format!(
                        "{} must be between 1 and 31",
                        field
                    ))),
                    Some(_) => Ok(()),
                }
            }
            RecurrenceKind::Yearly => match self.month_day() {
                None => Err(AppError::Validation(
                    "yearlyDate is required for yearly recurrence".to_string(),
                )),
                Some(md) if !(1..=12).contains(&md.month) => Err(AppError::Validation(
                    "yearlyDate.month must be between 1 and 12".to_string(),
                )),
                Some(md) if !(1..=31).contains(&md.day) => Err(AppError::Validation(
                    "yearlyDate.day must be between 1 and 31".to_string(),
                )),
                Some(_) => Ok(()),
            },
        }
    }
}

fn normalize_weekdays(days: impl IntoIterator<Item = Weekday>) -> Vec<Weekday> {
    let mut out: Vec<Weekday> = Vec::new();
    for day in days {
        if !out.contains(&day) {
            out.push(day);
        }
    }
    out.sort_by_key(|d| d.num_days_from_monday());
    out
}

/// Lowercase English weekday name, as used in `recurrenceDays`.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

pub fn parse_weekday(name: &str) -> AppResult<Weekday> {
    match name.trim().to_ascii_lowercase().as_str() {
        "monday" => Ok(Weekday::Mon),
        "tuesday" => Ok(Weekday::Tue),
        "wednesday" => Ok(Weekday::Wed),
        "thursday" => Ok(Weekday::Thu),
        "friday" => Ok(Weekday::Fri),
        "saturday" => Ok(Weekday::Sat),
        "sunday" => Ok(Weekday::Sun),
        other => Err(AppError::Validation(format!(
            "invalid day name in recurrence days: {}",
            other
        ))),
    }
}

/// Weekday from the legacy integer encoding (0 = Sunday .. 6 = Saturday).
pub fn weekday_from_sunday_index(index: i64) -> AppResult<Weekday> {
    match index {
        0 => Ok(Weekday::Sun),
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        _ => Err(AppError::Validation(
            "weekday must be between 0 (Sunday) and 6 (Saturday)".to_string(),
        )),
    }
}

pub fn weekday_names(days: &[Weekday]) -> Vec<String> {
    days.iter().map(|d| weekday_name(*d).to_string()).collect()
}

pub fn parse_weekday_names<S: AsRef<str>>(names: &[S]) -> AppResult<Vec<Weekday>> {
    names.iter().map(|n| parse_weekday(n.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Weekly".parse::<RecurrenceKind>().unwrap(), RecurrenceKind::Weekly);
        assert_eq!("".parse::<RecurrenceKind>().unwrap(), RecurrenceKind::None);
        assert!("fortnightly".parse::<RecurrenceKind>().is_err());
    }

    #[test]
    fn weekly_rule_dedups_and_orders_days() {
        let rule = RecurrenceRule::weekly([Weekday::Thu, Weekday::Mon, Weekday::Thu]);
        assert_eq!(rule.weekdays, vec![Weekday::Mon, Weekday::Thu]);
    }

    #[test]
    fn validate_rejects_missing_and_out_of_range_fields() {
        assert!(RecurrenceRule::weekly([]).validate().is_err());
        assert!(RecurrenceRule::monthly(0).validate().is_err());
        assert!(RecurrenceRule::monthly(32).validate().is_err());
        assert!(RecurrenceRule::quarterly(15).validate().is_ok());
        assert!(RecurrenceRule::yearly(13, 1).validate().is_err());
        assert!(RecurrenceRule::yearly(2, 30).validate().is_ok());

        let mut missing = RecurrenceRule::monthly(1);
        missing.day_of_month = None;
        assert!(missing.validate().is_err());
    }

    #[test]
    fn anchoring_takes_day_and_month_from_the_start_date() {
        let anchor = NaiveDate::from_ymd_opt(2024, 3, 17).unwrap();
        let rule = RecurrenceRule::yearly(1, 1).anchored_to(anchor);
        assert_eq!(rule.month_day(), Some(MonthDay { month: 3, day: 17 }));

        let rule = RecurrenceRule::monthly(1).anchored_to(anchor);
        assert_eq!(rule.day_of_month, Some(17));
        assert_eq!(rule.month, None);
    }

    #[test]
    fn normalized_drops_fields_the_kind_ignores() {
        let mut rule = RecurrenceRule::daily();
        rule.weekdays = vec![Weekday::Mon];
        rule.day_of_month = Some(4);
        let rule = rule.normalized();
        assert!(rule.weekdays.is_empty());
        assert_eq!(rule.day_of_month, None);
    }

    #[test]
    fn weekday_codecs() {
        assert_eq!(parse_weekday("Monday").unwrap(), Weekday::Mon);
        assert!(parse_weekday("mon").is_err());
        assert_eq!(weekday_from_sunday_index(0).unwrap(), Weekday::Sun);
        assert!(weekday_from_sunday_index(7).is_err());
        assert_eq!(weekday_names(&[Weekday::Sun]), vec!["sunday".to_string()]);
    }
}
