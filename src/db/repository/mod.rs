//! SQLite implementations of the store traits.

pub mod completion;
pub mod event;
pub mod exception;
pub mod routine;
pub mod task;
pub mod user;

use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::recurrence::{parse_weekday_names, weekday_names, RecurrenceKind, RecurrenceRule};

/// Store backed by a SQLite pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteStore { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Column values a [`RecurrenceRule`] is stored as. Events and routines use
/// the same shape under different column names.
pub(crate) struct RuleColumns {
    pub kind: &'static str,
    pub days: Option<String>,
    pub day_of_month: Option<i64>,
    pub month: Option<i64>,
    pub until: Option<NaiveDate>,
}

impl RuleColumns {
    pub fn from_rule(rule: &RecurrenceRule) -> AppResult<Self> {
        let days = if rule.weekdays.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&weekday_names(&rule.weekdays))
                    .map_err(|e| AppError::Internal(e.into()))?,
            )
        };

        Ok(RuleColumns {
            kind: rule.kind.as_str(),
            days,
            day_of_month: rule.day_of_month.map(i64::from),
            month: rule.month.map(i64::from),
            until: rule.until,
        })
    }

    pub fn into_rule(
        kind: &str,
        days: Option<String>,
        day_of_month: Option<i64>,
        month: Option<i64>,
        until: Option<NaiveDate>,
    ) -> AppResult<RecurrenceRule> {
        let kind: RecurrenceKind = kind.parse().map_err(|_| {
            AppError::Internal(anyhow::anyhow!("unknown recurrence type in database: {}", kind))
        })?;

        let weekdays = match days.as_deref() {
            None | Some("") => Vec::new(),
            Some(json) => {
                let names: Vec<String> = serde_json::from_str(json)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("bad weekday list: {}", e)))?;
                parse_weekday_names(&names)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("bad weekday list: {}", e)))?
            }
        };

        let to_u32 = |value: Option<i64>| value.and_then(|v| u32::try_from(v).ok());

        Ok(RecurrenceRule {
            kind,
            weekdays,
            day_of_month: to_u32(day_of_month),
            month: to_u32(month),
            until,
        }
        .normalized())
    }
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    #[test]
    fn rule_columns_keep_weekdays_and_until() {
        let until = NaiveDate::from_ymd_opt(2024, 6, 30);
        let rule = RecurrenceRule::weekly([Weekday::Fri, Weekday::Mon]).until(until);
        let cols = RuleColumns::from_rule(&rule).unwrap();
        assert_eq!(cols.kind, "weekly");
        assert_eq!(cols.days.as_deref(), Some(r#"["monday","friday"]"#));

        let back =
            RuleColumns::into_rule(cols.kind, cols.days, cols.day_of_month, cols.month, cols.until)
                .unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn unknown_stored_kind_is_an_internal_error() {
        let err = RuleColumns::into_rule("hourly", None, None, None, None).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
