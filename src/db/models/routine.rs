use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::recurrence::RecurrenceRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Completed,
    Skipped,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::Completed => "completed",
            CompletionStatus::Skipped => "skipped",
        }
    }
}

impl FromStr for CompletionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(CompletionStatus::Completed),
            "skipped" => Ok(CompletionStatus::Skipped),
            other => Err(AppError::Internal(anyhow::anyhow!(
                "unknown completion status: {}",
                other
            ))),
        }
    }
}

/// Time-of-day bucket a routine is shown in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeType {
    #[serde(rename = "AM")]
    Am,
    #[serde(rename = "PM")]
    Pm,
    AllDay,
    Specific,
}

impl TimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeType::Am => "AM",
            TimeType::Pm => "PM",
            TimeType::AllDay => "AllDay",
            TimeType::Specific => "Specific",
        }
    }
}

impl fmt::Display for TimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AM" => Ok(TimeType::Am),
            "PM" => Ok(TimeType::Pm),
            "AllDay" => Ok(TimeType::AllDay),
            "Specific" => Ok(TimeType::Specific),
            other => Err(AppError::Validation(format!("invalid timeType: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutineDefinition {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub rule: RecurrenceRule,
    pub is_skippable: bool,
    pub show_streak: bool,
    pub time_type: TimeType,
    /// `HH:MM`, only meaningful when `time_type` is `Specific`.
    pub specific_time: Option<String>,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied routine fields for create and full update.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineFields {
    pub title: String,
    pub rule: RecurrenceRule,
    pub is_skippable: bool,
    pub show_streak: bool,
    pub time_type: TimeType,
    pub specific_time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakCounters {
    pub current: i64,
    pub longest: i64,
}

/// One completion or skip of a routine on one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub id: String,
    pub routine_id: String,
    pub user_id: String,
    pub completed_on: NaiveDate,
    pub status: CompletionStatus,
    pub created_at: DateTime<Utc>,
}

impl CompletionRecord {
    pub fn new(
        routine_id: &str,
        user_id: &str,
        completed_on: NaiveDate,
        status: CompletionStatus,
        now: DateTime<Utc>,
    ) -> Self {
        CompletionRecord {
            id: Uuid::new_v4().to_string(),
            routine_id: routine_id.to_string(),
            user_id: user_id.to_string(),
            completed_on,
            status,
            created_at: now,
        }
    }
}
