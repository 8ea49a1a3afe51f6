use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const TASK_DOMAINS: [&str; 8] = [
    "Work",
    "University",
    "Coding Project",
    "Personal Project",
    "Goals",
    "Finances",
    "Household",
    "Health",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "Low",
            TaskPriority::Medium => "Medium",
            TaskPriority::High => "High",
        }
    }
}

impl FromStr for TaskPriority {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(TaskPriority::Low),
            "Medium" => Ok(TaskPriority::Medium),
            "High" => Ok(TaskPriority::High),
            other => Err(AppError::Validation(format!("invalid priority: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    Todo,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "Todo",
            TaskStatus::Done => "Done",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            TaskStatus::Todo => TaskStatus::Done,
            TaskStatus::Done => TaskStatus::Todo,
        }
    }
}

impl FromStr for TaskStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Todo" => Ok(TaskStatus::Todo),
            "Done" => Ok(TaskStatus::Done),
            other => Err(AppError::Validation(format!("invalid status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(skip_serializing)]
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub domain: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskFields {
    pub title: String,
    pub description: Option<String>,
    pub domain: String,
    pub priority: TaskPriority,
    pub deadline: Option<DateTime<Utc>>,
}
