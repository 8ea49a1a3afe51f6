use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::recurrence::RecurrenceRule;

/// Event domains offered by the calendar UI. Stored as free text; unknown
/// values are rejected on create and update.
pub const EVENT_DOMAINS: [&str; 12] = [
    "Work",
    "University",
    "Personal",
    "Coding Time",
    "Study",
    "Health",
    "Social",
    "Holidays",
    "Travel",
    "Maintenance",
    "Entertainment",
    "Family",
];

/// A stored calendar event. Recurring definitions describe a whole series.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDefinition {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub domain: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub rule: RecurrenceRule,
    pub hide_from_agenda: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventDefinition {
    pub fn is_recurring(&self) -> bool {
        self.rule.is_recurring()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.end_date.map(|end| end - self.start_date)
    }

    pub fn start_day(&self) -> NaiveDate {
        self.start_date.date_naive()
    }

    pub fn start_time(&self) -> NaiveTime {
        self.start_date.time()
    }
}

/// Caller-supplied fields for creating or overwriting an event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFields {
    pub title: String,
    pub domain: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub all_day: bool,
    /// `None` keeps the existing rule on updates and means "not recurring"
    /// on create.
    pub rule: Option<RecurrenceRule>,
    pub hide_from_agenda: bool,
}

impl EventFields {
    pub fn duration(&self) -> Option<Duration> {
        self.end_date.map(|end| end - self.start_date)
    }
}

/// What an exception does to the occurrence it targets.
#[derive(Debug, Clone, PartialEq)]
pub enum ExceptionChange {
    Deleted,
    Modified(ExceptionOverrides),
}

impl ExceptionChange {
    pub fn kind(&self) -> &'static str {
        match self {
            ExceptionChange::Deleted => "deleted",
            ExceptionChange::Modified(_) => "modified",
        }
    }
}

/// Per-field overrides; `None` keeps the series value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExceptionOverrides {
    pub title: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub domain: Option<String>,
    pub all_day: Option<bool>,
}

impl ExceptionOverrides {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.domain.is_none()
            && self.all_day.is_none()
    }

    /// Overrides for the fields of `fields` that differ from `occurrence`.
    pub fn diff(occurrence: &Occurrence, fields: &EventFields) -> Self {
        ExceptionOverrides {
            title: (fields.title != occurrence.title).then(|| fields.title.clone()),
            start_date: (fields.start_date != occurrence.start_date).then_some(fields.start_date),
            end_date: match fields.end_date {
                Some(end) if Some(end) != occurrence.end_date => Some(end),
                _ => None,
            },
            domain: (fields.domain != occurrence.domain).then(|| fields.domain.clone()),
            all_day: (fields.all_day != occurrence.all_day).then_some(fields.all_day),
        }
    }
}

/// A deviation from a recurring series on one original occurrence date.
#[derive(Debug, Clone, PartialEq)]
pub struct EventException {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub original_date: NaiveDate,
    pub change: ExceptionChange,
    pub created_at: DateTime<Utc>,
}

impl EventException {
    pub fn new(
        event_id: &str,
        user_id: &str,
        original_date: NaiveDate,
        change: ExceptionChange,
        now: DateTime<Utc>,
    ) -> Self {
        EventException {
            id: Uuid::new_v4().to_string(),
            event_id: event_id.to_string(),
            user_id: user_id.to_string(),
            original_date,
            change,
            created_at: now,
        }
    }
}

/// One concrete instance of an event inside a query window. Never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub event_id: String,
    pub user_id: String,
    pub title: String,
    pub domain: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub rule: RecurrenceRule,
    pub hide_from_agenda: bool,
    /// Date the series rule produced, before any override moved it.
    pub occurrence_date: NaiveDate,
    pub is_exception: bool,
}

impl Occurrence {
    /// The unmodified occurrence of `definition` on `date`, keeping the
    /// definition's time of day and duration.
    pub fn of(definition: &EventDefinition, date: NaiveDate) -> Self {
        let start_date = date.and_time(definition.start_time()).and_utc();
        Occurrence {
            event_id: definition.id.clone(),
            user_id: definition.user_id.clone(),
            title: definition.title.clone(),
            domain: definition.domain.clone(),
            start_date,
            end_date: definition.duration().map(|d| start_date + d),
            all_day: definition.all_day,
            rule: definition.rule.clone(),
            hide_from_agenda: definition.hide_from_agenda,
            occurrence_date: date,
            is_exception: false,
        }
    }

    pub fn with_overrides(self, overrides: &ExceptionOverrides) -> Self {
        Occurrence {
            title: overrides.title.clone().unwrap_or(self.title),
            domain: overrides.domain.clone().unwrap_or(self.domain),
            start_date: overrides.start_date.unwrap_or(self.start_date),
            end_date: overrides.end_date.or(self.end_date),
            all_day: overrides.all_day.unwrap_or(self.all_day),
            is_exception: true,
            ..self
        }
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        match self.end_date {
            Some(own_end) => self.start_date < end && start < own_end,
            None => false,
        }
    }
}

/// Summary of an existing occurrence that blocks a new event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictingOccurrence {
    pub id: String,
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl From<&Occurrence> for ConflictingOccurrence {
    fn from(occurrence: &Occurrence) -> Self {
        ConflictingOccurrence {
            id: occurrence.event_id.clone(),
            title: occurrence.title.clone(),
            start_date: occurrence.start_date,
            end_date: occurrence.end_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn definition() -> EventDefinition {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        EventDefinition {
            id: "e1".into(),
            user_id: "u1".into(),
            title: "Standup".into(),
            domain: "Work".into(),
            start_date: start,
            end_date: Some(start + Duration::minutes(30)),
            all_day: false,
            rule: RecurrenceRule::daily(),
            hide_from_agenda: false,
            version: 0,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn occurrence_keeps_time_of_day_and_duration() {
        let occ = Occurrence::of(&definition(), NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(occ.start_date, Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap());
        assert_eq!(occ.end_date, Some(Utc.with_ymd_and_hms(2024, 1, 5, 9, 30, 0).unwrap()));
        assert!(!occ.is_exception);
    }

    #[test]
    fn diff_only_records_changed_fields() {
        let occ = Occurrence::of(&definition(), NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        let fields = EventFields {
            title: "Standup (moved)".into(),
            domain: "Work".into(),
            start_date: occ.start_date,
            end_date: occ.end_date,
            all_day: false,
            rule: None,
            hide_from_agenda: false,
        };
        let overrides = ExceptionOverrides::diff(&occ, &fields);
        assert_eq!(overrides.title.as_deref(), Some("Standup (moved)"));
        assert!(overrides.start_date.is_none());
        assert!(overrides.end_date.is_none());
        assert!(overrides.domain.is_none());
        assert!(overrides.all_day.is_none());
    }

    #[test]
    fn overrides_replace_only_populated_fields() {
        let occ = Occurrence::of(&definition(), NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        let overrides = ExceptionOverrides {
            domain: Some("Personal".into()),
            ..Default::default()
        };
        let modified = occ.clone().with_overrides(&overrides);
        assert_eq!(modified.domain, "Personal");
        assert_eq!(modified.title, occ.title);
        assert_eq!(modified.start_date, occ.start_date);
        assert!(modified.is_exception);
    }

    #[test]
    fn overlap_requires_an_end() {
        let occ = Occurrence::of(&definition(), NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        let start = Utc.with_ymd_and_hms(2024, 1, 5, 9, 15, 0).unwrap();
        assert!(occ.overlaps(start, start + Duration::hours(1)));
        assert!(!occ.overlaps(occ.end_date.unwrap(), occ.end_date.unwrap() + Duration::hours(1)));

        let open = Occurrence { end_date: None, ..occ };
        assert!(!open.overlaps(start, start + Duration::hours(1)));
    }
}
