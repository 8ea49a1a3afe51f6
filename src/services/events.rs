use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::models::{
    ConflictingOccurrence, EventDefinition, EventException, EventFields, ExceptionChange,
    ExceptionOverrides, Occurrence, EVENT_DOMAINS,
};
use crate::db::store::{EventStore, ExceptionStore};
use crate::error::{AppError, AppResult};
use crate::recurrence::expand::{sort_occurrences, Expander};
use crate::recurrence::RecurrenceRule;

/// Which part of a series an edit or delete applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditScope {
    This,
    Following,
    All,
}

impl fmt::Display for EditScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EditScope::This => "this",
            EditScope::Following => "following",
            EditScope::All => "all",
        })
    }
}

impl FromStr for EditScope {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "this" | "single" => Ok(EditScope::This),
            "following" | "future" => Ok(EditScope::Following),
            "all" => Ok(EditScope::All),
            other => Err(AppError::InvalidScope(format!(
                "unknown scope '{}', expected this, following or all",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// The requested values already match the occurrence.
    Unchanged(EventDefinition),
    Exception {
        event: EventDefinition,
        exception: EventException,
    },
    Split {
        truncated: EventDefinition,
        created: EventDefinition,
    },
    Updated(EventDefinition),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    OccurrenceRemoved(EventException),
    SeriesTruncated(EventDefinition),
    Deleted,
}

pub struct EventService<'a, S: ?Sized> {
    store: &'a S,
    clock: &'a dyn Clock,
    expander: Expander,
}

impl<'a, S> EventService<'a, S>
where
    S: EventStore + ExceptionStore + ?Sized,
{
    pub fn new(store: &'a S, clock: &'a dyn Clock, expander: Expander) -> Self {
        EventService {
            store,
            clock,
            expander,
        }
    }

    /// All occurrences of the user's events whose start lies in `[start, end]`.
    pub async fn expand_occurrences(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<Occurrence>> {
        if end < start {
            return Err(AppError::Validation(
                "end must not be before start".to_string(),
            ));
        }

        let definitions = self.store.find_events_in_range(user_id, start, end).await?;
        let mut occurrences = Vec::new();

        for definition in &definitions {
            let exceptions = if definition.is_recurring() {
                self.store
                    .find_exceptions_in_range(&definition.id, start.date_naive(), end.date_naive())
                    .await?
            } else {
                Vec::new()
            };
            occurrences.extend(self.expander.expand(definition, start, end, &exceptions));
        }

        sort_occurrences(&mut occurrences);
        debug!(
            "Expanded {} definitions into {} occurrences for user {}",
            definitions.len(),
            occurrences.len(),
            user_id
        );
        Ok(occurrences)
    }

    /// Load a definition owned by `user_id`. Another user's event is reported
    /// as missing.
    pub async fn get_event(&self, id: &str, user_id: &str) -> AppResult<EventDefinition> {
        self.store
            .get_event(id)
            .await?
            .filter(|e| e.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))
    }

    pub async fn create_event(&self, user_id: &str, fields: EventFields) -> AppResult<EventDefinition> {
        validate_fields(&fields)?;

        let now = self.clock.now();
        let rule = fields
            .rule
            .clone()
            .unwrap_or_else(RecurrenceRule::none)
            .anchored_to(fields.start_date.date_naive());
        let event = definition_from_fields(
            Uuid::new_v4().to_string(),
            user_id,
            &fields,
            fields.start_date,
            rule,
            now,
        );
        validate_recurrence_end(&event)?;

        self.check_conflicts(&event).await?;
        self.store.create_event(&event).await?;

        info!("Created event {} for user {}", event.id, user_id);
        Ok(event)
    }

    pub async fn apply_edit(
        &self,
        id: &str,
        user_id: &str,
        scope: EditScope,
        occurrence_date: Option<NaiveDate>,
        fields: EventFields,
    ) -> AppResult<EditOutcome> {
        validate_fields(&fields)?;
        let base = self.get_event(id, user_id).await?;
        ensure_scope_allowed(&base, scope)?;
        let now = self.clock.now();

        match scope {
            EditScope::All => Ok(EditOutcome::Updated(self.overwrite(base, &fields, now).await?)),
            EditScope::This => {
                let date = self.require_occurrence(&base, occurrence_date, scope)?;
                let occurrence = Occurrence::of(&base, date);
                let overrides = ExceptionOverrides::diff(&occurrence, &fields);
                if overrides.is_empty() {
                    return Ok(EditOutcome::Unchanged(base));
                }

                let exception = EventException::new(
                    &base.id,
                    &base.user_id,
                    date,
                    ExceptionChange::Modified(overrides),
                    now,
                );
                let exception = self.store.upsert_exception(&exception).await?;
                info!("Modified occurrence {} of event {}", date, base.id);
                Ok(EditOutcome::Exception {
                    event: base,
                    exception,
                })
            }
            EditScope::Following => {
                let date = occurrence_date.ok_or_else(|| missing_occurrence_date(scope))?;
                if date <= base.start_day() {
                    return Ok(EditOutcome::Updated(self.overwrite(base, &fields, now).await?));
                }
                let date = self.require_occurrence(&base, Some(date), scope)?;

                let start = date.and_time(fields.start_date.time()).and_utc();
                // An inherited rule keeps its target day, even when the split
                // lands on a clamped occurrence.
                let rule = match &fields.rule {
                    Some(rule) => rule.clone().anchored_to(date),
                    None => base.rule.clone(),
                };
                let created = definition_from_fields(
                    Uuid::new_v4().to_string(),
                    user_id,
                    &fields,
                    start,
                    rule,
                    now,
                );
                validate_recurrence_end(&created)?;

                let truncated = truncate_before(base, date, now);
                let truncated = self.store.split_series(&truncated, &created).await?;
                info!(
                    "Split event {} at {} into new series {}",
                    truncated.id, date, created.id
                );
                Ok(EditOutcome::Split { truncated, created })
            }
        }
    }

    pub async fn apply_delete(
        &self,
        id: &str,
        user_id: &str,
        scope: EditScope,
        occurrence_date: Option<NaiveDate>,
    ) -> AppResult<DeleteOutcome> {
        let base = self.get_event(id, user_id).await?;
        ensure_scope_allowed(&base, scope)?;

        match scope {
            EditScope::All => {
                self.store.delete_event(&base.id).await?;
                info!("Deleted event {}", base.id);
                Ok(DeleteOutcome::Deleted)
            }
            EditScope::This => {
                let date = self.require_occurrence(&base, occurrence_date, scope)?;
                let exception = EventException::new(
                    &base.id,
                    &base.user_id,
                    date,
                    ExceptionChange::Deleted,
                    self.clock.now(),
                );
                let exception = self.store.upsert_exception(&exception).await?;
                info!("Deleted occurrence {} of event {}", date, base.id);
                Ok(DeleteOutcome::OccurrenceRemoved(exception))
            }
            EditScope::Following => {
                let date = occurrence_date.ok_or_else(|| missing_occurrence_date(scope))?;
                if date <= base.start_day() {
                    self.store.delete_event(&base.id).await?;
                    info!("Deleted event {} from its first occurrence", base.id);
                    return Ok(DeleteOutcome::Deleted);
                }
                let date = self.require_occurrence(&base, Some(date), scope)?;
                let truncated = truncate_before(base, date, self.clock.now());
                let truncated = self.store.update_event(&truncated).await?;
                info!("Ended event {} before {}", truncated.id, date);
                Ok(DeleteOutcome::SeriesTruncated(truncated))
            }
        }
    }

    pub async fn list_exceptions(&self, id: &str, user_id: &str) -> AppResult<Vec<EventException>> {
        let event = self.get_event(id, user_id).await?;
        self.store.find_exceptions(&event.id).await
    }

    /// Remove an exception so its occurrence falls back to the series values.
    pub async fn restore_occurrence(
        &self,
        id: &str,
        user_id: &str,
        exception_id: &str,
    ) -> AppResult<()> {
        let event = self.get_event(id, user_id).await?;
        let exception = self
            .store
            .get_exception(exception_id)
            .await?
            .filter(|e| e.event_id == event.id)
            .ok_or_else(|| AppError::NotFound("Exception not found".to_string()))?;

        self.store.delete_exception(&exception.id).await?;
        info!(
            "Restored occurrence {} of event {}",
            exception.original_date, event.id
        );
        Ok(())
    }

    /// Timed occurrences of the user's events that overlap `[start, end)`.
    pub async fn find_conflicts(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_event: Option<&str>,
    ) -> AppResult<Vec<Occurrence>> {
        // Occurrences are found by start, so look back far enough to catch
        // the longest timed event still running at `start`.
        let lookback = self
            .store
            .list_events_by_user(user_id)
            .await?
            .iter()
            .filter(|e| !e.all_day)
            .filter_map(|e| e.end_date.map(|end| end - e.start_date))
            .max()
            .unwrap_or_else(Duration::zero)
            .max(Duration::days(1));

        let occurrences = self
            .expand_occurrences(user_id, start - lookback, end)
            .await?;

        Ok(occurrences
            .into_iter()
            .filter(|o| !o.all_day)
            .filter(|o| exclude_event != Some(o.event_id.as_str()))
            .filter(|o| o.overlaps(start, end))
            .collect())
    }

    async fn check_conflicts(&self, event: &EventDefinition) -> AppResult<()> {
        let end = match event.end_date {
            Some(end) if !event.all_day => end,
            _ => return Ok(()),
        };

        match self
            .find_conflicts(&event.user_id, event.start_date, end, Some(&event.id))
            .await
        {
            Ok(conflicts) if conflicts.is_empty() => Ok(()),
            Ok(conflicts) => Err(AppError::EventConflict(
                conflicts.iter().map(ConflictingOccurrence::from).collect(),
            )),
            Err(e) => {
                warn!(
                    "Conflict check for new event {} failed, creating anyway: {:?}",
                    event.id, e
                );
                Ok(())
            }
        }
    }

    async fn overwrite(
        &self,
        base: EventDefinition,
        fields: &EventFields,
        now: DateTime<Utc>,
    ) -> AppResult<EventDefinition> {
        let rule = fields
            .rule
            .clone()
            .unwrap_or_else(|| base.rule.clone())
            .anchored_to(fields.start_date.date_naive());
        let updated = EventDefinition {
            created_at: base.created_at,
            version: base.version,
            ..definition_from_fields(base.id.clone(), &base.user_id, fields, fields.start_date, rule, now)
        };
        validate_recurrence_end(&updated)?;

        let stored = self.store.update_event(&updated).await.map_err(|e| {
            if let AppError::Conflict(_) = &e {
                warn!("Rejected stale write to event {}", updated.id);
            }
            e
        })?;
        info!("Updated event {}", stored.id);
        Ok(stored)
    }

    fn require_occurrence(
        &self,
        base: &EventDefinition,
        occurrence_date: Option<NaiveDate>,
        scope: EditScope,
    ) -> AppResult<NaiveDate> {
        let date = occurrence_date.ok_or_else(|| missing_occurrence_date(scope))?;
        if !self.expander.occurs_on(base, date) {
            return Err(AppError::Validation(format!(
                "{} is not an occurrence of event {}",
                date, base.id
            )));
        }
        Ok(date)
    }
}

fn missing_occurrence_date(scope: EditScope) -> AppError {
    AppError::InvalidScope(format!(
        "occurrenceDate is required for scope '{}'",
        scope
    ))
}

fn ensure_scope_allowed(event: &EventDefinition, scope: EditScope) -> AppResult<()> {
    if scope != EditScope::All && !event.is_recurring() {
        return Err(AppError::InvalidScope(format!(
            "scope '{}' applies only to recurring events",
            scope
        )));
    }
    Ok(())
}

fn truncate_before(base: EventDefinition, date: NaiveDate, now: DateTime<Utc>) -> EventDefinition {
    let rule = base.rule.clone().until(date.pred_opt());
    EventDefinition {
        rule,
        updated_at: now,
        ..base
    }
}

fn definition_from_fields(
    id: String,
    user_id: &str,
    fields: &EventFields,
    start: DateTime<Utc>,
    rule: RecurrenceRule,
    now: DateTime<Utc>,
) -> EventDefinition {
    EventDefinition {
        id,
        user_id: user_id.to_string(),
        title: fields.title.trim().to_string(),
        domain: fields.domain.clone(),
        start_date: start,
        end_date: fields.duration().map(|d| start + d),
        all_day: fields.all_day,
        rule: rule.normalized(),
        hide_from_agenda: fields.hide_from_agenda,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}

fn validate_fields(fields: &EventFields) -> AppResult<()> {
    if fields.title.trim().is_empty() {
        return Err(AppError::Validation("title is required".to_string()));
    }
    if !EVENT_DOMAINS.contains(&fields.domain.as_str()) {
        return Err(AppError::Validation(format!(
            "invalid domain '{}'",
            fields.domain
        )));
    }
    if let Some(end) = fields.end_date {
        if end < fields.start_date {
            return Err(AppError::Validation(
                "endDate must not be before startDate".to_string(),
            ));
        }
    }
    if let Some(rule) = &fields.rule {
        rule.clone().anchored_to(fields.start_date.date_naive()).validate()?;
    }
    Ok(())
}

fn validate_recurrence_end(event: &EventDefinition) -> AppResult<()> {
    if let Some(until) = event.rule.until {
        if until < event.start_day() {
            return Err(AppError::Validation(
                "recurrenceEnd must not be before the start date".to_string(),
            ));
        }
    }
    Ok(())
}
