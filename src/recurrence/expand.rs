//! Occurrence expansion for calendar events.
//!
//! Expansion is pure: a definition, its exceptions and a window go in,
//! freshly built [`Occurrence`] values come out. Every produced start lies
//! inside the inclusive window, and the result is ordered by start.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use super::calendar::{advance, first_on_or_after, matches_frequency};
use super::RecurrenceKind;
use crate::db::models::{EventDefinition, EventException, ExceptionChange, Occurrence};

pub const DEFAULT_MAX_STEPS: usize = 1000;

#[derive(Debug, Clone, Copy)]
pub struct Expander {
    max_steps: usize,
}

impl Default for Expander {
    fn default() -> Self {
        Expander::new(DEFAULT_MAX_STEPS)
    }
}

impl Expander {
    pub fn new(max_steps: usize) -> Self {
        Expander {
            max_steps: max_steps.max(1),
        }
    }

    /// Occurrences of `definition` whose start falls in `[window_start, window_end]`,
    /// with `exceptions` applied.
    pub fn expand(
        &self,
        definition: &EventDefinition,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        exceptions: &[EventException],
    ) -> Vec<Occurrence> {
        let raw = self.raw_occurrences(definition, window_start, window_end);
        let mut occurrences = apply_exceptions(raw, exceptions);
        occurrences.retain(|o| o.start_date >= window_start && o.start_date <= window_end);
        sort_occurrences(&mut occurrences);
        occurrences
    }

    /// Series occurrences in the window before exceptions are applied.
    pub fn raw_occurrences(
        &self,
        definition: &EventDefinition,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Vec<Occurrence> {
        if window_end < window_start {
            return Vec::new();
        }

        let in_window = |start: DateTime<Utc>| start >= window_start && start <= window_end;

        if !definition.is_recurring() {
            return if in_window(definition.start_date) {
                vec![Occurrence::of(definition, definition.start_day())]
            } else {
                Vec::new()
            };
        }

        let rule = &definition.rule;
        let first_day = definition.start_day().max(window_start.date_naive());
        let last_day = match rule.until {
            Some(until) => until.min(window_end.date_naive()),
            None => window_end.date_naive(),
        };
        if first_day > last_day {
            return Vec::new();
        }

        let mut current = if rule.kind.is_month_based() {
            first_on_or_after(rule, first_day)
        } else {
            Some(first_day)
        };

        let mut occurrences = Vec::new();
        let mut steps = 0;

        while let Some(day) = current {
            if day > last_day {
                break;
            }
            if steps >= self.max_steps {
                warn!(
                    "Expansion of event {} stopped after {} steps at {}",
                    definition.id, steps, day
                );
                break;
            }
            steps += 1;

            if rule.kind != RecurrenceKind::Weekly || matches_frequency(rule, day) {
                let occurrence = Occurrence::of(definition, day);
                if occurrence.start_date >= definition.start_date && in_window(occurrence.start_date)
                {
                    occurrences.push(occurrence);
                }
            }

            current = advance(day, rule);
        }

        occurrences
    }

    /// Whether the series produces an occurrence on `date`, ignoring exceptions.
    pub fn occurs_on(&self, definition: &EventDefinition, date: NaiveDate) -> bool {
        if !definition.is_recurring() {
            return date == definition.start_day();
        }
        if date < definition.start_day() {
            return false;
        }
        if definition.rule.until.is_some_and(|until| date > until) {
            return false;
        }
        matches_frequency(&definition.rule, date)
    }
}

/// Replace raw occurrences with their exceptions: deleted ones are dropped,
/// modified ones take the populated override fields.
///
/// Exceptions are matched by original occurrence date. An exception whose
/// date produced no raw occurrence has no effect.
pub fn apply_exceptions(occurrences: Vec<Occurrence>, exceptions: &[EventException]) -> Vec<Occurrence> {
    if exceptions.is_empty() {
        return occurrences;
    }

    let by_date: HashMap<NaiveDate, &ExceptionChange> = exceptions
        .iter()
        .map(|e| (e.original_date, &e.change))
        .collect();

    occurrences
        .into_iter()
        .filter_map(|occurrence| match by_date.get(&occurrence.occurrence_date) {
            None => Some(occurrence),
            Some(ExceptionChange::Deleted) => None,
            Some(ExceptionChange::Modified(overrides)) => Some(occurrence.with_overrides(overrides)),
        })
        .collect()
}

/// Order by start, then by series id so equal starts are stable across calls.
pub fn sort_occurrences(occurrences: &mut [Occurrence]) {
    occurrences.sort_by(|a, b| {
        a.start_date
            .cmp(&b.start_date)
            .then_with(|| a.event_id.cmp(&b.event_id))
            .then_with(|| a.occurrence_date.cmp(&b.occurrence_date))
    });
}
