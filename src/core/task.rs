use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::recurrence::Recurrence;

/// Task urgency on a 0–5 scale. 0 means "no priority"; among 1–5, higher is
/// more urgent. This is the single ordering policy for the whole crate:
/// sort ascending by [`Priority::urgency_rank`], which puts 5 first and
/// unprioritised tasks last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(u8);

impl Priority {
    pub const NONE: Priority = Priority(0);
    pub const MAX: u8 = 5;

    /// Build from a raw value, clamping anything above 5.
    pub fn new(value: u8) -> Self {
        Priority(value.min(Self::MAX))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Ascending sort key: 5 → 1 (most urgent first), none → last.
    pub fn urgency_rank(self) -> u8 {
        if self.0 == 0 {
            u8::MAX
        } else {
            6 - self.0.min(Self::MAX)
        }
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        Priority::new(value)
    }
}

/// A checklist entry owned by a task. No lifecycle of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubItem {
    pub id: Uuid,
    pub title: String,
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
}

impl SubItem {
    pub fn new(title: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            completed: false,
            priority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub priority: Priority,
    /// Anchor date. For recurring tasks this is the rule's start date and
    /// every occurrence is computed relative to it.
    pub date: NaiveDate,
    /// Only meaningful for non-recurring tasks; date-scoped views never read
    /// it for recurring ones (the completion set is authoritative there).
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub sub_items: Vec<SubItem>,
    pub created_at: NaiveDateTime,
}

impl Task {
    pub fn new(title: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            notes: String::new(),
            priority: Priority::NONE,
            date,
            completed: false,
            recurrence: None,
            sub_items: Vec::new(),
            created_at: chrono::Local::now().naive_local(),
        }
    }

    /// The one canonical recurring-task predicate: a rule must be present
    /// AND enabled.
    pub fn is_recurring(&self) -> bool {
        self.recurrence.as_ref().is_some_and(|r| r.enabled)
    }

    /// Whether this task shows up on `date`: by anchor equality for plain
    /// tasks, by rule evaluation for recurring ones.
    pub fn shows_on(&self, date: NaiveDate) -> bool {
        match &self.recurrence {
            Some(rule) if rule.enabled => rule.occurs_on(self.date, date),
            _ => self.date == date,
        }
    }
}
