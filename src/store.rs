use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::Settings;
use crate::core::occurrence::OccurrenceKey;
use crate::core::recurrence::Recurrence;
use crate::core::similarity;
use crate::core::task::{Priority, SubItem, Task};
use crate::storage::PersistedState;
use crate::sync::RemoteState;

/// Full-state snapshot, broadcast after every commit that touches the tasks
/// or the completion set. Receivers replace their state wholesale:
/// last write wins, no merging.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub tasks: Vec<Task>,
    pub completions: BTreeSet<OccurrenceKey>,
}

/// One row of a day view. For recurring tasks this is a synthesized
/// instance: `completed` comes from the completion set, never from the
/// stored task.
#[derive(Debug, Clone)]
pub struct DayEntry {
    pub task: Task,
    pub date: NaiveDate,
    pub recurring: bool,
    pub completed: bool,
}

/// Input for [`TaskStore::add_task`]. A missing date means "today".
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub notes: String,
    pub priority: Priority,
    pub date: Option<NaiveDate>,
    pub recurrence: Option<Recurrence>,
}

/// Partial task update. `recurrence: Some(None)` clears the rule.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub priority: Option<Priority>,
    pub date: Option<NaiveDate>,
    pub completed: Option<bool>,
    pub recurrence: Option<Option<Recurrence>>,
}

#[derive(Debug, Clone, Default)]
pub struct SubItemPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Append imported tasks; no duplicate detection.
    Merge,
    /// Discard the current collection and install the imported one.
    Replace,
}

/// The task collection, selection set, and per-occurrence completion set,
/// kept consistent as one unit. Every mutation goes through here.
///
/// The completion set is the sole source of truth for recurring-instance
/// completion; completing an occurrence never rewrites the task's anchor
/// date. Editing a task's rule does not clean up completion entries the old
/// rule produced; such entries become unreachable orphans until the task is
/// deleted.
pub struct TaskStore {
    tasks: Vec<Task>,
    completions: BTreeSet<OccurrenceKey>,
    selection: Vec<Uuid>,
    settings: Settings,
    events: broadcast::Sender<StateSnapshot>,
}

impl TaskStore {
    pub fn new(events: broadcast::Sender<StateSnapshot>) -> Self {
        Self {
            tasks: Vec::new(),
            completions: BTreeSet::new(),
            selection: Vec::new(),
            settings: Settings::default(),
            events,
        }
    }

    pub fn from_persisted(state: PersistedState, events: broadcast::Sender<StateSnapshot>) -> Self {
        Self {
            tasks: state.tasks,
            completions: state.completion_map,
            selection: state.selected_items,
            settings: state.settings,
            events,
        }
    }

    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            tasks: self.tasks.clone(),
            settings: self.settings.clone(),
            completion_map: self.completions.clone(),
            selected_items: self.selection.clone(),
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            tasks: self.tasks.clone(),
            completions: self.completions.clone(),
        }
    }

    fn publish(&self) {
        // No receivers is fine; the snapshot just goes nowhere.
        let _ = self.events.send(self.snapshot());
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn selection(&self) -> &[Uuid] {
        &self.selection
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Settings changes don't touch tasks or completions, so no snapshot is
    /// published.
    pub fn update_settings(&mut self, update: impl FnOnce(&mut Settings)) {
        update(&mut self.settings);
    }

    pub fn is_occurrence_completed(&self, id: Uuid, date: NaiveDate) -> bool {
        self.completions.contains(&OccurrenceKey::new(id, date))
    }

    /// All tasks visible on `date`, ordered: incomplete before completed,
    /// then most urgent first (the sort is stable, so ties keep insertion
    /// order).
    pub fn tasks_for_date(&self, date: NaiveDate) -> Vec<DayEntry> {
        let mut entries: Vec<DayEntry> = Vec::new();
        for task in &self.tasks {
            match &task.recurrence {
                Some(rule) if rule.enabled => {
                    if rule.occurs_on(task.date, date) {
                        entries.push(DayEntry {
                            completed: self.is_occurrence_completed(task.id, date),
                            task: task.clone(),
                            date,
                            recurring: true,
                        });
                    }
                }
                _ => {
                    if task.date == date {
                        entries.push(DayEntry {
                            completed: task.completed,
                            task: task.clone(),
                            date,
                            recurring: false,
                        });
                    }
                }
            }
        }
        entries.sort_by_key(|e| (e.completed, e.task.priority.urgency_rank()));
        entries
    }

    pub fn add_task(&mut self, new: NewTask) -> Uuid {
        let date = new.date.unwrap_or_else(|| chrono::Local::now().date_naive());
        let mut task = Task::new(new.title, date);
        task.notes = new.notes;
        task.priority = new.priority;
        task.recurrence = new.recurrence;
        let id = task.id;
        self.tasks.push(task);
        self.publish();
        id
    }

    /// Flip completion for the instance on `date`. Non-recurring tasks flip
    /// their own flag; recurring tasks toggle `(id, date)` membership in the
    /// completion set and the anchor date stays put. Unknown id: no-op.
    pub fn toggle_completion(&mut self, id: Uuid, date: NaiveDate) {
        let Some(index) = self.tasks.iter().position(|t| t.id == id) else {
            return;
        };
        if self.tasks[index].is_recurring() {
            let key = OccurrenceKey::new(id, date);
            if !self.completions.remove(&key) {
                self.completions.insert(key);
            }
        } else {
            let task = &mut self.tasks[index];
            task.completed = !task.completed;
        }
        self.publish();
    }

    /// Merge `patch` into the task. Recurrence/date consistency is the
    /// caller's concern, and completion entries are never cleaned up here
    /// even when the rule changes.
    pub fn update_task(&mut self, id: Uuid, patch: TaskPatch) {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return;
        };
        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(notes) = patch.notes {
            task.notes = notes;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(date) = patch.date {
            task.date = date;
        }
        if let Some(completed) = patch.completed {
            task.completed = completed;
        }
        if let Some(recurrence) = patch.recurrence {
            task.recurrence = recurrence;
        }
        self.publish();
    }

    /// Remove the task plus every completion entry and selection reference
    /// keyed by its id.
    pub fn delete_task(&mut self, id: Uuid) {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        if self.tasks.len() == before {
            return;
        }
        self.completions.retain(|k| k.task_id != id);
        self.selection.retain(|s| *s != id);
        self.publish();
    }

    pub fn toggle_select(&mut self, id: Uuid) {
        if let Some(pos) = self.selection.iter().position(|s| *s == id) {
            self.selection.remove(pos);
        } else {
            self.selection.push(id);
        }
    }

    pub fn select_all(&mut self, ids: Vec<Uuid>) {
        self.selection = ids;
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Move every selected task to `date`, then consume the selection.
    pub fn bulk_move_to(&mut self, date: NaiveDate) {
        let selected: HashSet<Uuid> = self.selection.drain(..).collect();
        for task in &mut self.tasks {
            if selected.contains(&task.id) {
                task.date = date;
            }
        }
        self.publish();
    }

    pub fn bulk_set_priority(&mut self, priority: Priority) {
        let selected: HashSet<Uuid> = self.selection.drain(..).collect();
        for task in &mut self.tasks {
            if selected.contains(&task.id) {
                task.priority = priority;
            }
        }
        self.publish();
    }

    /// Delete every selected task, cascading like [`TaskStore::delete_task`],
    /// then consume the selection. Unselected tasks and their completion
    /// entries are untouched.
    pub fn bulk_delete(&mut self) {
        let selected: HashSet<Uuid> = self.selection.drain(..).collect();
        self.tasks.retain(|t| !selected.contains(&t.id));
        self.completions.retain(|k| !selected.contains(&k.task_id));
        self.publish();
    }

    pub fn add_sub_item(
        &mut self,
        task_id: Uuid,
        title: impl Into<String>,
        priority: Priority,
    ) -> Option<Uuid> {
        let task = self.tasks.iter_mut().find(|t| t.id == task_id)?;
        let sub = SubItem::new(title, priority);
        let sub_id = sub.id;
        task.sub_items.push(sub);
        self.publish();
        Some(sub_id)
    }

    pub fn update_sub_item(&mut self, task_id: Uuid, sub_id: Uuid, patch: SubItemPatch) {
        let Some(sub) = self.sub_item_mut(task_id, sub_id) else {
            return;
        };
        if let Some(title) = patch.title {
            sub.title = title;
        }
        if let Some(completed) = patch.completed {
            sub.completed = completed;
        }
        if let Some(priority) = patch.priority {
            sub.priority = priority;
        }
        self.publish();
    }

    pub fn toggle_sub_item(&mut self, task_id: Uuid, sub_id: Uuid) {
        let Some(sub) = self.sub_item_mut(task_id, sub_id) else {
            return;
        };
        sub.completed = !sub.completed;
        self.publish();
    }

    pub fn delete_sub_item(&mut self, task_id: Uuid, sub_id: Uuid) {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) else {
            return;
        };
        let before = task.sub_items.len();
        task.sub_items.retain(|s| s.id != sub_id);
        if task.sub_items.len() != before {
            self.publish();
        }
    }

    fn sub_item_mut(&mut self, task_id: Uuid, sub_id: Uuid) -> Option<&mut SubItem> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == task_id)?
            .sub_items
            .iter_mut()
            .find(|s| s.id == sub_id)
    }

    /// Install imported tasks. `Replace` keeps the completion set as-is;
    /// stale entries for replaced ids linger until those ids are deleted.
    pub fn import_tasks(&mut self, items: Vec<Task>, mode: ImportMode) {
        match mode {
            ImportMode::Replace => self.tasks = items,
            ImportMode::Merge => self.tasks.extend(items),
        }
        self.publish();
    }

    /// The remote sync payload: the whole collection plus the completion
    /// set, stamped now.
    pub fn export_data(&self) -> RemoteState {
        RemoteState {
            tasks: self.tasks.clone(),
            completion_map: self.completions.clone(),
            exported_at: chrono::Local::now().naive_local(),
        }
    }

    /// Replace local tasks and completions with a remote payload.
    /// Full-state replace, no merging.
    pub fn load_data(&mut self, data: RemoteState) {
        self.tasks = data.tasks;
        self.completions = data.completion_map;
        self.publish();
    }

    /// When the rule would fire next, strictly after `date`. Read-only; the
    /// anchor date is not moved.
    pub fn next_occurrence_after(&self, id: Uuid, date: NaiveDate) -> Option<NaiveDate> {
        self.get(id)?.recurrence.as_ref()?.next_occurrence(date)
    }

    /// Capture-time duplicate hints for a title being typed.
    pub fn suggest_similar(&self, title: &str) -> Vec<(&Task, f64)> {
        similarity::find_similar(title, &self.tasks, 0.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recurrence::{Pattern, Recurrence};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn store() -> TaskStore {
        let (tx, _rx) = broadcast::channel(16);
        TaskStore::new(tx)
    }

    fn plain_task(store: &mut TaskStore, title: &str, date: NaiveDate) -> Uuid {
        store.add_task(NewTask {
            title: title.into(),
            date: Some(date),
            ..Default::default()
        })
    }

    fn recurring_task(store: &mut TaskStore, title: &str, date: NaiveDate, rule: Recurrence) -> Uuid {
        store.add_task(NewTask {
            title: title.into(),
            date: Some(date),
            recurrence: Some(rule),
            ..Default::default()
        })
    }

    #[test]
    fn day_view_mixes_plain_and_synthesized_instances() {
        let mut store = store();
        let monday = d(2024, 1, 1);
        let plain = plain_task(&mut store, "errand", monday);
        let daily = recurring_task(&mut store, "standup", monday, Recurrence::new(Pattern::Daily));
        plain_task(&mut store, "other day", d(2024, 1, 5));

        let entries = store.tasks_for_date(monday);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.task.id == plain && !e.recurring));
        assert!(entries.iter().any(|e| e.task.id == daily && e.recurring));

        // The recurring task also shows on later matching dates.
        let later = store.tasks_for_date(d(2024, 1, 10));
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].task.id, daily);
    }

    #[test]
    fn recurring_completed_flag_comes_only_from_the_set() {
        let mut store = store();
        let monday = d(2024, 1, 1);
        let id = recurring_task(&mut store, "standup", monday, Recurrence::new(Pattern::Daily));
        // Poison the stored flag; views must ignore it.
        store.update_task(id, TaskPatch {
            completed: Some(true),
            ..Default::default()
        });

        let entries = store.tasks_for_date(monday);
        assert!(!entries[0].completed);

        store.toggle_completion(id, monday);
        assert!(store.tasks_for_date(monday)[0].completed);
        // Other occurrences unaffected.
        assert!(!store.tasks_for_date(d(2024, 1, 2))[0].completed);
    }

    #[test]
    fn day_view_ordering() {
        let mut store = store();
        let day = d(2024, 1, 1);
        let low = plain_task(&mut store, "low", day);
        store.update_task(low, TaskPatch { priority: Some(Priority::new(1)), ..Default::default() });
        let none = plain_task(&mut store, "none", day);
        let urgent = plain_task(&mut store, "urgent", day);
        store.update_task(urgent, TaskPatch { priority: Some(Priority::new(5)), ..Default::default() });
        let done = plain_task(&mut store, "done", day);
        store.update_task(done, TaskPatch {
            priority: Some(Priority::new(5)),
            completed: Some(true),
            ..Default::default()
        });

        let titles: Vec<String> = store
            .tasks_for_date(day)
            .into_iter()
            .map(|e| e.task.title)
            .collect();
        assert_eq!(titles, vec!["urgent", "low", "none", "done"]);
    }

    #[test]
    fn toggle_completion_round_trip_is_idempotent() {
        let mut store = store();
        let monday = d(2024, 1, 1);
        let id = recurring_task(&mut store, "standup", monday, Recurrence::new(Pattern::Daily));

        assert!(!store.is_occurrence_completed(id, monday));
        store.toggle_completion(id, monday);
        assert!(store.is_occurrence_completed(id, monday));
        store.toggle_completion(id, monday);
        assert!(!store.is_occurrence_completed(id, monday));
        // Anchor never moved.
        assert_eq!(store.get(id).unwrap().date, monday);
    }

    #[test]
    fn toggle_completion_plain_task_flips_flag() {
        let mut store = store();
        let day = d(2024, 1, 1);
        let id = plain_task(&mut store, "errand", day);
        store.toggle_completion(id, day);
        assert!(store.get(id).unwrap().completed);
        store.toggle_completion(id, day);
        assert!(!store.get(id).unwrap().completed);
    }

    #[test]
    fn mutations_on_unknown_id_are_noops() {
        let mut store = store();
        plain_task(&mut store, "keep", d(2024, 1, 1));
        let ghost = Uuid::new_v4();
        store.toggle_completion(ghost, d(2024, 1, 1));
        store.update_task(ghost, TaskPatch { title: Some("x".into()), ..Default::default() });
        store.delete_task(ghost);
        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.tasks()[0].title, "keep");
    }

    #[test]
    fn delete_cascades_completions_and_selection() {
        let mut store = store();
        let monday = d(2024, 1, 1);
        let id = recurring_task(&mut store, "standup", monday, Recurrence::new(Pattern::Daily));
        store.toggle_completion(id, monday);
        store.toggle_completion(id, d(2024, 1, 2));
        store.toggle_select(id);

        store.delete_task(id);
        assert!(store.tasks().is_empty());
        assert!(store.selection().is_empty());
        assert!(!store.is_occurrence_completed(id, monday));
        assert!(store.tasks_for_date(monday).is_empty());
    }

    #[test]
    fn update_rule_leaves_orphaned_completions() {
        let mut store = store();
        let monday = d(2024, 1, 1);
        let id = recurring_task(&mut store, "standup", monday, Recurrence::new(Pattern::Daily));
        store.toggle_completion(id, d(2024, 1, 2));

        // Switch to weekly-Monday; the Jan 2 (Tuesday) entry is now orphaned
        // but stays in the set.
        store.update_task(id, TaskPatch {
            recurrence: Some(Some(Recurrence::new(Pattern::Weekly))),
            ..Default::default()
        });
        assert!(store.is_occurrence_completed(id, d(2024, 1, 2)));
        assert!(store.tasks_for_date(d(2024, 1, 2)).is_empty());
    }

    #[test]
    fn clearing_recurrence_restores_plain_semantics() {
        let mut store = store();
        let monday = d(2024, 1, 1);
        let id = recurring_task(&mut store, "standup", monday, Recurrence::new(Pattern::Daily));
        store.update_task(id, TaskPatch { recurrence: Some(None), ..Default::default() });
        assert!(store.tasks_for_date(d(2024, 1, 2)).is_empty());
        assert_eq!(store.tasks_for_date(monday).len(), 1);
        assert!(!store.tasks_for_date(monday)[0].recurring);
    }

    #[test]
    fn bulk_ops_apply_to_selection_and_consume_it() {
        let mut store = store();
        let day = d(2024, 1, 1);
        let a = plain_task(&mut store, "a", day);
        let b = plain_task(&mut store, "b", day);
        let c = plain_task(&mut store, "c", day);

        store.toggle_select(a);
        store.toggle_select(b);
        store.bulk_move_to(d(2024, 2, 1));
        assert!(store.selection().is_empty());
        assert_eq!(store.get(a).unwrap().date, d(2024, 2, 1));
        assert_eq!(store.get(b).unwrap().date, d(2024, 2, 1));
        assert_eq!(store.get(c).unwrap().date, day);

        store.select_all(vec![a, c]);
        store.bulk_set_priority(Priority::new(4));
        assert!(store.selection().is_empty());
        assert_eq!(store.get(a).unwrap().priority, Priority::new(4));
        assert_eq!(store.get(b).unwrap().priority, Priority::NONE);
    }

    #[test]
    fn bulk_delete_removes_exactly_the_selection() {
        let mut store = store();
        let day = d(2024, 1, 1);
        let a = plain_task(&mut store, "a", day);
        let b = plain_task(&mut store, "b", day);
        let c = plain_task(&mut store, "c", day);
        let keep = recurring_task(&mut store, "keep", day, Recurrence::new(Pattern::Daily));
        store.toggle_completion(keep, day);

        store.select_all(vec![a, b, c]);
        store.bulk_delete();
        assert!(store.selection().is_empty());
        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.tasks()[0].id, keep);
        assert!(store.is_occurrence_completed(keep, day));
    }

    #[test]
    fn import_merge_appends_without_dedup() {
        let mut store = store();
        plain_task(&mut store, "existing", d(2024, 1, 1));
        let incoming = vec![
            Task::new("existing", d(2024, 1, 1)),
            Task::new("new", d(2024, 1, 2)),
        ];
        store.import_tasks(incoming, ImportMode::Merge);
        assert_eq!(store.tasks().len(), 3);
    }

    #[test]
    fn import_replace_discards_collection_but_not_completions() {
        let mut store = store();
        let monday = d(2024, 1, 1);
        let id = recurring_task(&mut store, "old", monday, Recurrence::new(Pattern::Daily));
        store.toggle_completion(id, monday);

        store.import_tasks(vec![Task::new("fresh", monday)], ImportMode::Replace);
        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.tasks()[0].title, "fresh");
        // The stale entry lingers; only deletion cascades.
        assert!(store.is_occurrence_completed(id, monday));
    }

    #[test]
    fn export_load_round_trip() {
        let mut store = store();
        let monday = d(2024, 1, 1);
        let id = recurring_task(&mut store, "standup", monday, Recurrence::new(Pattern::Daily));
        store.toggle_completion(id, monday);

        let payload = store.export_data();
        let mut other = self::store();
        other.load_data(payload);
        assert_eq!(other.tasks().len(), 1);
        assert!(other.is_occurrence_completed(id, monday));
    }

    #[test]
    fn snapshots_published_on_commit_but_not_selection() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut store = TaskStore::new(tx);
        let id = plain_task(&mut store, "a", d(2024, 1, 1));
        let snap = rx.try_recv().unwrap();
        assert_eq!(snap.tasks.len(), 1);

        store.toggle_select(id);
        assert!(rx.try_recv().is_err());

        store.toggle_completion(id, d(2024, 1, 1));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn next_occurrence_after_is_a_pure_query() {
        let mut store = store();
        let monday = d(2024, 1, 1);
        let id = recurring_task(
            &mut store,
            "report",
            monday,
            Recurrence::new(Pattern::Weekly).with_days(vec![1, 3, 5]),
        );
        assert_eq!(store.next_occurrence_after(id, monday), Some(d(2024, 1, 3)));
        assert_eq!(store.get(id).unwrap().date, monday);

        let plain = plain_task(&mut store, "one-off", monday);
        assert_eq!(store.next_occurrence_after(plain, monday), None);
    }

    #[test]
    fn sub_item_lifecycle() {
        let mut store = store();
        let id = plain_task(&mut store, "shopping", d(2024, 1, 1));
        let sub = store.add_sub_item(id, "milk", Priority::new(2)).unwrap();
        store.toggle_sub_item(id, sub);
        assert!(store.get(id).unwrap().sub_items[0].completed);

        store.update_sub_item(id, sub, SubItemPatch {
            title: Some("oat milk".into()),
            ..Default::default()
        });
        assert_eq!(store.get(id).unwrap().sub_items[0].title, "oat milk");

        store.delete_sub_item(id, sub);
        assert!(store.get(id).unwrap().sub_items.is_empty());

        // Unknown parents are no-ops.
        assert!(store.add_sub_item(Uuid::new_v4(), "x", Priority::NONE).is_none());
    }

    #[test]
    fn suggestions_surface_existing_titles() {
        let mut store = store();
        plain_task(&mut store, "buy milk", d(2024, 1, 1));
        plain_task(&mut store, "walk dog", d(2024, 1, 1));
        let hits = store.suggest_similar("buy milk today");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.title, "buy milk");
    }
}
