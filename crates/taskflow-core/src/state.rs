use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::catalog::{Group, GroupStore, Tag, TagStore};
use crate::store::{Outcome, TaskStore};
use crate::task::{Task, TaskDraft, TaskPatch};
use crate::ui::{FilterPatch, SortField, UiState, ViewMode};
use crate::view::{Projection, ProjectionKey, filter_and_sort};

/// Every mutation the rest of the application may perform.
#[derive(Debug, Clone)]
pub enum Action {
    AddTask(TaskDraft),
    UpdateTask { id: Uuid, patch: TaskPatch },
    DeleteTask(Uuid),
    AddSubtask { task_id: Uuid, title: String },
    ToggleSubtask { task_id: Uuid, subtask_id: Uuid },
    DeleteSubtask { task_id: Uuid, subtask_id: Uuid },

    AddGroup { name: String, color: String },
    UpdateGroup(Group),
    DeleteGroup(Uuid),

    AddTag { name: String, color: String },
    UpdateTag(Tag),
    DeleteTag(Uuid),

    SetViewMode(ViewMode),
    SetSortField(SortField),
    SetFilters(FilterPatch),
    ClearFilters,
    ToggleTagFilter(Uuid),
    ToggleSidebar,
    ToggleDarkMode,
    SetEditingTaskId(Option<Uuid>),
}

/// What a dispatch did. `created` carries the fresh id of an add action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    pub outcome: Outcome,
    pub created: Option<Uuid>,
}

impl Dispatched {
    fn applied() -> Self {
        Self {
            outcome: Outcome::Applied,
            created: None,
        }
    }

    fn created(id: Uuid) -> Self {
        Self {
            outcome: Outcome::Applied,
            created: Some(id),
        }
    }

    fn from_outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            created: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slice {
    Tasks,
    Groups,
    Tags,
    Ui,
}

/// The combined application state. Each slice is only ever changed by
/// `dispatch`, one action at a time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppState {
    tasks: TaskStore,
    groups: GroupStore,
    tags: TagStore,
    ui: UiState,

    #[serde(skip)]
    revisions: Revisions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Revisions {
    tasks: u64,
    groups: u64,
    tags: u64,
    ui: u64,
}

impl PartialEq for AppState {
    fn eq(&self, other: &Self) -> bool {
        self.tasks == other.tasks
            && self.groups == other.groups
            && self.tags == other.tags
            && self.ui == other.ui
    }
}

impl Eq for AppState {}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn groups(&self) -> &GroupStore {
        &self.groups
    }

    pub fn tags(&self) -> &TagStore {
        &self.tags
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    #[instrument(skip(self, action, now))]
    pub fn dispatch(&mut self, action: Action, now: DateTime<Utc>) -> Dispatched {
        let (slice, result) = match action {
            Action::AddTask(draft) => (
                Slice::Tasks,
                Dispatched::created(self.tasks.add_task(draft, now)),
            ),
            Action::UpdateTask { id, patch } => (
                Slice::Tasks,
                Dispatched::from_outcome(self.tasks.update_task(id, patch, now)),
            ),
            Action::DeleteTask(id) => (
                Slice::Tasks,
                Dispatched::from_outcome(self.tasks.delete_task(id)),
            ),
            Action::AddSubtask { task_id, title } => (
                Slice::Tasks,
                Dispatched::from_outcome(self.tasks.add_subtask(task_id, title, now)),
            ),
            Action::ToggleSubtask {
                task_id,
                subtask_id,
            } => (
                Slice::Tasks,
                Dispatched::from_outcome(self.tasks.toggle_subtask(task_id, subtask_id, now)),
            ),
            Action::DeleteSubtask {
                task_id,
                subtask_id,
            } => (
                Slice::Tasks,
                Dispatched::from_outcome(self.tasks.delete_subtask(task_id, subtask_id, now)),
            ),

            Action::AddGroup { name, color } => (
                Slice::Groups,
                Dispatched::created(self.groups.add(name, color)),
            ),
            Action::UpdateGroup(group) => (
                Slice::Groups,
                Dispatched::from_outcome(self.groups.update(group)),
            ),
            Action::DeleteGroup(id) => (
                Slice::Groups,
                Dispatched::from_outcome(self.groups.delete(id)),
            ),

            Action::AddTag { name, color } => (
                Slice::Tags,
                Dispatched::created(self.tags.add(name, color)),
            ),
            Action::UpdateTag(tag) => (
                Slice::Tags,
                Dispatched::from_outcome(self.tags.update(tag)),
            ),
            Action::DeleteTag(id) => (
                Slice::Tags,
                Dispatched::from_outcome(self.tags.delete(id)),
            ),

            Action::SetViewMode(mode) => {
                self.ui.set_view_mode(mode);
                (Slice::Ui, Dispatched::applied())
            }
            Action::SetSortField(field) => {
                self.ui.set_sort_field(field);
                (Slice::Ui, Dispatched::applied())
            }
            Action::SetFilters(patch) => {
                self.ui.set_filters(patch);
                (Slice::Ui, Dispatched::applied())
            }
            Action::ClearFilters => {
                self.ui.clear_filters();
                (Slice::Ui, Dispatched::applied())
            }
            Action::ToggleTagFilter(tag_id) => {
                self.ui.toggle_tag_filter(tag_id);
                (Slice::Ui, Dispatched::applied())
            }
            Action::ToggleSidebar => {
                self.ui.toggle_sidebar();
                (Slice::Ui, Dispatched::applied())
            }
            Action::ToggleDarkMode => {
                self.ui.toggle_dark_mode();
                (Slice::Ui, Dispatched::applied())
            }
            Action::SetEditingTaskId(id) => {
                self.ui.set_editing_task_id(id);
                (Slice::Ui, Dispatched::applied())
            }
        };

        if result.outcome.applied() {
            self.bump(slice);
        }
        debug!(?slice, outcome = ?result.outcome, "action dispatched");
        result
    }

    fn bump(&mut self, slice: Slice) {
        let rev = match slice {
            Slice::Tasks => &mut self.revisions.tasks,
            Slice::Groups => &mut self.revisions.groups,
            Slice::Tags => &mut self.revisions.tags,
            Slice::Ui => &mut self.revisions.ui,
        };
        *rev += 1;
    }

    /// Monotonic change counter across all slices; persistence uses it to
    /// know whether anything needs writing.
    pub fn revision(&self) -> u64 {
        let r = self.revisions;
        r.tasks + r.groups + r.tags + r.ui
    }

    pub fn projection_key(&self) -> ProjectionKey {
        ProjectionKey {
            tasks_rev: self.revisions.tasks,
            ui_rev: self.revisions.ui,
        }
    }

    /// The filtered, sorted list the views render.
    pub fn visible_tasks(&self) -> Vec<&Task> {
        filter_and_sort(self.tasks.as_slice(), &self.ui)
    }

    /// Same as `visible_tasks`, served from `projection` when still fresh.
    pub fn visible_tasks_cached<'a>(&'a self, projection: &mut Projection) -> Vec<&'a Task> {
        projection
            .ids(self.projection_key(), self.tasks.as_slice(), &self.ui)
            .iter()
            .filter_map(|id| self.tasks.get(*id))
            .collect()
    }

    /// The task currently open for editing, if it still exists.
    pub fn editing_task(&self) -> Option<&Task> {
        self.ui.editing_task_id.and_then(|id| self.tasks.get(id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::task::Priority;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap()
    }

    #[test]
    fn initial_state_is_seeded() {
        let state = AppState::new();
        assert!(state.tasks().is_empty());
        assert_eq!(state.groups().len(), 3);
        assert_eq!(state.tags().len(), 3);
        assert_eq!(state.ui(), &UiState::default());
        assert_eq!(state.revision(), 0);
    }

    #[test]
    fn actions_touch_only_their_slice() {
        let mut state = AppState::new();
        let groups_before = state.groups().clone();

        let result = state.dispatch(
            Action::AddTask(TaskDraft {
                priority: Priority::High,
                ..TaskDraft::new("Integration test task")
            }),
            now(),
        );
        state.dispatch(Action::ToggleDarkMode, now());
        state.dispatch(Action::SetViewMode(ViewMode::Board), now());

        let id = result.created.unwrap();
        assert_eq!(state.tasks().get(id).unwrap().title, "Integration test task");
        assert!(state.ui().dark_mode);
        assert_eq!(state.ui().view_mode, ViewMode::Board);
        assert_eq!(state.groups(), &groups_before);
    }

    #[test]
    fn deleting_referenced_group_and_tag_leaves_task_untouched() {
        let mut state = AppState::new();
        let group_id = state.groups().as_slice()[0].id;
        let tag_id = state.tags().as_slice()[0].id;
        let mut draft = TaskDraft::new("referenced");
        draft.group_id = Some(group_id);
        draft.tag_ids.insert(tag_id);
        let task_id = state.dispatch(Action::AddTask(draft), now()).created.unwrap();
        let before = state.tasks().get(task_id).unwrap().clone();

        state.dispatch(Action::DeleteGroup(group_id), now() + Duration::minutes(1));
        state.dispatch(Action::DeleteTag(tag_id), now() + Duration::minutes(1));

        let after = state.tasks().get(task_id).unwrap();
        assert_eq!(after, &before);
        assert!(crate::view::resolve_group(after, state.groups()).is_none());
        assert!(crate::view::resolve_tags(after, state.tags()).is_empty());
    }

    #[test]
    fn not_found_does_not_bump_revision() {
        let mut state = AppState::new();
        let result = state.dispatch(Action::DeleteTask(Uuid::new_v4()), now());
        assert_eq!(result.outcome, Outcome::NotFound);
        assert_eq!(state.revision(), 0);
    }

    #[test]
    fn cached_projection_tracks_dispatches() {
        let mut state = AppState::new();
        let mut projection = Projection::new();
        state.dispatch(Action::AddTask(TaskDraft::new("Buy groceries")), now());
        state.dispatch(
            Action::AddTask(TaskDraft::new("Read a book")),
            now() + Duration::seconds(1),
        );
        assert_eq!(state.visible_tasks_cached(&mut projection).len(), 2);

        state.dispatch(
            Action::SetFilters(FilterPatch {
                search: Some("book".to_string()),
                ..FilterPatch::default()
            }),
            now(),
        );
        let visible = state.visible_tasks_cached(&mut projection);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].title, "Read a book");
        assert_eq!(visible, state.visible_tasks());
    }

    #[test]
    fn cached_projection_matches_fresh_after_every_dispatch() {
        let mut state = AppState::new();
        let mut projection = Projection::new();
        let urgent = state.tags().as_slice()[0].id;

        let mut tagged = TaskDraft::new("Read a book");
        tagged.tag_ids.insert(urgent);
        let actions = vec![
            Action::AddTask(TaskDraft::new("Buy groceries")),
            Action::AddTask(tagged),
            Action::SetFilters(FilterPatch {
                search: Some("book".to_string()),
                ..FilterPatch::default()
            }),
            Action::ClearFilters,
            Action::ToggleTagFilter(urgent),
            Action::ToggleTagFilter(urgent),
            Action::SetSortField(SortField::Title),
            Action::SetSortField(SortField::Title),
            Action::DeleteTask(Uuid::new_v4()),
        ];

        for (step, action) in actions.into_iter().enumerate() {
            state.dispatch(action, now() + Duration::seconds(step as i64));
            let cached: Vec<Uuid> = state
                .visible_tasks_cached(&mut projection)
                .iter()
                .map(|t| t.id)
                .collect();
            let fresh: Vec<Uuid> = state.visible_tasks().iter().map(|t| t.id).collect();
            assert_eq!(cached, fresh, "diverged after step {step}");
        }
    }

    #[test]
    fn editing_task_resolves_only_existing_tasks() {
        let mut state = AppState::new();
        let id = state
            .dispatch(Action::AddTask(TaskDraft::new("open me")), now())
            .created
            .unwrap();
        state.dispatch(Action::SetEditingTaskId(Some(id)), now());
        assert_eq!(state.editing_task().map(|t| t.id), Some(id));

        state.dispatch(Action::DeleteTask(id), now());
        assert!(state.editing_task().is_none());
    }
}
