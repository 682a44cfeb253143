use std::cmp::Ordering;

use tracing::trace;
use uuid::Uuid;

use crate::catalog::{
  Group,
  GroupStore,
  Tag,
  TagStore
};
use crate::task::{
  Status,
  Task
};
use crate::ui::{
  Filters,
  SortDirection,
  SortField,
  UiState
};

/// Filters then sorts `tasks` for display.
///
/// Pure: the same tasks and UI state always give the same order. The sort
/// is stable, so tasks with equal keys keep their insertion order.
#[tracing::instrument(skip_all, fields(
  total = tasks.len(),
  sort = %ui.sort_field,
  direction = %ui.sort_direction
))]
pub fn filter_and_sort<'a>(
  tasks: &'a [Task],
  ui: &UiState
) -> Vec<&'a Task> {
  let query =
    ui.filters.search.to_lowercase();

  let mut out: Vec<&Task> = tasks
    .iter()
    .filter(|task| {
      matches_filters(
        task,
        &ui.filters,
        &query
      )
    })
    .collect();

  out.sort_by(|a, b| {
    let cmp =
      compare_by(ui.sort_field, a, b);
    match ui.sort_direction {
      | SortDirection::Asc => cmp,
      | SortDirection::Desc => {
        cmp.reverse()
      }
    }
  });

  trace!(
    visible = out.len(),
    "derived task order"
  );
  out
}

/// `query` is the already lowercased search text.
fn matches_filters(
  task: &Task,
  filters: &Filters,
  query: &str
) -> bool {
  if !query.is_empty() {
    let title_match = task
      .title
      .to_lowercase()
      .contains(query);
    let description_match = task
      .description
      .as_deref()
      .map(|d| {
        d.to_lowercase().contains(query)
      })
      .unwrap_or(false);
    if !title_match
      && !description_match
    {
      return false;
    }
  }

  if !filters.status.is_empty()
    && !filters
      .status
      .contains(&task.status)
  {
    return false;
  }

  if !filters.priority.is_empty()
    && !filters
      .priority
      .contains(&task.priority)
  {
    return false;
  }

  if let Some(group_id) =
    filters.group_id
    && task.group_id != Some(group_id)
  {
    return false;
  }

  if !filters.tag_ids.is_empty()
    && !filters
      .tag_ids
      .iter()
      .any(|tag| task.has_tag(*tag))
  {
    return false;
  }

  true
}

fn compare_by(
  field: SortField,
  a: &Task,
  b: &Task
) -> Ordering {
  match field {
    | SortField::Priority => {
      a.priority
        .rank()
        .cmp(&b.priority.rank())
    }
    | SortField::Title => {
      compare_titles(&a.title, &b.title)
    }
    | SortField::DueDate => {
      match (a.due_date, b.due_date) {
        | (Some(x), Some(y)) => x.cmp(&y),
        | (Some(_), None) => {
          Ordering::Less
        }
        | (None, Some(_)) => {
          Ordering::Greater
        }
        | (None, None) => Ordering::Equal
      }
    }
    | SortField::UpdatedAt => {
      a.updated_at.cmp(&b.updated_at)
    }
    | SortField::CreatedAt => {
      a.created_at.cmp(&b.created_at)
    }
  }
}

/// Case-insensitive collation; exact text only breaks ties.
fn compare_titles(
  a: &str,
  b: &str
) -> Ordering {
  a.to_lowercase()
    .cmp(&b.to_lowercase())
    .then_with(|| a.cmp(b))
}

/// Revision key of the inputs a projection was computed from.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct ProjectionKey {
  pub tasks_rev: u64,
  pub ui_rev:    u64
}

/// Memoized derivation: caches the derived id order until either input
/// revision moves.
#[derive(Debug, Default)]
pub struct Projection {
  key: Option<ProjectionKey>,
  ids: Vec<Uuid>
}

impl Projection {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the cached order, recomputing only on a key change.
  pub fn ids(
    &mut self,
    key: ProjectionKey,
    tasks: &[Task],
    ui: &UiState
  ) -> &[Uuid] {
    if self.key != Some(key) {
      trace!(?key, "projection recomputed");
      self.ids =
        filter_and_sort(tasks, ui)
          .into_iter()
          .map(|task| task.id)
          .collect();
      self.key = Some(key);
    }
    &self.ids
  }

  pub fn is_fresh(
    &self,
    key: ProjectionKey
  ) -> bool {
    self.key == Some(key)
  }
}

#[derive(Debug)]
pub struct BoardColumn<'a> {
  pub status: Status,
  pub tasks:  Vec<&'a Task>
}

/// Splits an already derived list into the todo / in progress / done lanes.
pub fn board_columns<'a>(
  visible: &[&'a Task]
) -> Vec<BoardColumn<'a>> {
  Status::ALL
    .iter()
    .map(|status| {
      BoardColumn {
        status: *status,
        tasks:  visible
          .iter()
          .copied()
          .filter(|t| t.status == *status)
          .collect()
      }
    })
    .collect()
}

#[derive(Debug)]
pub struct GroupSection<'a> {
  /// `None` is the ungrouped section.
  pub group: Option<&'a Group>,
  pub tasks: Vec<&'a Task>
}

/// One section per group in store order, then the ungrouped section.
///
/// Tasks pointing at a deleted group match no section and are left out.
pub fn group_sections<'a>(
  visible: &[&'a Task],
  groups: &'a GroupStore
) -> Vec<GroupSection<'a>> {
  let mut sections: Vec<GroupSection> =
    groups
      .iter()
      .map(|group| {
        GroupSection {
          group: Some(group),
          tasks: visible
            .iter()
            .copied()
            .filter(|t| {
              t.group_id == Some(group.id)
            })
            .collect()
        }
      })
      .collect();

  sections.push(GroupSection {
    group: None,
    tasks: visible
      .iter()
      .copied()
      .filter(|t| t.group_id.is_none())
      .collect()
  });

  sections
}

/// Tags of `task` in catalog order; dangling ids are skipped.
pub fn resolve_tags<'a>(
  task: &Task,
  tags: &'a TagStore
) -> Vec<&'a Tag> {
  tags
    .iter()
    .filter(|tag| task.has_tag(tag.id))
    .collect()
}

pub fn resolve_group<'a>(
  task: &Task,
  groups: &'a GroupStore
) -> Option<&'a Group> {
  task
    .group_id
    .and_then(|id| groups.get(id))
}

/// (completed, total)
pub fn subtask_progress(
  task: &Task
) -> (usize, usize) {
  let done = task
    .subtasks
    .iter()
    .filter(|s| s.completed)
    .count();
  (done, task.subtasks.len())
}

#[cfg(test)]
mod tests {
  use chrono::{
    DateTime,
    Duration,
    NaiveDate,
    TimeZone,
    Utc
  };
  use uuid::Uuid;

  use super::*;
  use crate::catalog::GroupStore;
  use crate::task::{
    Priority,
    TaskDraft
  };
  use crate::ui::FilterPatch;

  fn base_time() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 2, 16, 5, 0, 0
      )
      .unwrap()
  }

  fn task_at(
    title: &str,
    minutes: i64
  ) -> Task {
    Task::from_draft(
      TaskDraft::new(title),
      base_time()
        + Duration::minutes(minutes)
    )
  }

  fn titles(
    tasks: &[&Task]
  ) -> Vec<String> {
    tasks
      .iter()
      .map(|t| t.title.clone())
      .collect()
  }

  #[test]
  fn search_matches_title_or_description()
  {
    let tasks = vec![
      task_at("Buy groceries", 0),
      task_at("Read a book", 0),
    ];
    let mut ui = UiState::default();
    ui.set_filters(FilterPatch {
      search: Some("BOOK".to_string()),
      ..FilterPatch::default()
    });
    assert_eq!(
      titles(&filter_and_sort(
        &tasks, &ui
      )),
      vec!["Read a book"]
    );

    ui.set_filters(FilterPatch {
      search: Some(String::new()),
      ..FilterPatch::default()
    });
    assert_eq!(
      titles(&filter_and_sort(
        &tasks, &ui
      )),
      vec![
        "Buy groceries",
        "Read a book"
      ]
    );

    let mut described =
      task_at("Errand", 1);
    described.description = Some(
      "pick up the BOOK order"
        .to_string()
    );
    let tasks = vec![described];
    ui.set_filters(FilterPatch {
      search: Some("book".to_string()),
      ..FilterPatch::default()
    });
    assert_eq!(
      filter_and_sort(&tasks, &ui)
        .len(),
      1
    );
  }

  #[test]
  fn tag_filter_is_a_union() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let mut only_a = task_at("a", 0);
    only_a.tag_ids.insert(a);
    let mut only_b = task_at("b", 1);
    only_b.tag_ids.insert(b);
    let untagged = task_at("none", 2);
    let tasks =
      vec![only_a, only_b, untagged];

    let mut ui = UiState::default();
    ui.set_sort_field(
      SortField::CreatedAt
    );
    ui.toggle_tag_filter(a);
    assert_eq!(
      titles(&filter_and_sort(
        &tasks, &ui
      )),
      vec!["a"]
    );

    ui.toggle_tag_filter(b);
    assert_eq!(
      titles(&filter_and_sort(
        &tasks, &ui
      )),
      vec!["a", "b"]
    );
  }

  #[test]
  fn status_priority_and_group_filters_combine()
  {
    let group = Uuid::new_v4();
    let mut hit = task_at("hit", 0);
    hit.status = Status::InProgress;
    hit.priority = Priority::High;
    hit.group_id = Some(group);

    let mut wrong_status =
      hit.clone();
    wrong_status.id = Uuid::new_v4();
    wrong_status.title =
      "wrong status".to_string();
    wrong_status.status = Status::Done;

    let mut wrong_group = hit.clone();
    wrong_group.id = Uuid::new_v4();
    wrong_group.title =
      "wrong group".to_string();
    wrong_group.group_id = None;

    let tasks = vec![
      hit,
      wrong_status,
      wrong_group,
    ];
    let mut ui = UiState::default();
    ui.set_filters(FilterPatch {
      status: Some(
        [
          Status::Todo,
          Status::InProgress
        ]
        .into()
      ),
      priority: Some(
        [Priority::High].into()
      ),
      group_id: Some(Some(group)),
      ..FilterPatch::default()
    });

    assert_eq!(
      titles(&filter_and_sort(
        &tasks, &ui
      )),
      vec!["hit"]
    );
  }

  #[test]
  fn priority_sort_puts_high_first_when_ascending()
  {
    let mut low = task_at("low", 0);
    low.priority = Priority::Low;
    let mut high = task_at("high", 1);
    high.priority = Priority::High;
    let mut medium =
      task_at("medium", 2);
    medium.priority = Priority::Medium;
    let tasks = vec![low, high, medium];

    let mut ui = UiState::default();
    ui.set_sort_field(
      SortField::Priority
    );
    assert_eq!(
      titles(&filter_and_sort(
        &tasks, &ui
      )),
      vec!["low", "medium", "high"]
    );

    ui.set_sort_field(
      SortField::Priority
    );
    assert_eq!(
      titles(&filter_and_sort(
        &tasks, &ui
      )),
      vec!["high", "medium", "low"]
    );
  }

  #[test]
  fn missing_due_dates_sort_after_real_dates()
  {
    let mut far = task_at("far", 0);
    far.due_date =
      NaiveDate::from_ymd_opt(
        9999, 12, 31
      );
    let undated = task_at("undated", 1);
    let mut soon = task_at("soon", 2);
    soon.due_date =
      NaiveDate::from_ymd_opt(
        2026, 2, 20
      );
    let tasks = vec![far, undated, soon];

    let mut ui = UiState::default();
    ui.set_sort_field(SortField::DueDate);
    ui.set_sort_field(SortField::DueDate);
    assert_eq!(
      ui.sort_direction,
      SortDirection::Asc
    );
    assert_eq!(
      titles(&filter_and_sort(
        &tasks, &ui
      )),
      vec!["soon", "far", "undated"]
    );
  }

  #[test]
  fn title_sort_ignores_case() {
    let tasks = vec![
      task_at("banana", 0),
      task_at("Apple", 1),
      task_at("cherry", 2),
    ];
    let mut ui = UiState::default();
    ui.set_sort_field(SortField::Title);
    ui.set_sort_field(SortField::Title);
    assert_eq!(
      titles(&filter_and_sort(
        &tasks, &ui
      )),
      vec!["Apple", "banana", "cherry"]
    );
  }

  #[test]
  fn default_sort_is_newest_first_and_stable()
  {
    let tasks = vec![
      task_at("old", 0),
      task_at("tie one", 5),
      task_at("tie two", 5),
      task_at("new", 9),
    ];
    let ui = UiState::default();
    let first =
      titles(&filter_and_sort(
        &tasks, &ui
      ));
    assert_eq!(
      first,
      vec![
        "new", "tie one", "tie two",
        "old"
      ]
    );
    assert_eq!(
      first,
      titles(&filter_and_sort(
        &tasks, &ui
      ))
    );
  }

  #[test]
  fn projection_recomputes_only_on_key_change()
  {
    let mut tasks = vec![task_at("a", 0)];
    let ui = UiState::default();
    let mut projection =
      Projection::new();
    let key = ProjectionKey {
      tasks_rev: 1,
      ui_rev:    1
    };

    assert_eq!(
      projection
        .ids(key, &tasks, &ui)
        .len(),
      1
    );

    tasks.push(task_at("b", 1));
    assert_eq!(
      projection
        .ids(key, &tasks, &ui)
        .len(),
      1
    );

    let bumped = ProjectionKey {
      tasks_rev: 2,
      ..key
    };
    assert!(!projection.is_fresh(bumped));
    assert_eq!(
      projection
        .ids(bumped, &tasks, &ui)
        .len(),
      2
    );
  }

  #[test]
  fn layouts_partition_the_derived_list() {
    let groups = GroupStore::seeded();
    let work = groups.as_slice()[1].id;

    let mut in_work = task_at("work", 0);
    in_work.group_id = Some(work);
    in_work.status = Status::Done;
    let loose = task_at("loose", 1);
    let mut dangling =
      task_at("dangling", 2);
    dangling.group_id =
      Some(Uuid::new_v4());
    let tasks =
      vec![in_work, loose, dangling];

    let ui = UiState::default();
    let visible =
      filter_and_sort(&tasks, &ui);

    let columns =
      board_columns(&visible);
    assert_eq!(columns.len(), 3);
    assert_eq!(
      columns[0].status,
      Status::Todo
    );
    assert_eq!(
      titles(&columns[0].tasks),
      vec!["dangling", "loose"]
    );
    assert_eq!(
      titles(&columns[2].tasks),
      vec!["work"]
    );

    let sections =
      group_sections(&visible, &groups);
    assert_eq!(sections.len(), 4);
    assert_eq!(
      titles(&sections[1].tasks),
      vec!["work"]
    );
    assert!(sections[3].group.is_none());
    assert_eq!(
      titles(&sections[3].tasks),
      vec!["loose"]
    );
    let placed: usize = sections
      .iter()
      .map(|s| s.tasks.len())
      .sum();
    assert_eq!(placed, 2);

    assert!(
      resolve_group(&tasks[2], &groups)
        .is_none()
    );
  }
}
