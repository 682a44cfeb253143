use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::task::{Subtask, Task, TaskDraft, TaskPatch};

/// Result of a store mutation. `NotFound` always means nothing changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    NotFound,
}

impl Outcome {
    pub fn applied(self) -> bool {
        self == Outcome::Applied
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct TaskStore {
    items: Vec<Task>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(skip(self, draft, now), fields(title = %draft.title))]
    pub fn add_task(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> Uuid {
        let task = Task::from_draft(draft, now);
        let id = task.id;
        self.items.push(task);
        debug!(%id, count = self.items.len(), "task added");
        id
    }

    #[tracing::instrument(skip(self, patch, now))]
    pub fn update_task(&mut self, id: Uuid, patch: TaskPatch, now: DateTime<Utc>) -> Outcome {
        let Some(task) = self.get_mut(id) else {
            debug!("task not found; update ignored");
            return Outcome::NotFound;
        };
        patch.apply(task);
        task.touch(now);
        Outcome::Applied
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_task(&mut self, id: Uuid) -> Outcome {
        let before = self.items.len();
        self.items.retain(|t| t.id != id);
        if self.items.len() == before {
            debug!("task not found; delete ignored");
            Outcome::NotFound
        } else {
            Outcome::Applied
        }
    }

    /// Title is taken as-is; rejecting blank titles is the caller's job.
    #[tracing::instrument(skip(self, title, now))]
    pub fn add_subtask(&mut self, task_id: Uuid, title: String, now: DateTime<Utc>) -> Outcome {
        let Some(task) = self.get_mut(task_id) else {
            debug!("parent task not found; subtask not added");
            return Outcome::NotFound;
        };
        task.subtasks.push(Subtask::new(title));
        task.touch(now);
        Outcome::Applied
    }

    #[tracing::instrument(skip(self, now))]
    pub fn toggle_subtask(
        &mut self,
        task_id: Uuid,
        subtask_id: Uuid,
        now: DateTime<Utc>,
    ) -> Outcome {
        let Some(task) = self.get_mut(task_id) else {
            return Outcome::NotFound;
        };
        let Some(subtask) = task.subtask_mut(subtask_id) else {
            debug!("subtask not found; toggle ignored");
            return Outcome::NotFound;
        };
        subtask.completed = !subtask.completed;
        task.touch(now);
        Outcome::Applied
    }

    #[tracing::instrument(skip(self, now))]
    pub fn delete_subtask(
        &mut self,
        task_id: Uuid,
        subtask_id: Uuid,
        now: DateTime<Utc>,
    ) -> Outcome {
        let Some(task) = self.get_mut(task_id) else {
            return Outcome::NotFound;
        };
        let before = task.subtasks.len();
        task.subtasks.retain(|s| s.id != subtask_id);
        if task.subtasks.len() == before {
            debug!("subtask not found; delete ignored");
            return Outcome::NotFound;
        }
        task.touch(now);
        Outcome::Applied
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.items.iter().find(|t| t.id == id)
    }

    fn get_mut(&mut self, id: Uuid) -> Option<&mut Task> {
        self.items.iter_mut().find(|t| t.id == id)
    }

    /// Resolves a full id or an unambiguous id prefix, as typed on the command line.
    pub fn resolve_prefix(&self, prefix: &str) -> Option<&Task> {
        resolve_id_prefix(self.items.iter(), prefix, |t: &Task| t.id)
    }

    pub fn as_slice(&self) -> &[Task] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub(crate) fn resolve_id_prefix<'a, T, I, F>(items: I, prefix: &str, id_of: F) -> Option<&'a T>
where
    I: Iterator<Item = &'a T>,
    F: Fn(&T) -> Uuid,
{
    let needle = prefix.trim().to_ascii_lowercase();
    if needle.is_empty() {
        return None;
    }

    let mut matches = items.filter(|item| id_of(*item).to_string().starts_with(&needle));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}
