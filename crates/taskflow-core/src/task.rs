use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Todo,
    InProgress,
    Done,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Todo, Status::InProgress, Status::Done];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in_progress",
            Status::Done => "done",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Todo => "To Do",
            Status::InProgress => "In Progress",
            Status::Done => "Done",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "todo" => Ok(Status::Todo),
            "in_progress" | "doing" => Ok(Status::InProgress),
            "done" => Ok(Status::Done),
            other => Err(anyhow!("unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Sort rank: high sorts first under ascending order.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Priority::Low),
            "medium" | "m" => Ok(Priority::Medium),
            "high" | "h" => Ok(Priority::High),
            other => Err(anyhow!("unknown priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

impl Subtask {
    pub fn new(title: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            completed: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: Uuid,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub status: Status,

    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,

    #[serde(default)]
    pub tag_ids: BTreeSet<Uuid>,

    #[serde(default)]
    pub subtasks: Vec<Subtask>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl Task {
    pub fn from_draft(draft: TaskDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: draft.title,
            description: draft.description,
            status: draft.status,
            priority: draft.priority,
            group_id: draft.group_id,
            tag_ids: draft.tag_ids,
            subtasks: draft.subtasks.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            due_date: draft.due_date,
        }
    }

    /// Stamps a modification, never moving `updated_at` before `created_at`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now.max(self.created_at);
    }

    pub fn subtask_mut(&mut self, subtask_id: Uuid) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == subtask_id)
    }

    pub fn has_tag(&self, tag_id: Uuid) -> bool {
        self.tag_ids.contains(&tag_id)
    }

    pub fn is_done(&self) -> bool {
        self.status == Status::Done
    }
}

/// Everything needed to create a task; id and timestamps are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: Status,
    pub priority: Priority,
    #[serde(default)]
    pub group_id: Option<Uuid>,
    #[serde(default)]
    pub tag_ids: BTreeSet<Uuid>,
    #[serde(default)]
    pub subtasks: Option<Vec<Subtask>>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: Status::Todo,
            priority: Priority::Medium,
            group_id: None,
            tag_ids: BTreeSet::new(),
            subtasks: None,
            due_date: None,
        }
    }
}

/// Partial update. Outer `None` leaves a field alone; `Some(None)` clears it.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub group_id: Option<Option<Uuid>>,
    pub tag_ids: Option<BTreeSet<Uuid>>,
    pub subtasks: Option<Vec<Subtask>>,
    pub due_date: Option<Option<NaiveDate>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    pub fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(group_id) = self.group_id {
            task.group_id = group_id;
        }
        if let Some(tag_ids) = self.tag_ids {
            task.tag_ids = tag_ids;
        }
        if let Some(subtasks) = self.subtasks {
            task.subtasks = subtasks;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    #[test]
    fn touch_never_precedes_creation() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let mut task = Task::from_draft(TaskDraft::new("clock skew"), now);

        task.touch(now - Duration::hours(1));
        assert_eq!(task.updated_at, task.created_at);

        task.touch(now + Duration::minutes(5));
        assert_eq!(task.updated_at, now + Duration::minutes(5));
    }

    #[test]
    fn patch_clears_optional_fields() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let mut draft = TaskDraft::new("with extras");
        draft.description = Some("notes".to_string());
        draft.due_date = NaiveDate::from_ymd_opt(2026, 3, 4);
        let mut task = Task::from_draft(draft, now);

        TaskPatch {
            description: Some(None),
            due_date: Some(None),
            priority: Some(Priority::High),
            ..TaskPatch::default()
        }
        .apply(&mut task);

        assert_eq!(task.description, None);
        assert_eq!(task.due_date, None);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.title, "with extras");
    }

    #[test]
    fn status_and_priority_parse_from_cli_spellings() {
        assert_eq!("in-progress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!("DONE".parse::<Status>().unwrap(), Status::Done);
        assert_eq!("h".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn serialized_task_uses_snake_case_status() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let mut task = Task::from_draft(TaskDraft::new("wire"), now);
        task.status = Status::InProgress;

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["priority"], "medium");
        assert!(json.get("due_date").is_none());
    }
}
