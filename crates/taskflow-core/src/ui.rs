use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::task::{Priority, Status};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    List,
    Board,
    Group,
    Tag,
}

impl FromStr for ViewMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "list" => Ok(ViewMode::List),
            "board" | "kanban" => Ok(ViewMode::Board),
            "group" | "groups" => Ok(ViewMode::Group),
            "tag" | "tags" => Ok(ViewMode::Tag),
            other => Err(anyhow!("unknown view mode: {other}")),
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViewMode::List => "list",
            ViewMode::Board => "board",
            ViewMode::Group => "group",
            ViewMode::Tag => "tag",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Priority,
    DueDate,
    Title,
}

impl FromStr for SortField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "created" | "created_at" => Ok(SortField::CreatedAt),
            "updated" | "updated_at" => Ok(SortField::UpdatedAt),
            "priority" => Ok(SortField::Priority),
            "due" | "due_date" => Ok(SortField::DueDate),
            "title" => Ok(SortField::Title),
            other => Err(anyhow!("unknown sort field: {other}")),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Priority => "priority",
            SortField::DueDate => "due_date",
            SortField::Title => "title",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Filters {
    #[serde(default)]
    pub status: BTreeSet<Status>,
    #[serde(default)]
    pub priority: BTreeSet<Priority>,
    #[serde(default)]
    pub group_id: Option<Uuid>,
    #[serde(default)]
    pub tag_ids: BTreeSet<Uuid>,
    #[serde(default)]
    pub search: String,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        *self == Filters::default()
    }
}

/// Shallow filter merge: only the keys that are `Some` replace prior values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPatch {
    pub status: Option<BTreeSet<Status>>,
    pub priority: Option<BTreeSet<Priority>>,
    pub group_id: Option<Option<Uuid>>,
    pub tag_ids: Option<BTreeSet<Uuid>>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UiState {
    #[serde(default)]
    pub view_mode: ViewMode,
    #[serde(default)]
    pub sort_field: SortField,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub sidebar_open: bool,
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default)]
    pub editing_task_id: Option<Uuid>,
}

impl UiState {
    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
    }

    /// Same field twice reverses the order; a new field always starts descending.
    #[tracing::instrument(skip(self))]
    pub fn set_sort_field(&mut self, field: SortField) {
        if self.sort_field == field {
            self.sort_direction = self.sort_direction.flipped();
        } else {
            self.sort_field = field;
            self.sort_direction = SortDirection::Desc;
        }
        debug!(field = %self.sort_field, direction = %self.sort_direction, "sort changed");
    }

    #[tracing::instrument(skip(self))]
    pub fn set_filters(&mut self, patch: FilterPatch) {
        let filters = &mut self.filters;
        if let Some(status) = patch.status {
            filters.status = status;
        }
        if let Some(priority) = patch.priority {
            filters.priority = priority;
        }
        if let Some(group_id) = patch.group_id {
            filters.group_id = group_id;
        }
        if let Some(tag_ids) = patch.tag_ids {
            filters.tag_ids = tag_ids;
        }
        if let Some(search) = patch.search {
            filters.search = search;
        }
    }

    pub fn clear_filters(&mut self) {
        self.filters = Filters::default();
    }

    /// Tag-view chip behavior: select the tag, or deselect it when already active.
    pub fn toggle_tag_filter(&mut self, tag_id: Uuid) {
        let mut tag_ids = self.filters.tag_ids.clone();
        if !tag_ids.remove(&tag_id) {
            tag_ids.insert(tag_id);
        }
        self.set_filters(FilterPatch {
            tag_ids: Some(tag_ids),
            ..FilterPatch::default()
        });
    }

    pub fn toggle_sidebar(&mut self) {
        self.sidebar_open = !self.sidebar_open;
    }

    pub fn toggle_dark_mode(&mut self) {
        self.dark_mode = !self.dark_mode;
    }

    pub fn set_editing_task_id(&mut self, id: Option<Uuid>) {
        self.editing_task_id = id;
    }
}
