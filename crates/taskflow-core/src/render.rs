use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::catalog::{CatalogEntry, GroupStore, TagStore};
use crate::config::Config;
use crate::stats::Stats;
use crate::task::{Priority, Status, Task};
use crate::ui::UiState;
use crate::view::{BoardColumn, GroupSection, resolve_group, resolve_tags, subtask_progress};

/// Writes plain-text tables to a sink; stdout by default.
pub struct Renderer {
    color: bool,
    out: Box<dyn Write>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer").field("color", &self.color).finish()
    }
}

/// Read-only lookups a table needs to resolve task references.
pub struct Lookup<'a> {
    pub groups: &'a GroupStore,
    pub tags: &'a TagStore,
    pub today: NaiveDate,
}

impl Renderer {
    /// Stdout renderer; color needs both `color = on` and a terminal.
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.color && io::stdout().is_terminal(),
            out: Box::new(io::stdout()),
        }
    }

    /// Uncolored renderer over any writer.
    pub fn with_writer(out: Box<dyn Write>) -> Self {
        Self { color: false, out }
    }

    pub fn line(&mut self, text: &str) -> anyhow::Result<()> {
        writeln!(self.out, "{text}")?;
        Ok(())
    }

    #[tracing::instrument(skip(self, tasks, lookup))]
    pub fn print_task_table(&mut self, tasks: &[&Task], lookup: &Lookup<'_>) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Status".to_string(),
            "Pri".to_string(),
            "Due".to_string(),
            "Group".to_string(),
            "Title".to_string(),
            "Tags".to_string(),
            "Subtasks".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            rows.push(self.task_row(task, lookup));
        }

        write_table(&mut self.out, headers, rows)?;
        Ok(())
    }

    fn task_row(&self, task: &Task, lookup: &Lookup<'_>) -> Vec<String> {
        let id = self.paint(&short_id(task.id), "33");

        let due = task
            .due_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let due = match task.due_date {
            Some(date) if date < lookup.today && !task.is_done() => self.paint(&due, "31"),
            _ => due,
        };

        let priority = match task.priority {
            Priority::High => self.paint("H", "31"),
            Priority::Medium => "M".to_string(),
            Priority::Low => "L".to_string(),
        };

        let group = resolve_group(task, lookup.groups)
            .map(|g| g.name.clone())
            .unwrap_or_default();
        let tags = resolve_tags(task, lookup.tags)
            .iter()
            .map(|tag| format!("#{}", tag.name))
            .collect::<Vec<_>>()
            .join(" ");
        let subtasks = match subtask_progress(task) {
            (_, 0) => String::new(),
            (done, total) => format!("{done}/{total}"),
        };

        vec![
            id,
            task.status.to_string(),
            priority,
            due,
            group,
            task.title.clone(),
            tags,
            subtasks,
        ]
    }

    pub fn print_board(
        &mut self,
        columns: &[BoardColumn<'_>],
        lookup: &Lookup<'_>,
    ) -> anyhow::Result<()> {
        for column in columns {
            let heading = format!("{} ({})", column.status.label(), column.tasks.len());
            let heading = self.paint(&heading, "1");
            writeln!(self.out, "{heading}")?;
            if column.tasks.is_empty() {
                writeln!(self.out, "  (empty)")?;
            } else {
                self.print_task_table(&column.tasks, lookup)?;
            }
            writeln!(self.out)?;
        }
        Ok(())
    }

    pub fn print_group_sections(
        &mut self,
        sections: &[GroupSection<'_>],
        lookup: &Lookup<'_>,
    ) -> anyhow::Result<()> {
        for section in sections {
            let name = section
                .group
                .map(|g| g.name.clone())
                .unwrap_or_else(|| "Ungrouped".to_string());
            // Ungrouped is only shown when it has something in it.
            if section.group.is_none() && section.tasks.is_empty() {
                continue;
            }
            let heading = self.paint(&format!("{name} ({})", section.tasks.len()), "1");
            writeln!(self.out, "{heading}")?;
            if section.tasks.is_empty() {
                writeln!(self.out, "  No tasks in this group")?;
            } else {
                self.print_task_table(&section.tasks, lookup)?;
            }
            writeln!(self.out)?;
        }
        Ok(())
    }

    pub fn print_tag_bar(&mut self, tags: &TagStore, ui: &UiState) -> anyhow::Result<()> {
        let chips = tags
            .iter()
            .map(|tag| {
                if ui.filters.tag_ids.contains(&tag.id) {
                    self.paint(&format!("[#{}]", tag.name), "7")
                } else {
                    format!(" #{} ", tag.name)
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(self.out, "{chips}")?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task, lookup))]
    pub fn print_task_info(&mut self, task: &Task, lookup: &Lookup<'_>) -> anyhow::Result<()> {
        let out = &mut self.out;
        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        if let Some(description) = &task.description {
            writeln!(out, "description {description}")?;
        }
        writeln!(out, "status      {}", task.status.label())?;
        writeln!(out, "priority    {}", task.priority)?;
        writeln!(
            out,
            "group       {}",
            resolve_group(task, lookup.groups)
                .map(|g| g.name.as_str())
                .unwrap_or("-")
        )?;
        let tags = resolve_tags(task, lookup.tags)
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "tags        {tags}")?;
        if let Some(due) = task.due_date {
            writeln!(out, "due         {}", due.format("%Y-%m-%d"))?;
        }
        writeln!(out, "created     {}", task.created_at.to_rfc3339())?;
        writeln!(out, "updated     {}", task.updated_at.to_rfc3339())?;

        let (done, total) = subtask_progress(task);
        writeln!(out, "subtasks    {done}/{total}")?;
        for (idx, subtask) in task.subtasks.iter().enumerate() {
            let mark = if subtask.completed { "x" } else { " " };
            writeln!(out, "  {}. [{mark}] {} ({})", idx + 1, subtask.title, short_id(subtask.id))?;
        }
        Ok(())
    }

    pub fn print_catalog<T: CatalogEntry>(
        &mut self,
        entries: &[T],
        tasks: &[Task],
    ) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Color".to_string(),
            "Tasks".to_string(),
        ];
        let rows = entries
            .iter()
            .map(|entry| {
                let uses = tasks
                    .iter()
                    .filter(|t| t.group_id == Some(entry.id()) || t.has_tag(entry.id()))
                    .count();
                vec![
                    self.paint(&short_id(entry.id()), "33"),
                    entry.name().to_string(),
                    entry.color().to_string(),
                    uses.to_string(),
                ]
            })
            .collect();
        write_table(&mut self.out, headers, rows)?;
        Ok(())
    }

    pub fn print_stats(&mut self, stats: &Stats) -> anyhow::Result<()> {
        let out = &mut self.out;
        writeln!(out, "Total          {}", stats.total)?;
        writeln!(out, "{:<14} {}", Status::Todo.label(), stats.todo)?;
        writeln!(out, "{:<14} {}", Status::InProgress.label(), stats.in_progress)?;
        writeln!(out, "{:<14} {}", Status::Done.label(), stats.done)?;
        writeln!(out, "High Priority  {}", stats.high_priority)?;
        writeln!(out, "Overdue        {}", stats.overdue)?;
        if stats.total > 0 {
            writeln!(out, "Progress       {}%", stats.completion_rate)?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn short_id(id: uuid::Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

fn write_table<W: Write + ?Sized>(
    writer: &mut W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
