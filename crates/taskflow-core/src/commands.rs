use std::collections::BTreeSet;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Local, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::catalog::{Catalog, CatalogEntry, Group, Tag};
use crate::cli::{AddArgs, CatalogCommand, Command, EditArgs, FilterArgs, SubtaskCommand};
use crate::config::{Config, PersistMode};
use crate::datastore::{DataStore, Persister, Snapshot};
use crate::datetime::parse_due_date;
use crate::render::{Lookup, Renderer, short_id};
use crate::state::{Action, AppState, Dispatched};
use crate::stats::Stats;
use crate::store::resolve_id_prefix;
use crate::task::{Subtask, TaskDraft, TaskPatch};
use crate::ui::{FilterPatch, ViewMode};
use crate::view::{board_columns, group_sections};

/// Loads the snapshot, runs `command` against it and persists the result
/// when anything changed.
#[instrument(skip(store, cfg, renderer, command))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let today = Local::now().date_naive();
    let mutates = command.mutates();

    let mut state = store.load();
    let before = state.revision();
    debug!(?command, "dispatching command");

    execute(&mut state, cfg, renderer, command, now, today)?;

    if state.revision() == before {
        if mutates {
            debug!("nothing changed; snapshot not written");
        }
        return Ok(());
    }
    persist(store, cfg, &state)
}

#[instrument(skip(store, cfg, state))]
fn persist(store: &DataStore, cfg: &Config, state: &AppState) -> anyhow::Result<()> {
    let snapshot = Snapshot::of(state);
    match cfg.persist {
        PersistMode::Background => {
            let persister = Persister::spawn(store.clone())?;
            persister.submit(snapshot);
            persister.finish()
        }
        PersistMode::Sync => store.save(&snapshot),
    }
}

/// Runs one command against an in-memory state.
pub fn execute(
    state: &mut AppState,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    match command {
        Command::Add(args) => cmd_add(state, renderer, args, now, today),
        Command::Edit(args) => cmd_edit(state, renderer, args, now, today),
        Command::Move { task, status } => {
            let id = resolve_task(state, &task)?;
            let patch = TaskPatch {
                status: Some(status),
                ..TaskPatch::default()
            };
            let result = state.dispatch(Action::UpdateTask { id, patch }, now);
            report(renderer, result, &format!("Moved task {} to {}.", short_id(id), status.label()))
        }
        Command::Delete { task } => {
            let id = resolve_task(state, &task)?;
            let result = state.dispatch(Action::DeleteTask(id), now);
            report(renderer, result, &format!("Deleted task {}.", short_id(id)))
        }
        Command::Open { task } => {
            let id = resolve_task(state, &task)?;
            state.dispatch(Action::SetEditingTaskId(Some(id)), now);
            let lookup = lookup(state, today);
            match state.tasks().get(id) {
                Some(task) => renderer.print_task_info(task, &lookup),
                None => Err(anyhow!("task {} vanished", short_id(id))),
            }
        }
        Command::Close => {
            if state.ui().editing_task_id.is_none() {
                return renderer.line("No task is open.");
            }
            state.dispatch(Action::SetEditingTaskId(None), now);
            renderer.line("Closed the open task.")
        }
        Command::Subtask(sub) => cmd_subtask(state, renderer, sub, now),
        Command::Group(sub) => cmd_catalog::<Group>(state, renderer, sub, now),
        Command::Tag(sub) => cmd_catalog::<Tag>(state, renderer, sub, now),
        Command::View { mode } => {
            state.dispatch(Action::SetViewMode(mode), now);
            renderer.line(&format!("View set to {mode}."))
        }
        Command::Sort { field } => {
            state.dispatch(Action::SetSortField(field), now);
            renderer.line(&format!(
                "Sorting by {} ({}).",
                state.ui().sort_field, state.ui().sort_direction
            ))
        }
        Command::Filter(args) => cmd_filter(state, renderer, args, now),
        Command::ClearFilters => {
            state.dispatch(Action::ClearFilters, now);
            renderer.line("Filters cleared.")
        }
        Command::ToggleTag { tag } => {
            let tag = state
                .tags()
                .resolve(&tag)
                .cloned()
                .ok_or_else(|| anyhow!("no tag matches '{tag}'"))?;
            state.dispatch(Action::ToggleTagFilter(tag.id), now);
            let verb = if state.ui().filters.tag_ids.contains(&tag.id) {
                "Selected"
            } else {
                "Deselected"
            };
            renderer.line(&format!("{verb} tag #{}.", tag.name))
        }
        Command::Sidebar => {
            state.dispatch(Action::ToggleSidebar, now);
            renderer.line(&format!("Sidebar {}.", on_off(state.ui().sidebar_open)))
        }
        Command::DarkMode => {
            state.dispatch(Action::ToggleDarkMode, now);
            renderer.line(&format!("Dark mode {}.", on_off(state.ui().dark_mode)))
        }
        Command::List { view } => cmd_list(state, renderer, view, today),
        Command::Show { task } => {
            let id = resolve_task(state, &task)?;
            let lookup = lookup(state, today);
            match state.tasks().get(id) {
                Some(task) => renderer.print_task_info(task, &lookup),
                None => Err(anyhow!("task {} vanished", short_id(id))),
            }
        }
        Command::Stats => {
            let stats = Stats::compute(state.tasks().as_slice(), today);
            renderer.print_stats(&stats)
        }
        Command::Export => {
            let json = serde_json::to_string_pretty(&Snapshot::of(state))
                .context("failed to serialize snapshot")?;
            renderer.line(&json)
        }
        Command::Config => {
            for (key, value) in cfg.entries() {
                renderer.line(&format!("{key}={value}"))?;
            }
            Ok(())
        }
    }
}

#[instrument(skip(state, renderer, args, now, today))]
fn cmd_add(
    state: &mut AppState,
    renderer: &mut Renderer,
    args: AddArgs,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command add");

    let mut draft = TaskDraft::new(required_title(&args.title.join(" "))?);
    draft.description = args.description.as_deref().and_then(optional_text);
    draft.status = args.status;
    draft.priority = args.priority;
    draft.group_id = args
        .group
        .as_deref()
        .map(|token| resolve_group(state, token))
        .transpose()?;
    draft.tag_ids = resolve_tag_set(state, &args.tags)?;
    draft.due_date = args
        .due
        .as_deref()
        .map(|expr| parse_due_date(expr, today))
        .transpose()?;

    let subtasks: Vec<Subtask> = args
        .subtasks
        .iter()
        .filter_map(|title| optional_text(title))
        .map(Subtask::new)
        .collect();
    if !subtasks.is_empty() {
        draft.subtasks = Some(subtasks);
    }

    let result = state.dispatch(Action::AddTask(draft), now);
    let id = result
        .created
        .ok_or_else(|| anyhow!("add did not report a task id"))?;
    renderer.line(&format!("Created task {}.", short_id(id)))
}

#[instrument(skip(state, renderer, args, now, today))]
fn cmd_edit(
    state: &mut AppState,
    renderer: &mut Renderer,
    args: EditArgs,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command edit");

    let id = resolve_task(state, &args.task)?;
    let mut patch = TaskPatch {
        status: args.status,
        priority: args.priority,
        ..TaskPatch::default()
    };

    if let Some(title) = &args.title {
        patch.title = Some(required_title(title)?);
    }
    if args.no_description {
        patch.description = Some(None);
    } else if let Some(description) = &args.description {
        patch.description = Some(optional_text(description));
    }
    if args.no_group {
        patch.group_id = Some(None);
    } else if let Some(group) = &args.group {
        patch.group_id = Some(Some(resolve_group(state, group)?));
    }
    if args.no_tags {
        patch.tag_ids = Some(BTreeSet::new());
    } else if !args.tags.is_empty() {
        patch.tag_ids = Some(resolve_tag_set(state, &args.tags)?);
    }
    if args.no_due {
        patch.due_date = Some(None);
    } else if let Some(expr) = &args.due {
        patch.due_date = Some(Some(parse_due_date(expr, today)?));
    }

    if patch.is_empty() {
        return Err(anyhow!("edit needs at least one field to change"));
    }

    let result = state.dispatch(Action::UpdateTask { id, patch }, now);
    report(renderer, result, &format!("Modified task {}.", short_id(id)))
}

#[instrument(skip(state, renderer, command, now))]
fn cmd_subtask(
    state: &mut AppState,
    renderer: &mut Renderer,
    command: SubtaskCommand,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    match command {
        SubtaskCommand::Add { task, title } => {
            let task_id = resolve_task(state, &task)?;
            let title = optional_text(&title.join(" "))
                .ok_or_else(|| anyhow!("subtask title must not be empty"))?;
            let result = state.dispatch(Action::AddSubtask { task_id, title }, now);
            report(renderer, result, &format!("Added subtask to task {}.", short_id(task_id)))
        }
        SubtaskCommand::Toggle { task, subtask } => {
            let (task_id, subtask_id) = resolve_subtask(state, &task, &subtask)?;
            let result = state.dispatch(Action::ToggleSubtask { task_id, subtask_id }, now);
            let done = state
                .tasks()
                .get(task_id)
                .and_then(|t| t.subtasks.iter().find(|s| s.id == subtask_id))
                .is_some_and(|s| s.completed);
            let message = if done { "Subtask completed." } else { "Subtask reopened." };
            report(renderer, result, message)
        }
        SubtaskCommand::Delete { task, subtask } => {
            let (task_id, subtask_id) = resolve_subtask(state, &task, &subtask)?;
            let result = state.dispatch(Action::DeleteSubtask { task_id, subtask_id }, now);
            report(renderer, result, "Subtask deleted.")
        }
    }
}

/// Maps a catalog kind onto the actions and state slice that hold it.
trait CatalogSlice: CatalogEntry + 'static {
    fn catalog(state: &AppState) -> &Catalog<Self>;
    fn add_action(name: String, color: String) -> Action;
    fn update_action(entry: Self) -> Action;
    fn delete_action(id: Uuid) -> Action;
}

impl CatalogSlice for Group {
    fn catalog(state: &AppState) -> &Catalog<Self> {
        state.groups()
    }
    fn add_action(name: String, color: String) -> Action {
        Action::AddGroup { name, color }
    }
    fn update_action(entry: Self) -> Action {
        Action::UpdateGroup(entry)
    }
    fn delete_action(id: Uuid) -> Action {
        Action::DeleteGroup(id)
    }
}

impl CatalogSlice for Tag {
    fn catalog(state: &AppState) -> &Catalog<Self> {
        state.tags()
    }
    fn add_action(name: String, color: String) -> Action {
        Action::AddTag { name, color }
    }
    fn update_action(entry: Self) -> Action {
        Action::UpdateTag(entry)
    }
    fn delete_action(id: Uuid) -> Action {
        Action::DeleteTag(id)
    }
}

#[instrument(skip(state, renderer, command, now), fields(kind = T::KIND))]
fn cmd_catalog<T: CatalogSlice>(
    state: &mut AppState,
    renderer: &mut Renderer,
    command: CatalogCommand,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let kind = T::KIND;
    match command {
        CatalogCommand::Add { name, color } => {
            let name =
                optional_text(&name).ok_or_else(|| anyhow!("{kind} name must not be empty"))?;
            let result = state.dispatch(T::add_action(name.clone(), color.trim().to_string()), now);
            let id = result
                .created
                .ok_or_else(|| anyhow!("add did not report a {kind} id"))?;
            renderer.line(&format!("Created {kind} {name} ({}).", short_id(id)))
        }
        CatalogCommand::Update { entry, name, color } => {
            let current = resolve_entry::<T>(state, &entry)?;
            if name.is_none() && color.is_none() {
                return Err(anyhow!("{kind} update needs --name or --color"));
            }
            let name = match name {
                Some(name) => optional_text(&name)
                    .ok_or_else(|| anyhow!("{kind} name must not be empty"))?,
                None => current.name().to_string(),
            };
            let color = color
                .map(|c| c.trim().to_string())
                .unwrap_or_else(|| current.color().to_string());
            let updated = T::new(current.id(), name.clone(), color);
            let result = state.dispatch(T::update_action(updated), now);
            report(renderer, result, &format!("Updated {kind} {name}."))
        }
        CatalogCommand::Delete { entry } => {
            let current = resolve_entry::<T>(state, &entry)?;
            let result = state.dispatch(T::delete_action(current.id()), now);
            report(renderer, result, &format!("Deleted {kind} {}.", current.name()))
        }
        CatalogCommand::List => {
            let entries = T::catalog(state).as_slice();
            if entries.is_empty() {
                return renderer.line(&format!("No {kind}s."));
            }
            renderer.print_catalog(entries, state.tasks().as_slice())
        }
    }
}

#[instrument(skip(state, renderer, args, now))]
fn cmd_filter(
    state: &mut AppState,
    renderer: &mut Renderer,
    args: FilterArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let mut patch = FilterPatch::default();

    if args.any_status {
        patch.status = Some(BTreeSet::new());
    } else if !args.status.is_empty() {
        patch.status = Some(args.status.iter().copied().collect());
    }
    if args.any_priority {
        patch.priority = Some(BTreeSet::new());
    } else if !args.priority.is_empty() {
        patch.priority = Some(args.priority.iter().copied().collect());
    }
    if args.any_group {
        patch.group_id = Some(None);
    } else if let Some(group) = &args.group {
        patch.group_id = Some(Some(resolve_group(state, group)?));
    }
    if args.any_tag {
        patch.tag_ids = Some(BTreeSet::new());
    } else if !args.tags.is_empty() {
        patch.tag_ids = Some(resolve_tag_set(state, &args.tags)?);
    }
    if let Some(search) = args.search {
        patch.search = Some(search);
    }

    if patch != FilterPatch::default() {
        state.dispatch(Action::SetFilters(patch), now);
    }
    describe_filters(state, renderer)
}

fn describe_filters(state: &AppState, renderer: &mut Renderer) -> anyhow::Result<()> {
    let filters = &state.ui().filters;
    if filters.is_empty() {
        return renderer.line("No filters active.");
    }

    let join = |items: Vec<String>| {
        if items.is_empty() {
            "any".to_string()
        } else {
            items.join(", ")
        }
    };
    let status = join(filters.status.iter().map(|s| s.as_str().to_string()).collect());
    let priority = join(filters.priority.iter().map(|p| p.as_str().to_string()).collect());
    let group = filters
        .group_id
        .map(|id| state.groups().get(id).map_or_else(|| short_id(id), |g| g.name.clone()))
        .unwrap_or_else(|| "any".to_string());
    let tags = join(
        filters
            .tag_ids
            .iter()
            .map(|id| state.tags().get(*id).map_or_else(|| short_id(*id), |t| t.name.clone()))
            .collect(),
    );

    renderer.line(&format!("status:   {status}"))?;
    renderer.line(&format!("priority: {priority}"))?;
    renderer.line(&format!("group:    {group}"))?;
    renderer.line(&format!("tags:     {tags}"))?;
    if !filters.search.is_empty() {
        renderer.line(&format!("search:   {}", filters.search))?;
    }
    Ok(())
}

#[instrument(skip(state, renderer, today))]
fn cmd_list(
    state: &AppState,
    renderer: &mut Renderer,
    view: Option<ViewMode>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let mode = view.unwrap_or(state.ui().view_mode);
    let visible = state.visible_tasks();
    let lookup = lookup(state, today);
    debug!(%mode, visible = visible.len(), total = state.tasks().len(), "rendering list");

    if mode == ViewMode::Tag {
        renderer.print_tag_bar(state.tags(), state.ui())?;
    }

    if visible.is_empty() && mode != ViewMode::Board {
        let hint = if state.ui().filters.is_empty() {
            "No tasks found. Create one with `taskflow add`."
        } else {
            "No tasks found. Try adjusting your filters."
        };
        return renderer.line(hint);
    }

    match mode {
        ViewMode::List | ViewMode::Tag => renderer.print_task_table(&visible, &lookup),
        ViewMode::Board => renderer.print_board(&board_columns(&visible), &lookup),
        ViewMode::Group => {
            let sections = group_sections(&visible, state.groups());
            renderer.print_group_sections(&sections, &lookup)
        }
    }
}

fn lookup(state: &AppState, today: NaiveDate) -> Lookup<'_> {
    Lookup {
        groups: state.groups(),
        tags: state.tags(),
        today,
    }
}

fn report(renderer: &mut Renderer, result: Dispatched, message: &str) -> anyhow::Result<()> {
    if result.outcome.applied() {
        renderer.line(message)
    } else {
        warn!("target disappeared before the action ran");
        renderer.line("Nothing changed: target not found.")
    }
}

fn resolve_task(state: &AppState, token: &str) -> anyhow::Result<Uuid> {
    state
        .tasks()
        .resolve_prefix(token.trim())
        .map(|task| task.id)
        .ok_or_else(|| anyhow!("no task matches '{token}'"))
}

/// `token` is a 1-based position within the task or a subtask id prefix.
fn resolve_subtask(state: &AppState, task: &str, token: &str) -> anyhow::Result<(Uuid, Uuid)> {
    let task_id = resolve_task(state, task)?;
    let task = state
        .tasks()
        .get(task_id)
        .ok_or_else(|| anyhow!("no task matches '{task}'"))?;

    // All-digit tokens are positions, never id prefixes.
    let subtask = match token.trim().parse::<usize>() {
        Ok(position) => position.checked_sub(1).and_then(|idx| task.subtasks.get(idx)),
        Err(_) => resolve_id_prefix(task.subtasks.iter(), token.trim(), |s: &Subtask| s.id),
    }
    .ok_or_else(|| anyhow!("task {} has no subtask '{token}'", short_id(task_id)))?;

    Ok((task_id, subtask.id))
}

fn resolve_group(state: &AppState, token: &str) -> anyhow::Result<Uuid> {
    state
        .groups()
        .resolve(token)
        .map(|g| g.id)
        .ok_or_else(|| anyhow!("no group matches '{token}'"))
}

fn resolve_tag_set(state: &AppState, tokens: &[String]) -> anyhow::Result<BTreeSet<Uuid>> {
    tokens
        .iter()
        .map(|token| {
            state
                .tags()
                .resolve(token)
                .map(|t| t.id)
                .ok_or_else(|| anyhow!("no tag matches '{token}'"))
        })
        .collect()
}

fn resolve_entry<T: CatalogSlice>(state: &AppState, token: &str) -> anyhow::Result<T> {
    T::catalog(state)
        .resolve(token)
        .cloned()
        .ok_or_else(|| anyhow!("no {} matches '{token}'", T::KIND))
}

fn required_title(raw: &str) -> anyhow::Result<String> {
    optional_text(raw).ok_or_else(|| anyhow!("task title must not be empty"))
}

/// Trimmed text, or `None` when nothing is left.
fn optional_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use chrono::TimeZone;
    use clap::Parser;
    use parking_lot::Mutex;
    use tempfile::tempdir;

    use super::*;
    use crate::cli::GlobalCli;
    use crate::task::{Priority, Status};
    use crate::ui::{SortDirection, SortField};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn take(&self) -> String {
            let bytes = std::mem::take(&mut *self.0.lock());
            String::from_utf8(bytes).expect("utf8 output")
        }
    }

    struct Harness {
        cfg: Config,
        state: AppState,
        out: SharedBuf,
        renderer: Renderer,
    }

    impl Harness {
        fn new() -> Self {
            let out = SharedBuf::default();
            let renderer = Renderer::with_writer(Box::new(out.clone()));
            Self {
                cfg: Config::default(),
                state: AppState::new(),
                out,
                renderer,
            }
        }

        fn run(&mut self, args: &[&str]) -> anyhow::Result<String> {
            let mut argv = vec!["taskflow"];
            argv.extend_from_slice(args);
            let cli = GlobalCli::try_parse_from(argv)?;
            let command = cli.command.ok_or_else(|| anyhow!("no command"))?;
            execute(
                &mut self.state,
                &self.cfg,
                &mut self.renderer,
                command,
                Utc.with_ymd_and_hms(2026, 2, 16, 9, 0, 0).unwrap(),
                NaiveDate::from_ymd_opt(2026, 2, 16).unwrap(),
            )?;
            Ok(self.out.take())
        }

        fn only_task_id(&self) -> String {
            assert_eq!(self.state.tasks().len(), 1);
            self.state.tasks().as_slice()[0].id.to_string()
        }
    }

    #[test]
    fn add_trims_and_resolves_references() {
        let mut h = Harness::new();
        let out = h
            .run(&[
                "add", "  Fix", "login  ", "-d", "   ", "-p", "high", "-g", "work", "-t", "bug",
                "--due", "tomorrow", "--subtask", "repro", "--subtask", " ",
            ])
            .expect("add");
        assert!(out.starts_with("Created task "));

        let task = &h.state.tasks().as_slice()[0];
        assert_eq!(task.title, "Fix login");
        assert_eq!(task.description, None);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.group_id, h.state.groups().find_by_name("Work").map(|g| g.id));
        assert_eq!(task.tag_ids.len(), 1);
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2026, 2, 17));
        assert_eq!(task.subtasks.len(), 1);
        assert_eq!(task.subtasks[0].title, "repro");
    }

    #[test]
    fn blank_title_is_rejected_without_touching_state() {
        let mut h = Harness::new();
        assert!(h.run(&["add", "   "]).is_err());
        assert!(h.state.tasks().is_empty());
        assert_eq!(h.state.revision(), 0);
    }

    #[test]
    fn unknown_references_are_errors() {
        let mut h = Harness::new();
        assert!(h.run(&["add", "x", "-g", "Nowhere"]).is_err());
        assert!(h.run(&["delete", "deadbeef"]).is_err());
        assert!(h.state.tasks().is_empty());
    }

    #[test]
    fn edit_clears_and_replaces_fields() {
        let mut h = Harness::new();
        h.run(&["add", "Plan", "trip", "-d", "notes", "-g", "Personal", "--due", "2026-03-01"])
            .expect("add");
        let id = h.only_task_id();

        h.run(&[
            "edit",
            &id[..8],
            "--no-description",
            "--no-group",
            "--no-due",
            "-s",
            "in-progress",
        ])
        .expect("edit");
        let task = &h.state.tasks().as_slice()[0];
        assert_eq!(task.description, None);
        assert_eq!(task.group_id, None);
        assert_eq!(task.due_date, None);
        assert_eq!(task.status, Status::InProgress);

        assert!(h.run(&["edit", &id]).is_err());
    }

    #[test]
    fn subtasks_by_position() {
        let mut h = Harness::new();
        h.run(&["add", "Parent"]).expect("add");
        let id = h.only_task_id();
        h.run(&["subtask", "add", &id, "first"]).expect("sub 1");
        h.run(&["subtask", "add", &id, "second"]).expect("sub 2");

        let out = h.run(&["subtask", "toggle", &id, "2"]).expect("toggle");
        assert_eq!(out.trim(), "Subtask completed.");
        let task = &h.state.tasks().as_slice()[0];
        assert!(!task.subtasks[0].completed);
        assert!(task.subtasks[1].completed);

        h.run(&["subtask", "delete", &id, "1"]).expect("delete");
        let task = &h.state.tasks().as_slice()[0];
        assert_eq!(task.subtasks.len(), 1);
        assert_eq!(task.subtasks[0].title, "second");

        assert!(h.run(&["subtask", "toggle", &id, "7"]).is_err());
    }

    #[test]
    fn catalog_commands_round_trip() {
        let mut h = Harness::new();
        h.run(&["group", "add", "Errands", "-c", "#123456"]).expect("add group");
        assert_eq!(h.state.groups().len(), 4);

        h.run(&["group", "update", "errands", "-n", "Chores"]).expect("rename");
        let chores = h.state.groups().find_by_name("Chores").expect("renamed");
        assert_eq!(chores.color, "#123456");

        h.run(&["tag", "delete", "Bug"]).expect("delete tag");
        assert_eq!(h.state.tags().len(), 2);

        let out = h.run(&["group", "list"]).expect("list");
        assert!(out.contains("Chores"));
        assert!(out.contains("Personal"));
    }

    #[test]
    fn sort_and_filter_drive_the_list() {
        let mut h = Harness::new();
        h.run(&["add", "Buy", "groceries"]).expect("add");
        h.run(&["add", "Read", "a", "book", "-d", "novel"]).expect("add");

        h.run(&["sort", "title"]).expect("sort");
        assert_eq!(h.state.ui().sort_field, SortField::Title);
        assert_eq!(h.state.ui().sort_direction, SortDirection::Desc);
        h.run(&["sort", "title"]).expect("sort again");
        assert_eq!(h.state.ui().sort_direction, SortDirection::Asc);

        let out = h.run(&["list"]).expect("list");
        let buy = out.find("Buy groceries").expect("buy listed");
        let read = out.find("Read a book").expect("read listed");
        assert!(buy < read);

        h.run(&["filter", "--search", "BOOK"]).expect("filter");
        let out = h.run(&["list"]).expect("filtered list");
        assert!(out.contains("Read a book"));
        assert!(!out.contains("Buy groceries"));

        h.run(&["filter", "-s", "done"]).expect("status filter");
        let out = h.run(&["list"]).expect("empty list");
        assert!(out.contains("Try adjusting your filters"));
        assert_eq!(h.state.ui().filters.search, "BOOK");

        h.run(&["clear-filters"]).expect("clear");
        assert!(h.state.ui().filters.is_empty());
    }

    #[test]
    fn toggle_tag_selects_then_deselects() {
        let mut h = Harness::new();
        let out = h.run(&["toggle-tag", "urgent"]).expect("select");
        assert_eq!(out.trim(), "Selected tag #Urgent.");
        assert_eq!(h.state.ui().filters.tag_ids.len(), 1);
        let out = h.run(&["toggle-tag", "Urgent"]).expect("deselect");
        assert_eq!(out.trim(), "Deselected tag #Urgent.");
        assert!(h.state.ui().filters.tag_ids.is_empty());
    }

    #[test]
    fn board_view_lists_each_column() {
        let mut h = Harness::new();
        h.run(&["add", "Doing", "it", "-s", "in-progress"]).expect("add");
        let out = h.run(&["list", "--view", "board"]).expect("board");
        assert!(out.contains("To Do (0)"));
        assert!(out.contains("In Progress (1)"));
        assert!(out.contains("Done (0)"));
        assert_eq!(h.state.ui().view_mode, ViewMode::List);
    }

    #[test]
    fn open_and_close_track_single_editing_target() {
        let mut h = Harness::new();
        h.run(&["add", "One"]).expect("add");
        let id = h.only_task_id();
        h.run(&["open", &id]).expect("open");
        assert_eq!(h.state.editing_task().map(|t| t.id.to_string()), Some(id));
        h.run(&["close"]).expect("close");
        assert!(h.state.ui().editing_task_id.is_none());
        assert_eq!(h.run(&["close"]).expect("close twice").trim(), "No task is open.");
    }

    #[test]
    fn config_prints_effective_settings() {
        let mut h = Harness::new();
        h.cfg.persist = PersistMode::Sync;
        let out = h.run(&["config"]).expect("config");
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines.contains(&"persist=sync"), "{out}");
        assert!(lines.contains(&"default.command=list"), "{out}");
        assert!(lines.contains(&"color=on"), "{out}");
    }

    #[test]
    fn dispatch_persists_only_when_state_changes() {
        let temp = tempdir().expect("tempdir");
        let cfg = Config {
            persist: PersistMode::Sync,
            ..Config::default()
        };
        let store = DataStore::open(&temp.path().join("data")).expect("open");
        let mut renderer = Renderer::with_writer(Box::new(SharedBuf::default()));

        dispatch(&store, &cfg, &mut renderer, Command::Stats).expect("stats");
        assert!(!store.snapshot_path.exists());

        let cli = GlobalCli::try_parse_from(["taskflow", "add", "Persist", "me"]).expect("parse");
        let command = cli.command.expect("command");
        dispatch(&store, &cfg, &mut renderer, command).expect("add");
        assert!(store.snapshot_path.exists());

        let loaded = store.load();
        assert_eq!(loaded.tasks().len(), 1);
        assert_eq!(loaded.tasks().as_slice()[0].title, "Persist me");
    }
}
