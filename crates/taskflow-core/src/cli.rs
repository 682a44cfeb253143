use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, DefaultCommand};
use crate::task::{Priority, Status};
use crate::ui::{SortField, ViewMode};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskflow",
    version,
    about = "Taskflow: tasks, subtasks, groups and tags from the terminal",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "taskflowrc", global = true)]
    pub taskflowrc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a task
    Add(AddArgs),
    /// Change fields of a task
    Edit(EditArgs),
    /// Move a task to another board column
    Move { task: String, status: Status },
    /// Delete a task
    Delete { task: String },
    /// Open a task for editing (at most one at a time)
    Open { task: String },
    /// Close the task open for editing
    Close,
    #[command(subcommand)]
    Subtask(SubtaskCommand),
    #[command(subcommand)]
    Group(CatalogCommand),
    #[command(subcommand)]
    Tag(CatalogCommand),
    /// Switch the layout used by `list`
    View { mode: ViewMode },
    /// Sort by a field; repeating the current field reverses the order
    Sort { field: SortField },
    /// Merge filter settings; unspecified filters keep their values
    Filter(FilterArgs),
    /// Reset every filter
    ClearFilters,
    /// Select or deselect a tag in the tag filter
    ToggleTag { tag: String },
    /// Toggle the sidebar flag
    Sidebar,
    /// Toggle dark mode
    DarkMode,
    /// Print the filtered, sorted tasks in the current layout
    List {
        #[arg(long)]
        view: Option<ViewMode>,
    },
    /// Print one task with its subtasks
    Show { task: String },
    /// Print dashboard counters
    Stats,
    /// Print the persisted snapshot as JSON
    Export,
    /// Print effective configuration
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,
    #[arg(short = 'd', long)]
    pub description: Option<String>,
    #[arg(short = 's', long, default_value = "todo")]
    pub status: Status,
    #[arg(short = 'p', long, default_value = "medium")]
    pub priority: Priority,
    #[arg(short = 'g', long)]
    pub group: Option<String>,
    #[arg(short = 't', long = "tag")]
    pub tags: Vec<String>,
    #[arg(long)]
    pub due: Option<String>,
    #[arg(long = "subtask")]
    pub subtasks: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub task: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(short = 'd', long, conflicts_with = "no_description")]
    pub description: Option<String>,
    #[arg(long)]
    pub no_description: bool,
    #[arg(short = 's', long)]
    pub status: Option<Status>,
    #[arg(short = 'p', long)]
    pub priority: Option<Priority>,
    #[arg(short = 'g', long, conflicts_with = "no_group")]
    pub group: Option<String>,
    #[arg(long)]
    pub no_group: bool,
    /// Replaces the task's tag set
    #[arg(short = 't', long = "tag", conflicts_with = "no_tags")]
    pub tags: Vec<String>,
    #[arg(long)]
    pub no_tags: bool,
    #[arg(long, conflicts_with = "no_due")]
    pub due: Option<String>,
    #[arg(long)]
    pub no_due: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubtaskCommand {
    /// Append a subtask
    Add {
        task: String,
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    /// Flip a subtask's completed flag (1-based position or id prefix)
    Toggle { task: String, subtask: String },
    /// Remove a subtask (1-based position or id prefix)
    Delete { task: String, subtask: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CatalogCommand {
    /// Create an entry
    Add {
        name: String,
        #[arg(short = 'c', long, default_value = "#64748b")]
        color: String,
    },
    /// Rename or recolor an entry
    #[command(alias = "rename")]
    Update {
        entry: String,
        #[arg(short = 'n', long)]
        name: Option<String>,
        #[arg(short = 'c', long)]
        color: Option<String>,
    },
    /// Delete an entry; tasks keep their now dangling references
    Delete {
        entry: String,
    },
    List,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[arg(short = 's', long = "status", conflicts_with = "any_status")]
    pub status: Vec<Status>,
    #[arg(long)]
    pub any_status: bool,
    #[arg(short = 'p', long = "priority", conflicts_with = "any_priority")]
    pub priority: Vec<Priority>,
    #[arg(long)]
    pub any_priority: bool,
    #[arg(short = 'g', long, conflicts_with = "any_group")]
    pub group: Option<String>,
    #[arg(long)]
    pub any_group: bool,
    #[arg(short = 't', long = "tag", conflicts_with = "any_tag")]
    pub tags: Vec<String>,
    #[arg(long)]
    pub any_tag: bool,
    #[arg(long)]
    pub search: Option<String>,
}

impl Command {
    /// The command run when none is given on the command line.
    pub fn from_default(cfg: &Config) -> Self {
        debug!(command = %cfg.default_command, "no explicit command, using default");
        match cfg.default_command {
            DefaultCommand::List => Command::List { view: None },
            DefaultCommand::Stats => Command::Stats,
        }
    }

    pub fn mutates(&self) -> bool {
        !matches!(
            self,
            Command::List { .. }
                | Command::Show { .. }
                | Command::Stats
                | Command::Export
                | Command::Config
                | Command::Group(CatalogCommand::List)
                | Command::Tag(CatalogCommand::List)
        )
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
