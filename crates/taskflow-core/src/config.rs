//! Settings: built-in defaults, then the rc file, then command-line
//! overrides. Values are checked here, once, so the rest of the crate only
//! sees typed settings.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, anyhow};
use tracing::{debug, info, trace, warn};

const RC_ENV_VAR: &str = "TASKFLOWRC";
const RC_FILE_NAME: &str = ".taskflowrc";
const DATA_DIR_NAME: &str = ".taskflow";

/// How snapshots reach the disk after a mutating command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersistMode {
    /// Hand the snapshot to the background writer and join it before exit.
    #[default]
    Background,
    /// Write on the calling thread.
    Sync,
}

impl FromStr for PersistMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "background" => Ok(PersistMode::Background),
            "sync" => Ok(PersistMode::Sync),
            other => Err(anyhow!("persist must be background or sync, got: {other}")),
        }
    }
}

impl fmt::Display for PersistMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PersistMode::Background => "background",
            PersistMode::Sync => "sync",
        })
    }
}

/// What a bare `taskflow` invocation runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DefaultCommand {
    #[default]
    List,
    Stats,
}

impl FromStr for DefaultCommand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "list" => Ok(DefaultCommand::List),
            "stats" => Ok(DefaultCommand::Stats),
            other => Err(anyhow!("default.command must be list or stats, got: {other}")),
        }
    }
}

impl fmt::Display for DefaultCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DefaultCommand::List => "list",
            DefaultCommand::Stats => "stats",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `None` means `~/.taskflow`.
    pub data_location: Option<PathBuf>,
    pub color: bool,
    pub default_command: DefaultCommand,
    pub persist: PersistMode,
    /// Every rc file read, includes after the file that named them.
    pub loaded_files: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_location: None,
            color: true,
            default_command: DefaultCommand::default(),
            persist: PersistMode::default(),
            loaded_files: Vec::new(),
        }
    }
}

impl Config {
    /// Builds the effective settings. `overrides` are `key=value` pairs from
    /// the command line; an `rc.` prefix on the key is ignored.
    #[tracing::instrument(skip_all)]
    pub fn load<I>(rc_override: Option<&Path>, overrides: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut reader = RcReader::default();
        match locate_rc(rc_override) {
            Some(path) => {
                info!(rc = %path.display(), "loading taskflowrc");
                reader.read(&path)?;
            }
            None => debug!("no taskflowrc found; using defaults"),
        }

        for (key, value) in overrides {
            let key = key.strip_prefix("rc.").unwrap_or(&key).to_string();
            debug!(key = %key, value = %value, "applying override");
            reader.settings.push(Setting {
                key,
                value,
                origin: "command line".to_string(),
            });
        }

        let mut cfg = Config {
            loaded_files: reader.loaded,
            ..Config::default()
        };
        for setting in reader.settings {
            cfg.set(&setting.key, &setting.value)
                .with_context(|| format!("invalid setting at {}", setting.origin))?;
        }
        Ok(cfg)
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "data.location" => {
                if value.is_empty() {
                    return Err(anyhow!("data.location must not be empty"));
                }
                self.data_location = Some(expand_tilde(value));
            }
            "color" => self.color = parse_switch(value)?,
            "default.command" => self.default_command = value.parse()?,
            "persist" => self.persist = value.parse()?,
            other => warn!(key = other, "unknown config key ignored"),
        }
        Ok(())
    }

    /// Effective settings in `key`, `value` form.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let data = self
            .data_location
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("~/{DATA_DIR_NAME}"));
        vec![
            ("color", if self.color { "on" } else { "off" }.to_string()),
            ("data.location", data),
            ("default.command", self.default_command.to_string()),
            ("persist", self.persist.to_string()),
        ]
    }

    /// `--data` wins over `data.location`, which wins over `~/.taskflow`.
    /// The directory is created when missing.
    #[tracing::instrument(skip(self))]
    pub fn data_dir(&self, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
        let dir = match (override_dir, &self.data_location) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(path)) => path.clone(),
            (None, None) => dirs::home_dir()
                .map(|home| home.join(DATA_DIR_NAME))
                .ok_or_else(|| anyhow!("cannot determine home directory; pass --data"))?,
        };

        if !dir.is_dir() {
            info!(dir = %dir.display(), "creating data directory");
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(dir)
    }
}

struct Setting {
    key: String,
    value: String,
    origin: String,
}

/// Collects settings from an rc file and everything it includes.
#[derive(Default)]
struct RcReader {
    settings: Vec<Setting>,
    loaded: Vec<PathBuf>,
    /// Files on the current include chain; seeing one again is a cycle.
    reading: BTreeSet<PathBuf>,
}

impl RcReader {
    fn read(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = fs::canonicalize(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if !self.reading.insert(path.clone()) {
            return Err(anyhow!("include cycle at {}", path.display()));
        }

        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        self.loaded.push(path.clone());
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.split_once('#').map_or(raw, |(before, _)| before).trim();
            if line.is_empty() {
                continue;
            }
            let origin = format!("{}:{}", path.display(), idx + 1);

            if let Some(target) = line.strip_prefix("include ") {
                let target = target.trim();
                if target.is_empty() {
                    return Err(anyhow!("{origin}: include needs a path"));
                }
                let included = base.join(expand_tilde(target));
                if !included.exists() {
                    warn!(include = %included.display(), "include file does not exist; skipping");
                    continue;
                }
                self.read(&included)
                    .with_context(|| format!("included from {origin}"))?;
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| anyhow!("{origin}: expected key = value, got: {raw}"))?;
            trace!(key = key.trim(), value = value.trim(), "read setting");
            self.settings.push(Setting {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
                origin,
            });
        }

        self.reading.remove(&path);
        Ok(())
    }
}

/// `--taskflowrc`, then `$TASKFLOWRC` (`/dev/null` turns the rc file off),
/// then `~/.taskflowrc` when it exists.
fn locate_rc(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.to_path_buf());
    }
    if let Ok(value) = std::env::var(RC_ENV_VAR) {
        return (!value.is_empty() && value != "/dev/null").then(|| PathBuf::from(value));
    }
    dirs::home_dir()
        .map(|home| home.join(RC_FILE_NAME))
        .filter(|path| path.is_file())
}

fn expand_tilde(raw: &str) -> PathBuf {
    match (raw.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

fn parse_switch(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" | "1" => Ok(true),
        "off" | "no" | "false" | "0" => Ok(false),
        other => Err(anyhow!("expected on or off, got: {other}")),
    }
}
