use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, anyhow};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

/// Namespace key of the persisted blob; also its file stem.
pub const SNAPSHOT_KEY: &str = "taskflow";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    #[serde(flatten)]
    pub state: AppState,
}

impl Snapshot {
    pub fn of(state: &AppState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            state: state.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub snapshot_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let snapshot_path = data_dir.join(format!("{SNAPSHOT_KEY}.json"));

        info!(
            data_dir = %data_dir.display(),
            snapshot = %snapshot_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            snapshot_path,
        })
    }

    /// Rehydrates the last saved state. A missing, unreadable, malformed or
    /// unknown-version blob yields the seeded default state instead of an error.
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> AppState {
        let raw = match fs::read_to_string(&self.snapshot_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no snapshot yet; starting from defaults");
                return AppState::default();
            }
            Err(err) => {
                warn!(
                    error = %err,
                    file = %self.snapshot_path.display(),
                    "snapshot unreadable; using defaults"
                );
                return AppState::default();
            }
        };

        match decode_snapshot(&raw) {
            Ok(state) => {
                debug!(tasks = state.tasks().len(), "snapshot rehydrated");
                state
            }
            Err(err) => {
                warn!(
                    error = %format!("{err:#}"),
                    file = %self.snapshot_path.display(),
                    "snapshot rejected; using defaults"
                );
                AppState::default()
            }
        }
    }

    #[tracing::instrument(skip(self, snapshot))]
    pub fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        save_json_atomic(&self.snapshot_path, snapshot)
            .with_context(|| format!("failed to save {}", self.snapshot_path.display()))
    }
}

fn decode_snapshot(raw: &str) -> anyhow::Result<AppState> {
    let value: serde_json::Value = serde_json::from_str(raw).context("snapshot is not valid JSON")?;
    let version = value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| anyhow!("snapshot has no version"))?;
    if version != u64::from(SNAPSHOT_VERSION) {
        return Err(anyhow!("unsupported snapshot version {version}"));
    }
    let snapshot: Snapshot =
        serde_json::from_value(value).context("snapshot does not match schema")?;
    Ok(snapshot.state)
}

#[tracing::instrument(skip(path, snapshot))]
fn save_json_atomic(path: &Path, snapshot: &Snapshot) -> anyhow::Result<()> {
    debug!(
        file = %path.display(),
        tasks = snapshot.state.tasks().len(),
        "saving snapshot atomically"
    );

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, snapshot)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[derive(Debug, Default)]
struct Slot {
    pending: Option<Snapshot>,
    writing: bool,
    shutdown: bool,
    written: u64,
    failures: u64,
}

#[derive(Debug, Default)]
struct Shared {
    slot: Mutex<Slot>,
    changed: Condvar,
}

/// Background snapshot writer.
///
/// `submit` never blocks on disk: it parks the snapshot in a single slot,
/// replacing any older one that has not been written yet, so the newest
/// committed state is always the one that ends up on disk.
#[derive(Debug)]
pub struct Persister {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Persister {
    pub fn spawn(store: DataStore) -> anyhow::Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("taskflow-persist".to_string())
            .spawn(move || write_loop(&store, &worker_shared))
            .context("failed to spawn persistence thread")?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    pub fn submit(&self, snapshot: Snapshot) {
        let mut slot = self.shared.slot.lock();
        if slot.pending.replace(snapshot).is_some() {
            debug!("superseded an unwritten snapshot");
        }
        self.shared.changed.notify_all();
    }

    /// Blocks until every submitted snapshot has been handled.
    pub fn flush(&self) {
        let mut slot = self.shared.slot.lock();
        while slot.pending.is_some() || slot.writing {
            self.shared.changed.wait(&mut slot);
        }
    }

    /// Number of snapshots actually written to disk.
    pub fn written(&self) -> u64 {
        self.shared.slot.lock().written
    }

    pub fn failures(&self) -> u64 {
        self.shared.slot.lock().failures
    }

    /// Flushes, stops the writer and joins it.
    pub fn finish(mut self) -> anyhow::Result<()> {
        self.shutdown_and_join()
    }

    fn shutdown_and_join(&mut self) -> anyhow::Result<()> {
        {
            let mut slot = self.shared.slot.lock();
            slot.shutdown = true;
            self.shared.changed.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow!("persistence thread panicked"))?;
        }
        let failures = self.failures();
        if failures > 0 {
            return Err(anyhow!("{failures} snapshot write(s) failed"));
        }
        Ok(())
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        if self.worker.is_some()
            && let Err(err) = self.shutdown_and_join()
        {
            error!(error = %format!("{err:#}"), "persister shut down with errors");
        }
    }
}

fn write_loop(store: &DataStore, shared: &Shared) {
    loop {
        let snapshot = {
            let mut slot = shared.slot.lock();
            while slot.pending.is_none() && !slot.shutdown {
                shared.changed.wait(&mut slot);
            }
            match slot.pending.take() {
                Some(snapshot) => {
                    slot.writing = true;
                    snapshot
                }
                None => return,
            }
        };

        let result = store.save(&snapshot);

        let mut slot = shared.slot.lock();
        slot.writing = false;
        match result {
            Ok(()) => slot.written += 1,
            Err(err) => {
                slot.failures += 1;
                error!(error = %format!("{err:#}"), "snapshot write failed");
            }
        }
        shared.changed.notify_all();
    }
}
