//! Record store: the concurrent identity -> record mapping and its snapshot file
//!
//! All reads and writes go through one readers-writer lock guarding both the
//! mapping and the dirty flag. The snapshot file is a JSON document holding
//! every record sorted by identity; each save writes a sibling temporary
//! file and renames it over the old snapshot.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use url::Url;

use crate::error::{Result, ScanError};
use crate::models::Record;

/// A deferred persist action handed to a background executor
pub type PersistJob = Box<dyn FnOnce() + Send + 'static>;

/// Executor receiving persist jobs (fire-and-forget)
pub type PersistExecutor = Arc<dyn Fn(PersistJob) + Send + Sync>;

/// How auto-persist runs after a mutation
#[derive(Clone, Default)]
pub enum PersistMode {
    /// Save on the mutating thread, after the write lock is released
    #[default]
    Inline,
    /// Hand the save to an executor and return immediately
    Background(PersistExecutor),
}

impl PersistMode {
    /// Background persistence on the rayon global pool
    pub fn rayon() -> Self {
        PersistMode::Background(Arc::new(|job: PersistJob| rayon::spawn(job)))
    }
}

impl std::fmt::Debug for PersistMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistMode::Inline => write!(f, "Inline"),
            PersistMode::Background(_) => write!(f, "Background"),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    records: BTreeMap<PathBuf, Record>,
    dirty: bool,
}

#[derive(Debug)]
struct StoreInner {
    path: PathBuf,
    state: RwLock<StoreState>,
    auto_persist: AtomicBool,
    mode: PersistMode,
}

/// Concurrent record store shared by every scan task.
///
/// Cloning is cheap and yields a handle to the same store.
#[derive(Debug, Clone)]
pub struct RecordStore {
    inner: Arc<StoreInner>,
}

impl RecordStore {
    /// Create an empty store persisting to `path`, saving inline on auto-persist
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_persist_mode(path, PersistMode::Inline)
    }

    /// Create an empty store with an explicit auto-persist strategy
    pub fn with_persist_mode(path: impl Into<PathBuf>, mode: PersistMode) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                path: path.into(),
                state: RwLock::new(StoreState::default()),
                auto_persist: AtomicBool::new(false),
                mode,
            }),
        }
    }

    /// Location of the snapshot file
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn contains(&self, identity: &Path) -> bool {
        self.inner.read().records.contains_key(identity)
    }

    /// Copy of the record for `identity`
    pub fn get(&self, identity: &Path) -> Option<Record> {
        self.inner.read().records.get(identity).cloned()
    }

    /// Project a field out of the record without cloning it whole
    pub fn get_with<R>(&self, identity: &Path, f: impl FnOnce(&Record) -> R) -> Option<R> {
        self.inner.read().records.get(identity).map(f)
    }

    /// Insert or replace the record for `identity`.
    ///
    /// Returns whether the mapping changed. A value-equal record leaves the
    /// store and its dirty flag untouched.
    pub fn put(
        &self,
        identity: PathBuf,
        modified_at: Option<DateTime<Utc>>,
        stdout: impl Into<String>,
        errout: impl Into<String>,
    ) -> bool {
        let candidate = Record::new(identity, modified_at, stdout, errout);
        let changed = {
            let mut state = self.inner.write();
            let changed = state.records.get(&candidate.identity) != Some(&candidate);
            if changed {
                state.records.insert(candidate.identity.clone(), candidate);
                state.dirty = true;
            }
            changed
        };
        self.after_mutation();
        changed
    }

    /// Remove the record for `identity`; returns whether one existed
    pub fn remove(&self, identity: &Path) -> bool {
        let removed = {
            let mut state = self.inner.write();
            let removed = state.records.remove(identity).is_some();
            state.dirty |= removed;
            removed
        };
        self.after_mutation();
        removed
    }

    /// Snapshot of all identities, ascending
    pub fn list_identities(&self) -> Vec<PathBuf> {
        self.inner.read().records.keys().cloned().collect()
    }

    /// Snapshot of all records, ascending by identity
    pub fn records(&self) -> Vec<Record> {
        self.inner.read().records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.read().dirty
    }

    pub fn is_auto_persist(&self) -> bool {
        self.inner.auto_persist.load(Ordering::SeqCst)
    }

    /// Replace the mapping with the persisted snapshot and clear the dirty flag.
    ///
    /// A missing file is reported as a `NotFound` error. Entries without a
    /// usable `path` or `time` are skipped.
    pub fn load(&self) -> Result<()> {
        self.inner.load()
    }

    /// Write the full snapshot if the store is dirty
    pub fn save(&self) -> Result<()> {
        self.inner.save()
    }

    /// Toggle auto-persist; enabling it persists pending changes right away
    pub fn set_auto_persist(&self, enabled: bool) {
        self.inner.auto_persist.store(enabled, Ordering::SeqCst);
        self.after_mutation();
    }

    fn after_mutation(&self) {
        if !self.is_auto_persist() {
            return;
        }
        match &self.inner.mode {
            PersistMode::Inline => self.inner.save_logged(),
            PersistMode::Background(executor) => {
                let inner = Arc::clone(&self.inner);
                executor(Box::new(move || inner.save_logged()));
            }
        }
    }
}

impl StoreInner {
    // Poisoning is recovered: every critical section leaves the state whole.
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> Result<()> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| ScanError::io(&self.path, e))?;
        let document: DocumentIn = serde_json::from_str(&text)
            .map_err(|e| ScanError::malformed(&self.path, e.to_string()))?;

        let total = document.entries.len();
        let records: BTreeMap<PathBuf, Record> = document
            .entries
            .into_iter()
            .filter_map(parse_entry)
            .map(|record| (record.identity.clone(), record))
            .collect();

        log::debug!(
            "Loaded {} of {} entries from {:?}",
            records.len(),
            total,
            self.path
        );

        let mut state = self.write();
        state.records = records;
        state.dirty = false;
        Ok(())
    }

    fn save(&self) -> Result<()> {
        if !self.read().dirty {
            return Ok(());
        }

        let mut state = self.write();
        if !state.dirty {
            return Ok(());
        }

        let entries = state
            .records
            .values()
            .map(EntryOut::from_record)
            .collect::<Result<Vec<_>>>()?;
        let mut bytes = serde_json::to_vec_pretty(&DocumentOut { entries })?;
        bytes.push(b'\n');
        self.replace_file(&bytes)?;

        state.dirty = false;
        log::debug!("Saved {} records to {:?}", state.records.len(), self.path);
        Ok(())
    }

    /// Write `bytes` to a sibling temporary file, then rename it over the
    /// snapshot so readers never see a half-written document.
    fn replace_file(&self, bytes: &[u8]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| ScanError::io(dir, e))?;
        let written = file.write_all(bytes).and_then(|()| file.as_file().sync_all());
        written.map_err(|e| ScanError::io(file.path(), e))?;
        file.persist(&self.path).map_err(|e| ScanError::io(&self.path, e.error))?;
        Ok(())
    }

    fn save_logged(&self) {
        if let Err(e) = self.save() {
            log::error!("Auto-persist of {:?} failed: {}", self.path, e);
        }
    }
}

#[derive(Serialize)]
struct DocumentOut<'a> {
    entries: Vec<EntryOut<'a>>,
}

#[derive(Serialize)]
struct EntryOut<'a> {
    path: String,
    time: String,
    stdout: &'a str,
    errout: &'a str,
}

impl<'a> EntryOut<'a> {
    fn from_record(record: &'a Record) -> Result<Self> {
        let uri = Url::from_file_path(&record.identity)
            .map_err(|_| ScanError::invalid_path(&record.identity))?;
        Ok(Self {
            path: uri.to_string(),
            time: record
                .modified_at
                .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                .unwrap_or_default(),
            stdout: &record.probe_stdout,
            errout: &record.probe_stderr,
        })
    }
}

#[derive(Deserialize)]
struct DocumentIn {
    #[serde(default)]
    entries: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct EntryIn {
    path: Option<String>,
    time: Option<String>,
    stdout: Option<String>,
    errout: Option<String>,
}

/// Turn one persisted entry into a record; `None` marks it malformed
fn parse_entry(value: serde_json::Value) -> Option<Record> {
    let entry: EntryIn = serde_json::from_value(value).ok()?;
    let identity = Url::parse(&entry.path?).ok()?.to_file_path().ok()?;
    let modified_at = match entry.time.as_deref() {
        None | Some("") => None,
        Some(time) => Some(DateTime::parse_from_rfc3339(time).ok()?.with_timezone(&Utc)),
    };
    Some(Record::new(
        identity,
        modified_at,
        entry.stdout.unwrap_or_default(),
        entry.errout.unwrap_or_default(),
    ))
}
