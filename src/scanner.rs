//! Scanner module - incremental fan-out over a directory tree
//!
//! Every directory becomes one task that lists its immediate entries and
//! fans out one task per entry on the rayon pool: files are classified
//! against the record store, subdirectories recurse. Results merge back up
//! the tree as [`OutcomeCounter`]s, so sibling order never matters.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::error::{Result, ScanError, ScanErrorKind};
use crate::models::{Outcome, OutcomeCounter};
use crate::probe::Prober;
use crate::store::RecordStore;

/// Everything a scan task needs, shared by reference across the task tree
#[derive(Clone, Copy)]
pub struct ScanContext<'a> {
    pub store: &'a RecordStore,
    pub prober: &'a dyn Prober,
    pub config: &'a ScanConfig,
}

impl<'a> ScanContext<'a> {
    pub fn new(store: &'a RecordStore, prober: &'a dyn Prober, config: &'a ScanConfig) -> Self {
        Self {
            store,
            prober,
            config,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Directory,
}

#[derive(Debug)]
struct ListedEntry {
    path: PathBuf,
    kind: EntryKind,
}

/// Scan `root` on the current rayon pool and return the merged tally
pub fn scan(root: &Path, ctx: &ScanContext<'_>) -> OutcomeCounter {
    log::info!("Scanning {:?}", root);
    let result = scan_directory(root, ctx);
    log::info!("Finished {:?}: {} entries classified", root, result.total());
    result
}

/// Scan `root` on a dedicated pool of `num_threads` workers (0 = hardware parallelism)
pub fn scan_with_threads(
    root: &Path,
    ctx: &ScanContext<'_>,
    num_threads: usize,
) -> Result<OutcomeCounter> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("scan-{}", i))
        .build()
        .map_err(|e| ScanError::new(ScanErrorKind::IoError, None, e.to_string()))?;
    Ok(pool.install(|| scan(root, ctx)))
}

/// Directory task: fan out over immediate entries and merge their results.
///
/// A directory that cannot be listed (missing, unreadable, or not a
/// directory at all) counts as one `Exception` and is not descended into.
pub fn scan_directory(dir: &Path, ctx: &ScanContext<'_>) -> OutcomeCounter {
    match list_entries(dir) {
        Ok(entries) => fan_out(entries, ctx),
        Err(e) => {
            log::warn!("Failed to list {:?}: {}", dir, e);
            OutcomeCounter::of(Outcome::Exception)
        }
    }
}

/// One task per listed entry; a failing entry never stops its siblings
fn fan_out(entries: Vec<ListedEntry>, ctx: &ScanContext<'_>) -> OutcomeCounter {
    entries
        .into_par_iter()
        .filter_map(|entry| match entry.kind {
            EntryKind::File => classify_file(&entry.path, ctx).map(OutcomeCounter::from),
            EntryKind::Directory => Some(scan_directory(&entry.path, ctx)),
        })
        .reduce(OutcomeCounter::empty, |a, b| a + b)
}

/// Immediate regular files and directories of `dir`.
///
/// Symlinks to regular files are kept; symlinked directories are not
/// followed, which keeps the task tree acyclic.
fn list_entries(dir: &Path) -> Result<Vec<ListedEntry>> {
    let metadata = std::fs::metadata(dir).map_err(|e| ScanError::io(dir, e))?;
    if !metadata.is_dir() {
        return Err(ScanError::new(
            ScanErrorKind::IoError,
            Some(dir.to_path_buf()),
            "not a directory",
        ));
    }

    let mut listed = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            ScanError::new(ScanErrorKind::IoError, Some(path), e.to_string())
        })?;
        let file_type = entry.file_type();
        let kind = if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else if file_type.is_symlink()
            && std::fs::metadata(entry.path()).map_or(false, |m| m.is_file())
        {
            EntryKind::File
        } else {
            continue;
        };
        listed.push(ListedEntry {
            path: entry.into_path(),
            kind,
        });
    }
    Ok(listed)
}

/// File task: classify one file against the store.
///
/// Returns `None` for in-progress encoder output, which is left out of the
/// tally entirely. Failures are logged and counted as `Exception`.
pub fn classify_file(path: &Path, ctx: &ScanContext<'_>) -> Option<Outcome> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();

    if ctx.config.is_backup(&name) {
        return Some(Outcome::Skipped);
    }
    if ctx.config.is_in_progress(&name) {
        return None;
    }

    match refresh_record(path, ctx) {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            log::warn!("Failed to check {:?}: {}", path, e);
            Some(Outcome::Exception)
        }
    }
}

fn refresh_record(path: &Path, ctx: &ScanContext<'_>) -> Result<Outcome> {
    let identity = std::fs::canonicalize(path).map_err(|e| ScanError::io(path, e))?;
    let modified_at: DateTime<Utc> = std::fs::metadata(&identity)
        .and_then(|m| m.modified())
        .map_err(|e| ScanError::io(&identity, e))?
        .into();

    let recorded = ctx.store.get_with(&identity, |record| record.modified_at);
    if recorded == Some(Some(modified_at)) {
        return Ok(Outcome::Unchanged);
    }

    let output = ctx.prober.probe(&identity)?;
    log::debug!("Probed {:?}", identity);
    ctx.store.put(identity, Some(modified_at), output.stdout, output.stderr);

    Ok(if recorded.is_some() {
        Outcome::Updated
    } else {
        Outcome::New
    })
}
