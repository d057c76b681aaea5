//! Top-level workflows over the scanner and the record store

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::models::{Outcome, OutcomeCounter};
use crate::probe::{CommandProbe, Prober};
use crate::scanner::{classify_file, scan_with_threads, ScanContext};
use crate::store::{PersistMode, RecordStore};

/// Open the configured store.
///
/// Loads the snapshot when present (a missing file is an error only with
/// `must_exist`), drops records whose file is gone, then applies the
/// configured auto-persist setting.
pub fn open_store(
    config: &ScanConfig,
    must_exist: bool,
    mode: PersistMode,
) -> Result<RecordStore> {
    let mut path = config.effective_store_path();
    if path.is_relative() {
        path = std::env::current_dir()?.join(path);
    }

    if must_exist && !path.is_file() {
        return Err(ScanError::not_found(path));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ScanError::io(parent, e))?;
    }

    let store = RecordStore::with_persist_mode(&path, mode);
    if path.is_file() {
        store.load()?;
        log::info!("Loaded {} records from {:?}", store.len(), path);
    }

    let pruned = prune_missing(&store);
    if pruned > 0 {
        log::info!("Dropped {} records of files that no longer exist", pruned);
    }

    store.set_auto_persist(config.auto_persist);
    Ok(store)
}

/// Remove records whose identity is no longer a regular file
pub fn prune_missing(store: &RecordStore) -> usize {
    let mut removed = 0;
    for identity in store.list_identities() {
        if !identity.is_file() && store.remove(&identity) {
            removed += 1;
        }
    }
    removed
}

/// Scan `root` into the configured store with the configured probe command
pub fn run_scan(config: &ScanConfig, root: &Path) -> Result<OutcomeCounter> {
    run_scan_with(config, root, &CommandProbe::from_config(config))
}

/// Scan `root` into the configured store, probing with `prober`, then save
pub fn run_scan_with(
    config: &ScanConfig,
    root: &Path,
    prober: &dyn Prober,
) -> Result<OutcomeCounter> {
    let store = open_store(config, false, PersistMode::rayon())?;
    let ctx = ScanContext::new(&store, prober, config);
    let num_threads = config.effective_threads();
    log::debug!("Scanning with {} worker threads", num_threads);
    let result = scan_with_threads(root, &ctx, num_threads)?;
    store.save()?;
    Ok(result)
}

/// Distinct video codecs reported by the probe, ascending
pub fn list_encodings(store: &RecordStore) -> Vec<String> {
    store
        .records()
        .iter()
        .filter_map(|record| record.video_encoding().map(str::to_string))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Identities whose probe output reports `encoding`, ascending
pub fn find_by_encoding(store: &RecordStore, encoding: &str) -> Vec<PathBuf> {
    store
        .records()
        .into_iter()
        .filter(|record| record.has_video_encoding(encoding))
        .map(|record| record.identity)
        .collect()
}

/// Files to re-encode: matches for `encoding`, at most `max` of them
pub fn select_for_reencode(
    store: &RecordStore,
    encoding: &str,
    max: Option<usize>,
) -> Vec<PathBuf> {
    let mut selected = find_by_encoding(store, encoding);
    if let Some(max) = max {
        selected.truncate(max);
    }
    selected
}

/// Bring the store up to date after `original` was re-encoded into `replacement`.
///
/// The old identity is dropped when the file name changed; the replacement
/// is then classified like any scanned file.
pub fn refresh_after_reencode(
    ctx: &ScanContext<'_>,
    original: &Path,
    replacement: &Path,
) -> Option<Outcome> {
    if original != replacement {
        ctx.store.remove(original);
    }
    classify_file(replacement, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeOutput;
    use std::fs;

    fn h264_probe(_path: &Path) -> Result<ProbeOutput> {
        Ok(ProbeOutput {
            stdout: String::new(),
            stderr: "Stream #0:0: Video: h264 (High), yuv420p".to_string(),
        })
    }

    fn config_in(dir: &Path) -> ScanConfig {
        ScanConfig::builder()
            .store_path(dir.join("state").join("inventory.json"))
            .num_threads(2)
            .build()
    }

    #[test]
    fn test_open_store_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_store(&config_in(dir.path()), true, PersistMode::Inline).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_open_store_creates_parent_and_enables_auto_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&config_in(dir.path()), false, PersistMode::Inline).unwrap();
        assert!(store.is_empty());
        assert!(store.is_auto_persist());
        assert!(dir.path().join("state").is_dir());
    }

    #[test]
    fn test_open_store_prunes_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let kept = dir.path().join("kept.mkv");
        fs::write(&kept, b"x").unwrap();
        let kept = fs::canonicalize(kept).unwrap();

        let seed = open_store(&config, false, PersistMode::Inline).unwrap();
        seed.put(kept.clone(), None, "", "");
        seed.put(dir.path().join("gone.mkv"), None, "", "");
        assert!(!seed.is_dirty());

        let store = open_store(&config, true, PersistMode::Inline).unwrap();
        assert_eq!(store.list_identities(), vec![kept]);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_run_scan_persists_and_rescans_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let media = dir.path().join("media");
        fs::create_dir_all(media.join("season")).unwrap();
        fs::write(media.join("a.mkv"), b"a").unwrap();
        fs::write(media.join("season").join("b.avi"), b"b").unwrap();

        let first = run_scan_with(&config, &media, &h264_probe).unwrap();
        assert_eq!(first.count(Outcome::New), 2);

        let second = run_scan_with(&config, &media, &h264_probe).unwrap();
        assert_eq!(second.count(Outcome::Unchanged), 2);
        assert_eq!(second.total(), 2);

        let store = open_store(&config, true, PersistMode::Inline).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_run_scan_with_hardware_thread_count() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScanConfig::builder()
            .store_path(dir.path().join("inventory.json"))
            .num_threads(0)
            .build();
        let media = dir.path().join("media");
        fs::create_dir_all(&media).unwrap();
        fs::write(media.join("a.mkv"), b"a").unwrap();

        let result = run_scan_with(&config, &media, &h264_probe).unwrap();
        assert_eq!(result, OutcomeCounter::of(Outcome::New));
        assert!(config.effective_threads() > 0);
    }

    #[test]
    fn test_run_scan_on_a_file_counts_one_exception() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let movie = dir.path().join("movie.mkv");
        fs::write(&movie, b"m").unwrap();

        let result = run_scan_with(&config, &movie, &h264_probe).unwrap();
        assert_eq!(result, OutcomeCounter::of(Outcome::Exception));
    }

    #[test]
    fn test_encoding_queries() {
        let store = RecordStore::new("/nowhere/db.json");
        store.put(PathBuf::from("/m/c.mkv"), None, "", "Video: hevc (Main)");
        store.put(PathBuf::from("/m/a.avi"), None, "", "Video: mpeg4, yuv420p");
        store.put(PathBuf::from("/m/b.avi"), None, "", "Video: mpeg4 (Simple)");
        store.put(PathBuf::from("/m/d.mka"), None, "", "Audio: flac");

        assert_eq!(list_encodings(&store), vec!["hevc", "mpeg4"]);
        assert_eq!(
            find_by_encoding(&store, "mpeg4"),
            vec![PathBuf::from("/m/a.avi"), PathBuf::from("/m/b.avi")]
        );
        assert_eq!(
            select_for_reencode(&store, "mpeg4", Some(1)),
            vec![PathBuf::from("/m/a.avi")]
        );
        assert_eq!(select_for_reencode(&store, "mpeg4", None).len(), 2);
        assert!(find_by_encoding(&store, "vp9").is_empty());
    }

    #[test]
    fn test_refresh_after_reencode() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("movie.avi");
        fs::write(&original, b"old").unwrap();
        let original = fs::canonicalize(original).unwrap();

        let store = RecordStore::new(dir.path().join("db.json"));
        store.put(original.clone(), None, "", "Video: mpeg4");

        // the encoder glue moved movie.avi aside and produced movie.mkv
        let backup = dir.path().join("movie.avi.old");
        fs::rename(&original, &backup).unwrap();
        let replacement = dir.path().join("movie.mkv");
        fs::write(&replacement, b"new").unwrap();

        let config = ScanConfig::default();
        let ctx = ScanContext::new(&store, &h264_probe, &config);

        assert_eq!(
            refresh_after_reencode(&ctx, &original, &replacement),
            Some(Outcome::New)
        );
        assert!(!store.contains(&original));
        assert_eq!(store.list_identities(), vec![fs::canonicalize(&replacement).unwrap()]);
        assert_eq!(find_by_encoding(&store, "h264").len(), 1);
    }
}
