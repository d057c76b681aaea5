//! Incremental media inventory with parallel directory fan-out
//!
//! This library walks a media tree with one rayon task per entry, probes
//! only files whose modification time changed since the last pass, and
//! keeps the results in a concurrent record store persisted as JSON.

pub mod config;
pub mod error;
pub mod inventory;
pub mod models;
pub mod probe;
pub mod scanner;
pub mod store;

pub use config::ScanConfig;
pub use error::{ScanError, ScanErrorKind};
pub use inventory::{
    find_by_encoding, list_encodings, open_store, refresh_after_reencode, run_scan,
    run_scan_with, select_for_reencode,
};
pub use models::{Outcome, OutcomeCounter, Record};
pub use probe::{CommandProbe, ProbeOutput, Prober};
pub use scanner::{classify_file, scan, scan_directory, scan_with_threads, ScanContext};
pub use store::{PersistExecutor, PersistJob, PersistMode, RecordStore};
