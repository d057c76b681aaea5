//! External probe contract
//!
//! The probe is a blocking child process run once per changed file. Both
//! output streams are read to EOF and kept as text; the exit status is
//! logged but never interpreted.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::ScanConfig;
use crate::error::{Result, ScanError};

/// Captured text of one probe run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Metadata extraction for a single file
pub trait Prober: Send + Sync {
    fn probe(&self, path: &Path) -> Result<ProbeOutput>;
}

impl<F> Prober for F
where
    F: Fn(&Path) -> Result<ProbeOutput> + Send + Sync,
{
    fn probe(&self, path: &Path) -> Result<ProbeOutput> {
        self(path)
    }
}

/// Probe backed by an executable, with the file path as last argument
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
}

impl CommandProbe {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.probe_program.clone(), config.probe_args.clone())
    }
}

impl Prober for CommandProbe {
    fn probe(&self, path: &Path) -> Result<ProbeOutput> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ScanError::probe(path, format!("Failed to run {}: {}", self.program, e)))?;

        log::debug!("{} exited with {} for {:?}", self.program, output.status, path);

        Ok(ProbeOutput {
            stdout: capture_text(&output.stdout),
            stderr: capture_text(&output.stderr),
        })
    }
}

/// Decode captured bytes as lines joined by `\n`, without a trailing newline
fn capture_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .lines()
        .collect::<Vec<_>>()
        .join("\n")
}
