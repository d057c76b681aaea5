//! Core data models for the media inventory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::Add;
use std::path::PathBuf;

/// Result category of classifying a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// File had no record before this pass
    New,
    /// File had a record with a different timestamp and was probed again
    Updated,
    /// Recorded timestamp matches the file on disk
    Unchanged,
    /// I/O or probe failure for this file or directory
    Exception,
    /// Stale backup file, never recorded
    Skipped,
}

impl Outcome {
    /// All categories in tally order
    pub const ALL: [Outcome; 5] = [
        Outcome::New,
        Outcome::Updated,
        Outcome::Unchanged,
        Outcome::Exception,
        Outcome::Skipped,
    ];

    fn index(self) -> usize {
        match self {
            Outcome::New => 0,
            Outcome::Updated => 1,
            Outcome::Unchanged => 2,
            Outcome::Exception => 3,
            Outcome::Skipped => 4,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::New => "NEW",
            Outcome::Updated => "UPDATED",
            Outcome::Unchanged => "UNCHANGED",
            Outcome::Exception => "EXCEPTION",
            Outcome::Skipped => "SKIPPED",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable tally of outcomes over a task subtree.
///
/// Merging adds the counts per category, so the join order of the task
/// tree never changes the totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounter {
    counts: [u64; 5],
}

impl OutcomeCounter {
    /// Counter with every category at zero
    pub fn empty() -> Self {
        Self::default()
    }

    /// Counter holding exactly one outcome
    pub fn of(outcome: Outcome) -> Self {
        let mut counts = [0; 5];
        counts[outcome.index()] = 1;
        Self { counts }
    }

    /// Sum two counters into a new one
    pub fn merge(self, other: OutcomeCounter) -> Self {
        let mut counts = self.counts;
        for (count, add) in counts.iter_mut().zip(other.counts) {
            *count += add;
        }
        Self { counts }
    }

    pub fn count(&self, outcome: Outcome) -> u64 {
        self.counts[outcome.index()]
    }

    /// Total number of classified entries
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Iterate `(category, count)` pairs in tally order
    pub fn iter(&self) -> impl Iterator<Item = (Outcome, u64)> + '_ {
        Outcome::ALL.iter().map(move |o| (*o, self.count(*o)))
    }
}

impl From<Outcome> for OutcomeCounter {
    fn from(outcome: Outcome) -> Self {
        Self::of(outcome)
    }
}

impl Add for OutcomeCounter {
    type Output = OutcomeCounter;

    fn add(self, rhs: Self) -> Self::Output {
        self.merge(rhs)
    }
}

impl Sum for OutcomeCounter {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::empty(), Add::add)
    }
}

impl FromIterator<Outcome> for OutcomeCounter {
    fn from_iter<I: IntoIterator<Item = Outcome>>(iter: I) -> Self {
        iter.into_iter().map(Self::from).sum()
    }
}

/// Recorded metadata for one tracked file.
///
/// Records are values: the store replaces them whole and never edits one in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Canonical absolute path, the store key
    pub identity: PathBuf,
    /// Last observed modification time
    pub modified_at: Option<DateTime<Utc>>,
    /// Captured probe standard output
    pub probe_stdout: String,
    /// Captured probe standard error
    pub probe_stderr: String,
}

impl Record {
    pub fn new(
        identity: PathBuf,
        modified_at: Option<DateTime<Utc>>,
        probe_stdout: impl Into<String>,
        probe_stderr: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            modified_at,
            probe_stdout: probe_stdout.into(),
            probe_stderr: probe_stderr.into(),
        }
    }

    /// Video codec named after `Video: ` in the probe output, if any
    pub fn video_encoding(&self) -> Option<&str> {
        const MARKER: &str = "Video: ";
        let start = self.probe_stderr.find(MARKER)? + MARKER.len();
        let rest = &self.probe_stderr[start..];
        let end = rest
            .find(|c: char| c.is_whitespace() || c == ',')
            .unwrap_or(rest.len());
        Some(&rest[..end]).filter(|codec| !codec.is_empty())
    }

    /// Whether the probe output reports the given video codec
    pub fn has_video_encoding(&self, encoding: &str) -> bool {
        self.probe_stderr.contains(&format!("Video: {}", encoding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn outcome_strategy() -> impl Strategy<Value = Outcome> {
        prop::sample::select(Outcome::ALL.to_vec())
    }

    fn counter_strategy() -> impl Strategy<Value = OutcomeCounter> {
        prop::collection::vec(outcome_strategy(), 0..40)
            .prop_map(|outcomes| outcomes.into_iter().collect())
    }

    #[test]
    fn test_counter_of_single_outcome() {
        let counter = OutcomeCounter::of(Outcome::Skipped);
        assert_eq!(counter.count(Outcome::Skipped), 1);
        assert_eq!(counter.count(Outcome::New), 0);
        assert_eq!(counter.total(), 1);
    }

    #[test]
    fn test_counter_merge() {
        let merged = OutcomeCounter::of(Outcome::New)
            .merge(OutcomeCounter::of(Outcome::New))
            .merge(OutcomeCounter::of(Outcome::Exception));
        assert_eq!(merged.count(Outcome::New), 2);
        assert_eq!(merged.count(Outcome::Exception), 1);
        assert_eq!(merged.total(), 3);

        let added = OutcomeCounter::from(Outcome::New) + Outcome::Exception.into();
        assert_eq!(added, OutcomeCounter::of(Outcome::New).merge(Outcome::Exception.into()));
    }

    #[test]
    fn test_empty_sum() {
        let counter: OutcomeCounter = std::iter::empty::<OutcomeCounter>().sum();
        assert_eq!(counter, OutcomeCounter::empty());
        assert!(counter.iter().all(|(_, n)| n == 0));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::New.to_string(), "NEW");
        assert_eq!(Outcome::Skipped.as_str(), "SKIPPED");
        assert_eq!(serde_json::to_string(&Outcome::Unchanged).unwrap(), "\"unchanged\"");
    }

    #[test]
    fn test_video_encoding() {
        let record = Record::new(
            PathBuf::from("/m/a.mkv"),
            None,
            "",
            "Stream #0:0: Video: h264 (High), yuv420p",
        );
        assert_eq!(record.video_encoding(), Some("h264"));
        assert!(record.has_video_encoding("h264"));
        assert!(!record.has_video_encoding("hevc"));

        let trailing = Record::new(PathBuf::from("/m/b.mkv"), None, "", "Video: mpeg4");
        assert_eq!(trailing.video_encoding(), Some("mpeg4"));

        let audio = Record::new(PathBuf::from("/m/c.mka"), None, "", "Audio: flac");
        assert_eq!(audio.video_encoding(), None);
    }

    proptest! {
        #[test]
        fn merge_is_commutative(a in counter_strategy(), b in counter_strategy()) {
            prop_assert_eq!(a.merge(b), b.merge(a));
        }

        #[test]
        fn merge_is_associative(
            a in counter_strategy(),
            b in counter_strategy(),
            c in counter_strategy(),
        ) {
            prop_assert_eq!(a.merge(b).merge(c), a.merge(b.merge(c)));
        }

        #[test]
        fn counts_match_input(outcomes in prop::collection::vec(outcome_strategy(), 0..60)) {
            let counter: OutcomeCounter = outcomes.iter().copied().collect();
            prop_assert_eq!(counter.total(), outcomes.len() as u64);
            for outcome in Outcome::ALL {
                let expected = outcomes.iter().filter(|o| **o == outcome).count() as u64;
                prop_assert_eq!(counter.count(outcome), expected);
            }
        }
    }
}
