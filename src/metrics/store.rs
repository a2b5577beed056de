//! On-disk layout of one experiment run.
//!
//! ```text
//! <output_dir>/<run_id>/
//! ├── attempts.ndjson    # one GenerationAttempt per line, append-only
//! └── experiments.json   # ExperimentSnapshot, replaced atomically
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::record::{ExperimentRecord, GenerationAttempt};
use crate::error::{MendError, Result};
use crate::fs::{append_line, atomic_write_file, create_new_dir};

pub const ATTEMPTS_FILE: &str = "attempts.ndjson";
pub const EXPERIMENTS_FILE: &str = "experiments.json";

/// Aggregate state at one point in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSnapshot {
    pub run_id: String,
    pub updated_at: DateTime<Utc>,
    pub records: Vec<ExperimentRecord>,
}

impl ExperimentSnapshot {
    pub fn empty(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            updated_at: Utc::now(),
            records: Vec::new(),
        }
    }

    pub fn total_attempts(&self) -> u64 {
        self.records.iter().map(|r| r.attempts).sum()
    }

    pub fn record(&self, arm: &str) -> Option<&ExperimentRecord> {
        self.records.iter().find(|r| r.arm == arm)
    }
}

/// Reads and writes one run directory.
#[derive(Debug, Clone)]
pub struct MetricsStore {
    dir: PathBuf,
}

/// Run identifier derived from the start time, e.g. `20261016T093000123Z`.
pub fn new_run_id() -> String {
    Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string()
}

/// Suffixed ids tried after the base id is taken.
const MAX_RUN_ID_SUFFIX: u32 = 100;

impl MetricsStore {
    /// Store for `run_id` under `output_dir`. The run directory must not
    /// exist yet; an existing run is never appended to.
    pub fn create(output_dir: &Path, run_id: &str) -> Result<Self> {
        let dir = output_dir.join(run_id);
        if !create_new_dir(&dir)? {
            return Err(MendError::UserError(format!(
                "run directory '{}' already exists",
                dir.display()
            )));
        }
        Ok(Self { dir })
    }

    /// Store under a fresh run id starting from `base_id`, adding `-2`,
    /// `-3`, ... when another run already claimed it.
    pub fn create_unique(output_dir: &Path, base_id: &str) -> Result<(String, Self)> {
        for n in 1..=MAX_RUN_ID_SUFFIX {
            let run_id = if n == 1 {
                base_id.to_string()
            } else {
                format!("{}-{}", base_id, n)
            };
            let dir = output_dir.join(&run_id);
            if create_new_dir(&dir)? {
                return Ok((run_id, Self { dir }));
            }
        }
        Err(MendError::UserError(format!(
            "no free run directory for '{}' under '{}'",
            base_id,
            output_dir.display()
        )))
    }

    /// Store over an existing run directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(MendError::UserError(format!(
                "run directory '{}' does not exist",
                dir.display()
            )));
        }
        Ok(Self { dir })
    }

    /// The most recent run under `output_dir` (run ids sort by time).
    pub fn latest(output_dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(output_dir).map_err(|e| {
            MendError::UserError(format!(
                "failed to read output directory '{}': {}",
                output_dir.display(),
                e
            ))
        })?;

        let latest = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.join(EXPERIMENTS_FILE).is_file())
            .max()
            .ok_or_else(|| {
                MendError::UserError(format!(
                    "no experiment runs found in '{}'",
                    output_dir.display()
                ))
            })?;
        Ok(Self { dir: latest })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn attempts_path(&self) -> PathBuf {
        self.dir.join(ATTEMPTS_FILE)
    }

    pub fn experiments_path(&self) -> PathBuf {
        self.dir.join(EXPERIMENTS_FILE)
    }

    pub fn append_attempt(&self, attempt: &GenerationAttempt) -> Result<()> {
        let line = serde_json::to_string(attempt).map_err(|e| {
            MendError::UserError(format!("failed to serialize attempt '{}': {}", attempt.id, e))
        })?;
        append_line(self.attempts_path(), &line)
    }

    pub fn write_snapshot(&self, snapshot: &ExperimentSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| MendError::UserError(format!("failed to serialize snapshot: {}", e)))?;
        atomic_write_file(self.experiments_path(), &json)
    }

    pub fn load_snapshot(&self) -> Result<ExperimentSnapshot> {
        let path = self.experiments_path();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            MendError::UserError(format!("failed to read '{}': {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            MendError::UserError(format!("failed to parse '{}': {}", path.display(), e))
        })
    }

    /// Every persisted attempt, in append order.
    pub fn load_attempts(&self) -> Result<Vec<GenerationAttempt>> {
        let path = self.attempts_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| {
            MendError::UserError(format!("failed to read '{}': {}", path.display(), e))
        })?;

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|e| {
                    MendError::UserError(format!(
                        "{}:{}: invalid attempt record: {}",
                        path.display(),
                        index + 1,
                        e
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heal::StageSet;
    use crate::metrics::record::ArmKey;
    use crate::prompt::PromptVariant;
    use std::time::Duration;
    use tempfile::TempDir;

    fn attempt(id: &str) -> GenerationAttempt {
        let key = ArmKey {
            variant: PromptVariant::Bare,
            stages: StageSet::none(),
        };
        let mut attempt = GenerationAttempt::new(id, "add", "no-repair", key);
        attempt.fail("runtime-fault", "boom");
        attempt.finish(Duration::from_millis(5))
    }

    #[test]
    fn test_attempts_append_in_order() {
        let temp = TempDir::new().unwrap();
        let store = MetricsStore::create(temp.path(), "run-1").unwrap();

        store.append_attempt(&attempt("a")).unwrap();
        store.append_attempt(&attempt("b")).unwrap();

        let ids: Vec<String> = store.load_attempts().unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_snapshot_round_trip_and_latest() {
        let temp = TempDir::new().unwrap();
        let older = MetricsStore::create(temp.path(), "20260101T000000Z").unwrap();
        let newer = MetricsStore::create(temp.path(), "20260102T000000Z").unwrap();
        older.write_snapshot(&ExperimentSnapshot::empty("20260101T000000Z")).unwrap();
        newer.write_snapshot(&ExperimentSnapshot::empty("20260102T000000Z")).unwrap();

        let latest = MetricsStore::latest(temp.path()).unwrap();
        assert_eq!(latest.dir(), newer.dir());
        assert_eq!(latest.load_snapshot().unwrap().run_id, "20260102T000000Z");
    }

    #[test]
    fn test_latest_without_runs_is_user_error() {
        let temp = TempDir::new().unwrap();
        let err = MetricsStore::latest(temp.path()).unwrap_err();
        assert!(err.to_string().contains("no experiment runs"));
    }

    #[test]
    fn test_corrupt_attempt_line_reports_location() {
        let temp = TempDir::new().unwrap();
        let store = MetricsStore::create(temp.path(), "r").unwrap();
        std::fs::write(store.attempts_path(), "{not json}\n").unwrap();

        let err = store.load_attempts().unwrap_err();
        assert!(err.to_string().contains(":1: invalid attempt record"));
    }

    #[test]
    fn test_run_id_is_sortable_timestamp() {
        let id = new_run_id();
        assert_eq!(id.len(), 19);
        assert!(id.ends_with('Z'));
    }

    #[test]
    fn test_existing_run_directory_is_not_reused() {
        let temp = TempDir::new().unwrap();
        let first = MetricsStore::create(temp.path(), "20260101T000000000Z").unwrap();
        first.append_attempt(&attempt("a")).unwrap();

        let err = MetricsStore::create(temp.path(), "20260101T000000000Z").unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let (run_id, second) = MetricsStore::create_unique(temp.path(), "20260101T000000000Z").unwrap();
        assert_eq!(run_id, "20260101T000000000Z-2");
        assert_ne!(second.dir(), first.dir());
        assert!(second.load_attempts().unwrap().is_empty());
        assert_eq!(first.load_attempts().unwrap().len(), 1);
    }
}
