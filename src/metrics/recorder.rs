//! The aggregation actor.
//!
//! One task owns every `ExperimentRecord`. Attempt workers send finished
//! attempts over a channel and wait for the acknowledgement; no counter is
//! ever shared behind a lock. The actor runs on a blocking thread because
//! every update is persisted with synchronous file I/O.

use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::record::{ArmKey, ExperimentRecord, GenerationAttempt};
use super::store::{ExperimentSnapshot, MetricsStore};

const CHANNEL_CAPACITY: usize = 64;

/// Why the recorder could not take an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("metrics recorder has shut down")]
    Closed,

    #[error("failed to persist attempt '{id}': {message}")]
    Persist { id: String, message: String },
}

enum Command {
    Record {
        attempt: Box<GenerationAttempt>,
        reply: oneshot::Sender<Result<bool, MetricsError>>,
    },
    Snapshot {
        reply: oneshot::Sender<ExperimentSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<ExperimentSnapshot>,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Record { attempt, .. } => write!(f, "Record({})", attempt.id),
            Command::Snapshot { .. } => write!(f, "Snapshot"),
            Command::Shutdown { .. } => write!(f, "Shutdown"),
        }
    }
}

struct Aggregator {
    run_id: String,
    records: BTreeMap<ArmKey, ExperimentRecord>,
    seen: HashSet<String>,
    store: Option<MetricsStore>,
}

impl Aggregator {
    fn snapshot(&self) -> ExperimentSnapshot {
        ExperimentSnapshot {
            run_id: self.run_id.clone(),
            updated_at: Utc::now(),
            records: self.records.values().cloned().collect(),
        }
    }

    fn record(&mut self, attempt: GenerationAttempt) -> Result<bool, MetricsError> {
        if self.seen.contains(&attempt.id) {
            debug!(attempt = %attempt.id, "attempt already recorded");
            return Ok(false);
        }

        let persist_error = |e: crate::error::MendError| MetricsError::Persist {
            id: attempt.id.clone(),
            message: e.to_string(),
        };
        if let Some(store) = &self.store {
            store.append_attempt(&attempt).map_err(persist_error)?;
        }

        self.records
            .entry(attempt.key)
            .or_insert_with(|| ExperimentRecord::new(attempt.arm.clone(), attempt.key))
            .apply(&attempt);
        self.seen.insert(attempt.id.clone());

        if let Some(store) = &self.store {
            store.write_snapshot(&self.snapshot()).map_err(persist_error)?;
        }
        Ok(true)
    }

    fn run(mut self, mut rx: mpsc::Receiver<Command>) -> ExperimentSnapshot {
        while let Some(command) = rx.blocking_recv() {
            match command {
                Command::Record { attempt, reply } => {
                    let result = self.record(*attempt);
                    if let Err(e) = &result {
                        error!(error = %e, "metrics update failed");
                    }
                    let _ = reply.send(result);
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                Command::Shutdown { reply } => {
                    let _ = reply.send(self.snapshot());
                    break;
                }
            }
        }
        self.snapshot()
    }
}

/// Cloneable handle to the aggregation actor.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    tx: mpsc::Sender<Command>,
}

/// The running actor; `shutdown` yields the final snapshot.
#[derive(Debug)]
pub struct MetricsRecorder {
    handle: MetricsHandle,
    task: JoinHandle<ExperimentSnapshot>,
}

impl MetricsRecorder {
    /// Start the actor. With a store, every update is persisted before it is
    /// acknowledged.
    pub fn spawn(run_id: impl Into<String>, store: Option<MetricsStore>) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let aggregator = Aggregator {
            run_id: run_id.into(),
            records: BTreeMap::new(),
            seen: HashSet::new(),
            store,
        };
        let task = tokio::task::spawn_blocking(move || aggregator.run(rx));
        Self {
            handle: MetricsHandle { tx },
            task,
        }
    }

    pub fn handle(&self) -> MetricsHandle {
        self.handle.clone()
    }

    /// Stop the actor after every command queued so far and return the final
    /// snapshot. Later records through surviving handles fail with `Closed`.
    pub async fn shutdown(self) -> Result<ExperimentSnapshot, MetricsError> {
        let (reply, rx) = oneshot::channel();
        self.handle
            .tx
            .send(Command::Shutdown { reply })
            .await
            .map_err(|_| MetricsError::Closed)?;
        let snapshot = rx.await.map_err(|_| MetricsError::Closed)?;
        self.task.await.map_err(|_| MetricsError::Closed)?;
        Ok(snapshot)
    }
}

impl MetricsHandle {
    /// Record a finished attempt. Returns `false` when an attempt with the
    /// same id was already recorded.
    pub async fn record(&self, attempt: GenerationAttempt) -> Result<bool, MetricsError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Record {
                attempt: Box::new(attempt),
                reply,
            })
            .await
            .map_err(|_| MetricsError::Closed)?;
        rx.await.map_err(|_| MetricsError::Closed)?
    }

    pub async fn snapshot(&self) -> Result<ExperimentSnapshot, MetricsError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| MetricsError::Closed)?;
        rx.await.map_err(|_| MetricsError::Closed)
    }
}
