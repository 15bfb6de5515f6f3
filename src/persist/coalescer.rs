//! Debounced snapshot writer.
//!
//! Every `schedule` call re-arms a single timer; the worker writes only
//! once the timer survives a full quiescence interval, and it writes the
//! most recent snapshot it has received.

use super::snapshot::encode_entries;
use crate::core::{Result, StoreError};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{Instrument, Level, event, info_span};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Snapshots handed to the coalescer.
    pub scheduled: u64,
    /// Successful writes.
    pub flushes: u64,
    /// Writes that failed and were dropped.
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    flushes: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CoalescerStats {
        CoalescerStats {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Cheap, cloneable sender side of a coalescer.
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
    tx: mpsc::UnboundedSender<Value>,
    counters: Arc<Counters>,
}

impl ScheduleHandle {
    /// Queues `snapshot` and restarts the quiescence timer. Never blocks.
    pub fn schedule(&self, snapshot: Value) {
        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(snapshot).is_err() {
            event!(Level::WARN, "snapshot scheduled after writer stopped; dropped");
        }
    }
}

pub struct WriteCoalescer {
    path: PathBuf,
    quiescence: Duration,
    handle: ScheduleHandle,
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl WriteCoalescer {
    /// Starts the writer task on the current tokio runtime.
    pub fn spawn(path: impl Into<PathBuf>, quiescence: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| StoreError::Runtime(format!("write coalescer needs tokio: {}", err)))?;

        let path = path.into();
        let counters = Arc::new(Counters::default());
        let (tx, rx) = mpsc::unbounded_channel::<Value>();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let worker = Worker {
            path: path.clone(),
            quiescence,
            counters: counters.clone(),
        };
        let join_handle = runtime.spawn(worker.run(rx, stop_rx));

        Ok(Self {
            path,
            quiescence,
            handle: ScheduleHandle { tx, counters },
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        })
    }

    pub fn handle(&self) -> ScheduleHandle {
        self.handle.clone()
    }

    pub fn schedule(&self, snapshot: Value) {
        self.handle.schedule(snapshot);
    }

    pub fn stats(&self) -> CoalescerStats {
        self.handle.counters.snapshot()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn quiescence(&self) -> Duration {
        self.quiescence
    }

    /// Stops accepting snapshots and waits for the worker to exit.
    ///
    /// A pending snapshot is still written, but only once its quiescence
    /// interval has elapsed.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| StoreError::Runtime(format!("write coalescer join: {}", err)))?;
        }
        Ok(())
    }
}

impl fmt::Debug for WriteCoalescer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteCoalescer")
            .field("path", &self.path)
            .field("quiescence", &self.quiescence)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Drop for WriteCoalescer {
    fn drop(&mut self) {
        // The worker is left to finish a pending write on its own.
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

struct Worker {
    path: PathBuf,
    quiescence: Duration,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<Value>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let mut pending: Option<Value> = None;
        let mut stopping = false;
        let timer = sleep(self.quiescence);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                received = rx.recv(), if !stopping => match received {
                    Some(snapshot) => {
                        pending = Some(snapshot);
                        timer.as_mut().reset(Instant::now() + self.quiescence);
                    }
                    None => stopping = true,
                },
                _ = &mut stop_rx, if !stopping => {
                    stopping = true;
                    let mut drained = false;
                    while let Ok(snapshot) = rx.try_recv() {
                        pending = Some(snapshot);
                        drained = true;
                    }
                    if drained {
                        timer.as_mut().reset(Instant::now() + self.quiescence);
                    }
                    rx.close();
                }
                _ = &mut timer, if pending.is_some() => {
                    if let Some(snapshot) = pending.take() {
                        self.flush(&snapshot).await;
                    }
                }
            }

            if stopping && pending.is_none() {
                break;
            }
        }
        event!(Level::DEBUG, path = %self.path.display(), "write coalescer stopped");
    }

    async fn flush(&self, snapshot: &Value) {
        let span = info_span!("persist.flush", path = %self.path.display());
        match write_snapshot(&self.path, snapshot).instrument(span).await {
            Ok(bytes) => {
                self.counters.flushes.fetch_add(1, Ordering::Relaxed);
                event!(Level::DEBUG, bytes, path = %self.path.display(), "snapshot flushed");
            }
            Err(err) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                event!(Level::ERROR, error = %err, path = %self.path.display(), "snapshot flush failed");
            }
        }
    }
}

async fn write_snapshot(path: &Path, snapshot: &Value) -> Result<usize> {
    let bytes = encode_entries(snapshot)?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|err| {
            StoreError::IoError(format!(
                "Failed to create parent directory '{}': {}",
                parent.display(),
                err
            ))
        })?;
    }
    fs::write(path, &bytes).await.map_err(|err| {
        StoreError::IoError(format!("Failed to write snapshot '{}': {}", path.display(), err))
    })?;
    Ok(bytes.len())
}
