//! Background snapshot scheduling.
//!
//! A single long-lived thread wakes on a periodic timer or on a WAL-size
//! signal and invokes the snapshot routine. The signal slot holds at most
//! one pending trigger; further notifications are dropped until the
//! scheduler consumes it, and size-triggered wakes wait out a short
//! coalescing window first so a burst of large writes causes one snapshot.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::StoreResult;

pub(crate) enum SchedulerCommand {
    Trigger,
    Shutdown,
}

/// Non-blocking, single-slot signal handed to the WAL. `notify` never
/// waits; while a trigger is already pending it is a no-op.
#[derive(Clone)]
pub struct SnapshotTrigger {
    tx: Sender<SchedulerCommand>,
    pending: Arc<AtomicBool>,
}

impl SnapshotTrigger {
    pub fn notify(&self) {
        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            && self.tx.send(SchedulerCommand::Trigger).is_err()
        {
            self.pending.store(false, Ordering::Release);
        }
    }
}

/// Receiving side of the trigger, consumed by the scheduler thread.
pub struct SchedulerInbox {
    tx: Sender<SchedulerCommand>,
    rx: Receiver<SchedulerCommand>,
    pending: Arc<AtomicBool>,
}

/// Creates the trigger ahead of the scheduler so the WAL can hold it
/// while the store is still being assembled.
pub fn trigger_channel() -> (SnapshotTrigger, SchedulerInbox) {
    let (tx, rx) = mpsc::channel();
    let pending = Arc::new(AtomicBool::new(false));
    (
        SnapshotTrigger {
            tx: tx.clone(),
            pending: Arc::clone(&pending),
        },
        SchedulerInbox { tx, rx, pending },
    )
}

pub struct SnapshotScheduler {
    shutdown_tx: Sender<SchedulerCommand>,
    worker: Option<JoinHandle<()>>,
}

impl SnapshotScheduler {
    pub fn spawn<F>(
        inbox: SchedulerInbox,
        interval: Duration,
        coalesce_window: Duration,
        take_snapshot: F,
    ) -> Self
    where
        F: Fn() -> StoreResult<PathBuf> + Send + 'static,
    {
        let shutdown_tx = inbox.tx.clone();
        let worker = std::thread::Builder::new()
            .name("kivio-snapshot-scheduler".to_string())
            .spawn(move || run(inbox, interval, coalesce_window, take_snapshot))
            .expect("failed to spawn snapshot scheduler");

        Self {
            shutdown_tx,
            worker: Some(worker),
        }
    }

    /// Stops the worker and waits for it to exit. Dropping the scheduler
    /// does the same.
    pub fn shutdown(self) {}
}

impl Drop for SnapshotScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(SchedulerCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run<F>(inbox: SchedulerInbox, interval: Duration, coalesce_window: Duration, take_snapshot: F)
where
    F: Fn() -> StoreResult<PathBuf>,
{
    // A zero interval disables the timer; the thread then only reacts to
    // size triggers and shutdown.
    let timeout = if interval.is_zero() {
        Duration::from_secs(60 * 60 * 24 * 30)
    } else {
        interval
    };

    loop {
        match inbox.rx.recv_timeout(timeout) {
            Ok(SchedulerCommand::Trigger) => {
                std::thread::sleep(coalesce_window);
                inbox.pending.store(false, Ordering::Release);
                tracing::info!("snapshot requested by WAL size threshold");
                run_snapshot(&take_snapshot);
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::info!("snapshot requested by timer");
                run_snapshot(&take_snapshot);
            }
            Ok(SchedulerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn run_snapshot<F>(take_snapshot: &F)
where
    F: Fn() -> StoreResult<PathBuf>,
{
    match take_snapshot() {
        Ok(path) => tracing::debug!(path = ?path, "scheduled snapshot complete"),
        Err(err) => tracing::warn!(?err, "scheduled snapshot failed"),
    }
}
