//! TTL heartbeat for one registered instance
//!
//! ## Lifecycle
//!
//! A loop is spawned by the registrar right after registration and starts
//! in `Running`. Every `TTL - 1` seconds it checks its cancellation signal
//! without blocking; if cancelled it exits for good (`Cancelled`),
//! otherwise it passes the instance's TTL check once.
//!
//! A failed pass is logged and the loop keeps ticking: the next tick is
//! the retry. Cancellation is only observed on a tick, so one renewal may
//! still be in flight when the instance is deregistered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::backend::RegistryBackend;
use crate::keys::HEARTBEAT_NOTE;

/// Heartbeat loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    Running,
    /// Terminal
    Cancelled,
}

/// Owner side of a running heartbeat loop
pub struct HeartbeatHandle {
    check_id: String,
    cancel_tx: Option<oneshot::Sender<()>>,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Spawn a heartbeat loop passing `check_id` every `interval`.
    ///
    /// The first pass happens one full interval after spawning. `interval`
    /// must be non-zero.
    pub fn spawn(
        backend: Arc<dyn RegistryBackend>,
        check_id: String,
        interval: Duration,
    ) -> Self {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let running = Arc::new(AtomicBool::new(true));

        debug!(
            check_id = %check_id,
            interval_secs = interval.as_secs(),
            "Starting heartbeat"
        );

        let task = tokio::spawn(run_heartbeat_loop(
            backend,
            check_id.clone(),
            interval,
            cancel_rx,
            Arc::clone(&running),
        ));

        Self {
            check_id,
            cancel_tx: Some(cancel_tx),
            running,
            task,
        }
    }

    /// Signal the loop to stop. Does not wait for it; the loop exits on
    /// its next tick. Later calls are no-ops.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Whether `cancel` has been called, whether or not the loop has
    /// observed it yet
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_tx.is_none()
    }

    pub fn state(&self) -> HeartbeatState {
        if self.running.load(Ordering::SeqCst) {
            HeartbeatState::Running
        } else {
            HeartbeatState::Cancelled
        }
    }

    /// Wait for the loop task to exit
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(check_id = %self.check_id, error = %e, "Heartbeat task ended abnormally");
        }
    }
}

/// Run the heartbeat loop until cancelled
async fn run_heartbeat_loop(
    backend: Arc<dyn RegistryBackend>,
    check_id: String,
    interval: Duration,
    mut cancel_rx: oneshot::Receiver<()>,
    running: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        // A dropped sender counts as cancellation
        match cancel_rx.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Closed) => break,
        }

        match backend.pass_check(&check_id, HEARTBEAT_NOTE).await {
            Ok(()) => debug!(check_id = %check_id, "TTL check passed"),
            Err(e) => warn!(check_id = %check_id, error = %e, "TTL heartbeat failed"),
        }
    }

    running.store(false, Ordering::SeqCst);
    info!(check_id = %check_id, "Heartbeat stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, Operation};

    const CHECK: &str = "service:svc-api-1-h1-80";

    fn spawn(backend: &Arc<MemoryBackend>, secs: u64) -> HeartbeatHandle {
        HeartbeatHandle::spawn(
            Arc::clone(backend) as Arc<dyn RegistryBackend>,
            CHECK.to_string(),
            Duration::from_secs(secs),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_pass_after_one_interval() {
        let backend = Arc::new(MemoryBackend::new());
        let handle = spawn(&backend, 14);

        tokio::time::sleep(Duration::from_secs(13)).await;
        assert_eq!(backend.pass_count(CHECK), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(backend.pass_count(CHECK), 1);
        assert_eq!(handle.state(), HeartbeatState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_cadence() {
        let backend = Arc::new(MemoryBackend::new());
        let _handle = spawn(&backend, 14);

        // Ticks at 14, 28, 42, 56, 70
        tokio::time::sleep(Duration::from_secs(71)).await;
        assert_eq!(backend.pass_count(CHECK), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_renewals() {
        let backend = Arc::new(MemoryBackend::new());
        let mut handle = spawn(&backend, 14);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(backend.pass_count(CHECK), 1);

        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancel_requested());

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(backend.pass_count(CHECK), 1);
        assert_eq!(handle.state(), HeartbeatState::Cancelled);
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_after_aborted_task() {
        let backend = Arc::new(MemoryBackend::new());
        let handle = spawn(&backend, 14);
        assert!(!handle.is_cancel_requested());

        // Join logs the abort instead of panicking
        handle.task.abort();
        handle.join().await;
        assert_eq!(backend.pass_count(CHECK), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_cancels() {
        let backend = Arc::new(MemoryBackend::new());
        let handle = spawn(&backend, 5);
        drop(handle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.pass_count(CHECK), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_loop() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_failing(Operation::PassCheck, true);
        let handle = spawn(&backend, 14);

        tokio::time::sleep(Duration::from_secs(43)).await;
        assert_eq!(backend.pass_count(CHECK), 3);
        assert_eq!(handle.state(), HeartbeatState::Running);

        backend.set_failing(Operation::PassCheck, false);
        tokio::time::sleep(Duration::from_secs(14)).await;
        assert_eq!(backend.pass_count(CHECK), 4);
    }
}
