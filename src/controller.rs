//! Leak test control: start, stop and status.
//!
//! The controller owns the side effects around the session state machine:
//! scheduling the Baseline → Testing promotion and persisting the completed
//! record. Transitions themselves are delegated to [`SessionHandle`].

use crate::error::AppResult;
use crate::producer::ProducerMode;
use crate::storage::ResultStore;
use parking_lot::Mutex;
use pool_core::clock::Clock;
use pool_core::session::{CompletedTest, SessionHandle, SessionId, SessionSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct LeakTestController {
    session: SessionHandle,
    store: Arc<dyn ResultStore>,
    clock: Arc<dyn Clock>,
    baseline_duration: Duration,
    mode: watch::Receiver<ProducerMode>,
    promotion: Mutex<Option<JoinHandle<()>>>,
}

impl LeakTestController {
    pub fn new(
        session: SessionHandle,
        store: Arc<dyn ResultStore>,
        clock: Arc<dyn Clock>,
        baseline_duration: Duration,
        mode: watch::Receiver<ProducerMode>,
    ) -> Self {
        Self {
            session,
            store,
            clock,
            baseline_duration,
            mode,
            promotion: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn mode(&self) -> ProducerMode {
        *self.mode.borrow()
    }

    /// Start a new test and schedule its promotion to Testing.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// `InvalidTransition` while a test is already running.
    pub fn start_test(&self) -> AppResult<SessionId> {
        // Held across the transition so a racing stop cannot abort the new timer.
        let mut promotion = self.promotion.lock();
        let session_id = self.session.start_test(self.clock.now())?;

        let session = self.session.clone();
        let delay = self.baseline_duration;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !session.promote_to_testing(session_id) {
                debug!(session_id = %session_id, "Scheduled promotion had nothing to do");
            }
        });

        if let Some(previous) = promotion.replace(timer) {
            previous.abort();
        }
        drop(promotion);

        info!(
            session_id = %session_id,
            baseline_secs = delay.as_secs_f64(),
            "Promotion to testing scheduled"
        );
        Ok(session_id)
    }

    /// Stop the running test, compute its verdict and persist the record.
    ///
    /// A storage failure is logged; the test stays complete and the record is
    /// still returned.
    ///
    /// # Errors
    /// `InvalidTransition` when no test is running.
    pub async fn stop_test(&self) -> AppResult<CompletedTest> {
        let completed = {
            let mut promotion = self.promotion.lock();
            let completed = self.session.stop_test(self.clock.now())?;
            if let Some(timer) = promotion.take() {
                timer.abort();
            }
            completed
        };

        if completed.simulated_readings > 0 {
            warn!(
                session_id = %completed.session_id,
                simulated = completed.simulated_readings,
                total = completed.readings_count,
                "Test included simulated readings"
            );
        }

        if let Err(err) = self.store.save(&completed).await {
            error!(
                session_id = %completed.session_id,
                error = %err,
                "Failed to persist completed test"
            );
        }
        Ok(completed)
    }

    /// Snapshot of samples newer than `since` and session status.
    pub fn snapshot(&self, since: f64) -> SessionSnapshot {
        self.session.snapshot(since, self.clock.now())
    }
}

impl Drop for LeakTestController {
    fn drop(&mut self) {
        if let Some(timer) = self.promotion.get_mut().take() {
            timer.abort();
        }
    }
}
