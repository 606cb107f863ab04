//! Measurement session: the leak test state machine and its sample log.
//!
//! ```text
//!  Idle ──start_test──▶ Baseline ──promote_to_testing──▶ Testing
//!                          │                               │
//!                          └──────────stop_test────────────┴──▶ Complete
//!                                                                  │
//!            Baseline (fresh session) ◀──────start_test────────────┘
//! ```
//!
//! A [`MeasurementSession`] is plain data plus its transitions. The shared,
//! thread-safe entry point is [`SessionHandle`], which wraps the active session
//! in a `parking_lot::RwLock`:
//!
//! - the reading producer is the only writer of samples (`append`);
//! - any number of request handlers read through `snapshot`;
//! - `start_test`, `stop_test` and `promote_to_testing` take the write lock, so
//!   the state can never flip in the middle of an append.
//!
//! `start_test` replaces the session wholesale. Each session carries a UUID and
//! a scheduled promotion names the session it was created for, so a timer that
//! outlives its session cannot touch the new one.

use crate::analyzer::{LeakAnalyzer, LeakVerdict};
use crate::error::{PoolError, PoolResult};
use crate::reading::CompensatedReading;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Identifier of a measurement session.
pub type SessionId = Uuid;

/// 24 hours of samples at 1 Hz.
pub const DEFAULT_CAPACITY: usize = 86_400;

/// Elapsed session time before a live preview verdict is offered.
pub const DEFAULT_PREVIEW_MIN_ELAPSED_SECS: f64 = 360.0;

/// Lifecycle state of a leak test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Baseline,
    Testing,
    Complete,
}

impl SessionState {
    /// Whether samples are accepted in this state.
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Baseline | SessionState::Testing)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Baseline => "baseline",
            SessionState::Testing => "testing",
            SessionState::Complete => "complete",
        };
        write!(f, "{}", label)
    }
}

// =============================================================================
// MeasurementSession - aggregate root
// =============================================================================

/// One leak test: state, bounded sample log and final result.
#[derive(Debug, Clone)]
pub struct MeasurementSession {
    id: SessionId,
    state: SessionState,
    start_time: Option<f64>,
    end_time: Option<f64>,
    samples: VecDeque<CompensatedReading>,
    capacity: usize,
    evicted: u64,
    result: Option<LeakVerdict>,
}

impl MeasurementSession {
    /// A session that has never been started.
    pub fn idle(capacity: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            start_time: None,
            end_time: None,
            samples: VecDeque::new(),
            capacity: capacity.max(1),
            evicted: 0,
            result: None,
        }
    }

    /// A fresh session in Baseline, started at `now`.
    pub fn started(capacity: usize, now: f64) -> Self {
        let mut session = Self::idle(capacity);
        session.state = SessionState::Baseline;
        session.start_time = Some(now);
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<f64> {
        self.end_time
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples dropped from the front because the log was full.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn samples(&self) -> &VecDeque<CompensatedReading> {
        &self.samples
    }

    pub fn latest(&self) -> Option<&CompensatedReading> {
        self.samples.back()
    }

    pub fn result(&self) -> Option<&LeakVerdict> {
        self.result.as_ref()
    }

    /// Seconds since the session entered Baseline, frozen once complete.
    pub fn elapsed_seconds(&self, now: f64) -> f64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => (end - start).max(0.0),
            (Some(start), None) => (now - start).max(0.0),
            _ => 0.0,
        }
    }

    /// Append a sample if the session is recording.
    ///
    /// Returns `false` (and leaves the log untouched) in Idle or Complete.
    /// When full, the oldest sample is evicted first.
    pub fn append(&mut self, reading: CompensatedReading) -> bool {
        if !self.state.is_recording() {
            return false;
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
            self.evicted += 1;
        }
        self.samples.push_back(reading);
        true
    }

    /// Samples strictly newer than `since`.
    pub fn samples_since(&self, since: f64) -> Vec<CompensatedReading> {
        self.samples
            .iter()
            .filter(|r| r.timestamp > since)
            .copied()
            .collect()
    }

    fn promote(&mut self) -> bool {
        if self.state != SessionState::Baseline {
            return false;
        }
        self.state = SessionState::Testing;
        true
    }

    fn complete(&mut self, now: f64, result: Option<LeakVerdict>) -> PoolResult<CompletedTest> {
        if !self.state.is_recording() {
            return Err(PoolError::InvalidTransition {
                operation: "stop a test",
                state: self.state,
            });
        }
        self.state = SessionState::Complete;
        self.end_time = Some(now);
        self.result = result;

        Ok(CompletedTest {
            session_id: self.id,
            result: self.result.clone(),
            readings_count: self.samples.len(),
            simulated_readings: self.samples.iter().filter(|r| r.is_simulated()).count(),
            start_time: self.start_time.unwrap_or(now),
            end_time: now,
        })
    }
}

/// Record handed to the result store when a test completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTest {
    pub session_id: SessionId,
    pub result: Option<LeakVerdict>,
    pub readings_count: usize,
    /// Readings appended from the simulator while the sensor was down.
    #[serde(default)]
    pub simulated_readings: usize,
    pub start_time: f64,
    pub end_time: f64,
}

/// Read-only view of the active session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub state: SessionState,
    pub start_time: Option<f64>,
    pub elapsed_seconds: f64,
    pub total_samples: usize,
    /// Samples with `timestamp > since`, oldest first.
    pub samples: Vec<CompensatedReading>,
    /// Most recent sample in the whole session.
    pub latest: Option<CompensatedReading>,
    /// Live verdict, only while Testing and past the preview threshold.
    pub preview: Option<LeakVerdict>,
    /// Final verdict, once Complete.
    pub result: Option<LeakVerdict>,
}

// =============================================================================
// SessionHandle - shared access
// =============================================================================

/// Tunables for the active session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    /// Maximum samples retained per session.
    pub capacity: usize,
    /// Elapsed seconds in a session before previews are computed.
    pub preview_min_elapsed_secs: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            preview_min_elapsed_secs: DEFAULT_PREVIEW_MIN_ELAPSED_SECS,
        }
    }
}

/// Cloneable, thread-safe handle to the single active session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<RwLock<MeasurementSession>>,
    analyzer: Arc<LeakAnalyzer>,
    config: SessionConfig,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.inner.read();
        f.debug_struct("SessionHandle")
            .field("session_id", &session.id())
            .field("state", &session.state())
            .field("samples", &session.len())
            .finish()
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new(SessionConfig::default(), LeakAnalyzer::default())
    }
}

impl SessionHandle {
    pub fn new(config: SessionConfig, analyzer: LeakAnalyzer) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MeasurementSession::idle(config.capacity))),
            analyzer: Arc::new(analyzer),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &LeakAnalyzer {
        &self.analyzer
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().state()
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.read().id()
    }

    pub fn elapsed_seconds(&self, now: f64) -> f64 {
        self.inner.read().elapsed_seconds(now)
    }

    /// Start a new test, discarding the previous session.
    ///
    /// # Errors
    /// `InvalidTransition` while a test is in Baseline or Testing; the running
    /// session is left untouched.
    pub fn start_test(&self, now: f64) -> PoolResult<SessionId> {
        let mut session = self.inner.write();
        if session.state().is_recording() {
            return Err(PoolError::InvalidTransition {
                operation: "start a test",
                state: session.state(),
            });
        }

        let previous = session.id();
        *session = MeasurementSession::started(self.config.capacity, now);
        info!(
            session_id = %session.id(),
            previous_session = %previous,
            "Leak test started, baseline phase"
        );
        Ok(session.id())
    }

    /// Append a reading to the active session.
    ///
    /// Safe from any state: outside Baseline/Testing the reading is dropped
    /// and `false` is returned.
    pub fn append(&self, reading: CompensatedReading) -> bool {
        self.inner.write().append(reading)
    }

    /// Move the given session from Baseline to Testing.
    ///
    /// A no-op returning `false` when `session_id` is no longer the active
    /// session or the session already left Baseline.
    pub fn promote_to_testing(&self, session_id: SessionId) -> bool {
        let mut session = self.inner.write();
        if session.id() != session_id {
            debug!(
                stale_session = %session_id,
                active_session = %session.id(),
                "Ignoring promotion for superseded session"
            );
            return false;
        }
        let promoted = session.promote();
        if promoted {
            info!(session_id = %session_id, samples = session.len(), "Baseline complete, testing started");
        } else {
            debug!(session_id = %session_id, state = %session.state(), "Promotion skipped");
        }
        promoted
    }

    /// Finish the active test and compute its verdict.
    ///
    /// # Errors
    /// `InvalidTransition` when Idle or already Complete.
    pub fn stop_test(&self, now: f64) -> PoolResult<CompletedTest> {
        let mut session = self.inner.write();
        let result = if session.state().is_recording() {
            self.analyzer.analyze(session.samples())
        } else {
            None
        };
        let completed = session.complete(now, result)?;
        info!(
            session_id = %completed.session_id,
            readings = completed.readings_count,
            classification = ?completed.result.as_ref().map(|r| r.classification),
            "Leak test complete"
        );
        Ok(completed)
    }

    /// Read-only view of samples newer than `since` plus session status.
    pub fn snapshot(&self, since: f64, now: f64) -> SessionSnapshot {
        let session = self.inner.read();
        let elapsed_seconds = session.elapsed_seconds(now);

        let preview = if session.state() == SessionState::Testing
            && elapsed_seconds >= self.config.preview_min_elapsed_secs
        {
            self.analyzer.analyze(session.samples())
        } else {
            None
        };

        SessionSnapshot {
            session_id: session.id(),
            state: session.state(),
            start_time: session.start_time(),
            elapsed_seconds,
            total_samples: session.len(),
            samples: session.samples_since(since),
            latest: session.latest().copied(),
            preview,
            result: session.result().cloned(),
        }
    }

    /// Run `f` against the active session under the read lock.
    pub fn with_session<R>(&self, f: impl FnOnce(&MeasurementSession) -> R) -> R {
        f(&self.inner.read())
    }
}
