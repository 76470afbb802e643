//! The scan session runner.
//!
//! [`ScanSession`] wires the four scan-path components into one attempt
//! loop: bridge transport → resolver → evaluator → recorder, with the
//! [`SessionMachine`] tracking lifecycle and the session owning the only
//! scan deadline. One session serves one scanning station.

use std::time::Duration;

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tessera_core::constants::DEFAULT_SCAN_TIMEOUT;
use tessera_core::{Decision, FacilityContext};
use tessera_scanner::{BridgeClient, BridgeClientConfig, BridgeError};
use tessera_store::{
    AccessEvent, EventRecorder, PolicyEvaluator, StoreError, TagResolver,
};

use crate::state_machine::{SessionMachine, SessionState};

/// Errors ending a scan attempt.
///
/// Policy denials are not errors: a denied scan completes normally with a
/// denied [`Decision`] in its [`ScanOutcome`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// Bridge transport failed (connect, codec, connection lost)
    #[error("Transport error: {0}")]
    Transport(#[from] BridgeError),

    /// No tag was presented within the scan window
    #[error("Scan timed out after {0}ms")]
    ScanTimeout(u64),

    /// Store failure while resolving, evaluating or recording
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid session state transition
    #[error("Session state error: {0}")]
    State(#[from] tessera_core::Error),

    /// The station re-entered scanning too fast too often; the session was
    /// force-reset and the operator should check the bridge
    #[error("Scan loop detected; session was reset")]
    StuckLoop,
}

/// Configuration for a scan session.
#[derive(Debug, Clone)]
pub struct ScanSessionConfig {
    /// Bridge transport settings.
    pub bridge: BridgeClientConfig,

    /// How long one attempt waits for a tag before failing.
    pub scan_timeout: Duration,
}

impl Default for ScanSessionConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeClientConfig::default(),
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }
}

/// The result of one completed scan attempt.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Correlation id for this attempt, present in all its log lines.
    pub attempt_id: Uuid,

    /// The identifier as scanned.
    pub tag_id: String,

    /// The evaluated decision, granted or denied.
    pub decision: Decision,

    /// The recorded event backing the decision. The write was durable
    /// before this outcome was returned.
    pub event: AccessEvent,
}

/// One scanning station's session: transport plus the scan pipeline.
pub struct ScanSession {
    context: FacilityContext,
    config: ScanSessionConfig,
    machine: SessionMachine,
    client: BridgeClient,
    resolver: TagResolver,
    evaluator: PolicyEvaluator,
    recorder: EventRecorder,
}

impl ScanSession {
    /// Create a session for one facility context over the given pool.
    pub fn new(pool: SqlitePool, context: FacilityContext, config: ScanSessionConfig) -> Self {
        Self {
            client: BridgeClient::new(config.bridge.clone()),
            resolver: TagResolver::new(pool.clone()),
            evaluator: PolicyEvaluator::new(pool.clone()),
            recorder: EventRecorder::new(pool),
            machine: SessionMachine::new(),
            context,
            config,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &SessionState {
        self.machine.current_state()
    }

    /// The recorder, for subscriptions and recent-event queries.
    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    /// Run one scan attempt to completion.
    ///
    /// Opens the transport if needed, waits up to the configured scan
    /// timeout for a tag, then resolves, evaluates and records it. A denied
    /// decision is a successful attempt; the session ends in `Decided`
    /// either way.
    ///
    /// Starting a new attempt while a previous one left the machine
    /// mid-flight force-closes the old transport first.
    ///
    /// # Errors
    ///
    /// - [`SessionError::ScanTimeout`] if no tag arrives in time; the
    ///   transport is closed and the machine ends in `Failed`
    /// - [`SessionError::Transport`] for bridge failures
    /// - [`SessionError::Store`] if resolution or recording fails
    /// - [`SessionError::StuckLoop`] if the stuck-loop valve tripped; the
    ///   session was reset
    pub async fn run_attempt(&mut self) -> Result<ScanOutcome, SessionError> {
        let attempt_id = Uuid::new_v4();

        match self.machine.current_state() {
            SessionState::Idle => {}
            SessionState::Decided | SessionState::Failed => {
                self.machine.transition_to(SessionState::Idle)?;
            }
            state => {
                // A previous attempt never finished; recover before starting
                warn!(attempt_id = %attempt_id, state = %state, "Resetting mid-flight session");
                self.client.close().await;
                self.machine.reset();
            }
        }

        self.machine.transition_to(SessionState::Scanning)?;
        self.machine.set_timeout(self.config.scan_timeout);

        if self.machine.is_stuck() {
            warn!(
                attempt_id = %attempt_id,
                context = %self.context,
                "Stuck scan loop detected; forcing session reset"
            );
            self.client.close().await;
            self.machine.reset();
            return Err(SessionError::StuckLoop);
        }

        if !self.client.is_connected() {
            if let Err(e) = self.client.connect().await {
                self.machine.transition_to(SessionState::Failed)?;
                return Err(e.into());
            }
        }

        info!(
            attempt_id = %attempt_id,
            context = %self.context,
            timeout_ms = self.config.scan_timeout.as_millis() as u64,
            "Scan attempt started"
        );

        let raw = match tokio::time::timeout(self.config.scan_timeout, self.client.next_scan())
            .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(attempt_id = %attempt_id, error = %e, "Transport failed mid-scan");
                self.client.close().await;
                self.machine.transition_to(SessionState::Failed)?;
                return Err(e.into());
            }
            Err(_) => {
                let waited = self.config.scan_timeout.as_millis() as u64;
                info!(attempt_id = %attempt_id, waited_ms = waited, "No tag presented in time");
                // No dangling channel after a timeout
                self.client.close().await;
                self.machine.transition_to(SessionState::Failed)?;
                return Err(SessionError::ScanTimeout(waited));
            }
        };

        self.machine.clear_timeout();
        self.machine.transition_to(SessionState::Resolving)?;
        debug!(attempt_id = %attempt_id, tag_id = %raw, "Tag received, resolving");

        let outcome = self.decide_and_record(attempt_id, &raw).await;
        match outcome {
            Ok(outcome) => {
                self.machine.transition_to(SessionState::Decided)?;
                info!(
                    attempt_id = %attempt_id,
                    event_id = outcome.event.id,
                    decision = %outcome.decision,
                    "Scan attempt decided"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(attempt_id = %attempt_id, error = %e, "Store failure during attempt");
                self.machine.transition_to(SessionState::Failed)?;
                Err(e)
            }
        }
    }

    async fn decide_and_record(
        &mut self,
        attempt_id: Uuid,
        raw: &str,
    ) -> Result<ScanOutcome, SessionError> {
        let resolution = self.resolver.resolve(raw).await?;
        let decision = self.evaluator.evaluate(&resolution, &self.context).await?;

        // Granted is only reported after the event write acknowledges
        let event = self
            .recorder
            .record(&resolution, &self.context, &decision)
            .await?;

        Ok(ScanOutcome {
            attempt_id,
            tag_id: resolution.tag_id,
            decision,
            event,
        })
    }

    /// Force the session back to Idle and close the transport.
    pub async fn reset(&mut self) {
        self.client.close().await;
        self.machine.reset();
    }

    /// Close the transport without touching session state.
    pub async fn close(&mut self) {
        self.client.close().await;
    }
}
