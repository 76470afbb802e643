//! Scan session state machine.
//!
//! Tracks one scanning station's attempt lifecycle, enforcing valid
//! transitions, recording a bounded transition history, and watching for
//! the stuck-loop pattern where scanning restarts rapidly without ever
//! reaching a decision.
//!
//! # States and valid transitions
//!
//! - `Idle` → `Scanning` (transport opened, waiting for a tag)
//! - `Scanning` → `Resolving` (raw id received) or `Failed` (timeout,
//!   transport error)
//! - `Resolving` → `Decided` (decision recorded) or `Failed` (store error)
//! - `Decided` → `Idle`, `Failed` → `Idle`
//!
//! `reset()` forces `Idle` from any state; it is the error-recovery path
//! and the only transition that skips validation.
//!
//! # Examples
//!
//! ```
//! use tessera_session::{SessionMachine, SessionState};
//!
//! let mut machine = SessionMachine::new();
//! assert_eq!(machine.current_state(), &SessionState::Idle);
//!
//! machine.transition_to(SessionState::Scanning).unwrap();
//! machine.transition_to(SessionState::Resolving).unwrap();
//! machine.transition_to(SessionState::Decided).unwrap();
//! assert_eq!(machine.history().len(), 3);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use tessera_core::constants::{MAX_SESSION_HISTORY, STUCK_SCAN_THRESHOLD, STUCK_SCAN_WINDOW};
use tessera_core::{Error, Result};

/// States of one scan attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No attempt in progress.
    Idle,

    /// Transport open, waiting for a tag to be presented.
    Scanning,

    /// Raw id received; resolution, evaluation and recording in progress.
    Resolving,

    /// Decision recorded. Terminal for the attempt; stays until the caller
    /// starts the next attempt or resets.
    Decided,

    /// The attempt failed (timeout, transport or store error). Terminal for
    /// the attempt.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            SessionState::Idle => "Idle",
            SessionState::Scanning => "Scanning",
            SessionState::Resolving => "Resolving",
            SessionState::Decided => "Decided",
            SessionState::Failed => "Failed",
        };
        write!(f, "{}", state_str)
    }
}

impl SessionState {
    /// Check if transition to target state is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use tessera_session::SessionState;
    ///
    /// assert!(SessionState::Idle.can_transition_to(&SessionState::Scanning));
    /// assert!(!SessionState::Idle.can_transition_to(&SessionState::Decided));
    /// ```
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Idle, SessionState::Scanning)
                | (SessionState::Scanning, SessionState::Resolving | SessionState::Failed)
                | (SessionState::Resolving, SessionState::Decided | SessionState::Failed)
                | (SessionState::Decided, SessionState::Idle)
                | (SessionState::Failed, SessionState::Idle)
        )
    }

    /// Whether this state ends an attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Decided | SessionState::Failed)
    }
}

/// One recorded state transition.
///
/// The `timestamp` field is process-local and not serialized; on
/// deserialization it is set to the current time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,

    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: SessionState, to: SessionState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }

    /// Time elapsed since this transition occurred.
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// State machine for one scanning station's session.
///
/// Not thread-safe; each station owns one machine on one task.
pub struct SessionMachine {
    current_state: SessionState,

    /// When the current state was entered.
    state_entered_at: Instant,

    /// Bounded transition history, oldest first.
    history: VecDeque<StateTransition>,

    /// Optional deadline for the current state.
    current_timeout: Option<Duration>,

    /// Instants at which Scanning was entered, pruned to the stuck-loop
    /// window.
    scan_starts: VecDeque<Instant>,
}

impl SessionMachine {
    /// Create a new machine in the Idle state.
    pub fn new() -> Self {
        Self {
            current_state: SessionState::Idle,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_SESSION_HISTORY),
            current_timeout: None,
            scan_starts: VecDeque::new(),
        }
    }

    /// Get the current state.
    pub fn current_state(&self) -> &SessionState {
        &self.current_state
    }

    /// Time elapsed in the current state.
    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Arm a deadline for the current state.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.current_timeout = Some(timeout);
    }

    /// Disarm the current deadline.
    pub fn clear_timeout(&mut self) {
        self.current_timeout = None;
    }

    /// Whether the armed deadline has been exceeded.
    pub fn has_timed_out(&self) -> bool {
        self.current_timeout
            .is_some_and(|timeout| self.time_in_current_state() >= timeout)
    }

    /// Remaining time before the deadline, if armed and not yet exceeded.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.current_timeout.and_then(|timeout| {
            let elapsed = self.time_in_current_state();
            timeout.checked_sub(elapsed)
        })
    }

    /// The transition history, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Stuck-loop check: `true` once Scanning has been entered at least
    /// [`STUCK_SCAN_THRESHOLD`] times within [`STUCK_SCAN_WINDOW`].
    ///
    /// The pattern indicates a station cycling scan attempts without
    /// progress (wedged bridge, tag resting on a misconfigured reader);
    /// the runner must force a reset rather than keep spinning.
    pub fn is_stuck(&self) -> bool {
        let cutoff = Instant::now() - STUCK_SCAN_WINDOW;
        let recent = self
            .scan_starts
            .iter()
            .filter(|start| **start >= cutoff)
            .count();
        recent >= STUCK_SCAN_THRESHOLD
    }

    /// Transition to a new state, validating the transition.
    ///
    /// On success the transition is appended to history and any armed
    /// timeout is cleared. Entering `Scanning` is additionally counted for
    /// stuck-loop detection.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the transition is not in
    /// the allowed table.
    pub fn transition_to(&mut self, new_state: SessionState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);
        self.perform_state_change(new_state, transition.clone());

        Ok(transition)
    }

    /// Force the machine back to Idle from any state.
    ///
    /// Used for error recovery; skips transition validation but is still
    /// recorded in history. Stuck-loop tracking is not cleared, so a caller
    /// resetting in a tight loop still trips [`is_stuck`](Self::is_stuck).
    pub fn reset(&mut self) -> StateTransition {
        let transition = StateTransition::new(self.current_state, SessionState::Idle);
        self.perform_state_change(SessionState::Idle, transition.clone());
        transition
    }

    fn perform_state_change(&mut self, new_state: SessionState, transition: StateTransition) {
        self.current_state = new_state;
        self.state_entered_at = Instant::now();
        self.current_timeout = None;

        if new_state == SessionState::Scanning {
            self.record_scan_start();
        }

        self.history.push_back(transition);
        if self.history.len() > MAX_SESSION_HISTORY {
            self.history.pop_front();
        }
    }

    fn record_scan_start(&mut self) {
        let now = Instant::now();
        let cutoff = now - STUCK_SCAN_WINDOW;

        while self
            .scan_starts
            .front()
            .is_some_and(|start| *start < cutoff)
        {
            self.scan_starts.pop_front();
        }
        self.scan_starts.push_back(now);
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}
