//! Scan session layer for the Tessera access-control workspace.
//!
//! A session is one scanning station's attempt loop: open the bridge
//! transport, wait (bounded) for a tag, resolve it, evaluate access and
//! record the event. The [`SessionMachine`] enforces the lifecycle and the
//! stuck-loop safety valve; [`ScanSession`] is the runner that drives the
//! whole pipeline.
//!
//! # Attempt lifecycle
//!
//! ```text
//! Idle ──> Scanning ──> Resolving ──> Decided ──> Idle
//!             │             │
//!             └──> Failed <─┘         (timeout, transport, store)
//! ```
//!
//! Decisions end in `Decided`, denials included; only timeouts and
//! infrastructure failures end in `Failed`.

pub mod session;
pub mod state_machine;

pub use session::{ScanOutcome, ScanSession, ScanSessionConfig, SessionError};
pub use state_machine::{SessionMachine, SessionState, StateTransition};
