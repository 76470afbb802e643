//! Scan transport for the Tessera access-control workspace.
//!
//! The physical NFC scanner is not attached to this process: a small bridge
//! daemon owns the hardware and re-publishes scans as newline-delimited JSON
//! over a local TCP socket. This crate is the client side of that channel.
//!
//! # Architecture
//!
//! ```text
//! ScanSession
//!     │
//!     └─> BridgeClient ───(TCP, localhost)───> scanner bridge ──> NFC reader
//!            │
//!            └─> BridgeCodec (newline-delimited JSON)
//! ```
//!
//! Delivery is at-least-once and unordered within a session: the bridge may
//! re-emit a tag while it rests on the reader, and stray messages from other
//! consumers can appear. Callers must tolerate duplicates; the session layer
//! treats each delivery as an independent scan.

pub mod client;
pub mod codec;

pub use client::{BridgeClient, BridgeClientConfig, BridgeError};
pub use codec::{BridgeCodec, BridgeCommand, BridgeMessage};
