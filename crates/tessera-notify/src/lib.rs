//! Notification client for the Tessera access-control workspace.
//!
//! Appointment confirmations and similar messages go out through a small
//! mail-relay service; this crate is its HTTP client. It is deliberately
//! outside the scan path: nothing here blocks or fails a scan attempt.

pub mod client;

pub use client::{MailerClient, MailerConfig, Notification, NotifyError};
