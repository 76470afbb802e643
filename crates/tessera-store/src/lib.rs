//! Persistence and policy core for the Tessera access-control workspace.
//!
//! This crate owns the SQLite-backed store for students and access events,
//! plus the three scan-path components that sit directly on it:
//!
//! - [`TagResolver`] - variant-tolerant tag-to-student lookup
//! - [`PolicyEvaluator`] - grant/deny with the entry/exit toggle rule
//! - [`EventRecorder`] - durable append into the event log plus live fan-out
//!
//! # Architecture
//!
//! Data access goes through repository traits ([`StudentRepository`],
//! [`AccessEventRepository`]) with SQLite implementations, so the scan-path
//! components stay testable against an in-memory database.
//!
//! The event log is append-only: rows are never updated, and the only
//! deletions are retention purges and the cascade when a student is removed.
//!
//! # Example
//!
//! ```no_run
//! use tessera_core::FacilityContext;
//! use tessera_store::{Database, DatabaseConfig, EventRecorder, PolicyEvaluator, TagResolver};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open(DatabaseConfig::new("tessera.db")).await?;
//!
//! let resolver = TagResolver::new(db.pool().clone());
//! let evaluator = PolicyEvaluator::new(db.pool().clone());
//! let recorder = EventRecorder::new(db.pool().clone());
//!
//! let context = FacilityContext::campus();
//! let resolution = resolver.resolve("04AB12CD").await?;
//! let decision = evaluator.evaluate(&resolution, &context).await?;
//! let event = recorder.record(&resolution, &context, &decision).await?;
//!
//! println!("{decision} -> event {}", event.id);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod messages;
pub mod models;
pub mod policy;
pub mod recorder;
pub mod repositories;
pub mod resolver;
pub mod subscriptions;

pub use connection::{Database, DatabaseConfig};
pub use error::{StoreError, StoreResult};
pub use messages::DenyReasons;
pub use models::{AccessEvent, NewAccessEvent, Student};
pub use policy::PolicyEvaluator;
pub use recorder::EventRecorder;
pub use repositories::{
    AccessEventRepository, SqliteAccessEventRepository, SqliteStudentRepository, StudentRepository,
};
pub use resolver::{Resolution, TagResolver};
pub use subscriptions::{EventQuery, EventSubscription, SubscriptionManager};
