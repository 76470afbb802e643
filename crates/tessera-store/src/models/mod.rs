//! Database entity models.

pub mod access_event;
pub mod student;

pub use access_event::{AccessEvent, NewAccessEvent};
pub use student::Student;
