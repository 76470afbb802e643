//! Repository traits and SQLite implementations.

pub mod access_event;
pub mod student;

pub use access_event::{AccessEventRepository, SqliteAccessEventRepository};
pub use student::{SqliteStudentRepository, StudentRepository};
