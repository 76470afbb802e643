//! Deny reasons and status messages for scan evaluation results.
//!
//! Deny reasons are stored verbatim in the event log and shown on the
//! scanning station's result screen, so they are compile-time constants
//! rather than ad-hoc strings scattered through the evaluator.

/// Catalog of evaluation result messages.
///
/// Messages are short and ASCII-only so they render on every station
/// display variant in the field.
pub struct DenyReasons;

impl DenyReasons {
    /// The scanned tag resolved to no enrolled student, under any
    /// canonical variant.
    pub const SUBJECT_NOT_FOUND: &'static str = "subject not found";

    /// The student exists but lacks the permission flag for the facility
    /// being scanned.
    pub const NO_PERMISSION: &'static str = "no permission";

    /// The facility requires an assignment (hostels) and the student is
    /// assigned elsewhere or not at all.
    pub const NOT_ASSIGNED: &'static str = "not assigned";
}
