//! Tag-to-student resolution.
//!
//! Enrollment records store tag ids inconsistently (case, `TAG-` prefix), so
//! a scanned identifier cannot be matched by raw equality. The resolver
//! tries an exact match first, then one set-membership query over the
//! deterministic candidate set from [`TagId::candidates`].
//!
//! Resolution never fails on a bad tag: unparseable or unmatched identifiers
//! produce an unresolved [`Resolution`], which the policy layer turns into a
//! denial. Only store failures surface as errors.
//!
//! [`TagId::candidates`]: tessera_core::TagId::candidates

use tracing::{debug, warn};

use tessera_core::TagId;

use crate::error::StoreResult;
use crate::models::Student;
use crate::repositories::{SqliteStudentRepository, StudentRepository};

/// The outcome of resolving one scanned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The identifier as scanned, trimmed. Recorded with the event whether
    /// or not a student matched.
    pub tag_id: String,

    /// The matched student, if any candidate variant matched enrollment.
    pub student: Option<Student>,
}

impl Resolution {
    /// Returns `true` if a student matched.
    #[must_use]
    pub fn is_found(&self) -> bool {
        self.student.is_some()
    }
}

/// Resolves scanned tag identifiers to enrolled students.
pub struct TagResolver {
    students: SqliteStudentRepository,
}

impl TagResolver {
    /// Create a resolver over the given pool.
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self {
            students: SqliteStudentRepository::new(pool),
        }
    }

    /// Resolve a raw scanned identifier.
    ///
    /// Lookup order:
    /// 1. Exact match on the trimmed identifier
    /// 2. One `IN` query over the canonical candidate set
    ///
    /// A malformed identifier (wrong length, non-ASCII) resolves to
    /// not-found rather than erroring; garbage on the wire is an access
    /// denial, not a system fault.
    ///
    /// # Errors
    ///
    /// Returns an error only when the underlying store queries fail.
    pub async fn resolve(&self, raw: &str) -> StoreResult<Resolution> {
        let tag = match TagId::new(raw) {
            Ok(tag) => tag,
            Err(e) => {
                warn!(raw = %raw.trim(), error = %e, "Malformed tag id; treating as unresolved");
                return Ok(Resolution {
                    tag_id: raw.trim().to_string(),
                    student: None,
                });
            }
        };

        if let Some(student) = self.students.find_by_tag(tag.as_str()).await? {
            debug!(tag_id = %tag, student_id = student.id, "Resolved by exact match");
            return Ok(Resolution {
                tag_id: tag.as_str().to_string(),
                student: Some(student),
            });
        }

        let candidates = tag.candidates();
        let student = self.students.find_by_tag_candidates(&candidates).await?;
        match &student {
            Some(student) => {
                debug!(
                    tag_id = %tag,
                    student_id = student.id,
                    stored_tag = %student.tag_id,
                    "Resolved by candidate variant"
                );
            }
            None => {
                debug!(tag_id = %tag, "Tag resolved to no student");
            }
        }

        Ok(Resolution {
            tag_id: tag.as_str().to_string(),
            student,
        })
    }
}
