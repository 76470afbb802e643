//! Access policy evaluation.
//!
//! The evaluator turns a tag resolution plus a facility context into a
//! grant/deny [`Decision`]. A denial is a normal outcome, returned as
//! `Ok(Decision)`; only store failures during the history lookup are errors.
//!
//! # Evaluation flow
//!
//! 1. Unresolved tag: deny with "subject not found"
//! 2. Permission flag for the facility not set: deny with "no permission"
//! 3. Facility requires an assignment and the student's doesn't match:
//!    deny with "not assigned"
//! 4. Grant, in the direction opposite the student's last granted event in
//!    this exact context (first-ever grant is an entry)
//!
//! The toggle in step 4 consults granted events only: a denied attempt never
//! flips a student's entry/exit state.

use tracing::{debug, info};

use tessera_core::{Decision, EventKind, FacilityContext};

use crate::error::StoreResult;
use crate::messages::DenyReasons;
use crate::repositories::{AccessEventRepository, SqliteAccessEventRepository};
use crate::resolver::Resolution;

/// Evaluates scan resolutions against facility access policy.
pub struct PolicyEvaluator {
    events: SqliteAccessEventRepository,
}

impl PolicyEvaluator {
    /// Create an evaluator over the given pool.
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self {
            events: SqliteAccessEventRepository::new(pool),
        }
    }

    /// Evaluate one resolution in one facility context.
    ///
    /// # Errors
    ///
    /// Returns an error only if the last-granted-event lookup fails. Policy
    /// denials are `Ok`.
    pub async fn evaluate(
        &self,
        resolution: &Resolution,
        context: &FacilityContext,
    ) -> StoreResult<Decision> {
        let Some(student) = &resolution.student else {
            return Ok(deny_with_log(
                &resolution.tag_id,
                context,
                DenyReasons::SUBJECT_NOT_FOUND,
            ));
        };

        if !student.permits(context.facility) {
            return Ok(deny_with_log(
                &resolution.tag_id,
                context,
                DenyReasons::NO_PERMISSION,
            ));
        }

        if context.facility.requires_assignment() && !student.is_assigned_to(context) {
            return Ok(deny_with_log(
                &resolution.tag_id,
                context,
                DenyReasons::NOT_ASSIGNED,
            ));
        }

        let kind = match self.events.find_last_granted(student.id, context).await? {
            Some(last) => last.kind()?.opposite(),
            None => EventKind::Entry,
        };

        info!(
            student_id = student.id,
            context = %context,
            kind = %kind,
            "Access granted"
        );
        Ok(Decision::grant(kind))
    }
}

fn deny_with_log(tag_id: &str, context: &FacilityContext, reason: &str) -> Decision {
    debug!(tag_id = %tag_id, context = %context, reason = %reason, "Access denied");
    Decision::deny(reason)
}
