use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tessera_core::{Facility, FacilityContext};

/// An enrolled student and their access permissions.
///
/// Maps to the `students` table. Permission flags are one boolean per
/// facility; hostel access additionally requires the student's `hostel_id`
/// assignment to match the specific hostel being scanned.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Student {
    /// Primary key (0 for new, not-yet-inserted records)
    pub id: i64,

    /// Tag identifier exactly as stored at enrollment. Casing and prefixing
    /// vary across enrollment batches; lookups go through the resolver's
    /// candidate set, never raw string equality alone.
    pub tag_id: String,

    /// Display name
    pub name: String,

    pub allow_campus: bool,
    pub allow_hostel: bool,
    pub allow_library: bool,
    pub allow_medical: bool,
    pub allow_attendance: bool,

    /// Hostel the student is assigned to, if any (e.g. "BH-2")
    pub hostel_id: Option<String>,

    /// Room within the assigned hostel
    pub room: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    /// Whether the permission flag for the given facility is set.
    ///
    /// This is the flag only; assignment checks are separate, see
    /// [`is_assigned_to`](Student::is_assigned_to).
    #[must_use]
    pub fn permits(&self, facility: Facility) -> bool {
        match facility {
            Facility::Campus => self.allow_campus,
            Facility::Hostel => self.allow_hostel,
            Facility::Library => self.allow_library,
            Facility::Medical => self.allow_medical,
            Facility::Attendance => self.allow_attendance,
        }
    }

    /// Whether the student satisfies the context's assignment requirement.
    ///
    /// Contexts without an instance (campus, library, medical, attendance)
    /// always pass. Instanced contexts pass only when the student's
    /// `hostel_id` matches exactly.
    #[must_use]
    pub fn is_assigned_to(&self, context: &FacilityContext) -> bool {
        match &context.instance {
            None => true,
            Some(instance) => self.hostel_id.as_deref() == Some(instance.as_str()),
        }
    }
}
