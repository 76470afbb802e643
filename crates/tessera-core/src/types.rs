use crate::{
    Result,
    constants::{KNOWN_TAG_PREFIX, MAX_TAG_LENGTH, MIN_TAG_LENGTH},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Raw scannable tag identifier (3-32 ASCII characters).
///
/// The id is stored as scanned, minus surrounding whitespace. No case
/// normalization is applied because enrollment records are themselves
/// inconsistent; matching against the store goes through [`candidates`]
/// instead.
///
/// # Security
/// Equality is constant-time to avoid timing side channels when comparing
/// credentials.
///
/// [`candidates`]: TagId::candidates
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct TagId(String);

impl TagId {
    /// Create a tag id with validation.
    ///
    /// The value is trimmed before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidTagFormat` if:
    /// - The trimmed length is not between 3-32 characters
    /// - The value contains non-ASCII characters
    pub fn new(raw: &str) -> Result<Self> {
        let raw = raw.trim();

        let len = raw.len();
        if !(MIN_TAG_LENGTH..=MAX_TAG_LENGTH).contains(&len) {
            return Err(Error::InvalidTagFormat(format!(
                "Tag id must be {MIN_TAG_LENGTH}-{MAX_TAG_LENGTH} chars, got {len}"
            )));
        }

        if !raw.is_ascii() {
            return Err(Error::InvalidTagFormat("Tag id must be ASCII".to_string()));
        }

        Ok(TagId(raw.to_string()))
    }

    /// Get the tag id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic candidate set for store lookup.
    ///
    /// Enrollment data has historically stored the same physical tag with
    /// inconsistent casing and with or without the [`KNOWN_TAG_PREFIX`]
    /// token. This is the single place that heuristic lives: the resolver
    /// performs one set-membership query over exactly these strings.
    ///
    /// The returned vector is de-duplicated and ordered from most to least
    /// likely: the id as scanned, case variants, prefixed form, then
    /// prefix-stripped forms with their case variants.
    #[must_use]
    pub fn candidates(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(8);
        let mut push = |s: String| {
            if !out.contains(&s) {
                out.push(s);
            }
        };

        push(self.0.clone());
        push(self.0.to_uppercase());
        push(self.0.to_lowercase());

        if let Some(stripped) = strip_prefix_ci(&self.0, KNOWN_TAG_PREFIX) {
            push(stripped.to_string());
            push(stripped.to_uppercase());
            push(stripped.to_lowercase());
        } else {
            push(format!("{KNOWN_TAG_PREFIX}{}", self.0));
            push(format!("{KNOWN_TAG_PREFIX}{}", self.0.to_uppercase()));
        }

        out
    }
}

/// Case-insensitive prefix strip. Returns the remainder if `s` starts with
/// `prefix` ignoring ASCII case.
fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TagId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TagId::new(s)
    }
}

/// Constant-time comparison implementation for TagId
impl PartialEq for TagId {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for TagId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Access domain being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facility {
    Campus,
    Hostel,
    Library,
    Medical,
    Attendance,
}

impl Facility {
    /// Stable storage identifier for this facility.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Facility::Campus => "campus",
            Facility::Hostel => "hostel",
            Facility::Library => "library",
            Facility::Medical => "medical",
            Facility::Attendance => "attendance",
        }
    }

    /// Whether access additionally requires a facility-specific assignment.
    ///
    /// Only hostels do: a student must be assigned to the specific hostel
    /// instance being scanned.
    #[must_use]
    pub fn requires_assignment(self) -> bool {
        matches!(self, Facility::Hostel)
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Facility {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "campus" => Ok(Facility::Campus),
            "hostel" => Ok(Facility::Hostel),
            "library" => Ok(Facility::Library),
            "medical" => Ok(Facility::Medical),
            "attendance" => Ok(Facility::Attendance),
            _ => Err(Error::UnknownFacility(s.to_string())),
        }
    }
}

/// A facility plus the specific instance being scanned, where one exists.
///
/// Campus, library, medical and attendance are singletons; hostels are
/// instanced (`hostel:BH-2`), and the instance participates in both policy
/// (assignment check) and event history (each hostel has its own entry/exit
/// toggle).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FacilityContext {
    pub facility: Facility,
    pub instance: Option<String>,
}

impl FacilityContext {
    /// Campus gate context.
    #[must_use]
    pub fn campus() -> Self {
        Self { facility: Facility::Campus, instance: None }
    }

    /// Library context.
    #[must_use]
    pub fn library() -> Self {
        Self { facility: Facility::Library, instance: None }
    }

    /// Medical-wing context.
    #[must_use]
    pub fn medical() -> Self {
        Self { facility: Facility::Medical, instance: None }
    }

    /// Exam attendance context.
    #[must_use]
    pub fn attendance() -> Self {
        Self { facility: Facility::Attendance, instance: None }
    }

    /// Context for one specific hostel.
    #[must_use]
    pub fn hostel(hostel_id: impl Into<String>) -> Self {
        Self {
            facility: Facility::Hostel,
            instance: Some(hostel_id.into()),
        }
    }
}

impl fmt::Display for FacilityContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{}:{}", self.facility, instance),
            None => write!(f, "{}", self.facility),
        }
    }
}

/// Direction of a granted access event.
///
/// Denied attempts have no real direction; they default to `Entry` when
/// recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Entry,
    Exit,
}

impl EventKind {
    /// The opposite direction, per the entry/exit toggle rule.
    #[inline]
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            EventKind::Entry => EventKind::Exit,
            EventKind::Exit => EventKind::Entry,
        }
    }

    /// Stable storage identifier for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Entry => "entry",
            EventKind::Exit => "exit",
        }
    }

    /// Returns `true` if kind is Entry.
    #[inline]
    #[must_use]
    pub fn is_entry(self) -> bool {
        matches!(self, EventKind::Entry)
    }

    /// Returns `true` if kind is Exit.
    #[inline]
    #[must_use]
    pub fn is_exit(self) -> bool {
        matches!(self, EventKind::Exit)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "entry" => Ok(EventKind::Entry),
            "exit" => Ok(EventKind::Exit),
            _ => Err(Error::UnknownEventKind(s.to_string())),
        }
    }
}

/// Grant/deny outcome of one scan attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Granted,
    Denied,
}

/// The result of evaluating one scan against one facility context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub kind: EventKind,
    pub outcome: Outcome,
    /// Human-readable denial reason; always present for denials, never for
    /// grants.
    pub reason: Option<String>,
}

impl Decision {
    /// A granted decision in the given direction.
    #[must_use]
    pub fn grant(kind: EventKind) -> Self {
        Self { kind, outcome: Outcome::Granted, reason: None }
    }

    /// A denied decision. Denials carry no real direction, so kind defaults
    /// to `Entry`.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Entry,
            outcome: Outcome::Denied,
            reason: Some(reason.into()),
        }
    }

    /// Returns `true` if the decision granted access.
    #[inline]
    #[must_use]
    pub fn is_granted(&self) -> bool {
        self.outcome == Outcome::Granted
    }

    /// Returns `true` if the decision denied access.
    #[inline]
    #[must_use]
    pub fn is_denied(&self) -> bool {
        self.outcome == Outcome::Denied
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.outcome, &self.reason) {
            (Outcome::Granted, _) => write!(f, "granted ({})", self.kind),
            (Outcome::Denied, Some(reason)) => write!(f, "denied: {reason}"),
            (Outcome::Denied, None) => write!(f, "denied"),
        }
    }
}
