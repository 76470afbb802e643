//! Shared constants for the Tessera access-control workspace.

use std::time::Duration;

/// Minimum accepted tag identifier length (characters, after trimming).
pub const MIN_TAG_LENGTH: usize = 3;

/// Maximum accepted tag identifier length (characters, after trimming).
///
/// NFC UIDs are at most 10 bytes (20 hex chars); 32 leaves headroom for
/// prefixed enrollment formats.
pub const MAX_TAG_LENGTH: usize = 32;

/// Prefix token historically prepended to tag ids by some enrollment screens.
///
/// Enrollment data is inconsistent: the same physical tag may be stored as
/// `04ab12cd`, `04AB12CD` or `TAG-04AB12CD` depending on which screen created
/// the record. The resolver tries all variants; see
/// [`TagId::candidates`](crate::types::TagId::candidates).
pub const KNOWN_TAG_PREFIX: &str = "TAG-";

/// Default window a scan session waits for a tag before giving up.
///
/// The source deployment used 20-30 s depending on the screen; 25 s is the
/// middle of that range.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(25);

/// Number of rapid re-entries into the scanning state that marks a session
/// as stuck (scanner bridge looping), within [`STUCK_SCAN_WINDOW`].
pub const STUCK_SCAN_THRESHOLD: usize = 5;

/// Observation window for stuck-loop detection.
pub const STUCK_SCAN_WINDOW: Duration = Duration::from_secs(10);

/// Default limit for "recent events" queries.
pub const DEFAULT_RECENT_LIMIT: i64 = 20;

/// Maximum number of state transitions kept in a session's history.
pub const MAX_SESSION_HISTORY: usize = 64;
