//! Version tokens
//!
//! Every successful mutation of a document produces a new version. Sessions
//! capture the version they read and hand it back at commit time; the store
//! compares it against the current one.
//!
//! ## Invariants
//!
//! - `Version::ZERO` means "this identity has never been written"
//! - Two successive mutations of one identity never share a version
//! - Versions of one identity increase in commit order

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version token attached to a stored record
///
/// Versions are allocated by the store from a single monotonic counter, so
/// they are also totally ordered across identities. Callers should treat
/// them as opaque and only compare them for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The version of an identity that has never been written
    pub const ZERO: Version = Version(0);

    /// Create a version from its raw counter value
    pub const fn new(value: u64) -> Self {
        Version(value)
    }

    /// Get the numeric value
    ///
    /// Useful for storage and display.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Check whether this is the "never written" version
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::ZERO
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Version(value)
    }
}
