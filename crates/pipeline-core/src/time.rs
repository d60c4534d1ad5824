// crates/pipeline-core/src/time.rs
// ============================================================================
// Module: Pipeline Engine Time Model
// Description: Canonical RFC-3339 timestamp representation for persisted records.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! All persisted timestamps are RFC-3339 strings in UTC (`spec.md` §6), so
//! that sort keys embedding a timestamp (`<iso>#<uuid>`) sort chronologically
//! as plain strings. This module is the single place that knows how to read
//! the wall clock and format it; everywhere else passes a [`Timestamp`]
//! value around.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// An RFC-3339, UTC timestamp.
///
/// # Invariants
/// - The wrapped string is always a valid RFC-3339 timestamp produced by
///   [`Timestamp::now`] or [`Timestamp::from_rfc3339`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// Captures the current wall-clock time as an RFC-3339 UTC timestamp.
    ///
    /// # Panics
    /// Never panics: `OffsetDateTime::now_utc()` cannot fail and RFC-3339
    /// formatting of a UTC offset cannot fail.
    #[must_use]
    #[allow(
        clippy::missing_panics_doc,
        reason = "formatting a UTC OffsetDateTime as RFC-3339 cannot fail"
    )]
    pub fn now() -> Self {
        let now = OffsetDateTime::now_utc();
        #[allow(clippy::unwrap_used, reason = "RFC-3339 formatting of now_utc() is infallible")]
        let formatted = now.format(&Rfc3339).unwrap();
        Self(formatted)
    }

    /// Parses an existing RFC-3339 string into a timestamp, validating it is
    /// well formed.
    ///
    /// # Errors
    /// Returns an error string if `raw` is not a valid RFC-3339 timestamp.
    pub fn from_rfc3339(raw: impl Into<String>) -> Result<Self, String> {
        let raw = raw.into();
        OffsetDateTime::parse(&raw, &Rfc3339).map_err(|err| err.to_string())?;
        Ok(Self(raw))
    }

    /// Returns the timestamp as an RFC-3339 string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
