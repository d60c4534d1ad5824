// crates/pipeline-core/src/identifiers.rs
// ============================================================================
// Module: Pipeline Engine Identifiers
// Description: Canonical opaque identifiers for accounts, pipelines, and runs.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every entity in the data model (`Docs/data-model.md` in the original
//! deployment) is addressed by an opaque identifier rather than a bare
//! `String`, so call sites cannot accidentally mix an account id with an
//! execution id. Identifiers never normalize or validate their contents;
//! callers are responsible for supplying well-formed values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Declares an opaque, string-backed identifier newtype with the standard
/// construction/display/conversion surface shared by every identifier in
/// this module.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(
    /// Tenant/account identifier; the PK prefix `ACCOUNT#<id>` embeds this value.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
    AccountId
);

string_id!(
    /// License identifier scoped to an account.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
    LicenseId
);

string_id!(
    /// Pipeline template identifier scoped to an account.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
    PipelineId
);

string_id!(
    /// Build job identifier scoped to an account (or to `BUILD_JOB#LIST` for
    /// dedicated data planes).
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
    BuildJobId
);

string_id!(
    /// Execution identifier: one run of a build job.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
    ExecutionId
);

string_id!(
    /// Node identifier within a compiled pipeline (an environment vertex).
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
    NodeId
);

string_id!(
    /// Stage identifier within a node.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
    StageId
);

string_id!(
    /// Inbox (approval request) item identifier.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
    InboxId
);

string_id!(
    /// Stored credential identifier.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
    CredentialId
);

string_id!(
    /// Audit record identifier.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
    AuditId
);

string_id!(
    /// Opaque resume token minted when an execution suspends for approval.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; carries no meaning beyond round-tripping through
    ///   a `PausedMarker`.
    ResumeToken
);
