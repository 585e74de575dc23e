// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque string identifiers used throughout the dispatch engine.
//!
//! Unlike most `oj` identifiers these are not internally generated: an
//! `IssueIdentifier` comes from the issue tracker and a `SessionKey` is
//! minted deterministically from `(identifier, phase, attempt)`, so both
//! are plain string newtypes rather than the random-suffix `IdBuf` scheme.

use std::borrow::Borrow;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }
    };
}

string_id!(
    /// Human-readable issue identifier (e.g. `"CT-100"`), the primary key
    /// of both `active` and `completed` dispatch maps.
    IssueIdentifier
);

string_id!(
    /// Tracker-internal issue id, distinct from the human-readable identifier.
    IssueId
);

string_id!(
    /// Opaque correlation key for a single worker or audit agent run.
    ///
    /// Minted as `linear-worker-<identifier>-<attempt>` or
    /// `linear-audit-<identifier>-<attempt>`; never parsed by the core.
    SessionKey
);

string_id!(
    /// Adapter-local session id for an `AgentRunner` invocation.
    AgentSessionId
);
