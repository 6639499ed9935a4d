//! Identifier newtypes.
//!
//! Tenant, candidate and job ids originate in the ATS and are opaque strings.
//! Internal rows (queue entries, events, access log rows) use UUIDs.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::limits::EXTERNAL_ID_PATTERN;

/// Compiled external id regex (lazy initialization).
static EXTERNAL_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(EXTERNAL_ID_PATTERN).expect("invalid external id pattern"));

/// Check an external identifier against the accepted format.
pub fn validate_external_id(kind: &str, value: &str) -> Result<()> {
    if EXTERNAL_ID_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid {kind} id: {value:?}")))
    }
}

macro_rules! external_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Parse and validate an id.
            pub fn parse(value: impl Into<String>) -> Result<Self> {
                let value = value.into();
                validate_external_id($kind, &value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }
    };
}

external_id!(
    /// Tenant isolation boundary.
    TenantId,
    "tenant"
);
external_id!(
    /// Candidate id as issued by the ATS.
    CandidateId,
    "candidate"
);
external_id!(
    /// Job (requisition) id as issued by the ATS.
    JobId,
    "job"
);
external_id!(
    /// Benchmark template id.
    TemplateId,
    "template"
);
