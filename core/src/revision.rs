//! Revisions, provenance labels and version-range decorators.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// One point in the tracked software-version timeline.
///
/// Ordered by its numeric components (`"10.0.0"` sorts after `"9.1.0"`),
/// displayed exactly as it was written.
///
/// # Examples
///
/// ```
/// use ipc_schema_core::Revision;
///
/// let old: Revision = "9.1.0".parse().unwrap();
/// let new: Revision = "10.0.0".parse().unwrap();
/// assert!(old < new);
/// assert_eq!(new.to_string(), "10.0.0");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision {
    text: String,
    parts: Vec<u32>,
}

impl Revision {
    /// Returns the numeric components.
    pub fn parts(&self) -> &[u32] {
        &self.parts
    }

    /// Returns the revision as written.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl FromStr for Revision {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Err(SchemaError::InvalidRevision(s.to_string()));
        }
        let parts = text
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| SchemaError::InvalidRevision(s.to_string()))?;
        Ok(Self {
            text: text.to_string(),
            parts,
        })
    }
}

impl TryFrom<String> for Revision {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Revision> for String {
    fn from(value: Revision) -> Self {
        value.text
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialEq for Revision {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for Revision {}

impl Hash for Revision {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts.hash(state);
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

/// Where an observation came from: a revision plus an origin label such as
/// `server-<module>` or `client-<trace>`.
///
/// Diagnostic only; never affects merge outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub revision: Revision,
    pub origin: String,
}

impl Provenance {
    pub fn new(revision: Revision, origin: impl Into<String>) -> Self {
        Self {
            revision,
            origin: origin.into(),
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.origin, self.revision)
    }
}

/// Computes the `@version(...)` decorator for a run of revisions relative to
/// a scope.
///
/// Returns `None` when the run covers the scope from its first to its last
/// revision. Otherwise the run renders as `R+` when it reaches the end of the
/// scope, `R` when it is a single revision and `R1-R2` in every other case.
///
/// # Examples
///
/// ```
/// use ipc_schema_core::{Revision, version_decorator};
///
/// let scope: Vec<Revision> = ["1.0.0", "2.0.0", "3.0.0", "4.0.0"]
///     .iter()
///     .map(|r| r.parse().unwrap())
///     .collect();
///
/// assert_eq!(version_decorator(&scope, &scope), None);
/// assert_eq!(
///     version_decorator(&scope[1..], &scope).as_deref(),
///     Some("@version(2.0.0+)")
/// );
/// assert_eq!(
///     version_decorator(&scope[..2], &scope).as_deref(),
///     Some("@version(1.0.0-2.0.0)")
/// );
/// ```
pub fn version_decorator(revisions: &[Revision], scope: &[Revision]) -> Option<String> {
    let (first, last) = (revisions.first()?, revisions.last()?);
    if Some(first) == scope.first() && Some(last) == scope.last() {
        return None;
    }
    if Some(last) == scope.last() {
        Some(format!("@version({first}+)"))
    } else if first == last {
        Some(format!("@version({first})"))
    } else {
        Some(format!("@version({first}-{last})"))
    }
}
