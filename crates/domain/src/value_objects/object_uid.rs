//! Calendar object UID value object
//!
//! # Examples
//!
//! ```
//! use caldav_domain::ObjectUid;
//! use uuid::Uuid;
//!
//! // Same namespace and name always give the same UID
//! let ns = Uuid::parse_str("48f80ff6-3ddd-4b70-9ad0-24459b3219bc").unwrap();
//! let a = ObjectUid::deterministic(&ns, "EMPLOYER:12345:20250210T080000");
//! let b = ObjectUid::deterministic(&ns, "EMPLOYER:12345:20250210T080000");
//! assert_eq!(a, b);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// The UID of a calendar object resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectUid(String);

impl ObjectUid {
    /// Random UID (UUID v4)
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Name-based UID (UUID v5, RFC 4122 §4.3)
    #[must_use]
    pub fn deterministic(namespace: &Uuid, name: &str) -> Self {
        Self(Uuid::new_v5(namespace, name.as_bytes()).to_string())
    }

    /// Wrap an existing UID
    ///
    /// UIDs are free text; only empty values and control characters
    /// (which cannot appear in a content line) are rejected.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        if s.trim().is_empty() || s.chars().any(char::is_control) {
            return Err(DomainError::InvalidUid(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The UID string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resource file name used when storing the object (`<uid>.ics`)
    ///
    /// Characters with a meaning in URL paths are percent-encoded.
    #[must_use]
    pub fn resource_name(&self) -> String {
        let mut name = String::with_capacity(self.0.len() + 4);
        for c in self.0.chars() {
            match c {
                '%' => name.push_str("%25"),
                ' ' => name.push_str("%20"),
                '/' => name.push_str("%2F"),
                '?' => name.push_str("%3F"),
                '#' => name.push_str("%23"),
                c => name.push(c),
            }
        }
        name.push_str(".ics");
        name
    }
}

impl fmt::Display for ObjectUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ObjectUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_uids_differ() {
        assert_ne!(ObjectUid::generate(), ObjectUid::generate());
    }

    #[test]
    fn deterministic_uid_is_stable() {
        let ns = Uuid::new_v4();
        let a = ObjectUid::deterministic(&ns, "SWSLHD:1:20250210T080000");
        let b = ObjectUid::deterministic(&ns, "SWSLHD:1:20250210T080000");
        let c = ObjectUid::deterministic(&ns, "SWSLHD:1:20250211T080000");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn parse_rejects_blank_and_control_characters() {
        assert!(ObjectUid::parse("").is_err());
        assert!(ObjectUid::parse("  ").is_err());
        assert!(ObjectUid::parse("a\nb").is_err());
        assert!(ObjectUid::parse("a\u{7}b").is_err());
        assert_eq!(
            ObjectUid::parse("Meeting 2025@example.com").map(|u| u.to_string()).ok(),
            Some("Meeting 2025@example.com".to_string())
        );
        assert_eq!(
            ObjectUid::parse("event-1@example.com").map(|u| u.to_string()).ok(),
            Some("event-1@example.com".to_string())
        );
    }

    #[test]
    fn resource_name_escapes_slashes() {
        let uid = ObjectUid::parse("a/b").expect("uid");
        assert_eq!(uid.resource_name(), "a%2Fb.ics");
        let uid = ObjectUid::parse("50%?#x").expect("uid");
        assert_eq!(uid.resource_name(), "50%25%3F%23x.ics");
        let uid = ObjectUid::parse("Meeting 2025@example.com").expect("uid");
        assert_eq!(uid.resource_name(), "Meeting%202025@example.com.ics");
    }
}
