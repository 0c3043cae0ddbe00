//! Calendar object kind value object
//!
//! The three calendar object resource types a CalDAV collection stores.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a calendar object resource
///
/// Maps to the iCalendar component names of RFC 5545.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// VEVENT
    Event,
    /// VTODO
    Todo,
    /// VJOURNAL
    Journal,
}

impl ObjectKind {
    /// All kinds, in query order
    pub const ALL: [Self; 3] = [Self::Event, Self::Todo, Self::Journal];

    /// iCalendar component name
    #[must_use]
    pub const fn component_name(self) -> &'static str {
        match self {
            Self::Event => "VEVENT",
            Self::Todo => "VTODO",
            Self::Journal => "VJOURNAL",
        }
    }

    /// Parse from an iCalendar component name (case-insensitive)
    #[must_use]
    pub fn from_component_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "VEVENT" => Some(Self::Event),
            "VTODO" => Some(Self::Todo),
            "VJOURNAL" => Some(Self::Journal),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => write!(f, "event"),
            Self::Todo => write!(f, "todo"),
            Self::Journal => write!(f, "journal"),
        }
    }
}

impl std::str::FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "event" | "vevent" => Ok(Self::Event),
            "todo" | "vtodo" => Ok(Self::Todo),
            "journal" | "vjournal" => Ok(Self::Journal),
            _ => Err(format!(
                "Invalid object kind: {s}. Use 'event', 'todo' or 'journal'"
            )),
        }
    }
}
