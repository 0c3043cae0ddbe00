//! Calendar data entity
//!
//! One iCalendar object as stored in a single calendar object resource:
//! a master component, optional RECURRENCE-ID overrides and the VTIMEZONEs
//! they reference.

use icalendar::parser::{read_calendar, unfold};
use serde::{Deserialize, Serialize};

use crate::entities::Component;
use crate::errors::DomainError;
use crate::value_objects::{DateValue, ObjectKind};

/// PRODID written on every object this library serializes
pub const PRODID: &str = "-//caldav-rs//CalDAV Client//EN";

/// Parsed content of one VCALENDAR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarData {
    components: Vec<Component>,
}

impl CalendarData {
    /// Wrap components, requiring at least one VEVENT/VTODO/VJOURNAL
    pub fn from_components(components: Vec<Component>) -> Result<Self, DomainError> {
        let data = Self { components };
        if data.objects().next().is_none() {
            return Err(DomainError::MissingComponent(
                "VEVENT, VTODO or VJOURNAL".to_string(),
            ));
        }
        Ok(data)
    }

    /// Parse iCalendar text
    pub fn parse(ical: &str) -> Result<Self, DomainError> {
        let unfolded = unfold(ical);
        let calendar = read_calendar(&unfolded)
            .map_err(|e| DomainError::InvalidCalendarData(e.to_string()))?;
        let components = calendar
            .components
            .iter()
            .flat_map(|c| {
                // some parser versions keep the VCALENDAR wrapper
                if c.name.as_ref().eq_ignore_ascii_case("VCALENDAR") {
                    c.components.iter().map(Component::from).collect::<Vec<_>>()
                } else {
                    vec![Component::from(c)]
                }
            })
            .collect();
        Self::from_components(components)
    }

    /// Serialize as a complete VCALENDAR
    #[must_use]
    pub fn to_ical(&self) -> String {
        let mut out = String::new();
        out.push_str("BEGIN:VCALENDAR\r\n");
        out.push_str("VERSION:2.0\r\n");
        out.push_str("PRODID:");
        out.push_str(PRODID);
        out.push_str("\r\n");
        for component in &self.components {
            component.write_ical(&mut out);
        }
        out.push_str("END:VCALENDAR\r\n");
        out
    }

    /// All components, VTIMEZONEs included
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// VEVENT/VTODO/VJOURNAL components
    pub fn objects(&self) -> impl Iterator<Item = &Component> {
        self.components
            .iter()
            .filter(|c| ObjectKind::from_component_name(&c.name).is_some())
    }

    /// VTIMEZONE components
    pub fn timezones(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(|c| c.name == "VTIMEZONE")
    }

    /// Kind of the stored object
    #[must_use]
    pub fn kind(&self) -> Option<ObjectKind> {
        self.objects()
            .next()
            .and_then(|c| ObjectKind::from_component_name(&c.name))
    }

    /// UID shared by the master and its overrides
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.objects().find_map(|c| c.prop_value("UID"))
    }

    fn master_index(&self) -> Option<usize> {
        let is_object = |c: &Component| ObjectKind::from_component_name(&c.name).is_some();
        self.components
            .iter()
            .position(|c| is_object(c) && c.find_prop("RECURRENCE-ID").is_none())
            .or_else(|| self.components.iter().position(is_object))
    }

    /// The master component (the one without RECURRENCE-ID)
    ///
    /// Falls back to the first object component when the data only holds
    /// overrides, which is the case for an expanded occurrence.
    #[must_use]
    pub fn master(&self) -> Option<&Component> {
        self.master_index().map(|i| &self.components[i])
    }

    /// Mutable access to the master component
    pub fn master_mut(&mut self) -> Option<&mut Component> {
        self.master_index().map(move |i| &mut self.components[i])
    }

    /// Components carrying a RECURRENCE-ID
    pub fn overrides(&self) -> impl Iterator<Item = &Component> {
        self.objects()
            .filter(|c| c.find_prop("RECURRENCE-ID").is_some())
    }

    /// Whether the master has an RRULE or RDATE
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        self.master().is_some_and(|m| {
            m.find_prop("RECURRENCE-ID").is_none()
                && (m.find_prop("RRULE").is_some() || m.find_prop("RDATE").is_some())
        })
    }

    /// Override whose RECURRENCE-ID has the given key
    #[must_use]
    pub fn find_override(&self, key: &str) -> Option<&Component> {
        self.overrides().find(|c| recurrence_key(c).as_deref() == Some(key))
    }

    /// Insert an override, replacing one with the same RECURRENCE-ID
    pub fn upsert_override(&mut self, component: Component) -> Result<(), DomainError> {
        let key = recurrence_key(&component).ok_or_else(|| {
            DomainError::ValidationError("override has no RECURRENCE-ID".to_string())
        })?;
        match self
            .components
            .iter()
            .position(|c| recurrence_key(c).as_deref() == Some(key.as_str()))
        {
            Some(index) => self.components[index] = component,
            None => self.components.push(component),
        }
        Ok(())
    }

    /// Remove the override with the given key, returning whether one existed
    pub fn remove_override(&mut self, key: &str) -> bool {
        let before = self.components.len();
        self.components
            .retain(|c| recurrence_key(c).as_deref() != Some(key));
        before != self.components.len()
    }
}

/// RECURRENCE-ID key of a component, if it has a parsable one
#[must_use]
pub fn recurrence_key(component: &Component) -> Option<String> {
    component
        .find_prop("RECURRENCE-ID")
        .and_then(|p| DateValue::from_property(p).ok())
        .map(|v| v.key())
}

impl std::str::FromStr for CalendarData {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for CalendarData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_ical())
    }
}
