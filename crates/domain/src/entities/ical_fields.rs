//! Free-form iCalendar keyword fields
//!
//! Callers of `save_object` describe an object as a list of properties
//! instead of (or on top of) a complete iCalendar payload.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{CalendarData, Component, Property, escape_text};
use crate::errors::DomainError;
use crate::value_objects::{DateValue, ObjectKind, ObjectUid, format_duration};

/// Ordered set of properties to write into an object's primary component
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcalFields {
    properties: Vec<Property>,
}

impl IcalFields {
    /// Empty field set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no field was given
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Fields in insertion order
    #[must_use]
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Value given for `name`, if any
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .rev()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.value.as_str())
    }

    /// Set an arbitrary property (raw value, no escaping)
    #[must_use]
    pub fn set(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.property(Property::new(name, value))
    }

    /// Set a fully built property
    #[must_use]
    pub fn property(mut self, prop: Property) -> Self {
        self.properties.retain(|p| !p.name.eq_ignore_ascii_case(&prop.name));
        self.properties.push(prop);
        self
    }

    fn text(self, name: &str, value: &str) -> Self {
        self.set(name, escape_text(value))
    }

    /// UID of the object
    #[must_use]
    pub fn uid(self, uid: &ObjectUid) -> Self {
        self.set("UID", uid.as_str())
    }

    /// SUMMARY
    #[must_use]
    pub fn summary(self, summary: &str) -> Self {
        self.text("SUMMARY", summary)
    }

    /// DESCRIPTION
    #[must_use]
    pub fn description(self, description: &str) -> Self {
        self.text("DESCRIPTION", description)
    }

    /// LOCATION
    #[must_use]
    pub fn location(self, location: &str) -> Self {
        self.text("LOCATION", location)
    }

    /// DTSTART
    #[must_use]
    pub fn dtstart(self, value: &DateValue) -> Self {
        self.property(value.to_property("DTSTART"))
    }

    /// DTEND
    #[must_use]
    pub fn dtend(self, value: &DateValue) -> Self {
        self.property(value.to_property("DTEND"))
    }

    /// DUE (todos)
    #[must_use]
    pub fn due(self, value: &DateValue) -> Self {
        self.property(value.to_property("DUE"))
    }

    /// DURATION
    #[must_use]
    pub fn duration(self, duration: Duration) -> Self {
        self.set("DURATION", format_duration(duration))
    }

    /// RRULE, e.g. `FREQ=WEEKLY;BYDAY=MO`
    #[must_use]
    pub fn rrule(self, rule: &str) -> Self {
        self.set("RRULE", rule)
    }

    /// STATUS
    #[must_use]
    pub fn status(self, status: &str) -> Self {
        self.set("STATUS", status.to_uppercase())
    }

    /// CATEGORIES as one comma-separated property
    #[must_use]
    pub fn categories(self, categories: &[&str]) -> Self {
        let joined = categories
            .iter()
            .map(|c| escape_text(c))
            .collect::<Vec<_>>()
            .join(",");
        self.set("CATEGORIES", joined)
    }

    /// CLASS (PUBLIC, PRIVATE, CONFIDENTIAL)
    #[must_use]
    pub fn class(self, class: &str) -> Self {
        self.set("CLASS", class.to_uppercase())
    }

    /// PRIORITY (0-9)
    #[must_use]
    pub fn priority(self, priority: u8) -> Self {
        self.set("PRIORITY", priority.min(9).to_string())
    }

    /// Write every field into `component`, replacing same-named properties
    pub fn apply_to(&self, component: &mut Component) {
        for prop in &self.properties {
            component.set_prop(prop.clone());
        }
    }

    /// Build a new single-component object of the given kind
    ///
    /// UID is generated when not given; DTSTAMP is always set to now.
    pub fn to_calendar_data(&self, kind: ObjectKind) -> Result<CalendarData, DomainError> {
        let mut component = Component::new(kind.component_name());
        let uid = match self.get("UID") {
            Some(uid) => ObjectUid::parse(uid)?,
            None => ObjectUid::generate(),
        };
        component.add_prop(Property::new("UID", uid.as_str()));
        component.add_prop(DateValue::Utc(Utc::now()).to_property("DTSTAMP"));
        self.apply_to(&mut component);
        CalendarData::from_components(vec![component])
    }
}
