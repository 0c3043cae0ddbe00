//! iCalendar component tree
//!
//! Owned representation of components and properties. Parsing of the wire
//! text is delegated to the `icalendar` parser; this module converts its
//! borrowed tree and writes components back out.

use icalendar::parser;
use serde::{Deserialize, Serialize};

/// Maximum octets per content line before folding (RFC 5545 §3.1)
const MAX_LINE_OCTETS: usize = 75;

/// A single content line: `NAME;PARAM=VALUE:value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Property name, upper-case
    pub name: String,
    /// Parameters in document order, names upper-case
    pub params: Vec<(String, String)>,
    /// Raw (still escaped) value
    pub value: String,
}

impl Property {
    /// Create a property without parameters
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    /// Builder: add a parameter
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into().to_uppercase(), value.into()));
        self
    }

    /// Get a parameter value by name (case-insensitive)
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Value with TEXT escapes resolved
    #[must_use]
    pub fn text(&self) -> String {
        unescape_text(&self.value)
    }

    fn write_ical(&self, out: &mut String) {
        let mut line = self.name.clone();
        for (key, value) in &self.params {
            line.push(';');
            line.push_str(key);
            line.push('=');
            if value.contains([':', ';', ',']) {
                line.push('"');
                line.push_str(value);
                line.push('"');
            } else {
                line.push_str(value);
            }
        }
        line.push(':');
        line.push_str(&self.value);
        fold_line(&line, out);
    }
}

impl From<&parser::Property<'_>> for Property {
    fn from(prop: &parser::Property<'_>) -> Self {
        Self {
            name: prop.name.as_ref().to_uppercase(),
            params: prop
                .params
                .iter()
                .map(|p| {
                    (
                        p.key.as_ref().to_uppercase(),
                        p.val
                            .as_ref()
                            .map(|v| v.as_ref().trim_matches('"').to_string())
                            .unwrap_or_default(),
                    )
                })
                .collect(),
            value: prop.val.as_ref().to_string(),
        }
    }
}

/// A `BEGIN:NAME` … `END:NAME` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Component name, upper-case (e.g. `VEVENT`)
    pub name: String,
    /// Properties in document order
    pub properties: Vec<Property>,
    /// Nested components (e.g. `VALARM`)
    pub components: Vec<Component>,
}

impl Component {
    /// Create an empty component
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            properties: Vec::new(),
            components: Vec::new(),
        }
    }

    /// First property with the given name
    #[must_use]
    pub fn find_prop(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Raw value of the first property with the given name
    #[must_use]
    pub fn prop_value(&self, name: &str) -> Option<&str> {
        self.find_prop(name).map(|p| p.value.as_str())
    }

    /// All properties with the given name
    pub fn props<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Property> + 'a {
        self.properties
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
    }

    /// Replace every property named like `prop` with `prop`
    ///
    /// The replacement takes the position of the first removed property,
    /// or is appended when none existed.
    pub fn set_prop(&mut self, prop: Property) {
        match self
            .properties
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(&prop.name))
        {
            Some(index) => {
                let name = prop.name.clone();
                self.properties[index] = prop;
                let mut seen_first = false;
                self.properties.retain(|p| {
                    if !p.name.eq_ignore_ascii_case(&name) {
                        return true;
                    }
                    let keep = !seen_first;
                    seen_first = true;
                    keep
                });
            },
            None => self.properties.push(prop),
        }
    }

    /// Append a property, keeping existing ones with the same name
    pub fn add_prop(&mut self, prop: Property) {
        self.properties.push(prop);
    }

    /// Remove every property with the given name, returning how many went
    pub fn remove_prop(&mut self, name: &str) -> usize {
        let before = self.properties.len();
        self.properties.retain(|p| !p.name.eq_ignore_ascii_case(name));
        before - self.properties.len()
    }

    /// Serialize as iCalendar text (CRLF line endings, folded)
    pub fn write_ical(&self, out: &mut String) {
        fold_line(&format!("BEGIN:{}", self.name), out);
        for prop in &self.properties {
            prop.write_ical(out);
        }
        for child in &self.components {
            child.write_ical(out);
        }
        fold_line(&format!("END:{}", self.name), out);
    }
}

impl From<&parser::Component<'_>> for Component {
    fn from(component: &parser::Component<'_>) -> Self {
        Self {
            name: component.name.as_ref().to_uppercase(),
            properties: component.properties.iter().map(Property::from).collect(),
            components: component.components.iter().map(Self::from).collect(),
        }
    }
}

/// Write `line` folded at 75 octets, never splitting a UTF-8 sequence
fn fold_line(line: &str, out: &mut String) {
    let mut budget = MAX_LINE_OCTETS;
    let mut used = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if used + len > budget {
            out.push_str("\r\n ");
            // continuation lines lose one octet to the leading space
            budget = MAX_LINE_OCTETS - 1;
            used = 0;
        }
        out.push(ch);
        used += len;
    }
    out.push_str("\r\n");
}

/// Escape a TEXT value (RFC 5545 §3.3.11)
#[must_use]
pub fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {},
            other => escaped.push(other),
        }
    }
    escaped
}

/// Resolve TEXT escapes
#[must_use]
pub fn unescape_text(value: &str) -> String {
    let mut text = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            text.push(ch);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => text.push('\n'),
            Some(other) => text.push(other),
            None => text.push('\\'),
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Component {
        let mut event = Component::new("vevent");
        event.add_prop(Property::new("uid", "abc"));
        event.add_prop(Property::new("CATEGORIES", "Work"));
        event.add_prop(Property::new("SUMMARY", "Day"));
        event.add_prop(Property::new("CATEGORIES", "Shift"));
        event
    }

    #[test]
    fn names_are_uppercased() {
        let event = event();
        assert_eq!(event.name, "VEVENT");
        assert_eq!(event.prop_value("UID"), Some("abc"));
        assert_eq!(event.prop_value("uid"), Some("abc"));
    }

    #[test]
    fn set_prop_replaces_all_and_keeps_first_position() {
        let mut event = event();
        event.set_prop(Property::new("CATEGORIES", "Work,Shift"));
        let names: Vec<&str> = event.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["UID", "CATEGORIES", "SUMMARY"]);
        assert_eq!(event.prop_value("CATEGORIES"), Some("Work,Shift"));
    }

    #[test]
    fn set_prop_appends_when_missing() {
        let mut event = event();
        event.set_prop(Property::new("LOCATION", "Ward 3"));
        assert_eq!(
            event.properties.last().map(|p| p.name.as_str()),
            Some("LOCATION")
        );
    }

    #[test]
    fn remove_prop_counts_removed() {
        let mut event = event();
        assert_eq!(event.remove_prop("categories"), 2);
        assert_eq!(event.props("CATEGORIES").count(), 0);
    }

    #[test]
    fn param_lookup_is_case_insensitive() {
        let prop = Property::new("DTSTART", "20250101T080000").with_param("tzid", "Australia/Sydney");
        assert_eq!(prop.param("TZID"), Some("Australia/Sydney"));
        assert_eq!(prop.param("VALUE"), None);
    }

    #[test]
    fn write_ical_nests_components() {
        let mut event = event();
        let mut alarm = Component::new("VALARM");
        alarm.add_prop(Property::new("ACTION", "DISPLAY"));
        event.components.push(alarm);

        let mut out = String::new();
        event.write_ical(&mut out);
        assert!(out.starts_with("BEGIN:VEVENT\r\n"));
        assert!(out.contains("BEGIN:VALARM\r\nACTION:DISPLAY\r\nEND:VALARM\r\n"));
        assert!(out.ends_with("END:VEVENT\r\n"));
    }

    #[test]
    fn params_with_separators_are_quoted() {
        let prop = Property::new("ATTENDEE", "mailto:a@example.com").with_param("CN", "Doe, Jane");
        let mut out = String::new();
        prop.write_ical(&mut out);
        assert_eq!(out, "ATTENDEE;CN=\"Doe, Jane\":mailto:a@example.com\r\n");
    }

    #[test]
    fn long_lines_are_folded() {
        let prop = Property::new("DESCRIPTION", "x".repeat(200));
        let mut out = String::new();
        prop.write_ical(&mut out);
        for line in out.split("\r\n").filter(|l| !l.is_empty()) {
            assert!(line.len() <= MAX_LINE_OCTETS, "line too long: {}", line.len());
        }
        let unfolded = out.replace("\r\n ", "");
        assert_eq!(unfolded, format!("DESCRIPTION:{}\r\n", "x".repeat(200)));
    }

    #[test]
    fn folding_keeps_multibyte_characters_whole() {
        let prop = Property::new("SUMMARY", "ü".repeat(60));
        let mut out = String::new();
        prop.write_ical(&mut out);
        assert!(out.split("\r\n").all(|l| l.len() <= MAX_LINE_OCTETS));
        assert_eq!(out.replace("\r\n ", ""), format!("SUMMARY:{}\r\n", "ü".repeat(60)));
    }

    #[test]
    fn text_escaping() {
        let escaped = escape_text("a;b,c\\d\nline");
        assert_eq!(escaped, "a\\;b\\,c\\\\d\\nline");
        assert_eq!(unescape_text(&escaped), "a;b,c\\d\nline");
    }

    #[test]
    fn property_text_unescapes() {
        let prop = Property::new("SUMMARY", "Night\\, ward 3");
        assert_eq!(prop.text(), "Night, ward 3");
    }
}
