//! Domain entities - calendar data and the operations on it

mod calendar_data;
mod component;
mod ical_fields;
pub mod recurrence;

pub use calendar_data::{CalendarData, PRODID, recurrence_key};
pub use component::{Component, Property, escape_text, unescape_text};
pub use ical_fields::IcalFields;
pub use recurrence::expand;
