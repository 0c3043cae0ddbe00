//! Domain layer for the CalDAV client
//!
//! Calendar data model: iCalendar component trees, object kinds, date values,
//! time ranges, UIDs and recurrence expansion. Knows nothing about HTTP.

pub mod entities;
pub mod errors;
pub mod value_objects;

pub use entities::*;
pub use errors::DomainError;
pub use value_objects::*;
