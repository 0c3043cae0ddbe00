//! Value Objects - Immutable, identity-less domain primitives

mod date_value;
mod object_kind;
mod object_uid;
mod time_range;

pub use date_value::DateValue;
pub use object_kind::ObjectKind;
pub use object_uid::ObjectUid;
pub use time_range::{TimeRange, format_duration, parse_duration};
