//! Domain-level errors

use thiserror::Error;

/// Errors that can occur while building or interpreting calendar data
#[derive(Debug, Error)]
pub enum DomainError {
    /// The iCalendar text could not be parsed
    #[error("Invalid calendar data: {0}")]
    InvalidCalendarData(String),

    /// The calendar data holds no VEVENT, VTODO or VJOURNAL
    #[error("Missing component: {0}")]
    MissingComponent(String),

    /// Date/time parsing error
    #[error("Invalid date/time: {0}")]
    InvalidDateTime(String),

    /// Time range with start not before end
    #[error("Invalid time range: start {start} is not before end {end}")]
    InvalidTimeRange { start: String, end: String },

    /// Recurrence rule could not be evaluated
    #[error("Invalid recurrence: {0}")]
    InvalidRecurrence(String),

    /// UID is empty or malformed
    #[error("Invalid UID: {0}")]
    InvalidUid(String),

    /// Validation failed
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

impl DomainError {
    /// Create an invalid time range error
    pub fn invalid_time_range(start: impl ToString, end: impl ToString) -> Self {
        Self::InvalidTimeRange {
            start: start.to_string(),
            end: end.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_time_range_message() {
        let err = DomainError::invalid_time_range("20250102T000000Z", "20250101T000000Z");
        assert_eq!(
            err.to_string(),
            "Invalid time range: start 20250102T000000Z is not before end 20250101T000000Z"
        );
    }

    #[test]
    fn invalid_calendar_data_message() {
        let err = DomainError::InvalidCalendarData("unexpected EOF".to_string());
        assert_eq!(err.to_string(), "Invalid calendar data: unexpected EOF");
    }

    #[test]
    fn missing_component_message() {
        let err = DomainError::MissingComponent("VEVENT".to_string());
        assert_eq!(err.to_string(), "Missing component: VEVENT");
    }

    #[test]
    fn invalid_uid_message() {
        let err = DomainError::InvalidUid(String::new());
        assert_eq!(err.to_string(), "Invalid UID: ");
    }
}
