//! Time range value object
//!
//! A half-open UTC interval used by calendar-query time-range filters and
//! by recurrence expansion. Either bound may be open.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Component;
use crate::errors::DomainError;
use crate::value_objects::DateValue;

const CALDAV_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// `[start, end)` in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Create a range, rejecting `start >= end`
    pub fn new(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self, DomainError> {
        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Err(DomainError::invalid_time_range(
                    s.format(CALDAV_FORMAT),
                    e.format(CALDAV_FORMAT),
                ));
            }
        }
        Ok(Self { start, end })
    }

    /// Bounded range
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DomainError> {
        Self::new(Some(start), Some(end))
    }

    /// Whole days from `start` through `end` inclusive
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self, DomainError> {
        let midnight = |d: NaiveDate| d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        Self::between(midnight(start), midnight(end) + Duration::days(1))
    }

    /// Open-ended range starting at `start`
    #[must_use]
    pub const fn from(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// Range ending (exclusive) at `end`
    #[must_use]
    pub const fn until(end: DateTime<Utc>) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    /// Range with no bounds
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// Inclusive start
    #[must_use]
    pub const fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    /// Exclusive end
    #[must_use]
    pub const fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// Whether both bounds are set
    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    /// Start formatted for a CalDAV `time-range` attribute
    #[must_use]
    pub fn caldav_start(&self) -> Option<String> {
        self.start.map(|s| s.format(CALDAV_FORMAT).to_string())
    }

    /// End formatted for a CalDAV `time-range` attribute
    #[must_use]
    pub fn caldav_end(&self) -> Option<String> {
        self.end.map(|e| e.format(CALDAV_FORMAT).to_string())
    }

    /// Whether the instance `[start, end)` overlaps this range
    ///
    /// A zero-length instance (`start == end`) overlaps when it lies inside
    /// the range, including on its start bound.
    #[must_use]
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let before_end = self.end.is_none_or(|range_end| start < range_end);
        let after_start = self.start.is_none_or(|range_start| {
            if start == end {
                range_start <= start
            } else {
                range_start < end
            }
        });
        before_end && after_start
    }

    /// Apply the per-component overlap rules of RFC 4791 §9.9
    #[must_use]
    pub fn component_overlaps(&self, component: &Component) -> bool {
        let date = |name: &str| {
            component
                .find_prop(name)
                .and_then(|p| DateValue::from_property(p).ok())
        };
        let duration = component.prop_value("DURATION").and_then(parse_duration);

        match component.name.as_str() {
            "VEVENT" => {
                let Some(dtstart) = date("DTSTART") else {
                    return self.start.is_none() && self.end.is_none();
                };
                let start = dtstart.to_utc();
                let end = date("DTEND").map_or_else(
                    || match duration {
                        Some(d) => offset_or_max(start, d),
                        None if dtstart.is_date() => offset_or_max(start, Duration::days(1)),
                        None => start,
                    },
                    |v| v.to_utc(),
                );
                self.overlaps(start, end)
            },
            "VTODO" => {
                let dtstart = date("DTSTART").map(|v| v.to_utc());
                let due = date("DUE").map(|v| v.to_utc());
                match (dtstart, due, duration) {
                    (Some(s), _, Some(d)) => self.overlaps(s, offset_or_max(s, d)),
                    (Some(s), Some(e), None) => self.overlaps(s.min(e), s.max(e)),
                    (Some(s), None, None) => self.overlaps(s, s),
                    (None, Some(e), _) => self.overlaps(e, e),
                    (None, None, _) => {
                        let completed = date("COMPLETED").map(|v| v.to_utc());
                        let created = date("CREATED").map(|v| v.to_utc());
                        match (completed, created) {
                            (Some(c), Some(cr)) => self.overlaps(cr.min(c), cr.max(c)),
                            (Some(c), None) | (None, Some(c)) => self.overlaps(c, c),
                            (None, None) => true,
                        }
                    },
                }
            },
            "VJOURNAL" => match date("DTSTART") {
                Some(v) if v.is_date() => {
                    let start = v.to_utc();
                    self.overlaps(start, offset_or_max(start, Duration::days(1)))
                },
                Some(v) => {
                    let start = v.to_utc();
                    self.overlaps(start, start)
                },
                None => false,
            },
            _ => false,
        }
    }
}

/// `start + duration`, or the latest representable instant on overflow
fn offset_or_max(start: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    start
        .checked_add_signed(duration)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Parse an RFC 5545 DURATION value (e.g. `PT10H`, `-P1D`, `P2W`)
///
/// Returns `None` for malformed values and for values too large to
/// represent.
#[must_use]
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (negative, rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let rest = rest.strip_prefix('P')?;

    let mut total = Duration::zero();
    let mut number = String::new();
    let mut in_time = false;
    for ch in rest.chars() {
        match ch {
            'T' => in_time = true,
            '0'..='9' => number.push(ch),
            unit => {
                let n: i64 = number.parse().ok()?;
                number.clear();
                let part = match (unit, in_time) {
                    ('W', false) => Duration::try_weeks(n),
                    ('D', false) => Duration::try_days(n),
                    ('H', true) => Duration::try_hours(n),
                    ('M', true) => Duration::try_minutes(n),
                    ('S', true) => Duration::try_seconds(n),
                    _ => return None,
                }?;
                total = total.checked_add(&part)?;
            },
        }
    }
    if !number.is_empty() {
        return None;
    }
    if negative {
        Duration::zero().checked_sub(&total)
    } else {
        Some(total)
    }
}

/// Format a duration as an RFC 5545 DURATION value
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let sign = if duration < Duration::zero() { "-" } else { "" };
    let secs = duration.num_seconds().abs();
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);

    let mut out = format!("{sign}P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || seconds > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds > 0 {
            out.push_str(&format!("{seconds}S"));
        }
    }
    if out.ends_with('P') {
        out.push_str("T0S");
    }
    out
}
