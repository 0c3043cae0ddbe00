//! DATE / DATE-TIME property values
//!
//! Covers the four forms RFC 5545 allows for DTSTART-like properties.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::entities::Property;
use crate::errors::DomainError;

const DATE_FORMAT: &str = "%Y%m%d";
const DATETIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// A DATE or DATE-TIME value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateValue {
    /// All-day value (`VALUE=DATE`)
    Date(NaiveDate),
    /// UTC instant (trailing `Z`)
    Utc(DateTime<Utc>),
    /// Local time without zone
    Floating(NaiveDateTime),
    /// Local time in a named zone (`TZID=`)
    Zoned { datetime: NaiveDateTime, tzid: String },
}

impl DateValue {
    /// Parse from a property, honouring `VALUE=DATE` and `TZID`
    pub fn from_property(prop: &Property) -> Result<Self, DomainError> {
        let raw = prop.value.trim();
        // multi-valued EXDATE/RDATE: first value only
        let raw = raw.split(',').next().unwrap_or(raw);
        let is_date = prop
            .param("VALUE")
            .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
            || raw.len() == 8;
        Self::parse(raw, is_date, prop.param("TZID"))
    }

    /// Parse every comma-separated value of a multi-valued property
    pub fn all_from_property(prop: &Property) -> Result<Vec<Self>, DomainError> {
        let is_date = prop
            .param("VALUE")
            .is_some_and(|v| v.eq_ignore_ascii_case("DATE"));
        let tzid = prop.param("TZID");
        prop.value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Self::parse(s, is_date || s.len() == 8, tzid))
            .collect()
    }

    fn parse(raw: &str, is_date: bool, tzid: Option<&str>) -> Result<Self, DomainError> {
        let invalid = || DomainError::InvalidDateTime(raw.to_string());

        if is_date {
            return NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .map(Self::Date)
                .map_err(|_| invalid());
        }

        if let Some(utc) = raw.strip_suffix('Z') {
            return NaiveDateTime::parse_from_str(utc, DATETIME_FORMAT)
                .map(|dt| Self::Utc(dt.and_utc()))
                .map_err(|_| invalid());
        }

        let datetime = NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).map_err(|_| invalid())?;
        Ok(match tzid {
            Some(tzid) => Self::Zoned {
                datetime,
                tzid: tzid.to_string(),
            },
            None => Self::Floating(datetime),
        })
    }

    /// Render as a property with matching parameters
    #[must_use]
    pub fn to_property(&self, name: &str) -> Property {
        let prop = Property::new(name, self.value_string());
        match self {
            Self::Date(_) => prop.with_param("VALUE", "DATE"),
            Self::Zoned { tzid, .. } => prop.with_param("TZID", tzid.clone()),
            Self::Utc(_) | Self::Floating(_) => prop,
        }
    }

    /// Value part only, without parameters
    #[must_use]
    pub fn value_string(&self) -> String {
        match self {
            Self::Date(d) => d.format(DATE_FORMAT).to_string(),
            Self::Utc(dt) => format!("{}Z", dt.format(DATETIME_FORMAT)),
            Self::Floating(dt) | Self::Zoned { datetime: dt, .. } => {
                dt.format(DATETIME_FORMAT).to_string()
            },
        }
    }

    /// Whether this is an all-day value
    #[must_use]
    pub const fn is_date(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// Resolve to a UTC instant
    ///
    /// Dates become midnight UTC and floating times are read as UTC. An
    /// unknown TZID falls back to UTC. Ambiguous local times take the
    /// earlier instant; times skipped by a DST change use the offset in
    /// effect before the change (RFC 5545 §3.3.5).
    #[must_use]
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            Self::Date(d) => d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
            Self::Utc(dt) => *dt,
            Self::Floating(dt) => dt.and_utc(),
            Self::Zoned { datetime, tzid } => tzid
                .parse::<Tz>()
                .ok()
                .and_then(|tz| resolve_local(&tz, datetime))
                .unwrap_or_else(|| datetime.and_utc()),
        }
    }

    /// Same kind of value shifted to the given UTC instant
    ///
    /// Used to place recurrence instances: the variant (and TZID) of `self`
    /// is kept, the wall-clock value follows `instant`.
    #[must_use]
    pub fn with_instant(&self, instant: DateTime<Utc>) -> Self {
        match self {
            Self::Date(_) => Self::Date(instant.date_naive()),
            Self::Utc(_) => Self::Utc(instant),
            Self::Floating(_) => Self::Floating(instant.naive_utc()),
            Self::Zoned { tzid, .. } => {
                let datetime = tzid.parse::<Tz>().map_or_else(
                    |_| instant.naive_utc(),
                    |tz| instant.with_timezone(&tz).naive_local(),
                );
                Self::Zoned {
                    datetime,
                    tzid: tzid.clone(),
                }
            },
        }
    }

    /// Canonical key for matching RECURRENCE-ID values
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Date(d) => d.format(DATE_FORMAT).to_string(),
            _ => format!("{}Z", self.to_utc().format(DATETIME_FORMAT)),
        }
    }
}

/// Local wall time in `tz` as a UTC instant
fn resolve_local(tz: &Tz, datetime: &NaiveDateTime) -> Option<DateTime<Utc>> {
    if let Some(dt) = tz.from_local_datetime(datetime).earliest() {
        return Some(dt.with_timezone(&Utc));
    }
    // inside a gap: an hour earlier is still on the old offset
    let step = Duration::hours(1);
    let before = datetime.checked_sub_signed(step)?;
    let resolved = tz.from_local_datetime(&before).earliest()?;
    resolved.with_timezone(&Utc).checked_add_signed(step)
}
