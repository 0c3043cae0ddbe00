//! RRULE expansion for recurring calendar objects.
//!
//! Expands a stored series (master plus RECURRENCE-ID overrides) into one
//! standalone object per occurrence inside a time range.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rrule::RRuleSet;

use crate::entities::{CalendarData, Component, recurrence_key};
use crate::errors::DomainError;
use crate::value_objects::{DateValue, TimeRange, parse_duration};

/// Upper bound on generated occurrences per series
const MAX_OCCURRENCES: u16 = 1000;

/// Properties that only make sense on the master of a series
const SERIES_PROPERTIES: [&str; 3] = ["RRULE", "RDATE", "EXDATE"];

/// Expand `data` into its occurrences overlapping `range`
///
/// Non-recurring data is returned unchanged when it overlaps the range.
/// Every returned occurrence carries a RECURRENCE-ID, holds a single object
/// component (plus the series' VTIMEZONEs) and has no RRULE/RDATE/EXDATE.
/// Stored overrides replace the generated instance they match.
pub fn expand(data: &CalendarData, range: &TimeRange) -> Result<Vec<CalendarData>, DomainError> {
    if !data.is_recurring() {
        let overlaps = data.objects().any(|c| range.component_overlaps(c));
        return Ok(if overlaps { vec![data.clone()] } else { Vec::new() });
    }

    let Some(range_end) = range.end() else {
        return Err(DomainError::InvalidRecurrence(
            "expansion needs a bounded time range".to_string(),
        ));
    };

    let master = data
        .master()
        .ok_or_else(|| DomainError::MissingComponent("recurrence master".to_string()))?;
    let Some(dtstart) = master
        .find_prop("DTSTART")
        .map(DateValue::from_property)
        .transpose()?
    else {
        // no anchor to expand from
        let overlaps = range.component_overlaps(master);
        return Ok(if overlaps { vec![data.clone()] } else { Vec::new() });
    };

    let duration = instance_duration(master, &dtstart);
    // nothing occurs before DTSTART, so it bounds the window when the
    // instance length reaches past the earliest instant
    let window_start = range.start().map_or_else(
        || dtstart.to_utc(),
        |s| {
            s.checked_sub_signed(duration.max(Duration::zero()))
                .unwrap_or_else(|| dtstart.to_utc())
        },
    );

    let excluded: HashSet<String> = master
        .props("EXDATE")
        .filter_map(|p| DateValue::all_from_property(p).ok())
        .flatten()
        .map(|v| dtstart.with_instant(v.to_utc()).key())
        .collect();

    let mut instants = rule_instants(master, &dtstart, window_start, range_end)?;
    instants.extend(
        master
            .props("RDATE")
            .filter_map(|p| DateValue::all_from_property(p).ok())
            .flatten()
            .map(|v| v.to_utc())
            .filter(|i| *i >= window_start && *i < range_end),
    );
    instants.sort();
    instants.dedup();

    let timezones: Vec<Component> = data.timezones().cloned().collect();
    let mut generated_keys = HashSet::new();
    let mut occurrences: Vec<(DateTime<Utc>, Component)> = Vec::new();

    for instant in instants {
        let recurrence_id = dtstart.with_instant(instant);
        let key = recurrence_id.key();
        generated_keys.insert(key.clone());
        if excluded.contains(&key) {
            continue;
        }

        let instance = match data.find_override(&key) {
            Some(stored) => stored.clone(),
            None => build_instance(master, &recurrence_id, instant, duration),
        };
        if range.component_overlaps(&instance) {
            occurrences.push((start_of(&instance).unwrap_or(instant), instance));
        }
    }

    // overrides moved onto dates the rule does not produce
    for stored in data.overrides() {
        let Some(key) = recurrence_key(stored) else { continue };
        if generated_keys.contains(&key) || excluded.contains(&key) {
            continue;
        }
        if range.component_overlaps(stored) {
            let start = start_of(stored).unwrap_or(window_start);
            occurrences.push((start, stored.clone()));
        }
    }

    occurrences.sort_by_key(|(start, _)| *start);

    occurrences
        .into_iter()
        .map(|(_, instance)| {
            let mut components = timezones.clone();
            components.push(instance);
            CalendarData::from_components(components)
        })
        .collect()
}

/// Length of one instance: DTEND/DUE minus DTSTART, else DURATION
fn instance_duration(master: &Component, dtstart: &DateValue) -> Duration {
    let end = master
        .find_prop("DTEND")
        .or_else(|| master.find_prop("DUE"))
        .and_then(|p| DateValue::from_property(p).ok());
    match end {
        Some(end) => end.to_utc() - dtstart.to_utc(),
        None => master
            .prop_value("DURATION")
            .and_then(parse_duration)
            .unwrap_or_else(|| {
                if dtstart.is_date() {
                    Duration::days(1)
                } else {
                    Duration::zero()
                }
            }),
    }
}

/// Evaluate the RRULEs of `master` between `after` and `before`
fn rule_instants(
    master: &Component,
    dtstart: &DateValue,
    after: DateTime<Utc>,
    before: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>, DomainError> {
    let rules: Vec<String> = master
        .props("RRULE")
        .map(|p| normalize_until(&p.value))
        .collect();
    if rules.is_empty() {
        let start = dtstart.to_utc();
        return Ok(if start >= after && start < before {
            vec![start]
        } else {
            Vec::new()
        });
    }

    let mut lines = vec![dtstart_line(dtstart)];
    lines.extend(rules.iter().map(|r| format!("RRULE:{r}")));
    let rule_text = lines.join("\n");

    let rrule_set: RRuleSet = rule_text.parse().map_err(|e| {
        DomainError::InvalidRecurrence(format!("{}: {e}", rules.join(" / ")))
    })?;

    // after/before are exclusive; widen by a second to include the bounds
    let tz: rrule::Tz = Utc.into();
    let widened = after.checked_sub_signed(Duration::seconds(1)).unwrap_or(after);
    let result = rrule_set
        .after(widened.with_timezone(&tz))
        .before(before.with_timezone(&tz))
        .all(MAX_OCCURRENCES);

    Ok(result
        .dates
        .iter()
        .map(|d| d.with_timezone(&Utc))
        .filter(|d| *d >= after && *d < before)
        .collect())
}

/// DTSTART line the rrule parser accepts for every DateValue variant
///
/// Zones unknown to chrono-tz (e.g. Windows names such as
/// `AUS Eastern Standard Time`) are anchored in UTC, matching
/// [`DateValue::to_utc`].
fn dtstart_line(dtstart: &DateValue) -> String {
    match dtstart {
        DateValue::Date(d) => format!("DTSTART:{}T000000Z", d.format("%Y%m%d")),
        DateValue::Utc(_) => format!("DTSTART:{}", dtstart.value_string()),
        DateValue::Floating(dt) => format!("DTSTART:{}Z", dt.format("%Y%m%dT%H%M%S")),
        DateValue::Zoned { datetime, tzid } if tzid.parse::<chrono_tz::Tz>().is_ok() => format!(
            "DTSTART;TZID={tzid}:{}",
            datetime.format("%Y%m%dT%H%M%S")
        ),
        DateValue::Zoned { .. } => {
            format!("DTSTART:{}Z", dtstart.to_utc().format("%Y%m%dT%H%M%S"))
        },
    }
}

/// Rewrite UNTIL as a UTC date-time, which rrule requires
fn normalize_until(rule: &str) -> String {
    rule.split(';')
        .map(|part| match part.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") => {
                if value.len() == 8 {
                    format!("UNTIL={value}T235959Z")
                } else if value.ends_with('Z') {
                    part.to_string()
                } else {
                    format!("UNTIL={value}Z")
                }
            },
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Copy of the master placed at `instant`
fn build_instance(
    master: &Component,
    recurrence_id: &DateValue,
    instant: DateTime<Utc>,
    duration: Duration,
) -> Component {
    let mut instance = master.clone();
    for name in SERIES_PROPERTIES {
        instance.remove_prop(name);
    }
    instance.set_prop(recurrence_id.to_property("DTSTART"));
    // same value type and zone as DTSTART
    instance.set_prop(recurrence_id.to_property("RECURRENCE-ID"));

    // DTEND/DUE keep the master's offset from DTSTART
    let Some(end_instant) = instant.checked_add_signed(duration) else {
        return instance;
    };
    for end_name in ["DTEND", "DUE"] {
        if let Some(end) = master
            .find_prop(end_name)
            .and_then(|p| DateValue::from_property(p).ok())
        {
            instance.set_prop(end.with_instant(end_instant).to_property(end_name));
        }
    }
    instance
}

fn start_of(component: &Component) -> Option<DateTime<Utc>> {
    component
        .find_prop("DTSTART")
        .and_then(|p| DateValue::from_property(p).ok())
        .map(|v| v.to_utc())
}
