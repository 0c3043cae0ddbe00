//! Calendar object resource
//!
//! One `.ics` resource in a calendar. After an expanded search, several
//! handles may share one resource: each holds a single occurrence and
//! writes go back into the stored series.

use caldav_domain::{
    CalendarData, Component, DateValue, ObjectKind, Property, recurrence_key, unescape_text,
};
use chrono::{DateTime, Utc};
use reqwest::Url;
use tracing::{debug, instrument};

use crate::client::DavClient;
use crate::error::CalDavError;

/// Properties that keep the master's schedule when an occurrence is saved
/// for the whole series
const SCHEDULE_PROPERTIES: [&str; 6] = ["DTSTART", "DTEND", "DUE", "DURATION", "RECURRENCE-ID", "RRULE"];

/// Options for [`CalendarObjectResource::save`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Fail with [`CalDavError::Consistency`] if the resource exists
    pub no_overwrite: bool,
    /// Fail with [`CalDavError::Consistency`] if the resource does not exist
    pub no_create: bool,
    /// For an occurrence: apply its changes to the whole series
    pub all_recurrences: bool,
}

impl SaveOptions {
    #[must_use]
    pub const fn all_recurrences() -> Self {
        Self {
            no_overwrite: false,
            no_create: false,
            all_recurrences: true,
        }
    }
}

/// An event, todo or journal stored in a calendar
#[derive(Debug, Clone)]
pub struct CalendarObjectResource {
    client: DavClient,
    url: Url,
    etag: Option<String>,
    data: Option<CalendarData>,
}

impl CalendarObjectResource {
    pub(crate) fn new(
        client: DavClient,
        url: Url,
        etag: Option<String>,
        data: CalendarData,
    ) -> Self {
        Self {
            client,
            url,
            etag,
            data: Some(data),
        }
    }

    /// Handle whose data still has to be [`load`](Self::load)ed
    pub(crate) const fn unloaded(client: DavClient, url: Url) -> Self {
        Self {
            client,
            url,
            etag: None,
            data: None,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// ETag of the stored resource, when known
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Parsed calendar data
    pub fn data(&self) -> Option<&CalendarData> {
        self.data.as_ref()
    }

    /// Replace the calendar data; [`save`](Self::save) writes it
    pub fn set_data(&mut self, data: CalendarData) {
        self.data = Some(data);
    }

    pub fn kind(&self) -> Option<ObjectKind> {
        self.data.as_ref().and_then(CalendarData::kind)
    }

    pub fn uid(&self) -> Option<&str> {
        self.data.as_ref().and_then(CalendarData::uid)
    }

    /// The primary component: the master, or the single occurrence of an
    /// expanded search result
    pub fn component(&self) -> Option<&Component> {
        self.data.as_ref().and_then(CalendarData::master)
    }

    pub fn component_mut(&mut self) -> Option<&mut Component> {
        self.data.as_mut().and_then(CalendarData::master_mut)
    }

    /// Unescaped text of a property of the primary component
    pub fn property(&self, name: &str) -> Option<String> {
        self.component()
            .and_then(|c| c.prop_value(name))
            .map(unescape_text)
    }

    /// iCalendar text of the held data
    pub fn ical(&self) -> Option<String> {
        self.data.as_ref().map(CalendarData::to_ical)
    }

    /// RECURRENCE-ID of the primary component
    pub fn recurrence_id(&self) -> Option<DateValue> {
        self.component()
            .and_then(|c| c.find_prop("RECURRENCE-ID"))
            .and_then(|p| DateValue::from_property(p).ok())
    }

    /// Whether this handle holds one occurrence of a recurring series
    pub fn is_occurrence(&self) -> bool {
        self.data.as_ref().is_some_and(|d| {
            d.objects().count() == 1 && d.objects().all(|c| c.find_prop("RECURRENCE-ID").is_some())
        })
    }

    /// Start of the primary component (DTSTART, else DUE)
    pub fn start(&self) -> Option<DateTime<Utc>> {
        let component = self.component()?;
        component
            .find_prop("DTSTART")
            .or_else(|| component.find_prop("DUE"))
            .and_then(|p| DateValue::from_property(p).ok())
            .map(|v| v.to_utc())
    }

    fn require_data(&self) -> Result<&CalendarData, CalDavError> {
        self.data
            .as_ref()
            .ok_or_else(|| CalDavError::InvalidInput(format!("{} has not been loaded", self.url)))
    }

    /// Fetch the stored resource, replacing the held data and ETag
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn load(&mut self) -> Result<(), CalDavError> {
        let (data, etag) = self.fetch().await?;
        self.data = Some(data);
        self.etag = etag;
        Ok(())
    }

    async fn fetch(&self) -> Result<(CalendarData, Option<String>), CalDavError> {
        let response = self.client.get(&self.url).await?;
        debug!(body_length = response.body.len(), "Fetched calendar object");
        Ok((CalendarData::parse(&response.body)?, response.etag))
    }

    /// Write the object back to the server
    ///
    /// An occurrence is merged into its stored series: as an override, or
    /// with `all_recurrences` into the master itself.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn save(&mut self, options: SaveOptions) -> Result<(), CalDavError> {
        if options.no_overwrite && options.no_create {
            return Err(CalDavError::InvalidInput(
                "no_overwrite and no_create cannot both be set".to_string(),
            ));
        }
        if self.is_occurrence() {
            return self.save_occurrence(options.all_recurrences).await;
        }

        let body = self.require_data()?.to_ical();
        let mut conditions = Vec::new();
        if options.no_overwrite {
            conditions.push(("If-None-Match", "*".to_string()));
        }
        match (&self.etag, options.no_create) {
            (Some(etag), _) if !options.no_overwrite => conditions.push(("If-Match", etag.clone())),
            (_, true) => conditions.push(("If-Match", "*".to_string())),
            _ => {},
        }
        self.put(body, conditions).await
    }

    async fn put(
        &mut self,
        body: String,
        conditions: Vec<(&'static str, String)>,
    ) -> Result<(), CalDavError> {
        let response = self.client.put(&self.url, body, conditions).await?;
        debug!(status = response.status, "Stored calendar object");
        self.etag = response.etag;
        if let Some(location) = response.location {
            self.url = self.client.resolve(&location)?;
        }
        Ok(())
    }

    async fn save_occurrence(&mut self, all_recurrences: bool) -> Result<(), CalDavError> {
        let occurrence = self
            .component()
            .cloned()
            .ok_or_else(|| CalDavError::InvalidInput("occurrence has no component".to_string()))?;
        let (mut series, etag) = self.fetch().await?;

        if all_recurrences {
            let master = series
                .master_mut()
                .filter(|m| m.find_prop("RECURRENCE-ID").is_none())
                .ok_or_else(|| {
                    CalDavError::InvalidInput("stored series has no master component".to_string())
                })?;
            copy_into_master(&occurrence, master);
        } else {
            series.upsert_override(occurrence)?;
        }

        let conditions = etag.map(|e| vec![("If-Match", e)]).unwrap_or_default();
        self.put(series.to_ical(), conditions).await
    }

    /// Delete the object
    ///
    /// An occurrence without `all_recurrences` is removed from its series by
    /// an EXDATE; everything else deletes the whole resource.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn delete(&mut self, all_recurrences: bool) -> Result<(), CalDavError> {
        if !self.is_occurrence() || all_recurrences {
            return self.client.delete(&self.url, self.etag.as_deref()).await;
        }

        let rid = self
            .recurrence_id()
            .ok_or_else(|| CalDavError::InvalidInput("occurrence has no RECURRENCE-ID".to_string()))?;
        let key = self.component().and_then(recurrence_key).unwrap_or_else(|| rid.key());
        let (mut series, etag) = self.fetch().await?;

        let Some(master) = series
            .master_mut()
            .filter(|m| m.find_prop("RECURRENCE-ID").is_none())
        else {
            // only overrides stored: nothing left to exclude from
            return self.client.delete(&self.url, etag.as_deref()).await;
        };
        let exdate = master
            .find_prop("DTSTART")
            .and_then(|p| DateValue::from_property(p).ok())
            .map_or_else(|| rid.clone(), |start| start.with_instant(rid.to_utc()));
        master.add_prop(exdate.to_property("EXDATE"));
        series.remove_override(&key);

        let conditions = etag.map(|e| vec![("If-Match", e)]).unwrap_or_default();
        self.put(series.to_ical(), conditions).await
    }

    /// Mark a todo as completed at `at` and save it
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn complete(&mut self, at: DateTime<Utc>) -> Result<(), CalDavError> {
        if self.kind() != Some(ObjectKind::Todo) {
            return Err(CalDavError::InvalidInput(
                "only todos can be completed".to_string(),
            ));
        }
        let todo = self
            .component_mut()
            .ok_or_else(|| CalDavError::InvalidInput("todo has no component".to_string()))?;
        todo.set_prop(Property::new("STATUS", "COMPLETED"));
        todo.set_prop(Property::new("PERCENT-COMPLETE", "100"));
        todo.set_prop(DateValue::Utc(at).to_property("COMPLETED"));
        self.save(SaveOptions::default()).await
    }
}

/// Copy everything but the schedule from `occurrence` into `master` and
/// bump SEQUENCE
fn copy_into_master(occurrence: &Component, master: &mut Component) {
    let sequence = |c: &Component| {
        c.prop_value("SEQUENCE")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(0)
    };
    let next_sequence = sequence(master).max(sequence(occurrence)) + 1;

    let mut names: Vec<&str> = occurrence
        .properties
        .iter()
        .map(|p| p.name.as_str())
        .filter(|n| !SCHEDULE_PROPERTIES.iter().any(|s| s.eq_ignore_ascii_case(n)))
        .collect();
    names.dedup();
    for name in names {
        master.remove_prop(name);
        for prop in occurrence.props(name) {
            master.add_prop(prop.clone());
        }
    }
    master.components.clone_from(&occurrence.components);
    master.set_prop(Property::new("SEQUENCE", next_sequence.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    const TODO: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n\
BEGIN:VTODO\r\nUID:todo-1\r\nSUMMARY:Buy milk\\, bread\r\nDUE:20250210T170000Z\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";

    fn object(ical: &str) -> CalendarObjectResource {
        let client = DavClient::connect(Some("https://dav.example.com/"), None, None);
        CalendarObjectResource::new(
            client,
            Url::parse("https://dav.example.com/cal/todo-1.ics").expect("url"),
            Some("\"1\"".to_string()),
            CalendarData::parse(ical).expect("data"),
        )
    }

    #[test]
    fn accessors() {
        let todo = object(TODO);
        assert_eq!(todo.kind(), Some(ObjectKind::Todo));
        assert_eq!(todo.uid(), Some("todo-1"));
        assert_eq!(todo.etag(), Some("\"1\""));
        assert_eq!(todo.property("SUMMARY").as_deref(), Some("Buy milk, bread"));
        assert!(!todo.is_occurrence());
        assert!(todo.recurrence_id().is_none());
        assert_eq!(todo.start().map(|s| s.to_rfc3339()).as_deref(), Some("2025-02-10T17:00:00+00:00"));
        assert!(todo.ical().is_some_and(|i| i.contains("UID:todo-1")));
    }

    #[test]
    fn occurrence_detection() {
        let ical = TODO.replace("UID:todo-1\r\n", "UID:todo-1\r\nRECURRENCE-ID:20250210T170000Z\r\n");
        let occurrence = object(&ical);
        assert!(occurrence.is_occurrence());
        assert_eq!(
            occurrence.recurrence_id().map(|r| r.key()).as_deref(),
            Some("20250210T170000Z")
        );
    }

    #[test]
    fn copy_into_master_keeps_schedule() {
        let mut master = Component::new("VEVENT");
        master.add_prop(Property::new("UID", "s"));
        master.add_prop(Property::new("DTSTART", "20250203T080000Z"));
        master.add_prop(Property::new("RRULE", "FREQ=DAILY"));
        master.add_prop(Property::new("SUMMARY", "Day"));
        master.add_prop(Property::new("SEQUENCE", "2"));

        let mut occurrence = Component::new("VEVENT");
        occurrence.add_prop(Property::new("UID", "s"));
        occurrence.add_prop(Property::new("RECURRENCE-ID", "20250205T080000Z"));
        occurrence.add_prop(Property::new("DTSTART", "20250205T100000Z"));
        occurrence.add_prop(Property::new("SUMMARY", "Night"));
        occurrence.add_prop(Property::new("LOCATION", "Ward 3"));

        copy_into_master(&occurrence, &mut master);

        assert_eq!(master.prop_value("DTSTART"), Some("20250203T080000Z"));
        assert_eq!(master.prop_value("RRULE"), Some("FREQ=DAILY"));
        assert!(master.find_prop("RECURRENCE-ID").is_none());
        assert_eq!(master.prop_value("SUMMARY"), Some("Night"));
        assert_eq!(master.prop_value("LOCATION"), Some("Ward 3"));
        assert_eq!(master.prop_value("SEQUENCE"), Some("3"));
        assert_eq!(master.props("SUMMARY").count(), 1);
    }

    #[tokio::test]
    async fn complete_rejects_events() {
        let ical = TODO.replace("VTODO", "VEVENT").replace("DUE:", "DTSTART:");
        let mut event = object(&ical);
        assert!(matches!(
            event.complete(Utc::now()).await,
            Err(CalDavError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn conflicting_flags_rejected() {
        let mut todo = object(TODO);
        let options = SaveOptions {
            no_overwrite: true,
            no_create: true,
            all_recurrences: false,
        };
        assert!(matches!(todo.save(options).await, Err(CalDavError::InvalidInput(_))));
    }

    #[test]
    fn unloaded_object_has_no_data() {
        let client = DavClient::connect(Some("https://dav.example.com/"), None, None);
        let url = Url::parse("https://dav.example.com/cal/x.ics").expect("url");
        let object = CalendarObjectResource::unloaded(client, url);
        assert!(object.data().is_none());
        assert!(object.require_data().is_err());
        assert!(!object.is_occurrence());
    }
}
