//! Calendar collection handle

use caldav_domain::{CalendarData, IcalFields, ObjectKind, ObjectUid};
use chrono::{DateTime, Utc};
use reqwest::Url;
use tracing::{debug, instrument, warn};

use crate::client::DavClient;
use crate::error::CalDavError;
use crate::object::{CalendarObjectResource, SaveOptions};
use crate::search::{self, SearchQuery};
use crate::transport::Depth;
use crate::xml::{self, DavProp, DavProps};

/// What to store with [`Calendar::save_object`]
///
/// Either a complete iCalendar payload, keyword fields, or both (fields are
/// then written on top of the payload's primary component).
#[derive(Debug, Clone, Default)]
pub struct SaveObjectRequest {
    pub ical: Option<String>,
    pub fields: IcalFields,
    /// Fail with [`CalDavError::Consistency`] if the object already exists
    pub no_overwrite: bool,
    /// Fail with [`CalDavError::Consistency`] if the object does not exist yet
    pub no_create: bool,
}

impl SaveObjectRequest {
    /// Store a complete iCalendar payload
    #[must_use]
    pub fn from_ical(ical: impl Into<String>) -> Self {
        Self {
            ical: Some(ical.into()),
            ..Self::default()
        }
    }

    /// Build the object from keyword fields
    #[must_use]
    pub fn from_fields(fields: IcalFields) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    /// Fields to apply on top of the payload
    #[must_use]
    pub fn with_fields(mut self, fields: IcalFields) -> Self {
        self.fields = fields;
        self
    }

    /// Only create, never replace
    #[must_use]
    pub const fn no_overwrite(mut self) -> Self {
        self.no_overwrite = true;
        self
    }

    /// Only replace, never create
    #[must_use]
    pub const fn no_create(mut self) -> Self {
        self.no_create = true;
        self
    }

    fn into_data(self, kind: ObjectKind) -> Result<CalendarData, CalDavError> {
        let Some(ical) = self.ical else {
            return Ok(self.fields.to_calendar_data(kind)?);
        };

        let mut data = CalendarData::parse(&ical)?;
        if data.kind() != Some(kind) {
            return Err(CalDavError::InvalidInput(format!(
                "payload holds {}, expected {kind}",
                data.kind().map_or_else(|| "no object".to_string(), |k| k.to_string())
            )));
        }
        if data.uid().is_none() {
            let uid = self
                .fields
                .get("UID")
                .map_or_else(|| Ok(ObjectUid::generate()), ObjectUid::parse)?;
            if let Some(master) = data.master_mut() {
                master.set_prop(caldav_domain::Property::new("UID", uid.as_str()));
            }
        }
        if let Some(master) = data.master_mut() {
            self.fields.apply_to(master);
        }
        Ok(data)
    }
}

/// A calendar collection on the server (or one about to be created)
#[derive(Debug, Clone)]
pub struct Calendar {
    client: DavClient,
    url: Url,
    name: Option<String>,
    supported_components: Vec<ObjectKind>,
    persisted: bool,
}

impl Calendar {
    /// Handle for a collection assumed to exist
    pub(crate) fn existing(client: DavClient, url: Url) -> Self {
        Self {
            client,
            url,
            name: None,
            supported_components: Vec::new(),
            persisted: true,
        }
    }

    pub(crate) fn unsaved(client: DavClient, url: Url, name: &str) -> Self {
        Self {
            client,
            url,
            name: Some(name.to_string()),
            supported_components: Vec::new(),
            persisted: false,
        }
    }

    pub(crate) fn from_props(client: DavClient, url: Url, props: DavProps) -> Self {
        let supported_components = props
            .supported_components
            .iter()
            .filter_map(|c| ObjectKind::from_component_name(c))
            .collect();
        Self {
            client,
            url,
            name: props.displayname.filter(|n| !n.is_empty()),
            supported_components,
            persisted: true,
        }
    }

    /// Load the properties of the calendar at `url`
    pub(crate) async fn fetch(client: DavClient, url: Url) -> Result<Self, CalDavError> {
        let responses = client
            .propfind(
                &url,
                Depth::Zero,
                &[
                    DavProp::ResourceType,
                    DavProp::DisplayName,
                    DavProp::SupportedComponents,
                ],
            )
            .await?;
        let response = responses
            .into_iter()
            .find(|r| r.is_calendar())
            .ok_or_else(|| CalDavError::NotFound(format!("calendar at {url}")))?;
        Ok(Self::from_props(client, url, response.props))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Display name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Last path segment of the collection URL
    pub fn id(&self) -> Option<&str> {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
    }

    /// Component kinds the server accepts (empty when unknown)
    pub fn supported_components(&self) -> &[ObjectKind] {
        &self.supported_components
    }

    /// Whether the collection exists on the server
    pub const fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub(crate) const fn client(&self) -> &DavClient {
        &self.client
    }

    /// Change the display name; [`save`](Self::save) sends it
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Use `id` as the collection name instead of a random one
    pub fn with_id(mut self, id: &str) -> Result<Self, CalDavError> {
        if self.persisted {
            return Err(CalDavError::InvalidInput(
                "the id of an existing calendar cannot change".to_string(),
            ));
        }
        let id = id.trim_matches('/');
        if id.is_empty() {
            return Err(CalDavError::InvalidInput("calendar id is empty".to_string()));
        }
        self.url = self
            .url
            .join(&format!("../{id}/"))
            .map_err(|e| CalDavError::InvalidUrl(format!("{id}: {e}")))?;
        Ok(self)
    }

    /// Restrict the component kinds of a calendar that is not yet saved
    #[must_use]
    pub fn with_supported_components(mut self, components: &[ObjectKind]) -> Self {
        self.supported_components = components.to_vec();
        self
    }

    /// Create the collection (MKCALENDAR) or update its display name
    /// (PROPPATCH) if it already exists
    #[instrument(skip(self), fields(calendar = %self.url))]
    pub async fn save(&mut self) -> Result<(), CalDavError> {
        if self.persisted {
            if let Some(name) = &self.name {
                self.client
                    .proppatch(&self.url, xml::proppatch_displayname_body(name))
                    .await?;
            }
            return Ok(());
        }

        let body = xml::mkcalendar_body(self.name.as_deref(), &self.supported_components);
        match self.client.mkcalendar(&self.url, body).await {
            Ok(()) => {
                debug!("Calendar created");
                self.persisted = true;
                Ok(())
            },
            Err(CalDavError::RequestFailed { status: 405, .. }) => Err(CalDavError::Consistency(
                format!("a resource already exists at {}", self.url),
            )),
            Err(e) => Err(e),
        }
    }

    /// Delete the collection and everything in it
    #[instrument(skip(self), fields(calendar = %self.url))]
    pub async fn delete(&mut self) -> Result<(), CalDavError> {
        self.client.delete(&self.url, None).await?;
        self.persisted = false;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// Store an event, todo or journal
    ///
    /// The object is written to `<calendar>/<uid>.ics`.
    #[instrument(skip(self, request), fields(calendar = %self.url, kind = %kind))]
    pub async fn save_object(
        &self,
        kind: ObjectKind,
        request: SaveObjectRequest,
    ) -> Result<CalendarObjectResource, CalDavError> {
        if request.no_overwrite && request.no_create {
            return Err(CalDavError::InvalidInput(
                "no_overwrite and no_create cannot both be set".to_string(),
            ));
        }
        let options = SaveOptions {
            no_overwrite: request.no_overwrite,
            no_create: request.no_create,
            all_recurrences: false,
        };

        let data = request.into_data(kind)?;
        let uid = ObjectUid::parse(data.uid().unwrap_or_default())?;
        // "./" keeps UIDs such as "urn:uuid:..." from reading as a scheme
        let url = self
            .url
            .join(&format!("./{}", uid.resource_name()))
            .map_err(|e| CalDavError::InvalidUrl(format!("{uid}: {e}")))?;

        let mut object = CalendarObjectResource::new(self.client.clone(), url, None, data);
        object.save(options).await?;
        Ok(object)
    }

    /// [`save_object`](Self::save_object) for a VEVENT
    pub async fn save_event(
        &self,
        request: SaveObjectRequest,
    ) -> Result<CalendarObjectResource, CalDavError> {
        self.save_object(ObjectKind::Event, request).await
    }

    /// [`save_object`](Self::save_object) for a VTODO
    pub async fn save_todo(
        &self,
        request: SaveObjectRequest,
    ) -> Result<CalendarObjectResource, CalDavError> {
        self.save_object(ObjectKind::Todo, request).await
    }

    /// [`save_object`](Self::save_object) for a VJOURNAL
    pub async fn save_journal(
        &self,
        request: SaveObjectRequest,
    ) -> Result<CalendarObjectResource, CalDavError> {
        self.save_object(ObjectKind::Journal, request).await
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Run a calendar-query
    #[instrument(skip(self, query), fields(calendar = %self.url))]
    pub async fn search(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<CalendarObjectResource>, CalDavError> {
        search::run(self, query).await
    }

    /// Events overlapping `[start, end)`, optionally expanded into occurrences
    pub async fn date_search(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        expand: bool,
    ) -> Result<Vec<CalendarObjectResource>, CalDavError> {
        let mut query = SearchQuery::new().events().start(start).expand(expand);
        if let Some(end) = end {
            query = query.end(end);
        }
        self.search(&query).await
    }

    /// All events
    pub async fn events(&self) -> Result<Vec<CalendarObjectResource>, CalDavError> {
        self.search(&SearchQuery::new().events()).await
    }

    /// Todos that are neither completed nor cancelled
    pub async fn todos(&self) -> Result<Vec<CalendarObjectResource>, CalDavError> {
        self.search(&SearchQuery::new().todos()).await
    }

    /// All journals
    pub async fn journals(&self) -> Result<Vec<CalendarObjectResource>, CalDavError> {
        self.search(&SearchQuery::new().journals()).await
    }

    /// Every object in the calendar
    pub async fn objects(&self) -> Result<Vec<CalendarObjectResource>, CalDavError> {
        self.search(&SearchQuery::new().include_completed(true)).await
    }

    /// The object with the given UID
    #[instrument(skip(self), fields(calendar = %self.url))]
    pub async fn object_by_uid(&self, uid: &str) -> Result<CalendarObjectResource, CalDavError> {
        let query = SearchQuery::new().uid(uid).include_completed(true);
        self.search(&query)
            .await?
            .into_iter()
            .find(|o| o.uid() == Some(uid))
            .ok_or_else(|| CalDavError::NotFound(format!("object with UID {uid}")))
    }

    /// Fetch an object by URL or href relative to this calendar
    #[instrument(skip(self), fields(calendar = %self.url))]
    pub async fn object_by_url(&self, href: &str) -> Result<CalendarObjectResource, CalDavError> {
        let url = self
            .url
            .join(href)
            .map_err(|e| CalDavError::InvalidUrl(format!("{href}: {e}")))?;
        let mut object = CalendarObjectResource::unloaded(self.client.clone(), url);
        object.load().await?;
        Ok(object)
    }

    /// Fetch several objects in one calendar-multiget REPORT
    ///
    /// Hrefs the server reports as missing are skipped.
    #[instrument(skip(self, hrefs), fields(calendar = %self.url, count = hrefs.len()))]
    pub async fn multiget<S: AsRef<str>>(
        &self,
        hrefs: &[S],
    ) -> Result<Vec<CalendarObjectResource>, CalDavError> {
        if hrefs.is_empty() {
            return Ok(Vec::new());
        }
        let responses = self
            .client
            .report(&self.url, Depth::One, xml::multiget_body(hrefs))
            .await?;

        let mut objects = Vec::new();
        for response in responses {
            if response.is_missing() {
                debug!(href = %response.href, "Object missing from multiget");
                continue;
            }
            let Some(ical) = response.props.calendar_data else {
                continue;
            };
            match CalendarData::parse(&ical) {
                Ok(data) => objects.push(CalendarObjectResource::new(
                    self.client.clone(),
                    self.client.resolve(&response.href)?,
                    response.props.etag,
                    data,
                )),
                Err(e) => warn!(href = %response.href, error = %e, "Skipping unparsable calendar object"),
            }
        }
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n\
BEGIN:VEVENT\r\nUID:ev-1\r\nDTSTART:20250210T080000Z\r\nSUMMARY:Day\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    fn calendar() -> Calendar {
        let client = DavClient::connect(Some("https://dav.example.com/cal/alice/"), None, None);
        Calendar::existing(client, Url::parse("https://dav.example.com/cal/alice/work/").expect("url"))
    }

    #[test]
    fn id_is_last_path_segment() {
        assert_eq!(calendar().id(), Some("work"));
    }

    #[test]
    fn with_id_replaces_last_segment() {
        let client = DavClient::connect(Some("https://dav.example.com/"), None, None);
        let url = Url::parse("https://dav.example.com/cal/alice/0b9f/").expect("url");
        let calendar = Calendar::unsaved(client, url, "Shifts").with_id("shifts").expect("id");
        assert_eq!(calendar.url().as_str(), "https://dav.example.com/cal/alice/shifts/");
        assert_eq!(calendar.name(), Some("Shifts"));
        assert!(!calendar.is_persisted());
    }

    #[test]
    fn with_id_keeps_colons_in_the_path() {
        let client = DavClient::connect(Some("https://dav.example.com/"), None, None);
        let url = Url::parse("https://dav.example.com/cal/alice/0b9f/").expect("url");
        let calendar = Calendar::unsaved(client, url, "Ops").with_id("team:ops").expect("id");
        assert_eq!(calendar.url().as_str(), "https://dav.example.com/cal/alice/team:ops/");
        assert_eq!(calendar.id(), Some("team:ops"));
    }

    #[test]
    fn with_id_rejected_for_existing_calendar() {
        assert!(matches!(
            calendar().with_id("other"),
            Err(CalDavError::InvalidInput(_))
        ));
    }

    #[test]
    fn from_props_reads_components() {
        let client = DavClient::connect(Some("https://dav.example.com/"), None, None);
        let props = DavProps {
            displayname: Some("Work".to_string()),
            supported_components: vec!["VEVENT".to_string(), "VAVAILABILITY".to_string()],
            ..DavProps::default()
        };
        let url = Url::parse("https://dav.example.com/cal/work/").expect("url");
        let calendar = Calendar::from_props(client, url, props);
        assert_eq!(calendar.name(), Some("Work"));
        assert_eq!(calendar.supported_components(), &[ObjectKind::Event]);
    }

    #[test]
    fn request_from_ical_keeps_uid_and_applies_fields() {
        let data = SaveObjectRequest::from_ical(EVENT)
            .with_fields(IcalFields::new().summary("Night"))
            .into_data(ObjectKind::Event)
            .expect("data");
        assert_eq!(data.uid(), Some("ev-1"));
        assert_eq!(data.master().and_then(|m| m.prop_value("SUMMARY")), Some("Night"));
    }

    #[test]
    fn request_kind_mismatch_is_rejected() {
        let result = SaveObjectRequest::from_ical(EVENT).into_data(ObjectKind::Todo);
        assert!(matches!(result, Err(CalDavError::InvalidInput(_))));
    }

    #[test]
    fn request_from_fields_generates_uid() {
        let data = SaveObjectRequest::from_fields(IcalFields::new().summary("Milk"))
            .into_data(ObjectKind::Todo)
            .expect("data");
        assert_eq!(data.kind(), Some(ObjectKind::Todo));
        assert!(data.uid().is_some());
    }

    #[test]
    fn payload_without_uid_gets_one() {
        let ical = EVENT.replace("UID:ev-1\r\n", "");
        let data = SaveObjectRequest::from_ical(ical)
            .into_data(ObjectKind::Event)
            .expect("data");
        assert!(data.uid().is_some_and(|u| !u.is_empty()));
    }

    #[tokio::test]
    async fn conflicting_flags_are_rejected_before_io() {
        let request = SaveObjectRequest::from_ical(EVENT).no_overwrite().no_create();
        assert!(matches!(
            calendar().save_object(ObjectKind::Event, request).await,
            Err(CalDavError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn multiget_without_hrefs_is_empty() {
        let hrefs: [&str; 0] = [];
        assert!(calendar().multiget(&hrefs).await.expect("multiget").is_empty());
    }
}
