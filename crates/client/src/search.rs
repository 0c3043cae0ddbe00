//! Calendar queries
//!
//! A [`SearchQuery`] becomes one calendar-query REPORT per selected
//! component kind. Property filters and the completed-todo rule are checked
//! again on the client, and recurring objects can be expanded into their
//! occurrences inside the time range.

use caldav_domain::{CalendarData, ObjectKind, TimeRange, expand};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::calendar::Calendar;
use crate::error::CalDavError;
use crate::object::CalendarObjectResource;
use crate::transport::Depth;
use crate::xml::{self, TextMatch};

/// Search criteria for [`Calendar::search`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    event: bool,
    todo: bool,
    journal: bool,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    expand: bool,
    uid: Option<String>,
    property_filters: Vec<(String, String)>,
    include_completed: bool,
}

impl SearchQuery {
    /// Query matching every object
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Include events
    #[must_use]
    pub const fn events(mut self) -> Self {
        self.event = true;
        self
    }

    /// Include todos
    #[must_use]
    pub const fn todos(mut self) -> Self {
        self.todo = true;
        self
    }

    /// Include journals
    #[must_use]
    pub const fn journals(mut self) -> Self {
        self.journal = true;
        self
    }

    /// Include objects of `kind`
    #[must_use]
    pub const fn kind(self, kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Event => self.events(),
            ObjectKind::Todo => self.todos(),
            ObjectKind::Journal => self.journals(),
        }
    }

    /// Objects overlapping `[start, end)`
    #[must_use]
    pub const fn between(self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start(start).end(end)
    }

    /// Lower bound of the time range
    #[must_use]
    pub const fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Upper bound (exclusive) of the time range
    #[must_use]
    pub const fn end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    /// Use an existing [`TimeRange`]
    #[must_use]
    pub fn range(mut self, range: &TimeRange) -> Self {
        self.start = range.start();
        self.end = range.end();
        self
    }

    /// Return one result per occurrence of recurring objects
    ///
    /// Needs a time range with both bounds.
    #[must_use]
    pub const fn expand(mut self, expand: bool) -> Self {
        self.expand = expand;
        self
    }

    /// Only the object with this UID
    #[must_use]
    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Only objects whose property `name` contains `text` (case-insensitive)
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.property_filters
            .push((name.into().to_uppercase(), text.into()));
        self
    }

    /// Also return completed and cancelled todos
    #[must_use]
    pub const fn include_completed(mut self, include: bool) -> Self {
        self.include_completed = include;
        self
    }

    /// Selected kinds; all three when none was chosen
    pub fn kinds(&self) -> Vec<ObjectKind> {
        let selected: Vec<ObjectKind> = ObjectKind::ALL
            .into_iter()
            .filter(|k| match k {
                ObjectKind::Event => self.event,
                ObjectKind::Todo => self.todo,
                ObjectKind::Journal => self.journal,
            })
            .collect();
        if selected.is_empty() {
            ObjectKind::ALL.to_vec()
        } else {
            selected
        }
    }

    /// The time range, if any bound was given
    pub fn time_range(&self) -> Result<Option<TimeRange>, CalDavError> {
        if self.start.is_none() && self.end.is_none() {
            return Ok(None);
        }
        Ok(Some(TimeRange::new(self.start, self.end)?))
    }

    fn text_matches(&self) -> Vec<TextMatch> {
        self.uid
            .iter()
            .map(|uid| TextMatch::new("UID", uid.as_str()))
            .chain(
                self.property_filters
                    .iter()
                    .map(|(name, text)| TextMatch::new(name.as_str(), text.as_str())),
            )
            .collect()
    }

    /// Client-side check of the filters the server may have ignored
    pub fn matches(&self, data: &CalendarData) -> bool {
        let Some(component) = data.master() else {
            return false;
        };
        if let Some(uid) = &self.uid {
            if data.uid() != Some(uid.as_str()) {
                return false;
            }
        }
        let filters_match = self.property_filters.iter().all(|(name, text)| {
            let needle = text.to_lowercase();
            component
                .props(name)
                .any(|p| p.text().to_lowercase().contains(&needle))
        });
        if !filters_match {
            return false;
        }
        self.include_completed || data.kind() != Some(ObjectKind::Todo) || !is_finished(data)
    }
}

/// Completed or cancelled todo
fn is_finished(data: &CalendarData) -> bool {
    data.master().is_some_and(|todo| {
        todo.find_prop("COMPLETED").is_some()
            || todo
                .prop_value("STATUS")
                .is_some_and(|s| s.eq_ignore_ascii_case("COMPLETED") || s.eq_ignore_ascii_case("CANCELLED"))
    })
}

pub(crate) async fn run(
    calendar: &Calendar,
    query: &SearchQuery,
) -> Result<Vec<CalendarObjectResource>, CalDavError> {
    let range = query.time_range()?;
    let expand_range = match (&range, query.expand) {
        (Some(range), true) if range.is_bounded() => Some(range),
        (_, true) => {
            return Err(CalDavError::InvalidInput(
                "expand requires a time range with start and end".to_string(),
            ));
        },
        _ => None,
    };

    let client = calendar.client();
    let text_matches = query.text_matches();
    let mut found = Vec::new();

    for kind in query.kinds() {
        let body = xml::calendar_query_body(kind, range.as_ref(), &text_matches);
        let responses = client.report(calendar.url(), Depth::One, body).await?;
        debug!(kind = %kind, responses = responses.len(), "calendar-query answered");

        for response in responses {
            let Some(ical) = response.props.calendar_data else {
                continue;
            };
            let data = match CalendarData::parse(&ical) {
                Ok(data) => data,
                Err(e) => {
                    warn!(href = %response.href, error = %e, "Skipping unparsable calendar object");
                    continue;
                },
            };
            if data.kind() != Some(kind) || !query.matches(&data) {
                continue;
            }

            let url = client.resolve(&response.href)?;
            let etag = response.props.etag;
            match expand_range {
                Some(range) => match expand(&data, range) {
                    Ok(occurrences) => found.extend(occurrences.into_iter().map(|occurrence| {
                        CalendarObjectResource::new(client.clone(), url.clone(), etag.clone(), occurrence)
                    })),
                    Err(e) => {
                        warn!(href = %response.href, error = %e, "Skipping object that cannot be expanded");
                    },
                },
                None => found.push(CalendarObjectResource::new(client.clone(), url, etag, data)),
            }
        }
    }

    if expand_range.is_some() {
        found.sort_by_key(CalendarObjectResource::start);
    }
    Ok(found)
}
