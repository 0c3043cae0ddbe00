//! Principal resolver
//!
//! A principal owns a calendar home set; its calendars are the calendar
//! collections directly below the home.

use caldav_domain::ObjectKind;
use reqwest::Url;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::calendar::Calendar;
use crate::client::{DavClient, collection_url};
use crate::error::CalDavError;
use crate::transport::Depth;
use crate::xml::DavProp;

/// How to pick one calendar of a principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarSelector {
    /// Display name (falls back to the collection id)
    Name(String),
    /// Last path segment of the collection below the home set
    Id(String),
    /// Absolute URL or href relative to the server URL
    Url(String),
}

impl From<&str> for CalendarSelector {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for CalendarSelector {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// The authenticated user's principal
#[derive(Debug, Clone)]
pub struct Principal {
    client: DavClient,
    url: Url,
}

impl Principal {
    pub(crate) fn new(client: DavClient, url: Url) -> Self {
        Self {
            client,
            url: collection_url(url),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// URL of the calendar home set
    ///
    /// Servers that do not advertise one keep calendars below the
    /// principal URL.
    #[instrument(skip(self), fields(principal = %self.url))]
    pub async fn calendar_home_set(&self) -> Result<Url, CalDavError> {
        let responses = self
            .client
            .propfind(&self.url, Depth::Zero, &[DavProp::CalendarHomeSet])
            .await?;
        match responses
            .iter()
            .find_map(|r| r.props.calendar_home_set.as_deref())
        {
            Some(href) => Ok(collection_url(self.client.resolve(href)?)),
            None => {
                debug!("No calendar-home-set reported, using principal URL");
                Ok(self.url.clone())
            },
        }
    }

    /// All calendar collections in the home set
    #[instrument(skip(self), fields(principal = %self.url))]
    pub async fn calendars(&self) -> Result<Vec<Calendar>, CalDavError> {
        let home = self.calendar_home_set().await?;
        let responses = self
            .client
            .propfind(
                &home,
                Depth::One,
                &[
                    DavProp::ResourceType,
                    DavProp::DisplayName,
                    DavProp::SupportedComponents,
                ],
            )
            .await?;

        let mut calendars = Vec::new();
        for response in responses.into_iter().filter(|r| r.is_calendar()) {
            let url = collection_url(self.client.resolve(&response.href)?);
            calendars.push(Calendar::from_props(self.client.clone(), url, response.props));
        }
        debug!(count = calendars.len(), "Found calendars");
        Ok(calendars)
    }

    /// Display names of all calendars (ids for calendars without one)
    pub async fn calendar_names(&self) -> Result<Vec<String>, CalDavError> {
        Ok(self
            .calendars()
            .await?
            .iter()
            .filter_map(|c| c.name().map(str::to_string).or_else(|| c.id().map(str::to_string)))
            .filter(|n| !n.is_empty())
            .collect())
    }

    /// Find one calendar
    ///
    /// Returns [`CalDavError::NotFound`] when nothing matches.
    #[instrument(skip(self, selector), fields(principal = %self.url))]
    pub async fn calendar(
        &self,
        selector: impl Into<CalendarSelector>,
    ) -> Result<Calendar, CalDavError> {
        match selector.into() {
            CalendarSelector::Name(name) => {
                let calendars = self.calendars().await?;
                let index = calendars
                    .iter()
                    .position(|c| c.name() == Some(name.as_str()))
                    .or_else(|| calendars.iter().position(|c| c.id() == Some(name.as_str())));
                index
                    .and_then(|i| calendars.into_iter().nth(i))
                    .ok_or_else(|| CalDavError::NotFound(format!("calendar '{name}'")))
            },
            CalendarSelector::Id(id) => {
                let home = self.calendar_home_set().await?;
                let url = join_id(&home, &id)?;
                Calendar::fetch(self.client.clone(), url).await
            },
            CalendarSelector::Url(url) => {
                let url = collection_url(self.client.resolve(&url)?);
                Calendar::fetch(self.client.clone(), url).await
            },
        }
    }

    /// Unsaved calendar handle in the home set with a random id
    ///
    /// Nothing is created on the server until [`Calendar::save`].
    pub async fn new_calendar(&self, name: &str) -> Result<Calendar, CalDavError> {
        let home = self.calendar_home_set().await?;
        let url = join_id(&home, &Uuid::new_v4().to_string())?;
        Ok(Calendar::unsaved(self.client.clone(), url, name))
    }

    /// Create a calendar on the server
    ///
    /// `components` restricts what the calendar accepts; empty leaves the
    /// choice to the server.
    pub async fn make_calendar(
        &self,
        name: &str,
        id: Option<&str>,
        components: &[ObjectKind],
    ) -> Result<Calendar, CalDavError> {
        let mut calendar = self.new_calendar(name).await?;
        if let Some(id) = id {
            calendar = calendar.with_id(id)?;
        }
        calendar = calendar.with_supported_components(components);
        calendar.save().await?;
        Ok(calendar)
    }
}

fn join_id(home: &Url, id: &str) -> Result<Url, CalDavError> {
    let id = id.trim_matches('/');
    if id.is_empty() {
        return Err(CalDavError::InvalidInput("calendar id is empty".to_string()));
    }
    // "./" keeps ids such as "team:ops" from reading as a scheme
    home.join(&format!("./{id}/"))
        .map_err(|e| CalDavError::InvalidUrl(format!("{id}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_from_str_is_name() {
        assert_eq!(
            CalendarSelector::from("Work"),
            CalendarSelector::Name("Work".to_string())
        );
        assert_eq!(
            CalendarSelector::from("Home".to_string()),
            CalendarSelector::Name("Home".to_string())
        );
    }

    #[test]
    fn join_id_builds_collection_url() {
        let home = Url::parse("https://dav.example.com/calendars/alice/").expect("url");
        assert_eq!(
            join_id(&home, "work").map(String::from).ok(),
            Some("https://dav.example.com/calendars/alice/work/".to_string())
        );
        assert_eq!(
            join_id(&home, "/shifts/").map(String::from).ok(),
            Some("https://dav.example.com/calendars/alice/shifts/".to_string())
        );
        assert_eq!(
            join_id(&home, "team:ops").map(String::from).ok(),
            Some("https://dav.example.com/calendars/alice/team:ops/".to_string())
        );
        assert!(matches!(join_id(&home, "/"), Err(CalDavError::InvalidInput(_))));
    }

    #[test]
    fn principal_url_is_a_collection() {
        let client = DavClient::connect(Some("https://dav.example.com/"), None, None);
        let principal = client.principal_at("principals/alice").expect("principal");
        assert_eq!(
            principal.url().as_str(),
            "https://dav.example.com/principals/alice/"
        );
    }
}
