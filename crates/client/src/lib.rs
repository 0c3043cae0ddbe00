//! CalDAV client
//!
//! Client for CalDAV servers (Baïkal, Radicale, Nextcloud, iCloud) following
//! the object model client → principal → calendar → calendar object resource.
//!
//! ```rust,ignore
//! use caldav_client::{DavClient, SaveObjectRequest, SearchQuery};
//! use caldav_domain::IcalFields;
//!
//! let client = DavClient::connect(Some("https://dav.example.com/"), Some("alice"), Some("secret"));
//! let principal = client.principal().await?;
//! let calendar = principal.calendar("Work").await?;
//!
//! calendar
//!     .save_event(SaveObjectRequest::from_fields(IcalFields::new().summary("Night shift")))
//!     .await?;
//!
//! let query = SearchQuery::new().events().between(start, end).expand(true);
//! for occurrence in calendar.search(&query).await? {
//!     println!("{:?}", occurrence.property("SUMMARY"));
//! }
//! ```

pub mod calendar;
pub mod client;
pub mod config;
pub mod error;
pub mod object;
pub mod principal;
pub mod retry;
pub mod search;
pub mod transport;
pub mod xml;

pub use calendar::{Calendar, SaveObjectRequest};
pub use client::DavClient;
pub use config::DavClientConfig;
pub use error::CalDavError;
pub use object::{CalendarObjectResource, SaveOptions};
pub use principal::{CalendarSelector, Principal};
pub use retry::RetryConfig;
pub use search::SearchQuery;
pub use transport::{DavMethod, DavRequest, DavTransport, Depth, HttpTransport, RawResponse};
