//! WebDAV/CalDAV XML bodies and multistatus parsing
//!
//! Response elements are matched by local name, so any namespace prefix
//! (`D:`, `d:`, `C:`, `cal:` or none) is accepted.

use caldav_domain::{ObjectKind, TimeRange};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, escape::escape};

use crate::error::CalDavError;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;
const NAMESPACES: &str = r#"xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav""#;

/// Properties the client asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DavProp {
    DisplayName,
    ResourceType,
    GetEtag,
    CurrentUserPrincipal,
    CalendarHomeSet,
    SupportedComponents,
    CalendarData,
}

impl DavProp {
    const fn element(self) -> &'static str {
        match self {
            Self::DisplayName => "D:displayname",
            Self::ResourceType => "D:resourcetype",
            Self::GetEtag => "D:getetag",
            Self::CurrentUserPrincipal => "D:current-user-principal",
            Self::CalendarHomeSet => "C:calendar-home-set",
            Self::SupportedComponents => "C:supported-calendar-component-set",
            Self::CalendarData => "C:calendar-data",
        }
    }
}

fn prop_list(props: &[DavProp]) -> String {
    props
        .iter()
        .map(|p| format!("<{}/>", p.element()))
        .collect::<String>()
}

/// PROPFIND body requesting `props`
pub fn propfind_body(props: &[DavProp]) -> String {
    format!(
        "{XML_HEADER}\n<D:propfind {NAMESPACES}><D:prop>{}</D:prop></D:propfind>",
        prop_list(props)
    )
}

/// PROPPATCH body setting the display name
pub fn proppatch_displayname_body(name: &str) -> String {
    format!(
        "{XML_HEADER}\n<D:propertyupdate {NAMESPACES}><D:set><D:prop>\
<D:displayname>{}</D:displayname></D:prop></D:set></D:propertyupdate>",
        escape(name)
    )
}

/// MKCALENDAR body with display name and supported components
pub fn mkcalendar_body(name: Option<&str>, components: &[ObjectKind]) -> String {
    let mut props = String::new();
    if let Some(name) = name {
        props.push_str(&format!("<D:displayname>{}</D:displayname>", escape(name)));
    }
    if !components.is_empty() {
        props.push_str("<C:supported-calendar-component-set>");
        for kind in components {
            props.push_str(&format!(r#"<C:comp name="{}"/>"#, kind.component_name()));
        }
        props.push_str("</C:supported-calendar-component-set>");
    }
    format!("{XML_HEADER}\n<C:mkcalendar {NAMESPACES}><D:set><D:prop>{props}</D:prop></D:set></C:mkcalendar>")
}

/// A `prop-filter` with a `text-match`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    pub property: String,
    pub text: String,
}

impl TextMatch {
    pub fn new(property: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            property: property.into().to_uppercase(),
            text: text.into(),
        }
    }

    fn write(&self, out: &mut String) {
        // UIDs compare byte-wise; everything else case-insensitively
        let collation = if self.property == "UID" {
            "i;octet"
        } else {
            "i;ascii-casemap"
        };
        out.push_str(&format!(
            r#"<C:prop-filter name="{}"><C:text-match collation="{collation}">{}</C:text-match></C:prop-filter>"#,
            escape(&self.property),
            escape(&self.text)
        ));
    }
}

/// calendar-query REPORT body for one component kind
pub fn calendar_query_body(
    kind: ObjectKind,
    range: Option<&TimeRange>,
    text_matches: &[TextMatch],
) -> String {
    let mut filter = format!(r#"<C:comp-filter name="{}">"#, kind.component_name());
    if let Some(range) = range.filter(|r| r.start().is_some() || r.end().is_some()) {
        filter.push_str("<C:time-range");
        if let Some(start) = range.caldav_start() {
            filter.push_str(&format!(r#" start="{start}""#));
        }
        if let Some(end) = range.caldav_end() {
            filter.push_str(&format!(r#" end="{end}""#));
        }
        filter.push_str("/>");
    }
    for text_match in text_matches {
        text_match.write(&mut filter);
    }
    filter.push_str("</C:comp-filter>");

    format!(
        "{XML_HEADER}\n<C:calendar-query {NAMESPACES}><D:prop><D:getetag/><C:calendar-data/></D:prop>\
<C:filter><C:comp-filter name=\"VCALENDAR\">{filter}</C:comp-filter></C:filter></C:calendar-query>"
    )
}

/// calendar-multiget REPORT body
pub fn multiget_body<S: AsRef<str>>(hrefs: &[S]) -> String {
    let hrefs = hrefs
        .iter()
        .map(|h| format!("<D:href>{}</D:href>", escape(h.as_ref())))
        .collect::<String>();
    format!(
        "{XML_HEADER}\n<C:calendar-multiget {NAMESPACES}><D:prop><D:getetag/><C:calendar-data/></D:prop>{hrefs}</C:calendar-multiget>"
    )
}

/// Properties found in the successful propstats of one response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavProps {
    pub displayname: Option<String>,
    /// Local names of the `resourcetype` children
    pub resourcetype: Vec<String>,
    pub etag: Option<String>,
    pub calendar_data: Option<String>,
    pub current_user_principal: Option<String>,
    pub calendar_home_set: Option<String>,
    /// `name` attributes of `supported-calendar-component-set/comp`
    pub supported_components: Vec<String>,
}

impl DavProps {
    fn merge(&mut self, other: Self) {
        self.displayname = other.displayname.or(self.displayname.take());
        self.etag = other.etag.or(self.etag.take());
        self.calendar_data = other.calendar_data.or(self.calendar_data.take());
        self.current_user_principal = other
            .current_user_principal
            .or(self.current_user_principal.take());
        self.calendar_home_set = other.calendar_home_set.or(self.calendar_home_set.take());
        self.resourcetype.extend(other.resourcetype);
        self.supported_components.extend(other.supported_components);
    }
}

/// One `response` of a multistatus
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavResponse {
    pub href: String,
    /// Response-level status (multiget reports missing hrefs this way)
    pub status: Option<u16>,
    pub props: DavProps,
}

impl DavResponse {
    /// Whether `resourcetype` contains `calendar`
    pub fn is_calendar(&self) -> bool {
        self.props.resourcetype.iter().any(|t| t == "calendar")
    }

    /// Whether the response reports a non-2xx status for the whole resource
    pub fn is_missing(&self) -> bool {
        self.status.is_some_and(|s| !(200..300).contains(&s))
    }
}

#[derive(Default)]
struct MultistatusParser {
    stack: Vec<String>,
    text: String,
    responses: Vec<DavResponse>,
    current: Option<DavResponse>,
    propstat: Option<(Option<u16>, DavProps)>,
    saw_root: bool,
}

impl MultistatusParser {
    fn parent(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    fn props_mut(&mut self) -> Option<&mut DavProps> {
        self.propstat.as_mut().map(|(_, props)| props)
    }

    fn open(&mut self, name: &str, element: &BytesStart<'_>) -> Result<(), CalDavError> {
        if self.stack.is_empty() {
            self.saw_root = name == "multistatus";
        }
        match (name, self.parent()) {
            ("response", _) => self.current = Some(DavResponse::default()),
            ("propstat", _) => self.propstat = Some((None, DavProps::default())),
            (_, Some("resourcetype")) => {
                if let Some(props) = self.props_mut() {
                    props.resourcetype.push(name.to_string());
                }
            },
            ("comp", Some("supported-calendar-component-set")) => {
                let comp = element
                    .try_get_attribute("name")
                    .map_err(|e| CalDavError::ParseError(e.to_string()))?
                    .map(|a| a.unescape_value().map(|v| v.into_owned()))
                    .transpose()
                    .map_err(|e| CalDavError::ParseError(e.to_string()))?;
                if let (Some(comp), Some(props)) = (comp, self.props_mut()) {
                    props.supported_components.push(comp);
                }
            },
            _ => {},
        }
        self.text.clear();
        Ok(())
    }

    fn close(&mut self, name: &str) {
        let text = std::mem::take(&mut self.text);
        let value = text.trim().to_string();
        match (name, self.parent()) {
            ("href", Some("response")) => {
                if let Some(current) = self.current.as_mut() {
                    current.href = value;
                }
            },
            ("href", Some("current-user-principal")) => {
                if let Some(props) = self.props_mut() {
                    props.current_user_principal = Some(value);
                }
            },
            ("href", Some("calendar-home-set")) => {
                if let Some(props) = self.props_mut() {
                    props.calendar_home_set = Some(value);
                }
            },
            ("status", Some("propstat")) => {
                if let Some((status, _)) = self.propstat.as_mut() {
                    *status = parse_status(&value);
                }
            },
            ("status", Some("response")) => {
                if let Some(current) = self.current.as_mut() {
                    current.status = parse_status(&value);
                }
            },
            ("displayname", Some("prop")) => {
                if let Some(props) = self.props_mut() {
                    props.displayname = Some(value);
                }
            },
            ("getetag", Some("prop")) => {
                if let Some(props) = self.props_mut() {
                    props.etag = Some(value);
                }
            },
            ("calendar-data", Some("prop")) => {
                if let Some(props) = self.props_mut() {
                    props.calendar_data = Some(text);
                }
            },
            ("propstat", _) => {
                if let (Some((status, props)), Some(current)) =
                    (self.propstat.take(), self.current.as_mut())
                {
                    if status.is_none_or(|s| (200..300).contains(&s)) {
                        current.props.merge(props);
                    }
                }
            },
            ("response", _) => {
                if let Some(current) = self.current.take() {
                    self.responses.push(current);
                }
            },
            _ => {},
        }
    }
}

fn parse_status(line: &str) -> Option<u16> {
    line.split_whitespace().nth(1).and_then(|s| s.parse().ok())
}

fn local_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

/// Parse a `207 Multi-Status` body
pub fn parse_multistatus(body: &str) -> Result<Vec<DavResponse>, CalDavError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut parser = MultistatusParser::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(e.local_name().as_ref());
                parser.open(&name, &e)?;
                parser.stack.push(name);
            },
            Ok(Event::Empty(e)) => {
                let name = local_name(e.local_name().as_ref());
                parser.open(&name, &e)?;
                parser.close(&name);
            },
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| CalDavError::ParseError(e.to_string()))?;
                parser.text.push_str(&text);
            },
            Ok(Event::CData(e)) => {
                let text = std::str::from_utf8(e.as_ref())
                    .map_err(|e| CalDavError::ParseError(e.to_string()))?;
                parser.text.push_str(text);
            },
            Ok(Event::End(_)) => {
                if let Some(name) = parser.stack.pop() {
                    parser.close(&name);
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(CalDavError::ParseError(e.to_string())),
            _ => {},
        }
        buf.clear();
    }

    if !parser.saw_root {
        return Err(CalDavError::ParseError(
            "response is not a DAV multistatus".to_string(),
        ));
    }
    Ok(parser.responses)
}
