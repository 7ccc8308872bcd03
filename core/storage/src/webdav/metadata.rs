//! PROPFIND multistatus parsing and mapping onto the metadata model.

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::json;

use omnistore_common::{Error, ProviderPath, Result};

use crate::metadata::{Metadata, FOLDER_CONTENT_TYPE};

use super::WEBDAV_BACKEND;

/// Properties requested by every PROPFIND.
pub const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getcontenttype/>
    <d:getetag/>
    <d:getlastmodified/>
  </d:prop>
</d:propfind>"#;

/// Live properties of one resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DavProps {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub collection: bool,
}

impl DavProps {
    fn merge(&mut self, other: DavProps) {
        self.content_length = self.content_length.or(other.content_length);
        self.content_type = self.content_type.take().or(other.content_type);
        self.etag = self.etag.take().or(other.etag);
        self.last_modified = self.last_modified.or(other.last_modified);
        self.collection |= other.collection;
    }
}

/// One `response` element of a multistatus body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DavResponse {
    /// Raw href as sent by the server.
    pub href: String,
    pub props: DavProps,
}

fn malformed(message: impl std::fmt::Display) -> Error {
    Error::Metadata {
        status: None,
        message: format!("Malformed multistatus: {}", message),
    }
}

/// Parse a `207 Multi-Status` body.
///
/// Properties inside a `propstat` whose status is not 200 are dropped.
pub fn parse_multistatus(xml: &str) -> Result<Vec<DavResponse>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut responses = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut response: Option<DavResponse> = None;
    let mut propstat = DavProps::default();
    let mut propstat_ok = true;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "response" => response = Some(DavResponse::default()),
                    "propstat" => {
                        propstat = DavProps::default();
                        propstat_ok = true;
                    }
                    "collection" => propstat.collection = true,
                    _ => {}
                }
                stack.push(name);
            }
            Ok(Event::Empty(empty)) => {
                if empty.local_name().as_ref() == b"collection" {
                    propstat.collection = true;
                }
            }
            Ok(Event::Text(text)) => {
                let value = text.unescape().map_err(malformed)?.into_owned();
                let parent = stack.iter().rev().nth(1).map(String::as_str);
                match (stack.last().map(String::as_str), parent) {
                    (Some("href"), Some("response")) => {
                        if let Some(response) = response.as_mut() {
                            response.href = value;
                        }
                    }
                    (Some("status"), Some("propstat")) => {
                        propstat_ok = value.split_whitespace().nth(1) == Some("200");
                    }
                    (Some("getcontentlength"), _) => propstat.content_length = value.trim().parse().ok(),
                    (Some("getcontenttype"), _) => propstat.content_type = Some(value),
                    (Some("getetag"), _) => propstat.etag = Some(value),
                    (Some("getlastmodified"), _) => {
                        propstat.last_modified = DateTime::parse_from_rfc2822(value.trim())
                            .ok()
                            .map(|t| t.with_timezone(&Utc));
                    }
                    _ => {}
                }
            }
            Ok(Event::End(end)) => {
                match end.local_name().as_ref() {
                    b"propstat" => {
                        if let (true, Some(response)) = (propstat_ok, response.as_mut()) {
                            response.props.merge(std::mem::take(&mut propstat));
                        }
                    }
                    b"response" => {
                        if let Some(done) = response.take() {
                            responses.push(done);
                        }
                    }
                    _ => {}
                }
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(format!("at {}: {}", reader.buffer_position(), e))),
        }
    }
    Ok(responses)
}

/// Percent-decoded path component of an href, which may be absolute.
fn href_path(href: &str) -> String {
    let path = match url::Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href.to_string(),
    };
    percent_decode_str(&path).decode_utf8_lossy().into_owned()
}

/// Map a response onto metadata relative to the configured `folder`
/// (a decoded server path ending in `/`).
pub fn to_metadata(response: &DavResponse, folder: &str) -> Result<Metadata> {
    let decoded = href_path(&response.href);
    let trimmed_folder = folder.trim_end_matches('/');
    let relative = decoded
        .strip_prefix(trimmed_folder)
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        .ok_or_else(|| malformed(format!("href '{}' is outside '{}'", response.href, folder)))?;

    let mut raw = if relative.is_empty() {
        "/".to_string()
    } else {
        relative.to_string()
    };
    let props = &response.props;
    if props.collection && !raw.ends_with('/') {
        raw.push('/');
    }
    if !props.collection && raw.len() > 1 {
        raw = raw.trim_end_matches('/').to_string();
    }
    let path = ProviderPath::parse(&raw)?;

    let name = path.name().unwrap_or_default().to_string();
    let etag = props.etag.clone().unwrap_or_default();
    let metadata = if props.collection {
        Metadata::folder(name, path, WEBDAV_BACKEND, etag)
            .with_content_type(Some(
                props
                    .content_type
                    .clone()
                    .unwrap_or_else(|| FOLDER_CONTENT_TYPE.to_string()),
            ))
    } else {
        Metadata::file(name, path, WEBDAV_BACKEND, etag)
            .with_size(props.content_length)
            .with_content_type(props.content_type.clone())
    };
    Ok(metadata
        .with_modified(props.last_modified)
        .with_extra(json!({ "href": response.href })))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOLDER: &str = "/remote.php/webdav/";

    const LISTING: &str = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:" xmlns:s="http://sabredav.org/ns">
  <d:response>
    <d:href>/remote.php/webdav/docs/</d:href>
    <d:propstat>
      <d:prop>
        <d:getlastmodified>Tue, 13 Jun 2023 08:00:00 GMT</d:getlastmodified>
        <d:resourcetype><d:collection/></d:resourcetype>
        <d:getetag>"64882b00"</d:getetag>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
    <d:propstat>
      <d:prop><d:getcontentlength/></d:prop>
      <d:status>HTTP/1.1 404 Not Found</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/webdav/docs/Caf%C3%A9%20notes.txt</d:href>
    <d:propstat>
      <d:prop>
        <d:getlastmodified>Wed, 14 Jun 2023 09:30:00 GMT</d:getlastmodified>
        <d:getcontentlength>42</d:getcontentlength>
        <d:resourcetype/>
        <d:getetag>"abc"</d:getetag>
        <d:getcontenttype>text/plain</d:getcontenttype>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    #[test]
    fn test_parse_multistatus() {
        let responses = parse_multistatus(LISTING).unwrap();
        assert_eq!(responses.len(), 2);
        assert!(responses[0].props.collection);
        assert_eq!(responses[0].props.content_length, None);
        assert!(!responses[1].props.collection);
        assert_eq!(responses[1].props.content_length, Some(42));
        assert!(responses[1].props.last_modified.is_some());
    }

    #[test]
    fn test_folder_and_file_mapping() {
        let responses = parse_multistatus(LISTING).unwrap();

        let folder = to_metadata(&responses[0], FOLDER).unwrap();
        assert!(folder.is_folder());
        assert_eq!(folder.path.as_str(), "/docs/");
        assert_eq!(folder.name, "docs");
        assert_eq!(folder.content_type(), Some(FOLDER_CONTENT_TYPE));

        let file = to_metadata(&responses[1], FOLDER).unwrap();
        assert!(file.is_file());
        assert_eq!(file.path.as_str(), "/docs/Café notes.txt");
        assert_eq!(file.name, "Café notes.txt");
        assert_eq!(file.size(), Some(42));
        assert_eq!(file.etag, "\"abc\"");
        assert_eq!(file.backend, "webdav");
    }

    #[test]
    fn test_absolute_href_and_root() {
        let response = DavResponse {
            href: "https://dav.test/remote.php/webdav/".to_string(),
            props: DavProps {
                collection: true,
                ..DavProps::default()
            },
        };
        let root = to_metadata(&response, FOLDER).unwrap();
        assert!(root.path.is_root());
    }

    #[test]
    fn test_href_outside_folder() {
        let response = DavResponse {
            href: "/elsewhere/file".to_string(),
            props: DavProps::default(),
        };
        assert!(matches!(to_metadata(&response, FOLDER), Err(Error::Metadata { .. })));
    }
}
