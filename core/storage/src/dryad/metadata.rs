//! Mapping of Dryad XML documents onto the metadata model.
//!
//! Three documents describe Dryad content:
//! - the package object (`dcterms:title`, `dcterms:identifier`,
//!   `dcterms:dateSubmitted`, one `dcterms:hasPart` per file),
//! - the file object (same Dublin Core terms),
//! - the DataONE system metadata of the file bitstream (`size`, `formatId`,
//!   `checksum`, `dateSysMetadataModified`).

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::json;

use omnistore_common::{Error, ProviderPath, Result};

use crate::metadata::Metadata;

use super::DRYAD_BACKEND;

/// Dublin Core description of a package or file object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectRecord {
    pub title: Option<String>,
    pub identifier: Option<String>,
    pub submitted: Option<DateTime<Utc>>,
    /// Identifiers of contained files (packages only).
    pub parts: Vec<String>,
}

/// DataONE system metadata of a bitstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemRecord {
    pub size: Option<u64>,
    pub format_id: Option<String>,
    pub checksum: Option<String>,
    pub modified: Option<DateTime<Utc>>,
}

/// Collect `(local name, text)` for every element with text content.
fn text_elements(xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut elements = Vec::new();
    let mut current: Option<String> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                current = Some(String::from_utf8_lossy(start.local_name().as_ref()).into_owned());
            }
            Ok(Event::Text(text)) => {
                if let Some(name) = &current {
                    let value = text
                        .unescape()
                        .map_err(|e| Error::Metadata {
                            status: None,
                            message: format!("Malformed Dryad XML: {}", e),
                        })?
                        .into_owned();
                    elements.push((name.clone(), value));
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Error::Metadata {
                    status: None,
                    message: format!("Malformed Dryad XML at {}: {}", reader.buffer_position(), e),
                })
            }
        }
    }
    Ok(elements)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Parse a package or file object document.
pub fn parse_object(xml: &str) -> Result<ObjectRecord> {
    let mut record = ObjectRecord::default();
    for (name, value) in text_elements(xml)? {
        match name.as_str() {
            "title" if record.title.is_none() => record.title = Some(value),
            "identifier" if record.identifier.is_none() => record.identifier = Some(value),
            "dateSubmitted" => record.submitted = parse_timestamp(&value),
            "hasPart" => record.parts.push(value),
            _ => {}
        }
    }
    Ok(record)
}

/// Parse a DataONE system metadata document.
pub fn parse_system(xml: &str) -> Result<SystemRecord> {
    let mut record = SystemRecord::default();
    for (name, value) in text_elements(xml)? {
        match name.as_str() {
            "size" => record.size = value.parse().ok(),
            "formatId" => record.format_id = Some(value),
            "checksum" => record.checksum = Some(value),
            "dateSysMetadataModified" => record.modified = parse_timestamp(&value),
            _ => {}
        }
    }
    Ok(record)
}

/// File path of a `hasPart` identifier such as
/// `http://dx.doi.org/10.5061/dryad.1850/1` (`/1850/1`).
pub fn part_path(identifier: &str) -> Result<ProviderPath> {
    let suffix = identifier
        .rsplit('.')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Metadata {
            status: None,
            message: format!("Unrecognized Dryad identifier '{}'", identifier),
        })?;
    ProviderPath::parse(&format!("/{}", suffix))
}

/// Filename parameter of a `Content-Disposition` header.
pub fn disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    for param in header.split(';').map(str::trim) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value.rsplit('\'').next().unwrap_or(value);
                if let Ok(decoded) = percent_decode_str(encoded).decode_utf8() {
                    return Some(decoded.into_owned());
                }
            }
            "filename" => plain = Some(value.to_string()),
            _ => {}
        }
    }
    plain.filter(|name| !name.is_empty())
}

/// Full DOI of a package or file, e.g. `doi:10.5061/dryad.1850/1`.
pub fn doi_for(path: &ProviderPath) -> String {
    format!("doi:10.5061/dryad.{}", path.segments().join("/"))
}

/// Folder metadata of a package.
pub fn package_metadata(path: ProviderPath, object: &ObjectRecord) -> Metadata {
    let doi = doi_for(&path);
    let name = object
        .title
        .clone()
        .or_else(|| path.name().map(String::from))
        .unwrap_or_default();
    let etag = object.identifier.clone().unwrap_or_else(|| doi.clone());
    Metadata::folder(name, path, DRYAD_BACKEND, etag)
        .with_modified(object.submitted)
        .with_extra(json!({
            "doi": doi,
            "files": object.parts,
        }))
}

/// File metadata from the object, system metadata and bitstream filename.
pub fn file_metadata(
    path: ProviderPath,
    object: &ObjectRecord,
    system: &SystemRecord,
    filename: Option<String>,
) -> Metadata {
    let doi = doi_for(&path);
    let name = filename
        .or_else(|| object.title.clone())
        .or_else(|| path.name().map(String::from))
        .unwrap_or_default();
    let etag = system
        .checksum
        .clone()
        .or_else(|| object.identifier.clone())
        .unwrap_or_else(|| doi.clone());
    Metadata::file(name, path, DRYAD_BACKEND, etag)
        .with_size(system.size)
        .with_content_type(system.format_id.clone())
        .with_modified(system.modified.or(object.submitted))
        .with_extra(json!({
            "doi": doi,
            "title": object.title,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKAGE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DryadDataPackage xmlns="http://purl.org/dryad/schema/terms/v3.1" xmlns:dcterms="http://purl.org/dc/terms/">
  <dcterms:type>package</dcterms:type>
  <dcterms:title>Data from: Ecology &amp; evolution</dcterms:title>
  <dcterms:identifier>http://dx.doi.org/10.5061/dryad.1850</dcterms:identifier>
  <dcterms:dateSubmitted>2011-07-13T17:08:17Z</dcterms:dateSubmitted>
  <dcterms:hasPart>http://dx.doi.org/10.5061/dryad.1850/1</dcterms:hasPart>
  <dcterms:hasPart>http://dx.doi.org/10.5061/dryad.1850/2</dcterms:hasPart>
</DryadDataPackage>"#;

    const SYSMETA_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d1:systemMetadata xmlns:d1="http://ns.dataone.org/service/types/v1">
  <identifier>http://dx.doi.org/10.5061/dryad.1850/1/bitstream</identifier>
  <formatId>text/csv</formatId>
  <size>2874</size>
  <checksum algorithm="MD5">a5f6e3a6d3f1c1e6b4f1e0d7d1a7b5c2</checksum>
  <dateSysMetadataModified>2012-01-05T10:00:00Z</dateSysMetadataModified>
</d1:systemMetadata>"#;

    #[test]
    fn test_parse_package() {
        let record = parse_object(PACKAGE_XML).unwrap();
        assert_eq!(record.title.as_deref(), Some("Data from: Ecology & evolution"));
        assert_eq!(record.parts.len(), 2);
        assert!(record.submitted.is_some());
    }

    #[test]
    fn test_parse_system() {
        let record = parse_system(SYSMETA_XML).unwrap();
        assert_eq!(record.size, Some(2874));
        assert_eq!(record.format_id.as_deref(), Some("text/csv"));
        assert!(record.checksum.is_some());
    }

    #[test]
    fn test_malformed_xml_is_metadata_error() {
        let err = parse_object("<a><b></a>").unwrap_err();
        assert!(matches!(err, Error::Metadata { .. }));
    }

    #[test]
    fn test_part_path() {
        let path = part_path("http://dx.doi.org/10.5061/dryad.1850/1").unwrap();
        assert_eq!(path.segments(), &["1850", "1"]);
        assert!(path.is_file());
    }

    #[test]
    fn test_disposition_filename() {
        assert_eq!(
            disposition_filename("attachment; filename=\"data.csv\"").as_deref(),
            Some("data.csv")
        );
        assert_eq!(
            disposition_filename("attachment; filename*=UTF-8''caf%C3%A9.csv").as_deref(),
            Some("café.csv")
        );
        assert_eq!(disposition_filename("inline"), None);
    }

    #[test]
    fn test_file_metadata_prefers_bitstream_filename() {
        let path = ProviderPath::parse("/1850/1").unwrap();
        let system = parse_system(SYSMETA_XML).unwrap();
        let metadata = file_metadata(path, &ObjectRecord::default(), &system, Some("data.csv".into()));
        assert_eq!(metadata.name, "data.csv");
        assert_eq!(metadata.size(), Some(2874));
        assert_eq!(metadata.content_type(), Some("text/csv"));
        assert_eq!(metadata.backend, "dryad");
    }
}
