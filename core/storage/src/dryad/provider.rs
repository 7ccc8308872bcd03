//! Dryad storage provider implementation.

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, info};

use omnistore_common::{Error, OperationKind, PathFormat, PathKind, ProviderPath, Result};

use crate::metadata::{Metadata, MetadataResponse};
use crate::options::ProviderOptions;
use crate::provider::Provider;
use crate::stream::DownloadStream;
use crate::transport::{make_request, HttpMethod, HttpRequest, HttpTransport};
use crate::validation::{DepthRule, Existence, ValidationState};

use super::metadata::{self as dryad_metadata, disposition_filename, parse_object, parse_system, part_path};
use super::DRYAD_BACKEND;

/// Dryad object service (package and file objects, bitstreams).
pub const DRYAD_META_URL: &str = "http://datadryad.org/mn/object/doi:10.5061/dryad.";
/// Dryad system metadata service.
pub const DRYAD_SYSMETA_URL: &str = "http://datadryad.org/mn/meta/doi:10.5061/dryad.";

fn default_meta_url() -> String {
    DRYAD_META_URL.to_string()
}

fn default_sysmeta_url() -> String {
    DRYAD_SYSMETA_URL.to_string()
}

/// Dryad provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryadConfig {
    /// Package DOI, e.g. `10.5061/dryad.1850`.
    pub doi: String,
    #[serde(default = "default_meta_url")]
    pub meta_url: String,
    #[serde(default = "default_sysmeta_url")]
    pub sysmeta_url: String,
}

impl DryadConfig {
    pub fn new(doi: impl Into<String>) -> Self {
        Self {
            doi: doi.into(),
            meta_url: default_meta_url(),
            sysmeta_url: default_sysmeta_url(),
        }
    }

    /// Package number, the last dot-separated part of the DOI.
    pub fn package_id(&self) -> &str {
        self.doi.rsplit('.').next().unwrap_or(&self.doi)
    }
}

/// Read-only provider over one Dryad data package.
///
/// The namespace is exactly two levels deep:
/// - `/` is the repository,
/// - `/<package>/` is the configured package,
/// - `/<package>/<file>` is one file of that package.
pub struct DryadProvider {
    config: DryadConfig,
    transport: Arc<dyn HttpTransport>,
    rule: DepthRule,
}

impl DryadProvider {
    /// Create a new Dryad provider.
    ///
    /// # Errors
    /// - `Configuration` if the DOI has no package number
    pub fn new(config: DryadConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        if config.doi.trim().is_empty() || config.package_id().is_empty() {
            return Err(Error::Configuration(format!(
                "Dryad provider requires a package DOI, got '{}'",
                config.doi
            )));
        }
        Ok(Self {
            config,
            transport,
            rule: DepthRule::new(vec![PathKind::Directory, PathKind::File]),
        })
    }

    fn read_only<T>(&self) -> Result<T> {
        Err(Error::ReadOnlyProvider(DRYAD_BACKEND.to_string()))
    }

    /// Syntax, depth and package checks; no network.
    fn structural(&self, raw: &str) -> ValidationState {
        let package = self.config.package_id();
        ValidationState::start(raw, PathFormat::default())
            .check_structure(&self.rule)
            .check_with(|path| path.segments().first().is_some_and(|p| p == package))
    }

    fn ensure_in_namespace(&self, path: &ProviderPath) -> Result<()> {
        self.structural(path.as_str()).into_result().map(|_| ())
    }

    fn object_url(&self, path: &ProviderPath) -> String {
        format!("{}{}", self.config.meta_url, path.segments().join("/"))
    }

    fn bitstream_url(&self, path: &ProviderPath) -> String {
        format!("{}/bitstream", self.object_url(path))
    }

    fn sysmeta_url(&self, path: &ProviderPath) -> String {
        format!("{}{}/bitstream", self.config.sysmeta_url, path.segments().join("/"))
    }

    async fn get_text(&self, url: String) -> Result<String> {
        let response = make_request(
            self.transport.as_ref(),
            HttpRequest::new(HttpMethod::Get, url),
            &[200, 206],
            OperationKind::Metadata,
        )
        .await?;
        response.text().await
    }

    fn package_path(&self) -> Result<ProviderPath> {
        ProviderPath::parse(&format!("/{}/", self.config.package_id()))
    }

    async fn package_metadata(&self) -> Result<(Metadata, Vec<String>)> {
        let path = self.package_path()?;
        let object = parse_object(&self.get_text(self.object_url(&path)).await?)?;
        let parts = object.parts.clone();
        Ok((dryad_metadata::package_metadata(path, &object), parts))
    }

    async fn file_metadata(&self, path: ProviderPath) -> Result<Metadata> {
        debug!(path = %path, "Fetching Dryad file metadata");
        let object = parse_object(&self.get_text(self.object_url(&path)).await?)?;
        let system = parse_system(&self.get_text(self.sysmeta_url(&path)).await?)?;

        let head = make_request(
            self.transport.as_ref(),
            HttpRequest::new(HttpMethod::Head, self.bitstream_url(&path)),
            &[200, 206],
            OperationKind::Metadata,
        )
        .await?;
        let filename = head.header("content-disposition").and_then(disposition_filename);

        Ok(dryad_metadata::file_metadata(path, &object, &system, filename))
    }

    fn root_metadata(&self) -> Metadata {
        Metadata::folder("", ProviderPath::root(), DRYAD_BACKEND, self.config.doi.as_str())
    }
}

#[async_trait]
impl Provider for DryadProvider {
    fn name(&self) -> &str {
        DRYAD_BACKEND
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn can_duplicate_names(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    /// Files are streamed straight into the destination's upload; folders
    /// go through the caller's generic transfer.
    fn can_intra_copy(&self, other: &dyn Provider, path: Option<&ProviderPath>) -> bool {
        !other.is_read_only() && path.map_or(true, ProviderPath::is_file)
    }

    fn can_intra_move(&self, _other: &dyn Provider, _path: Option<&ProviderPath>) -> bool {
        false
    }

    async fn validate_path(&self, raw: &str, _options: &ProviderOptions) -> Result<ProviderPath> {
        self.structural(raw).into_result()
    }

    async fn validate_existing_path(
        &self,
        raw: &str,
        _options: &ProviderOptions,
    ) -> Result<ProviderPath> {
        self.structural(raw)
            .run_lookup(|path| async move {
                let response = make_request(
                    self.transport.as_ref(),
                    HttpRequest::new(HttpMethod::Get, self.object_url(&path)),
                    &[200, 404],
                    OperationKind::Metadata,
                )
                .await?;
                Ok(if response.status == 404 {
                    Existence::Absent
                } else {
                    Existence::Present
                })
            })
            .await
    }

    async fn metadata(
        &self,
        path: &ProviderPath,
        _options: &ProviderOptions,
    ) -> Result<MetadataResponse> {
        self.ensure_in_namespace(path)?;

        if path.is_file() {
            return Ok(MetadataResponse::File(self.file_metadata(path.clone()).await?));
        }

        let (package, parts) = self.package_metadata().await?;
        if path.is_root() {
            return Ok(MetadataResponse::Folder {
                folder: self.root_metadata(),
                children: vec![package],
            });
        }

        let children = try_join_all(
            parts
                .iter()
                .map(|part| part_path(part))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .map(|child| self.file_metadata(child)),
        )
        .await?;
        Ok(MetadataResponse::Folder {
            folder: package,
            children,
        })
    }

    async fn download(
        &self,
        path: &ProviderPath,
        options: &ProviderOptions,
    ) -> Result<DownloadStream> {
        self.ensure_in_namespace(path)?;
        if !path.is_file() {
            return Err(Error::operation(
                OperationKind::Download,
                None,
                format!("Cannot download folder {}", path),
            ));
        }

        let metadata = self.file_metadata(path.clone()).await?;

        let mut request = HttpRequest::new(HttpMethod::Get, self.bitstream_url(path));
        let range = options.range();
        if let Some(range) = range {
            request = request.header("Range", range.header_value());
        }
        let response = make_request(
            self.transport.as_ref(),
            request,
            &[200, 206],
            OperationKind::Download,
        )
        .await?;

        let size = match range {
            Some(_) => response.content_length(),
            None => metadata.size().or(response.content_length()),
        };
        let content_type = metadata.content_type().map(String::from);
        Ok(DownloadStream::new(response.into_stream())
            .with_size(size)
            .with_name(Some(metadata.name))
            .with_content_type(content_type))
    }

    async fn upload(
        &self,
        _stream: DownloadStream,
        _path: &ProviderPath,
        _options: &ProviderOptions,
    ) -> Result<Metadata> {
        self.read_only()
    }

    async fn delete(&self, _path: &ProviderPath, _options: &ProviderOptions) -> Result<()> {
        self.read_only()
    }

    async fn create_folder(
        &self,
        _path: &ProviderPath,
        _options: &ProviderOptions,
    ) -> Result<Metadata> {
        self.read_only()
    }

    /// Stream the bitstream into `dest`. Dryad file names are numbers, so a
    /// destination that reuses the source name, or names a folder, receives
    /// the real filename instead.
    async fn intra_copy(
        &self,
        dest: &dyn Provider,
        src_path: &ProviderPath,
        dest_path: &ProviderPath,
    ) -> Result<Metadata> {
        let stream = self.download(src_path, &ProviderOptions::new()).await?;
        let filename = stream.name().map(String::from);

        let target = match filename {
            Some(name) if dest_path.is_dir() => dest_path.child(&name, PathKind::File)?,
            Some(name) if dest_path.name() == src_path.name() => dest_path.with_name(&name)?,
            _ => dest_path.clone(),
        };

        info!(from = %src_path, to = %target, dest = dest.name(), "Copying Dryad file");
        dest.upload(stream, &target, &ProviderOptions::new()).await
    }

    async fn intra_move(
        &self,
        _dest: &dyn Provider,
        _src_path: &ProviderPath,
        _dest_path: &ProviderPath,
    ) -> Result<Metadata> {
        self.read_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProvider;
    use crate::testing::MockTransport;
    use crate::transport::HttpResponse;

    const META: &str = "http://dryad.test/object/doi:10.5061/dryad.";
    const SYSMETA: &str = "http://dryad.test/meta/doi:10.5061/dryad.";

    const PACKAGE_XML: &str = r#"<DryadDataPackage xmlns:dcterms="http://purl.org/dc/terms/">
  <dcterms:title>Test package</dcterms:title>
  <dcterms:identifier>http://dx.doi.org/10.5061/dryad.4</dcterms:identifier>
  <dcterms:hasPart>http://dx.doi.org/10.5061/dryad.4/YY</dcterms:hasPart>
</DryadDataPackage>"#;

    const FILE_XML: &str = r#"<DryadDataFile xmlns:dcterms="http://purl.org/dc/terms/">
  <dcterms:title>Measurements</dcterms:title>
  <dcterms:identifier>http://dx.doi.org/10.5061/dryad.4/YY</dcterms:identifier>
</DryadDataFile>"#;

    const SYSMETA_XML: &str = r#"<d1:systemMetadata xmlns:d1="http://ns.dataone.org/service/types/v1">
  <formatId>text/csv</formatId>
  <size>11</size>
  <checksum algorithm="MD5">abc123</checksum>
</d1:systemMetadata>"#;

    fn setup() -> (Arc<MockTransport>, DryadProvider) {
        let transport = Arc::new(MockTransport::new());
        let config = DryadConfig {
            doi: "10.5061/dryad.4".to_string(),
            meta_url: META.to_string(),
            sysmeta_url: SYSMETA.to_string(),
        };
        let provider = DryadProvider::new(config, transport.clone()).unwrap();
        (transport, provider)
    }

    fn expect_file(transport: &MockTransport) {
        transport.respond(HttpMethod::Get, &format!("{META}4/YY"), HttpResponse::new(200).with_body(FILE_XML));
        transport.respond(
            HttpMethod::Get,
            &format!("{SYSMETA}4/YY/bitstream"),
            HttpResponse::new(200).with_body(SYSMETA_XML),
        );
        transport.respond(
            HttpMethod::Head,
            &format!("{META}4/YY/bitstream"),
            HttpResponse::new(200).with_header("Content-Disposition", "attachment; filename=\"data.csv\""),
        );
    }

    fn options() -> ProviderOptions {
        ProviderOptions::new()
    }

    #[test]
    fn test_empty_doi_is_configuration_error() {
        let result = DryadProvider::new(DryadConfig::new(""), Arc::new(MockTransport::new()));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_validate_path_structure() {
        let (transport, provider) = setup();

        assert!(provider.validate_path("/", &options()).await.unwrap().is_root());
        assert!(provider.validate_path("/4/", &options()).await.unwrap().is_dir());
        let file = provider.validate_path("/4/YY", &options()).await.unwrap();
        assert!(file.is_file());
        assert_eq!(file.segments(), &["4", "YY"]);

        for raw in ["/4", "/4/YY/", "/4/YY/z", "/5/YY"] {
            assert!(
                matches!(provider.validate_path(raw, &options()).await, Err(Error::NotFound(_))),
                "{raw} should be not found"
            );
        }
        assert!(matches!(
            provider.validate_path("/4/../YY", &options()).await,
            Err(Error::InvalidPath(_))
        ));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_validate_existing_path_present() {
        let (transport, provider) = setup();
        transport.respond(HttpMethod::Get, &format!("{META}4/YY"), HttpResponse::new(200).with_body(FILE_XML));

        let path = provider.validate_existing_path("/4/YY", &options()).await.unwrap();
        assert!(path.is_file());
        assert_eq!(path.as_str(), "/4/YY");
        assert_eq!(path.segments(), &["4", "YY"]);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_validate_existing_path_absent() {
        let (transport, provider) = setup();
        transport.respond(HttpMethod::Get, &format!("{META}4/ZZ"), HttpResponse::new(404));

        let err = provider.validate_existing_path("/4/ZZ", &options()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_validate_existing_path_trailing_slash_skips_lookup() {
        let (transport, provider) = setup();
        let err = provider.validate_existing_path("/4/YY/", &options()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_validate_existing_path_server_error() {
        let (transport, provider) = setup();
        transport.respond(HttpMethod::Get, &format!("{META}4"), HttpResponse::new(500));

        let err = provider.validate_existing_path("/4/", &options()).await.unwrap_err();
        assert!(matches!(err, Error::Metadata { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn test_root_metadata() {
        let (transport, provider) = setup();
        transport.respond(HttpMethod::Get, &format!("{META}4"), HttpResponse::new(200).with_body(PACKAGE_XML));

        let response = provider.metadata(&ProviderPath::root(), &options()).await.unwrap();
        assert!(response.entry().is_folder());
        assert_eq!(response.entry().path.as_str(), "/");
        assert_eq!(response.children().len(), 1);
        let package = &response.children()[0];
        assert!(package.is_folder());
        assert_eq!(package.path.as_str(), "/4/");
        assert_eq!(package.name, "Test package");
    }

    #[tokio::test]
    async fn test_package_metadata_lists_files() {
        let (transport, provider) = setup();
        transport.respond(HttpMethod::Get, &format!("{META}4"), HttpResponse::new(200).with_body(PACKAGE_XML));
        expect_file(&transport);

        let response = provider
            .metadata(&ProviderPath::parse("/4/").unwrap(), &options())
            .await
            .unwrap();
        let children = response.children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].path.as_str(), "/4/YY");
        assert_eq!(children[0].name, "data.csv");
        assert_eq!(children[0].size(), Some(11));
    }

    #[tokio::test]
    async fn test_download_declares_size_and_name() {
        let (transport, provider) = setup();
        expect_file(&transport);
        transport.respond(
            HttpMethod::Get,
            &format!("{META}4/YY/bitstream"),
            HttpResponse::new(200).with_body("a,b\n1,2\n3,4"),
        );

        let download = provider
            .download(&ProviderPath::parse("/4/YY").unwrap(), &options())
            .await
            .unwrap();
        assert_eq!(download.size(), Some(11));
        assert_eq!(download.name(), Some("data.csv"));
        assert_eq!(download.collect_bytes().await.unwrap().as_ref(), b"a,b\n1,2\n3,4");
    }

    #[tokio::test]
    async fn test_read_only_operations_never_touch_network() {
        let (transport, provider) = setup();
        let file = ProviderPath::parse("/4/YY").unwrap();
        let dest = MemoryProvider::new();

        let err = provider
            .upload(DownloadStream::from_bytes(&b"x"[..]), &file, &options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReadOnlyProvider(_)));
        assert!(matches!(provider.delete(&file, &options()).await, Err(Error::ReadOnlyProvider(_))));
        assert!(matches!(
            provider.create_folder(&ProviderPath::parse("/4/").unwrap(), &options()).await,
            Err(Error::ReadOnlyProvider(_))
        ));
        assert!(matches!(
            provider.intra_move(&dest, &file, &ProviderPath::parse("/x").unwrap()).await,
            Err(Error::ReadOnlyProvider(_))
        ));
        assert!(!provider.can_intra_move(&dest, Some(&file)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_intra_copy_uses_real_filename() {
        let (transport, provider) = setup();
        expect_file(&transport);
        transport.respond(
            HttpMethod::Get,
            &format!("{META}4/YY/bitstream"),
            HttpResponse::new(200).with_body("a,b\n1,2\n3,4"),
        );
        let dest = MemoryProvider::new();
        let src = ProviderPath::parse("/4/YY").unwrap();

        assert!(provider.can_intra_copy(&dest, Some(&src)));
        assert!(!provider.can_intra_copy(&dest, Some(&ProviderPath::parse("/4/").unwrap())));

        let metadata = provider
            .intra_copy(&dest, &src, &ProviderPath::root())
            .await
            .unwrap();
        assert_eq!(metadata.path.as_str(), "/data.csv");
        assert_eq!(metadata.size(), Some(11));
    }
}
