//! WebDAV storage provider implementation.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use omnistore_common::{Error, OperationKind, PathFormat, ProviderPath, Result, Secret};

use crate::metadata::{Metadata, MetadataResponse};
use crate::options::ProviderOptions;
use crate::provider::Provider;
use crate::stream::DownloadStream;
use crate::transport::{make_request, HttpMethod, HttpRequest, HttpTransport};
use crate::validation::{Existence, ValidationState};

use super::metadata::{parse_multistatus, to_metadata, DavResponse, PROPFIND_BODY};
use super::WEBDAV_BACKEND;

/// Characters left unescaped in a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// WebDAV provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebDavConfig {
    /// Root folder URL, e.g. `https://cloud.example.com/remote.php/webdav/`.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<Secret>,
}

impl WebDavConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(Secret::new(password));
        self
    }
}

/// Read-write provider over one folder of a WebDAV server.
pub struct WebDavProvider {
    config: WebDavConfig,
    /// Root folder URL, always ending in `/`.
    base: Url,
    /// Decoded server path of the root folder, always ending in `/`.
    folder: String,
    transport: Arc<dyn HttpTransport>,
}

impl WebDavProvider {
    /// Create a new WebDAV provider.
    ///
    /// # Errors
    /// - `Configuration` if `url` is not an absolute http(s) URL
    pub fn new(config: WebDavConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let mut base = Url::parse(&config.url)
            .map_err(|e| Error::Configuration(format!("Invalid WebDAV url '{}': {}", config.url, e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "WebDAV url must be http or https, got '{}'",
                config.url
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let folder = percent_decode_str(base.path()).decode_utf8_lossy().into_owned();

        Ok(Self {
            config,
            base,
            folder,
            transport,
        })
    }

    /// Same server folder and same credentials.
    fn same_account(&self, other: &dyn Provider) -> bool {
        other
            .as_any()
            .downcast_ref::<WebDavProvider>()
            .is_some_and(|other| other.base == self.base && other.config == self.config)
    }

    fn url_for(&self, path: &ProviderPath) -> String {
        let mut url = self.base.to_string();
        let encoded: Vec<String> = path
            .segments()
            .iter()
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect();
        url.push_str(&encoded.join("/"));
        if path.is_dir() && !path.is_root() {
            url.push('/');
        }
        url
    }

    fn request(&self, method: HttpMethod, path: &ProviderPath) -> HttpRequest {
        let request = HttpRequest::new(method, self.url_for(path));
        match &self.config.username {
            Some(username) => {
                let password = self.config.password.as_ref().map(Secret::expose).unwrap_or("");
                let token = STANDARD.encode(format!("{}:{}", username, password));
                request.header("Authorization", format!("Basic {}", token))
            }
            None => request,
        }
    }

    fn propfind_request(&self, path: &ProviderPath, depth: u8) -> HttpRequest {
        self.request(HttpMethod::Propfind, path)
            .header("Depth", depth.to_string())
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(PROPFIND_BODY)
    }

    async fn propfind(&self, path: &ProviderPath, depth: u8) -> Result<Vec<DavResponse>> {
        debug!(path = %path, depth, "PROPFIND");
        let response = make_request(
            self.transport.as_ref(),
            self.propfind_request(path, depth),
            &[207],
            OperationKind::Metadata,
        )
        .await?;
        parse_multistatus(&response.text().await?)
    }

    /// Metadata of exactly `path`, which must match the entry's kind.
    async fn entry(&self, path: &ProviderPath) -> Result<Metadata> {
        let responses = self.propfind(path, 0).await?;
        let first = responses
            .first()
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        let metadata = to_metadata(first, &self.folder)?;
        if metadata.is_folder() != path.is_dir() {
            return Err(Error::NotFound(path.to_string()));
        }
        Ok(metadata)
    }

    fn remote_peer<'a>(&self, dest: &'a dyn Provider, kind: OperationKind) -> Result<&'a WebDavProvider> {
        dest.as_any()
            .downcast_ref::<WebDavProvider>()
            .filter(|_| self.same_account(dest))
            .ok_or_else(|| {
                Error::operation(kind, None, format!("{} cannot reach {} directly", WEBDAV_BACKEND, dest.name()))
            })
    }

    async fn relocate(
        &self,
        method: HttpMethod,
        kind: OperationKind,
        dest: &dyn Provider,
        src_path: &ProviderPath,
        dest_path: &ProviderPath,
    ) -> Result<Metadata> {
        let peer = self.remote_peer(dest, kind)?;
        if src_path.is_root() {
            return Err(Error::operation(kind, None, format!("Cannot {} the root folder", kind)));
        }
        let request = self
            .request(method, src_path)
            .header("Destination", peer.url_for(dest_path))
            .header("Overwrite", "T");
        make_request(self.transport.as_ref(), request, &[201, 204], kind).await?;
        info!(from = %src_path, to = %dest_path, %kind, "WebDAV entry relocated");
        peer.entry(dest_path).await
    }
}

#[async_trait]
impl Provider for WebDavProvider {
    fn name(&self) -> &str {
        WEBDAV_BACKEND
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn can_duplicate_names(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn can_intra_copy(&self, other: &dyn Provider, _path: Option<&ProviderPath>) -> bool {
        self.same_account(other)
    }

    fn can_intra_move(&self, other: &dyn Provider, _path: Option<&ProviderPath>) -> bool {
        self.same_account(other)
    }

    async fn validate_path(&self, raw: &str, _options: &ProviderOptions) -> Result<ProviderPath> {
        ValidationState::start(raw, PathFormat::default()).into_result()
    }

    async fn validate_existing_path(
        &self,
        raw: &str,
        _options: &ProviderOptions,
    ) -> Result<ProviderPath> {
        ValidationState::start(raw, PathFormat::default())
            .run_lookup(|path| async move {
                let response = make_request(
                    self.transport.as_ref(),
                    self.propfind_request(&path, 0),
                    &[207, 404],
                    OperationKind::Metadata,
                )
                .await?;
                if response.status == 404 {
                    return Ok(Existence::Absent);
                }
                let responses = parse_multistatus(&response.text().await?)?;
                let matches_kind = responses
                    .first()
                    .is_some_and(|first| first.props.collection == path.is_dir());
                Ok(if matches_kind {
                    Existence::Present
                } else {
                    Existence::Absent
                })
            })
            .await
    }

    async fn metadata(
        &self,
        path: &ProviderPath,
        _options: &ProviderOptions,
    ) -> Result<MetadataResponse> {
        if path.is_file() {
            return Ok(MetadataResponse::File(self.entry(path).await?));
        }

        let mut entries = self
            .propfind(path, 1)
            .await?
            .iter()
            .map(|response| to_metadata(response, &self.folder))
            .collect::<Result<Vec<_>>>()?;

        let position = entries
            .iter()
            .position(|entry| entry.path == *path)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        let folder = entries.remove(position);
        if !folder.is_folder() {
            return Err(Error::NotFound(path.to_string()));
        }
        Ok(MetadataResponse::Folder {
            folder,
            children: entries,
        })
    }

    async fn download(
        &self,
        path: &ProviderPath,
        options: &ProviderOptions,
    ) -> Result<DownloadStream> {
        if !path.is_file() {
            return Err(Error::operation(
                OperationKind::Download,
                None,
                format!("Cannot download folder {}", path),
            ));
        }
        let mut request = self.request(HttpMethod::Get, path);
        if let Some(range) = options.range() {
            request = request.header("Range", range.header_value());
        }
        let response = make_request(
            self.transport.as_ref(),
            request,
            &[200, 206],
            OperationKind::Download,
        )
        .await?;

        let size = response.content_length();
        let content_type = response.header("content-type").map(String::from);
        Ok(DownloadStream::new(response.into_stream())
            .with_size(size)
            .with_name(path.name().map(String::from))
            .with_content_type(content_type))
    }

    async fn upload(
        &self,
        stream: DownloadStream,
        path: &ProviderPath,
        _options: &ProviderOptions,
    ) -> Result<Metadata> {
        self.ensure_writable()?;
        if !path.is_file() {
            return Err(Error::operation(
                OperationKind::Upload,
                None,
                format!("Cannot upload onto folder {}", path),
            ));
        }

        let mut request = self.request(HttpMethod::Put, path);
        if let Some(content_type) = stream.content_type() {
            request = request.header("Content-Type", content_type);
        }
        let size = stream.size();
        let request = request.stream_body(stream.into_inner(), size);
        make_request(
            self.transport.as_ref(),
            request,
            &[200, 201, 204],
            OperationKind::Upload,
        )
        .await?;

        info!(path = %path, "WebDAV upload complete");
        self.entry(path).await
    }

    async fn delete(&self, path: &ProviderPath, _options: &ProviderOptions) -> Result<()> {
        self.ensure_writable()?;
        if path.is_root() {
            return Err(Error::operation(
                OperationKind::Delete,
                None,
                "Cannot delete the root folder",
            ));
        }
        make_request(
            self.transport.as_ref(),
            self.request(HttpMethod::Delete, path),
            &[200, 204],
            OperationKind::Delete,
        )
        .await?;
        info!(path = %path, "WebDAV entry deleted");
        Ok(())
    }

    async fn create_folder(
        &self,
        path: &ProviderPath,
        _options: &ProviderOptions,
    ) -> Result<Metadata> {
        self.ensure_writable()?;
        if !path.is_dir() || path.is_root() {
            return Err(Error::operation(
                OperationKind::CreateFolder,
                None,
                format!("Not a folder path: {}", path),
            ));
        }
        let response = make_request(
            self.transport.as_ref(),
            self.request(HttpMethod::Mkcol, path),
            &[201, 405],
            OperationKind::CreateFolder,
        )
        .await?;
        if response.status == 405 {
            return Err(Error::Conflict(path.to_string()));
        }
        info!(path = %path, "WebDAV folder created");
        self.entry(path).await
    }

    async fn intra_copy(
        &self,
        dest: &dyn Provider,
        src_path: &ProviderPath,
        dest_path: &ProviderPath,
    ) -> Result<Metadata> {
        self.relocate(HttpMethod::Copy, OperationKind::Copy, dest, src_path, dest_path)
            .await
    }

    async fn intra_move(
        &self,
        dest: &dyn Provider,
        src_path: &ProviderPath,
        dest_path: &ProviderPath,
    ) -> Result<Metadata> {
        self.relocate(HttpMethod::Move, OperationKind::Move, dest, src_path, dest_path)
            .await
    }
}
