//! Backend configuration file.
//!
//! ```json
//! {
//!   "backends": {
//!     "papers": { "backend": "dryad", "settings": { "doi": "10.5061/dryad.1850" } },
//!     "cloud": { "backend": "webdav", "settings": { "url": "https://dav.example.com/" } }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use omnistore_common::{Error, Result};

use crate::provider::Provider;
use crate::registry::{BackendKind, ProviderRegistry};
use crate::transport::HttpTransport;

/// One configured backend instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend identifier, e.g. `dryad`.
    pub backend: String,
    #[serde(default)]
    pub settings: Value,
}

/// Aliased backend instances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,
}

impl Config {
    /// Read a configuration file.
    ///
    /// # Errors
    /// - `Io` if the file cannot be read
    /// - `Configuration` if it is not a valid configuration document
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::Configuration(format!("Invalid configuration: {}", e)))
    }

    /// A config holding a single `memory` backend under `alias`.
    pub fn with_memory(alias: impl Into<String>) -> Self {
        let mut backends = BTreeMap::new();
        backends.insert(
            alias.into(),
            BackendConfig {
                backend: BackendKind::Memory.to_string(),
                settings: Value::Null,
            },
        );
        Self { backends }
    }

    /// Build the provider configured under `alias`.
    ///
    /// # Errors
    /// - `Configuration` for an unknown alias, an unknown backend, or bad settings
    pub fn resolve(
        &self,
        alias: &str,
        registry: &ProviderRegistry,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Arc<dyn Provider>> {
        let entry = self
            .backends
            .get(alias)
            .ok_or_else(|| Error::Configuration(format!("No backend configured as '{}'", alias)))?;
        if !registry.has_provider(&entry.backend) {
            return Err(Error::Configuration(format!(
                "Backend '{}' for '{}' is not available",
                entry.backend, alias
            )));
        }
        registry.resolve(&entry.backend, entry.settings.clone(), transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::create_default_registry;
    use crate::testing::MockTransport;
    use tempfile::TempDir;

    const CONFIG: &str = r#"{
        "backends": {
            "papers": { "backend": "dryad", "settings": { "doi": "10.5061/dryad.1850" } },
            "cloud": {
                "backend": "webdav",
                "settings": { "url": "https://dav.test/remote.php/webdav/", "username": "u", "password": "p" }
            },
            "scratch": { "backend": "memory" },
            "broken": { "backend": "ftp", "settings": {} }
        }
    }"#;

    #[tokio::test]
    async fn test_load_and_resolve() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("omnistore.json");
        tokio::fs::write(&file, CONFIG).await.unwrap();

        let config = Config::load(&file).await.unwrap();
        assert_eq!(config.backends.len(), 4);

        let registry = create_default_registry();
        let transport: Arc<dyn HttpTransport> = Arc::new(MockTransport::new());
        let papers = config.resolve("papers", &registry, transport.clone()).unwrap();
        assert_eq!(papers.name(), "dryad");
        let cloud = config.resolve("cloud", &registry, transport.clone()).unwrap();
        assert_eq!(cloud.name(), "webdav");
        let scratch = config.resolve("scratch", &registry, transport.clone()).unwrap();
        assert_eq!(scratch.name(), "memory");

        assert!(matches!(
            config.resolve("broken", &registry, transport.clone()),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            config.resolve("missing", &registry, transport),
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = Config::load(temp.path().join("absent.json")).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_invalid_document() {
        assert!(matches!(Config::from_json("[]"), Err(Error::Configuration(_))));
    }
}
