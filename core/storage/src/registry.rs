//! Provider registry for dynamic provider resolution.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use omnistore_common::{Error, Result};

use crate::dryad::{DryadConfig, DryadProvider};
use crate::memory::MemoryProvider;
use crate::provider::Provider;
use crate::transport::HttpTransport;
use crate::webdav::{WebDavConfig, WebDavProvider};

/// Factory function type for creating providers.
pub type ProviderFactory =
    Box<dyn Fn(Value, Arc<dyn HttpTransport>) -> Result<Arc<dyn Provider>> + Send + Sync>;

/// Backends known to the default registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Dryad,
    WebDav,
    Memory,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Dryad, BackendKind::WebDav, BackendKind::Memory];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Dryad => crate::dryad::DRYAD_BACKEND,
            BackendKind::WebDav => crate::webdav::WEBDAV_BACKEND,
            BackendKind::Memory => crate::memory::MEMORY_BACKEND,
        }
    }

    /// Factory building this backend from its JSON settings.
    pub fn factory(self) -> ProviderFactory {
        Box::new(move |settings, transport| self.build(settings, transport))
    }

    fn build(self, settings: Value, transport: Arc<dyn HttpTransport>) -> Result<Arc<dyn Provider>> {
        let provider: Arc<dyn Provider> = match self {
            BackendKind::Dryad => {
                let config: DryadConfig = parse_settings(self, settings)?;
                Arc::new(DryadProvider::new(config, transport)?)
            }
            BackendKind::WebDav => {
                let config: WebDavConfig = parse_settings(self, settings)?;
                Arc::new(WebDavProvider::new(config, transport)?)
            }
            BackendKind::Memory => Arc::new(MemoryProvider::new()),
        };
        Ok(provider)
    }
}

fn parse_settings<T: serde::de::DeserializeOwned>(kind: BackendKind, settings: Value) -> Result<T> {
    serde_json::from_value(settings)
        .map_err(|e| Error::Configuration(format!("Invalid {} settings: {}", kind, e)))
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::Configuration(format!("Unknown backend '{}'", s)))
    }
}

/// Registry for storage provider factories.
///
/// Allows dynamic registration and resolution of storage providers
/// by name and configuration.
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a provider factory.
    ///
    /// # Errors
    /// - `Configuration` if the name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: ProviderFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::Configuration(format!(
                "Backend '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a provider by name and settings.
    ///
    /// # Errors
    /// - `Configuration` if the backend is not registered or rejects the settings
    pub fn resolve(
        &self,
        name: &str,
        settings: Value,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Arc<dyn Provider>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("Backend '{}' is not registered", name)))?;
        factory(settings, transport)
    }

    /// Registered backend names, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with every built-in backend.
pub fn create_default_registry() -> ProviderRegistry {
    let factories = BackendKind::ALL
        .into_iter()
        .map(|kind| (kind.as_str().to_string(), kind.factory()))
        .collect();
    ProviderRegistry { factories }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use serde_json::json;

    fn transport() -> Arc<dyn HttpTransport> {
        Arc::new(MockTransport::new())
    }

    #[test]
    fn test_default_registry_lists_backends() {
        let registry = create_default_registry();
        assert_eq!(registry.providers(), vec!["dryad", "memory", "webdav"]);
        assert!(registry.has_provider("webdav"));
        assert!(!registry.has_provider("s3"));
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("dryad".parse::<BackendKind>().unwrap(), BackendKind::Dryad);
        assert_eq!(BackendKind::WebDav.to_string(), "webdav");
        assert!(matches!("s3".parse::<BackendKind>(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_resolve_backends() {
        let registry = create_default_registry();

        let dryad = registry
            .resolve("dryad", json!({ "doi": "10.5061/dryad.1850" }), transport())
            .unwrap();
        assert!(dryad.is_read_only());

        let webdav = registry
            .resolve(
                "webdav",
                json!({ "url": "https://dav.test/", "username": "u", "password": "p" }),
                transport(),
            )
            .unwrap();
        assert_eq!(webdav.name(), "webdav");
        assert!(!webdav.is_read_only());

        let memory = registry.resolve("memory", Value::Null, transport()).unwrap();
        assert_eq!(memory.name(), "memory");
    }

    #[test]
    fn test_bad_settings_are_configuration_errors() {
        let registry = create_default_registry();
        assert!(matches!(
            registry.resolve("dryad", json!({}), transport()),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            registry.resolve("nope", json!({}), transport()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ProviderRegistry::new();
        registry.register("test", BackendKind::Memory.factory()).unwrap();
        let result = registry.register("test", BackendKind::Memory.factory());
        assert!(result.is_err());
    }
}
