use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use super::profile::DeviceProfile;
use crate::config::ParserConfig;
use crate::tags::{ComponentCatalog, Fetcher, HttpFetcher, SecretEncryptor};

/// Per-request state shared by every digest stage.
///
/// Carries the capabilities tag processors call out to. Cloning is cheap;
/// the parser clones the caller's context to pin the effective device.
#[derive(Clone)]
pub struct DigestContext {
    request_id: Uuid,
    device: DeviceProfile,
    strict_validation: bool,
    encryptor: Option<Arc<dyn SecretEncryptor>>,
    fetcher: Arc<dyn Fetcher>,
    catalog: Option<Arc<dyn ComponentCatalog>>,
}

impl DigestContext {
    /// Strict context for the primary device with the default HTTP fetcher.
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            device: DeviceProfile::default(),
            strict_validation: true,
            encryptor: None,
            fetcher: Arc::new(HttpFetcher::default()),
            catalog: None,
        }
    }

    pub fn for_device(device: DeviceProfile) -> Self {
        Self::new().with_device(device)
    }

    /// Context honouring the configured device, strictness and fetch timeout.
    pub fn from_config(config: &ParserConfig) -> Self {
        Self::new()
            .with_device(config.device)
            .with_strict_validation(config.strict_validation)
            .with_fetcher(Arc::new(HttpFetcher::new(config.fetch_timeout())))
    }

    pub fn with_device(mut self, device: DeviceProfile) -> Self {
        self.device = device;
        self
    }

    pub fn with_strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = strict;
        self
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_encryptor(mut self, encryptor: Arc<dyn SecretEncryptor>) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ComponentCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn device(&self) -> DeviceProfile {
        self.device
    }

    pub fn strict_validation(&self) -> bool {
        self.strict_validation
    }

    pub fn encryptor(&self) -> Option<&dyn SecretEncryptor> {
        self.encryptor.as_deref()
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    pub fn catalog(&self) -> Option<&dyn ComponentCatalog> {
        self.catalog.as_deref()
    }
}

impl Default for DigestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DigestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestContext")
            .field("request_id", &self.request_id)
            .field("device", &self.device)
            .field("strict_validation", &self.strict_validation)
            .field("encryptor", &self.encryptor.is_some())
            .field("catalog", &self.catalog.is_some())
            .finish_non_exhaustive()
    }
}
