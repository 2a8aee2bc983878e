//! Remote document references: `{url: ...}` objects whose value is replaced
//! by the document text.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;

use super::{TagError, TagOccurrence, TagProcessor, TagResults, WriteBack};
use crate::declaration::DigestContext;

/// Default timeout for remote documents.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials attached to a remote reference.
#[derive(Clone, PartialEq, Eq)]
pub enum FetchAuthentication {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl std::fmt::Debug for FetchAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchAuthentication::Basic { username, .. } => {
                f.debug_struct("Basic").field("username", username).finish_non_exhaustive()
            }
            FetchAuthentication::Bearer { .. } => f.debug_struct("Bearer").finish_non_exhaustive(),
        }
    }
}

/// What to retrieve for one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub authentication: Option<FetchAuthentication>,
    pub skip_certificate_check: bool,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), authentication: None, skip_certificate_check: false }
    }

    /// Build a request from a `{url: string | {url, authentication?, skipCertificateCheck?}}` reference.
    pub fn from_reference(reference: &Value) -> Option<Self> {
        match reference.get("url")? {
            Value::String(url) => Some(Self::new(url.as_str())),
            Value::Object(resource) => {
                let url = resource.get("url").and_then(Value::as_str)?;
                Some(Self {
                    url: url.to_string(),
                    authentication: resource.get("authentication").and_then(parse_authentication),
                    skip_certificate_check: resource
                        .get("skipCertificateCheck")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                })
            }
            _ => None,
        }
    }
}

fn parse_authentication(block: &Value) -> Option<FetchAuthentication> {
    let text = |field: &str| block.get(field).and_then(Value::as_str).map(str::to_string);
    match block.get("method").and_then(Value::as_str)? {
        "basic" => Some(FetchAuthentication::Basic {
            username: text("username").unwrap_or_default(),
            password: text("password")?,
        }),
        "bearer-token" => Some(FetchAuthentication::Bearer { token: text("token")? }),
        _ => None,
    }
}

/// Retrieves remote documents.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<String, String>;
}

/// [`Fetcher`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { client: reqwest::Client::new(), timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<String, String> {
        let client = if request.skip_certificate_check {
            reqwest::Client::builder()
                .danger_accept_invalid_certs(true)
                .build()
                .map_err(|e| format!("failed to build HTTP client: {}", e))?
        } else {
            self.client.clone()
        };

        let mut builder = client.get(&request.url).timeout(self.timeout);
        builder = match &request.authentication {
            Some(FetchAuthentication::Basic { username, password }) => {
                builder.basic_auth(username, Some(password))
            }
            Some(FetchAuthentication::Bearer { token }) => builder.bearer_auth(token),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("unexpected status {}", status));
        }
        response.text().await.map_err(|e| e.to_string())
    }
}

/// Processor for [`super::TagKind::Fetch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchTagProcessor;

#[async_trait]
impl TagProcessor for FetchTagProcessor {
    async fn process(
        &self,
        context: &DigestContext,
        _declaration: &Value,
        occurrences: &[TagOccurrence],
    ) -> TagResults {
        join_all(occurrences.iter().map(|occurrence| resolve(context, occurrence))).await
    }
}

async fn resolve(context: &DigestContext, occurrence: &TagOccurrence) -> Result<WriteBack, TagError> {
    let request = FetchRequest::from_reference(&occurrence.data).ok_or_else(|| TagError::Fetch {
        url: occurrence.path.to_string(),
        message: "reference has no url".to_string(),
    })?;

    tracing::debug!(url = %request.url, path = %occurrence.path, "fetching remote document");
    let text = context
        .fetcher()
        .fetch(&request)
        .await
        .map_err(|message| TagError::Fetch { url: request.url.clone(), message })?;
    Ok(occurrence.replace_with(Value::String(text)))
}
