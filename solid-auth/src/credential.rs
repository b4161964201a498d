//! Authenticated-request capability
//!
//! The handshake's output is only ever used through [`AuthenticatedFetch`];
//! nothing outside this module sees the access token or the DPoP key.

use crate::dpop::DpopKey;
use crate::error::{Result, SolidError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// A request to be sent with the session's credentials
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Add a header; a value that is not a valid header is a `BadRequest`
    pub fn header(mut self, name: HeaderName, value: &str) -> Result<Self> {
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            SolidError::BadRequest(format!("Invalid value for header {}: '{}'", name, value))
        })?;
        self.headers.insert(name, header_value);
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Something that can perform authenticated requests against a Pod.
///
/// Non-2xx responses are returned as-is; only transport failures are errors.
#[async_trait]
pub trait AuthenticatedFetch: Send + Sync + fmt::Debug {
    async fn fetch(&self, request: FetchRequest) -> Result<reqwest::Response>;
}

/// Shared handle to a session's capability
pub type Credential = Arc<dyn AuthenticatedFetch>;

/// DPoP-bound bearer credential produced by the client-credentials handshake
pub struct DpopFetch {
    client: reqwest::Client,
    access_token: String,
    key: DpopKey,
}

impl DpopFetch {
    pub fn new(client: reqwest::Client, access_token: String, key: DpopKey) -> Self {
        Self {
            client,
            access_token,
            key,
        }
    }
}

impl fmt::Debug for DpopFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DpopFetch")
            .field("access_token", &"<redacted>")
            .field("key", &self.key)
            .finish()
    }
}

#[async_trait]
impl AuthenticatedFetch for DpopFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<reqwest::Response> {
        let proof = self.key.proof(&request.method, &request.url)?;

        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .header(AUTHORIZATION, format!("DPoP {}", self.access_token))
            .header("DPoP", proof);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        Ok(builder.send().await?)
    }
}
