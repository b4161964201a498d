//! Credential acquisition against a Community Solid Server account API
//!
//! The handshake is a fixed sequence; every step consumes the previous
//! step's output, and the first failure aborts the whole login:
//!
//! ```text
//!   GET  <issuer>.account/                 -> controls.password.login
//!   POST <login link> {email, password}    -> authorization (account token)
//!   GET  <issuer>.account/  (account token) -> controls.account.clientCredentials
//!   POST <credentials link> {name, webId}  -> id, secret
//!   POST <issuer>.oidc/token  (Basic + DPoP) -> access_token
//! ```

use crate::config::Identity;
use crate::credential::{Credential, DpopFetch};
use crate::dpop::DpopKey;
use crate::error::{HandshakeStep, Result, SolidError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Path of the account API relative to the issuer
pub const ACCOUNT_API_PATH: &str = ".account/";

/// Path of the token endpoint relative to the issuer
pub const TOKEN_ENDPOINT_PATH: &str = ".oidc/token";

/// Authorization scheme the account API expects for its own token
const ACCOUNT_TOKEN_SCHEME: &str = "CSS-Account-Token";

/// Longest upstream body echoed back in an error message
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Deserialize)]
struct AccountIndex {
    #[serde(default)]
    controls: Value,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    authorization: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientCredentialsResponse {
    id: Option<String>,
    secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Runs the account-API handshake and yields a DPoP-bound credential
#[derive(Debug, Clone)]
pub struct CredentialAcquirer {
    client: reqwest::Client,
    step_timeout: Duration,
    client_name: String,
}

impl CredentialAcquirer {
    pub fn new(client: reqwest::Client, step_timeout: Duration, client_name: String) -> Self {
        Self {
            client,
            step_timeout,
            client_name,
        }
    }

    /// Obtain a credential for `identity` from the server at `issuer`.
    ///
    /// `issuer` must end with `/` (see [`crate::config::normalize_issuer`]).
    pub async fn acquire(&self, issuer: &Url, identity: &Identity) -> Result<Credential> {
        info!("Authenticating {} against {}", identity.email(), issuer);

        let account_api = join(issuer, ACCOUNT_API_PATH, HandshakeStep::DiscoverLogin)?;

        // 1. Discover the password login control
        debug!("Discovering account API at {}", account_api);
        let index: AccountIndex = self
            .send(
                HandshakeStep::DiscoverLogin,
                self.client.get(account_api.clone()),
            )
            .await?;
        let login_link = control(
            &index.controls,
            "/password/login",
            HandshakeStep::DiscoverLogin,
        )?;
        let login_url = join(issuer, &login_link, HandshakeStep::DiscoverLogin)?;

        // 2. Log in with email and password
        debug!("Logging in to account API at {}", login_url);
        let login: LoginResponse = self
            .send(
                HandshakeStep::PasswordLogin,
                self.client.post(login_url).json(&json!({
                    "email": identity.email(),
                    "password": identity.password(),
                })),
            )
            .await?;
        let account_token = required(
            login.authorization,
            "authorization",
            HandshakeStep::PasswordLogin,
        )?;
        let account_auth = format!("{} {}", ACCOUNT_TOKEN_SCHEME, account_token);

        // 3. Discover the client credentials control as the logged-in account
        let index: AccountIndex = self
            .send(
                HandshakeStep::DiscoverCredentials,
                self.client
                    .get(account_api)
                    .header(AUTHORIZATION, &account_auth),
            )
            .await?;
        let credentials_link = control(
            &index.controls,
            "/account/clientCredentials",
            HandshakeStep::DiscoverCredentials,
        )?;
        let credentials_url = join(
            issuer,
            &credentials_link,
            HandshakeStep::DiscoverCredentials,
        )?;

        // 4. Issue client credentials for the account's WebID
        let web_id = identity.web_id(issuer);
        debug!("Requesting client credentials for WebID {}", web_id);
        let issued: ClientCredentialsResponse = self
            .send(
                HandshakeStep::IssueClientCredentials,
                self.client
                    .post(credentials_url)
                    .header(AUTHORIZATION, &account_auth)
                    .json(&json!({ "name": self.client_name, "webId": web_id })),
            )
            .await?;
        let client_id = required(issued.id, "id", HandshakeStep::IssueClientCredentials)?;
        let client_secret = required(
            issued.secret,
            "secret",
            HandshakeStep::IssueClientCredentials,
        )?;

        // 5. Exchange them for a DPoP-bound access token
        let token_url = join(
            issuer,
            TOKEN_ENDPOINT_PATH,
            HandshakeStep::RequestAccessToken,
        )?;
        let key = DpopKey::generate()?;
        let proof = key.proof(&Method::POST, &token_url)?;
        debug!("Requesting access token from {}", token_url);
        let token: TokenResponse = self
            .send(
                HandshakeStep::RequestAccessToken,
                self.client
                    .post(token_url)
                    .header(
                        AUTHORIZATION,
                        format!("Basic {}", basic_credentials(&client_id, &client_secret)),
                    )
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .header("DPoP", proof)
                    .body("grant_type=client_credentials&scope=webid"),
            )
            .await?;
        let access_token = required(
            token.access_token,
            "access_token",
            HandshakeStep::RequestAccessToken,
        )?;

        info!("Authentication complete for {}", web_id);
        Ok(Arc::new(DpopFetch::new(
            self.client.clone(),
            access_token,
            key,
        )))
    }

    /// Send one handshake request and decode its JSON body
    async fn send<T: DeserializeOwned>(
        &self,
        step: HandshakeStep,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = request
            .timeout(self.step_timeout)
            .send()
            .await
            .map_err(|e| SolidError::upstream(step, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let url = response.url().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(SolidError::upstream(
                step,
                format!("HTTP {} from {}: {}", status, url, truncate(&body)),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SolidError::upstream(step, e.to_string()))
    }
}

/// `base64(urlencode(id):urlencode(secret))` as used for HTTP Basic
pub fn basic_credentials(client_id: &str, client_secret: &str) -> String {
    STANDARD.encode(format!(
        "{}:{}",
        urlencoding::encode(client_id),
        urlencoding::encode(client_secret)
    ))
}

/// Resolve a possibly relative link against the issuer
fn join(issuer: &Url, link: &str, step: HandshakeStep) -> Result<Url> {
    issuer
        .join(link)
        .map_err(|e| SolidError::upstream(step, format!("Invalid link '{}': {}", link, e)))
}

fn control(controls: &Value, pointer: &str, step: HandshakeStep) -> Result<String> {
    controls
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            SolidError::upstream(
                step,
                format!(
                    "Response lacks controls{}",
                    pointer.replace('/', ".")
                ),
            )
        })
}

fn required(value: Option<String>, field: &str, step: HandshakeStep) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SolidError::upstream(step, format!("Response lacks '{}'", field)))
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
