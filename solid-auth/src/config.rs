//! Configuration for the Solid MCP server
//!
//! Values come from an optional TOML file and are then overridden by the
//! process environment (`SOLID_EMAIL`, `SOLID_PASSWORD`, `SOLID_OIDC_ISSUER`,
//! `SOLID_SESSION_TTL`). Missing identity values are only an error once a
//! login is attempted.

use crate::error::{Result, SolidError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Environment variable holding the account email
pub const ENV_EMAIL: &str = "SOLID_EMAIL";
/// Environment variable holding the account password
pub const ENV_PASSWORD: &str = "SOLID_PASSWORD";
/// Environment variable holding the default OIDC issuer
pub const ENV_ISSUER: &str = "SOLID_OIDC_ISSUER";
/// Environment variable overriding the session lifetime (humantime syntax)
pub const ENV_SESSION_TTL: &str = "SOLID_SESSION_TTL";

/// Server configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct SolidConfig {
    /// Issuer used when `solid_login` is called without `oidcIssuer`
    #[serde(default)]
    pub default_issuer: Option<String>,
    /// Account email used when the login call supplies none
    #[serde(default)]
    pub email: Option<String>,
    /// Account password used when the login call supplies none
    #[serde(default)]
    pub password: Option<String>,
    /// Lifetime of a session after a successful login
    #[serde(default = "SolidConfig::default_session_ttl", with = "humantime_serde")]
    pub session_ttl: Duration,
    /// Upper bound for each handshake request
    #[serde(default = "SolidConfig::default_step_timeout", with = "humantime_serde")]
    pub step_timeout: Duration,
    /// Name given to client credentials issued by the account API
    #[serde(default = "SolidConfig::default_client_name")]
    pub client_name: String,
}

impl Default for SolidConfig {
    fn default() -> Self {
        Self {
            default_issuer: None,
            email: None,
            password: None,
            session_ttl: Self::default_session_ttl(),
            step_timeout: Self::default_step_timeout(),
            client_name: Self::default_client_name(),
        }
    }
}

impl fmt::Debug for SolidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolidConfig")
            .field("default_issuer", &self.default_issuer)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("session_ttl", &self.session_ttl)
            .field("step_timeout", &self.step_timeout)
            .field("client_name", &self.client_name)
            .finish()
    }
}

impl SolidConfig {
    fn default_session_ttl() -> Duration {
        Duration::from_secs(crate::DEFAULT_SESSION_TTL_SECS)
    }

    fn default_step_timeout() -> Duration {
        Duration::from_secs(crate::DEFAULT_STEP_TIMEOUT_SECS)
    }

    fn default_client_name() -> String {
        "solid-mcp-token".to_string()
    }

    /// Load configuration from an optional file, then apply the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SolidError::Configuration(format!(
                "Failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&content)
            .map_err(|e| SolidError::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Override fields from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(email) = lookup(ENV_EMAIL) {
            self.email = Some(email);
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.password = Some(password);
        }
        if let Some(issuer) = lookup(ENV_ISSUER) {
            self.default_issuer = Some(issuer);
        }
        if let Some(ttl) = lookup(ENV_SESSION_TTL) {
            self.session_ttl = humantime_serde::re::humantime::parse_duration(&ttl).map_err(
                |e| SolidError::Configuration(format!("Invalid {}: {}", ENV_SESSION_TTL, e)),
            )?;
        }
        Ok(())
    }

    /// Resolve the login identity, call arguments taking precedence
    pub fn identity(&self, email: Option<&str>, password: Option<&str>) -> Result<Identity> {
        let email = non_empty(email).or_else(|| non_empty(self.email.as_deref()));
        let password = non_empty(password).or_else(|| non_empty(self.password.as_deref()));

        match (email, password) {
            (Some(email), Some(password)) => Ok(Identity::new(email, password)),
            _ => Err(SolidError::Configuration(format!(
                "Missing Solid credentials: {} and {} must both be set (or passed as email and password)",
                ENV_EMAIL, ENV_PASSWORD
            ))),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Login identity for the account API
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    email: String,
    password: String,
}

impl Identity {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Part of the email before `@`, used as the Pod name
    pub fn local_part(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }

    /// WebID the account API issues credentials for
    pub fn web_id(&self, issuer: &Url) -> String {
        format!("{}{}/profile/card#me", issuer, self.local_part())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parse an issuer URL and make sure it ends with `/`
pub fn normalize_issuer(issuer: &str) -> Result<Url> {
    let issuer = issuer.trim();
    let with_slash = if issuer.ends_with('/') {
        issuer.to_string()
    } else {
        format!("{}/", issuer)
    };

    let url = Url::parse(&with_slash)
        .map_err(|e| SolidError::BadRequest(format!("Invalid issuer URL '{}': {}", issuer, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SolidError::BadRequest(format!(
            "Unsupported issuer scheme '{}'",
            other
        ))),
    }
}
