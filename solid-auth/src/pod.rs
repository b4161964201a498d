//! Delegated Pod operations
//!
//! [`PodService`] ties the handshake, the session store and the gateway
//! together. Every storage operation resolves its session through the
//! gateway first, then issues plain LDP / SPARQL-Update requests with the
//! session's credential.

use crate::acquirer::CredentialAcquirer;
use crate::config::{normalize_issuer, SolidConfig};
use crate::credential::{Credential, FetchRequest};
use crate::error::{Result, SolidError};
use crate::gateway::SessionGateway;
use crate::session::{SessionId, SessionStore, UNKNOWN_SESSION};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE, LINK};
use reqwest::{Method, Response};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

const LDP_CONTAINS: &str = "http://www.w3.org/ns/ldp#contains";
const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
const JSON_LD: &str = "application/ld+json";
const SPARQL_UPDATE: &str = "application/sparql-update";
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session_id: SessionId,
    pub web_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Access modes for a WAC authorization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct AccessModes {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub append: bool,
}

impl AccessModes {
    fn is_empty(&self) -> bool {
        !(self.read || self.write || self.append)
    }

    fn acl_modes(&self) -> Vec<&'static str> {
        let mut modes = Vec::new();
        if self.read {
            modes.push("acl:Read");
        }
        if self.write {
            modes.push("acl:Write");
        }
        if self.append {
            modes.push("acl:Append");
        }
        modes
    }

    fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.read {
            names.push("read");
        }
        if self.write {
            names.push("write");
        }
        if self.append {
            names.push("append");
        }
        names
    }
}

/// Login plus session-authorized Pod operations
pub struct PodService {
    config: SolidConfig,
    acquirer: CredentialAcquirer,
    gateway: SessionGateway,
}

impl PodService {
    pub fn new(config: SolidConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("solid-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SolidError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: SolidConfig, client: reqwest::Client) -> Self {
        let acquirer =
            CredentialAcquirer::new(client, config.step_timeout, config.client_name.clone());
        Self {
            config,
            acquirer,
            gateway: SessionGateway::new(Arc::new(SessionStore::new())),
        }
    }

    pub fn config(&self) -> &SolidConfig {
        &self.config
    }

    pub fn gateway(&self) -> &SessionGateway {
        &self.gateway
    }

    /// Run the handshake and open a session for the resulting credential
    pub async fn login(
        &self,
        issuer: Option<&str>,
        email: Option<&str>,
        password: Option<&str>,
    ) -> Result<LoginOutcome> {
        let identity = self.config.identity(email, password)?;

        let issuer = issuer
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .or(self.config.default_issuer.as_deref())
            .ok_or_else(|| {
                SolidError::BadRequest(
                    "Missing oidcIssuer (e.g. http://localhost:3000/)".to_string(),
                )
            })?;
        let issuer = normalize_issuer(issuer)?;

        let credential = self.acquirer.acquire(&issuer, &identity).await?;
        let web_id = identity.web_id(&issuer);

        let store = self.gateway.store();
        let session_id = store
            .create(credential, web_id.clone(), self.config.session_ttl)
            .await;
        let expires_at = store
            .info(session_id.as_str())
            .await
            .map(|info| info.expires_at)
            .unwrap_or_else(Utc::now);

        Ok(LoginOutcome {
            session_id,
            web_id,
            expires_at,
        })
    }

    /// End a session before its TTL
    pub async fn logout(&self, session_id: Option<&str>) -> Result<()> {
        self.gateway.authorize(session_id).await?;
        // authorize() already rejected a missing id
        if let Some(id) = session_id {
            self.gateway.store().remove(id.trim()).await;
        }
        Ok(())
    }

    pub async fn read_resource(&self, session_id: Option<&str>, resource_url: &str) -> Result<String> {
        let credential = self.gateway.authorize(session_id).await?;
        let url = parse_url("resourceUrl", resource_url)?;

        debug!("Reading {}", url);
        let response = credential.fetch(FetchRequest::get(url.clone())).await?;
        let response = ensure_success(response, "read", &url)?;
        Ok(response.text().await?)
    }

    pub async fn write_resource(
        &self,
        session_id: Option<&str>,
        resource_url: &str,
        content: &str,
        content_type: Option<&str>,
    ) -> Result<String> {
        let credential = self.gateway.authorize(session_id).await?;
        let url = parse_url("resourceUrl", resource_url)?;
        let content_type = content_type
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        debug!("Writing {} ({})", url, content_type);
        let response = credential
            .fetch(
                FetchRequest::new(Method::PUT, url.clone())
                    .header(CONTENT_TYPE, content_type)?
                    .body(content.as_bytes().to_vec()),
            )
            .await?;
        ensure_success(response, "write", &url)?;

        info!("Wrote {} bytes to {}", content.len(), url);
        Ok(format!(
            "Successfully wrote {} bytes to {}",
            content.len(),
            url
        ))
    }

    pub async fn list_container(
        &self,
        session_id: Option<&str>,
        container_url: &str,
    ) -> Result<Vec<String>> {
        let credential = self.gateway.authorize(session_id).await?;
        let url = parse_url("containerUrl", container_url)?;

        let document = fetch_json_ld(&credential, &url, "list").await?;
        Ok(contained_resources(&document, &url))
    }

    pub async fn delete_resource(&self, session_id: Option<&str>, resource_url: &str) -> Result<String> {
        let credential = self.gateway.authorize(session_id).await?;
        let url = parse_url("resourceUrl", resource_url)?;

        let response = credential
            .fetch(FetchRequest::new(Method::DELETE, url.clone()))
            .await?;
        ensure_success(response, "delete", &url)?;

        info!("Deleted {}", url);
        Ok(format!("Successfully deleted {}", url))
    }

    /// Replace every value of `predicate` on `thing` with one string literal
    pub async fn update_rdf_resource(
        &self,
        session_id: Option<&str>,
        resource_url: &str,
        thing_url: &str,
        predicate: &str,
        value: &str,
    ) -> Result<String> {
        let credential = self.gateway.authorize(session_id).await?;
        let url = parse_url("resourceUrl", resource_url)?;
        let thing = url
            .join(thing_url)
            .map_err(|e| SolidError::BadRequest(format!("Invalid thingUrl '{}': {}", thing_url, e)))?;
        let predicate = parse_url("predicate", predicate)?;

        // A document that does not exist yet simply has no values to replace
        let response = credential
            .fetch(FetchRequest::get(url.clone()).header(ACCEPT, JSON_LD)?)
            .await?;
        let existing = if response.status().as_u16() == 404 {
            Vec::new()
        } else {
            let response = ensure_success(response, "read", &url)?;
            let document: Value = response.json().await.map_err(|e| SolidError::Delegated {
                status: 502,
                message: format!("Failed to parse {} as JSON-LD: {}", url, e),
            })?;
            existing_values(&document, &url, &thing, &predicate)
        };

        let subject = sparql_iri(&thing)?;
        let verb = sparql_iri(&predicate)?;
        let mut update = String::new();
        if !existing.is_empty() {
            update.push_str("DELETE DATA {\n");
            for object in &existing {
                update.push_str(&format!("  {} {} {} .\n", subject, verb, object));
            }
            update.push_str("};\n");
        }
        update.push_str(&format!(
            "INSERT DATA {{\n  {} {} {} .\n}}",
            subject,
            verb,
            sparql_literal(value)
        ));

        patch_sparql(&credential, &url, update, "update").await?;

        info!("Updated {} of {} in {}", predicate, thing, url);
        Ok(format!(
            "Successfully set {} of {} in {}",
            predicate, thing, url
        ))
    }

    /// Add a WAC authorization for `agent` to the resource's ACL document
    pub async fn grant_access(
        &self,
        session_id: Option<&str>,
        resource_url: &str,
        agent_web_id: &str,
        modes: AccessModes,
    ) -> Result<String> {
        let credential = self.gateway.authorize(session_id).await?;
        let owner = match session_id {
            Some(id) => self.gateway.store().info(id.trim()).await,
            None => None,
        }
        .ok_or_else(|| SolidError::Unauthorized(UNKNOWN_SESSION.to_string()))?;
        let url = parse_url("resourceUrl", resource_url)?;
        let agent = parse_url("agentWebId", agent_web_id)?;
        if modes.is_empty() {
            return Err(SolidError::BadRequest(
                "Select at least one access mode: read, write or append".to_string(),
            ));
        }

        let response = credential
            .fetch(FetchRequest::new(Method::HEAD, url.clone()))
            .await?;
        let response = ensure_success(response, "inspect", &url)?;
        let acl_link = find_link(response.headers(), "acl").ok_or_else(|| SolidError::Delegated {
            status: 501,
            message: format!("{} does not advertise an ACL document", url),
        })?;
        let acl_url = url.join(&acl_link).map_err(|e| SolidError::Delegated {
            status: 502,
            message: format!("Invalid ACL link '{}': {}", acl_link, e),
        })?;

        // A new ACL replaces the inherited one and must keep the owner in control
        let response = credential
            .fetch(FetchRequest::new(Method::HEAD, acl_url.clone()))
            .await?;
        let acl_exists = if response.status().as_u16() == 404 {
            false
        } else {
            ensure_success(response, "inspect", &acl_url)?;
            true
        };

        let mut authorizations = Vec::new();
        if !acl_exists {
            let owner = parse_url("webId", &owner.web_id)?;
            debug!("Creating {} with full control for {}", acl_url, owner);
            authorizations.push(authorization(
                &acl_url,
                "owner",
                &owner,
                &url,
                &["acl:Read", "acl:Write", "acl:Control"],
            )?);
        }
        authorizations.push(authorization(
            &acl_url,
            &format!("grant-{}", Uuid::new_v4().simple()),
            &agent,
            &url,
            &modes.acl_modes(),
        )?);

        let update = format!(
            "PREFIX acl: <http://www.w3.org/ns/auth/acl#>\nINSERT DATA {{\n{}\n}}",
            authorizations.join("\n")
        );
        patch_sparql(&credential, &acl_url, update, "update ACL of").await?;

        let names = modes.names().join(", ");
        info!("Granted {} on {} to {}", names, url, agent);
        Ok(format!(
            "Granted {} access on {} to {}",
            names, url, agent
        ))
    }
}

/// One `acl:Authorization` node of `acl` giving `agent` the `modes` on `resource`
fn authorization(
    acl: &Url,
    fragment: &str,
    agent: &Url,
    resource: &Url,
    modes: &[&str],
) -> Result<String> {
    let mut node = acl.clone();
    node.set_fragment(Some(fragment));

    let target = sparql_iri(resource)?;
    let mut statements = vec![
        format!("{} a acl:Authorization", sparql_iri(&node)?),
        format!("acl:agent {}", sparql_iri(agent)?),
        format!("acl:accessTo {}", target),
    ];
    if resource.path().ends_with('/') {
        statements.push(format!("acl:default {}", target));
    }
    statements.push(format!("acl:mode {}", modes.join(", ")));
    Ok(format!("  {} .", statements.join(" ;\n    ")))
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value.trim())
        .map_err(|e| SolidError::BadRequest(format!("Invalid {} '{}': {}", field, value, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SolidError::BadRequest(format!(
            "Invalid {} '{}': unsupported scheme '{}'",
            field, value, other
        ))),
    }
}

fn ensure_success(response: Response, action: &str, url: &Url) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SolidError::Delegated {
            status: status.as_u16(),
            message: format!("Failed to {} {}: {}", action, url, status),
        })
    }
}

async fn fetch_json_ld(credential: &Credential, url: &Url, action: &str) -> Result<Value> {
    let response = credential
        .fetch(FetchRequest::get(url.clone()).header(ACCEPT, JSON_LD)?)
        .await?;
    let response = ensure_success(response, action, url)?;
    response.json().await.map_err(|e| SolidError::Delegated {
        status: 502,
        message: format!("Failed to parse {} as JSON-LD: {}", url, e),
    })
}

async fn patch_sparql(credential: &Credential, url: &Url, update: String, action: &str) -> Result<()> {
    debug!("Patching {}:\n{}", url, update);
    let response = credential
        .fetch(
            FetchRequest::new(Method::PATCH, url.clone())
                .header(CONTENT_TYPE, SPARQL_UPDATE)?
                .body(update),
        )
        .await?;
    ensure_success(response, action, url)?;
    Ok(())
}

/// Top-level node objects of an expanded or compacted JSON-LD document
fn nodes(document: &Value) -> Vec<&serde_json::Map<String, Value>> {
    match document {
        Value::Array(items) => items.iter().flat_map(nodes).collect(),
        Value::Object(map) => match map.get("@graph") {
            Some(graph) => nodes(graph),
            None => vec![map],
        },
        _ => Vec::new(),
    }
}

fn values(node: &serde_json::Map<String, Value>, keys: &[&str]) -> Vec<Value> {
    keys.iter()
        .filter_map(|key| node.get(*key))
        .flat_map(|value| match value {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        })
        .collect()
}

fn node_id(node: &serde_json::Map<String, Value>, base: &Url) -> Option<Url> {
    node.get("@id")
        .and_then(Value::as_str)
        .and_then(|id| base.join(id).ok())
}

/// IRIs listed through `ldp:contains`, sorted and deduplicated
fn contained_resources(document: &Value, container: &Url) -> Vec<String> {
    let mut resources: Vec<String> = nodes(document)
        .into_iter()
        .flat_map(|node| values(node, &[LDP_CONTAINS, "ldp:contains", "contains"]))
        .filter_map(|value| match value {
            Value::String(id) => Some(id),
            Value::Object(map) => map.get("@id").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .filter_map(|id| container.join(&id).ok())
        .map(|url| url.to_string())
        .collect();
    resources.sort();
    resources.dedup();
    resources
}

/// Current objects of `(thing, predicate)` as SPARQL terms
fn existing_values(document: &Value, base: &Url, thing: &Url, predicate: &Url) -> Vec<String> {
    nodes(document)
        .into_iter()
        .filter(|node| node_id(node, base).as_ref() == Some(thing))
        .flat_map(|node| values(node, &[predicate.as_str()]))
        .filter_map(|value| sparql_term(&value, base))
        .collect()
}

/// Convert one JSON-LD value to a SPARQL term; blank nodes are skipped
fn sparql_term(value: &Value, base: &Url) -> Option<String> {
    match value {
        Value::String(s) => Some(sparql_literal(s)),
        Value::Object(map) => {
            if let Some(id) = map.get("@id").and_then(Value::as_str) {
                if id.starts_with("_:") {
                    return None;
                }
                return base.join(id).ok().and_then(|iri| sparql_iri(&iri).ok());
            }
            let (lexical, native_type) = match map.get("@value")? {
                Value::String(s) => (s.clone(), None),
                Value::Bool(b) => (b.to_string(), Some("boolean")),
                Value::Number(n) => {
                    let (lexical, datatype) = number_literal(n)?;
                    (lexical, Some(datatype))
                }
                _ => return None,
            };
            let literal = sparql_literal(&lexical);
            if let Some(lang) = map.get("@language").and_then(Value::as_str) {
                return Some(format!("{}@{}", literal, lang));
            }
            match map.get("@type").and_then(Value::as_str) {
                Some(datatype) => Some(format!("{}^^<{}>", literal, datatype)),
                None => match native_type {
                    Some(t) => Some(format!("{}^^<{}{}>", literal, XSD, t)),
                    None => Some(literal),
                },
            }
        }
        Value::Bool(b) => Some(format!("\"{}\"^^<{}boolean>", b, XSD)),
        Value::Number(n) => {
            let (lexical, datatype) = number_literal(n)?;
            Some(format!("\"{}\"^^<{}{}>", lexical, XSD, datatype))
        }
        _ => None,
    }
}

/// Lexical form and XSD datatype a JSON-LD processor gives a native number.
///
/// Numbers without a fractional part below 10^21 are integers; everything
/// else is a double in canonical form (`1.5E0`).
fn number_literal(n: &serde_json::Number) -> Option<(String, &'static str)> {
    if n.is_i64() || n.is_u64() {
        return Some((n.to_string(), "integer"));
    }
    let f = n.as_f64()?;
    if f.fract() == 0.0 && f.abs() < 1e21 {
        return Some((format!("{:.0}", f), "integer"));
    }
    let formatted = format!("{:.15E}", f);
    let (mantissa, exponent) = formatted.split_once('E')?;
    let mut mantissa = mantissa.trim_end_matches('0').to_string();
    if mantissa.ends_with('.') {
        mantissa.push('0');
    }
    Some((format!("{}E{}", mantissa, exponent), "double"))
}

fn sparql_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn sparql_iri(url: &Url) -> Result<String> {
    let iri = url.as_str();
    if iri
        .chars()
        .any(|c| c <= ' ' || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\'))
    {
        return Err(SolidError::BadRequest(format!(
            "'{}' cannot be used as an IRI",
            iri
        )));
    }
    Ok(format!("<{}>", iri))
}

/// Target of the first `Link` entry whose `rel` includes `rel`
fn find_link(headers: &HeaderMap, rel: &str) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|entry| {
            let mut parts = entry.split(';');
            let target = parts.next()?.trim();
            let target = target.strip_prefix('<')?.strip_suffix('>')?;
            let matches = parts.any(|param| {
                let mut kv = param.splitn(2, '=');
                let key = kv.next().unwrap_or("").trim();
                let value = kv.next().unwrap_or("").trim().trim_matches('"');
                key.eq_ignore_ascii_case("rel")
                    && value
                        .split_whitespace()
                        .any(|r| r.eq_ignore_ascii_case(rel))
            });
            matches.then(|| target.to_string())
        })
}
