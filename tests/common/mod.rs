//! Common test utilities shared across integration and E2E tests

use serde_json::json;
use solid_auth::{PodService, SolidConfig};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const EMAIL: &str = "alice@example.com";
pub const PASSWORD: &str = "correct horse";
pub const ACCOUNT_TOKEN: &str = "acct-token";
pub const ACCESS_TOKEN: &str = "access-token";

/// A Community Solid Server stand-in that answers the whole login handshake
/// any number of times.
pub async fn start_mock_css() -> MockServer {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/.account/"))
        .and(header("authorization", format!("CSS-Account-Token {}", ACCOUNT_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "controls": { "account": { "clientCredentials": "/.account/account/1/client-credentials/" } }
        })))
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/.account/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "controls": { "password": { "login": format!("{}/.account/login/password/", base) } }
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/.account/login/password/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "authorization": ACCOUNT_TOKEN })),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/.account/account/1/client-credentials/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "solid-mcp-token_1",
            "secret": "client-secret"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/.oidc/token"))
        .and(header_exists("dpop"))
        .and(body_string("grant_type=client_credentials&scope=webid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": ACCESS_TOKEN,
            "token_type": "DPoP",
            "expires_in": 600
        })))
        .mount(&server)
        .await;

    server
}

/// Configuration holding the test identity, as if read from the environment
pub fn test_config() -> SolidConfig {
    SolidConfig {
        email: Some(EMAIL.to_string()),
        password: Some(PASSWORD.to_string()),
        ..SolidConfig::default()
    }
}

pub fn pod_service(config: SolidConfig) -> Arc<PodService> {
    Arc::new(PodService::new(config).expect("Failed to build Pod service"))
}

/// Issuer URL of a mock server, with trailing slash
pub fn issuer(server: &MockServer) -> String {
    format!("{}/", server.uri())
}

/// Short-lived configuration for expiry tests
pub fn short_ttl_config(ttl: Duration) -> SolidConfig {
    SolidConfig {
        session_ttl: ttl,
        ..test_config()
    }
}
