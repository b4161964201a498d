//! Tool-level flows against a mocked Community Solid Server
//!
//! These tests verify that:
//! - a login returns a session id usable by every other tool
//! - local session failures are diagnosed before any Pod request
//! - remote failures are rendered but leave the session alive
//! - sessions expire after their lifetime

use assert_matches::assert_matches;
use serde_json::{json, Value};
use solid_auth::{HandshakeStep, SolidConfig, SolidError};
use solid_mcp_tests::*;
use solid_transport::ToolRegistry;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

async fn login(registry: &ToolRegistry, issuer: &str) -> String {
    let result = registry
        .call("solid_login", json!({ "oidcIssuer": issuer }))
        .await
        .unwrap();
    assert!(!result.is_error, "login failed: {}", result.joined_text());
    assert!(result
        .joined_text()
        .starts_with("✅ Login successful. Session is active."));
    result.structured_content.unwrap()["sessionId"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_login_then_read_resource() {
    let server = start_mock_css().await;
    Mock::given(method("GET"))
        .and(path("/alice/file.txt"))
        .and(header("authorization", format!("DPoP {}", ACCESS_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string("Hello from the Pod"))
        .mount(&server)
        .await;

    let registry = ToolRegistry::new(pod_service(test_config()));
    let session_id = login(&registry, &issuer(&server)).await;

    let result = registry
        .call(
            "read_resource",
            json!({
                "sessionId": session_id,
                "resourceUrl": format!("{}/alice/file.txt", server.uri())
            }),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(result.joined_text(), "Hello from the Pod");
}

#[tokio::test]
async fn test_login_reports_web_id() {
    let server = start_mock_css().await;
    let service = pod_service(test_config());

    let outcome = service
        .login(Some(&server.uri()), None, None)
        .await
        .unwrap();
    assert_eq!(
        outcome.web_id,
        format!("{}/alice/profile/card#me", server.uri())
    );
    assert!(service
        .gateway()
        .authorize(Some(outcome.session_id.as_str()))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_logins_yield_independent_sessions() {
    let server = start_mock_css().await;
    let registry = ToolRegistry::new(pod_service(test_config()));

    let first = login(&registry, &issuer(&server)).await;
    let second = login(&registry, &issuer(&server)).await;
    assert_ne!(first, second);

    let result = registry
        .call("solid_logout", json!({ "sessionId": first }))
        .await
        .unwrap();
    assert!(!result.is_error);

    // The other session is unaffected
    let result = registry
        .call("solid_logout", json!({ "sessionId": second }))
        .await
        .unwrap();
    assert!(!result.is_error);
}

#[tokio::test]
async fn test_missing_email_is_configuration_error() {
    let server = start_mock_css().await;
    let mut config = SolidConfig::default();
    config
        .apply_env(|key| (key == "SOLID_PASSWORD").then(|| PASSWORD.to_string()))
        .unwrap();
    let service = pod_service(config);

    let err = service
        .login(Some(&issuer(&server)), None, None)
        .await
        .unwrap_err();
    assert_matches!(err, SolidError::Configuration(_));
    let message = err.to_string();
    assert!(message.contains("SOLID_EMAIL"));
    assert!(message.contains("SOLID_PASSWORD"));

    // No handshake request was attempted
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_handshake_network_failure_is_upstream_error() {
    let service = pod_service(test_config());

    let err = service
        .login(Some("http://127.0.0.1:1/"), None, None)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        SolidError::Upstream {
            step: HandshakeStep::DiscoverLogin,
            ..
        }
    );
}

#[tokio::test]
async fn test_delete_with_bad_sessions() {
    let service = pod_service(test_config());
    let url = "http://localhost:3000/alice/file.txt";

    assert_matches!(
        service.delete_resource(Some(""), url).await,
        Err(SolidError::BadRequest(_))
    );
    assert_matches!(
        service.delete_resource(Some("unknown-id"), url).await,
        Err(SolidError::Unauthorized(_))
    );
}

#[tokio::test]
async fn test_remote_forbidden_keeps_session() {
    let server = start_mock_css().await;
    Mock::given(method("DELETE"))
        .and(path("/bob/secret.txt"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alice/file.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("still here"))
        .mount(&server)
        .await;

    let registry = ToolRegistry::new(pod_service(test_config()));
    let session_id = login(&registry, &issuer(&server)).await;

    let result = registry
        .call(
            "delete_resource",
            json!({
                "sessionId": session_id,
                "resourceUrl": format!("{}/bob/secret.txt", server.uri())
            }),
        )
        .await
        .unwrap();
    assert!(result.is_error);
    assert_eq!(
        result.joined_text(),
        "❌ A Solid error occurred (403). Forbidden. You may not have permission for this action."
    );

    let result = registry
        .call(
            "read_resource",
            json!({
                "sessionId": session_id,
                "resourceUrl": format!("{}/alice/file.txt", server.uri())
            }),
        )
        .await
        .unwrap();
    assert_eq!(result.joined_text(), "still here");
}

#[tokio::test]
async fn test_write_list_and_delete() {
    let server = start_mock_css().await;
    let base = server.uri();
    Mock::given(method("PUT"))
        .and(path("/alice/notes/todo.txt"))
        .and(header("content-type", "text/plain"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/alice/notes/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "@id": format!("{}/alice/notes/", base),
            "http://www.w3.org/ns/ldp#contains": [{ "@id": format!("{}/alice/notes/todo.txt", base) }]
        }])))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/alice/notes/todo.txt"))
        .respond_with(ResponseTemplate::new(205))
        .mount(&server)
        .await;

    let registry = ToolRegistry::new(pod_service(test_config()));
    let session_id = login(&registry, &issuer(&server)).await;

    let written = registry
        .call(
            "write_text_resource",
            json!({
                "sessionId": session_id,
                "resourceUrl": format!("{}/alice/notes/todo.txt", base),
                "content": "buy milk"
            }),
        )
        .await
        .unwrap();
    assert!(!written.is_error, "{}", written.joined_text());

    let listed = registry
        .call(
            "list_container",
            json!({ "sessionId": session_id, "containerUrl": format!("{}/alice/notes/", base) }),
        )
        .await
        .unwrap();
    let resources: Vec<Value> = listed.structured_content.as_ref().unwrap()["resources"]
        .as_array()
        .unwrap()
        .clone();
    assert_eq!(resources, vec![json!(format!("{}/alice/notes/todo.txt", base))]);
    assert!(listed.joined_text().contains("- "));

    let deleted = registry
        .call(
            "delete_resource",
            json!({
                "sessionId": session_id,
                "resourceUrl": format!("{}/alice/notes/todo.txt", base)
            }),
        )
        .await
        .unwrap();
    assert!(!deleted.is_error);
}

#[tokio::test]
async fn test_session_expires() {
    let server = start_mock_css().await;
    let service = pod_service(short_ttl_config(Duration::from_millis(300)));

    let outcome = service
        .login(Some(&issuer(&server)), None, None)
        .await
        .unwrap();
    let id = outcome.session_id.to_string();
    assert!(service.gateway().authorize(Some(&id)).await.is_ok());

    tokio::time::sleep(Duration::from_millis(500)).await;
    let expired = service.gateway().authorize(Some(&id)).await.unwrap_err();
    let unknown = service
        .gateway()
        .authorize(Some("never-issued"))
        .await
        .unwrap_err();
    assert_matches!(expired, SolidError::Unauthorized(_));
    assert_eq!(expired.to_string(), unknown.to_string());
    assert!(service.gateway().store().is_empty().await);
}
