//! End-to-end session over the stdio transport
//!
//! Drives the server the way an MCP client does: initialize, list tools,
//! log in, then use the returned session id.

use serde_json::{json, Value};
use solid_common::PROTOCOL_VERSION;
use solid_mcp_tests::*;
use solid_transport::{McpServer, StdioHandler};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

struct Client {
    input: DuplexStream,
    output: Lines<BufReader<DuplexStream>>,
    next_id: i64,
}

impl Client {
    async fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.next_id,
            "method": method,
            "params": params
        });
        self.send(&request).await;
        let line = self.output.next_line().await.unwrap().unwrap();
        let response: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["id"], self.next_id);
        response
    }

    async fn send(&mut self, message: &Value) {
        let mut line = serde_json::to_string(message).unwrap();
        line.push('\n');
        self.input.write_all(line.as_bytes()).await.unwrap();
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Value {
        let response = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await;
        response["result"].clone()
    }
}

fn start_server() -> (Client, tokio::task::JoinHandle<()>) {
    let (client_in, server_in) = tokio::io::duplex(64 * 1024);
    let (server_out, client_out) = tokio::io::duplex(64 * 1024);

    let server = Arc::new(McpServer::new(pod_service(test_config())));
    let handle = tokio::spawn(async move {
        StdioHandler::new(server)
            .serve(server_in, server_out)
            .await
            .unwrap();
    });

    let client = Client {
        input: client_in,
        output: BufReader::new(client_out).lines(),
        next_id: 0,
    };
    (client, handle)
}

#[tokio::test]
async fn test_full_session_over_stdio() {
    let css = start_mock_css().await;
    Mock::given(method("GET"))
        .and(path("/alice/profile/card"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<#me> a <#Person> ."))
        .mount(&css)
        .await;

    let (mut client, handle) = start_server();

    let init = client
        .request(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "0.0.0" }
            }),
        )
        .await;
    assert_eq!(init["result"]["protocolVersion"], PROTOCOL_VERSION);
    client
        .send(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .await;

    let tools = client.request("tools/list", json!({})).await;
    assert!(tools["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .any(|t| t["name"] == "grant_access"));

    let login = client
        .call_tool("solid_login", json!({ "oidcIssuer": issuer(&css) }))
        .await;
    assert_ne!(login["isError"], true);
    let session_id = login["structuredContent"]["sessionId"]
        .as_str()
        .unwrap()
        .to_string();

    let read = client
        .call_tool(
            "read_resource",
            json!({
                "sessionId": session_id,
                "resourceUrl": format!("{}/alice/profile/card", css.uri())
            }),
        )
        .await;
    assert_eq!(read["content"][0]["text"], "<#me> a <#Person> .");

    let logout = client
        .call_tool("solid_logout", json!({ "sessionId": session_id }))
        .await;
    assert_ne!(logout["isError"], true);

    let after = client
        .call_tool(
            "read_resource",
            json!({
                "sessionId": session_id,
                "resourceUrl": format!("{}/alice/profile/card", css.uri())
            }),
        )
        .await;
    assert_eq!(after["isError"], true);
    assert!(after["content"][0]["text"]
        .as_str()
        .unwrap()
        .starts_with("❌ Error (401)"));

    // Closing stdin shuts the server down cleanly
    drop(client);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_unknown_method_and_tool() {
    let (mut client, handle) = start_server();

    let response = client.request("resources/read", json!({})).await;
    assert_eq!(response["error"]["code"], -32601);

    let response = client
        .request("tools/call", json!({ "name": "no_such_tool", "arguments": {} }))
        .await;
    assert_eq!(response["error"]["code"], -32602);

    drop(client);
    handle.await.unwrap();
}
