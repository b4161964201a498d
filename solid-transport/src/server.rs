//! JSON-RPC method dispatch for the MCP server

use crate::tools::ToolRegistry;
use serde_json::{json, Value};
use solid_auth::PodService;
use solid_common::{
    error_codes, Implementation, InitializeResponse, JsonRpcError, JsonRpcMessage,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId, PROTOCOL_VERSION,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name announced in `serverInfo`
pub const SERVER_NAME: &str = "solid-pod-mcp-server";

const INSTRUCTIONS: &str = "Call solid_login first, then pass the returned sessionId \
                            to every other tool. Sessions expire after a fixed lifetime.";

pub struct McpServer {
    tools: ToolRegistry,
    initialized: AtomicBool,
}

impl McpServer {
    pub fn new(service: Arc<PodService>) -> Self {
        Self {
            tools: ToolRegistry::new(service),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Handle one raw line. Returns the response to write, if any.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value = match serde_json::from_str::<Value>(line) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse JSON-RPC message: {}", e);
                return Some(JsonRpcResponse::failure(
                    RequestId::Null,
                    JsonRpcError::new(error_codes::PARSE_ERROR, format!("Parse error: {}", e)),
                ));
            }
        };

        match serde_json::from_value::<JsonRpcMessage>(value) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                warn!("Invalid JSON-RPC message: {}", e);
                Some(JsonRpcResponse::failure(
                    RequestId::Null,
                    JsonRpcError::new(
                        error_codes::INVALID_REQUEST,
                        format!("Invalid request: {}", e),
                    ),
                ))
            }
        }
    }

    pub async fn handle_message(&self, message: JsonRpcMessage) -> Option<JsonRpcResponse> {
        match message {
            JsonRpcMessage::Request(req) => Some(self.handle_request(req).await),
            JsonRpcMessage::Notification(notif) => {
                self.handle_notification(notif);
                None
            }
            JsonRpcMessage::Response(resp) => {
                debug!("Ignoring response with id {}", resp.id);
                None
            }
        }
    }

    async fn handle_request(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        debug!("Handling request: {}", req.method);

        let result = match req.method.as_str() {
            "initialize" => self.handle_initialize(),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.tools.definitions() })),
            "tools/call" => self.handle_tools_call(req.params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(JsonRpcError::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", req.method),
            )),
        };

        match result {
            Ok(result) => JsonRpcResponse::success(req.id, result),
            Err(error) => JsonRpcResponse::failure(req.id, error),
        }
    }

    fn handle_notification(&self, notif: JsonRpcNotification) {
        debug!("Handling notification: {}", notif.method);

        match notif.method.as_str() {
            "notifications/initialized" | "initialized" => {
                self.initialized.store(true, Ordering::SeqCst);
                info!("Client initialized");
            }
            "notifications/cancelled" => {}
            _ => {
                warn!("Unknown notification method: {}", notif.method);
            }
        }
    }

    fn handle_initialize(&self) -> Result<Value, JsonRpcError> {
        info!("Handling initialize request");

        let result = InitializeResponse {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({ "tools": { "listChanged": false } }),
            server_info: Implementation::new(SERVER_NAME, env!("CARGO_PKG_VERSION")),
            instructions: Some(INSTRUCTIONS.to_string()),
        };

        serde_json::to_value(result)
            .map_err(|e| JsonRpcError::new(error_codes::INTERNAL_ERROR, e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params
            .ok_or_else(|| JsonRpcError::new(error_codes::INVALID_PARAMS, "Missing params"))?;

        let tool_name = params["name"]
            .as_str()
            .ok_or_else(|| JsonRpcError::new(error_codes::INVALID_PARAMS, "Missing tool name"))?;

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        let result = self.tools.call(tool_name, arguments).await?;

        serde_json::to_value(result)
            .map_err(|e| JsonRpcError::new(error_codes::INTERNAL_ERROR, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solid_auth::SolidConfig;

    fn server() -> McpServer {
        McpServer::new(Arc::new(PodService::new(SolidConfig::default()).unwrap()))
    }

    #[tokio::test]
    async fn test_initialize() {
        let server = server();
        let resp = server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert!(result["capabilities"]["tools"].is_object());

        assert!(!server.is_initialized());
        let none = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(none.is_none());
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_tools_list() {
        let resp = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#)
            .await
            .unwrap();
        assert_eq!(resp.id, RequestId::String("a".into()));
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().clone();
        assert!(tools.iter().any(|t| t["name"] == "solid_login"));
        assert!(tools.iter().all(|t| t["inputSchema"].is_object()));
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let server = server();

        let resp = server.handle_line("not json").await.unwrap();
        assert_eq!(resp.id, RequestId::Null);
        assert_eq!(resp.error.unwrap().code, error_codes::PARSE_ERROR);

        let resp = server
            .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"sampling/createMessage"}"#)
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, error_codes::METHOD_NOT_FOUND);

        let resp = server
            .handle_line(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call"}"#)
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_PARAMS);

        let resp = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"nope"}}"#,
            )
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_malformed_id_gets_invalid_request() {
        let server = server();
        for line in [
            r#"{"jsonrpc":"2.0","id":1.5,"method":"tools/list"}"#,
            r#"{"jsonrpc":"2.0","id":{"x":1},"method":"tools/list"}"#,
            r#"[1, 2]"#,
        ] {
            let resp = server.handle_line(line).await.unwrap();
            assert_eq!(resp.id, RequestId::Null);
            assert_eq!(resp.error.unwrap().code, error_codes::INVALID_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_tool_failure_is_not_a_protocol_error() {
        let resp = server()
            .handle_line(
                r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"delete_resource","arguments":{"sessionId":"","resourceUrl":"http://localhost:3000/x"}}}"#,
            )
            .await
            .unwrap();
        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("❌ Error (400)"));
    }
}
