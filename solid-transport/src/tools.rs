//! Tool registry
//!
//! Declares the tools offered through `tools/list` and dispatches
//! `tools/call` to the [`PodService`]. Failures of the Pod layer are
//! rendered into an `isError` result; only an unknown tool name or
//! arguments that do not decode become JSON-RPC errors.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use solid_auth::{AccessModes, PodService, SolidError};
use solid_common::{error_codes, CallToolResult, JsonRpcError, Tool};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SESSION_ID_DESCRIPTION: &str = "Session id returned by solid_login";

/// Render a Pod-layer failure as the text shown to the caller
pub fn render_error(error: &SolidError) -> String {
    match error {
        SolidError::Delegated { status, .. } => {
            let mut message = format!("❌ A Solid error occurred ({}).", status);
            match status {
                401 => message.push_str(" Unauthorized. Your session may have expired."),
                403 => message.push_str(" Forbidden. You may not have permission for this action."),
                404 => message.push_str(" Resource not found."),
                _ => {}
            }
            message
        }
        other => format!("❌ Error ({}): {}", other.status_code(), other),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginArgs {
    oidc_issuer: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogoutArgs {
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceArgs {
    session_id: Option<String>,
    resource_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteArgs {
    session_id: Option<String>,
    resource_url: String,
    content: String,
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerArgs {
    session_id: Option<String>,
    container_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateArgs {
    session_id: Option<String>,
    resource_url: String,
    thing_url: String,
    predicate: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantArgs {
    session_id: Option<String>,
    resource_url: String,
    agent_web_id: String,
    #[serde(flatten)]
    modes: AccessModes,
}

/// Definitions returned by `tools/list`
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: "solid_login".to_string(),
            description: "Logs into a Solid Pod and returns a sessionId for the other tools. \
                          Email and password default to SOLID_EMAIL / SOLID_PASSWORD."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "oidcIssuer": {
                        "type": "string",
                        "description": "The OIDC Issuer URL (e.g., http://localhost:3000/)"
                    },
                    "email": {
                        "type": "string",
                        "description": "The account email for the Solid Pod"
                    },
                    "password": {
                        "type": "string",
                        "description": "The account password for the Solid Pod"
                    }
                }
            }),
        },
        Tool {
            name: "solid_logout".to_string(),
            description: "Ends a session before it expires.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sessionId": { "type": "string", "description": SESSION_ID_DESCRIPTION }
                },
                "required": ["sessionId"]
            }),
        },
        Tool {
            name: "read_resource".to_string(),
            description: "Reads the content of a resource from the Solid Pod.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sessionId": { "type": "string", "description": SESSION_ID_DESCRIPTION },
                    "resourceUrl": {
                        "type": "string",
                        "description": "The full URL of the resource to read"
                    }
                },
                "required": ["sessionId", "resourceUrl"]
            }),
        },
        Tool {
            name: "write_text_resource".to_string(),
            description: "Writes or overwrites a text-based resource on the Solid Pod.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sessionId": { "type": "string", "description": SESSION_ID_DESCRIPTION },
                    "resourceUrl": {
                        "type": "string",
                        "description": "The full URL of the resource to write"
                    },
                    "content": {
                        "type": "string",
                        "description": "The text content to write"
                    },
                    "contentType": {
                        "type": "string",
                        "description": "The MIME type (defaults to text/plain)"
                    }
                },
                "required": ["sessionId", "resourceUrl", "content"]
            }),
        },
        Tool {
            name: "list_container".to_string(),
            description: "Lists all resources within a container on the Solid Pod.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sessionId": { "type": "string", "description": SESSION_ID_DESCRIPTION },
                    "containerUrl": {
                        "type": "string",
                        "description": "The URL of the container to list (ends with /)"
                    }
                },
                "required": ["sessionId", "containerUrl"]
            }),
        },
        Tool {
            name: "delete_resource".to_string(),
            description: "Deletes a resource from the Solid Pod.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sessionId": { "type": "string", "description": SESSION_ID_DESCRIPTION },
                    "resourceUrl": {
                        "type": "string",
                        "description": "The full URL of the resource to delete"
                    }
                },
                "required": ["sessionId", "resourceUrl"]
            }),
        },
        Tool {
            name: "update_rdf_resource".to_string(),
            description: "Sets a predicate of a thing in an RDF resource to a single string value, \
                          replacing any previous values."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sessionId": { "type": "string", "description": SESSION_ID_DESCRIPTION },
                    "resourceUrl": {
                        "type": "string",
                        "description": "The URL of the RDF document"
                    },
                    "thingUrl": {
                        "type": "string",
                        "description": "The subject IRI, absolute or relative to the document (e.g. #me)"
                    },
                    "predicate": {
                        "type": "string",
                        "description": "The full predicate IRI"
                    },
                    "value": {
                        "type": "string",
                        "description": "The new literal value"
                    }
                },
                "required": ["sessionId", "resourceUrl", "thingUrl", "predicate", "value"]
            }),
        },
        Tool {
            name: "grant_access".to_string(),
            description: "Grants an agent access to a resource by adding an authorization \
                          to its ACL document."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sessionId": { "type": "string", "description": SESSION_ID_DESCRIPTION },
                    "resourceUrl": {
                        "type": "string",
                        "description": "The URL of the resource or container to share"
                    },
                    "agentWebId": {
                        "type": "string",
                        "description": "The WebID of the agent receiving access"
                    },
                    "read": { "type": "boolean", "description": "Grant read access" },
                    "write": { "type": "boolean", "description": "Grant write access" },
                    "append": { "type": "boolean", "description": "Grant append access" }
                },
                "required": ["sessionId", "resourceUrl", "agentWebId"]
            }),
        },
        Tool {
            name: "ping".to_string(),
            description: "Test connectivity".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}

fn decode<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, JsonRpcError> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| {
        JsonRpcError::new(
            error_codes::INVALID_PARAMS,
            format!("Invalid arguments for {}: {}", tool, e),
        )
    })
}

/// Dispatches `tools/call` to the Pod service
#[derive(Clone)]
pub struct ToolRegistry {
    service: Arc<PodService>,
}

impl ToolRegistry {
    pub fn new(service: Arc<PodService>) -> Self {
        Self { service }
    }

    pub fn definitions(&self) -> Vec<Tool> {
        tool_definitions()
    }

    /// Run a tool. `Err` is reserved for protocol faults.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<CallToolResult, JsonRpcError> {
        info!(tool = name, "Calling tool");
        let outcome = match name {
            "solid_login" => self.login(decode(name, arguments)?).await,
            "solid_logout" => self.logout(decode(name, arguments)?).await,
            "read_resource" => self.read(decode(name, arguments)?).await,
            "write_text_resource" => self.write(decode(name, arguments)?).await,
            "list_container" => self.list(decode(name, arguments)?).await,
            "delete_resource" => self.delete(decode(name, arguments)?).await,
            "update_rdf_resource" => self.update(decode(name, arguments)?).await,
            "grant_access" => self.grant(decode(name, arguments)?).await,
            "ping" => Ok(CallToolResult::text("pong")),
            _ => {
                return Err(JsonRpcError::new(
                    error_codes::INVALID_PARAMS,
                    format!("Unknown tool: {}", name),
                ))
            }
        };

        Ok(outcome.unwrap_or_else(|e| {
            warn!(tool = name, status = e.status_code(), "Tool call failed: {}", e);
            CallToolResult::error(render_error(&e))
        }))
    }

    async fn login(&self, args: LoginArgs) -> solid_auth::Result<CallToolResult> {
        let outcome = self
            .service
            .login(
                args.oidc_issuer.as_deref(),
                args.email.as_deref(),
                args.password.as_deref(),
            )
            .await?;

        let text = format!(
            "✅ Login successful. Session is active.\nSession ID: {}\nWebID: {}\nExpires at: {}",
            outcome.session_id,
            outcome.web_id,
            outcome.expires_at.to_rfc3339()
        );
        Ok(CallToolResult::text(text).with_structured(json!({
            "sessionId": outcome.session_id,
            "webId": outcome.web_id,
            "expiresAt": outcome.expires_at.to_rfc3339(),
        })))
    }

    async fn logout(&self, args: LogoutArgs) -> solid_auth::Result<CallToolResult> {
        self.service.logout(args.session_id.as_deref()).await?;
        Ok(CallToolResult::text("✅ Logged out. Session has ended."))
    }

    async fn read(&self, args: ResourceArgs) -> solid_auth::Result<CallToolResult> {
        let content = self
            .service
            .read_resource(args.session_id.as_deref(), &args.resource_url)
            .await?;
        Ok(CallToolResult::text(content))
    }

    async fn write(&self, args: WriteArgs) -> solid_auth::Result<CallToolResult> {
        let status = self
            .service
            .write_resource(
                args.session_id.as_deref(),
                &args.resource_url,
                &args.content,
                args.content_type.as_deref(),
            )
            .await?;
        Ok(CallToolResult::text(status))
    }

    async fn list(&self, args: ContainerArgs) -> solid_auth::Result<CallToolResult> {
        let resources = self
            .service
            .list_container(args.session_id.as_deref(), &args.container_url)
            .await?;
        debug!("{} contains {} resources", args.container_url, resources.len());

        let text = if resources.is_empty() {
            format!("Container {} is empty.", args.container_url)
        } else {
            let lines: Vec<String> = resources.iter().map(|r| format!("- {}", r)).collect();
            format!("Contents of {}:\n{}", args.container_url, lines.join("\n"))
        };
        Ok(CallToolResult::text(text).with_structured(json!({ "resources": resources })))
    }

    async fn delete(&self, args: ResourceArgs) -> solid_auth::Result<CallToolResult> {
        let status = self
            .service
            .delete_resource(args.session_id.as_deref(), &args.resource_url)
            .await?;
        Ok(CallToolResult::text(status))
    }

    async fn update(&self, args: UpdateArgs) -> solid_auth::Result<CallToolResult> {
        let status = self
            .service
            .update_rdf_resource(
                args.session_id.as_deref(),
                &args.resource_url,
                &args.thing_url,
                &args.predicate,
                &args.value,
            )
            .await?;
        Ok(CallToolResult::text(status))
    }

    async fn grant(&self, args: GrantArgs) -> solid_auth::Result<CallToolResult> {
        let status = self
            .service
            .grant_access(
                args.session_id.as_deref(),
                &args.resource_url,
                &args.agent_web_id,
                args.modes,
            )
            .await?;
        Ok(CallToolResult::text(status))
    }
}
