//! CartographerMcpServer: rmcp ServerHandler backed by a CommandCatalog.
//!
//! Exposes three tools (`add`, `help`, `run`) and one `cli://` resource per
//! stored command node. All sessions share the same catalog and peer list:
//! `StreamableHttpService` clones the server per session, and the clones see
//! every tree added by any of them.

use std::sync::Arc;

use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    AnnotateAble, CallToolRequestParams, CallToolResult, Content, JsonObject,
    ListResourcesResult, ListToolsResult, PaginatedRequestParams, RawResource,
    ReadResourceRequestParams, ReadResourceResult, Resource, ResourceContents,
    ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{NotificationContext, RequestContext, RoleServer};
use rmcp::ErrorData as McpError;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::catalog::CommandCatalog;
use crate::config::CartographerConfig;
use crate::error::CartographerError;
use crate::standalone::notify::{PeerList, PeerNotifier};
use crate::tree::ResourceDescriptor;

/// MCP server backed by a CommandCatalog.
#[derive(Clone)]
pub struct CartographerMcpServer {
    catalog: Arc<CommandCatalog>,
    /// Connected session peers for resource change notifications.
    /// Stale peers are pruned on notification error.
    peers: PeerList,
}

impl CartographerMcpServer {
    pub fn new(catalog: Arc<CommandCatalog>, peers: PeerList) -> Self {
        Self { catalog, peers }
    }

    /// Build a catalog from `config` wired to a `PeerNotifier` for this server's peers.
    pub fn from_config(config: &CartographerConfig, cancel: CancellationToken) -> Self {
        let peers: PeerList = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let notifier = Arc::new(PeerNotifier::spawn(peers.clone(), cancel));
        let catalog = Arc::new(CommandCatalog::from_config(config, notifier));
        Self::new(catalog, peers)
    }

    pub fn catalog(&self) -> &Arc<CommandCatalog> {
        &self.catalog
    }

    /// Route a tool call by name.
    async fn dispatch(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, McpError> {
        let args = arguments.unwrap_or_default();
        match name {
            "add" => {
                let cmd = required_str(&args, "cmd")?;
                let summary = self.catalog.add(cmd).await.map_err(to_mcp_error)?;
                let content = Content::json(json!({
                    "root": summary.root,
                    "version": summary.version,
                    "nodes": summary.nodes,
                    "incomplete_nodes": summary.incomplete_nodes,
                    "resources": summary.tree.descriptors(),
                }))?;
                Ok(CallToolResult::success(vec![content]))
            }
            "help" => {
                let cmd = required_str(&args, "cmd")?;
                let node = self.catalog.help(cmd).await.map_err(to_mcp_error)?;
                Ok(CallToolResult::success(vec![Content::json(&node)?]))
            }
            "run" => {
                let cmd = required_str(&args, "cmd")?;
                let cmd_args = optional_str_array(&args, "cmd_args")?;
                let output = self.catalog.run(cmd, cmd_args).await.map_err(to_mcp_error)?;

                let is_error = output.exit_code != 0;
                let mut content = vec![Content::text(output.stdout)];
                if !output.stderr.is_empty() {
                    content.push(Content::text(output.stderr));
                }
                if output.truncated {
                    content.push(Content::text("output truncated".to_string()));
                }
                if is_error {
                    content.push(Content::text(format!("exit code: {}", output.exit_code)));
                }
                Ok(CallToolResult {
                    content,
                    is_error: Some(is_error),
                    structured_content: None,
                    meta: None,
                })
            }
            other => Err(McpError::invalid_params(format!("unknown tool: {}", other), None)),
        }
    }
}

impl ServerHandler for CartographerMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: rmcp::model::Implementation {
                name: "cartographer".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Cartographer maps command-line tools from their --help output. \
                 Call `add` with a command name, browse its subcommands as cli:// resources \
                 or with `help`, then execute them with `run`."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .enable_resources_list_changed()
                .build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: tool_definitions(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch(&request.name, request.arguments).await
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources = self
            .catalog
            .list_resources()
            .await
            .into_iter()
            .map(to_resource)
            .collect();
        Ok(ListResourcesResult::with_all_items(resources))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let text = self
            .catalog
            .read_resource(&request.uri)
            .await
            .map_err(to_mcp_error)?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, request.uri)],
        })
    }

    /// Store the connected peer for later resource notifications.
    async fn on_initialized(&self, context: NotificationContext<RoleServer>) {
        tracing::info!("MCP client initialized, storing peer for resource notifications");
        self.peers.lock().await.push(context.peer.clone());
    }
}

fn to_resource(descriptor: ResourceDescriptor) -> Resource {
    let mut raw = RawResource::new(descriptor.uri, descriptor.name);
    raw.mime_type = Some(descriptor.mime_type);
    raw.no_annotation()
}

/// Caller mistakes become `invalid_params`; everything else is an internal error.
fn to_mcp_error(e: CartographerError) -> McpError {
    if e.is_caller_error() {
        McpError::invalid_params(e.to_string(), None)
    } else {
        McpError::internal_error(e.to_string(), None)
    }
}

fn required_str<'a>(args: &'a JsonObject, key: &str) -> Result<&'a str, McpError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| McpError::invalid_params(format!("missing string argument '{}'", key), None))
}

fn optional_str_array(args: &JsonObject, key: &str) -> Result<Option<Vec<String>>, McpError> {
    let Some(value) = args.get(key) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let items = value.as_array().ok_or_else(|| {
        McpError::invalid_params(format!("'{}' must be an array of strings", key), None)
    })?;
    items
        .iter()
        .map(|item| {
            item.as_str().map(String::from).ok_or_else(|| {
                McpError::invalid_params(format!("'{}' must contain only strings", key), None)
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn schema(value: serde_json::Value) -> Arc<JsonObject> {
    Arc::new(value.as_object().cloned().unwrap_or_default())
}

fn tool(name: &'static str, description: &'static str, input_schema: Arc<JsonObject>) -> Tool {
    Tool {
        name: name.into(),
        title: None,
        description: Some(description.into()),
        input_schema,
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    }
}

fn tool_definitions() -> Vec<Tool> {
    let cmd_property = json!({
        "type": "string",
        "description": "Command path, e.g. \"git remote add\", \"git/remote/add\" or \"cli://git/remote/add\""
    });
    vec![
        tool(
            "add",
            "Crawl a command's --help output recursively and register every subcommand as a cli:// resource. Re-adding a command refreshes it.",
            schema(json!({
                "type": "object",
                "properties": {
                    "cmd": { "type": "string", "description": "Root command name, e.g. \"git\"" }
                },
                "required": ["cmd"]
            })),
        ),
        tool(
            "help",
            "Show the stored help, options and subcommands for a previously added command path.",
            schema(json!({
                "type": "object",
                "properties": { "cmd": cmd_property },
                "required": ["cmd"]
            })),
        ),
        tool(
            "run",
            "Run a previously added command path. Each entry of cmd_args is passed as one literal argument; no shell is involved.",
            schema(json!({
                "type": "object",
                "properties": {
                    "cmd": cmd_property,
                    "cmd_args": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Arguments appended after the command path"
                    }
                },
                "required": ["cmd"]
            })),
        ),
    ]
}
