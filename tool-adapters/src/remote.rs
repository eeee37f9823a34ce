//! Tools proxied from external tool servers.

pub mod protocol;
pub mod transport;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tool_config::{RemoteServerConfig, RemoteTransportConfig};
use tool_primitives::{
    ExecutionContext, PermissionLevel, SourceType, ToolArguments, ToolDescriptor,
};
use tool_registry::schema::from_json_schema;
use tool_registry::{HandlerError, HandlerResult, ToolHandler};
use tracing::{debug, info, warn};

use crate::error::{AdapterError, AdapterResult};
use crate::source::{DiscoveredTool, SourceMetadata, ToolSource};
use protocol::{
    CallToolResult, ListToolsResult, PROTOCOL_VERSION, RemoteToolInfo, RpcRequest,
};
use transport::{HttpTransport, RpcTransport, StdioTransport};

/// Logical operations offered by a tool server.
#[async_trait]
pub trait RemoteToolServer: Send + Sync {
    /// Performs the handshake.
    ///
    /// # Errors
    ///
    /// Returns an [`AdapterError`] when the server is unreachable or refuses.
    async fn initialize(&self) -> AdapterResult<()>;

    /// Lists every tool the server exposes.
    ///
    /// # Errors
    ///
    /// Returns an [`AdapterError`] when the listing fails.
    async fn list_tools(&self) -> AdapterResult<Vec<RemoteToolInfo>>;

    /// Invokes one tool.
    ///
    /// # Errors
    ///
    /// Returns an [`AdapterError`] when the call cannot be delivered or the
    /// server answers with a JSON-RPC error.
    async fn call_tool(&self, name: &str, arguments: ToolArguments) -> AdapterResult<CallToolResult>;
}

/// [`RemoteToolServer`] speaking JSON-RPC over any [`RpcTransport`].
pub struct JsonRpcServer<T> {
    transport: T,
    next_id: AtomicU64,
}

impl<T> fmt::Debug for JsonRpcServer<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRpcServer")
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl<T> JsonRpcServer<T>
where
    T: RpcTransport,
{
    /// Wraps a transport.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    async fn request<R>(&self, method: &str, params: Option<Value>) -> AdapterResult<R>
    where
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .transport
            .call(RpcRequest::call(id, method, params))
            .await?;
        if let Some(error) = response.error {
            return Err(AdapterError::protocol(format!(
                "`{method}` failed with {}: {}",
                error.code, error.message
            )));
        }
        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|err| AdapterError::protocol(format!("unexpected `{method}` result: {err}")))
    }
}

#[async_trait]
impl<T> RemoteToolServer for JsonRpcServer<T>
where
    T: RpcTransport,
{
    async fn initialize(&self) -> AdapterResult<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "toolgate", "version": env!("CARGO_PKG_VERSION")},
        });
        let _: Value = self.request("initialize", Some(params)).await?;
        self.transport
            .notify(RpcRequest::notification("notifications/initialized", None))
            .await
    }

    async fn list_tools(&self) -> AdapterResult<Vec<RemoteToolInfo>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.take().map(|cursor| json!({ "cursor": cursor }));
            let page: ListToolsResult = self.request("tools/list", params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }
    }

    async fn call_tool(&self, name: &str, arguments: ToolArguments) -> AdapterResult<CallToolResult> {
        self.request("tools/call", Some(json!({ "name": name, "arguments": arguments })))
            .await
    }
}

/// Source registering every tool of one remote server.
pub struct RemoteSource {
    metadata: SourceMetadata,
    server: Arc<dyn RemoteToolServer>,
    permission: PermissionLevel,
    handshake_timeout: Duration,
}

impl fmt::Debug for RemoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSource")
            .field("name", &self.metadata.id())
            .field("permission", &self.permission)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

impl RemoteSource {
    /// Wraps a server under `name`, with ELEVATED tools and a 10 second handshake.
    #[must_use]
    pub fn new(name: impl Into<String>, server: Arc<dyn RemoteToolServer>) -> Self {
        Self {
            metadata: SourceMetadata::new(name, SourceType::Remote),
            server,
            permission: PermissionLevel::Elevated,
            handshake_timeout: Duration::from_secs(10),
        }
    }

    /// Builds the transport described by a configuration entry.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] when the transport settings are
    /// unusable.
    pub fn from_config(config: &RemoteServerConfig) -> AdapterResult<Self> {
        let server: Arc<dyn RemoteToolServer> = match &config.transport {
            RemoteTransportConfig::Stdio { command, args, env } => Arc::new(JsonRpcServer::new(
                StdioTransport::new(command.clone(), args.clone(), env.clone()),
            )),
            RemoteTransportConfig::Http { url } => {
                Arc::new(JsonRpcServer::new(HttpTransport::new(url)?))
            }
        };
        Ok(Self::new(config.name.clone(), server)
            .with_permission(config.permission_level)
            .with_handshake_timeout(config.handshake_timeout()))
    }

    /// Permission level assigned to every tool of this server.
    #[must_use]
    pub fn with_permission(mut self, permission: PermissionLevel) -> Self {
        self.permission = permission;
        self
    }

    /// Time allowed for handshake plus listing.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    fn describe(&self, info: &RemoteToolInfo) -> tool_primitives::Result<ToolDescriptor> {
        let derived = from_json_schema(&info.input_schema);
        let description = info
            .description
            .clone()
            .filter(|description| !description.trim().is_empty())
            .unwrap_or(derived.summary);
        ToolDescriptor::builder(&info.name)
            .description(description)
            .parameters(derived.parameters)
            .permission(self.permission)
            .tag("remote")
            .tag(self.metadata.id())
            .source(SourceType::Remote, self.metadata.id())
            .build()
    }
}

#[async_trait]
impl ToolSource for RemoteSource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    async fn discover(&self) -> AdapterResult<Vec<DiscoveredTool>> {
        let id = self.metadata.id();
        let handshake = async {
            self.server.initialize().await?;
            self.server.list_tools().await
        };
        let listed = tokio::time::timeout(self.handshake_timeout, handshake)
            .await
            .map_err(|_| {
                AdapterError::initialization(
                    id,
                    format!("handshake timed out after {:?}", self.handshake_timeout),
                )
            })?
            .map_err(|err| AdapterError::initialization(id, err.to_string()))?;

        let mut tools = Vec::with_capacity(listed.len());
        for info in &listed {
            match self.describe(info) {
                Ok(descriptor) => tools.push(DiscoveredTool {
                    descriptor,
                    handler: Arc::new(RemoteHandler {
                        server: Arc::clone(&self.server),
                        tool: info.name.clone(),
                    }),
                }),
                Err(err) => warn!(server = %id, tool = %info.name, error = %err, "skipping remote tool"),
            }
        }
        info!(server = %id, tools = tools.len(), "remote tool server connected");
        Ok(tools)
    }
}

/// Forwards calls to the server that advertised the tool.
struct RemoteHandler {
    server: Arc<dyn RemoteToolServer>,
    tool: String,
}

#[async_trait]
impl ToolHandler for RemoteHandler {
    fn source_type(&self) -> SourceType {
        SourceType::Remote
    }

    async fn execute(&self, arguments: ToolArguments, _context: &ExecutionContext) -> HandlerResult<Value> {
        let result = self
            .server
            .call_tool(&self.tool, arguments)
            .await
            .map_err(|err| match err {
                AdapterError::Transport { reason } => HandlerError::transport(reason),
                other => HandlerError::failed(other.to_string()),
            })?;
        if result.is_error {
            let message = result.text();
            debug!(tool = %self.tool, %message, "remote tool reported an error");
            return Err(HandlerError::failed(if message.is_empty() {
                "remote tool reported an error".to_owned()
            } else {
                message
            }));
        }
        Ok(result.into_value())
    }
}
