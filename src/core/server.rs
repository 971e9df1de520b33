//! MCP Server implementation and lifecycle management.
//!
//! The server owns the [`LifecycleManager`]; the tools it lists are whatever
//! protocols are active at the moment of the request. Loading, reloading or
//! unloading a protocol changes the tool surface without a restart.

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, model::*, service::RequestContext,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::config::Config;
use super::error::{Error, Result};
use crate::domains::protocols::{DynamicLoader, LifecycleManager, LoadedProtocol};
use crate::domains::submissions::{GitHubSource, SubmissionGateway};
use crate::domains::tools::{
    EnvCredentialProvider, ReqwestExecutor, ToolContext, ToolError, to_call_result,
};

const INSTRUCTIONS: &str = "Tools are generated from declarative API protocols. \
Each tool is named <protocol>_<endpoint> and calls that endpoint with the given arguments.";

/// The main MCP server handler.
#[derive(Clone)]
pub struct McpServer {
    config: Arc<Config>,
    lifecycle: Arc<LifecycleManager>,
    gateway: Option<Arc<SubmissionGateway>>,
}

impl McpServer {
    /// Wire the production collaborators from `config`.
    pub fn new(config: Config) -> Result<Self> {
        let protocols = &config.protocols;
        let executor = ReqwestExecutor::new(protocols.invocation_timeout(), protocols.max_response_bytes)
            .map_err(|e| Error::internal(format!("HTTP client: {e}")))?;
        let credentials = EnvCredentialProvider::new(config.credentials.env_prefix.clone());
        let context = ToolContext::new(Arc::new(executor), Arc::new(credentials))
            .with_timeout(protocols.invocation_timeout());
        let loader = DynamicLoader::from_config(protocols, context)?;
        let lifecycle = Arc::new(LifecycleManager::new(loader));

        let gateway = if config.submissions.is_enabled() {
            let source = GitHubSource::from_config(&config.submissions, protocols.max_source_bytes)?;
            Some(Arc::new(SubmissionGateway::new(
                Arc::new(source),
                lifecycle.clone(),
                config.submissions.clone(),
            )))
        } else {
            None
        };

        Ok(Self::with_lifecycle(config, lifecycle).with_gateway_opt(gateway))
    }

    /// Build around an existing lifecycle manager.
    pub fn with_lifecycle(config: Config, lifecycle: Arc<LifecycleManager>) -> Self {
        Self {
            config: Arc::new(config),
            lifecycle,
            gateway: None,
        }
    }

    pub fn with_gateway(self, gateway: Arc<SubmissionGateway>) -> Self {
        self.with_gateway_opt(Some(gateway))
    }

    fn with_gateway_opt(mut self, gateway: Option<Arc<SubmissionGateway>>) -> Self {
        self.gateway = gateway;
        self
    }

    /// Load the configured protocol directory. Returns how many protocols
    /// became active; individual failures are logged, not returned.
    pub async fn bootstrap(&self) -> Result<usize> {
        let Some(dir) = &self.config.protocols.directory else {
            return Ok(0);
        };
        let is_dir = tokio::fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false);
        if !is_dir {
            warn!("Protocol directory {} not found, starting empty", dir.display());
            return Ok(0);
        }

        let results = self.lifecycle.load_directory(dir).await?;
        Ok(results.iter().filter(|(_, result)| result.is_ok()).count())
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.server.name
    }

    /// Get the server version.
    pub fn version(&self) -> &str {
        &self.config.server.version
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    /// The submission gateway, when submissions are configured.
    pub fn gateway(&self) -> Option<&Arc<SubmissionGateway>> {
        self.gateway.as_ref()
    }

    pub fn instructions(&self) -> &'static str {
        INSTRUCTIONS
    }

    /// Tool descriptors as JSON (for HTTP transport).
    pub fn tool_descriptors(&self) -> Vec<Value> {
        self.lifecycle
            .tools()
            .into_iter()
            .filter_map(|tool| serde_json::to_value(tool).ok())
            .collect()
    }

    /// Invoke a live tool. Unknown names and failures become error results.
    pub async fn invoke_tool(&self, name: &str, arguments: Value) -> CallToolResult {
        let outcome = match self.lifecycle.tool(name) {
            Some(tool) => tool.invoke(arguments).await,
            None => Err(ToolError::not_found(name)),
        };
        if let Err(error) = &outcome {
            info!(tool = name, kind = error.kind(), "Tool call failed: {}", error);
        }
        to_call_result(outcome)
    }

    /// Active and failed protocols (for HTTP transport).
    pub fn protocols(&self) -> Vec<LoadedProtocol> {
        self.lifecycle.list()
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    #[instrument(skip(self, _context))]
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, McpError> {
        let tools = self.lifecycle.tools();
        info!("Listing {} tools", tools.len());
        Ok(ListToolsResult {
            tools,
            next_cursor: None,
            meta: None,
        })
    }

    #[instrument(skip(self, _context), fields(tool = %request.name))]
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let arguments = request.arguments.map(Value::Object).unwrap_or(Value::Null);
        Ok(self.invoke_tool(&request.name, arguments).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::protocols::ProtocolSource;
    use crate::domains::protocols::loader::testing::loader;
    use crate::domains::protocols::validator::fixtures::weather;
    use serde_json::json;

    async fn server() -> McpServer {
        let lifecycle = Arc::new(LifecycleManager::new(loader()));
        lifecycle
            .load(ProtocolSource::inline("test", weather().to_string()))
            .await
            .unwrap();
        McpServer::with_lifecycle(Config::default(), lifecycle)
    }

    #[tokio::test]
    async fn test_tool_descriptors_follow_active_protocols() {
        let server = server().await;
        let tools = server.tool_descriptors();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "weatherApi_getCurrent");
        assert_eq!(tools[0]["inputSchema"]["required"], json!(["city"]));

        server.lifecycle().unload("weather-api").await.unwrap();
        assert!(server.tool_descriptors().is_empty());
    }

    #[tokio::test]
    async fn test_invoke_tool_success() {
        let server = server().await;
        let result = server
            .invoke_tool("weatherApi_getCurrent", json!({ "city": "Paris" }))
            .await;
        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.structured_content.unwrap()["status"], 200);
    }

    #[tokio::test]
    async fn test_invoke_tool_wrong_type_is_error_result() {
        let server = server().await;
        let result = server.invoke_tool("weatherApi_getCurrent", json!({ "city": 123 })).await;
        assert_eq!(result.is_error, Some(true));
        assert_eq!(
            result.structured_content.unwrap()["error"],
            "parameter_validation"
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let result = server().await.invoke_tool("nope", json!({})).await;
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_bootstrap_without_directory() {
        let mut config = Config::default();
        config.protocols.directory = Some("/nonexistent/protocols".into());
        let server = McpServer::with_lifecycle(config, Arc::new(LifecycleManager::new(loader())));
        assert_eq!(server.bootstrap().await.unwrap(), 0);
    }
}
