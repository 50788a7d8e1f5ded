//! Tool invocation
//!
//! Workers may call external tools (document stores, mail servers, search)
//! through an opaque [`ToolInvoker`]. The engine never interprets tool
//! payloads; it only carries the invoker to workers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A call to one tool on one server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub server: String,
    pub tool: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolRequest {
    pub fn new(
        server: impl Into<String>,
        tool: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            server: server.into(),
            tool: tool.into(),
            arguments,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub content: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Tool {tool} on server {server} is not available")]
    Unavailable { server: String, tool: String },

    #[error("Tool call failed: {0}")]
    Failed(String),
}

/// Capability to call external tools
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn call(&self, request: ToolRequest) -> Result<ToolResponse, ToolError>;
}

/// Invoker for deployments without tool servers
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTools;

#[async_trait]
impl ToolInvoker for NoTools {
    async fn call(&self, request: ToolRequest) -> Result<ToolResponse, ToolError> {
        Err(ToolError::Unavailable {
            server: request.server,
            tool: request.tool,
        })
    }
}
