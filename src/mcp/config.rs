//! MCP 服务器清单（mcp_server_config.json）
//!
//! ```json
//! {"mcpServers": {
//!     "weather": {"isActive": true, "command": "uvx", "args": ["mcp-weather"]},
//!     "docs":    {"isActive": true, "baseUrl": "http://localhost:8000/mcp"}
//! }}
//! ```
//! 保留文件中的书写顺序（即发现顺序）；未激活或既无 baseUrl 也无 command 的条目会被跳过。

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::AgentError;

/// 单个服务器条目
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerEntry {
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub base_url: Option<String>,
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_active() -> bool {
    true
}

/// 连接方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTransport {
    /// Streamable HTTP
    Remote { url: String },
    /// 本地子进程（stdio）
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
}

impl McpServerEntry {
    /// 未激活或缺少连接信息时返回 None；同时给出 baseUrl 与 command 时以 baseUrl 为准
    pub fn transport(&self) -> Option<BackendTransport> {
        if !self.is_active {
            return None;
        }
        if let Some(url) = self.base_url.as_deref().filter(|u| !u.is_empty()) {
            return Some(BackendTransport::Remote { url: url.to_string() });
        }
        self.command
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(|command| BackendTransport::Stdio {
                command: command.to_string(),
                args: self.args.clone(),
                env: self.env.clone(),
            })
    }
}

/// 服务器清单：按文件顺序保存 (id, entry)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct McpServersFile {
    pub servers: Vec<(String, McpServerEntry)>,
}

#[derive(Deserialize)]
struct RawServersFile {
    #[serde(rename = "mcpServers", default)]
    servers: Map<String, Value>,
}

impl McpServersFile {
    pub fn parse(json: &str) -> Result<Self, AgentError> {
        let raw: RawServersFile = serde_json::from_str(json)
            .map_err(|e| AgentError::Config(format!("invalid MCP server config: {e}")))?;
        let servers = raw
            .servers
            .into_iter()
            .map(|(id, value)| {
                serde_json::from_value::<McpServerEntry>(value)
                    .map(|entry| (id.clone(), entry))
                    .map_err(|e| AgentError::Config(format!("invalid MCP server entry {id}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { servers })
    }

    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    /// 可连接的后端（已过滤未激活与缺少连接信息的条目）
    pub fn active(&self) -> Vec<(String, BackendTransport)> {
        self.servers
            .iter()
            .filter_map(|(id, entry)| match entry.transport() {
                Some(transport) => Some((id.clone(), transport)),
                None => {
                    tracing::info!(server = %id, "MCP server skipped (inactive or no baseUrl/command)");
                    None
                }
            })
            .collect()
    }
}
