//! 后端连接器
//!
//! 启动时对每个激活的 MCP 服务器建立连接（stdio 子进程或 Streamable HTTP）、完成 initialize 握手
//! 并列出工具。连接失败的后端记为 BackendUnreachable 并跳过，不影响其他后端。

use std::sync::Arc;
use std::time::Duration;

use rmcp::model::{ClientCapabilities, ClientInfo, Implementation, ProtocolVersion};
use rmcp::transport::{StreamableHttpClientTransport, TokioChildProcess};
use tokio::process::Command;

use crate::core::AgentError;
use crate::mcp::{BackendTransport, McpServersFile, McpSession};
use crate::tools::{Tool, ToolRegistry, ToolSession};

/// 握手与 tools/list 的超时（仅发现阶段）
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// 一个已连接的后端及其工具
pub struct DiscoveredBackend {
    pub id: String,
    pub tools: Vec<Tool>,
    pub session: Arc<McpSession>,
}

impl DiscoveredBackend {
    /// (Tool, 会话句柄) 序列
    pub fn pairs(&self) -> impl Iterator<Item = (Tool, Arc<dyn ToolSession>)> + '_ {
        self.tools.iter().map(move |tool| {
            let session: Arc<dyn ToolSession> = self.session.clone();
            (tool.clone(), session)
        })
    }
}

fn client_info() -> ClientInfo {
    ClientInfo {
        protocol_version: ProtocolVersion::LATEST,
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            title: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            icons: None,
            website_url: None,
        },
    }
}

fn unreachable(backend: &str, reason: impl std::fmt::Display) -> AgentError {
    AgentError::BackendUnreachable {
        backend: backend.to_string(),
        reason: reason.to_string(),
    }
}

/// 连接单个后端并列出工具
pub async fn connect_backend(
    id: &str,
    transport: &BackendTransport,
) -> Result<DiscoveredBackend, AgentError> {
    let handshake = async {
        match transport {
            BackendTransport::Remote { url } => {
                tracing::info!(server = %id, %url, "connecting MCP server (streamable http)");
                let transport = StreamableHttpClientTransport::from_uri(url.clone());
                rmcp::serve_client(client_info(), transport)
                    .await
                    .map_err(|e| unreachable(id, format!("handshake failed: {e}")))
            }
            BackendTransport::Stdio { command, args, env } => {
                tracing::info!(server = %id, %command, ?args, "launching MCP server (stdio)");
                let mut cmd = Command::new(command);
                cmd.args(args).envs(env);
                let transport = TokioChildProcess::new(cmd)
                    .map_err(|e| unreachable(id, format!("spawn failed: {e}")))?;
                rmcp::serve_client(client_info(), transport)
                    .await
                    .map_err(|e| unreachable(id, format!("handshake failed: {e}")))
            }
        }
    };
    let service = tokio::time::timeout(CONNECT_TIMEOUT, handshake)
        .await
        .map_err(|_| unreachable(id, format!("timed out after {:?}", CONNECT_TIMEOUT)))??;

    let session = McpSession::new(id, service);
    let tools = tokio::time::timeout(CONNECT_TIMEOUT, session.list_tools())
        .await
        .map_err(|_| unreachable(id, "tools/list timed out"))?
        .map_err(|e| unreachable(id, e))?;

    tracing::info!(
        server = %id,
        tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        "tools loaded"
    );
    Ok(DiscoveredBackend {
        id: id.to_string(),
        tools,
        session: Arc::new(session),
    })
}

/// 按清单顺序发现所有可用后端；不可达的后端记录日志后跳过
pub async fn discover(servers: &McpServersFile) -> Vec<DiscoveredBackend> {
    let mut backends = Vec::new();
    for (id, transport) in servers.active() {
        match connect_backend(&id, &transport).await {
            Ok(backend) => backends.push(backend),
            Err(e) => tracing::warn!(server = %id, "{}", e),
        }
    }
    backends
}

/// 把发现结果写入注册表；冲突被拒绝的工具记录日志后跳过，返回成功注册的数量
pub fn register_backends(registry: &mut ToolRegistry, backends: &[DiscoveredBackend]) -> usize {
    let mut registered = 0;
    for backend in backends {
        for (tool, session) in backend.pairs() {
            match registry.register(tool, session) {
                Ok(name) => {
                    tracing::debug!(server = %backend.id, tool = %name, "tool registered");
                    registered += 1;
                }
                Err(e) => tracing::error!(server = %backend.id, "{}", e),
            }
        }
    }
    registered
}
