//! MCP 后端：服务器清单、rmcp 会话、启动时发现

pub mod config;
pub mod connector;
pub mod session;

pub use config::{BackendTransport, McpServerEntry, McpServersFile};
pub use connector::{connect_backend, discover, register_backends, DiscoveredBackend};
pub use session::McpSession;
