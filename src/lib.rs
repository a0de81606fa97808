//! mcp-relay - 流式 LLM 与 MCP 工具后端之间的桥接
//!
//! 模块划分：
//! - **agent**: 无头运行时（配置 -> LLM + 后端 + 注册表 + 编排器）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、停止信号
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Azure / Mock）
//! - **mcp**: MCP 服务器清单、rmcp 会话、后端发现
//! - **memory**: 对话历史
//! - **observability**: tracing 初始化
//! - **react**: 流式聚合、过程事件、多轮工具调用主循环
//! - **tools**: 工具注册表、schema、执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod mcp;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::Agent;
pub use core::AgentError;
pub use react::{Orchestrator, OrchestratorSettings};
