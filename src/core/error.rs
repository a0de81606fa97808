//! 错误类型
//!
//! 单轮内的错误直接向 process_query 的调用方传播，不做自动重试；已写入历史的消息不回滚。

use thiserror::Error;

use crate::llm::LlmError;

/// 编排、注册表、后端连接过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 流结束时累积的参数串不是合法 JSON object
    #[error("Malformed arguments for tool {tool}: {reason} (raw: {raw})")]
    MalformedToolArguments {
        tool: String,
        raw: String,
        reason: String,
    },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool {name} already registered by backend {existing}, rejected from {incoming}")]
    DuplicateTool {
        name: String,
        existing: String,
        incoming: String,
    },

    /// 仅在启动发现阶段出现；该后端被跳过
    #[error("Backend {backend} unreachable: {reason}")]
    BackendUnreachable { backend: String, reason: String },

    #[error("Tool {tool} failed: {reason}")]
    ToolExecutionFailed { tool: String, reason: String },

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Round limit exceeded ({0} rounds without a final answer)")]
    RoundLimitExceeded(usize),

    #[error("Config error: {0}")]
    Config(String),
}
